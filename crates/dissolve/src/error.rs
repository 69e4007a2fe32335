use std::fmt;

/// Programmable stage of the dissolve program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Errors surfaced by the dissolve engine and its helpers.
///
/// Sources that are still decoding never produce an error; the texture
/// resource shows a placeholder until they are ready.
#[derive(Debug, thiserror::Error)]
pub enum DissolveError {
    #[error("no rendering context available: {0}")]
    UnsupportedSurface(String),
    #[error("failed to compile {stage} shader: {message}")]
    ShaderCompile { stage: ShaderStage, message: String },
    #[error("failed to link dissolve program: {0}")]
    ProgramLink(String),
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("failed to read back rendered frame: {0}")]
    Readback(String),
    #[error("failed to load image from {url}: {source}")]
    Load {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DissolveError {
    pub(crate) fn load(url: &str, source: anyhow::Error) -> Self {
        DissolveError::Load {
            url: url.to_string(),
            source: source.into(),
        }
    }
}
