use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dissolve::Easing;

#[derive(Parser, Debug)]
#[command(
    name = "dissolve-preview",
    author,
    version,
    about = "Preview a GPU dissolve transition between a media image and a greyscale mask"
)]
pub struct Args {
    /// Media image: a path, `file://` URL or `http(s)://` URL.
    #[arg(value_name = "MEDIA")]
    pub media: String,

    /// Greyscale mask; brighter texels are revealed first.
    #[arg(value_name = "MASK")]
    pub mask: String,

    /// Surface size (e.g. `1280x720`).
    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_size,
        default_value = "960x540"
    )]
    pub size: (u32, u32),

    /// Transition duration (e.g. `4s`, `2500ms`; bare numbers are milliseconds).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Easing curve: `linear`, `ease-out-sine`, `smoothstep` or `ease-in-out`.
    #[arg(long, value_name = "NAME")]
    pub easing: Option<Easing>,

    /// Lower smoothstep edge applied to the mask threshold.
    #[arg(long, value_name = "F", allow_negative_numbers = true)]
    pub low_edge: Option<f32>,

    /// Upper smoothstep edge applied to the mask threshold.
    #[arg(long, value_name = "F", allow_negative_numbers = true)]
    pub high_edge: Option<f32>,

    /// TOML file with transition settings; flags override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Resample media and mask to power-of-two sizes within the GPU limit.
    #[arg(long)]
    pub fit: bool,

    /// Restart the transition each time it finishes.
    #[arg(long = "loop")]
    pub repeat: bool,

    /// Render one frame offscreen and write it to PATH as PNG instead of opening a window.
    #[arg(long, value_name = "PATH")]
    pub still: Option<PathBuf>,

    /// Elapsed transition time captured by `--still`.
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = parse_duration,
        default_value = "2s",
        requires = "still"
    )]
    pub at: Duration,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(millis) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}
