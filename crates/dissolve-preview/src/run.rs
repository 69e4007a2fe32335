use anyhow::{Context, Result};
use dissolve::{fit_to_gpu_limits, load_image_from_url, TextureSource, TransitionConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::{still, window};

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let config = resolve_config(&args)?;
    tracing::info!(
        media = %args.media,
        mask = %args.mask,
        duration = %humantime::format_duration(config.duration),
        easing = %config.easing,
        "starting dissolve preview"
    );
    let result = match args.still.as_deref() {
        Some(path) => still::render_still(&args, &config, path),
        None => window::run_window(&args, &config),
    };
    if let Err(err) = &result {
        tracing::error!("dissolve preview failed: {err:#}");
    }
    result
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Config file values, overridden by any flag given on the command line.
pub(crate) fn resolve_config(args: &Args) -> Result<TransitionConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => TransitionConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => TransitionConfig::default(),
    };
    if let Some(duration) = args.duration {
        config.duration = duration;
    }
    if let Some(easing) = args.easing {
        config.easing = easing;
    }
    if let Some(low) = args.low_edge {
        config.dissolve_low_edge = low;
    }
    if let Some(high) = args.high_edge {
        config.dissolve_high_edge = high;
    }
    config.validate().context("invalid transition settings")?;
    Ok(config)
}

/// Loads `location` synchronously, resampling it when `fit` is set.
pub(crate) fn load_source(location: &str, fit: bool) -> Result<TextureSource> {
    let image = load_image_from_url(location).with_context(|| format!("failed to load {location}"))?;
    let source = TextureSource::from(image);
    Ok(if fit { fit_to_gpu_limits(&source) } else { source })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use dissolve::Easing;

    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dissolve.toml");
        std::fs::write(
            &path,
            "duration = \"6s\"\neasing = \"linear\"\ndissolve_high_edge = 0.5\n",
        )
        .expect("write config");

        let args = Args::try_parse_from([
            "dissolve-preview",
            "media.png",
            "mask.png",
            "--config",
            path.to_str().expect("utf-8 path"),
            "--easing",
            "smoothstep",
        ])
        .expect("parse");
        let config = resolve_config(&args).expect("config");
        assert_eq!(config.duration, Duration::from_secs(6));
        assert_eq!(config.easing, Easing::Smoothstep);
        assert_eq!(config.dissolve_high_edge, 0.5);
    }

    #[test]
    fn rejects_inverted_edge_flags() {
        let args = Args::try_parse_from([
            "dissolve-preview",
            "media.png",
            "mask.png",
            "--low-edge",
            "0.4",
            "--high-edge",
            "0.1",
        ])
        .expect("parse");
        assert!(resolve_config(&args).is_err());
    }
}
