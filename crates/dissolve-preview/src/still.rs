use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use dissolve::{DissolveTransition, ManualScheduler, TransitionConfig, WgpuBackend};

use crate::cli::Args;
use crate::run::load_source;

/// Renders the transition offscreen at `args.at` and writes it to `path`.
pub fn render_still(args: &Args, config: &TransitionConfig, path: &Path) -> Result<()> {
    let media = load_source(&args.media, args.fit)?;
    let mask = load_source(&args.mask, args.fit)?;

    let (width, height) = args.size;
    let backend =
        WgpuBackend::offscreen(width, height).context("failed to initialise offscreen renderer")?;
    let scheduler = Rc::new(ManualScheduler::new());
    let engine = DissolveTransition::new(backend, media, mask, scheduler.clone(), config)
        .context("failed to create dissolve transition")?;

    engine.start();
    scheduler.step(args.at);
    tracing::debug!(progress = engine.progress(), "captured still frame");

    let frame = engine
        .snapshot()
        .context("failed to read back still frame")?
        .ok_or_else(|| anyhow!("renderer produced no frame to capture"))?;
    frame
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        width,
        height,
        at = %humantime::format_duration(args.at),
        "still frame written"
    );
    engine.destroy(false);
    Ok(())
}
