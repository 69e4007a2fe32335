use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use dissolve::image::{Rgba, RgbaImage};
use dissolve::{
    BackendLog, BackendOp, DissolveError, DissolveTransition, Easing, HeadlessBackend,
    ImageSource, ManualScheduler, TextureSource, TransitionConfig, TransitionState,
};

const FRAME: Duration = Duration::from_millis(16);

struct Harness {
    engine: DissolveTransition,
    scheduler: Rc<ManualScheduler>,
    log: BackendLog,
    ends: Rc<Cell<u32>>,
}

fn canvas(width: u32, height: u32) -> TextureSource {
    TextureSource::from(RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255])))
}

fn harness_with(width: u32, height: u32, media: TextureSource, config: &TransitionConfig) -> Harness {
    let backend = HeadlessBackend::new(width, height);
    let log = backend.log();
    let scheduler = Rc::new(ManualScheduler::new());
    let engine = DissolveTransition::new(backend, media, canvas(4, 4), scheduler.clone(), config)
        .expect("engine");
    let ends = Rc::new(Cell::new(0));
    {
        let ends = ends.clone();
        engine.on_transition_end(move |_| ends.set(ends.get() + 1));
    }
    // Flush the redraw queued by the initial texture binding.
    scheduler.run_frame();
    log.clear();
    Harness {
        engine,
        scheduler,
        log,
        ends,
    }
}

fn harness() -> Harness {
    harness_with(100, 100, canvas(100, 100), &TransitionConfig::default())
}

#[test]
fn construction_binds_textures_and_schedules_one_redraw() {
    let backend = HeadlessBackend::new(100, 100);
    let log = backend.log();
    let scheduler = Rc::new(ManualScheduler::new());
    let engine = DissolveTransition::new(
        backend,
        canvas(8, 8),
        canvas(8, 8),
        scheduler.clone(),
        &TransitionConfig::default(),
    )
    .expect("engine");

    assert_eq!(engine.state(), TransitionState::Idle);
    assert_eq!(engine.progress(), 0.0);
    assert_eq!(engine.duration(), Duration::from_millis(4000));
    assert!(log.ops().contains(&BackendOp::DissolveEdges {
        low: 0.0,
        high: 0.2
    }));
    assert!(log.ops().contains(&BackendOp::BindTextures));
    assert_eq!(scheduler.pending(), 1);
    assert!(log.draws().is_empty());

    scheduler.run_frame();
    assert_eq!(log.draws(), vec![0.0]);
}

#[test]
fn progress_is_bounded_monotonic_and_ends_at_one() {
    let h = harness();
    h.engine.start();
    assert_eq!(h.engine.state(), TransitionState::Running);

    let mut frames = 0;
    while h.scheduler.pending() > 0 && frames < 1000 {
        h.scheduler.step(Duration::from_millis(100));
        frames += 1;
    }

    let draws = h.log.draws();
    assert!(draws.len() > 2);
    for pair in draws.windows(2) {
        assert!(pair[1] >= pair[0], "progress regressed: {pair:?}");
    }
    assert!(draws.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(draws.last().copied(), Some(1.0));
    assert_eq!(h.engine.progress(), 1.0);
    assert_eq!(h.engine.state(), TransitionState::Idle);
    assert_eq!(h.ends.get(), 1);
}

#[test]
fn progress_follows_the_configured_easing() {
    let config = TransitionConfig {
        duration: Duration::from_millis(1000),
        easing: Easing::Linear,
        ..TransitionConfig::default()
    };
    let h = harness_with(100, 100, canvas(100, 100), &config);
    h.engine.start();
    h.scheduler.step(Duration::from_millis(250));
    assert!((h.engine.progress() - 0.25).abs() < 1e-4);
    h.engine.set_easing(Easing::EaseOutSine);
    h.scheduler.step(Duration::from_millis(250));
    assert!((h.engine.progress() - dissolve::ease_out_sine(0.5)).abs() < 1e-4);
}

#[test]
fn starting_twice_keeps_a_single_tick_chain() {
    let h = harness();
    h.engine.start();
    h.engine.start();
    assert_eq!(h.scheduler.pending(), 1);
    assert_eq!(h.log.draws().len(), 1);

    h.scheduler.step(FRAME);
    assert_eq!(h.scheduler.pending(), 1);
    assert_eq!(h.log.draws().len(), 2);

    h.scheduler.run_until_idle(Duration::from_millis(500), 100);
    assert_eq!(h.ends.get(), 1);
}

#[test]
fn reset_rewinds_and_renders_without_notifying() {
    let h = harness();
    h.engine.start();
    h.scheduler.step(Duration::from_millis(1000));
    assert!(h.engine.progress() > 0.0);

    h.log.clear();
    h.engine.reset();
    assert_eq!(h.engine.state(), TransitionState::Idle);
    assert_eq!(h.engine.progress(), 0.0);
    assert_eq!(h.log.draws(), vec![0.0]);

    h.scheduler.run_until_idle(Duration::from_millis(1000), 20);
    assert_eq!(h.log.draws(), vec![0.0]);
    assert_eq!(h.ends.get(), 0);
}

#[test]
fn reset_then_start_does_not_fork_the_tick_chain() {
    let h = harness();
    h.engine.start();
    h.scheduler.step(Duration::from_millis(500));
    h.engine.reset();
    h.engine.start();
    h.log.clear();

    // The stale tick from the first run and the fresh one share this frame.
    h.scheduler.step(FRAME);
    assert_eq!(h.log.draws().len(), 1);
    assert_eq!(h.scheduler.pending(), 1);

    h.scheduler.run_until_idle(Duration::from_millis(250), 100);
    assert_eq!(h.ends.get(), 1);
}

#[test]
fn transition_can_run_again_after_completing() {
    let config = TransitionConfig {
        duration: Duration::from_millis(100),
        ..TransitionConfig::default()
    };
    let h = harness_with(100, 100, canvas(100, 100), &config);
    h.engine.start();
    h.scheduler.run_until_idle(FRAME, 100);
    assert_eq!(h.ends.get(), 1);

    h.log.clear();
    h.engine.start();
    assert_eq!(h.log.draws(), vec![0.0]);
    h.scheduler.run_until_idle(FRAME, 100);
    assert_eq!(h.ends.get(), 2);
}

#[test]
fn zero_duration_finishes_on_the_first_tick() {
    let h = harness();
    h.engine.set_duration(Duration::ZERO);
    h.engine.start();
    assert_eq!(h.engine.progress(), 1.0);
    assert_eq!(h.ends.get(), 1);
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn identical_set_size_is_ignored() {
    let h = harness();
    h.engine.set_size(200, 100);
    h.engine.set_size(200, 100);
    let resizes = h.log.count(|op| matches!(op, BackendOp::Resize { .. }));
    let aspects = h.log.count(|op| matches!(op, BackendOp::UvScale(_)));
    assert_eq!(resizes, 1);
    assert_eq!(aspects, 1);
    assert_eq!(h.engine.size(), (200, 100));

    h.engine.set_size(0, 0);
    assert_eq!(h.engine.size(), (1, 1));
}

#[test]
fn aspect_correction_letterboxes_the_wider_axis() {
    let h = harness_with(100, 100, canvas(200, 100), &TransitionConfig::default());
    h.engine.set_size(101, 101);
    assert_eq!(h.log.last_uv_scale(), Some([0.5, 1.0]));

    let h = harness_with(200, 100, canvas(100, 100), &TransitionConfig::default());
    h.engine.set_size(100, 100);
    h.engine.set_size(200, 100);
    assert_eq!(h.log.last_uv_scale(), Some([1.0, 0.5]));
}

#[test]
fn idle_changes_coalesce_into_one_redraw() {
    let h = harness();
    h.engine.set_media(canvas(50, 50));
    h.engine.set_mask(canvas(50, 50));
    h.engine.set_size(300, 300);
    assert_eq!(h.scheduler.pending(), 1);
    assert!(h.log.draws().is_empty());

    h.scheduler.run_frame();
    assert_eq!(h.log.draws().len(), 1);

    h.engine.set_size(400, 400);
    assert_eq!(h.scheduler.pending(), 1);
}

#[test]
fn changes_while_running_do_not_queue_extra_redraws() {
    let h = harness();
    h.engine.start();
    assert_eq!(h.scheduler.pending(), 1);
    h.engine.set_media(canvas(64, 32));
    h.engine.set_size(320, 240);
    assert_eq!(h.scheduler.pending(), 1);
}

#[test]
fn pending_media_uploads_and_rebinds_when_loaded() {
    let image = ImageSource::pending();
    let h = harness_with(
        100,
        100,
        TextureSource::from(image.clone()),
        &TransitionConfig::default(),
    );
    assert_eq!(h.log.last_uv_scale(), None);

    image.complete(RgbaImage::new(400, 100));
    assert!(h.log.ops().contains(&BackendOp::BindTextures));
    assert_eq!(h.log.last_uv_scale(), Some([0.25, 1.0]));
    assert_eq!(h.scheduler.pending(), 1);
}

#[test]
fn destroy_releases_once_and_silences_everything() {
    let h = harness();
    h.engine.start();
    h.engine.destroy(false);
    h.engine.destroy(true);
    assert_eq!(h.engine.state(), TransitionState::Destroyed);
    assert_eq!(h.log.count(|op| *op == BackendOp::Release), 1);
    assert_eq!(h.log.count(|op| *op == BackendOp::Detach), 0);

    h.log.clear();
    h.engine.start();
    h.engine.reset();
    h.engine.render();
    h.engine.set_size(10, 10);
    h.engine.set_media(canvas(2, 2));
    assert!(h.engine.set_dissolve_edges(0.1, 0.3).is_ok());
    h.scheduler.run_until_idle(FRAME, 100);
    assert!(h.log.ops().is_empty());
    assert_eq!(h.ends.get(), 0);
    assert!(matches!(h.engine.snapshot(), Ok(None)));
}

#[test]
fn destroy_with_removal_shrinks_and_detaches() {
    let h = harness();
    h.engine.destroy(true);
    assert_eq!(
        h.log.ops(),
        vec![
            BackendOp::Resize {
                width: 1,
                height: 1
            },
            BackendOp::Release,
            BackendOp::Detach,
        ]
    );
}

#[test]
fn dropping_the_engine_destroys_it() {
    let h = harness();
    let log = h.log.clone();
    let scheduler = h.scheduler.clone();
    h.engine.start();
    drop(h);
    assert_eq!(log.count(|op| *op == BackendOp::Release), 1);
    log.clear();
    scheduler.run_until_idle(FRAME, 10);
    assert!(log.ops().is_empty());
}

#[test]
fn transition_end_listeners_can_be_removed() {
    let h = harness();
    let extra = Rc::new(Cell::new(0));
    let id = {
        let extra = extra.clone();
        h.engine.on_transition_end(move |_| extra.set(extra.get() + 1))
    };
    assert!(h.engine.has_listener(id));
    assert!(h.engine.remove_listener(id));
    assert!(!h.engine.has_listener(id));

    h.engine.set_duration(Duration::ZERO);
    h.engine.start();
    assert_eq!(extra.get(), 0);
    assert_eq!(h.ends.get(), 1);
}

#[test]
fn dissolve_edges_are_validated_and_forwarded() {
    let h = harness();
    assert!(matches!(
        h.engine.set_dissolve_edges(0.5, 0.5),
        Err(DissolveError::InvalidConfig(_))
    ));
    h.engine.set_dissolve_edges(0.1, 0.4).expect("edges");
    assert_eq!(h.engine.dissolve_edges(), (0.1, 0.4));
    assert!(h.log.ops().contains(&BackendOp::DissolveEdges {
        low: 0.1,
        high: 0.4
    }));
    assert_eq!(h.scheduler.pending(), 1);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = TransitionConfig {
        dissolve_low_edge: 0.3,
        dissolve_high_edge: 0.1,
        ..TransitionConfig::default()
    };
    let result = DissolveTransition::new(
        HeadlessBackend::new(10, 10),
        canvas(1, 1),
        canvas(1, 1),
        Rc::new(ManualScheduler::new()),
        &config,
    );
    assert!(matches!(result, Err(DissolveError::InvalidConfig(_))));
}
