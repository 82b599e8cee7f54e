use anyhow::{Context, Result};
use zoomlet::{
    constants::TILE_SIZE,
    prelude::*,
};

const FRAME_MS: f64 = 16.0;

/// One step of the scripted session
enum Step {
    ZoomBy(f64, Point),
    PanTo(Point),
    Rotate(f64),
    Home,
}

/// Headless deep-zoom session: opens a synthetic gigapixel-style pyramid,
/// plays a scripted zoom and pan, and reports what the engine did.
fn main() -> Result<()> {
    env_logger::init();

    let container = Point::new(1280.0, 800.0);
    let clock = ManualClock::new(0.0);
    let (events, received) = EventSink::channel();
    let source =
        TileSource::deep_zoom("https://tiles.example/slide", "jpg", 60_000, 40_000, TILE_SIZE, 1)
            .context("invalid synthetic source")?;

    let mut viewer = ViewerBuilder::new()
        .with_container_size(container)
        .with_performance(PerformanceProfile::Balanced)
        .with_clock(clock.shared())
        .with_events(events)
        .with_fetcher(Box::new(ImmediateFetcher::new(TILE_SIZE)))
        .build()
        .context("could not build viewer")?;

    let layer = viewer.open(source)?;
    log::info!("opened layer {}", layer.value());

    let script = [
        Step::ZoomBy(4.0, Point::new(0.3, 0.2)),
        Step::PanTo(Point::new(0.6, 0.4)),
        Step::ZoomBy(8.0, Point::new(0.6, 0.4)),
        Step::Rotate(30.0),
        Step::Home,
    ];

    settle(&mut viewer, &clock, "open");
    for step in script {
        let label = match step {
            Step::ZoomBy(factor, point) => {
                viewer.viewport_mut().zoom_by(factor, Some(point), false)?;
                "zoom"
            }
            Step::PanTo(center) => {
                viewer.viewport_mut().pan_to(center, false)?;
                "pan"
            }
            Step::Rotate(degrees) => {
                viewer.viewport_mut().set_rotation(degrees);
                "rotate"
            }
            Step::Home => {
                viewer.viewport_mut().go_home(false)?;
                "home"
            }
        };
        viewer.viewport_mut().apply_constraints(false)?;
        settle(&mut viewer, &clock, label);
    }

    let mut loaded = 0;
    let mut failed = 0;
    let mut unloaded = 0;
    for event in received.try_iter() {
        match event {
            ViewerEvent::TileLoaded { .. } => loaded += 1,
            ViewerEvent::TileLoadFailed { .. } => failed += 1,
            ViewerEvent::TileUnloaded { .. } => unloaded += 1,
            _ => {}
        }
    }
    println!(
        "frames {}: {} tiles loaded, {} failed, {} evicted",
        viewer.frame_count(),
        loaded,
        failed,
        unloaded
    );
    Ok(())
}

/// Ticks until the view stops moving and every wanted tile is in.
fn settle(viewer: &mut Viewer, clock: &ManualClock, label: &str) {
    let start = viewer.frame_count();
    let mut draws = 0;
    while viewer.frame_count() - start < 2_000 {
        clock.advance(FRAME_MS);
        if viewer.tick() {
            draws += 1;
        }
        if viewer.is_fully_loaded() && !viewer.is_animating() {
            break;
        }
    }
    let tiles = viewer.drawer().tiles_drawn().len();
    println!(
        "{:<7} zoom {:>7.3}  frames {:>4}  redraws {:>4}  on screen {:>4}  \
         cache {:>4} images / {:>4} tiles",
        label,
        viewer.viewport().zoom(true),
        viewer.frame_count() - start,
        draws,
        tiles,
        viewer.cache().num_images_loaded(),
        viewer.cache().num_tiles_loaded()
    );
}
