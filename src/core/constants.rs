//! Engine-wide defaults for springs, tile selection, caching and loading.
//! Keeping them in a single place makes it easier to tweak the magic numbers.

/// Spring stiffness used by every animated value.
pub const DEFAULT_SPRING_STIFFNESS: f64 = 6.5;

/// Duration of a spring animation, in seconds.
pub const DEFAULT_ANIMATION_TIME: f64 = 1.2;

/// Fade-in duration for newly loaded tiles, in seconds (0 = no fade).
pub const DEFAULT_BLEND_TIME: f64 = 0.0;

/// Minimum screen pixels per image pixel before a level is worth drawing.
pub const DEFAULT_MIN_PIXEL_RATIO: f64 = 0.5;

/// Fraction of the home zoom the user may zoom out to.
pub const DEFAULT_MIN_ZOOM_IMAGE_RATIO: f64 = 0.9;

/// Screen pixels per image pixel allowed at maximum zoom.
pub const DEFAULT_MAX_ZOOM_PIXEL_RATIO: f64 = 1.1;

/// Fraction of the viewport that must keep overlapping the content.
pub const DEFAULT_VISIBILITY_RATIO: f64 = 0.5;

/// Resident decoded images shared by every layer.
pub const DEFAULT_MAX_IMAGE_CACHE_COUNT: usize = 200;

/// Concurrent loader jobs (0 = unbounded).
pub const DEFAULT_IMAGE_LOADER_LIMIT: usize = 0;

/// Time after which an in-flight job is failed, in milliseconds.
pub const DEFAULT_LOADER_TIMEOUT_MS: f64 = 30_000.0;

/// Delay without any view change before an animation is considered finished.
pub const DEFAULT_STOP_DELAY_MS: f64 = 50.0;

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Rows used when arranging several images into a collection grid.
pub const DEFAULT_COLLECTION_ROWS: usize = 3;

/// Cell size of the collection grid, in viewport units.
pub const DEFAULT_COLLECTION_TILE_SIZE: f64 = 800.0;

/// Gap between collection cells, in viewport units.
pub const DEFAULT_COLLECTION_TILE_MARGIN: f64 = 80.0;
