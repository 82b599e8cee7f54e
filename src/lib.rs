//! # Zoomlet
//!
//! A tile-pyramid scheduling and caching engine for deep-zoom image viewers.
//!
//! Given a viewport (pan, zoom and rotation), zoomlet decides which pyramid
//! levels and tiles each image layer shows, tracks which parts of the screen
//! are already covered by loaded tiles, requests missing tiles through a
//! pluggable fetcher, fades new tiles in and evicts decoded images from a
//! bounded cache shared by all layers.
//!
//! Everything runs on one thread, driven by [`Viewer::tick`]. Drawing,
//! transport and decoding are collaborators behind the [`Drawer`] and
//! [`TileFetcher`] traits.

pub mod animation;
pub mod core;
pub mod events;
pub mod layers;
pub mod prelude;
pub mod rendering;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    builder::ViewerBuilder,
    clock::{Clock, ManualClock, SharedClock, SystemClock},
    config::{PerformanceProfile, ViewerOptions},
    geo::{Point, Rect},
    viewer::Viewer,
    viewport::Viewport,
};

pub use animation::spring::AnimationValue;

pub use events::{EventSink, ViewerEvent};

pub use layers::{tiled_image::TiledImage, world::World};

pub use rendering::drawer::{Drawer, RecordingDrawer};

pub use tiles::{
    cache::TileCache,
    loader::{ImageLoader, TileFetcher},
    source::TileSource,
    tile::Tile,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, ViewerError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid tile source: {0}")]
    InvalidSource(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Load timed out after {0} ms")]
    Timeout(f64),

    #[error("Load aborted")]
    Aborted,
}

/// Error type alias for convenience
pub type Error = ViewerError;

/// Installs `env_logger` as the `log` backend. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(cfg!(test)).try_init();
}
