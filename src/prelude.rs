//! Prelude module for common zoomlet types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use zoomlet::prelude::*;`

pub use crate::core::{
    builder::ViewerBuilder,
    clock::{Clock, ManualClock, SharedClock, SystemClock},
    config::{
        CacheOptions, LayerOptions, LoaderOptions, Margins, PerformanceProfile, ViewerOptions,
        ViewportOptions,
    },
    geo::{Point, Rect},
    viewer::{Debounce, Viewer},
    viewport::Viewport,
};

pub use crate::animation::spring::{AnimationValue, SpringOptions};

pub use crate::events::{EventSink, ViewerEvent};

pub use crate::layers::{
    coverage::CoverageMap,
    tiled_image::{Placement, TiledImage},
    world::{ArrangeOptions, World},
    FrameContext,
};

pub use crate::rendering::drawer::{BlendOptions, DrawCommand, Drawer, RecordingDrawer};

pub use crate::tiles::{
    cache::{ImageRecord, TileCache},
    loader::{
        Completer, ImageLoader, ImmediateFetcher, LoadCompletion, LoadHandle, LoadRequest,
        ManualFetcher, TileFetcher,
    },
    source::{SourceFormat, TileGrid, TileSource},
    tile::{LayerId, Tile, TileId, TileImage, TileKey},
};

pub use crate::{Result, ViewerError};

// Fast hash collections used for tile matrices, coverage and image records
pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
