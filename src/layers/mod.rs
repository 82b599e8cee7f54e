pub mod coverage;
pub mod tiled_image;
pub mod world;

pub use coverage::CoverageMap;
pub use tiled_image::{Placement, TiledImage};
pub use world::{ArrangeOptions, World};

use crate::core::viewport::Viewport;
use crate::rendering::drawer::Drawer;
use crate::tiles::{cache::TileCache, loader::ImageLoader};

/// Collaborators a layer needs for one update-and-draw pass.
///
/// The viewer owns all of them and lends them out for the duration of a
/// frame, so layers never hold references to shared state.
pub struct FrameContext<'a> {
    pub viewport: &'a Viewport,
    pub cache: &'a mut TileCache,
    pub loader: &'a mut ImageLoader,
    pub drawer: &'a mut dyn Drawer,
    /// Frame time in milliseconds
    pub now: f64,
}
