pub mod cache;
pub mod loader;
pub mod source;
pub mod tile;

pub use cache::{ImageRecord, TileCache};
pub use loader::{
    Completer, ImageLoader, ImmediateFetcher, LoadCompletion, LoadHandle, LoadRequest,
    ManualFetcher, TileFetcher,
};
pub use source::{SourceFormat, TileGrid, TileSource};
pub use tile::{LayerId, Tile, TileId, TileImage, TileKey};
