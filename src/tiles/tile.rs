use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::geo::{Point, Rect};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an image layer, unique for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    pub fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Grid position of a tile. Columns and rows are signed because wrapped
/// layers address tiles outside the source grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub level: u32,
    pub x: i64,
    pub y: i64,
}

impl TileKey {
    pub fn new(level: u32, x: i64, y: i64) -> Self {
        Self { level, x, y }
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}_{}", self.level, self.x, self.y)
    }
}

/// A tile as seen by the process-wide cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub layer: LayerId,
    pub key: TileKey,
}

/// Decoded tile payload. Cloning shares the pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
}

impl TileImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Arc::new(data),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// One cell of a layer's pyramid together with its per-frame render state.
#[derive(Debug, Clone)]
pub struct Tile {
    pub key: TileKey,
    /// Bounds in the layer's normalized space (layer width is 1)
    pub bounds: Rect,
    pub exists: bool,
    pub url: String,
    /// Content address shared by every tile showing the same image
    pub cache_key: String,
    pub loaded: bool,
    pub loading: bool,
    pub image: Option<TileImage>,
    /// Top-left corner in container pixels, before viewport rotation
    pub position: Point,
    pub size: Point,
    pub blend_start: Option<f64>,
    pub opacity: f64,
    pub squared_distance: f64,
    pub visibility: f64,
    pub being_drawn: bool,
    pub last_touch_time: f64,
}

impl Tile {
    pub fn new(key: TileKey, bounds: Rect, exists: bool, url: String, cache_key: String) -> Self {
        Self {
            key,
            bounds,
            exists,
            url,
            cache_key,
            loaded: false,
            loading: false,
            image: None,
            position: Point::default(),
            size: Point::default(),
            blend_start: None,
            opacity: 0.0,
            squared_distance: 0.0,
            visibility: 0.0,
            being_drawn: false,
            last_touch_time: 0.0,
        }
    }

    pub fn id(&self, layer: LayerId) -> TileId {
        TileId {
            layer,
            key: self.key,
        }
    }

    /// Loaded and holding pixels that can be drawn.
    pub fn is_ready(&self) -> bool {
        self.loaded && self.image.is_some()
    }

    /// Releases the pixels; the tile stays in its layer's matrix and may be
    /// requested again.
    pub fn unload(&mut self) {
        self.image = None;
        self.loaded = false;
        self.loading = false;
        self.blend_start = None;
        self.opacity = 0.0;
    }
}

impl std::fmt::Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unload_resets_render_state() {
        let mut tile = Tile::new(
            TileKey::new(3, 1, 2),
            Rect::new(0.0, 0.0, 0.5, 0.5),
            true,
            "a.png".to_string(),
            "a.png".to_string(),
        );
        tile.loaded = true;
        tile.image = Some(TileImage::new(1, 1, vec![0, 0, 0, 255]));
        tile.blend_start = Some(10.0);
        assert!(tile.is_ready());

        tile.unload();
        assert!(!tile.is_ready());
        assert!(tile.blend_start.is_none());
        assert!(tile.exists);
    }

    #[test]
    fn test_layer_ids_are_unique() {
        assert_ne!(LayerId::next(), LayerId::next());
    }
}
