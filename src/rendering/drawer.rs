//! Draw target abstraction.
//!
//! The engine decides which tiles to draw, where and how opaque; a [`Drawer`]
//! only puts them on a surface. [`RecordingDrawer`] keeps the commands in a
//! queue, which is what headless hosts and tests look at.

use crate::core::geo::{Point, Rect};
use crate::tiles::tile::{LayerId, Tile, TileKey};

/// Per-draw parameters coming from the layer and the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendOptions {
    pub layer: LayerId,
    /// Layer opacity; the tile's own opacity is multiplied in by the drawer
    pub opacity: f64,
    /// Viewport rotation
    pub degrees: f64,
    /// Layer rotation on top of the viewport's
    pub layer_degrees: f64,
    /// Clip region in viewer-element pixels
    pub clip: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Clear a region, or the whole surface
    Clear { region: Option<Rect> },
    Tile {
        layer: LayerId,
        key: TileKey,
        cache_key: String,
        position: Point,
        size: Point,
        opacity: f64,
        degrees: f64,
        clip: Option<Rect>,
    },
}

pub trait Drawer {
    fn draw_tile(&mut self, tile: &Tile, options: &BlendOptions);

    fn clear(&mut self, region: Option<Rect>);

    /// Drawing surface size in pixels
    fn canvas_size(&self) -> Point;

    /// Called when the container changes size.
    fn resize(&mut self, size: Point);
}

/// Keeps the commands of the current frame: a full clear drops the queue.
#[derive(Debug, Clone)]
pub struct RecordingDrawer {
    size: Point,
    drawing_queue: Vec<DrawCommand>,
}

impl RecordingDrawer {
    pub fn new(size: Point) -> Self {
        Self {
            size,
            drawing_queue: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.drawing_queue
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.drawing_queue)
    }

    /// Tiles drawn since the last clear, in draw order
    pub fn tiles_drawn(&self) -> Vec<(LayerId, TileKey, f64)> {
        let start = self
            .drawing_queue
            .iter()
            .rposition(|command| matches!(command, DrawCommand::Clear { region: None }))
            .map_or(0, |index| index + 1);
        self.drawing_queue[start..]
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Tile {
                    layer,
                    key,
                    opacity,
                    ..
                } => Some((*layer, *key, *opacity)),
                DrawCommand::Clear { .. } => None,
            })
            .collect()
    }
}

impl Drawer for RecordingDrawer {
    fn draw_tile(&mut self, tile: &Tile, options: &BlendOptions) {
        let opacity = tile.opacity * options.opacity;
        if opacity <= 0.0 {
            return;
        }
        self.drawing_queue.push(DrawCommand::Tile {
            layer: options.layer,
            key: tile.key,
            cache_key: tile.cache_key.clone(),
            position: tile.position,
            size: tile.size,
            opacity,
            degrees: options.degrees + options.layer_degrees,
            clip: options.clip,
        });
    }

    fn clear(&mut self, region: Option<Rect>) {
        // A full clear starts a new frame; earlier commands are no longer visible
        if region.is_none() {
            self.drawing_queue.clear();
        }
        self.drawing_queue.push(DrawCommand::Clear { region });
    }

    fn canvas_size(&self) -> Point {
        self.size
    }

    fn resize(&mut self, size: Point) {
        self.size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawn_tile(level: u32, opacity: f64) -> Tile {
        let mut tile = Tile::new(
            TileKey::new(level, 0, 0),
            Rect::new(0.0, 0.0, 1.0, 1.0),
            true,
            format!("t{}", level),
            format!("t{}", level),
        );
        tile.opacity = opacity;
        tile.size = Point::new(256.0, 256.0);
        tile
    }

    #[test]
    fn test_recording_multiplies_opacity() {
        let layer = LayerId::next();
        let mut drawer = RecordingDrawer::new(Point::new(800.0, 600.0));
        let options = BlendOptions {
            layer,
            opacity: 0.5,
            degrees: 0.0,
            layer_degrees: 0.0,
            clip: None,
        };
        drawer.draw_tile(&drawn_tile(3, 0.5), &options);
        drawer.draw_tile(&drawn_tile(4, 0.0), &options);

        let drawn = drawer.tiles_drawn();
        assert_eq!(drawn.len(), 1);
        assert!((drawn[0].2 - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_tiles_drawn_since_last_clear() {
        let layer = LayerId::next();
        let mut drawer = RecordingDrawer::new(Point::new(10.0, 10.0));
        let options = BlendOptions {
            layer,
            opacity: 1.0,
            degrees: 0.0,
            layer_degrees: 0.0,
            clip: None,
        };
        drawer.draw_tile(&drawn_tile(1, 1.0), &options);
        drawer.clear(None);
        drawer.draw_tile(&drawn_tile(2, 1.0), &options);

        let drawn = drawer.tiles_drawn();
        assert_eq!(drawn, vec![(layer, TileKey::new(2, 0, 0), 1.0)]);
        assert_eq!(drawer.take_commands().len(), 2);
        assert!(drawer.commands().is_empty());
    }

    #[test]
    fn test_full_clear_bounds_the_queue() {
        let layer = LayerId::next();
        let mut drawer = RecordingDrawer::new(Point::new(10.0, 10.0));
        let options = BlendOptions {
            layer,
            opacity: 1.0,
            degrees: 0.0,
            layer_degrees: 0.0,
            clip: None,
        };
        for _ in 0..1_000 {
            drawer.clear(None);
            drawer.draw_tile(&drawn_tile(1, 1.0), &options);
            drawer.draw_tile(&drawn_tile(2, 1.0), &options);
        }
        assert_eq!(drawer.commands().len(), 3);

        // Partial clears are part of the frame
        drawer.clear(Some(Rect::new(0.0, 0.0, 5.0, 5.0)));
        drawer.draw_tile(&drawn_tile(3, 1.0), &options);
        assert_eq!(drawer.commands().len(), 5);
        assert_eq!(drawer.tiles_drawn().len(), 3);
    }
}
