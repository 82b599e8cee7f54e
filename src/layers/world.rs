use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_COLLECTION_ROWS, DEFAULT_COLLECTION_TILE_MARGIN, DEFAULT_COLLECTION_TILE_SIZE,
};
use crate::core::geo::{Point, Rect};
use crate::events::{EventSink, ViewerEvent};
use crate::layers::tiled_image::TiledImage;
use crate::layers::FrameContext;
use crate::tiles::cache::TileCache;
use crate::tiles::tile::LayerId;
use crate::{Result, ViewerError};

/// Direction in which [`World::arrange`] fills its grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollectionLayout {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrangeOptions {
    pub immediately: bool,
    pub layout: CollectionLayout,
    pub rows: usize,
    /// Fixed number of columns; overrides `rows` when set
    pub columns: Option<usize>,
    pub tile_size: f64,
    pub tile_margin: f64,
}

impl Default for ArrangeOptions {
    fn default() -> Self {
        Self {
            immediately: false,
            layout: CollectionLayout::Horizontal,
            rows: DEFAULT_COLLECTION_ROWS,
            columns: None,
            tile_size: DEFAULT_COLLECTION_TILE_SIZE,
            tile_margin: DEFAULT_COLLECTION_TILE_MARGIN,
        }
    }
}

/// Ordered set of image layers, drawn back to front.
///
/// The world also tracks two aggregates the viewport depends on: the home
/// bounds (union of every layer's clipped bounds) and the content factor
/// (the highest image-pixels-per-viewport-unit of any layer).
#[derive(Debug)]
pub struct World {
    items: Vec<TiledImage>,
    events: EventSink,
    home_bounds: Rect,
    content_size: Point,
    content_factor: f64,
    metrics_changed: bool,
    needs_draw: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::new(EventSink::disabled())
    }
}

impl World {
    pub fn new(events: EventSink) -> Self {
        Self {
            items: Vec::new(),
            events,
            home_bounds: Rect::default(),
            content_size: Point::new(1.0, 1.0),
            content_factor: 1.0,
            metrics_changed: false,
            needs_draw: false,
        }
    }

    /// Inserts `item` at `index` (appends when `None` or past the end) and
    /// returns where it landed.
    pub fn add_item(&mut self, item: TiledImage, index: Option<usize>) -> usize {
        let index = index.unwrap_or(self.items.len()).min(self.items.len());
        let layer = item.id();
        self.items.insert(index, item);
        self.figure_sizes();
        self.needs_draw = true;
        log::debug!("added layer {} at index {}", layer.value(), index);
        self.events.emit(ViewerEvent::AddItem { layer, index });
        index
    }

    /// Removes and destroys the layer. Returns whether it was present.
    pub fn remove_item(&mut self, layer: LayerId, cache: &mut TileCache) -> bool {
        let Some(index) = self.index_of_item(layer) else {
            return false;
        };
        let mut item = self.items.remove(index);
        item.destroy(cache);
        self.figure_sizes();
        self.needs_draw = true;
        self.events.emit(ViewerEvent::RemoveItem { layer });
        true
    }

    pub fn remove_all(&mut self, cache: &mut TileCache) {
        for mut item in self.items.drain(..) {
            item.destroy(cache);
            self.events.emit(ViewerEvent::RemoveItem { layer: item.id() });
        }
        self.figure_sizes();
        self.needs_draw = true;
    }

    pub fn item_at(&self, index: usize) -> Option<&TiledImage> {
        self.items.get(index)
    }

    pub fn item(&self, layer: LayerId) -> Option<&TiledImage> {
        self.items.iter().find(|item| item.id() == layer)
    }

    /// Mutable access to a layer. Placement changes made through it are
    /// reflected in the world metrics on the next [`World::update`].
    pub fn item_mut(&mut self, layer: LayerId) -> Option<&mut TiledImage> {
        self.items.iter_mut().find(|item| item.id() == layer)
    }

    pub fn items(&self) -> impl Iterator<Item = &TiledImage> {
        self.items.iter()
    }

    pub fn index_of_item(&self, layer: LayerId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == layer)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Moves a layer in the draw order.
    pub fn set_item_index(&mut self, layer: LayerId, index: usize) -> Result<()> {
        if index >= self.items.len() {
            return Err(ViewerError::Layer(format!(
                "index {} is past the last of {} layers",
                index,
                self.items.len()
            )));
        }
        let Some(previous) = self.index_of_item(layer) else {
            return Ok(());
        };
        if previous == index {
            return Ok(());
        }
        let item = self.items.remove(previous);
        self.items.insert(index, item);
        self.needs_draw = true;
        self.events.emit(ViewerEvent::ItemIndexChange {
            layer,
            previous,
            index,
        });
        Ok(())
    }

    /// Throws away every layer's tiles, e.g. after the source changed.
    pub fn reset_items(&mut self, cache: &mut TileCache, now: f64) {
        for item in &mut self.items {
            item.reset(cache, now);
        }
        self.needs_draw = true;
    }

    /// Advances every layer's placement springs and refreshes the metrics.
    /// Returns whether any layer moved.
    pub fn update(&mut self) -> bool {
        let mut animated = false;
        for item in &mut self.items {
            animated |= item.update();
        }
        self.figure_sizes();
        animated
    }

    pub fn draw(&mut self, frame: &mut FrameContext<'_>) {
        for item in &mut self.items {
            item.draw(frame);
        }
        self.needs_draw = false;
    }

    pub fn needs_draw(&self) -> bool {
        self.needs_draw || self.items.iter().any(TiledImage::needs_draw)
    }

    pub fn home_bounds(&self) -> Rect {
        self.home_bounds
    }

    /// Image pixels per viewport unit, at the sharpest layer.
    pub fn content_factor(&self) -> f64 {
        self.content_factor
    }

    pub fn content_size(&self) -> Point {
        self.content_size
    }

    /// Whether the metrics changed since the last call.
    pub fn take_metrics_change(&mut self) -> bool {
        std::mem::take(&mut self.metrics_changed)
    }

    /// Lays the layers out in a grid of square cells, each image fit into
    /// its cell.
    pub fn arrange(&mut self, options: &ArrangeOptions) -> Result<()> {
        let increment = options.tile_size + options.tile_margin;
        let wrap = match options.columns {
            Some(columns) if columns > 0 => columns,
            _ => self.items.len().div_ceil(options.rows.max(1)).max(1),
        };

        let (mut x, mut y) = (0.0, 0.0);
        for (index, item) in self.items.iter_mut().enumerate() {
            if index > 0 && index % wrap == 0 {
                match options.layout {
                    CollectionLayout::Horizontal => {
                        y += increment;
                        x = 0.0;
                    }
                    CollectionLayout::Vertical => {
                        x += increment;
                        y = 0.0;
                    }
                }
            }

            let bounds = item.bounds(false);
            let width = if bounds.width > bounds.height {
                options.tile_size
            } else {
                options.tile_size * (bounds.width / bounds.height)
            };
            let height = width * (bounds.height / bounds.width);
            let position = Point::new(
                x + (options.tile_size - width) / 2.0,
                y + (options.tile_size - height) / 2.0,
            );
            item.set_position(position, options.immediately)?;
            item.set_width(width, options.immediately)?;

            match options.layout {
                CollectionLayout::Horizontal => x += increment,
                CollectionLayout::Vertical => y += increment,
            }
        }
        self.figure_sizes();
        self.needs_draw = true;
        Ok(())
    }

    fn figure_sizes(&mut self) {
        let (home_bounds, content_factor) = match self.items.split_first() {
            None => (Rect::default(), 1.0),
            Some((first, rest)) => {
                let mut factor = first.content_size().x / first.bounds_no_rotate(false).width;
                let mut union = first.clipped_bounds(false).bounding_box();
                for item in rest {
                    factor = factor.max(item.content_size().x / item.bounds_no_rotate(false).width);
                    union = union.union(&item.clipped_bounds(false));
                }
                (union, factor)
            }
        };
        let content_size = home_bounds.size().multiply(content_factor);

        if home_bounds != self.home_bounds
            || content_factor != self.content_factor
            || content_size != self.content_size
        {
            self.home_bounds = home_bounds;
            self.content_factor = content_factor;
            self.content_size = content_size;
            self.metrics_changed = true;
            self.events.emit(ViewerEvent::MetricsChange {
                home_bounds,
                content_factor,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::config::LayerOptions;
    use crate::tiles::source::TileSource;

    fn image(clock: &ManualClock, x: f64, width: u32, height: u32) -> TiledImage {
        let source = TileSource::deep_zoom("http://img/a", "jpg", width, height, 256, 1).unwrap();
        TiledImage::new(
            source,
            LayerOptions {
                x,
                ..Default::default()
            },
            clock.shared(),
            EventSink::disabled(),
        )
        .unwrap()
    }

    #[test]
    fn test_metrics_follow_items() {
        let clock = ManualClock::new(0.0);
        let (events, received) = EventSink::channel();
        let mut world = World::new(events);
        assert_eq!(world.home_bounds(), Rect::new(0.0, 0.0, 1.0, 1.0));

        world.add_item(image(&clock, 0.0, 1000, 500), None);
        world.add_item(image(&clock, 2.0, 4000, 4000), None);
        assert_eq!(world.home_bounds(), Rect::new(0.0, 0.0, 3.0, 1.0));
        assert_eq!(world.content_factor(), 4000.0);
        assert!(world.take_metrics_change());
        assert!(!world.take_metrics_change());

        let metrics = received
            .try_iter()
            .filter(|event| matches!(event, ViewerEvent::MetricsChange { .. }))
            .count();
        assert_eq!(metrics, 2);
    }

    #[test]
    fn test_item_order() {
        let clock = ManualClock::new(0.0);
        let mut world = World::default();
        let a = world.add_item(image(&clock, 0.0, 100, 100), None);
        let b = world.add_item(image(&clock, 1.0, 100, 100), Some(0));
        assert_eq!((a, b), (0, 0));

        let first = world.item_at(0).map(TiledImage::id).unwrap();
        let second = world.item_at(1).map(TiledImage::id).unwrap();
        world.set_item_index(first, 1).unwrap();
        assert_eq!(world.index_of_item(first), Some(1));
        assert_eq!(world.index_of_item(second), Some(0));
        assert!(world.set_item_index(first, 2).is_err());
    }

    #[test]
    fn test_remove_destroys_and_refigures() {
        let clock = ManualClock::new(0.0);
        let mut cache = TileCache::new(10);
        let mut world = World::default();
        world.add_item(image(&clock, 0.0, 100, 100), None);
        let far = image(&clock, 5.0, 100, 100);
        let far_id = far.id();
        world.add_item(far, None);
        assert_eq!(world.home_bounds().width, 6.0);

        assert!(world.remove_item(far_id, &mut cache));
        assert!(!world.remove_item(far_id, &mut cache));
        assert_eq!(world.item_count(), 1);
        assert_eq!(world.home_bounds(), Rect::new(0.0, 0.0, 1.0, 1.0));

        world.remove_all(&mut cache);
        assert_eq!(world.item_count(), 0);
    }

    #[test]
    fn test_arrange_grid() {
        let clock = ManualClock::new(0.0);
        let mut world = World::default();
        for _ in 0..4 {
            world.add_item(image(&clock, 0.0, 200, 100), None);
        }
        world
            .arrange(&ArrangeOptions {
                immediately: true,
                rows: 2,
                tile_size: 1.0,
                tile_margin: 0.5,
                ..Default::default()
            })
            .unwrap();

        // Two per row, wide images centered vertically in their cell
        let bounds: Vec<Rect> = world.items().map(|item| item.bounds(true)).collect();
        assert_eq!(bounds[0], Rect::new(0.0, 0.25, 1.0, 0.5));
        assert_eq!(bounds[1], Rect::new(1.5, 0.25, 1.0, 0.5));
        assert_eq!(bounds[2], Rect::new(0.0, 1.75, 1.0, 0.5));
        assert_eq!(world.home_bounds(), Rect::new(0.0, 0.25, 2.5, 2.0));
    }

    #[test]
    fn test_update_reports_animation() {
        let clock = ManualClock::new(0.0);
        let mut world = World::default();
        world.add_item(image(&clock, 0.0, 100, 100), None);
        let id = world.item_at(0).map(TiledImage::id).unwrap();
        world.take_metrics_change();

        world
            .item_mut(id)
            .unwrap()
            .set_position(Point::new(1.0, 0.0), false)
            .unwrap();
        clock.advance(100.0);
        assert!(world.update());
        assert!(world.needs_draw());
        assert!(world.take_metrics_change());

        clock.advance(10_000.0);
        world.update();
        assert!(!world.update());
    }
}
