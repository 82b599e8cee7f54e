use crate::core::config::CacheOptions;
use crate::events::{EventSink, ViewerEvent};
use crate::prelude::HashMap;
use crate::tiles::tile::{LayerId, Tile, TileId, TileImage, TileKey};

/// Decoded image shared by every tile with the same cache key
#[derive(Debug, Clone)]
pub struct ImageRecord {
    image: TileImage,
    tiles: Vec<TileId>,
}

impl ImageRecord {
    fn new(image: TileImage) -> Self {
        Self {
            image,
            tiles: Vec::new(),
        }
    }

    pub fn image(&self) -> &TileImage {
        &self.image
    }

    pub fn tiles(&self) -> &[TileId] {
        &self.tiles
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    fn add_tile(&mut self, tile: TileId) {
        if !self.tiles.contains(&tile) {
            self.tiles.push(tile);
        }
    }

    fn remove_tile(&mut self, tile: &TileId) {
        self.tiles.retain(|t| t != tile);
    }
}

/// Eviction-relevant state of a resident tile, kept in sync by the owning
/// layer through [`TileCache::touch`] and [`TileCache::set_being_drawn`].
#[derive(Debug, Clone)]
struct CacheRecord {
    cache_key: String,
    level: u32,
    last_touch_time: f64,
    being_drawn: bool,
}

/// Bounded store of decoded tile images shared by all layers of a viewer.
///
/// The bound counts distinct images, not tiles: several tiles may alias one
/// image. When an insert pushes the count over the limit, one tile is
/// evicted (stale and detailed first). Tiles drawn this frame and tiles at
/// or below the insert's cutoff level are never evicted, so the bound may be
/// exceeded when everything is protected.
#[derive(Debug)]
pub struct TileCache {
    /// Resident tiles in insertion order
    order: Vec<TileId>,
    records: HashMap<TileId, CacheRecord>,
    images: HashMap<String, ImageRecord>,
    max_image_cache_count: usize,
    /// Evicted tiles whose layer still has to release them
    unloaded: HashMap<LayerId, Vec<TileKey>>,
    last_touch: f64,
    events: EventSink,
}

impl TileCache {
    pub fn new(max_image_cache_count: usize) -> Self {
        Self {
            order: Vec::new(),
            records: HashMap::default(),
            images: HashMap::default(),
            max_image_cache_count,
            unloaded: HashMap::default(),
            last_touch: f64::NEG_INFINITY,
            events: EventSink::disabled(),
        }
    }

    pub fn with_options(options: &CacheOptions) -> Self {
        Self::new(options.max_image_cache_count)
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn max_image_cache_count(&self) -> usize {
        self.max_image_cache_count
    }

    pub fn num_tiles_loaded(&self) -> usize {
        self.order.len()
    }

    pub fn num_images_loaded(&self) -> usize {
        self.images.len()
    }

    pub fn image_record(&self, cache_key: &str) -> Option<&ImageRecord> {
        self.images.get(cache_key)
    }

    pub fn contains(&self, tile: &TileId) -> bool {
        self.records.contains_key(tile)
    }

    /// Stores `image` for `tile`, or attaches the tile to the image already
    /// cached under its key, then evicts if the image bound is exceeded.
    /// Tiles at level `cutoff` or below are not eviction candidates.
    pub fn cache_tile(&mut self, tile: &Tile, layer: LayerId, image: TileImage, cutoff: u32) {
        let id = tile.id(layer);
        self.images
            .entry(tile.cache_key.clone())
            .or_insert_with(|| ImageRecord::new(image))
            .add_tile(id);

        if let Some(record) = self.records.get_mut(&id) {
            record.last_touch_time = record.last_touch_time.max(tile.last_touch_time);
            record.being_drawn = tile.being_drawn;
            return;
        }

        let mut insert_at = self.order.len();
        if self.images.len() > self.max_image_cache_count {
            match self.find_victim(cutoff) {
                Some(index) => {
                    let victim = self.order.remove(index);
                    log::debug!(
                        "evicting tile {} of layer {}",
                        victim.key,
                        victim.layer.value()
                    );
                    self.unload_tile(victim, true);
                    insert_at = index;
                }
                None => log::debug!(
                    "no evictable tile, cache holds {} images",
                    self.images.len()
                ),
            }
        }

        self.order.insert(insert_at, id);
        self.records.insert(
            id,
            CacheRecord {
                cache_key: tile.cache_key.clone(),
                level: tile.key.level,
                last_touch_time: tile.last_touch_time,
                being_drawn: tile.being_drawn,
            },
        );
    }

    /// Scans from the newest record back, returning the index of the tile
    /// touched longest ago; ties go to the higher level.
    fn find_victim(&self, cutoff: u32) -> Option<usize> {
        let mut worst: Option<(usize, &CacheRecord)> = None;
        for (index, id) in self.order.iter().enumerate().rev() {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if record.level <= cutoff || record.being_drawn {
                continue;
            }
            let replace = match worst {
                None => true,
                Some((_, current)) => {
                    record.last_touch_time < current.last_touch_time
                        || (record.last_touch_time == current.last_touch_time
                            && record.level > current.level)
                }
            };
            if replace {
                worst = Some((index, record));
            }
        }
        worst.map(|(index, _)| index)
    }

    fn unload_tile(&mut self, id: TileId, notify_layer: bool) {
        let Some(record) = self.records.remove(&id) else {
            return;
        };
        if let Some(image) = self.images.get_mut(&record.cache_key) {
            image.remove_tile(&id);
            if image.tiles.is_empty() {
                self.images.remove(&record.cache_key);
                log::debug!("released image {}", record.cache_key);
            }
        }
        if notify_layer {
            self.unloaded.entry(id.layer).or_default().push(id.key);
        }
        self.events.emit(ViewerEvent::TileUnloaded { tile: id });
    }

    /// Records a use of `tile` and returns the stamp stored for it. Stamps
    /// never decrease across layers.
    pub fn touch(&mut self, tile: &TileId, now: f64) -> f64 {
        let stamp = now.max(self.last_touch);
        self.last_touch = stamp;
        if let Some(record) = self.records.get_mut(tile) {
            record.last_touch_time = stamp;
        }
        stamp
    }

    pub fn set_being_drawn(&mut self, tile: &TileId, being_drawn: bool) {
        if let Some(record) = self.records.get_mut(tile) {
            record.being_drawn = being_drawn;
        }
    }

    /// Evicted tiles of `layer` not yet released by it.
    pub fn take_unloaded(&mut self, layer: LayerId) -> Vec<TileKey> {
        self.unloaded.remove(&layer).unwrap_or_default()
    }

    /// Drops every tile owned by `layer`.
    pub fn clear_tiles_for(&mut self, layer: LayerId) {
        let owned: Vec<TileId> = self
            .order
            .iter()
            .filter(|id| id.layer == layer)
            .copied()
            .collect();
        self.order.retain(|id| id.layer != layer);
        for id in owned {
            self.unload_tile(id, false);
        }
        self.unloaded.remove(&layer);
    }
}
