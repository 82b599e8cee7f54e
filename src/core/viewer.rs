//! Frame driver tying viewport, world, cache, loader and drawer together.
//!
//! The host calls [`Viewer::tick`] once per display frame. A tick applies
//! finished loads, advances every animation, keeps the viewport in sync with
//! the world metrics and redraws when anything changed.

use crate::core::clock::SharedClock;
use crate::core::config::{LayerOptions, ViewerOptions};
use crate::core::geo::Point;
use crate::core::viewport::Viewport;
use crate::events::{EventSink, ViewerEvent};
use crate::layers::tiled_image::TiledImage;
use crate::layers::world::World;
use crate::layers::FrameContext;
use crate::rendering::drawer::{Drawer, RecordingDrawer};
use crate::tiles::cache::TileCache;
use crate::tiles::loader::{ImageLoader, TileFetcher};
use crate::tiles::source::TileSource;
use crate::tiles::tile::LayerId;
use crate::Result;

/// One-shot cancellable timer, polled from the frame loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Debounce {
    deadline: Option<f64>,
}

impl Debounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)starts the timer to fire `delay_ms` after `now`.
    pub fn arm(&mut self, now: f64, delay_ms: f64) {
        self.deadline = Some(now + delay_ms);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns true exactly once, on the first poll at or after the deadline.
    pub fn poll(&mut self, now: f64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Viewer<D: Drawer = RecordingDrawer> {
    options: ViewerOptions,
    clock: SharedClock,
    events: EventSink,
    viewport: Viewport,
    world: World,
    cache: TileCache,
    loader: ImageLoader,
    drawer: D,
    stop_timer: Debounce,
    animating: bool,
    force_redraw: bool,
    frames: u64,
}

impl<D: Drawer> Viewer<D> {
    pub fn new(
        container_size: Point,
        options: ViewerOptions,
        drawer: D,
        fetcher: Box<dyn TileFetcher>,
        clock: SharedClock,
        events: EventSink,
    ) -> Result<Self> {
        let viewport = Viewport::new(container_size, options.viewport.clone(), clock.clone())?;
        let cache = TileCache::with_options(&options.cache).with_events(events.clone());
        let loader = ImageLoader::with_options(fetcher, &options.loader);
        let world = World::new(events.clone());
        log::info!(
            "viewer created: {}x{} container, cache of {} images",
            container_size.x,
            container_size.y,
            options.cache.max_image_cache_count
        );
        Ok(Self {
            options,
            clock,
            events,
            viewport,
            world,
            cache,
            loader,
            drawer,
            stop_timer: Debounce::new(),
            animating: false,
            force_redraw: false,
            frames: 0,
        })
    }

    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    pub fn drawer(&self) -> &D {
        &self.drawer
    }

    pub fn drawer_mut(&mut self) -> &mut D {
        &mut self.drawer
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Ticks run so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    /// Whether every layer has all its wanted tiles.
    pub fn is_fully_loaded(&self) -> bool {
        self.world.items().all(TiledImage::fully_loaded)
    }

    pub fn layer(&self, layer: LayerId) -> Option<&TiledImage> {
        self.world.item(layer)
    }

    pub fn layer_mut(&mut self, layer: LayerId) -> Option<&mut TiledImage> {
        self.world.item_mut(layer)
    }

    /// Adds a layer with the viewer's default layer options.
    pub fn open(&mut self, source: TileSource) -> Result<LayerId> {
        let options = self.options.layer.clone();
        self.add_layer(source, options, None)
    }

    /// Adds a layer at `index` in the draw order. The first layer also
    /// sends the viewport home.
    pub fn add_layer(
        &mut self,
        source: TileSource,
        options: LayerOptions,
        index: Option<usize>,
    ) -> Result<LayerId> {
        let item = TiledImage::new(source, options, self.clock.clone(), self.events.clone())?;
        let id = item.id();
        self.world.add_item(item, index);
        self.sync_metrics();
        if self.world.item_count() == 1 {
            self.viewport.go_home(true)?;
        }
        Ok(id)
    }

    pub fn remove_layer(&mut self, layer: LayerId) -> bool {
        let removed = self.world.remove_item(layer, &mut self.cache);
        self.sync_metrics();
        removed
    }

    /// Drops every layer's tiles so they are fetched again.
    pub fn reset(&mut self) {
        self.loader.clear();
        let now = self.clock.now_ms();
        self.world.reset_items(&mut self.cache, now);
        self.force_redraw = true;
    }

    pub fn resize(&mut self, size: Point, maintain: bool) -> Result<()> {
        self.viewport.resize(size, maintain)?;
        self.drawer.resize(size);
        self.force_redraw = true;
        log::debug!("container resized to {}x{}", size.x, size.y);
        Ok(())
    }

    fn sync_metrics(&mut self) {
        if self.world.take_metrics_change() {
            self.viewport
                .set_content_bounds(self.world.home_bounds(), self.world.content_factor());
        }
    }

    /// Runs one frame. Returns whether it drew.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now_ms();

        for completion in self.loader.poll(now) {
            let layer = completion.request.tile.layer;
            match self.world.item_mut(layer) {
                Some(item) => item.on_load_complete(completion, &mut self.cache),
                None => log::debug!(
                    "dropping load of {} for removed layer {}",
                    completion.request.url,
                    layer.value()
                ),
            }
        }

        let viewport_changed = self.viewport.update();
        let world_animated = self.world.update();
        self.sync_metrics();
        let animated = viewport_changed || world_animated;
        self.track_animation(animated, now);

        let draw = animated || self.force_redraw || self.world.needs_draw();
        if draw {
            self.force_redraw = false;
            self.drawer.clear(None);
            let mut frame = FrameContext {
                viewport: &self.viewport,
                cache: &mut self.cache,
                loader: &mut self.loader,
                drawer: &mut self.drawer,
                now,
            };
            self.world.draw(&mut frame);
        }
        self.frames += 1;
        draw
    }

    /// Start is reported on the first animated frame; finish once no frame
    /// has animated for the stop delay.
    fn track_animation(&mut self, animated: bool, now: f64) {
        if animated {
            self.stop_timer.cancel();
            if !self.animating {
                self.animating = true;
                self.events.emit(ViewerEvent::AnimationStart);
            }
            return;
        }
        if self.animating && !self.stop_timer.is_armed() {
            self.stop_timer.arm(now, self.options.stop_delay_ms);
        }
        if self.stop_timer.poll(now) {
            self.animating = false;
            self.events.emit(ViewerEvent::AnimationFinish);
        }
    }
}
