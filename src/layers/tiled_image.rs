//! One image pyramid placed in the world.
//!
//! Every frame the layer walks its pyramid from the most detailed useful
//! level down, decides which tiles to draw, blends loaded tiles in, and asks
//! the loader for at most one missing tile. Coverage maps let it stop as
//! soon as a level paints the whole visible area.

use serde::{Deserialize, Serialize};

use crate::animation::spring::{AnimationValue, SpringOptions};
use crate::core::clock::SharedClock;
use crate::core::config::LayerOptions;
use crate::core::geo::{Point, Rect};
use crate::core::viewport::Viewport;
use crate::events::{EventSink, ViewerEvent};
use crate::layers::coverage::CoverageMap;
use crate::layers::FrameContext;
use crate::prelude::HashMap;
use crate::rendering::drawer::BlendOptions;
use crate::tiles::cache::TileCache;
use crate::tiles::loader::{LoadCompletion, LoadHandle, LoadRequest};
use crate::tiles::source::TileSource;
use crate::tiles::tile::{LayerId, Tile, TileId, TileKey};
use crate::{Result, ViewerError};

/// Anchor used when an image is fit into bounds of another aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Placement {
    #[default]
    Center,
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl Placement {
    fn is_horizontally_centered(self) -> bool {
        matches!(self, Placement::Center | Placement::Top | Placement::Bottom)
    }

    fn is_right(self) -> bool {
        matches!(
            self,
            Placement::TopRight | Placement::Right | Placement::BottomRight
        )
    }

    fn is_vertically_centered(self) -> bool {
        matches!(self, Placement::Center | Placement::Left | Placement::Right)
    }

    fn is_bottom(self) -> bool {
        matches!(
            self,
            Placement::BottomLeft | Placement::Bottom | Placement::BottomRight
        )
    }
}

/// Per-level inputs of one pass of the level loop
#[derive(Debug, Clone, Copy)]
struct LevelPass {
    level: u32,
    draw_level: bool,
    have_drawn: bool,
    opacity: f64,
    visibility: f64,
}

#[derive(Debug)]
pub struct TiledImage {
    id: LayerId,
    source: TileSource,
    options: LayerOptions,
    events: EventSink,
    x: AnimationValue,
    y: AnimationValue,
    /// World width of the image
    scale: AnimationValue,
    degrees: AnimationValue,
    clip: Option<Rect>,
    opacity: f64,
    tiles: HashMap<TileKey, Tile>,
    coverage: CoverageMap,
    loading_coverage: CoverageMap,
    last_drawn: Vec<TileKey>,
    loads: HashMap<TileKey, LoadHandle>,
    tiles_loading: usize,
    fully_loaded: bool,
    needs_draw: bool,
    last_reset_time: f64,
}

fn check_scale(scale: f64) -> Result<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(ViewerError::InvalidValue(format!(
            "layer size must be positive, got {}",
            scale
        )))
    }
}

impl TiledImage {
    pub fn new(
        source: TileSource,
        options: LayerOptions,
        clock: SharedClock,
        events: EventSink,
    ) -> Result<Self> {
        let dimensions = source.dimensions();
        let norm_height = dimensions.y / dimensions.x;
        let scale = match (options.width, options.height) {
            (Some(width), _) => width,
            (None, Some(height)) => height / norm_height,
            (None, None) => 1.0,
        };
        check_scale(scale)?;

        let spring = SpringOptions {
            initial: 0.0,
            stiffness: options.spring_stiffness,
            animation_time: options.animation_time,
            exponential: false,
        };
        let x = AnimationValue::new(
            SpringOptions {
                initial: options.x,
                ..spring
            },
            clock.clone(),
        )?;
        let y = AnimationValue::new(
            SpringOptions {
                initial: options.y,
                ..spring
            },
            clock.clone(),
        )?;
        let scale = AnimationValue::new(
            SpringOptions {
                initial: scale,
                ..spring
            },
            clock.clone(),
        )?;
        let degrees = AnimationValue::new(
            SpringOptions {
                initial: options.degrees,
                ..spring
            },
            clock,
        )?;

        Ok(Self {
            id: LayerId::next(),
            clip: options.clip,
            opacity: options.opacity.clamp(0.0, 1.0),
            source,
            options,
            events,
            x,
            y,
            scale,
            degrees,
            tiles: HashMap::default(),
            coverage: CoverageMap::new(),
            loading_coverage: CoverageMap::new(),
            last_drawn: Vec::new(),
            loads: HashMap::default(),
            tiles_loading: 0,
            fully_loaded: false,
            needs_draw: true,
            last_reset_time: 0.0,
        })
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn source(&self) -> &TileSource {
        &self.source
    }

    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    pub fn tile(&self, key: &TileKey) -> Option<&Tile> {
        self.tiles.get(key)
    }

    /// Tiles drawn in the last frame, most detailed level first.
    pub fn last_drawn(&self) -> &[TileKey] {
        &self.last_drawn
    }

    pub fn coverage(&self) -> &CoverageMap {
        &self.coverage
    }

    pub fn tiles_loading(&self) -> usize {
        self.tiles_loading
    }

    pub fn fully_loaded(&self) -> bool {
        self.fully_loaded
    }

    pub fn needs_draw(&self) -> bool {
        self.needs_draw
    }

    pub fn preload(&self) -> bool {
        self.options.preload
    }

    pub fn set_preload(&mut self, preload: bool) {
        self.options.preload = preload;
        self.needs_draw = true;
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity == self.opacity {
            return;
        }
        self.opacity = opacity;
        self.needs_draw = true;
        self.events.emit(ViewerEvent::OpacityChange {
            layer: self.id,
            opacity,
        });
    }

    pub fn clip(&self) -> Option<Rect> {
        self.clip
    }

    /// Restricts drawing to `clip`, given in image pixels.
    pub fn set_clip(&mut self, clip: Option<Rect>) {
        self.clip = clip;
        self.needs_draw = true;
        self.events.emit(ViewerEvent::ClipChange {
            layer: self.id,
            clip,
        });
    }

    /// Source image size in pixels.
    pub fn content_size(&self) -> Point {
        self.source.dimensions()
    }

    fn norm_height(&self) -> f64 {
        let dimensions = self.source.dimensions();
        dimensions.y / dimensions.x
    }

    fn world_width(&self, current: bool) -> f64 {
        if current {
            self.scale.current_value()
        } else {
            self.scale.target_value()
        }
    }

    fn world_height(&self, current: bool) -> f64 {
        self.world_width(current) * self.norm_height()
    }

    fn position(&self, current: bool) -> Point {
        if current {
            Point::new(self.x.current_value(), self.y.current_value())
        } else {
            Point::new(self.x.target_value(), self.y.target_value())
        }
    }

    pub fn rotation(&self, current: bool) -> f64 {
        if current {
            self.degrees.current_value()
        } else {
            self.degrees.target_value()
        }
    }

    fn rotation_point(&self, current: bool) -> Point {
        self.bounds_no_rotate(current).center()
    }

    pub fn bounds_no_rotate(&self, current: bool) -> Rect {
        let position = self.position(current);
        Rect::new(
            position.x,
            position.y,
            self.world_width(current),
            self.world_height(current),
        )
    }

    /// Placement in viewport coordinates, rotation included.
    pub fn bounds(&self, current: bool) -> Rect {
        self.bounds_no_rotate(current)
            .rotate(self.rotation(current), Some(self.rotation_point(current)))
    }

    /// Bounds of the part left visible by the clip.
    pub fn clipped_bounds(&self, current: bool) -> Rect {
        let mut bounds = self.bounds_no_rotate(current);
        if let Some(clip) = self.clip {
            let ratio = bounds.width / self.source.dimensions().x;
            let clip = clip.scale(ratio);
            bounds = Rect::new(bounds.x + clip.x, bounds.y + clip.y, clip.width, clip.height);
        }
        bounds.rotate(self.rotation(current), Some(self.rotation_point(current)))
    }

    fn emit_bounds_change(&self) {
        self.events.emit(ViewerEvent::BoundsChange {
            layer: self.id,
            bounds: self.bounds(false),
        });
    }

    pub fn set_position(&mut self, position: Point, immediately: bool) -> Result<()> {
        let same_target =
            self.x.target_value() == position.x && self.y.target_value() == position.y;
        if immediately {
            if same_target && self.x.is_at_target() && self.y.is_at_target() {
                return Ok(());
            }
            self.x.reset_to(position.x)?;
            self.y.reset_to(position.y)?;
        } else {
            if same_target {
                return Ok(());
            }
            self.x.animate_to(position.x)?;
            self.y.animate_to(position.y)?;
        }
        self.needs_draw = true;
        self.emit_bounds_change();
        Ok(())
    }

    pub fn set_width(&mut self, width: f64, immediately: bool) -> Result<()> {
        self.set_scale(width, immediately)
    }

    pub fn set_height(&mut self, height: f64, immediately: bool) -> Result<()> {
        self.set_scale(height / self.norm_height(), immediately)
    }

    fn set_scale(&mut self, scale: f64, immediately: bool) -> Result<()> {
        check_scale(scale)?;
        let same_target = self.scale.target_value() == scale;
        if immediately {
            if same_target && self.scale.is_at_target() {
                return Ok(());
            }
            self.scale.reset_to(scale)?;
        } else {
            if same_target {
                return Ok(());
            }
            self.scale.animate_to(scale)?;
        }
        self.needs_draw = true;
        self.emit_bounds_change();
        Ok(())
    }

    pub fn set_rotation(&mut self, degrees: f64, immediately: bool) -> Result<()> {
        if self.degrees.target_value() == degrees && self.degrees.is_at_target() {
            return Ok(());
        }
        if immediately {
            self.degrees.reset_to(degrees)?;
        } else {
            self.degrees.animate_to(degrees)?;
        }
        self.needs_draw = true;
        self.emit_bounds_change();
        Ok(())
    }

    /// Places the image (or its clipped part) inside `bounds`, keeping its
    /// aspect ratio. The leftover margin goes where `placement` says.
    pub fn fit_bounds(
        &mut self,
        bounds: Rect,
        placement: Placement,
        immediately: bool,
    ) -> Result<()> {
        let dimensions = self.source.dimensions();
        let mut aspect_ratio = dimensions.x / dimensions.y;
        let mut offset = Point::default();
        let mut displayed_width_ratio = 1.0;
        let mut displayed_height_ratio = 1.0;

        if let Some(clip) = self.clip {
            aspect_ratio = clip.aspect_ratio();
            displayed_width_ratio = clip.width / dimensions.x;
            displayed_height_ratio = clip.height / dimensions.y;
            offset = if bounds.aspect_ratio() > aspect_ratio {
                Point::new(clip.x, clip.y).multiply(bounds.height / clip.height)
            } else {
                Point::new(clip.x, clip.y).multiply(bounds.width / clip.width)
            };
        }

        if bounds.aspect_ratio() > aspect_ratio {
            // Margins left and right
            let height = bounds.height / displayed_height_ratio;
            let spare = bounds.width - bounds.height * aspect_ratio;
            let margin_left = if placement.is_horizontally_centered() {
                spare / 2.0
            } else if placement.is_right() {
                spare
            } else {
                0.0
            };
            self.set_position(
                Point::new(bounds.x - offset.x + margin_left, bounds.y - offset.y),
                immediately,
            )?;
            self.set_height(height, immediately)
        } else {
            // Margins top and bottom
            let width = bounds.width / displayed_width_ratio;
            let spare = bounds.height - bounds.width / aspect_ratio;
            let margin_top = if placement.is_vertically_centered() {
                spare / 2.0
            } else if placement.is_bottom() {
                spare
            } else {
                0.0
            };
            self.set_position(
                Point::new(bounds.x - offset.x, bounds.y - offset.y + margin_top),
                immediately,
            )?;
            self.set_width(width, immediately)
        }
    }

    pub fn image_to_viewport_coordinates(&self, point: &Point, current: bool) -> Point {
        let bounds = self.bounds_no_rotate(current);
        point
            .multiply(bounds.width / self.source.dimensions().x)
            .add(&bounds.top_left())
            .rotate(self.rotation(current), Some(self.rotation_point(current)))
    }

    pub fn viewport_to_image_coordinates(&self, point: &Point, current: bool) -> Point {
        let bounds = self.bounds_no_rotate(current);
        point
            .rotate(-self.rotation(current), Some(self.rotation_point(current)))
            .subtract(&bounds.top_left())
            .multiply(self.source.dimensions().x / bounds.width)
    }

    pub fn image_to_viewport_rectangle(&self, rect: &Rect, current: bool) -> Rect {
        let top_left = self.image_to_viewport_coordinates(&rect.top_left(), current);
        let factor = self.world_width(current) / self.source.dimensions().x;
        Rect::with_degrees(
            top_left.x,
            top_left.y,
            rect.width * factor,
            rect.height * factor,
            rect.degrees + self.rotation(current),
        )
    }

    pub fn viewport_to_image_rectangle(&self, rect: &Rect, current: bool) -> Rect {
        let top_left = self.viewport_to_image_coordinates(&rect.top_left(), current);
        let factor = self.source.dimensions().x / self.world_width(current);
        Rect::with_degrees(
            top_left.x,
            top_left.y,
            rect.width * factor,
            rect.height * factor,
            rect.degrees - self.rotation(current),
        )
    }

    fn image_zoom_ratio(&self, viewport: &Viewport) -> f64 {
        self.scale.current_value() * viewport.container_inner_size().x
            / self.source.dimensions().x
    }

    /// Viewport zoom to image zoom, where 1 shows one image pixel per screen
    /// pixel.
    pub fn viewport_to_image_zoom(&self, viewport: &Viewport, zoom: f64) -> f64 {
        self.image_zoom_ratio(viewport) * zoom
    }

    pub fn image_to_viewport_zoom(&self, viewport: &Viewport, zoom: f64) -> f64 {
        zoom / self.image_zoom_ratio(viewport)
    }

    /// Advances the placement springs. Returns whether anything moved.
    pub fn update(&mut self) -> bool {
        let moved_x = self.x.update();
        let moved_y = self.y.update();
        let scaled = self.scale.update();
        let rotated = self.degrees.update();
        let changed = moved_x || moved_y || scaled || rotated;
        if changed {
            self.needs_draw = true;
        }
        changed
    }

    pub fn is_animating(&self) -> bool {
        !(self.x.is_at_target()
            && self.y.is_at_target()
            && self.scale.is_at_target()
            && self.degrees.is_at_target())
    }

    /// Runs the tile selection for this frame and draws the result. Hidden
    /// layers only select (and load) tiles when preloading.
    pub fn draw(&mut self, frame: &mut FrameContext<'_>) {
        self.release_unloaded(frame.cache);
        if self.opacity > 0.0 || self.options.preload {
            self.update_viewport(frame);
        } else {
            self.needs_draw = false;
        }
    }

    /// Drops the pixels of tiles the cache evicted since the last frame.
    fn release_unloaded(&mut self, cache: &mut TileCache) {
        for key in cache.take_unloaded(self.id) {
            if let Some(tile) = self.tiles.get_mut(&key) {
                tile.unload();
            }
        }
    }

    /// Screen pixels covered by one pixel of `level`.
    fn render_ratio(&self, viewport: &Viewport, level: u32, current: bool) -> f64 {
        viewport
            .delta_pixels_from_points_no_rotate(&self.source.pixel_ratio(level), current)
            .x
            * self.scale.current_value()
    }

    /// Levels worth considering this frame, `(lowest, highest)`.
    fn level_range(&self, viewport: &Viewport) -> (u32, u32) {
        let min_level = self.source.min_level();
        let max_level = self.source.max_level();

        let highest = (min_level..=max_level)
            .rev()
            .find(|&level| self.render_ratio(viewport, level, true) > self.options.min_pixel_ratio)
            .unwrap_or(min_level);

        let floor = self.options.min_zoom_image_ratio.log2().floor();
        let lowest = if floor.is_finite() && floor > f64::from(min_level) {
            floor as u32
        } else {
            min_level
        };
        (lowest.min(highest), highest)
    }

    /// Visible part of the layer in its own unrotated, unshifted frame, as
    /// top-left and bottom-right corners. `None` when nothing is visible.
    fn draw_region(&self, viewport: &Viewport) -> Option<(Point, Point)> {
        let wrap_horizontal = self.options.wrap_horizontal;
        let wrap_vertical = self.options.wrap_vertical;

        let mut region = viewport.bounds_with_margins(true).bounding_box();
        if !wrap_horizontal && !wrap_vertical {
            region = region.intersection(&self.clipped_bounds(true))?;
        }
        let degrees = self.rotation(true);
        if degrees % 360.0 != 0.0 {
            region = region
                .rotate(-degrees, Some(self.rotation_point(true)))
                .bounding_box();
        }
        let region = region.translate(&self.position(true).negate());

        let mut top_left = region.top_left();
        let mut bottom_right = Point::new(region.x + region.width, region.y + region.height);
        let world_width = self.world_width(true);
        let world_height = self.world_height(true);

        if !wrap_horizontal && (bottom_right.x < 0.0 || top_left.x > world_width) {
            return None;
        }
        if !wrap_vertical && (bottom_right.y < 0.0 || top_left.y > world_height) {
            return None;
        }
        if !wrap_horizontal {
            top_left.x = top_left.x.max(0.0);
            bottom_right.x = bottom_right.x.min(world_width);
        }
        if !wrap_vertical {
            top_left.y = top_left.y.max(0.0);
            bottom_right.y = bottom_right.y.min(world_height);
        }
        Some((top_left, bottom_right))
    }

    fn update_viewport(&mut self, frame: &mut FrameContext<'_>) {
        self.needs_draw = false;

        for key in std::mem::take(&mut self.last_drawn) {
            if let Some(tile) = self.tiles.get_mut(&key) {
                tile.being_drawn = false;
            }
            frame.cache.set_being_drawn(&TileId { layer: self.id, key }, false);
        }
        self.coverage.clear();
        self.loading_coverage.clear();
        self.tiles_loading = 0;

        let viewport = frame.viewport;
        let Some((top_left, bottom_right)) = self.draw_region(viewport) else {
            return;
        };
        let (lowest, highest) = self.level_range(viewport);

        let center_pixel = viewport.pixel_from_point(&viewport.center(false), false);
        let closest = self.source.closest_level(viewport.container_size());
        let optimal_ratio = if self.options.immediate_render {
            1.0
        } else {
            self.render_ratio(viewport, closest.saturating_sub(1), false)
        };

        let mut best: Option<TileKey> = None;
        let mut have_drawn = false;
        for level in (lowest..=highest).rev() {
            let current_ratio = self.render_ratio(viewport, level, true);
            let draw_level =
                (!have_drawn && current_ratio > self.options.min_pixel_ratio) || level == lowest;
            if draw_level {
                have_drawn = true;
            } else if !have_drawn {
                continue;
            }

            let target_ratio = self.render_ratio(viewport, level, false);
            let pass = LevelPass {
                level,
                draw_level,
                have_drawn,
                opacity: ((current_ratio - 0.5) / 0.5).min(1.0),
                visibility: optimal_ratio / (optimal_ratio - target_ratio).abs(),
            };
            best = self.update_level(frame, pass, top_left, bottom_right, center_pixel, best);

            if self.coverage.provides_coverage(level) {
                break;
            }
        }

        self.draw_tiles(frame);

        match best {
            Some(key) => {
                self.load_tile(key, frame);
                self.needs_draw = true;
                self.set_fully_loaded(false);
            }
            None => self.set_fully_loaded(self.tiles_loading == 0),
        }
    }

    fn update_level(
        &mut self,
        frame: &mut FrameContext<'_>,
        pass: LevelPass,
        top_left: Point,
        bottom_right: Point,
        center_pixel: Point,
        mut best: Option<TileKey>,
    ) -> Option<TileKey> {
        let level = pass.level;
        let scale = self.scale.current_value();
        let (first_x, first_y) = self.source.tile_at_point(level, top_left.divide(scale));
        let (mut last_x, mut last_y) = self.source.tile_at_point(level, bottom_right.divide(scale));
        let (columns, rows) = self.source.num_tiles(level);

        self.coverage.reset_level(level);
        self.loading_coverage.reset_level(level);
        if columns == 0 || rows == 0 {
            return best;
        }
        if !self.options.wrap_horizontal {
            last_x = last_x.min(columns - 1);
        }
        if !self.options.wrap_vertical {
            last_y = last_y.min(rows - 1);
        }

        for x in first_x..=last_x {
            for y in first_y..=last_y {
                best = self.update_tile(frame, pass, TileKey::new(level, x, y), center_pixel, best);
            }
        }
        best
    }

    fn update_tile(
        &mut self,
        frame: &mut FrameContext<'_>,
        pass: LevelPass,
        key: TileKey,
        center_pixel: Point,
        best: Option<TileKey>,
    ) -> Option<TileKey> {
        let (level, x, y) = (key.level, key.x, key.y);
        self.ensure_tile(key);
        let stamp = frame.cache.touch(&TileId { layer: self.id, key }, frame.now);
        let Some(tile) = self.tiles.get_mut(&key) else {
            return best;
        };
        tile.last_touch_time = stamp;
        let (exists, loaded, loading) = (tile.exists, tile.loaded, tile.loading);

        self.coverage.set(level, x, y, false);
        let loading_covered = loaded || loading || self.loading_coverage.is_covered(level, x, y);
        self.loading_coverage.set(level, x, y, loading_covered);

        if !exists {
            return best;
        }

        let mut draw_tile = pass.draw_level;
        if pass.have_drawn && !draw_tile {
            if self.coverage.is_covered(level, x, y) {
                self.coverage.set(level, x, y, true);
            } else {
                draw_tile = true;
            }
        }
        if !draw_tile {
            return best;
        }

        self.position_tile(key, frame.viewport, center_pixel, pass.visibility);
        if !loaded {
            self.resolve_from_cache(key, frame.cache);
        }

        let Some(tile) = self.tiles.get(&key) else {
            return best;
        };
        if tile.loaded {
            self.blend_tile(key, pass.opacity, frame.now);
            best
        } else if tile.loading {
            self.tiles_loading += 1;
            best
        } else if !loading_covered {
            self.compare_tiles(best, key)
        } else {
            best
        }
    }

    /// Creates the tile for `key` on first reference. Wrapped coordinates
    /// alias the source tile they wrap onto, shifted by whole image widths
    /// or heights.
    fn ensure_tile(&mut self, key: TileKey) {
        if self.tiles.contains_key(&key) {
            return;
        }
        let level = key.level;
        let (columns, rows) = self.source.num_tiles(level);
        let x_mod = key.x.rem_euclid(columns.max(1));
        let y_mod = key.y.rem_euclid(rows.max(1));

        let mut bounds = self.source.tile_bounds(level, x_mod, y_mod);
        bounds.x += (key.x - x_mod) as f64 / columns as f64;
        bounds.y += self.norm_height() * ((key.y - y_mod) as f64 / rows as f64);

        let tile = Tile::new(
            key,
            bounds,
            self.source.tile_exists(level, x_mod, y_mod),
            self.source.tile_url(level, x_mod, y_mod),
            self.source.cache_key(level, x_mod, y_mod),
        );
        self.tiles.insert(key, tile);
    }

    fn position_tile(
        &mut self,
        key: TileKey,
        viewport: &Viewport,
        center_pixel: Point,
        visibility: f64,
    ) {
        let scale = self.scale.current_value();
        let origin = self.position(true);
        let overlap = self.source.tile_overlap();
        let Some(tile) = self.tiles.get_mut(&key) else {
            return;
        };

        let top_left = tile.bounds.top_left().multiply(scale).add(&origin);
        let size = tile.bounds.size().multiply(scale);
        let position_current = viewport.pixel_from_point_no_rotate(&top_left, true);
        let position_target = viewport.pixel_from_point_no_rotate(&top_left, false);
        let mut size_current = viewport.delta_pixels_from_points_no_rotate(&size, true);
        let size_target = viewport.delta_pixels_from_points_no_rotate(&size, false);
        let tile_center = position_target.add(&size_target.divide(2.0));

        // Without overlap, neighbouring tiles would leave hairline seams.
        if overlap == 0 {
            size_current = size_current.add(&Point::new(1.0, 1.0));
        }
        tile.position = position_current;
        tile.size = size_current;
        tile.squared_distance = center_pixel.squared_distance_to(&tile_center);
        tile.visibility = visibility;
    }

    /// Borrows pixels already cached under the tile's key by another tile.
    fn resolve_from_cache(&mut self, key: TileKey, cache: &mut TileCache) {
        let Some(tile) = self.tiles.get_mut(&key) else {
            return;
        };
        let Some(record) = cache.image_record(&tile.cache_key) else {
            return;
        };
        let image = record.image().clone();
        tile.loading = false;
        tile.loaded = true;
        tile.image = Some(image.clone());
        cache.cache_tile(tile, self.id, image, 0);
        self.needs_draw = true;
    }

    fn blend_tile(&mut self, key: TileKey, level_opacity: f64, now: f64) {
        let blend_ms = self.options.blend_time_ms();
        let always_blend = self.options.always_blend;
        let Some(tile) = self.tiles.get_mut(&key) else {
            return;
        };
        let start = *tile.blend_start.get_or_insert(now);
        let elapsed = now - start;
        let mut opacity = if blend_ms > 0.0 {
            (elapsed / blend_ms).min(1.0)
        } else {
            1.0
        };
        if always_blend {
            opacity *= level_opacity;
        }
        tile.opacity = opacity;
        self.last_drawn.push(key);

        if opacity >= 1.0 {
            self.coverage.set(key.level, key.x, key.y, true);
        } else if elapsed < blend_ms {
            self.needs_draw = true;
        }
    }

    /// Higher visibility wins, then proximity to the view center.
    fn compare_tiles(&self, best: Option<TileKey>, candidate: TileKey) -> Option<TileKey> {
        let Some(current) = best.and_then(|key| self.tiles.get(&key)) else {
            return Some(candidate);
        };
        let Some(tile) = self.tiles.get(&candidate) else {
            return best;
        };
        if tile.visibility > current.visibility
            || (tile.visibility == current.visibility
                && tile.squared_distance < current.squared_distance)
        {
            Some(candidate)
        } else {
            best
        }
    }

    fn clip_pixels(&self, viewport: &Viewport) -> Option<Rect> {
        let clip = self.clip?;
        let bounds = self.bounds_no_rotate(true);
        let rect = clip
            .scale(bounds.width / self.source.dimensions().x)
            .translate(&bounds.top_left());
        let top_left = viewport.pixel_from_point_no_rotate(&rect.top_left(), true);
        let size = viewport.delta_pixels_from_points_no_rotate(&rect.size(), true);
        Some(Rect::new(top_left.x, top_left.y, size.x, size.y))
    }

    /// Draws lower levels first so detailed tiles end up on top.
    fn draw_tiles(&mut self, frame: &mut FrameContext<'_>) {
        if self.opacity <= 0.0 || self.last_drawn.is_empty() {
            return;
        }
        let options = BlendOptions {
            layer: self.id,
            opacity: self.opacity,
            degrees: frame.viewport.rotation(),
            layer_degrees: self.rotation(true),
            clip: self.clip_pixels(frame.viewport),
        };
        for key in self.last_drawn.iter().rev() {
            let Some(tile) = self.tiles.get_mut(key) else {
                continue;
            };
            tile.being_drawn = true;
            frame.cache.set_being_drawn(&tile.id(self.id), true);
            frame.drawer.draw_tile(tile, &options);
        }
    }

    fn load_tile(&mut self, key: TileKey, frame: &mut FrameContext<'_>) {
        let Some(tile) = self.tiles.get_mut(&key) else {
            return;
        };
        tile.loading = true;
        let request = LoadRequest {
            tile: tile.id(self.id),
            url: tile.url.clone(),
            cache_key: tile.cache_key.clone(),
            headers: self.source.headers().to_vec(),
            issued_at: frame.now,
        };
        let handle = frame.loader.add_job(request, frame.now);
        self.loads.insert(key, handle);
    }

    fn set_fully_loaded(&mut self, fully_loaded: bool) {
        if self.fully_loaded == fully_loaded {
            return;
        }
        self.fully_loaded = fully_loaded;
        self.events.emit(ViewerEvent::FullyLoadedChange {
            layer: self.id,
            fully_loaded,
        });
    }

    /// Applies a finished load. Completions for requests issued before the
    /// last reset are dropped.
    pub fn on_load_complete(&mut self, completion: LoadCompletion, cache: &mut TileCache) {
        let LoadCompletion {
            job,
            request,
            result,
        } = completion;
        let key = request.tile.key;
        if self.loads.get(&key).is_some_and(|handle| handle.job() == job) {
            self.loads.remove(&key);
        }

        if request.issued_at < self.last_reset_time {
            log::debug!("ignoring tile {} loaded before reset: {}", key, request.url);
            return;
        }
        let Some(tile) = self.tiles.get_mut(&key) else {
            log::debug!("no tile {} for completed load {}", key, request.url);
            return;
        };

        match result {
            Err(ViewerError::Aborted) => {
                tile.loading = false;
            }
            Err(err) => {
                log::warn!("tile {} failed to load: {} - error: {}", key, tile.url, err);
                tile.loading = false;
                tile.exists = false;
                self.events.emit(ViewerEvent::TileLoadFailed {
                    tile: request.tile,
                    url: request.url,
                    message: err.to_string(),
                });
            }
            Ok(image) => {
                tile.loading = false;
                tile.loaded = true;
                tile.image = Some(image.clone());
                let cutoff = self.source.single_tile_level();
                cache.cache_tile(tile, self.id, image, cutoff);
                self.needs_draw = true;
                self.events.emit(ViewerEvent::TileLoaded {
                    tile: request.tile,
                    cache_key: request.cache_key,
                });
            }
        }
    }

    /// Forgets every tile. Loads still in flight finish into the void.
    pub fn reset(&mut self, cache: &mut TileCache, now: f64) {
        cache.clear_tiles_for(self.id);
        self.last_reset_time = now;
        self.tiles.clear();
        self.coverage.clear();
        self.loading_coverage.clear();
        self.last_drawn.clear();
        self.tiles_loading = 0;
        self.needs_draw = true;
    }

    /// Aborts outstanding loads and releases every cached tile.
    pub fn destroy(&mut self, cache: &mut TileCache) {
        for (_, handle) in self.loads.drain() {
            handle.abort();
        }
        cache.clear_tiles_for(self.id);
        self.tiles.clear();
        self.coverage.clear();
        self.loading_coverage.clear();
        self.last_drawn.clear();
        self.tiles_loading = 0;
    }
}
