use crate::animation::spring::{AnimationValue, SpringOptions};
use crate::core::clock::SharedClock;
use crate::core::config::{Margins, ViewportOptions};
use crate::core::geo::{positive_degrees, Point, Rect};
use crate::{Result, ViewerError};

/// Pan, zoom and rotation state of the viewer.
///
/// Viewport coordinates are normalized so that a zoom of 1 shows exactly one
/// unit of content width across the container's inner width. Center and
/// zoom are animated; rotation changes take effect immediately.
#[derive(Debug, Clone)]
pub struct Viewport {
    center_x: AnimationValue,
    center_y: AnimationValue,
    /// Exponential so that zoom animations feel uniform at every scale
    zoom: AnimationValue,
    /// Viewport point kept under the same screen pixel while zoom animates
    zoom_point: Option<Point>,
    degrees: f64,
    container_size: Point,
    container_inner_size: Point,
    margins: Margins,
    content_bounds: Rect,
    content_size: Point,
    content_aspect_ratio: f64,
    options: ViewportOptions,
    old_center: Point,
    old_zoom: f64,
    old_degrees: f64,
}

fn inner_size(container: Point, margins: &Margins) -> Point {
    Point::new(
        (container.x - margins.horizontal()).max(1.0),
        (container.y - margins.vertical()).max(1.0),
    )
}

fn check_container(size: Point) -> Result<()> {
    if size.is_finite() && size.x > 0.0 && size.y > 0.0 {
        Ok(())
    } else {
        Err(ViewerError::InvalidValue(format!(
            "container size must be positive, got {}x{}",
            size.x, size.y
        )))
    }
}

impl Viewport {
    /// Creates a viewport showing the default content bounds `(0, 0, 1, 1)`
    /// at its home zoom.
    pub fn new(
        container_size: Point,
        options: ViewportOptions,
        clock: SharedClock,
    ) -> Result<Self> {
        check_container(container_size)?;
        let spring = SpringOptions {
            initial: 0.0,
            stiffness: options.spring_stiffness,
            animation_time: options.animation_time,
            exponential: false,
        };
        let center_x = AnimationValue::new(spring, clock.clone())?;
        let center_y = AnimationValue::new(spring, clock.clone())?;
        let zoom = AnimationValue::new(
            SpringOptions {
                initial: 1.0,
                exponential: true,
                ..spring
            },
            clock,
        )?;

        let margins = options.margins;
        let mut viewport = Self {
            center_x,
            center_y,
            zoom,
            zoom_point: None,
            degrees: positive_degrees(options.degrees),
            container_size,
            container_inner_size: inner_size(container_size, &margins),
            margins,
            content_bounds: Rect::default(),
            content_size: Point::new(1.0, 1.0),
            content_aspect_ratio: 1.0,
            options,
            old_center: Point::default(),
            old_zoom: 0.0,
            old_degrees: 0.0,
        };
        viewport.set_content_bounds(Rect::default(), 1.0);
        viewport.go_home(true)?;
        viewport.update();
        Ok(viewport)
    }

    pub fn options(&self) -> &ViewportOptions {
        &self.options
    }

    pub fn container_size(&self) -> Point {
        self.container_size
    }

    pub fn container_inner_size(&self) -> Point {
        self.container_inner_size
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    pub fn set_margins(&mut self, margins: Margins) {
        self.margins = margins;
        self.options.margins = margins;
        self.container_inner_size = inner_size(self.container_size, &margins);
    }

    /// Width over height of the inner (margin-less) container.
    pub fn aspect_ratio(&self) -> f64 {
        self.container_inner_size.x / self.container_inner_size.y
    }

    /// Sets the area covered by content and how many image pixels one
    /// viewport unit holds. Called whenever the world's metrics change.
    pub fn set_content_bounds(&mut self, bounds: Rect, content_factor: f64) {
        self.content_bounds = bounds;
        self.content_size = bounds.size().multiply(content_factor);
        self.content_aspect_ratio = self.content_size.x / self.content_size.y;
    }

    pub fn content_bounds(&self) -> Rect {
        self.content_bounds
    }

    pub fn content_size(&self) -> Point {
        self.content_size
    }

    /// Zoom at which the content fits (or fills) the container.
    pub fn home_zoom(&self) -> f64 {
        if let Some(zoom) = self.options.default_zoom_level {
            return zoom;
        }
        let aspect_factor = self.content_aspect_ratio / self.aspect_ratio();
        let output = if self.options.home_fills_viewer {
            if aspect_factor >= 1.0 {
                aspect_factor
            } else {
                1.0
            }
        } else if aspect_factor >= 1.0 {
            1.0
        } else {
            aspect_factor
        };
        output / self.content_bounds.width
    }

    pub fn home_bounds(&self) -> Rect {
        let center = self.content_bounds.center();
        let width = 1.0 / self.home_zoom();
        let height = width / self.aspect_ratio();
        Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn go_home(&mut self, immediately: bool) -> Result<()> {
        let home = self.home_bounds();
        self.fit_bounds(home, immediately)
    }

    pub fn min_zoom(&self) -> f64 {
        match self.options.min_zoom_level {
            Some(zoom) => zoom,
            None => self.options.min_zoom_image_ratio * self.home_zoom(),
        }
    }

    pub fn max_zoom(&self) -> f64 {
        let zoom = match self.options.max_zoom_level {
            Some(zoom) => zoom,
            None => {
                self.content_size.x * self.options.max_zoom_pixel_ratio
                    / self.container_inner_size.x
                    / self.content_bounds.width
            }
        };
        zoom.max(self.min_zoom())
    }

    pub fn zoom(&self, current: bool) -> f64 {
        if current {
            self.zoom.current_value()
        } else {
            self.zoom.target_value()
        }
    }

    pub fn zoom_point(&self) -> Option<Point> {
        self.zoom_point
    }

    /// Center of the view. The target center accounts for any zoom point
    /// still being honored by the running zoom animation.
    pub fn center(&self, current: bool) -> Point {
        let center_current =
            Point::new(self.center_x.current_value(), self.center_y.current_value());
        let center_target = Point::new(self.center_x.target_value(), self.center_y.target_value());
        if current {
            return center_current;
        }
        let Some(zoom_point) = self.zoom_point else {
            return center_target;
        };

        let old_pixel = self.pixel_from_point(&zoom_point, true);
        let zoom = self.zoom(false);
        let width = 1.0 / zoom;
        let height = width / self.aspect_ratio();
        let bounds = Rect::new(
            center_current.x - width / 2.0,
            center_current.y - height / 2.0,
            width,
            height,
        );
        let new_pixel = self.pixel_from_point_in(&zoom_point, &bounds);
        let delta = new_pixel
            .subtract(&old_pixel)
            .rotate(-self.degrees, None)
            .divide(self.container_inner_size.x * zoom);
        center_target.add(&delta)
    }

    /// Visible rectangle ignoring rotation.
    pub fn bounds_no_rotate(&self, current: bool) -> Rect {
        let center = self.center(current);
        let width = 1.0 / self.zoom(current);
        let height = width / self.aspect_ratio();
        Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    /// Visible rectangle in viewport coordinates.
    pub fn bounds(&self, current: bool) -> Rect {
        self.bounds_no_rotate(current).rotate(-self.degrees, None)
    }

    /// Visible rectangle including the area under the margins.
    pub fn bounds_with_margins(&self, current: bool) -> Rect {
        let mut bounds = self.bounds_no_rotate(current);
        let factor = self.container_inner_size.x * self.zoom(current);
        bounds.x -= self.margins.left / factor;
        bounds.y -= self.margins.top / factor;
        bounds.width += self.margins.horizontal() / factor;
        bounds.height += self.margins.vertical() / factor;
        bounds.rotate(-self.degrees, None)
    }

    /// Bounds the view would settle on after constraints are applied.
    pub fn constrained_bounds(&self, current: bool) -> Rect {
        let zoom = self.apply_zoom_constraints(self.zoom(current));
        let center = self.center(current);
        let width = 1.0 / zoom;
        let height = width / self.aspect_ratio();
        self.apply_boundary_constraints(Rect::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            width,
            height,
        ))
    }

    pub fn rotation(&self) -> f64 {
        self.degrees
    }

    pub fn set_rotation(&mut self, degrees: f64) {
        self.degrees = positive_degrees(degrees);
    }

    pub fn set_wrap(&mut self, horizontal: bool, vertical: bool) {
        self.options.wrap_horizontal = horizontal;
        self.options.wrap_vertical = vertical;
    }

    pub fn pan_to(&mut self, center: Point, immediately: bool) -> Result<()> {
        if immediately {
            self.center_x.reset_to(center.x)?;
            self.center_y.reset_to(center.y)?;
        } else {
            self.center_x.animate_to(center.x)?;
            self.center_y.animate_to(center.y)?;
        }
        Ok(())
    }

    pub fn pan_by(&mut self, delta: Point, immediately: bool) -> Result<()> {
        let target = Point::new(self.center_x.target_value(), self.center_y.target_value());
        self.pan_to(target.add(&delta), immediately)?;
        if self.options.constrain_during_pan {
            self.apply_constraints(immediately)?;
        }
        Ok(())
    }

    /// Zooms to `zoom`, keeping `ref_point` (viewport coordinates) under the
    /// same screen pixel while the animation runs.
    pub fn zoom_to(
        &mut self,
        zoom: f64,
        ref_point: Option<Point>,
        immediately: bool,
    ) -> Result<()> {
        self.zoom_point = ref_point.filter(Point::is_finite);
        if !immediately {
            return self.zoom.animate_to(zoom);
        }
        match self.zoom_point {
            Some(zoom_point) => {
                let old_pixel = self.pixel_from_point(&zoom_point, true);
                self.zoom.reset_to(zoom)?;
                let new_pixel = self.pixel_from_point(&zoom_point, true);
                self.shift_center_by_pixels(new_pixel.subtract(&old_pixel))
            }
            None => self.zoom.reset_to(zoom),
        }
    }

    pub fn zoom_by(
        &mut self,
        factor: f64,
        ref_point: Option<Point>,
        immediately: bool,
    ) -> Result<()> {
        let zoom = self.zoom.target_value() * factor;
        self.zoom_to(zoom, ref_point, immediately)
    }

    /// Makes `bounds` (viewport coordinates, possibly rotated) fill the
    /// container. An animated fit zooms around the one point whose screen
    /// position is the same in the old and new views.
    pub fn fit_bounds(&mut self, bounds: Rect, immediately: bool) -> Result<()> {
        let center = bounds.center();
        let bbox = Rect::with_degrees(
            bounds.x,
            bounds.y,
            bounds.width,
            bounds.height,
            bounds.degrees + self.degrees,
        )
        .bounding_box();
        self.fit_bounds_no_rotate(
            Rect::new(
                center.x - bbox.width / 2.0,
                center.y - bbox.height / 2.0,
                bbox.width,
                bbox.height,
            ),
            immediately,
        )
    }

    fn fit_bounds_no_rotate(&mut self, bounds: Rect, immediately: bool) -> Result<()> {
        if !(bounds.width > 0.0 && bounds.height > 0.0) {
            return Err(ViewerError::InvalidValue(format!(
                "cannot fit empty bounds {:?}",
                bounds
            )));
        }
        let aspect = self.aspect_ratio();
        let center = bounds.center();
        let (mut width, mut height) = (bounds.width, bounds.height);
        if bounds.aspect_ratio() >= aspect {
            height = width / aspect;
        } else {
            width = height * aspect;
        }
        let new_bounds = Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height);
        let new_zoom = 1.0 / width;

        if immediately {
            self.pan_to(center, true)?;
            return self.zoom_to(new_zoom, None, true);
        }

        self.pan_to(self.center(true), true)?;
        self.zoom_to(self.zoom(true), None, true)?;

        let old_bounds = self.bounds_no_rotate(false);
        let old_zoom = self.zoom(false);
        if old_zoom == 0.0 || (new_zoom / old_zoom - 1.0).abs() < 1e-8 {
            self.zoom_to(new_zoom, None, true)?;
            return self.pan_to(center, false);
        }

        let reference = new_bounds
            .top_left()
            .multiply(new_zoom)
            .subtract(&old_bounds.top_left().multiply(old_zoom))
            .divide(new_zoom - old_zoom);
        self.zoom_to(new_zoom, Some(reference), false)
    }

    /// Clamps zoom into `[min_zoom, max_zoom]` and pulls the view back so
    /// that at least `visibility_ratio` of it overlaps the content on every
    /// non-wrapping axis.
    pub fn apply_constraints(&mut self, immediately: bool) -> Result<()> {
        let actual = self.zoom(false);
        let constrained = self.apply_zoom_constraints(actual);
        if actual != constrained {
            self.zoom_to(constrained, self.zoom_point, immediately)?;
        }

        let bounds = self.bounds_no_rotate(false);
        let constrained_bounds = self.apply_boundary_constraints(bounds);
        if bounds != constrained_bounds {
            self.fit_bounds_no_rotate(constrained_bounds, immediately)?;
        }
        Ok(())
    }

    fn apply_zoom_constraints(&self, zoom: f64) -> f64 {
        zoom.max(self.min_zoom()).min(self.max_zoom())
    }

    fn apply_boundary_constraints(&self, bounds: Rect) -> Rect {
        let mut result = bounds;
        let content = self.content_bounds;

        if !self.options.wrap_horizontal {
            result.x += constrain_axis(
                result.x,
                result.width,
                content.x,
                content.width,
                self.options.visibility_ratio,
            );
        }
        if !self.options.wrap_vertical {
            result.y += constrain_axis(
                result.y,
                result.height,
                content.y,
                content.height,
                self.options.visibility_ratio,
            );
        }
        result
    }

    /// Changes the container size. With `maintain` the image keeps its
    /// on-screen scale, otherwise the previous bounds are refit.
    pub fn resize(&mut self, size: Point, maintain: bool) -> Result<()> {
        check_container(size)?;
        let old_bounds = self.bounds_no_rotate(false);
        let old_width = self.container_size.x;
        self.container_size = size;
        self.container_inner_size = inner_size(size, &self.margins);

        let mut new_bounds = old_bounds;
        if maintain {
            new_bounds.width = old_bounds.width * size.x / old_width;
            new_bounds.height = new_bounds.width / self.aspect_ratio();
        }
        self.fit_bounds_no_rotate(new_bounds, true)
    }

    /// Advances the springs. Returns whether the visible view changed.
    pub fn update(&mut self) -> bool {
        match self.zoom_point {
            Some(zoom_point) => {
                let old_pixel = self.pixel_from_point(&zoom_point, true);
                self.zoom.update();
                let new_pixel = self.pixel_from_point(&zoom_point, true);
                if let Err(err) = self.shift_center_by_pixels(new_pixel.subtract(&old_pixel)) {
                    log::warn!("could not keep zoom point in place: {}", err);
                }
            }
            None => {
                self.zoom.update();
            }
        }
        if self.zoom.is_at_target() {
            self.zoom_point = None;
        }
        self.center_x.update();
        self.center_y.update();

        let center = self.center(true);
        let zoom = self.zoom(true);
        let changed =
            center != self.old_center || zoom != self.old_zoom || self.degrees != self.old_degrees;
        self.old_center = center;
        self.old_zoom = zoom;
        self.old_degrees = self.degrees;
        changed
    }

    pub fn is_animating(&self) -> bool {
        !(self.center_x.is_at_target() && self.center_y.is_at_target() && self.zoom.is_at_target())
    }

    fn shift_center_by_pixels(&mut self, delta_pixels: Point) -> Result<()> {
        let delta = self.delta_points_from_pixels(&delta_pixels, true);
        self.center_x.shift_by(delta.x)?;
        self.center_y.shift_by(delta.y)
    }

    pub fn delta_pixels_from_points_no_rotate(&self, delta: &Point, current: bool) -> Point {
        delta.multiply(self.container_inner_size.x * self.zoom(current))
    }

    pub fn delta_pixels_from_points(&self, delta: &Point, current: bool) -> Point {
        self.delta_pixels_from_points_no_rotate(&delta.rotate(self.degrees, None), current)
    }

    pub fn delta_points_from_pixels_no_rotate(&self, delta: &Point, current: bool) -> Point {
        delta.divide(self.container_inner_size.x * self.zoom(current))
    }

    pub fn delta_points_from_pixels(&self, delta: &Point, current: bool) -> Point {
        self.delta_points_from_pixels_no_rotate(&delta.rotate(-self.degrees, None), current)
    }

    fn margin_offset(&self) -> Point {
        Point::new(self.margins.left, self.margins.top)
    }

    fn rotation_pivot(&self) -> Point {
        self.container_inner_size.divide(2.0).add(&self.margin_offset())
    }

    fn pixel_from_point_in(&self, point: &Point, bounds: &Rect) -> Point {
        let scale = self.container_inner_size.x / bounds.width;
        let pixel = point
            .subtract(&bounds.top_left())
            .multiply(scale)
            .add(&self.margin_offset());
        if self.degrees == 0.0 {
            pixel
        } else {
            pixel.rotate(self.degrees, Some(self.rotation_pivot()))
        }
    }

    /// Container pixels before the viewport rotation is applied. Drawers
    /// rotate the whole surface, so tiles are positioned in this frame.
    pub fn pixel_from_point_no_rotate(&self, point: &Point, current: bool) -> Point {
        let bounds = self.bounds_no_rotate(current);
        point
            .subtract(&bounds.top_left())
            .multiply(self.container_inner_size.x / bounds.width)
            .add(&self.margin_offset())
    }

    /// Converts viewport coordinates to container pixels.
    pub fn pixel_from_point(&self, point: &Point, current: bool) -> Point {
        self.pixel_from_point_in(point, &self.bounds_no_rotate(current))
    }

    /// Converts container pixels to viewport coordinates.
    pub fn point_from_pixel(&self, pixel: &Point, current: bool) -> Point {
        let bounds = self.bounds_no_rotate(current);
        let pixel = if self.degrees == 0.0 {
            *pixel
        } else {
            pixel.rotate(-self.degrees, Some(self.rotation_pivot()))
        };
        pixel
            .subtract(&self.margin_offset())
            .divide(self.container_inner_size.x / bounds.width)
            .add(&bounds.top_left())
    }

    fn image_factor(&self) -> f64 {
        self.content_size.x / self.content_bounds.width
    }

    /// Viewport point to image pixels. Only meaningful with a single item.
    pub fn viewport_to_image_coordinates(&self, point: &Point) -> Point {
        point
            .subtract(&self.content_bounds.top_left())
            .multiply(self.image_factor())
    }

    pub fn image_to_viewport_coordinates(&self, point: &Point) -> Point {
        point
            .divide(self.image_factor())
            .add(&self.content_bounds.top_left())
    }

    /// Viewport zoom to image zoom, where 1 means one image pixel per
    /// screen pixel.
    pub fn viewport_to_image_zoom(&self, zoom: f64) -> f64 {
        zoom * self.container_inner_size.x / self.image_factor()
    }

    pub fn image_to_viewport_zoom(&self, zoom: f64) -> f64 {
        zoom * self.image_factor() / self.container_inner_size.x
    }
}

/// Offset to apply to one axis so that enough of the view overlaps content.
fn constrain_axis(start: f64, size: f64, content_start: f64, content_size: f64, ratio: f64) -> f64 {
    let threshold = ratio * size;
    let low_delta = content_start - (start + size) + threshold;
    let high_delta = content_start + content_size - start - threshold;
    if threshold > content_size {
        (low_delta + high_delta) / 2.0
    } else if high_delta < 0.0 {
        high_delta
    } else if low_delta > 0.0 {
        low_delta
    } else {
        0.0
    }
}
