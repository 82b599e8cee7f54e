use serde::{Deserialize, Serialize};

/// Normalizes an angle in degrees into `[0, 360)`.
pub fn positive_degrees(degrees: f64) -> f64 {
    let wrapped = degrees % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Exact cosine/sine for right angles, trigonometry for the rest.
fn cos_sin(degrees: f64) -> (f64, f64) {
    let degrees = positive_degrees(degrees);
    if degrees == 0.0 {
        (1.0, 0.0)
    } else if degrees == 90.0 {
        (0.0, 1.0)
    } else if degrees == 180.0 {
        (-1.0, 0.0)
    } else if degrees == 270.0 {
        (0.0, -1.0)
    } else {
        let radians = degrees.to_radians();
        (radians.cos(), radians.sin())
    }
}

/// A point (or vector) in viewport, image or screen space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn divide(&self, scalar: f64) -> Point {
        Point::new(self.x / scalar, self.y / scalar)
    }

    pub fn negate(&self) -> Point {
        Point::new(-self.x, -self.y)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        self.squared_distance_to(other).sqrt()
    }

    pub fn squared_distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn floor(&self) -> Point {
        Point::new(self.x.floor(), self.y.floor())
    }

    /// Rotates this point by `degrees` around `pivot` (origin when `None`).
    pub fn rotate(&self, degrees: f64, pivot: Option<Point>) -> Point {
        let pivot = pivot.unwrap_or_default();
        let (cos, sin) = cos_sin(degrees);
        let dx = self.x - pivot.x;
        let dy = self.y - pivot.y;
        Point::new(
            cos * dx - sin * dy + pivot.x,
            sin * dx + cos * dy + pivot.y,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A possibly rotated rectangle. `(x, y)` is the top-left corner before
/// rotation; `degrees` rotates the rectangle around that corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub degrees: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            degrees: 0.0,
        }
    }

    pub fn with_degrees(x: f64, y: f64, width: f64, height: f64, degrees: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            degrees: positive_degrees(degrees),
        }
    }

    /// Builds the axis-aligned rectangle spanning two corners.
    pub fn from_corners(top_left: Point, bottom_right: Point) -> Self {
        Self::new(
            top_left.x,
            top_left.y,
            bottom_right.x - top_left.x,
            bottom_right.y - top_left.y,
        )
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn top_right(&self) -> Point {
        self.top_left()
            .add(&Point::new(self.width, 0.0).rotate(self.degrees, None))
    }

    pub fn bottom_left(&self) -> Point {
        self.top_left()
            .add(&Point::new(0.0, self.height).rotate(self.degrees, None))
    }

    pub fn bottom_right(&self) -> Point {
        self.top_left()
            .add(&Point::new(self.width, self.height).rotate(self.degrees, None))
    }

    pub fn center(&self) -> Point {
        self.top_left()
            .add(&Point::new(self.width / 2.0, self.height / 2.0).rotate(self.degrees, None))
    }

    pub fn size(&self) -> Point {
        Point::new(self.width, self.height)
    }

    /// Rotates the rectangle by `degrees` around `pivot` (its center when `None`).
    pub fn rotate(&self, degrees: f64, pivot: Option<Point>) -> Rect {
        let degrees = positive_degrees(degrees);
        if degrees == 0.0 {
            return *self;
        }
        let pivot = pivot.unwrap_or_else(|| self.center());
        let top_left = self.top_left().rotate(degrees, Some(pivot));
        let top_right = self.top_right().rotate(degrees, Some(pivot));
        let mut diff = top_right.subtract(&top_left);
        if diff.x.abs() < 1e-15 {
            diff.x = 0.0;
        }
        if diff.y.abs() < 1e-15 {
            diff.y = 0.0;
        }
        let mut radians = (diff.y / diff.x).atan();
        if diff.x < 0.0 {
            radians += std::f64::consts::PI;
        } else if diff.y < 0.0 {
            radians += 2.0 * std::f64::consts::PI;
        }
        Rect::with_degrees(
            top_left.x,
            top_left.y,
            self.width,
            self.height,
            radians.to_degrees(),
        )
    }

    /// Smallest axis-aligned rectangle containing this (rotated) rectangle.
    pub fn bounding_box(&self) -> Rect {
        if self.degrees == 0.0 {
            return *self;
        }
        let corners = [
            self.top_left(),
            self.top_right(),
            self.bottom_left(),
            self.bottom_right(),
        ];
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Union of the bounding boxes of both rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        let a = self.bounding_box();
        let b = other.bounding_box();
        let left = a.x.min(b.x);
        let top = a.y.min(b.y);
        let right = (a.x + a.width).max(b.x + b.width);
        let bottom = (a.y + a.height).max(b.y + b.height);
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Intersection of two axis-aligned rectangles, `None` when they are
    /// disjoint. Touching edges count as an empty intersection.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let a = self.bounding_box();
        let b = other.bounding_box();
        let left = a.x.max(b.x);
        let top = a.y.max(b.y);
        let right = (a.x + a.width).min(b.x + b.width);
        let bottom = (a.y + a.height).min(b.y + b.height);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }

    pub fn contains(&self, point: &Point) -> bool {
        let local = point.rotate(-self.degrees, Some(self.top_left()));
        local.x >= self.x
            && local.x <= self.x + self.width
            && local.y >= self.y
            && local.y <= self.y + self.height
    }

    pub fn translate(&self, delta: &Point) -> Rect {
        Rect {
            x: self.x + delta.x,
            y: self.y + delta.y,
            ..*self
        }
    }

    pub fn scale(&self, factor: f64) -> Rect {
        Rect {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            degrees: self.degrees,
        }
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }
}
