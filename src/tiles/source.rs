//! Pyramid geometry and the supported tile-source formats.
//!
//! A source is opened once into a [`TileSource`]: a shared [`TileGrid`]
//! describing the pyramid, plus a [`SourceFormat`] that only decides how a
//! tile's address is spelled.

use serde::{Deserialize, Serialize};

use crate::core::geo::{Point, Rect};
use crate::{Result, ViewerError};

/// Number of halvings needed for `size` to reach one pixel.
fn ceil_log2(size: u32) -> u32 {
    let size = u64::from(size.max(1));
    u64::BITS - (size - 1).leading_zeros()
}

/// Number of halvings needed for `size` to fit into a single tile.
fn levels_to_fit(size: u32, tile: u32) -> u32 {
    let mut size = u64::from(size);
    let tile = u64::from(tile.max(1));
    let mut levels = 0;
    while size > tile {
        size = (size + 1) / 2;
        levels += 1;
    }
    levels
}

/// Geometry of an image pyramid. Level `max_level` is the full-resolution
/// image, each level below halves both dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_overlap: u32,
    pub min_level: u32,
    pub max_level: u32,
}

impl TileGrid {
    /// Square tiles, levels down to a one-pixel image.
    pub fn new(width: u32, height: u32, tile_size: u32, tile_overlap: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ViewerError::InvalidSource(format!(
                "image dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        if tile_size == 0 {
            return Err(ViewerError::InvalidSource("tile size must be positive".to_string()));
        }
        Ok(Self {
            width,
            height,
            tile_width: tile_size,
            tile_height: tile_size,
            tile_overlap,
            min_level: 0,
            max_level: ceil_log2(width.max(height)),
        })
    }

    pub fn with_levels(mut self, min_level: u32, max_level: u32) -> Result<Self> {
        if min_level > max_level {
            return Err(ViewerError::InvalidSource(format!(
                "min level {} is above max level {}",
                min_level, max_level
            )));
        }
        self.min_level = min_level;
        self.max_level = max_level;
        Ok(self)
    }

    pub fn with_tile_size(mut self, tile_width: u32, tile_height: u32) -> Result<Self> {
        if tile_width == 0 || tile_height == 0 {
            return Err(ViewerError::InvalidSource("tile size must be positive".to_string()));
        }
        self.tile_width = tile_width;
        self.tile_height = tile_height;
        Ok(self)
    }

    pub fn dimensions(&self) -> Point {
        Point::new(f64::from(self.width), f64::from(self.height))
    }

    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    pub fn has_level(&self, level: u32) -> bool {
        level >= self.min_level && level <= self.max_level
    }

    pub fn level_scale(&self, level: u32) -> f64 {
        if level >= self.max_level {
            return 1.0;
        }
        0.5_f64.powi((self.max_level - level) as i32)
    }

    /// Columns and rows at `level`, `(0, 0)` outside the pyramid.
    pub fn num_tiles(&self, level: u32) -> (i64, i64) {
        if !self.has_level(level) {
            return (0, 0);
        }
        let scaled = self.dimensions().multiply(self.level_scale(level));
        (
            (scaled.x / f64::from(self.tile_width)).ceil().max(1.0) as i64,
            (scaled.y / f64::from(self.tile_height)).ceil().max(1.0) as i64,
        )
    }

    /// Size of one level pixel in normalized units (image width is 1).
    pub fn pixel_ratio(&self, level: u32) -> Point {
        let scaled = self.dimensions().multiply(self.level_scale(level));
        Point::new(1.0 / scaled.x, 1.0 / scaled.y)
    }

    /// Grid cell containing `point` (normalized coordinates). Points outside
    /// the image map to cells outside the grid.
    pub fn tile_at_point(&self, level: u32, point: Point) -> (i64, i64) {
        let width_scaled = f64::from(self.width) * self.level_scale(level);
        let mut x = (point.x * width_scaled / f64::from(self.tile_width)).floor() as i64;
        let mut y = (point.y * width_scaled / f64::from(self.tile_height)).floor() as i64;

        // The far edges belong to the last column and row.
        let (columns, rows) = self.num_tiles(level);
        if point.x == 1.0 {
            x = columns - 1;
        }
        if (point.y - 1.0 / self.aspect_ratio()).abs() < 1e-15 {
            y = rows - 1;
        }
        (x, y)
    }

    /// Normalized bounds of a grid cell, overlap included.
    pub fn tile_bounds(&self, level: u32, x: i64, y: i64) -> Rect {
        let scaled = self.dimensions().multiply(self.level_scale(level));
        let overlap = f64::from(self.tile_overlap);
        let tile_width = f64::from(self.tile_width);
        let tile_height = f64::from(self.tile_height);

        let px = if x == 0 { 0.0 } else { tile_width * x as f64 - overlap };
        let py = if y == 0 { 0.0 } else { tile_height * y as f64 - overlap };
        let sx = (tile_width + if x == 0 { 1.0 } else { 2.0 } * overlap).min(scaled.x - px);
        let sy = (tile_height + if y == 0 { 1.0 } else { 2.0 } * overlap).min(scaled.y - py);

        let scale = 1.0 / scaled.x;
        Rect::new(px * scale, py * scale, sx * scale, sy * scale)
    }

    pub fn tile_exists(&self, level: u32, x: i64, y: i64) -> bool {
        let (columns, rows) = self.num_tiles(level);
        self.has_level(level) && x >= 0 && y >= 0 && x < columns && y < rows
    }

    /// Level just below the first one whose grid is about as wide as the
    /// tiles a container of `container` pixels can show, or `max_level`
    /// when no level gets there.
    pub fn closest_level(&self, container: Point) -> u32 {
        let across = (container.x / f64::from(self.tile_width)).floor() as i64;
        let down = (container.y / f64::from(self.tile_height)).floor() as i64;
        ((self.min_level + 1)..=self.max_level)
            .find(|&level| {
                let (columns, rows) = self.num_tiles(level);
                columns + 1 >= across && rows + 1 >= down
            })
            .map_or(self.max_level, |level| level - 1)
    }

    /// Highest level whose whole image fits in a single tile, or `min_level`
    /// when even the coarsest level needs several.
    pub fn single_tile_level(&self) -> u32 {
        (self.min_level..=self.max_level)
            .rev()
            .find(|&level| self.num_tiles(level) == (1, 1))
            .unwrap_or(self.min_level)
    }
}

/// How tile addresses are built for each supported pyramid format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceFormat {
    /// `{base}_files/{level}/{x}_{y}.{extension}`
    DeepZoom { base_url: String, extension: String },
    /// `{base}/TileGroup{n}/{level}-{x}-{y}.jpg`, 256 tiles per group
    Zoomify { base_url: String },
    /// `{base}/{level}/{x}/{y}.png` with rows counted from the bottom
    Tms { base_url: String },
    /// A single picture shown at every level
    Image { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSource {
    grid: TileGrid,
    format: SourceFormat,
    /// Request headers; part of the cache key so different credentials never
    /// share pixels
    #[serde(default)]
    headers: Vec<(String, String)>,
}

impl TileSource {
    pub fn new(grid: TileGrid, format: SourceFormat) -> Self {
        Self {
            grid,
            format,
            headers: Vec::new(),
        }
    }

    pub fn deep_zoom(
        base_url: impl Into<String>,
        extension: impl Into<String>,
        width: u32,
        height: u32,
        tile_size: u32,
        tile_overlap: u32,
    ) -> Result<Self> {
        Ok(Self::new(
            TileGrid::new(width, height, tile_size, tile_overlap)?,
            SourceFormat::DeepZoom {
                base_url: base_url.into(),
                extension: extension.into(),
            },
        ))
    }

    pub fn zoomify(
        base_url: impl Into<String>,
        width: u32,
        height: u32,
        tile_size: u32,
    ) -> Result<Self> {
        let grid = TileGrid::new(width, height, tile_size, 0)?;
        let max_level = levels_to_fit(width.max(height), tile_size);
        Ok(Self::new(
            grid.with_levels(0, max_level)?,
            SourceFormat::Zoomify {
                base_url: base_url.into(),
            },
        ))
    }

    pub fn tms(
        base_url: impl Into<String>,
        width: u32,
        height: u32,
        tile_size: u32,
    ) -> Result<Self> {
        let grid = TileGrid::new(width, height, tile_size, 0)?;
        let max_level = levels_to_fit(width.max(height), tile_size);
        Ok(Self::new(
            grid.with_levels(0, max_level)?,
            SourceFormat::Tms {
                base_url: base_url.into(),
            },
        ))
    }

    pub fn image(url: impl Into<String>, width: u32, height: u32) -> Result<Self> {
        let grid = TileGrid::new(width, height, width.max(1), 0)?.with_tile_size(width, height)?;
        Ok(Self::new(grid, SourceFormat::Image { url: url.into() }))
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn format(&self) -> &SourceFormat {
        &self.format
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn dimensions(&self) -> Point {
        self.grid.dimensions()
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.grid.aspect_ratio()
    }

    pub fn min_level(&self) -> u32 {
        self.grid.min_level
    }

    pub fn max_level(&self) -> u32 {
        self.grid.max_level
    }

    pub fn tile_width(&self) -> u32 {
        self.grid.tile_width
    }

    pub fn tile_overlap(&self) -> u32 {
        self.grid.tile_overlap
    }

    pub fn level_scale(&self, level: u32) -> f64 {
        self.grid.level_scale(level)
    }

    pub fn num_tiles(&self, level: u32) -> (i64, i64) {
        self.grid.num_tiles(level)
    }

    pub fn pixel_ratio(&self, level: u32) -> Point {
        self.grid.pixel_ratio(level)
    }

    pub fn tile_at_point(&self, level: u32, point: Point) -> (i64, i64) {
        self.grid.tile_at_point(level, point)
    }

    pub fn tile_bounds(&self, level: u32, x: i64, y: i64) -> Rect {
        self.grid.tile_bounds(level, x, y)
    }

    pub fn tile_exists(&self, level: u32, x: i64, y: i64) -> bool {
        self.grid.tile_exists(level, x, y)
    }

    pub fn closest_level(&self, container: Point) -> u32 {
        self.grid.closest_level(container)
    }

    pub fn single_tile_level(&self) -> u32 {
        self.grid.single_tile_level()
    }

    pub fn tile_url(&self, level: u32, x: i64, y: i64) -> String {
        match &self.format {
            SourceFormat::DeepZoom {
                base_url,
                extension,
            } => format!("{}_files/{}/{}_{}.{}", base_url, level, x, y, extension),
            SourceFormat::Zoomify { base_url } => {
                let preceding: i64 = (self.grid.min_level..level)
                    .map(|l| {
                        let (columns, rows) = self.grid.num_tiles(l);
                        columns * rows
                    })
                    .sum();
                let (columns, _) = self.grid.num_tiles(level);
                let group = (preceding + y * columns + x) / 256;
                format!(
                    "{}/TileGroup{}/{}-{}-{}.jpg",
                    base_url.trim_end_matches('/'),
                    group,
                    level,
                    x,
                    y
                )
            }
            SourceFormat::Tms { base_url } => {
                let (_, rows) = self.grid.num_tiles(level);
                format!(
                    "{}/{}/{}/{}.png",
                    base_url.trim_end_matches('/'),
                    level,
                    x,
                    rows - 1 - y
                )
            }
            SourceFormat::Image { url } => url.clone(),
        }
    }

    /// Content address of a tile: its URL, plus the request headers when
    /// there are any.
    pub fn cache_key(&self, level: u32, x: i64, y: i64) -> String {
        let url = self.tile_url(level, x, y);
        if self.headers.is_empty() {
            return url;
        }
        let headers: Vec<String> = self
            .headers
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("{}+{}", url, headers.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_deep_zoom_levels() {
        let source = TileSource::deep_zoom("http://x/img", "jpg", 1000, 500, 254, 1).unwrap();
        assert_eq!(source.max_level(), 10);
        assert_eq!(source.num_tiles(10), (4, 2));
        assert_eq!(source.num_tiles(0), (1, 1));
        assert_eq!(source.num_tiles(11), (0, 0));
        assert!(close(source.level_scale(9), 0.5));
        assert_eq!(source.tile_url(10, 3, 1), "http://x/img_files/10/3_1.jpg");
    }

    #[test]
    fn test_tile_bounds_include_overlap() {
        let grid = TileGrid::new(1000, 500, 254, 1).unwrap();
        let first = grid.tile_bounds(10, 0, 0);
        assert!(close(first.width, 255.0 / 1000.0));
        let second = grid.tile_bounds(10, 1, 0);
        assert!(close(second.x, 253.0 / 1000.0));
        assert!(close(second.width, 256.0 / 1000.0));
        // Last column is cut at the image edge
        let last = grid.tile_bounds(10, 3, 0);
        assert!(close(last.x + last.width, 1.0));
    }

    #[test]
    fn test_tile_at_point() {
        let grid = TileGrid::new(1024, 1024, 256, 0).unwrap();
        assert_eq!(grid.tile_at_point(10, Point::new(0.3, 0.6)), (1, 2));
        assert_eq!(grid.tile_at_point(10, Point::new(1.0, 1.0)), (3, 3));
        assert_eq!(grid.tile_at_point(10, Point::new(-0.1, 0.0)), (-1, 0));
        assert_eq!(grid.tile_at_point(9, Point::new(0.6, 0.6)), (1, 1));
    }

    #[test]
    fn test_tile_exists() {
        let grid = TileGrid::new(1024, 1024, 256, 0).unwrap();
        assert!(grid.tile_exists(10, 3, 3));
        assert!(!grid.tile_exists(10, 4, 0));
        assert!(!grid.tile_exists(10, -1, 0));
        assert!(!grid.tile_exists(11, 0, 0));
    }

    #[test]
    fn test_pixel_ratio_halves_per_level() {
        let grid = TileGrid::new(1024, 512, 256, 0).unwrap();
        assert!(close(grid.pixel_ratio(10).x, 1.0 / 1024.0));
        assert!(close(grid.pixel_ratio(9).x, 1.0 / 512.0));
        assert!(close(grid.pixel_ratio(10).y, 1.0 / 512.0));
    }

    #[test]
    fn test_closest_level() {
        let grid = TileGrid::new(4096, 4096, 256, 0).unwrap();
        // 800x600 shows 3x2 whole tiles; level 9 (2x2) is the first grid
        // that wide, so the level below it is picked
        assert_eq!(grid.closest_level(Point::new(800.0, 600.0)), 8);

        // The scan starts one above the coarsest level
        let coarse = TileGrid::new(4096, 4096, 256, 0)
            .unwrap()
            .with_levels(9, 12)
            .unwrap();
        assert_eq!(coarse.closest_level(Point::new(800.0, 600.0)), 9);

        // A container wider than every level falls back to the finest
        let tiny = TileGrid::new(512, 512, 256, 0).unwrap();
        assert_eq!(tiny.closest_level(Point::new(8000.0, 8000.0)), tiny.max_level);
    }

    #[test]
    fn test_single_tile_level_follows_numbering() {
        let deep_zoom = TileSource::deep_zoom("http://d/pic", "jpg", 2048, 2048, 256, 1).unwrap();
        assert_eq!(deep_zoom.single_tile_level(), 8);

        let tms = TileSource::tms("http://t", 8192, 8192, 256).unwrap();
        assert_eq!(tms.min_level(), 0);
        assert_eq!(tms.single_tile_level(), 0);

        let zoomify = TileSource::zoomify("http://z/pic/", 2048, 1024, 256).unwrap();
        assert_eq!(zoomify.single_tile_level(), 0);

        let offset = TileGrid::new(2048, 2048, 256, 0)
            .unwrap()
            .with_levels(2, 5)
            .unwrap();
        assert_eq!(offset.single_tile_level(), 2);
    }

    #[test]
    fn test_zoomify_groups_and_levels() {
        let source = TileSource::zoomify("http://z/pic/", 2048, 1024, 256).unwrap();
        assert_eq!(source.max_level(), 3);
        assert_eq!(source.num_tiles(0), (1, 1));
        assert_eq!(source.tile_url(0, 0, 0), "http://z/pic/TileGroup0/0-0-0.jpg");
        assert_eq!(source.tile_url(3, 7, 3), "http://z/pic/TileGroup0/3-7-3.jpg");
    }

    #[test]
    fn test_tms_flips_rows() {
        let source = TileSource::tms("http://t", 1024, 1024, 256).unwrap();
        assert_eq!(source.max_level(), 2);
        assert_eq!(source.tile_url(2, 1, 0), "http://t/2/1/3.png");
    }

    #[test]
    fn test_image_source_aliases_every_level() {
        let source = TileSource::image("http://i/pic.png", 800, 600).unwrap();
        assert_eq!(source.num_tiles(source.max_level()), (1, 1));
        assert_eq!(source.num_tiles(3), (1, 1));
        assert_eq!(source.cache_key(3, 0, 0), source.cache_key(source.max_level(), 0, 0));
    }

    #[test]
    fn test_headers_join_cache_key() {
        let source = TileSource::deep_zoom("http://x/img", "png", 512, 512, 256, 0)
            .unwrap()
            .with_headers(vec![("Authorization".to_string(), "token".to_string())]);
        assert_eq!(
            source.cache_key(9, 0, 0),
            "http://x/img_files/9/0_0.png+Authorization=token"
        );
    }

    #[test]
    fn test_rejects_empty_image() {
        assert!(matches!(
            TileGrid::new(0, 10, 256, 0),
            Err(ViewerError::InvalidSource(_))
        ));
        assert!(TileGrid::new(10, 10, 256, 0).unwrap().with_levels(3, 1).is_err());
    }
}
