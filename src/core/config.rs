//! Configuration system for viewport, layer, cache and loader behavior
//!
//! Options are grouped in [`ViewerOptions`] and can be built from a
//! [`PerformanceProfile`] preset, tweaked field by field, or loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::core::constants::*;
use crate::core::geo::Rect;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum PerformanceProfile {
    Balanced,
    LowMemory,
    HighQuality,
    Custom(ViewerOptions),
}

impl PerformanceProfile {
    pub fn resolve(&self) -> ViewerOptions {
        match self {
            Self::Balanced => ViewerOptions::default(),
            Self::LowMemory => ViewerOptions {
                layer: LayerOptions {
                    min_pixel_ratio: 0.9,
                    blend_time: 0.0,
                    ..Default::default()
                },
                cache: CacheOptions {
                    max_image_cache_count: 50,
                },
                loader: LoaderOptions {
                    image_loader_limit: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
            Self::HighQuality => ViewerOptions {
                layer: LayerOptions {
                    min_pixel_ratio: 0.25,
                    blend_time: 0.5,
                    always_blend: true,
                    ..Default::default()
                },
                cache: CacheOptions {
                    max_image_cache_count: 1000,
                },
                loader: LoaderOptions {
                    image_loader_limit: 8,
                    ..Default::default()
                },
                ..Default::default()
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Everything a viewer needs to be built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerOptions {
    pub viewport: ViewportOptions,
    /// Template applied to layers added without explicit options
    pub layer: LayerOptions,
    pub cache: CacheOptions,
    pub loader: LoaderOptions,
    /// Quiet period after which a running animation is reported finished
    pub stop_delay_ms: f64,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            viewport: ViewportOptions::default(),
            layer: LayerOptions::default(),
            cache: CacheOptions::default(),
            loader: LoaderOptions::default(),
            stop_delay_ms: DEFAULT_STOP_DELAY_MS,
        }
    }
}

impl ViewerOptions {
    /// Parses options from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Blank space around the viewer content, in container pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Margins {
    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportOptions {
    pub margins: Margins,
    pub spring_stiffness: f64,
    /// Seconds
    pub animation_time: f64,
    pub min_zoom_image_ratio: f64,
    pub max_zoom_pixel_ratio: f64,
    pub visibility_ratio: f64,
    pub min_zoom_level: Option<f64>,
    pub max_zoom_level: Option<f64>,
    pub default_zoom_level: Option<f64>,
    pub home_fills_viewer: bool,
    pub wrap_horizontal: bool,
    pub wrap_vertical: bool,
    pub constrain_during_pan: bool,
    pub degrees: f64,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            margins: Margins::default(),
            spring_stiffness: DEFAULT_SPRING_STIFFNESS,
            animation_time: DEFAULT_ANIMATION_TIME,
            min_zoom_image_ratio: DEFAULT_MIN_ZOOM_IMAGE_RATIO,
            max_zoom_pixel_ratio: DEFAULT_MAX_ZOOM_PIXEL_RATIO,
            visibility_ratio: DEFAULT_VISIBILITY_RATIO,
            min_zoom_level: None,
            max_zoom_level: None,
            default_zoom_level: None,
            home_fills_viewer: false,
            wrap_horizontal: false,
            wrap_vertical: false,
            constrain_during_pan: false,
            degrees: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerOptions {
    /// Left edge in viewport coordinates
    pub x: f64,
    /// Top edge in viewport coordinates
    pub y: f64,
    /// Width in viewport coordinates; wins over `height` when both are set
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub degrees: f64,
    /// Clip rectangle in image pixels
    pub clip: Option<Rect>,
    pub opacity: f64,
    pub min_zoom_image_ratio: f64,
    pub min_pixel_ratio: f64,
    /// Tile fade-in duration in seconds
    pub blend_time: f64,
    pub always_blend: bool,
    pub immediate_render: bool,
    pub wrap_horizontal: bool,
    pub wrap_vertical: bool,
    /// Keep requesting tiles even while the layer is hidden
    pub preload: bool,
    pub spring_stiffness: f64,
    /// Seconds
    pub animation_time: f64,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: None,
            height: None,
            degrees: 0.0,
            clip: None,
            opacity: 1.0,
            min_zoom_image_ratio: DEFAULT_MIN_ZOOM_IMAGE_RATIO,
            min_pixel_ratio: DEFAULT_MIN_PIXEL_RATIO,
            blend_time: DEFAULT_BLEND_TIME,
            always_blend: false,
            immediate_render: false,
            wrap_horizontal: false,
            wrap_vertical: false,
            preload: false,
            spring_stiffness: DEFAULT_SPRING_STIFFNESS,
            animation_time: DEFAULT_ANIMATION_TIME,
        }
    }
}

impl LayerOptions {
    pub fn blend_time_ms(&self) -> f64 {
        self.blend_time * 1000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub max_image_cache_count: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_image_cache_count: DEFAULT_MAX_IMAGE_CACHE_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Maximum concurrent jobs; 0 means unbounded
    pub image_loader_limit: usize,
    pub timeout_ms: f64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            image_loader_limit: DEFAULT_IMAGE_LOADER_LIMIT,
            timeout_ms: DEFAULT_LOADER_TIMEOUT_MS,
        }
    }
}

impl LoaderOptions {
    pub fn is_bounded(&self) -> bool {
        self.image_loader_limit > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performance_profile_presets() {
        let balanced = PerformanceProfile::Balanced.resolve();
        let low_memory = PerformanceProfile::LowMemory.resolve();
        let high_quality = PerformanceProfile::HighQuality.resolve();

        assert_eq!(balanced.cache.max_image_cache_count, DEFAULT_MAX_IMAGE_CACHE_COUNT);
        assert!(!balanced.loader.is_bounded());

        assert!(low_memory.cache.max_image_cache_count < balanced.cache.max_image_cache_count);
        assert!(low_memory.loader.is_bounded());

        assert!(high_quality.cache.max_image_cache_count > balanced.cache.max_image_cache_count);
        assert!(high_quality.layer.always_blend);
    }

    #[test]
    fn test_custom_profile_round_trips() {
        let mut options = ViewerOptions::default();
        options.cache.max_image_cache_count = 3;
        let resolved = PerformanceProfile::Custom(options.clone()).resolve();
        assert_eq!(resolved, options);
    }

    #[test]
    fn test_json_fills_missing_fields_with_defaults() {
        let json = r#"{
            "cache": { "max_image_cache_count": 12 },
            "viewport": { "wrap_horizontal": true }
        }"#;
        let options = ViewerOptions::from_json(json).unwrap();
        assert_eq!(options.cache.max_image_cache_count, 12);
        assert!(options.viewport.wrap_horizontal);
        assert_eq!(options.viewport.visibility_ratio, DEFAULT_VISIBILITY_RATIO);
        assert_eq!(options.layer.min_pixel_ratio, DEFAULT_MIN_PIXEL_RATIO);

        let json = options.to_json().unwrap();
        assert_eq!(ViewerOptions::from_json(&json).unwrap(), options);
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        let err = ViewerOptions::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::ViewerError::Config(_)));
    }

    #[test]
    fn test_margins() {
        let margins = Margins {
            left: 10.0,
            top: 5.0,
            right: 20.0,
            bottom: 15.0,
        };
        assert_eq!(margins.horizontal(), 30.0);
        assert_eq!(margins.vertical(), 20.0);
    }
}
