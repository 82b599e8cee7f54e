//! Viewer builder for fluent configuration
//!
//! `ViewerBuilder` collects the container size, a performance profile and
//! the collaborators (clock, event sink, tile fetcher) before assembling a
//! [`Viewer`].

use crate::{
    core::{
        clock::{SharedClock, SystemClock},
        config::{LayerOptions, PerformanceProfile, ViewerOptions},
        geo::Point,
        viewer::Viewer,
    },
    events::EventSink,
    rendering::drawer::{Drawer, RecordingDrawer},
    tiles::loader::TileFetcher,
    Result, ViewerError,
};

/// Builder for creating and configuring Viewer instances
#[derive(Debug)]
pub struct ViewerBuilder {
    container_size: Point,
    /// Performance configuration
    performance: PerformanceProfile,
    layer_options: Option<LayerOptions>,
    clock: Option<SharedClock>,
    events: EventSink,
    fetcher: Option<Box<dyn TileFetcher>>,
}

impl ViewerBuilder {
    /// Create a new ViewerBuilder with default settings
    pub fn new() -> Self {
        Self {
            container_size: Point::new(800.0, 600.0),
            performance: PerformanceProfile::default(),
            layer_options: None,
            clock: None,
            events: EventSink::disabled(),
            fetcher: None,
        }
    }

    /// Set the container size in pixels
    pub fn with_container_size(mut self, size: Point) -> Self {
        self.container_size = size;
        self
    }

    /// Set the performance profile
    pub fn with_performance(mut self, profile: PerformanceProfile) -> Self {
        self.performance = profile;
        self
    }

    /// Set fully custom options
    pub fn with_options(mut self, options: ViewerOptions) -> Self {
        self.performance = PerformanceProfile::Custom(options);
        self
    }

    /// Override the layer template of whichever profile is chosen
    pub fn with_layer_options(mut self, options: LayerOptions) -> Self {
        self.layer_options = Some(options);
        self
    }

    /// Use a specific time source, typically a `ManualClock` in tests
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Set the transport used to fetch tiles
    pub fn with_fetcher(mut self, fetcher: Box<dyn TileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Build a viewer that records its draw commands
    pub fn build(self) -> Result<Viewer<RecordingDrawer>> {
        let drawer = RecordingDrawer::new(self.container_size);
        self.build_with_drawer(drawer)
    }

    /// Build the viewer around a host-provided drawer
    pub fn build_with_drawer<D: Drawer>(self, drawer: D) -> Result<Viewer<D>> {
        let fetcher = self
            .fetcher
            .ok_or_else(|| ViewerError::InvalidValue("No tile fetcher specified".to_string()))?;

        let mut options = self.performance.resolve();
        if let Some(layer) = self.layer_options {
            options.layer = layer;
        }
        let clock = self.clock.unwrap_or_else(SystemClock::shared);

        Viewer::new(
            self.container_size,
            options,
            drawer,
            fetcher,
            clock,
            self.events,
        )
    }
}

impl Default for ViewerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience methods for common viewer configurations
impl ViewerBuilder {
    /// Small cache and few concurrent loads, for constrained devices
    pub fn low_memory(size: Point) -> Self {
        Self::new()
            .with_container_size(size)
            .with_performance(PerformanceProfile::LowMemory)
    }

    /// Large cache and more concurrent loads
    pub fn high_quality(size: Point) -> Self {
        Self::new()
            .with_container_size(size)
            .with_performance(PerformanceProfile::HighQuality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::tiles::loader::ImmediateFetcher;

    #[test]
    fn test_builder_requires_fetcher() {
        let result = ViewerBuilder::new().build();
        assert!(matches!(result, Err(ViewerError::InvalidValue(_))));
    }

    #[test]
    fn test_builder_applies_profile() {
        let viewer = ViewerBuilder::low_memory(Point::new(640.0, 480.0))
            .with_clock(ManualClock::new(0.0).shared())
            .with_fetcher(Box::new(ImmediateFetcher::new(256)))
            .build()
            .unwrap();

        let expected = PerformanceProfile::LowMemory.resolve();
        assert_eq!(
            viewer.cache().max_image_cache_count(),
            expected.cache.max_image_cache_count
        );
        assert_eq!(viewer.loader().job_limit(), expected.loader.image_loader_limit);
        assert_eq!(viewer.viewport().container_size(), Point::new(640.0, 480.0));
        assert_eq!(viewer.drawer().canvas_size(), Point::new(640.0, 480.0));
    }

    #[test]
    fn test_layer_options_override_profile() {
        let layer = LayerOptions {
            blend_time: 0.0,
            ..LayerOptions::default()
        };
        let viewer = ViewerBuilder::high_quality(Point::new(640.0, 480.0))
            .with_layer_options(layer.clone())
            .with_fetcher(Box::new(ImmediateFetcher::new(256)))
            .build()
            .unwrap();
        assert_eq!(viewer.options().layer, layer);
    }
}
