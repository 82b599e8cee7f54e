#[cfg(test)]
mod viewer_integration_tests {
    use zoomlet::prelude::*;

    const CONTAINER: f64 = 1024.0;

    /// 2048px square with levels 0 (256px) to 3 (2048px)
    fn pyramid(name: &str) -> TileSource {
        let grid = TileGrid::new(2048, 2048, 256, 0)
            .unwrap()
            .with_levels(0, 3)
            .unwrap();
        TileSource::new(
            grid,
            SourceFormat::DeepZoom {
                base_url: format!("http://tiles/{}", name),
                extension: "png".to_string(),
            },
        )
    }

    fn layer_options() -> LayerOptions {
        LayerOptions {
            min_pixel_ratio: 0.5,
            blend_time: 0.0,
            ..LayerOptions::default()
        }
    }

    fn build(
        fetcher: Box<dyn TileFetcher>,
        clock: &ManualClock,
        events: EventSink,
    ) -> Viewer<RecordingDrawer> {
        ViewerBuilder::new()
            .with_container_size(Point::new(CONTAINER, CONTAINER))
            .with_layer_options(layer_options())
            .with_clock(clock.shared())
            .with_events(events)
            .with_fetcher(fetcher)
            .build()
            .unwrap()
    }

    fn run_until_loaded(viewer: &mut Viewer<RecordingDrawer>, clock: &ManualClock) {
        for _ in 0..500 {
            clock.advance(16.0);
            viewer.tick();
            if viewer.is_fully_loaded() && !viewer.is_animating() {
                return;
            }
        }
        panic!("viewer never finished loading");
    }

    #[test]
    fn test_native_resolution_draws_one_level() {
        let clock = ManualClock::new(0.0);
        let mut viewer = build(
            Box::new(ImmediateFetcher::new(256)),
            &clock,
            EventSink::disabled(),
        );
        let layer = viewer.open(pyramid("native")).unwrap();
        run_until_loaded(&mut viewer, &clock);

        let drawn = viewer.drawer().tiles_drawn();
        assert_eq!(drawn.len(), 16);
        assert!(drawn.iter().all(|(id, key, opacity)| {
            *id == layer && key.level == 2 && (*opacity - 1.0).abs() < 1e-9
        }));
        assert!(viewer.layer(layer).unwrap().coverage().provides_coverage(2));
    }

    #[test]
    fn test_zooming_in_switches_to_finer_level() {
        let clock = ManualClock::new(0.0);
        let mut viewer = build(
            Box::new(ImmediateFetcher::new(256)),
            &clock,
            EventSink::disabled(),
        );
        viewer.open(pyramid("zoom")).unwrap();
        run_until_loaded(&mut viewer, &clock);

        viewer.viewport_mut().zoom_to(2.0, None, true).unwrap();
        run_until_loaded(&mut viewer, &clock);

        let drawn = viewer.drawer().tiles_drawn();
        assert!(!drawn.is_empty());
        assert!(drawn.iter().all(|(_, key, _)| key.level == 3));
        // Only the central quarter of the finest level is on screen
        assert!(drawn
            .iter()
            .all(|(_, key, _)| (2..=6).contains(&key.x) && (2..=6).contains(&key.y)));
    }

    #[test]
    fn test_failed_tiles_leave_gaps_but_finish() {
        let clock = ManualClock::new(0.0);
        let missing = pyramid("gaps").tile_url(2, 1, 1);
        let (events, received) = EventSink::channel();
        let mut viewer = build(
            Box::new(ImmediateFetcher::new(256).with_missing(vec![missing.clone()])),
            &clock,
            events,
        );
        viewer.open(pyramid("gaps")).unwrap();
        run_until_loaded(&mut viewer, &clock);

        let failures: Vec<String> = received
            .try_iter()
            .filter_map(|event| match event {
                ViewerEvent::TileLoadFailed { url, .. } => Some(url),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec![missing]);
        assert!(!viewer
            .drawer()
            .tiles_drawn()
            .iter()
            .any(|(_, key, _)| *key == TileKey::new(2, 1, 1)));
    }

    #[test]
    fn test_completion_after_reset_is_discarded() {
        let clock = ManualClock::new(0.0);
        let fetcher = ManualFetcher::new();
        let mut viewer = build(Box::new(fetcher.clone()), &clock, EventSink::disabled());
        let layer = viewer.open(pyramid("reset")).unwrap();

        clock.advance(16.0);
        viewer.tick();
        let request = fetcher.pending_requests().remove(0);

        clock.advance(16.0);
        viewer.reset();
        fetcher.complete_next(Ok(TileImage::new(256, 256, vec![1, 2, 3])));
        clock.advance(16.0);
        viewer.tick();

        assert_eq!(viewer.cache().num_tiles_loaded(), 0);
        let tile = viewer.layer(layer).unwrap().tile(&request.tile.key);
        assert!(tile.map_or(true, |tile| !tile.loaded));
    }

    #[test]
    fn test_two_layers_share_one_cache() {
        let clock = ManualClock::new(0.0);
        let mut viewer = build(
            Box::new(ImmediateFetcher::new(256)),
            &clock,
            EventSink::disabled(),
        );
        let first = viewer.open(pyramid("first")).unwrap();
        let second = viewer
            .add_layer(
                pyramid("second"),
                LayerOptions {
                    x: 1.0,
                    ..layer_options()
                },
                None,
            )
            .unwrap();
        viewer.viewport_mut().go_home(true).unwrap();
        run_until_loaded(&mut viewer, &clock);

        assert_eq!(viewer.world().home_bounds(), Rect::new(0.0, 0.0, 2.0, 1.0));
        let drawn = viewer.drawer().tiles_drawn();
        assert!(drawn.iter().any(|(id, _, _)| *id == first));
        assert!(drawn.iter().any(|(id, _, _)| *id == second));

        assert!(viewer.remove_layer(first));
        assert!(viewer.world().item(first).is_none());
        assert_eq!(viewer.world().home_bounds(), Rect::new(1.0, 0.0, 1.0, 1.0));
        assert_eq!(viewer.viewport().content_bounds(), Rect::new(1.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_small_cache_stays_bounded_while_panning() {
        let clock = ManualClock::new(0.0);
        let mut viewer = ViewerBuilder::new()
            .with_container_size(Point::new(CONTAINER, CONTAINER))
            .with_options(ViewerOptions {
                layer: layer_options(),
                cache: CacheOptions {
                    max_image_cache_count: 40,
                },
                ..ViewerOptions::default()
            })
            .with_clock(clock.shared())
            .with_fetcher(Box::new(ImmediateFetcher::new(256)))
            .build()
            .unwrap();
        // Full Deep Zoom pyramid: levels 0..=8 fit in one tile and are
        // never evicted, levels 9..=11 are
        let source =
            TileSource::deep_zoom("http://tiles/pan", "png", 2048, 2048, 256, 0).unwrap();
        viewer.open(source).unwrap();
        viewer.viewport_mut().zoom_to(2.0, None, true).unwrap();

        for step in 0..6 {
            let center = Point::new(0.25 + 0.1 * step as f64, 0.5);
            viewer.viewport_mut().pan_to(center, true).unwrap();
            run_until_loaded(&mut viewer, &clock);
            let drawn = viewer.drawer().tiles_drawn().len();
            assert!(viewer.cache().num_images_loaded() <= 40 + drawn + 9);
        }
    }

    #[test]
    fn test_tms_cache_stays_bounded_while_panning() {
        let clock = ManualClock::new(0.0);
        let mut viewer = ViewerBuilder::new()
            .with_container_size(Point::new(CONTAINER, CONTAINER))
            .with_options(ViewerOptions {
                layer: layer_options(),
                cache: CacheOptions {
                    max_image_cache_count: 10,
                },
                ..ViewerOptions::default()
            })
            .with_clock(clock.shared())
            .with_fetcher(Box::new(ImmediateFetcher::new(256)))
            .build()
            .unwrap();
        // Levels 0..=5, only level 0 fits in one tile
        let source = TileSource::tms("http://tiles/tms", 8192, 8192, 256).unwrap();
        viewer.open(source).unwrap();
        viewer.viewport_mut().zoom_to(8.0, None, true).unwrap();

        let mut most_drawn = 0;
        for step in 0..10 {
            let center = Point::new(0.1 + 0.08 * step as f64, 0.5);
            viewer.viewport_mut().pan_to(center, true).unwrap();
            for _ in 0..500 {
                clock.advance(16.0);
                viewer.tick();
                most_drawn = most_drawn.max(viewer.drawer().tiles_drawn().len());
                if viewer.is_fully_loaded() && !viewer.is_animating() {
                    break;
                }
            }
            // Beyond the bound only drawn tiles, the single-tile level and
            // the insert in progress are kept
            assert!(viewer.cache().num_images_loaded() <= 10 + most_drawn + 1);
        }
    }
}
