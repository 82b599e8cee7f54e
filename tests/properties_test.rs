#[cfg(test)]
mod properties_tests {
    use zoomlet::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn viewport(clock: &ManualClock, options: ViewportOptions) -> Viewport {
        let mut viewport =
            Viewport::new(Point::new(800.0, 600.0), options, clock.shared()).unwrap();
        viewport.set_content_bounds(Rect::new(0.0, 0.0, 1.0, 0.75), 4000.0);
        viewport.go_home(true).unwrap();
        viewport.update();
        viewport
    }

    #[test]
    fn test_springs_reach_their_targets() {
        let clock = ManualClock::new(0.0);
        for stiffness in [0.5, 3.0, 6.5, 12.0] {
            for (start, target) in [(0.0, 1.0), (5.0, -3.0), (0.25, 0.2501)] {
                let mut value = AnimationValue::new(
                    SpringOptions {
                        initial: start,
                        stiffness,
                        animation_time: 0.8,
                        exponential: false,
                    },
                    clock.shared(),
                )
                .unwrap();
                value.animate_to(target).unwrap();
                for _ in 0..10 {
                    clock.advance(100.0);
                    value.update();
                }
                assert!(value.is_at_target());
                assert!(close(value.current_value(), target));
            }
        }
    }

    #[test]
    fn test_exponential_zoom_spring_converges() {
        let clock = ManualClock::new(0.0);
        let mut value = AnimationValue::new(
            SpringOptions {
                initial: 0.5,
                exponential: true,
                ..SpringOptions::default()
            },
            clock.shared(),
        )
        .unwrap();
        value.animate_to(16.0).unwrap();
        let mut previous = value.current_value();
        while !value.is_at_target() {
            clock.advance(50.0);
            value.update();
            assert!(value.current_value() >= previous);
            previous = value.current_value();
        }
        assert!(close(value.current_value(), 16.0));
    }

    #[test]
    fn test_pixel_round_trip_across_view_states() {
        let clock = ManualClock::new(0.0);
        let mut viewport = viewport(
            &clock,
            ViewportOptions {
                margins: Margins {
                    left: 12.0,
                    top: 4.0,
                    right: 30.0,
                    bottom: 0.0,
                },
                ..ViewportOptions::default()
            },
        );
        let points = [
            Point::new(0.0, 0.0),
            Point::new(0.5, 0.375),
            Point::new(-0.3, 1.7),
            Point::new(0.91, 0.04),
        ];
        for (degrees, zoom) in [(0.0, 1.0), (90.0, 2.5), (211.0, 0.7), (359.0, 8.0)] {
            viewport.set_rotation(degrees);
            viewport.zoom_to(zoom, Some(Point::new(0.4, 0.3)), false).unwrap();
            clock.advance(150.0);
            viewport.update();
            for point in points {
                for current in [true, false] {
                    let pixel = viewport.pixel_from_point(&point, current);
                    let back = viewport.point_from_pixel(&pixel, current);
                    assert!(close(back.x, point.x) && close(back.y, point.y));
                }
            }
        }
    }

    #[test]
    fn test_constraints_clamp_zoom() {
        let clock = ManualClock::new(0.0);
        let mut viewport = viewport(&clock, ViewportOptions::default());
        for zoom in [1e-4, 0.01, 0.3, 1.0, 7.0, 250.0, 1e6] {
            viewport.zoom_to(zoom, None, true).unwrap();
            viewport.apply_constraints(true).unwrap();
            viewport.update();
            let zoom = viewport.zoom(true);
            assert!(zoom >= viewport.min_zoom() - 1e-9);
            assert!(zoom <= viewport.max_zoom() + 1e-9);
        }
    }

    #[test]
    fn test_zoom_about_point_keeps_it_under_cursor() {
        let clock = ManualClock::new(0.0);
        let mut viewport = viewport(&clock, ViewportOptions::default());
        let reference = Point::new(0.8, 0.1);
        let start = viewport.pixel_from_point(&reference, true);

        viewport.zoom_to(2.0, Some(reference), false).unwrap();
        while viewport.is_animating() {
            clock.advance(16.0);
            viewport.update();
            let pixel = viewport.pixel_from_point(&reference, true);
            assert!(pixel.distance_to(&start) < 1.0);
        }
    }

    fn tile(level: u32, x: i64, cache_key: &str, touched: f64) -> Tile {
        let mut tile = Tile::new(
            TileKey::new(level, x, 0),
            Rect::new(0.0, 0.0, 0.1, 0.1),
            true,
            format!("http://tiles/{}", cache_key),
            cache_key.to_string(),
        );
        tile.last_touch_time = touched;
        tile
    }

    fn image() -> TileImage {
        TileImage::new(256, 256, vec![0; 16])
    }

    #[test]
    fn test_eviction_keeps_image_count_bounded() {
        let layer = LayerId::next();
        let mut cache = TileCache::new(5);
        for step in 0..60 {
            let level = 10 + (step % 3) as u32;
            let key = format!("img-{}", step);
            cache.cache_tile(&tile(level, step, &key, step as f64), layer, image(), 0);
            assert!(cache.num_images_loaded() <= 5);
        }
    }

    #[test]
    fn test_shared_record_survives_until_last_tile_evicted() {
        let layer = LayerId::next();
        let mut cache = TileCache::new(1);
        cache.cache_tile(&tile(9, 0, "shared", 1.0), layer, image(), 0);
        cache.cache_tile(&tile(9, 1, "shared", 2.0), layer, image(), 0);
        assert_eq!(cache.num_images_loaded(), 1);
        assert_eq!(cache.image_record("shared").unwrap().tile_count(), 2);

        cache.cache_tile(&tile(9, 2, "other", 3.0), layer, image(), 0);
        assert!(cache.image_record("shared").is_some());
        assert_eq!(cache.image_record("shared").unwrap().tile_count(), 1);

        cache.cache_tile(&tile(9, 3, "third", 4.0), layer, image(), 0);
        assert!(cache.image_record("shared").is_none());
    }

    #[test]
    fn test_drawn_tile_is_never_evicted() {
        let layer = LayerId::next();
        let mut cache = TileCache::new(1);
        let mut protected = tile(9, 0, "protected", 1.0);
        protected.being_drawn = true;
        cache.cache_tile(&protected, layer, image(), 0);
        cache.cache_tile(&tile(9, 1, "fresh", 2.0), layer, image(), 0);

        assert_eq!(cache.num_images_loaded(), 2);
        assert!(cache.contains(&protected.id(layer)));
    }
}
