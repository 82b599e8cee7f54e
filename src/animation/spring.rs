//! Time-driven scalar animation used for pan, zoom, layer placement and
//! rotation.

use serde::{Deserialize, Serialize};

use crate::core::clock::SharedClock;
use crate::core::constants::{DEFAULT_ANIMATION_TIME, DEFAULT_SPRING_STIFFNESS};
use crate::{Result, ViewerError};

/// Construction parameters for an [`AnimationValue`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringOptions {
    pub initial: f64,
    pub stiffness: f64,
    /// Animation length in seconds
    pub animation_time: f64,
    /// Interpolate in log space; the value must stay strictly positive
    pub exponential: bool,
}

impl Default for SpringOptions {
    fn default() -> Self {
        Self {
            initial: 0.0,
            stiffness: DEFAULT_SPRING_STIFFNESS,
            animation_time: DEFAULT_ANIMATION_TIME,
            exponential: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Keyframe {
    value: f64,
    time: f64,
}

/// Easing curve `(1 - e^{-k s}) / (1 - e^{-k})`, linear when `k` is zero.
pub fn spring_curve(stiffness: f64, s: f64) -> f64 {
    let s = s.clamp(0.0, 1.0);
    if stiffness.abs() < f64::EPSILON {
        return s;
    }
    (1.0 - (-stiffness * s).exp()) / (1.0 - (-stiffness).exp())
}

/// A scalar that eases from a start value to a target over a fixed duration.
#[derive(Debug, Clone)]
pub struct AnimationValue {
    start: Keyframe,
    target: Keyframe,
    current: Keyframe,
    stiffness: f64,
    duration_ms: f64,
    exponential: bool,
    clock: SharedClock,
}

impl AnimationValue {
    pub fn new(options: SpringOptions, clock: SharedClock) -> Result<Self> {
        if options.exponential {
            check_exponential(options.initial)?;
        }
        if !options.animation_time.is_finite() || options.animation_time < 0.0 {
            return Err(ViewerError::InvalidValue(format!(
                "animation time must be a non-negative number, got {}",
                options.animation_time
            )));
        }
        let now = clock.now_ms();
        let frame = Keyframe {
            value: options.initial,
            time: now,
        };
        Ok(Self {
            start: frame,
            target: frame,
            current: frame,
            stiffness: options.stiffness,
            duration_ms: options.animation_time * 1000.0,
            exponential: options.exponential,
            clock,
        })
    }

    /// Snaps start, target and current to `value`.
    pub fn reset_to(&mut self, value: f64) -> Result<()> {
        if self.exponential {
            check_exponential(value)?;
        }
        let now = self.clock.now_ms();
        let frame = Keyframe { value, time: now };
        self.start = frame;
        self.target = frame;
        self.current = frame;
        Ok(())
    }

    /// Starts easing from the current value towards `target`.
    pub fn animate_to(&mut self, target: f64) -> Result<()> {
        if self.exponential {
            check_exponential(target)?;
        }
        let now = self.clock.now_ms();
        self.start = Keyframe {
            value: self.current.value,
            time: now,
        };
        self.target = Keyframe {
            value: target,
            time: now + self.duration_ms,
        };
        Ok(())
    }

    /// Translates the whole curve by `delta` without restarting its timing.
    pub fn shift_by(&mut self, delta: f64) -> Result<()> {
        if self.exponential {
            check_exponential(self.start.value + delta)?;
            check_exponential(self.target.value + delta)?;
            check_exponential(self.current.value + delta)?;
        }
        self.start.value += delta;
        self.target.value += delta;
        self.current.value += delta;
        Ok(())
    }

    /// Recomputes the current value from elapsed time. Returns whether it
    /// changed.
    pub fn update(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.current.time = now;
        let old = self.current.value;

        let value = if now >= self.target.time {
            self.target.value
        } else {
            let span = self.target.time - self.start.time;
            let s = if span > 0.0 {
                (now - self.start.time) / span
            } else {
                1.0
            };
            let eased = spring_curve(self.stiffness, s);
            if self.exponential {
                let from = self.start.value.ln();
                let to = self.target.value.ln();
                (from + (to - from) * eased).exp()
            } else {
                self.start.value + (self.target.value - self.start.value) * eased
            }
        };

        self.current.value = value;
        old != value
    }

    pub fn is_at_target(&self) -> bool {
        self.current.value == self.target.value
    }

    pub fn current_value(&self) -> f64 {
        self.current.value
    }

    pub fn target_value(&self) -> f64 {
        self.target.value
    }

    pub fn start_value(&self) -> f64 {
        self.start.value
    }

    pub fn target_time(&self) -> f64 {
        self.target.time
    }

    pub fn is_exponential(&self) -> bool {
        self.exponential
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Switches interpolation mode; rejected if the held values cannot be
    /// interpolated in log space.
    pub fn set_exponential(&mut self, exponential: bool) -> Result<()> {
        if exponential {
            check_exponential(self.start.value)?;
            check_exponential(self.target.value)?;
            check_exponential(self.current.value)?;
        }
        self.exponential = exponential;
        Ok(())
    }
}

fn check_exponential(value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ViewerError::InvalidValue(format!(
            "exponential animation requires a positive value, got {}",
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn spring(clock: &ManualClock, initial: f64, exponential: bool) -> AnimationValue {
        AnimationValue::new(
            SpringOptions {
                initial,
                exponential,
                ..Default::default()
            },
            clock.shared(),
        )
        .unwrap()
    }

    #[test]
    fn test_curve_endpoints() {
        assert_eq!(spring_curve(6.5, 0.0), 0.0);
        assert!((spring_curve(6.5, 1.0) - 1.0).abs() < 1e-12);
        assert_eq!(spring_curve(0.0, 0.25), 0.25);
        assert!(spring_curve(6.5, 0.5) > 0.5);
    }

    #[test]
    fn test_converges_to_target() {
        let clock = ManualClock::new(0.0);
        let mut value = spring(&clock, 0.0, false);
        value.animate_to(10.0).unwrap();

        let mut last = 0.0;
        for _ in 0..12 {
            clock.advance(100.0);
            value.update();
            assert!(value.current_value() >= last);
            last = value.current_value();
        }
        clock.advance(100.0);
        value.update();
        assert_eq!(value.current_value(), 10.0);
        assert!(value.is_at_target());
    }

    #[test]
    fn test_exponential_interpolates_in_log_space() {
        let clock = ManualClock::new(0.0);
        let mut value = spring(&clock, 1.0, true);
        value.animate_to(4.0).unwrap();

        clock.advance(600.0);
        value.update();
        let eased = spring_curve(DEFAULT_SPRING_STIFFNESS, 0.5);
        let expected = (4.0_f64.ln() * eased).exp();
        assert!((value.current_value() - expected).abs() < 1e-9);

        clock.advance(600.0);
        value.update();
        assert_eq!(value.current_value(), 4.0);
    }

    #[test]
    fn test_exponential_rejects_non_positive() {
        let clock = ManualClock::new(0.0);
        let err = AnimationValue::new(
            SpringOptions {
                initial: 0.0,
                exponential: true,
                ..Default::default()
            },
            clock.shared(),
        );
        assert!(matches!(err, Err(ViewerError::InvalidValue(_))));

        let mut value = spring(&clock, 1.0, true);
        assert!(value.animate_to(0.0).is_err());
        assert!(value.reset_to(-2.0).is_err());
        assert!(value.shift_by(-1.0).is_err());
        assert_eq!(value.target_value(), 1.0);
    }

    #[test]
    fn test_shift_by_keeps_timing() {
        let clock = ManualClock::new(0.0);
        let mut value = spring(&clock, 0.0, false);
        value.animate_to(1.0).unwrap();
        clock.advance(300.0);
        value.update();
        let before = value.current_value();
        let target_time = value.target_time();

        value.shift_by(5.0).unwrap();
        assert_eq!(value.target_time(), target_time);
        value.update();
        assert!((value.current_value() - (before + 5.0)).abs() < 1e-12);
        assert_eq!(value.target_value(), 6.0);
    }

    #[test]
    fn test_reset_to_snaps_immediately() {
        let clock = ManualClock::new(0.0);
        let mut value = spring(&clock, 0.0, false);
        value.animate_to(3.0).unwrap();
        value.reset_to(7.0).unwrap();
        assert_eq!(value.current_value(), 7.0);
        assert!(value.is_at_target());
        assert!(!value.update());
    }
}
