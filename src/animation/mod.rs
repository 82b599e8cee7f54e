//! Animation primitives

pub mod spring;

pub use spring::{spring_curve, AnimationValue, SpringOptions};
