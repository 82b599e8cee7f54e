pub mod builder;
pub mod clock;
pub mod config;
pub mod constants;
pub mod geo;
pub mod viewer;
pub mod viewport;
