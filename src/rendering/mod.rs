pub mod drawer;

pub use drawer::{BlendOptions, DrawCommand, Drawer, RecordingDrawer};
