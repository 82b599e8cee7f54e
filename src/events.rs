use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::core::geo::Rect;
use crate::tiles::tile::{LayerId, TileId};

/// Notifications raised by the viewer, its world, its layers and the cache
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// A tile image arrived and was cached
    TileLoaded { tile: TileId, cache_key: String },
    /// A fetch failed; the tile is marked as nonexistent
    TileLoadFailed {
        tile: TileId,
        url: String,
        message: String,
    },
    /// The cache evicted or cleared a tile
    TileUnloaded { tile: TileId },
    FullyLoadedChange { layer: LayerId, fully_loaded: bool },
    BoundsChange { layer: LayerId, bounds: Rect },
    ClipChange { layer: LayerId, clip: Option<Rect> },
    OpacityChange { layer: LayerId, opacity: f64 },
    /// World home bounds or content factor changed
    MetricsChange { home_bounds: Rect, content_factor: f64 },
    AddItem { layer: LayerId, index: usize },
    RemoveItem { layer: LayerId },
    ItemIndexChange {
        layer: LayerId,
        previous: usize,
        index: usize,
    },
    AnimationStart,
    AnimationFinish,
}

impl ViewerEvent {
    /// Layer the event concerns, if any
    pub fn layer(&self) -> Option<LayerId> {
        match self {
            ViewerEvent::TileLoaded { tile, .. }
            | ViewerEvent::TileLoadFailed { tile, .. }
            | ViewerEvent::TileUnloaded { tile } => Some(tile.layer),
            ViewerEvent::FullyLoadedChange { layer, .. }
            | ViewerEvent::BoundsChange { layer, .. }
            | ViewerEvent::ClipChange { layer, .. }
            | ViewerEvent::OpacityChange { layer, .. }
            | ViewerEvent::AddItem { layer, .. }
            | ViewerEvent::RemoveItem { layer }
            | ViewerEvent::ItemIndexChange { layer, .. } => Some(*layer),
            ViewerEvent::MetricsChange { .. }
            | ViewerEvent::AnimationStart
            | ViewerEvent::AnimationFinish => None,
        }
    }
}

/// Sending half of the event stream. A disabled sink drops everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<ViewerEvent>>,
}

impl EventSink {
    pub fn new(sender: Sender<ViewerEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Creates a sink together with the receiver observing it
    pub fn channel() -> (Self, Receiver<ViewerEvent>) {
        let (sender, receiver) = unbounded();
        (Self::new(sender), receiver)
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn emit(&self, event: ViewerEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                log::trace!("event receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delivers_in_order() {
        let (sink, events) = EventSink::channel();
        let layer = LayerId::next();
        sink.emit(ViewerEvent::AnimationStart);
        sink.emit(ViewerEvent::RemoveItem { layer });

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![ViewerEvent::AnimationStart, ViewerEvent::RemoveItem { layer }]
        );
        assert_eq!(received[1].layer(), Some(layer));
    }

    #[test]
    fn test_disabled_and_dropped_receiver() {
        EventSink::disabled().emit(ViewerEvent::AnimationFinish);

        let (sink, events) = EventSink::channel();
        drop(events);
        sink.emit(ViewerEvent::AnimationFinish);
        assert!(sink.is_enabled());
    }
}
