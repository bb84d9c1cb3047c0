//! Event types for the WKMP audio event system
//!
//! Provides the shared AudioEvent definitions and the EventBus that carries
//! them from the streaming engine to the embedding application.

mod stream_types;

pub use stream_types::{SoundCategory, StopReason, StreamPlayState};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Audio engine notifications
///
/// All notifications are fire-and-forget: the engine never waits for a
/// subscriber and never fails because nobody is listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AudioEvent {
    /// Stream started (or restarted) playback
    StreamPlay {
        /// Stream that started
        stream_id: Uuid,
        /// State before the play call
        previous_state: StreamPlayState,
        /// When playback started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Stream stopped
    ///
    /// Not emitted for silent transitions (from Standby or WasPlaying).
    StreamStop {
        /// Stream that stopped
        stream_id: Uuid,
        /// State before the stop
        previous_state: StreamPlayState,
        /// Why the stream stopped
        reason: StopReason,
        /// When the stream stopped
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A device list differs from the last enumeration
    DeviceListChanged {
        /// true for playback devices, false for capture devices
        is_playback: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Device monitor asked for a full audio context rebuild
    ReinitRequested {
        /// Number of discrepancies found (1 when the fresh list could not be read)
        discrepancies: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Reinit protocol finished
    ReinitComplete {
        /// false when no device could be opened
        success: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl AudioEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            AudioEvent::StreamPlay { .. } => "StreamPlay",
            AudioEvent::StreamStop { .. } => "StreamStop",
            AudioEvent::DeviceListChanged { .. } => "DeviceListChanged",
            AudioEvent::ReinitRequested { .. } => "ReinitRequested",
            AudioEvent::ReinitComplete { .. } => "ReinitComplete",
        }
    }

    /// Stream the event refers to, if any
    pub fn stream_id(&self) -> Option<Uuid> {
        match self {
            AudioEvent::StreamPlay { stream_id, .. } | AudioEvent::StreamStop { stream_id, .. } => {
                Some(*stream_id)
            }
            _ => None,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// Receivers can be drained from synchronous code with `try_recv()`; the
/// engine threads never need a tokio runtime.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AudioEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AudioEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.emit_lossy(AudioEvent::ReinitComplete {
            success: true,
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.emit_lossy(AudioEvent::StreamPlay {
            stream_id: id,
            previous_state: StreamPlayState::Standby,
            timestamp: chrono::Utc::now(),
        });
        bus.emit_lossy(AudioEvent::StreamStop {
            stream_id: id,
            previous_state: StreamPlayState::Playing,
            reason: StopReason::Requested,
            timestamp: chrono::Utc::now(),
        });

        let first = rx.try_recv().expect("first event");
        let second = rx.try_recv().expect("second event");
        assert_eq!(first.event_type(), "StreamPlay");
        assert_eq!(second.event_type(), "StreamStop");
        assert_eq!(second.stream_id(), Some(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = AudioEvent::StreamStop {
            stream_id: Uuid::nil(),
            previous_state: StreamPlayState::Finishing,
            reason: StopReason::UnqueueNeeded,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StreamStop");
        assert_eq!(json["previous_state"], "finishing");
        assert_eq!(json["reason"], "unqueue_needed");
    }

    #[test]
    fn test_device_events_have_no_stream() {
        let event = AudioEvent::DeviceListChanged {
            is_playback: true,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.stream_id(), None);
    }
}
