//! Event Bus — session lifecycle notifications for anyone who cares to listen.

use std::fmt;

use tokio::sync::broadcast;

/// Why a session left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    /// The store was over capacity.
    Capacity,
    /// The session sat idle past the configured timeout.
    Expired,
}

impl fmt::Display for EvictionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity => write!(f, "capacity"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Events published by the session store and the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created {
        session_id: String,
    },
    ModeChanged {
        session_id: String,
        coding: bool,
        project: String,
    },
    Evicted {
        session_id: String,
        cause: EvictionCause,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Created { session_id }
            | Self::ModeChanged { session_id, .. }
            | Self::Evicted { session_id, .. } => session_id,
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { session_id } => write!(f, "session {} created", session_id),
            Self::ModeChanged {
                session_id,
                coding: true,
                project,
            } => write!(f, "session {} entered coding mode: {:?}", session_id, project),
            Self::ModeChanged { session_id, .. } => {
                write!(f, "session {} returned to chat mode", session_id)
            }
            Self::Evicted { session_id, cause } => {
                write!(f, "session {} evicted ({})", session_id, cause)
            }
        }
    }
}

/// Broadcast bus for [`SessionEvent`]s.
///
/// Cloning is cheap and every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(SessionEvent::Created {
            session_id: "s1".into(),
        });
    }

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.clone().publish(SessionEvent::Evicted {
            session_id: "s1".into(),
            cause: EvictionCause::Expired,
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.session_id(), "s1");
        assert_eq!(event.to_string(), "session s1 evicted (expired)");
    }
}
