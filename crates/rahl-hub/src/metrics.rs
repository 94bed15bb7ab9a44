//! Runtime metrics — request outcomes and session lifecycle counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

use rahl_core::bus::SessionEvent;

/// Global metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,
    pub requests_invalid: AtomicU64,
    pub parse_fallbacks: AtomicU64,
    pub sessions_created: AtomicU64,
    pub sessions_evicted: AtomicU64,
    pub coding_entered: AtomicU64,
    pub coding_exited: AtomicU64,
    pub repos_created: AtomicU64,
    start_time: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_request(&self, success: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_invalid(&self) {
        self.requests_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_fallback(&self) {
        self.parse_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repo_created(&self) {
        self.repos_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a session event into the counters.
    pub fn observe(&self, event: &SessionEvent) {
        let counter = match event {
            SessionEvent::Created { .. } => &self.sessions_created,
            SessionEvent::Evicted { .. } => &self.sessions_evicted,
            SessionEvent::ModeChanged { coding: true, .. } => &self.coding_entered,
            SessionEvent::ModeChanged { coding: false, .. } => &self.coding_exited,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Export as JSON.
    pub fn to_json(&self, live_sessions: u64) -> serde_json::Value {
        let uptime = self.uptime_secs();
        let hours = uptime / 3600;
        let minutes = (uptime % 3600) / 60;
        let seconds = uptime % 60;

        serde_json::json!({
            "uptime": format!("{}h {}m {}s", hours, minutes, seconds),
            "uptime_secs": uptime,
            "requests": {
                "total": self.requests_total.load(Ordering::Relaxed),
                "success": self.requests_success.load(Ordering::Relaxed),
                "errors": self.requests_error.load(Ordering::Relaxed),
                "invalid": self.requests_invalid.load(Ordering::Relaxed),
                "parse_fallbacks": self.parse_fallbacks.load(Ordering::Relaxed),
            },
            "sessions": {
                "live": live_sessions,
                "created": self.sessions_created.load(Ordering::Relaxed),
                "evicted": self.sessions_evicted.load(Ordering::Relaxed),
            },
            "coding_mode": {
                "entered": self.coding_entered.load(Ordering::Relaxed),
                "exited": self.coding_exited.load(Ordering::Relaxed),
            },
            "repos_created": self.repos_created.load(Ordering::Relaxed),
        })
    }
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

pub fn new_metrics() -> SharedMetrics {
    Arc::new(Metrics::new())
}

/// Feed session events into `metrics` until the bus closes.
pub fn spawn_event_listener(
    metrics: SharedMetrics,
    mut rx: broadcast::Receiver<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => metrics.observe(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Metrics listener lagged, {} session event(s) dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rahl_core::bus::{EventBus, EvictionCause};

    #[test]
    fn test_observe_events() {
        let metrics = Metrics::new();
        metrics.observe(&SessionEvent::Created {
            session_id: "s1".into(),
        });
        metrics.observe(&SessionEvent::ModeChanged {
            session_id: "s1".into(),
            coding: true,
            project: "build x".into(),
        });
        metrics.observe(&SessionEvent::Evicted {
            session_id: "s1".into(),
            cause: EvictionCause::Capacity,
        });
        metrics.record_request(true);
        metrics.record_request(false);

        let json = metrics.to_json(0);
        assert_eq!(json["sessions"]["created"], 1);
        assert_eq!(json["sessions"]["evicted"], 1);
        assert_eq!(json["coding_mode"]["entered"], 1);
        assert_eq!(json["coding_mode"]["exited"], 0);
        assert_eq!(json["requests"]["total"], 2);
        assert_eq!(json["requests"]["errors"], 1);
    }

    #[tokio::test]
    async fn test_listener_stops_when_bus_dropped() {
        let metrics = new_metrics();
        let bus = EventBus::default();
        let handle = spawn_event_listener(metrics.clone(), bus.subscribe());

        bus.publish(SessionEvent::Created {
            session_id: "s1".into(),
        });
        drop(bus);
        handle.await.unwrap();

        assert_eq!(metrics.sessions_created.load(Ordering::Relaxed), 1);
    }
}
