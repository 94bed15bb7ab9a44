//! Session store — per-conversation state keyed by a caller-supplied id.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bus::{EventBus, EvictionCause, SessionEvent};
use crate::config::SessionSettings;
use crate::message::{ChatMessage, Role};

/// Behavioral mode of a conversation.
///
/// A coding session always carries the request that started it, so there
/// is no way to be "coding" without a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Chat,
    Coding {
        project: String,
    },
}

impl Mode {
    pub fn is_coding(&self) -> bool {
        matches!(self, Self::Coding { .. })
    }

    /// The active build request, or `""` while chatting.
    pub fn project(&self) -> &str {
        match self {
            Self::Coding { project } => project,
            Self::Chat => "",
        }
    }
}

/// Session state for a single conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    history: Vec<ChatMessage>,
    mode: Mode,
    files: BTreeMap<String, String>,
}

impl Session {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            history: Vec::new(),
            mode: Mode::Chat,
            files: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full exchange log, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The most recent `n` turns (or fewer, if the history is shorter).
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn is_coding_mode(&self) -> bool {
        self.mode.is_coding()
    }

    pub fn current_project(&self) -> &str {
        self.mode.project()
    }

    /// Generated files accumulated across coding replies.
    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    /// Append a turn to the history. Turns are never edited afterwards.
    pub fn append_turn(&mut self, role: Role, content: &str) {
        self.history.push(ChatMessage {
            role,
            content: content.to_string(),
        });
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Merge generated files: same-named entries are overwritten, the rest kept.
    pub fn merge_files(&mut self, files: BTreeMap<String, String>) {
        self.files.extend(files);
    }
}

/// Shared, exclusively-lockable handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Session store — a bounded cache of live conversations.
///
/// Lookup-or-insert is atomic per id. Each session sits behind its own async
/// mutex, so requests for one id serialize while distinct ids never contend.
/// Sessions leave the store only through capacity or idle-timeout eviction,
/// and every eviction is published on the [`EventBus`].
pub struct SessionStore {
    cache: Cache<String, SessionHandle>,
    bus: EventBus,
}

impl SessionStore {
    pub fn new(settings: &SessionSettings, bus: EventBus) -> Self {
        let listener_bus = bus.clone();
        let mut builder = Cache::<String, SessionHandle>::builder()
            .max_capacity(settings.capacity)
            .eviction_listener(move |id: Arc<String>, _session: SessionHandle, cause| {
                let cause = match cause {
                    RemovalCause::Size => EvictionCause::Capacity,
                    RemovalCause::Expired => EvictionCause::Expired,
                    _ => return,
                };
                info!("Session {} evicted ({})", id, cause);
                listener_bus.publish(SessionEvent::Evicted {
                    session_id: id.to_string(),
                    cause,
                });
            });

        if let Some(secs) = settings.idle_timeout_secs {
            builder = builder.time_to_idle(Duration::from_secs(secs));
        }

        Self {
            cache: builder.build(),
            bus,
        }
    }

    /// Get the session for `id`, creating an empty one on first reference.
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        let entry = self
            .cache
            .entry_by_ref(id)
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(id))));

        if entry.is_fresh() {
            debug!("Created session {}", id);
            self.bus.publish(SessionEvent::Created {
                session_id: id.to_string(),
            });
        }

        entry.into_value()
    }

    /// Copy of the session's current state, if it exists.
    ///
    /// Waits for any in-flight request on that session to finish.
    pub async fn snapshot(&self, id: &str) -> Option<Session> {
        let handle = self.cache.get(id)?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    /// Approximate number of live sessions.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run pending cache maintenance (evictions, counters) right now.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(&SessionSettings::default(), EventBus::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let store = SessionStore::default();

        let first = store.get_or_create("s1");
        {
            let session = first.lock().await;
            assert!(session.history().is_empty());
            assert!(!session.is_coding_mode());
            assert_eq!(session.current_project(), "");
            assert!(session.files().is_empty());
        }

        first.lock().await.append_turn(Role::User, "hello");

        let second = store.get_or_create("s1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.history().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_creates_one_session() {
        let store = Arc::new(SessionStore::default());
        let mut rx = store.bus().subscribe();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.get_or_create("shared") }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

        let mut created = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SessionEvent::Created { .. }) {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[test]
    fn test_merge_files_keeps_other_keys() {
        let mut session = Session::new("s1");
        session.merge_files(BTreeMap::from([("a.js".to_string(), "1".to_string())]));
        session.merge_files(BTreeMap::from([
            ("a.js".to_string(), "2".to_string()),
            ("b.js".to_string(), "3".to_string()),
        ]));

        assert_eq!(
            session.files(),
            &BTreeMap::from([
                ("a.js".to_string(), "2".to_string()),
                ("b.js".to_string(), "3".to_string()),
            ])
        );
    }

    #[test]
    fn test_recent_window() {
        let mut session = Session::new("s1");
        for i in 0..5 {
            session.append_turn(Role::User, &format!("u{}", i));
        }
        let recent = session.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "u3");
        assert_eq!(session.recent(10).len(), 5);
    }

    #[test]
    fn test_capacity_eviction_is_published() {
        let settings = SessionSettings {
            capacity: 2,
            idle_timeout_secs: None,
        };
        let store = SessionStore::new(&settings, EventBus::default());
        let mut rx = store.bus().subscribe();

        for i in 0..8 {
            store.get_or_create(&format!("s{}", i));
        }
        store.run_pending_tasks();

        assert!(store.len() <= 2);

        let mut evicted = 0;
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Evicted { cause, .. } = event {
                assert_eq!(cause, EvictionCause::Capacity);
                evicted += 1;
            }
        }
        assert!(evicted >= 6);
    }

    #[test]
    fn test_idle_expiry_is_published() {
        let settings = SessionSettings {
            capacity: 100,
            idle_timeout_secs: Some(1),
        };
        let store = SessionStore::new(&settings, EventBus::default());
        let mut rx = store.bus().subscribe();

        store.get_or_create("idle");
        std::thread::sleep(Duration::from_millis(1500));
        store.run_pending_tasks();

        assert!(!store.contains("idle"));

        let mut expired = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Evicted { session_id, cause } = event {
                expired.push((session_id, cause));
            }
        }
        assert_eq!(expired, vec![("idle".to_string(), EvictionCause::Expired)]);
    }
}
