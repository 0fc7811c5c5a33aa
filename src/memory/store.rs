use super::{
    ChatMessage, ConversationMemory, MemoryError, SummaryBufferMemory, TimestampedLogMemory,
    cl100k_counter,
};
use crate::config::MemoryKind;
use crate::llm::LanguageModel;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

/// Builds a fresh, empty memory for a new session.
pub type MemoryFactory = Arc<dyn Fn() -> Box<dyn ConversationMemory> + Send + Sync>;

/// Mutable state of one session, guarded by the session's async mutex.
pub struct SessionState {
    /// Conversation memory feeding the prompt.
    pub memory: Box<dyn ConversationMemory>,
    /// Every `(user, bot)` exchange shown to the user, including greetings.
    pub transcript: Vec<(String, String)>,
}

/// Copy of a session's state for display.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// History text as the next prompt would see it.
    pub history: String,
    /// Messages held verbatim by the memory.
    pub messages: Vec<ChatMessage>,
    /// Every exchange of the session.
    pub transcript: Vec<(String, String)>,
}

/// One conversation.
pub struct Session {
    state: AsyncMutex<SessionState>,
    last_used: Mutex<Instant>,
}

impl Session {
    fn new(memory: Box<dyn ConversationMemory>) -> Self {
        Self {
            state: AsyncMutex::new(SessionState {
                memory,
                transcript: Vec::new(),
            }),
            last_used: Mutex::new(Instant::now()),
        }
    }

    /// Lock the session for the duration of a turn.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, SessionState> {
        self.touch();
        self.state.lock().await
    }

    fn touch(&self) {
        *lock_unpoisoned(&self.last_used) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*lock_unpoisoned(&self.last_used))
    }
}

/// In-process registry of sessions keyed by caller-supplied id.
///
/// Sessions are created lazily and live until cleared, removed, or evicted for idleness. Nothing
/// survives a restart.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    factory: MemoryFactory,
}

impl SessionStore {
    /// Create an empty registry whose sessions get memories from `factory`.
    pub fn new(factory: MemoryFactory) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Session for `id`, created with empty memory on first reference.
    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        let mut sessions = lock_unpoisoned(&self.sessions);
        if let Some(session) = sessions.get(id) {
            return session.clone();
        }
        tracing::debug!(session_id = id, "Creating session");
        let session = Arc::new(Session::new((self.factory)()));
        sessions.insert(id.to_string(), session.clone());
        session
    }

    fn existing(&self, id: &str) -> Option<Arc<Session>> {
        lock_unpoisoned(&self.sessions).get(id).cloned()
    }

    /// History text for `id`.
    pub async fn load(&self, id: &str) -> String {
        self.get_or_create(id).lock().await.memory.load()
    }

    /// Record one exchange in the memory of `id`.
    pub async fn save(
        &self,
        id: &str,
        user_text: &str,
        bot_text: &str,
    ) -> Result<(), MemoryError> {
        self.get_or_create(id)
            .lock()
            .await
            .memory
            .save(user_text, bot_text)
            .await
    }

    /// Empty the memory and transcript of `id`, keeping the session. Returns whether it existed.
    pub async fn clear(&self, id: &str) -> bool {
        let Some(session) = self.existing(id) else {
            return false;
        };
        let mut state = session.lock().await;
        state.memory.clear();
        state.transcript.clear();
        true
    }

    /// Drop the session for `id`. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        lock_unpoisoned(&self.sessions).remove(id).is_some()
    }

    /// Drop every session idle for longer than `max_idle`, returning how many were evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = lock_unpoisoned(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for(now) <= max_idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Known session ids, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock_unpoisoned(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.sessions).len()
    }

    /// True when no session exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transcript of `id`, or `None` for an unknown session.
    pub async fn transcript(&self, id: &str) -> Option<Vec<(String, String)>> {
        let session = self.existing(id)?;
        let state = session.lock().await;
        Some(state.transcript.clone())
    }

    /// Point-in-time view of `id`, or `None` for an unknown session.
    pub async fn snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        let session = self.existing(id)?;
        let state = session.lock().await;
        Some(SessionSnapshot {
            history: state.memory.load(),
            messages: state.memory.messages().to_vec(),
            transcript: state.transcript.clone(),
        })
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Factory producing memories of `kind`.
///
/// The summary variant summarizes with `summarizer` and loads the `cl100k_base` tokenizer once,
/// which is the only way this can fail.
pub fn memory_factory(
    kind: MemoryKind,
    summarizer: Arc<dyn LanguageModel>,
    max_token_limit: usize,
) -> Result<MemoryFactory, MemoryError> {
    let factory: MemoryFactory = match kind {
        MemoryKind::Summary => {
            let counter = cl100k_counter()?;
            Arc::new(move || {
                Box::new(SummaryBufferMemory::new(
                    summarizer.clone(),
                    max_token_limit,
                    counter.clone(),
                )) as Box<dyn ConversationMemory>
            })
        }
        MemoryKind::Timestamped => {
            Arc::new(|| Box::new(TimestampedLogMemory::new()) as Box<dyn ConversationMemory>)
        }
    };
    Ok(factory)
}

/// Periodically evict sessions idle for longer than `ttl`.
pub fn spawn_idle_eviction(
    store: Arc<SessionStore>,
    ttl: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = (ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            store.evict_idle(ttl);
        }
    })
}
