//! Session compaction — keeping the conversation under the context window.
//!
//! After a reply has been delivered, the compactor sizes the session with the
//! chars/4 estimate. Over the threshold it asks the model for a structured
//! summary, persists it as a high-importance memory record, starts a fresh
//! session seeded with the summary, and only then deletes the old one. Any
//! failure before the delete abandons the attempt and leaves the old session
//! intact. A per-session-id guard keeps concurrent attempts from racing.

use ironloop_core::error::Error;
use ironloop_core::event::Event;
use ironloop_core::memory::{MemoryKind, NewMemory};
use ironloop_core::model::{ChatRequest, ModelClient};
use ironloop_core::session::{Session, SessionStore};
use ironloop_store::Store;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD_TOKENS: usize = 115_200;
const TRANSCRIPT_MAX_CHARS: usize = 100_000;

const SUMMARY_SYSTEM: &str = "\
You summarize agent work sessions so a fresh session can continue seamlessly.";

const SUMMARY_PROMPT: &str = "\
Summarize the session transcript below into these sections:\n\
1. NARRATIVE - what was attempted and how it went, in order\n\
2. KEY FACTS - paths, names, commands, decisions that must not be lost\n\
3. FAILED APPROACHES - tool calls and ideas that did not work, and why\n\
4. PATTERNS - recurring behaviors worth knowing about\n\
5. NEXT ACTIONS - the concrete next steps\n\
Be complete but compact; this replaces the full history.\n\n\
TRANSCRIPT:\n";

pub struct Compactor {
    sessions: Arc<SessionStore>,
    store: Store,
    model: Arc<dyn ModelClient>,
    threshold_tokens: usize,
    max_output_tokens: u32,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes the session id from the in-flight set when dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.id);
    }
}

impl Compactor {
    pub fn new(sessions: Arc<SessionStore>, store: Store, model: Arc<dyn ModelClient>) -> Self {
        Self {
            sessions,
            store,
            model,
            threshold_tokens: DEFAULT_THRESHOLD_TOKENS,
            max_output_tokens: 8192,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_threshold(mut self, threshold_tokens: usize) -> Self {
        self.threshold_tokens = threshold_tokens;
        self
    }

    /// Output token cap for the summarization request.
    pub fn with_max_output_tokens(mut self, cap: u32) -> Self {
        self.max_output_tokens = cap.max(1);
        self
    }

    /// Compact the session if it is over the threshold. Returns the id of the
    /// replacement session when compaction happened.
    pub async fn maybe_compact(&self, session_id: &str) -> Result<Option<String>, Error> {
        let _guard = {
            let mut set = self.in_flight.lock().unwrap();
            if !set.insert(session_id.to_string()) {
                return Ok(None); // already being compacted
            }
            InFlight { set: &self.in_flight, id: session_id.to_string() }
        };

        let Some(session) = self.sessions.get(session_id).await else {
            return Ok(None);
        };
        let estimate = session.estimated_tokens();
        if estimate <= self.threshold_tokens {
            return Ok(None);
        }
        info!(session_id, estimate, threshold = self.threshold_tokens, "compacting session");

        let summary = match self.summarize(&session).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(session_id, error = %err, "compaction abandoned, session left intact");
                return Ok(None);
            }
        };

        if let Err(err) = self
            .store
            .store_memory(
                NewMemory::new(summary.clone())
                    .kind(MemoryKind::Compaction)
                    .tags("compaction")
                    .importance(5),
            )
            .await
        {
            warn!(session_id, error = %err, "compaction abandoned, session left intact");
            return Ok(None);
        }

        let new_id = self
            .sessions
            .create(&session.app_name, &session.user_id)
            .await;
        self.sessions
            .append(&new_id, Event::user(format!("Previous session summary:\n{summary}")))
            .await;

        // delete last, so a failure anywhere above never loses history
        self.sessions.delete(session_id).await;
        info!(old = session_id, new = %new_id, "session compacted");
        Ok(Some(new_id))
    }

    async fn summarize(&self, session: &Session) -> Result<String, Error> {
        let transcript = render_transcript(session);
        let prompt = format!("{SUMMARY_PROMPT}{transcript}");
        let request = ChatRequest::new(vec![Event::user(prompt)], SUMMARY_SYSTEM)
            .with_max_tokens(self.max_output_tokens);

        let reply = self
            .model
            .send(request, &CancellationToken::new())
            .await
            .map_err(Error::Model)?;
        let summary = reply.joined_text();
        if summary.trim().is_empty() {
            return Err(Error::Internal("empty compaction summary".into()));
        }
        Ok(summary)
    }
}

/// Author-prefixed, text-only transcript, tail-truncated.
fn render_transcript(session: &Session) -> String {
    let mut transcript = String::new();
    for event in &session.events {
        let text = event.joined_text();
        if text.is_empty() {
            continue;
        }
        transcript.push_str(&format!("{}: {}\n", event.author, text));
    }

    if transcript.len() > TRANSCRIPT_MAX_CHARS {
        let mut idx = transcript.len() - TRANSCRIPT_MAX_CHARS;
        while !transcript.is_char_boundary(idx) {
            idx += 1;
        }
        transcript.split_off(idx)
    } else {
        transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn setup(threshold: usize, replies: Vec<ironloop_core::model::ChatReply>) -> (Compactor, Arc<SessionStore>, String) {
        let sessions = Arc::new(SessionStore::new());
        let sid = sessions.create("ironloop", "owner").await;
        let store = Store::open("sqlite::memory:").await.unwrap();
        let compactor = Compactor::new(sessions.clone(), store, Arc::new(ScriptedModel::new(replies)))
            .with_threshold(threshold);
        (compactor, sessions, sid)
    }

    #[tokio::test]
    async fn below_threshold_is_a_noop() {
        let (compactor, sessions, sid) = setup(1000, vec![]).await;
        sessions.append(&sid, Event::user("short message")).await;

        assert!(compactor.maybe_compact(&sid).await.unwrap().is_none());
        assert!(sessions.get(&sid).await.is_some());
    }

    #[tokio::test]
    async fn exactly_at_threshold_is_a_noop() {
        // 40 chars → exactly 10 tokens; threshold 10 means "above", not "at"
        let (compactor, sessions, sid) = setup(10, vec![]).await;
        sessions.append(&sid, Event::user("a".repeat(40))).await;

        assert!(compactor.maybe_compact(&sid).await.unwrap().is_none());
        assert!(sessions.get(&sid).await.is_some());
    }

    #[tokio::test]
    async fn over_threshold_compacts_into_fresh_session() {
        let (compactor, sessions, sid) =
            setup(10, vec![ScriptedModel::text_reply("NARRATIVE: built things")]).await;
        sessions.append(&sid, Event::user("x".repeat(100))).await;

        let new_id = compactor.maybe_compact(&sid).await.unwrap().unwrap();
        assert_ne!(new_id, sid);

        // old session gone, new one seeded with the summary
        assert!(sessions.get(&sid).await.is_none());
        let new_session = sessions.get(&new_id).await.unwrap();
        assert_eq!(new_session.events.len(), 1);
        assert!(new_session.events[0].joined_text().contains("NARRATIVE: built things"));
        assert_eq!(new_session.app_name, "ironloop");
    }

    #[tokio::test]
    async fn summary_persisted_as_high_importance_memory() {
        let (compactor, sessions, sid) =
            setup(10, vec![ScriptedModel::text_reply("the summary")]).await;
        sessions.append(&sid, Event::user("x".repeat(100))).await;
        compactor.maybe_compact(&sid).await.unwrap().unwrap();

        let records = compactor
            .store
            .recall_by_kind(MemoryKind::Compaction, 10)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].importance, 5);
        assert!(records[0].content.contains("the summary"));
    }

    #[tokio::test]
    async fn model_failure_leaves_session_intact() {
        // empty script → model errors on first call
        let (compactor, sessions, sid) = setup(10, vec![]).await;
        sessions.append(&sid, Event::user("x".repeat(100))).await;

        assert!(compactor.maybe_compact(&sid).await.unwrap().is_none());
        let session = sessions.get(&sid).await.unwrap();
        assert_eq!(session.events.len(), 1);
    }

    #[tokio::test]
    async fn empty_summary_abandons_compaction() {
        let (compactor, sessions, sid) =
            setup(10, vec![ScriptedModel::text_reply("")]).await;
        sessions.append(&sid, Event::user("x".repeat(100))).await;

        assert!(compactor.maybe_compact(&sid).await.unwrap().is_none());
        assert!(sessions.get(&sid).await.is_some());
    }

    /// Model double that holds every request open until released.
    struct GatedModel {
        gate: Arc<tokio::sync::Notify>,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ModelClient for GatedModel {
        fn name(&self) -> &str {
            "gated"
        }

        async fn send(
            &self,
            _request: ChatRequest,
            _cancel: &tokio_util::sync::CancellationToken,
        ) -> Result<ironloop_core::model::ChatReply, ironloop_core::error::ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(ScriptedModel::text_reply("summary"))
        }
    }

    #[tokio::test]
    async fn concurrent_attempts_summarize_exactly_once() {
        let sessions = Arc::new(SessionStore::new());
        let sid = sessions.create("ironloop", "owner").await;
        sessions.append(&sid, Event::user("x".repeat(100))).await;
        let store = Store::open("sqlite::memory:").await.unwrap();

        let gate = Arc::new(tokio::sync::Notify::new());
        let model = Arc::new(GatedModel { gate: gate.clone(), calls: AtomicU32::new(0) });
        let compactor =
            Compactor::new(sessions.clone(), store, model.clone()).with_threshold(10);

        // the first call parks inside the model; the second races it while
        // the session id is still in flight
        let (first, second) = tokio::join!(compactor.maybe_compact(&sid), async {
            tokio::task::yield_now().await;
            let second = compactor.maybe_compact(&sid).await;
            gate.notify_one();
            second
        });

        assert!(first.unwrap().is_some());
        assert!(second.unwrap().is_none());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert!(compactor.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_request_uses_configured_output_cap() {
        let sessions = Arc::new(SessionStore::new());
        let sid = sessions.create("ironloop", "owner").await;
        sessions.append(&sid, Event::user("x".repeat(100))).await;
        let store = Store::open("sqlite::memory:").await.unwrap();
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text_reply("summary")]));
        let compactor = Compactor::new(sessions, store, model.clone())
            .with_threshold(10)
            .with_max_output_tokens(1024);

        compactor.maybe_compact(&sid).await.unwrap().unwrap();

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, 1024);
    }

    #[tokio::test]
    async fn missing_session_is_a_noop() {
        let (compactor, _sessions, _sid) = setup(10, vec![]).await;
        assert!(compactor.maybe_compact("no-such-id").await.unwrap().is_none());
    }

    #[test]
    fn transcript_is_author_prefixed_and_text_only() {
        let sessions = SessionStore::new();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let session = rt.block_on(async {
            let sid = sessions.create("ironloop", "owner").await;
            sessions.append(&sid, Event::user("build it")).await;
            sessions
                .append(
                    &sid,
                    Event::with_parts(
                        "generator",
                        vec![
                            ironloop_core::event::Part::text("on it"),
                            ironloop_core::event::Part::ToolCall {
                                id: "toolu_1".into(),
                                name: "shell".into(),
                                args: serde_json::json!({}),
                            },
                        ],
                    ),
                )
                .await;
            sessions.get(&sid).await.unwrap()
        });

        let transcript = render_transcript(&session);
        assert_eq!(transcript, "user: build it\ngenerator: on it\n");
    }

    #[test]
    fn long_transcript_keeps_the_tail() {
        let sessions = SessionStore::new();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let session = rt.block_on(async {
            let sid = sessions.create("ironloop", "owner").await;
            sessions.append(&sid, Event::user("A".repeat(TRANSCRIPT_MAX_CHARS))).await;
            sessions.append(&sid, Event::user("THE-END-MARKER")).await;
            sessions.get(&sid).await.unwrap()
        });

        let transcript = render_transcript(&session);
        assert!(transcript.len() <= TRANSCRIPT_MAX_CHARS);
        assert!(transcript.ends_with("THE-END-MARKER\n"));
        assert!(!transcript.starts_with("user: A"));
    }
}
