//! Lifecycle orchestrator — the single front door of the agent.
//!
//! Every inbound message, interactive or heartbeat, goes through
//! [`Orchestrator::handle`]. The orchestrator runs its own model-backed
//! routing agent whose tools include one delegation tool per specialized
//! loop; the loops emit their inner traffic through the orchestrator's
//! event channel where it is logged, never surfaced. The caller always gets
//! exactly one report, even on total failure.
//!
//! Durability across process restarts comes from continuation memory
//! records written after every handled message, and from crash logs the
//! supervisor leaves behind, both of which are folded into the routing
//! instruction.

use crate::compaction::Compactor;
use crate::model_agent::ModelAgent;
use crate::tools::handoff::{FEEDBACK_DOC, MANUAL_DOC, read_handoff};
use async_trait::async_trait;
use ironloop_core::agent::{Agent, InvocationContext};
use ironloop_core::error::ToolError;
use ironloop_core::event::Event;
use ironloop_core::memory::{MemoryKind, NewMemory};
use ironloop_core::model::ModelClient;
use ironloop_core::session::SessionStore;
use ironloop_core::tool::{Tool, ToolRegistry};
use ironloop_store::Store;
use ironloop_supervisor::list_crash_logs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const HEARTBEAT_PREFIX: &str = "[HEARTBEAT]";
pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

const REPORT_KEY: &str = "orchestrator_report";
const CRASH_LOG_LIMIT: usize = 3;
const CONTINUATION_LIMIT: u32 = 3;
const HANDOFF_EXCERPT_CHARS: usize = 2000;

const FAILURE_ACK: &str =
    "I hit an internal error handling that and could not finish. The failure has been \
     logged; please try again.";

const ROUTING_INSTRUCTION: &str = "\
You are the lifecycle orchestrator of an autonomous software agent. You do not \
build, operate, or research anything yourself - you route work to the right \
loop and report the outcome:\n\
- delegate_build: create or change software.\n\
- delegate_ops: run what was built and gather operational findings.\n\
- delegate_research: answer questions by collecting evidence.\n\
Small factual queries (task list, stored memories) you answer directly with \
your own tools. Keep one delegation per distinct objective.\n\
Your final message is the only thing the user sees; summarize what happened in \
plain language and never paste inner-loop transcripts.\n\
Heartbeat messages (prefixed [HEARTBEAT]) are a scheduler tick, not a user: \
work the task list, and if nothing at all needs doing reply with exactly \
HEARTBEAT_OK.";

/// The one user-visible outcome of a handled message.
#[derive(Debug, Clone)]
pub struct Report {
    pub text: String,
}

pub struct OrchestratorConfig {
    pub app_name: String,
    pub user_id: String,
    pub ops_dir: PathBuf,
    pub failure_dir: PathBuf,
    /// Output token cap for the routing agent's model requests.
    pub max_output_tokens: u32,
}

pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    sessions: Arc<SessionStore>,
    store: Store,
    light_tools: ToolRegistry,
    build: Arc<dyn Agent>,
    ops: Arc<dyn Agent>,
    research: Arc<dyn Agent>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<dyn ModelClient>,
        sessions: Arc<SessionStore>,
        store: Store,
        light_tools: ToolRegistry,
        build: Arc<dyn Agent>,
        ops: Arc<dyn Agent>,
        research: Arc<dyn Agent>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            sessions,
            store,
            light_tools,
            build,
            ops,
            research,
            config,
        }
    }

    /// The session this orchestrator converses in. Exposed so the caller can
    /// run compaction evaluation after a handled message.
    pub async fn session_id(&self) -> String {
        self.sessions
            .find_or_create(&self.config.app_name, &self.config.user_id)
            .await
    }

    /// Handle one inbound message and produce exactly one report.
    /// Never fails: a total failure becomes a generic acknowledgement.
    pub async fn handle(&self, message: &str) -> Report {
        let session_id = self.session_id().await;
        let is_heartbeat = message.starts_with(HEARTBEAT_PREFIX);

        let inbound = if is_heartbeat {
            match self.store.format_active().await {
                Ok(task_list) => format!("{message}\n\n{task_list}"),
                Err(err) => {
                    warn!(error = %err, "task list unavailable for heartbeat");
                    message.to_string()
                }
            }
        } else {
            message.to_string()
        };
        self.sessions.append(&session_id, Event::user(inbound)).await;

        // inner traffic (loop events included) is logged, never surfaced
        let (tx, mut rx) = mpsc::channel::<Event>(256);
        let drain = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!(author = %event.author, text = %event.joined_text(), "inner event");
            }
        });

        let ctx = InvocationContext::new(session_id.clone(), self.sessions.clone(), tx);
        let tools = self.delegation_tools(&ctx);
        let router = ModelAgent::new("orchestrator", self.instruction().await, self.model.clone(), tools)
            .with_output_key(REPORT_KEY)
            .with_max_output_tokens(self.config.max_output_tokens);

        let state = ctx.state.clone();
        let outcome = router.run(ctx).await;
        // the delegation tools hold sender clones; drop them so the drain ends
        drop(router);
        drain.await.ok();

        let text = match outcome {
            Ok(()) => {
                let report = state.get(REPORT_KEY).await.unwrap_or_default();
                if report.trim().is_empty() {
                    FAILURE_ACK.to_string()
                } else if is_heartbeat && report.contains(HEARTBEAT_OK) {
                    HEARTBEAT_OK.to_string()
                } else {
                    report
                }
            }
            Err(err) => {
                warn!(error = %err, "orchestrator run failed");
                FAILURE_ACK.to_string()
            }
        };

        if text != FAILURE_ACK && text != HEARTBEAT_OK {
            self.persist_continuation(message, &text).await;
        }
        info!(session_id = %session_id, heartbeat = is_heartbeat, "message handled");
        Report { text }
    }

    fn delegation_tools(&self, ctx: &InvocationContext) -> ToolRegistry {
        let mut tools = self.light_tools.clone();
        tools.register(Arc::new(DelegationTool {
            tool_name: "delegate_build",
            description:
                "Run the build loop: create or modify software until its reviewer signs off. \
                 Pass an objective describing what to build.",
            agent: self.build.clone(),
            ctx: ctx.clone(),
            handoff: Some((self.config.ops_dir.clone(), MANUAL_DOC)),
        }));
        tools.register(Arc::new(DelegationTool {
            tool_name: "delegate_ops",
            description:
                "Run the ops loop: execute what was built per its manual and record findings. \
                 Pass an objective describing what to operate or verify.",
            agent: self.ops.clone(),
            ctx: ctx.clone(),
            handoff: Some((self.config.ops_dir.clone(), FEEDBACK_DOC)),
        }));
        tools.register(Arc::new(DelegationTool {
            tool_name: "delegate_research",
            description:
                "Run the research loop: gather evidence to answer a question. \
                 Pass the question as the objective.",
            agent: self.research.clone(),
            ctx: ctx.clone(),
            handoff: None,
        }));
        tools
    }

    /// Routing instruction plus the state a restarted process must know:
    /// crash logs left by the supervisor and recent continuation records.
    async fn instruction(&self) -> String {
        let mut instruction = ROUTING_INSTRUCTION.to_string();

        let crashes = list_crash_logs(&self.config.failure_dir, CRASH_LOG_LIMIT);
        if !crashes.is_empty() {
            instruction.push_str("\n\nRecent crashes rolled back by the supervisor:\n");
            for log in &crashes {
                instruction.push_str(&format!("- {}\n", log.summary));
            }
            instruction.push_str("Investigating these takes priority over new work.");
        }

        match self
            .store
            .recall_by_kind(MemoryKind::Continuation, CONTINUATION_LIMIT)
            .await
        {
            Ok(records) if !records.is_empty() => {
                instruction.push_str("\n\nWhere previous sessions left off:\n");
                for record in &records {
                    instruction.push_str(&format!("- {}\n", record.content));
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "continuation recall failed"),
        }
        instruction
    }

    async fn persist_continuation(&self, message: &str, report: &str) {
        let content = format!(
            "Handled: {}\nOutcome: {}",
            clip(message, 300),
            clip(report, 500)
        );
        let memory = NewMemory::new(content)
            .kind(MemoryKind::Continuation)
            .tags("continuation");
        if let Err(err) = self.store.store_memory(memory).await {
            warn!(error = %err, "continuation record not stored");
        }
    }
}

/// Run `handle`, then evaluate the session for compaction. The report is
/// produced first; a compaction failure never affects it.
pub async fn handle_and_compact(
    orchestrator: &Orchestrator,
    compactor: &Compactor,
    message: &str,
) -> Report {
    let report = orchestrator.handle(message).await;
    let session_id = orchestrator.session_id().await;
    match compactor.maybe_compact(&session_id).await {
        Ok(Some(new_id)) => info!(old = %session_id, new = %new_id, "session compacted"),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "compaction evaluation failed"),
    }
    report
}

/// A tool that runs one specialized loop to completion within the
/// orchestrator's invocation, then reads back the loop's handoff document.
struct DelegationTool {
    tool_name: &'static str,
    description: &'static str,
    agent: Arc<dyn Agent>,
    ctx: InvocationContext,
    /// Document the loop must have produced, if any.
    handoff: Option<(PathBuf, &'static str)>,
}

#[async_trait]
impl Tool for DelegationTool {
    fn name(&self) -> &str {
        self.tool_name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "objective": {
                    "type": "string",
                    "description": "What this loop should accomplish"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        if let Some(objective) = args["objective"].as_str().filter(|o| !o.trim().is_empty()) {
            self.ctx
                .sessions
                .append(&self.ctx.session_id, Event::user(format!("Objective: {objective}")))
                .await;
        }

        info!(tool = self.tool_name, "delegating to loop");
        self.agent
            .run(self.ctx.clone())
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.tool_name.into(),
                reason: e.to_string(),
            })?;

        let Some((ops_dir, doc)) = &self.handoff else {
            return Ok(serde_json::json!({ "status": "complete" }));
        };
        match read_handoff(ops_dir, doc) {
            Some(content) => Ok(serde_json::json!({
                "status": "complete",
                "handoff": tail(&content, HANDOFF_EXCERPT_CHARS),
            })),
            None => Err(ToolError::ExecutionFailed {
                tool_name: self.tool_name.into(),
                reason: format!("loop finished without writing {doc}"),
            }),
        }
    }
}

fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut idx = max;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    &text[..idx]
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut idx = text.len() - max;
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    &text[idx..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::{LoopTuning, build_loop, ops_loop, research_loop};
    use crate::testing::ScriptedModel;
    use crate::tools::handoff::{HandoffTool, handoff_exists};
    use ironloop_core::event::Part;
    use serde_json::json;

    struct Fixture {
        orchestrator: Orchestrator,
        store: Store,
        _ops_dir: tempfile::TempDir,
    }

    async fn fixture(model: Arc<ScriptedModel>) -> Fixture {
        let ops_dir = tempfile::tempdir().unwrap();
        let store = Store::open("sqlite::memory:").await.unwrap();
        let sessions = Arc::new(SessionStore::new());

        let mut executor_tools = ToolRegistry::new();
        executor_tools.register(Arc::new(HandoffTool::manual(ops_dir.path())));
        let mut ops_tools = ToolRegistry::new();
        ops_tools.register(Arc::new(HandoffTool::feedback(ops_dir.path())));

        let tuning = LoopTuning { max_iterations: 5, ..LoopTuning::default() };
        let build = build_loop(model.clone(), executor_tools, ToolRegistry::new(), tuning);
        let ops = ops_loop(model.clone(), ops_tools, ToolRegistry::new(), tuning);
        let research = research_loop(model.clone(), ToolRegistry::new(), ToolRegistry::new(), tuning);

        let config = OrchestratorConfig {
            app_name: "ironloop".into(),
            user_id: "owner".into(),
            ops_dir: ops_dir.path().to_path_buf(),
            failure_dir: ops_dir.path().join("build-failures"),
            max_output_tokens: 4096,
        };
        let orchestrator = Orchestrator::new(
            model,
            sessions,
            store.clone(),
            ToolRegistry::new(),
            build,
            ops,
            research,
            config,
        );
        Fixture { orchestrator, store, _ops_dir: ops_dir }
    }

    #[tokio::test]
    async fn build_request_end_to_end() {
        // orchestrator delegates; generator writes the manual and finishes;
        // reviewer signs off; orchestrator composes the report
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::tool_reply(
                "toolu_1",
                "delegate_build",
                json!({"objective": "a word counter"}),
            ),
            ScriptedModel::tool_reply(
                "toolu_2",
                "write_manual",
                json!({"content": "## word counter\nrun: ./wc.sh <file>"}),
            ),
            ScriptedModel::text_reply("built the word counter"),
            ScriptedModel::text_reply("Verified the counter works. LOOP_DONE"),
            ScriptedModel::text_reply("Built a word counter; see MANUAL.md for usage."),
        ]));
        let fx = fixture(model).await;

        let report = fx.orchestrator.handle("build me a word counter").await;
        assert_eq!(report.text, "Built a word counter; see MANUAL.md for usage.");
        assert!(handoff_exists(&fx.orchestrator.config.ops_dir, MANUAL_DOC));

        // delegation fed the handoff excerpt back to the router
        let session_id = fx.orchestrator.session_id().await;
        let session = fx.orchestrator.sessions.get(&session_id).await.unwrap();
        let delegate_result = session
            .events
            .iter()
            .flat_map(|e| e.parts.iter())
            .find_map(|p| match p {
                Part::ToolResult { call_id, payload } if call_id == "toolu_1" => Some(payload),
                _ => None,
            })
            .unwrap();
        assert_eq!(delegate_result["status"], "complete");
        assert!(delegate_result["handoff"].as_str().unwrap().contains("wc.sh"));

        // continuation record written
        let records = fx
            .store
            .recall_by_kind(MemoryKind::Continuation, 10)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].content.contains("word counter"));
    }

    #[tokio::test]
    async fn missing_manual_surfaces_as_tool_error() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::tool_reply("toolu_1", "delegate_build", json!({})),
            ScriptedModel::text_reply("did the work but wrote no manual"),
            ScriptedModel::text_reply("looks fine. LOOP_DONE"),
            ScriptedModel::text_reply("The build loop finished but produced no manual."),
        ]));
        let fx = fixture(model).await;

        let report = fx.orchestrator.handle("build something").await;
        assert!(report.text.contains("no manual"));

        let session_id = fx.orchestrator.session_id().await;
        let session = fx.orchestrator.sessions.get(&session_id).await.unwrap();
        let payload = session
            .events
            .iter()
            .flat_map(|e| e.parts.iter())
            .find_map(|p| match p {
                Part::ToolResult { payload, .. } => Some(payload),
                _ => None,
            })
            .unwrap();
        assert!(payload["error"].as_str().unwrap().contains(MANUAL_DOC));
    }

    #[tokio::test]
    async fn heartbeat_injects_task_list_and_normalizes_reply() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text_reply(
            "Nothing pending. HEARTBEAT_OK",
        )]));
        let fx = fixture(model).await;

        let report = fx.orchestrator.handle("[HEARTBEAT] tick").await;
        assert_eq!(report.text, HEARTBEAT_OK);

        let session_id = fx.orchestrator.session_id().await;
        let session = fx.orchestrator.sessions.get(&session_id).await.unwrap();
        let inbound = session.events[0].joined_text();
        assert!(inbound.starts_with("[HEARTBEAT] tick"));
        assert!(inbound.contains("TASK LIST"));

        // idle heartbeats leave no continuation record
        let records = fx
            .store
            .recall_by_kind(MemoryKind::Continuation, 10)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_with_work_reports_normally() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text_reply(
            "Resumed task #2 and finished it.",
        )]));
        let fx = fixture(model).await;

        let report = fx.orchestrator.handle("[HEARTBEAT] tick").await;
        assert_eq!(report.text, "Resumed task #2 and finished it.");
    }

    #[tokio::test]
    async fn output_cap_flows_into_router_requests() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text_reply("ok")]));
        let fx = fixture(model.clone()).await;

        fx.orchestrator.handle("hello").await;

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, 4096);
    }

    #[tokio::test]
    async fn total_failure_becomes_generic_ack() {
        // exhausted script → model error on the first router call
        let model = Arc::new(ScriptedModel::new(vec![]));
        let fx = fixture(model).await;

        let report = fx.orchestrator.handle("hello").await;
        assert_eq!(report.text, FAILURE_ACK);
    }

    #[tokio::test]
    async fn crash_logs_fold_into_instruction() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let fx = fixture(model).await;
        ironloop_supervisor::write_crash_log(
            &fx.orchestrator.config.failure_dir,
            "exited with signal 11",
            "stack trace here",
        )
        .unwrap();

        let instruction = fx.orchestrator.instruction().await;
        assert!(instruction.contains("exited with signal 11"));
        assert!(instruction.contains("priority"));
    }

    #[tokio::test]
    async fn continuations_fold_into_instruction() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let fx = fixture(model).await;
        fx.store
            .store_memory(
                NewMemory::new("Handled: deploy\nOutcome: rolled out v2")
                    .kind(MemoryKind::Continuation),
            )
            .await
            .unwrap();

        let instruction = fx.orchestrator.instruction().await;
        assert!(instruction.contains("rolled out v2"));
    }

    #[tokio::test]
    async fn research_delegation_needs_no_handoff() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::tool_reply(
                "toolu_1",
                "delegate_research",
                json!({"objective": "what is the newest sqlite version"}),
            ),
            ScriptedModel::text_reply("found it in the release notes"),
            ScriptedModel::text_reply("answered with sources. LOOP_DONE"),
            ScriptedModel::text_reply("Latest sqlite is 3.50, per the release notes."),
        ]));
        let fx = fixture(model).await;

        let report = fx.orchestrator.handle("what is the newest sqlite?").await;
        assert!(report.text.contains("3.50"));
    }

    #[tokio::test]
    async fn handle_and_compact_compacts_oversized_sessions() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::text_reply("noted"),
            ScriptedModel::text_reply("summary of everything so far"),
        ]));
        let fx = fixture(model).await;
        let compactor = Compactor::new(
            fx.orchestrator.sessions.clone(),
            fx.store.clone(),
            fx.orchestrator.model.clone(),
        )
        .with_threshold(10);

        let before = fx.orchestrator.session_id().await;
        let report = handle_and_compact(
            &fx.orchestrator,
            &compactor,
            &format!("remember this: {}", "x".repeat(200)),
        )
        .await;
        assert_eq!(report.text, "noted");

        // old session replaced by a summary-seeded one
        assert!(fx.orchestrator.sessions.get(&before).await.is_none());
        let after = fx.orchestrator.session_id().await;
        let session = fx.orchestrator.sessions.get(&after).await.unwrap();
        assert!(session.events[0].joined_text().contains("summary of everything"));
    }
}
