//! The three specialized loops: build, ops, research.
//!
//! Each is a `ResilientLoop` over an executor, a reviewer, and a control
//! gate. Reviewers write their verdict to a per-loop state key; the gate
//! reads it. The build and ops executors are additionally bound to their
//! handoff document through the instruction contract: no `LOOP_DONE` until
//! the document exists.

use crate::control::ControlGate;
use crate::model_agent::ModelAgent;
use crate::resilient::ResilientLoop;
use ironloop_core::agent::Agent;
use ironloop_core::model::ModelClient;
use ironloop_core::tool::ToolRegistry;
use std::sync::Arc;

pub const BUILD_REVIEW_KEY: &str = "build_review";
pub const OPS_REVIEW_KEY: &str = "ops_review";
pub const RESEARCH_REVIEW_KEY: &str = "research_review";

const GENERATOR_INSTRUCTION: &str = "\
You are the generator: you build software. Work from the conversation and the \
task list; use shell and file tools to create, modify, and verify code. \
Communicate tersely - short factual statements of what you did and what is \
left. Before the build can be declared done you must write the operator's \
manual with write_manual: what exists, how to run it, how to verify it.";

const BUILD_REVIEWER_INSTRUCTION: &str = "\
You are the build reviewer. Inspect what the generator produced (read files, \
check the task list) and judge whether the objective is met. Be terse. \
End your verdict with exactly one sentinel: LOOP_DONE when the objective is \
met AND the manual has been written, LOOP_PAUSE when blocked on something \
outside the loop, otherwise state concretely what is missing.";

const OPERATOR_INSTRUCTION: &str = "\
You are the operator: you run and watch what was built. Follow MANUAL.md, \
execute the system with shell tools, and note anything that misbehaves. \
Communicate tersely. Before ops can be declared done you must record your \
findings for the build loop with write_feedback.";

const OPS_REVIEWER_INSTRUCTION: &str = "\
You are the ops reviewer. Judge whether the operation run produced useful, \
recorded findings. Be terse. End your verdict with exactly one sentinel: \
LOOP_DONE when operations are healthy AND feedback has been written, \
LOOP_PAUSE when blocked, otherwise state concretely what is missing.";

const RESEARCHER_INSTRUCTION: &str = "\
You are the researcher: you answer questions by gathering evidence. Use \
web_fetch and the platform tools to collect sources; store durable findings \
in memory. Communicate tersely and cite what you fetched.";

const RESEARCH_REVIEWER_INSTRUCTION: &str = "\
You are the research reviewer. Judge whether the question has been answered \
with evidence. Be terse. End your verdict with exactly one sentinel: \
LOOP_DONE when the answer is grounded, LOOP_PAUSE when blocked, otherwise \
state concretely what is missing.";

/// Caps shared by the three loop constructors.
#[derive(Debug, Clone, Copy)]
pub struct LoopTuning {
    /// Full executor→reviewer→gate iterations. 0 = unbounded.
    pub max_iterations: u32,
    /// Tool-call round cap within one model agent turn.
    pub max_tool_iterations: u32,
    /// Output token cap per model request.
    pub max_output_tokens: u32,
}

impl Default for LoopTuning {
    fn default() -> Self {
        Self {
            max_iterations: 0,
            max_tool_iterations: 25,
            max_output_tokens: 8192,
        }
    }
}

fn make_loop(
    name: &str,
    executor: ModelAgent,
    reviewer: ModelAgent,
    gate_name: &str,
    state_key: &str,
    tuning: LoopTuning,
) -> Arc<dyn Agent> {
    Arc::new(ResilientLoop::new(
        name,
        vec![
            Arc::new(
                executor
                    .with_max_tool_iterations(tuning.max_tool_iterations)
                    .with_max_output_tokens(tuning.max_output_tokens),
            ) as Arc<dyn Agent>,
            Arc::new(
                reviewer
                    .with_max_tool_iterations(tuning.max_tool_iterations)
                    .with_max_output_tokens(tuning.max_output_tokens),
            ) as Arc<dyn Agent>,
            Arc::new(ControlGate::new(gate_name, state_key)) as Arc<dyn Agent>,
        ],
        tuning.max_iterations,
    ))
}

/// generator → build_reviewer → build_control.
pub fn build_loop(
    model: Arc<dyn ModelClient>,
    executor_tools: ToolRegistry,
    reviewer_tools: ToolRegistry,
    tuning: LoopTuning,
) -> Arc<dyn Agent> {
    make_loop(
        "build_loop",
        ModelAgent::new("generator", GENERATOR_INSTRUCTION, model.clone(), executor_tools),
        ModelAgent::new("build_reviewer", BUILD_REVIEWER_INSTRUCTION, model, reviewer_tools)
            .with_output_key(BUILD_REVIEW_KEY),
        "build_control",
        BUILD_REVIEW_KEY,
        tuning,
    )
}

/// operator → ops_reviewer → ops_control.
pub fn ops_loop(
    model: Arc<dyn ModelClient>,
    executor_tools: ToolRegistry,
    reviewer_tools: ToolRegistry,
    tuning: LoopTuning,
) -> Arc<dyn Agent> {
    make_loop(
        "ops_loop",
        ModelAgent::new("operator", OPERATOR_INSTRUCTION, model.clone(), executor_tools),
        ModelAgent::new("ops_reviewer", OPS_REVIEWER_INSTRUCTION, model, reviewer_tools)
            .with_output_key(OPS_REVIEW_KEY),
        "ops_control",
        OPS_REVIEW_KEY,
        tuning,
    )
}

/// researcher → research_reviewer → research_control.
pub fn research_loop(
    model: Arc<dyn ModelClient>,
    executor_tools: ToolRegistry,
    reviewer_tools: ToolRegistry,
    tuning: LoopTuning,
) -> Arc<dyn Agent> {
    make_loop(
        "research_loop",
        ModelAgent::new("researcher", RESEARCHER_INSTRUCTION, model.clone(), executor_tools),
        ModelAgent::new(
            "research_reviewer",
            RESEARCH_REVIEWER_INSTRUCTION,
            model,
            reviewer_tools,
        )
        .with_output_key(RESEARCH_REVIEW_KEY),
        "research_control",
        RESEARCH_REVIEW_KEY,
        tuning,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use ironloop_core::agent::InvocationContext;
    use ironloop_core::event::Event;
    use ironloop_core::session::SessionStore;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn build_loop_runs_to_done_verdict() {
        let sessions = Arc::new(SessionStore::new());
        let sid = sessions.create("test", "u").await;
        sessions.append(&sid, Event::user("build a tiny web server")).await;
        let (tx, mut rx) = mpsc::channel(64);
        let ctx = InvocationContext::new(sid, sessions, tx);

        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::text_reply("wrote the server and the manual"),
            ScriptedModel::text_reply("Verified. LOOP_DONE"),
        ]));
        let engine = build_loop(
            model,
            ToolRegistry::new(),
            ToolRegistry::new(),
            LoopTuning { max_iterations: 5, ..LoopTuning::default() },
        );

        let state = ctx.state.clone();
        engine.run(ctx).await.unwrap();

        // reviewer verdict landed in shared state
        assert!(state.get(BUILD_REVIEW_KEY).await.unwrap().contains("LOOP_DONE"));

        // generator and reviewer text forwarded, no escalation leaked
        let mut authors = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert!(!event.escalate);
            authors.push(event.author);
        }
        assert_eq!(authors, vec!["generator", "build_reviewer"]);
    }

    #[tokio::test]
    async fn loop_iterates_until_reviewer_is_satisfied() {
        let sessions = Arc::new(SessionStore::new());
        let sid = sessions.create("test", "u").await;
        sessions.append(&sid, Event::user("do research")).await;
        let (tx, _rx) = mpsc::channel(64);
        let ctx = InvocationContext::new(sid, sessions, tx);

        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::text_reply("found one source"),
            ScriptedModel::text_reply("need a second source"),
            ScriptedModel::text_reply("found a second source"),
            ScriptedModel::text_reply("grounded now. LOOP_DONE"),
        ]));
        let engine = research_loop(
            model,
            ToolRegistry::new(),
            ToolRegistry::new(),
            LoopTuning { max_iterations: 10, ..LoopTuning::default() },
        );

        let state = ctx.state.clone();
        engine.run(ctx).await.unwrap();
        assert!(state.get(RESEARCH_REVIEW_KEY).await.unwrap().contains("LOOP_DONE"));
    }

    #[tokio::test]
    async fn tuned_output_cap_reaches_every_model_request() {
        let sessions = Arc::new(SessionStore::new());
        let sid = sessions.create("test", "u").await;
        sessions.append(&sid, Event::user("build a parser")).await;
        let (tx, _rx) = mpsc::channel(64);
        let ctx = InvocationContext::new(sid, sessions, tx);

        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::text_reply("built it"),
            ScriptedModel::text_reply("Verified. LOOP_DONE"),
        ]));
        let engine = build_loop(
            model.clone(),
            ToolRegistry::new(),
            ToolRegistry::new(),
            LoopTuning {
                max_iterations: 5,
                max_output_tokens: 2048,
                ..LoopTuning::default()
            },
        );

        engine.run(ctx).await.unwrap();
        let requests = model.requests();
        assert!(!requests.is_empty());
        assert!(requests.iter().all(|r| r.max_tokens == 2048));
    }
}
