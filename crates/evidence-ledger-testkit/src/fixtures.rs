//! Test fixtures and helpers.
//!
//! The three reference scenarios, recorded through a real
//! [`EvidenceWriter`], plus a synchronous wrapper for property tests and
//! benches that have no runtime of their own.

use std::future::Future;

use evidence_ledger::{ActionRequest, EvidenceWriter, Result, WriterConfig};
use evidence_ledger_core::{Actor, EvidenceBundle, PolicyDecision, Rhid, RhidKind};
use evidence_ledger_store::{MemoryStore, Store};

use crate::generators::ActionSpec;

/// Output of the missing-manifest scenario that is never registered.
pub const PHANTOM_RHID: &str = "rhid:artifact:phantom-123";

pub fn planner() -> Actor {
    Actor::new("agent:planner", "agent", "Planner")
}

pub fn executor() -> Actor {
    Actor::new("tool:executor", "tool", "CodeExecutor")
}

pub fn reviewer() -> Actor {
    Actor::new("human:reviewer", "human", "Reviewer")
}

/// The cast generated action lists pick from.
pub fn actors() -> [Actor; 3] {
    [planner(), executor(), reviewer()]
}

/// Reference runs with known verification outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// `workflow.start → task.plan → tool.run → gate.resolve(allow) → pack.seal`.
    HappyPath,
    /// `workflow.start → gate.resolve(deny, status "fail-closed")`.
    GateDeny,
    /// A `tool.run` whose outputs include [`PHANTOM_RHID`].
    MissingManifestEntry,
}

impl Scenario {
    pub fn all() -> [Scenario; 3] {
        [
            Scenario::HappyPath,
            Scenario::GateDeny,
            Scenario::MissingManifestEntry,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Scenario::HappyPath => "happy-path",
            Scenario::GateDeny => "gate-deny",
            Scenario::MissingManifestEntry => "missing-manifest-entry",
        }
    }

    /// Record the scenario's actions through `writer`.
    pub async fn record<S: Store>(self, writer: &EvidenceWriter<S>) -> Result<()> {
        writer
            .append(ActionRequest::new("step-0", &planner(), "workflow.start"))
            .await?;

        match self {
            Scenario::HappyPath => {
                let plan = writer
                    .register(b"# Plan\n", RhidKind::Artifact, "plan.md", &planner(), None)
                    .await?;
                writer
                    .append(ActionRequest::new("step-1", &planner(), "task.plan").output(plan.clone()))
                    .await?;
                let log = writer
                    .register(b"all checks passed", RhidKind::Toolio, "run.log", &executor(), None)
                    .await?;
                writer
                    .append(
                        ActionRequest::new("step-2", &executor(), "tool.run")
                            .input(plan)
                            .output(log.clone()),
                    )
                    .await?;
                writer
                    .append(
                        ActionRequest::new("step-3", &reviewer(), "gate.resolve")
                            .input(log)
                            .decision(PolicyDecision::Allow),
                    )
                    .await?;
                writer
                    .append(ActionRequest::new("step-4", &reviewer(), "pack.seal"))
                    .await?;
            }
            Scenario::GateDeny => {
                writer
                    .append(
                        ActionRequest::new("step-1", &reviewer(), "gate.resolve")
                            .decision(PolicyDecision::Deny)
                            .status("fail-closed"),
                    )
                    .await?;
            }
            Scenario::MissingManifestEntry => {
                let log = writer
                    .register(b"partial output", RhidKind::Toolio, "run.log", &executor(), None)
                    .await?;
                writer
                    .append(
                        ActionRequest::new("step-1", &executor(), "tool.run")
                            .output(log)
                            .output(phantom()),
                    )
                    .await?;
                writer
                    .append(ActionRequest::new("step-2", &planner(), "task.plan"))
                    .await?;
            }
        }
        Ok(())
    }
}

pub fn phantom() -> Rhid {
    PHANTOM_RHID.parse().expect("phantom rhid is well formed")
}

/// Record generated actions: each output is registered, then the action
/// appended with it.
pub async fn record_actions<S: Store>(writer: &EvidenceWriter<S>, actions: &[ActionSpec]) -> Result<()> {
    let cast = actors();
    for (step, spec) in actions.iter().enumerate() {
        let actor = &cast[spec.actor % cast.len()];
        let mut request = ActionRequest::new(format!("step-{step}"), actor, spec.action_type.as_str())
            .duration_ms(spec.duration_ms);
        if let Some(content) = &spec.output {
            let rhid = writer
                .register(content, RhidKind::Artifact, &format!("out-{step}.txt"), actor, None)
                .await?;
            request = request.output(rhid);
        }
        if let Some(decision) = spec.decision {
            request = request.decision(decision);
        }
        writer.append(request).await?;
    }
    Ok(())
}

/// A writer over a fresh memory store.
pub fn memory_writer() -> EvidenceWriter<MemoryStore> {
    EvidenceWriter::new(MemoryStore::new(), WriterConfig::default())
}

/// Drive a future to completion on a fresh current-thread runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
        .block_on(future)
}

/// Record a scenario into memory and load it back, stored bytes included.
pub fn scenario_bundle(scenario: Scenario) -> EvidenceBundle {
    block_on(async {
        let writer = memory_writer();
        scenario.record(&writer).await.expect("scenario records");
        evidence_ledger::load_bundle(writer.store(), true)
            .await
            .expect("bundle loads")
    })
}

/// Record generated actions into memory and load them back.
pub fn actions_bundle(actions: &[ActionSpec]) -> EvidenceBundle {
    block_on(async {
        let writer = memory_writer();
        record_actions(&writer, actions).await.expect("actions record");
        evidence_ledger::load_bundle(writer.store(), true)
            .await
            .expect("bundle loads")
    })
}
