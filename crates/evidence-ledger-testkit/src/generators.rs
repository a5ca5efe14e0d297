//! Proptest generators for property-based testing.

use proptest::prelude::*;

use evidence_ledger_core::{PolicyDecision, Rhid, RhidKind};

/// One action of a generated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    /// Index into [`crate::fixtures::actors`], taken modulo its length.
    pub actor: usize,
    pub action_type: String,
    pub decision: Option<PolicyDecision>,
    /// Content registered as the action's output.
    pub output: Option<Vec<u8>>,
    pub duration_ms: u64,
}

impl ActionSpec {
    pub fn new(actor: usize, action_type: impl Into<String>) -> Self {
        Self {
            actor,
            action_type: action_type.into(),
            decision: None,
            output: None,
            duration_ms: 100,
        }
    }

    pub fn with_output(mut self, content: Vec<u8>) -> Self {
        self.output = Some(content);
        self
    }

    pub fn with_decision(mut self, decision: PolicyDecision) -> Self {
        self.decision = Some(decision);
        self
    }
}

/// Generate an RhidKind.
pub fn rhid_kind() -> impl Strategy<Value = RhidKind> {
    prop_oneof![
        Just(RhidKind::Receipt),
        Just(RhidKind::Artifact),
        Just(RhidKind::Llm),
        Just(RhidKind::Toolio),
        Just(RhidKind::Policy),
        Just(RhidKind::Gate),
        Just(RhidKind::Logslice),
    ]
}

/// Generate a minted RHID.
pub fn rhid() -> impl Strategy<Value = Rhid> {
    (rhid_kind(), "[a-z0-9._-]{1,24}").prop_map(|(kind, seed)| Rhid::mint(kind, &seed))
}

pub fn policy_decision() -> impl Strategy<Value = PolicyDecision> {
    prop_oneof![
        Just(PolicyDecision::Allow),
        Just(PolicyDecision::Flag),
        Just(PolicyDecision::Deny),
    ]
}

/// Action types a run may contain before it is sealed.
pub fn action_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("workflow.start"),
        Just("task.plan"),
        Just("llm.call"),
        Just("tool.run"),
        Just("gate.resolve"),
    ]
    .prop_map(String::from)
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

impl Arbitrary for ActionSpec {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            0usize..3,
            action_type(),
            proptest::option::of(policy_decision()),
            proptest::option::of(payload(64)),
            0u64..5_000,
        )
            .prop_map(|(actor, action_type, decision, output, duration_ms)| ActionSpec {
                actor,
                action_type,
                decision,
                output,
                duration_ms,
            })
            .boxed()
    }
}

/// A run of 1 to `max_len` actions.
pub fn actions(max_len: usize) -> impl Strategy<Value = Vec<ActionSpec>> {
    prop::collection::vec(any::<ActionSpec>(), 1..=max_len)
}
