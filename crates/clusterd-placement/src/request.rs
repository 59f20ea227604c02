use clusterd_types::{ClusterGroupName, FailureDomain, MemberId};
use serde::{Deserialize, Serialize};

/// Why a placement is being computed; carried through to the scriptlet
/// unchanged so a script can treat evacuation differently from a fresh
/// create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementReason {
    New,
    Evacuation,
    Relocation,
}

/// How a request was targeted by the client, resolved by the router
/// before placement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    None,
    Member(String),
    Group(ClusterGroupName),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub project: String,
    pub name: String,
    pub reason: PlacementReason,
    pub architecture: String,
    pub config: serde_json::Value,
    pub devices: serde_json::Value,
    #[serde(skip)]
    pub target: TargetOrNone,
}

/// Serde-friendly mirror of [`Target`]; kept separate so `Target`
/// (which borrows no lifetime but holds a `ClusterGroupName`) does not
/// need `Serialize`/`Deserialize` impls only the scriptlet boundary
/// cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetOrNone {
    #[default]
    None,
    Member(String),
    Group(String),
}

impl PlacementRequest {
    pub fn new(project: impl Into<String>, name: impl Into<String>, reason: PlacementReason) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            reason,
            architecture: String::new(),
            config: serde_json::Value::Null,
            devices: serde_json::Value::Null,
            target: TargetOrNone::None,
        }
    }

    pub fn with_target(mut self, target: TargetOrNone) -> Self {
        self.target = target;
        self
    }
}

/// A member eligible to be scored, as seen by the placement engine.
/// Distinct from `clusterd_types::Member` so the scoring/scriptlet code
/// only sees the fields it is allowed to read.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: MemberId,
    pub name: String,
    pub failure_domain: FailureDomain,
    pub groups: Vec<ClusterGroupName>,
    pub instance_count: u64,
}

impl Candidate {
    pub fn in_group(&self, group: &ClusterGroupName) -> bool {
        self.groups.contains(group)
    }
}
