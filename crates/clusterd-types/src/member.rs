use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Monotonically assigned identifier for a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(u64);

impl MemberId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MemberId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Operator-supplied tag used to bias automatic role reassignment.
///
/// Two members share a failure domain when their tags compare equal;
/// the empty domain (the default) never counts as a shared domain for
/// replacement purposes, since it carries no operator intent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct FailureDomain(String);

impl FailureDomain {
    pub const NONE: &'static str = "";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn is_set(&self) -> bool {
        !self.0.is_empty()
    }

    /// True when both tags are set and equal.
    pub fn shared_with(&self, other: &FailureDomain) -> bool {
        self.is_set() && self == other
    }
}

impl Display for FailureDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A role a member can carry. Multiple roles may be held simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Replicates the store and participates in leader election.
    Voter,
    /// Replicates the store but cannot vote; promoted to `Voter` on demand.
    StandBy,
    /// Exactly one member holds this role whenever a quorum exists.
    DatabaseLeader,
    /// Relays events for the inter-member fan-out mesh.
    EventHub,
    /// Hosts the OVN southbound/northbound chassis for this member.
    OvnChassis,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Voter => "database",
            Role::StandBy => "database-standby",
            Role::DatabaseLeader => "database-leader",
            Role::EventHub => "event-hub",
            Role::OvnChassis => "ovn-chassis",
        };
        f.write_str(s)
    }
}

/// Durable lifecycle state of a member record.
///
/// `Offline` is not a value of this enum: reachability is a derived,
/// continuously re-evaluated fact (`Member::reachable`), not a state
/// transition — a member remains `Created` while unreachable, and the
/// membership manager reassigns roles around it without mutating this
/// field. See DESIGN.md for the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    Pending,
    Created,
    Evacuated,
    Deleted,
}

impl Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberState::Pending => "pending",
            MemberState::Created => "created",
            MemberState::Evacuated => "evacuated",
            MemberState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A named set of members; every member belongs at least to `default`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterGroupName(String);

impl ClusterGroupName {
    pub const DEFAULT: &'static str = "default";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Display for ClusterGroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for ClusterGroupName {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// A daemon instance participating in the cluster.
///
/// `A` (the replicated store) and `B` (the membership manager) jointly
/// own this record: only `B` mutates `roles` and `state`, while address
/// and hardware-descriptive fields are set once at join time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub address: String,
    pub architecture: String,
    pub failure_domain: FailureDomain,
    pub schema_version: u32,
    pub api_extensions_version: u32,
    pub last_heartbeat: Timestamp,
    pub roles: BTreeSet<Role>,
    pub state: MemberState,
    pub groups: BTreeSet<ClusterGroupName>,
    /// Last load sample reported in a heartbeat reply: number of
    /// instances currently running on this member.
    pub instance_count: u64,
}

impl Member {
    pub fn new(id: MemberId, name: impl Into<String>, address: impl Into<String>) -> Self {
        let mut groups = BTreeSet::new();
        groups.insert(ClusterGroupName::default());
        Self {
            id,
            name: name.into(),
            address: address.into(),
            architecture: String::new(),
            failure_domain: FailureDomain::default(),
            schema_version: 1,
            api_extensions_version: 1,
            last_heartbeat: Timestamp::EPOCH,
            roles: BTreeSet::new(),
            state: MemberState::Pending,
            groups,
            instance_count: 0,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn in_group(&self, group: &ClusterGroupName) -> bool {
        self.groups.contains(group)
    }

    /// Reachable iff the time since the last successful heartbeat is
    /// under `offline_threshold` seconds. `now` is passed explicitly so
    /// callers (tests, the membership manager) control the clock.
    pub fn reachable(&self, now: Timestamp, offline_threshold_secs: u64) -> bool {
        self.last_heartbeat.elapsed_secs(now) < offline_threshold_secs
    }

    /// Whether this member can accept new roles/placements right now.
    pub fn is_active(&self) -> bool {
        matches!(self.state, MemberState::Created)
    }
}
