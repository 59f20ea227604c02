//! Ties scheduler-mode filtering, built-in scoring, and the optional
//! scriptlet override into a single placement decision.

use crate::error::PlacementError;
use crate::filter::{eligible_candidates, SchedulerMode};
use crate::request::{Candidate, PlacementRequest, Target};
use crate::scoring::score;
use crate::scriptlet::{run_placement_script, ExecutionLimits, Host};

pub struct PlacementEngine {
    pub scheduler_mode: SchedulerMode,
    pub script: Option<String>,
    pub script_limits: ExecutionLimits,
}

impl PlacementEngine {
    pub fn new(scheduler_mode: SchedulerMode) -> Self {
        Self {
            scheduler_mode,
            script: None,
            script_limits: ExecutionLimits::default(),
        }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Resolves one request to a target member name.
    pub fn place(&self, request: &PlacementRequest, candidates: &[Candidate], host: &mut dyn Host) -> Result<String, PlacementError> {
        let target = request_target(request);
        let eligible = eligible_candidates(self.scheduler_mode, &target, candidates);

        if let Some(script) = &self.script {
            if let Some(chosen) = run_placement_script(script, request, &eligible, host, self.script_limits)? {
                if !eligible.iter().any(|c| c.name == chosen) {
                    return Err(PlacementError::UnknownTarget(chosen));
                }
                return Ok(chosen);
            }
        }

        let winner = score(&eligible)?;
        Ok(winner.name.clone())
    }
}

fn request_target(request: &PlacementRequest) -> Target {
    match &request.target {
        crate::request::TargetOrNone::None => Target::None,
        crate::request::TargetOrNone::Member(name) => Target::Member(name.clone()),
        crate::request::TargetOrNone::Group(name) => Target::Group(clusterd_types::ClusterGroupName::new(name.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PlacementReason;
    use crate::scriptlet::StaticHost;
    use crate::scriptlet::Value;
    use clusterd_types::{FailureDomain, MemberId};

    fn candidate(name: &str, count: u64) -> Candidate {
        Candidate {
            id: MemberId::new(1),
            name: name.to_string(),
            failure_domain: FailureDomain::default(),
            groups: Vec::new(),
            instance_count: count,
        }
    }

    #[test]
    fn built_in_scoring_picks_lowest_instance_count() {
        let engine = PlacementEngine::new(SchedulerMode::All);
        let request = PlacementRequest::new("default", "web", PlacementReason::New);
        let candidates = vec![candidate("m1", 4), candidate("m2", 1)];
        let mut host = StaticHost::new(Value::None);
        let chosen = engine.place(&request, &candidates, &mut host).unwrap();
        assert_eq!(chosen, "m2");
    }

    #[test]
    fn scriptlet_override_forces_a_target() {
        let script = "def instance_placement(request, candidate_members):\n    set_cluster_member_target(\"m1\")\n";
        let engine = PlacementEngine::new(SchedulerMode::All).with_script(script);
        let request = PlacementRequest::new("default", "web", PlacementReason::New);
        let candidates = vec![candidate("m1", 4), candidate("m2", 1)];
        let mut host = StaticHost::new(Value::None);
        let chosen = engine.place(&request, &candidates, &mut host).unwrap();
        assert_eq!(chosen, "m1");
    }

    #[test]
    fn scriptlet_without_a_target_falls_through_to_scoring() {
        let script = "def instance_placement(request, candidate_members):\n    log_info(\"deferring\")\n";
        let engine = PlacementEngine::new(SchedulerMode::All).with_script(script);
        let request = PlacementRequest::new("default", "web", PlacementReason::New);
        let candidates = vec![candidate("m1", 4), candidate("m2", 1)];
        let mut host = StaticHost::new(Value::None);
        let chosen = engine.place(&request, &candidates, &mut host).unwrap();
        assert_eq!(chosen, "m2");
    }

    #[test]
    fn scriptlet_fail_call_propagates_the_message() {
        let script = "def instance_placement(request, candidate_members):\n    if request.name == \"bad\":\n        fail(\"no\")\n";
        let engine = PlacementEngine::new(SchedulerMode::All).with_script(script);
        let request = PlacementRequest::new("default", "bad", PlacementReason::New);
        let candidates = vec![candidate("m1", 4)];
        let mut host = StaticHost::new(Value::None);
        let err = engine.place(&request, &candidates, &mut host).unwrap_err();
        assert_eq!(err, PlacementError::ScriptFailed("no".into()));
    }
}
