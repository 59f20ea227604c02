//! Scheduler-mode candidate filtering.

use crate::request::{Candidate, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerMode {
    #[default]
    All,
    Manual,
    Group,
}

/// Narrows `candidates` to the set `scheduler.instance` permits for
/// this request. `FanOut`-equivalent "list" semantics do not apply
/// here: this always produces the members eligible to host one new
/// instance.
pub fn eligible_candidates<'a>(mode: SchedulerMode, target: &Target, candidates: &'a [Candidate]) -> Vec<&'a Candidate> {
    match (mode, target) {
        (SchedulerMode::All, Target::None) => candidates.iter().collect(),
        (SchedulerMode::All, Target::Member(name)) => candidates.iter().filter(|c| &c.name == name).collect(),
        (SchedulerMode::All, Target::Group(group)) => candidates.iter().filter(|c| c.in_group(group)).collect(),
        (SchedulerMode::Manual, Target::Member(name)) => candidates.iter().filter(|c| &c.name == name).collect(),
        (SchedulerMode::Manual, _) => Vec::new(),
        (SchedulerMode::Group, Target::Member(name)) => candidates.iter().filter(|c| &c.name == name).collect(),
        (SchedulerMode::Group, Target::Group(group)) => candidates.iter().filter(|c| c.in_group(group)).collect(),
        (SchedulerMode::Group, Target::None) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_types::{ClusterGroupName, FailureDomain, MemberId};
    use test_case::test_case;

    fn candidate(name: &str, groups: &[&str]) -> Candidate {
        Candidate {
            id: MemberId::new(1),
            name: name.to_string(),
            failure_domain: FailureDomain::default(),
            groups: groups.iter().map(|g| ClusterGroupName::new(*g)).collect(),
            instance_count: 0,
        }
    }

    #[test_case(SchedulerMode::All, Target::None, &["a", "b"]; "all untargeted keeps everyone")]
    #[test_case(SchedulerMode::All, Target::Member("b".into()), &["b"]; "all targeted to member narrows to it")]
    #[test_case(SchedulerMode::Manual, Target::None, &[]; "manual without target has no candidates")]
    #[test_case(SchedulerMode::Manual, Target::Member("a".into()), &["a"]; "manual with explicit member target")]
    #[test_case(SchedulerMode::Group, Target::None, &[]; "group without target has no candidates")]
    #[test_case(SchedulerMode::Group, Target::Group(ClusterGroupName::new("gpu")), &["a"]; "group target narrows to group members")]
    fn eligibility_per_scheduler_mode(mode: SchedulerMode, target: Target, expected: &[&str]) {
        let candidates = vec![candidate("a", &["gpu"]), candidate("b", &[])];
        let result = eligible_candidates(mode, &target, &candidates);
        let names: Vec<&str> = result.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, expected);
    }
}
