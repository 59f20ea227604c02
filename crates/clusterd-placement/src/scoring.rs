//! Built-in lowest-instance-count scoring.

use crate::error::PlacementError;
use crate::request::Candidate;
use rand::seq::SliceRandom;

/// Picks the candidate with the lowest `instance_count`; ties are
/// broken by uniform-random choice among the tied candidates.
pub fn score<'a>(candidates: &[&'a Candidate]) -> Result<&'a Candidate, PlacementError> {
    let Some(lowest) = candidates.iter().map(|c| c.instance_count).min() else {
        return Err(PlacementError::NoEligibleCandidate);
    };
    let tied: Vec<&&Candidate> = candidates.iter().filter(|c| c.instance_count == lowest).collect();
    let mut rng = rand::thread_rng();
    Ok(tied.choose(&mut rng).expect("tied is non-empty since lowest came from candidates"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_types::{FailureDomain, MemberId};

    fn candidate(id: u64, count: u64) -> Candidate {
        Candidate {
            id: MemberId::new(id),
            name: format!("m{id}"),
            failure_domain: FailureDomain::default(),
            groups: Vec::new(),
            instance_count: count,
        }
    }

    #[test]
    fn picks_the_lowest_instance_count() {
        let a = candidate(1, 5);
        let b = candidate(2, 2);
        let c = candidate(3, 9);
        let refs = vec![&a, &b, &c];
        let winner = score(&refs).unwrap();
        assert_eq!(winner.id, MemberId::new(2));
    }

    #[test]
    fn empty_candidate_list_is_an_error() {
        let refs: Vec<&Candidate> = Vec::new();
        assert_eq!(score(&refs).unwrap_err(), PlacementError::NoEligibleCandidate);
    }

    #[test]
    fn ties_resolve_to_one_of_the_tied_candidates() {
        let a = candidate(1, 3);
        let b = candidate(2, 3);
        let refs = vec![&a, &b];
        let winner = score(&refs).unwrap();
        assert!(winner.id == MemberId::new(1) || winner.id == MemberId::new(2));
    }
}
