//! The evacuate / restore / delete-member flows.

use crate::error::EvacError;
use crate::registry::{InstanceRegistry, InstanceStatus};
use crate::runtime::InstanceRuntime;
use crate::warning::{WarningRecord, WarningRegistry};
use clusterd_membership::Roster;
use clusterd_placement::{Candidate, PlacementEngine, PlacementReason, PlacementRequest, StaticHost, Value};
use clusterd_types::{Member, MemberId, MemberState, Timestamp};
use std::sync::Arc;
use tracing::{info, warn};

/// What one `evacuate` call did, for the caller to turn into operation
/// metadata and lifecycle events.
#[derive(Debug, Default, Clone)]
pub struct EvacuationReport {
    /// `(instance url, target member name)` per relocated workload.
    pub moved: Vec<(String, String)>,
    /// Instance urls left stopped in place because no member could
    /// accept them; one warning record exists per entry.
    pub stranded: Vec<String>,
}

pub struct Evacuator {
    roster: Roster,
    instances: InstanceRegistry,
    warnings: WarningRegistry,
    runtime: Arc<dyn InstanceRuntime>,
    offline_threshold_secs: u64,
}

impl Evacuator {
    pub fn new(
        roster: Roster,
        instances: InstanceRegistry,
        warnings: WarningRegistry,
        runtime: Arc<dyn InstanceRuntime>,
        offline_threshold_secs: u64,
    ) -> Self {
        Self {
            roster,
            instances,
            warnings,
            runtime,
            offline_threshold_secs,
        }
    }

    /// Moves every workload off `member`.
    ///
    /// The member is flipped to `evacuated` first so concurrent
    /// placements stop considering it, then each instance is stopped
    /// and re-placed with reason `evacuation`. An instance with no
    /// eligible target stays stopped where it is and gets a warning
    /// record; evacuation continues with the rest.
    pub fn evacuate(&self, member: MemberId, engine: &PlacementEngine, now: Timestamp) -> Result<EvacuationReport, EvacError> {
        let mut record = self.roster.get(member)?;
        record.state = MemberState::Evacuated;
        self.roster.update(&record)?;
        info!(member = %record.name, "evacuating member");

        let mut report = EvacuationReport::default();
        for instance in self.instances.list_on_member(member)? {
            self.runtime.stop(&instance).map_err(EvacError::Runtime)?;
            self.instances.set_status(&instance.project, &instance.name, InstanceStatus::Stopped)?;

            let candidates = self.candidates(member, now)?;
            let request = PlacementRequest {
                project: instance.project.clone(),
                name: instance.name.clone(),
                reason: PlacementReason::Evacuation,
                architecture: instance.architecture.clone(),
                config: instance.config.clone(),
                devices: instance.devices.clone(),
                target: clusterd_placement::TargetOrNone::None,
            };

            let mut host = StaticHost::new(Value::None);
            match engine.place(&request, &candidates, &mut host) {
                Ok(target_name) => {
                    let target = candidates
                        .iter()
                        .find(|c| c.name == target_name)
                        .map(|c| c.id)
                        .expect("placement returned a name from the candidate list");
                    self.instances.relocate(&instance.project, &instance.name, target)?;
                    report.moved.push((instance.url(), target_name));
                }
                Err(err) => {
                    warn!(instance = %instance.name, %err, "no evacuation target, leaving instance stopped");
                    let warning = WarningRecord::new(instance.url(), format!("evacuation found no target: {err}"));
                    self.warnings.create(&warning)?;
                    report.stranded.push(instance.url());
                }
            }
        }
        Ok(report)
    }

    /// Re-admits an evacuated member. Instances are not auto-returned;
    /// only the member state flips and the stranded-instance warnings
    /// are resolved.
    pub fn restore(&self, member: MemberId) -> Result<usize, EvacError> {
        let mut record = self.roster.get(member)?;
        record.state = MemberState::Created;
        self.roster.update(&record)?;
        info!(member = %record.name, "restored member");

        let mut resolved = 0;
        for instance in self.instances.list_on_member(member)? {
            resolved += self.warnings.resolve_for_url(&instance.url())?;
        }
        Ok(resolved)
    }

    /// Removes a member record. Only allowed when the member hosts no
    /// instances and either was evacuated or is unreachable; the
    /// caller re-runs role election afterwards so replicated roles are
    /// reassigned.
    pub fn delete(&self, member: MemberId, now: Timestamp) -> Result<(), EvacError> {
        let record = self.roster.get(member)?;
        let hosted = self.instances.list_on_member(member)?;
        if !hosted.is_empty() {
            return Err(EvacError::MemberNotEmpty(member, hosted.len()));
        }
        let offline = !record.reachable(now, self.offline_threshold_secs);
        if record.state != MemberState::Evacuated && !offline {
            return Err(EvacError::MemberStillActive(member));
        }
        self.roster.remove(member)?;
        info!(member = %record.name, "deleted member");
        Ok(())
    }

    /// Members eligible to receive evacuated workloads: active,
    /// reachable, and not the member being drained.
    fn candidates(&self, evacuating: MemberId, now: Timestamp) -> Result<Vec<Candidate>, EvacError> {
        let members = self.roster.list()?;
        let mut candidates = Vec::new();
        for member in members {
            if member.id == evacuating || !member.is_active() || !member.reachable(now, self.offline_threshold_secs) {
                continue;
            }
            candidates.push(self.candidate_of(&member)?);
        }
        Ok(candidates)
    }

    fn candidate_of(&self, member: &Member) -> Result<Candidate, EvacError> {
        Ok(Candidate {
            id: member.id,
            name: member.name.clone(),
            failure_domain: member.failure_domain.clone(),
            groups: member.groups.iter().cloned().collect(),
            instance_count: self.instances.count_on_member(member.id)?,
        })
    }
}
