//! The host primitive table a scriptlet is allowed to call.
//!
//! The interpreter never gives a script any capability beyond these
//! methods: no file, network, or clock access exists in the expression
//! language itself.

use super::value::Value;

pub trait Host {
    fn log(&mut self, level: tracing::Level, message: String);
    fn set_cluster_member_target(&mut self, name: String);
    fn get_cluster_member_state(&mut self, name: &str) -> Option<Value>;
    fn get_cluster_member_resources(&mut self, name: &str) -> Option<Value>;
    fn get_instance_resources(&mut self) -> Value;
    /// The member chosen by `set_cluster_member_target`, if any, taken
    /// once the script has finished running.
    fn take_target(&mut self) -> Option<String>;
}

/// A `Host` driven entirely from in-memory snapshots, used by tests and
/// by the placement coordinator once it has assembled candidate state.
pub struct StaticHost {
    pub member_states: std::collections::BTreeMap<String, Value>,
    pub member_resources: std::collections::BTreeMap<String, Value>,
    pub instance_resources: Value,
    pub target: Option<String>,
    pub log_lines: Vec<(tracing::Level, String)>,
}

impl StaticHost {
    pub fn new(instance_resources: Value) -> Self {
        Self {
            member_states: std::collections::BTreeMap::new(),
            member_resources: std::collections::BTreeMap::new(),
            instance_resources,
            target: None,
            log_lines: Vec::new(),
        }
    }
}

impl Host for StaticHost {
    fn log(&mut self, level: tracing::Level, message: String) {
        match level {
            tracing::Level::ERROR => tracing::error!(%message, "placement scriptlet"),
            tracing::Level::WARN => tracing::warn!(%message, "placement scriptlet"),
            _ => tracing::info!(%message, "placement scriptlet"),
        }
        self.log_lines.push((level, message));
    }

    fn set_cluster_member_target(&mut self, name: String) {
        self.target = Some(name);
    }

    fn get_cluster_member_state(&mut self, name: &str) -> Option<Value> {
        self.member_states.get(name).cloned()
    }

    fn get_cluster_member_resources(&mut self, name: &str) -> Option<Value> {
        self.member_resources.get(name).cloned()
    }

    fn get_instance_resources(&mut self) -> Value {
        self.instance_resources.clone()
    }

    fn take_target(&mut self) -> Option<String> {
        self.target.take()
    }
}
