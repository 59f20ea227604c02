//! The embedded placement scriptlet: a deterministic, sandboxed,
//! I/O-free Python subset.

mod ast;
mod host;
mod interp;
mod lexer;
mod parser;
mod value;

pub use host::{Host, StaticHost};
pub use interp::{ExecutionLimits, RuntimeError};
pub use value::{dict, Value};

use crate::error::PlacementError;
use crate::request::{Candidate, PlacementRequest};

/// Runs `source`'s `instance_placement(request, candidate_members)`
/// entry point and returns the member name it chose via
/// `set_cluster_member_target`, or `None` if the script left the
/// decision to the built-in scorer.
pub fn run_placement_script(
    source: &str,
    request: &PlacementRequest,
    candidates: &[&Candidate],
    host: &mut dyn Host,
    limits: ExecutionLimits,
) -> Result<Option<String>, PlacementError> {
    let tokens = lexer::tokenize(source).map_err(|e| PlacementError::ScriptFailed(e.to_string()))?;
    let program = parser::parse(tokens).map_err(|e| PlacementError::ScriptFailed(e.to_string()))?;

    let request_value = request_to_value(request);
    let candidates_value = Value::List(candidates.iter().map(|c| candidate_to_value(c)).collect());

    let mut interp = interp::Interpreter::new(host, limits);
    let result = interp.run(&program, "instance_placement", vec![request_value, candidates_value]);
    match result {
        Ok(_) => Ok(host.take_target()),
        Err(RuntimeError::ScriptFailed(message)) => Err(PlacementError::ScriptFailed(message)),
        Err(RuntimeError::StepLimitExceeded | RuntimeError::RecursionLimitExceeded | RuntimeError::DeadlineExceeded) => {
            Err(PlacementError::ScriptLimitExceeded("exceeded wall-clock, step, or recursion limit".to_string()))
        }
        Err(other) => Err(PlacementError::ScriptFailed(other.to_string())),
    }
}

fn request_to_value(request: &PlacementRequest) -> Value {
    dict([
        ("project", Value::Str(request.project.clone())),
        ("name", Value::Str(request.name.clone())),
        ("reason", Value::Str(format!("{:?}", request.reason).to_lowercase())),
        ("architecture", Value::Str(request.architecture.clone())),
    ])
}

fn candidate_to_value(candidate: &Candidate) -> Value {
    dict([
        ("name", Value::Str(candidate.name.clone())),
        ("failure_domain", Value::Str(candidate.failure_domain.to_string())),
        ("instance_count", Value::Int(candidate.instance_count as i64)),
    ])
}
