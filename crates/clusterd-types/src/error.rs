use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::member::MemberId;

/// The closed set of error kinds surfaced at the API boundary.
///
/// Every cross-member call and every REST handler reduces its failure
/// to one of these; see `ClusterError::http_status` for the mapping
/// used by the router when it writes the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    BadRequest,
    Conflict,
    PreconditionFailed,
    NotLeader,
    NoQuorum,
    MemberOffline,
    CannotCancel,
    Internal,
}

impl ErrorKind {
    /// The HTTP status code this kind maps to in the REST envelope.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::BadRequest | ErrorKind::CannotCancel => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::PreconditionFailed => 412,
            ErrorKind::NotLeader | ErrorKind::NoQuorum | ErrorKind::MemberOffline => 503,
            ErrorKind::Internal => 500,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::NotLeader => "not_leader",
            ErrorKind::NoQuorum => "no_quorum",
            ErrorKind::MemberOffline => "member_offline",
            ErrorKind::CannotCancel => "cannot_cancel",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A structured error propagated across member boundaries.
///
/// Carries enough context for an intermediate member to relay the
/// failure to the client without reinterpreting it: the router never
/// downgrades or upgrades a kind it is forwarding.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClusterError {
    pub kind: ErrorKind,
    pub message: String,
    /// The member that originated the error, when different from the
    /// member reporting it (set once, by the first hop, and never
    /// rewritten by subsequent forwards).
    pub upstream_member: Option<MemberId>,
}

impl ClusterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            upstream_member: None,
        }
    }

    pub fn with_upstream(mut self, member: MemberId) -> Self {
        self.upstream_member = Some(member);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn already_defined() -> Self {
        Self::conflict("already_defined")
    }

    pub fn not_pending() -> Self {
        Self::new(ErrorKind::BadRequest, "not_pending")
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailed, message)
    }

    pub fn not_leader(hint: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotLeader, hint)
    }

    pub fn no_quorum() -> Self {
        Self::new(ErrorKind::NoQuorum, "no quorum")
    }

    pub fn member_offline(member: MemberId) -> Self {
        Self::new(ErrorKind::MemberOffline, format!("member {member} is offline"))
    }

    pub fn cannot_cancel() -> Self {
        Self::new(ErrorKind::CannotCancel, "operation has no cancel handler")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}
