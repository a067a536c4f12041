//! Common types used throughout the forward-core library

use std::fmt;

use crate::message::StatusCode;

/// Unique identifier of an in-flight request, used to correlate log lines
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processing state of one request.
///
/// ```text
/// Received → MaxForwardsChecked → RouteResolved → [SuspendedForGruu → Resumed]
///   → DestinationFinalized → TransportSelected → Sanitized → BranchComputed
///   → LoopChecked → Sent | Rejected | Terminated
/// ```
///
/// `Rejected` and `Terminated` may be entered from any earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardState {
    Received,
    MaxForwardsChecked,
    RouteResolved,
    SuspendedForGruu,
    Resumed,
    DestinationFinalized,
    TransportSelected,
    Sanitized,
    BranchComputed,
    LoopChecked,
    /// Handed to the transport layer
    Sent,
    /// An error reply was issued
    Rejected,
    /// Dropped silently
    Terminated,
}

impl ForwardState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ForwardState::Sent | ForwardState::Rejected | ForwardState::Terminated
        )
    }
}

/// Final result of processing one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The request was handed to the transport layer
    Sent,
    /// A reply with this status was issued instead of forwarding
    Rejected(StatusCode),
    /// The request was dropped without a reply (self-forward or affinity
    /// mismatch)
    Terminated,
}

impl ForwardOutcome {
    /// The terminal [`ForwardState`] this outcome corresponds to
    pub fn state(&self) -> ForwardState {
        match self {
            ForwardOutcome::Sent => ForwardState::Sent,
            ForwardOutcome::Rejected(_) => ForwardState::Rejected,
            ForwardOutcome::Terminated => ForwardState::Terminated,
        }
    }
}
