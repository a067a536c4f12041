//! Loop detection on the Via chain (RFC 3261 Section 16.3, step 4).
//!
//! A request whose Via chain already carries the branch we are about to add
//! has passed through this proxy with the same routing inputs, so forwarding
//! it again would loop. Only stateless loops are caught this way: a loop that
//! comes back on the same client transaction is absorbed by transaction
//! matching before it ever reaches the forwarding core.

use tracing::debug;

use crate::branch::{BranchToken, strip_cookie};
use crate::common::errors::{ForwardError, Result};
use crate::message::SipRequest;

/// Whether any Via of `request` carries `branch`, cookie prefixes ignored
pub fn is_looping(request: &SipRequest, branch: &BranchToken) -> bool {
    request
        .vias
        .iter()
        .filter_map(|via| via.branch())
        .any(|existing| strip_cookie(existing) == branch.token())
}

/// [`is_looping`] as a check, failing with [`ForwardError::LoopDetected`]
pub fn check_loop(request: &SipRequest, branch: &BranchToken) -> Result<()> {
    if is_looping(request, branch) {
        debug!("Loop detected: branch {} already in Via chain", branch);
        return Err(ForwardError::LoopDetected {
            branch: branch.value(),
        });
    }
    Ok(())
}
