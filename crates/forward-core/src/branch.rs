//! # Branch Computation
//!
//! Derives the Via `branch` a forwarded request goes out with (RFC 3261
//! Section 16.6, step 8).
//!
//! A request bound to an outgoing transaction reuses that transaction's
//! branch, so retransmissions match the same client transaction downstream.
//! Otherwise the branch is an MD5 digest of everything that determines where
//! and how the request is routed, which makes it stable across
//! retransmissions of a request that was forwarded statelessly:
//!
//! 1. the proxy's unique id
//! 2. the Request-URI and its parameters
//! 3. the Call-ID
//! 4. the From URI and From-tag
//! 5. the To URI (not the To-tag: some peers add one to CANCEL)
//! 6. the CSeq number, big-endian
//! 7. every Route URI, in order
//!
//! The Via chain is not part of the digest, which is what lets
//! [`crate::loop_detector`] find our own branch coming back.
//!
//! ```rust
//! use rvoip_forward_core::branch::compute_branch;
//! use rvoip_forward_core::message::{Method, SipRequest, Uri};
//!
//! let request = SipRequest::new(Method::Options, Uri::sip("example.org"))
//!     .with_call_id("a84b4c76e66710")
//!     .with_cseq(1);
//!
//! let branch = compute_branch(&request, "proxy-1", None);
//! assert!(branch.to_string().starts_with("z9hG4bK."));
//! assert_eq!(branch, compute_branch(&request, "proxy-1", None));
//! ```

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use md5::{Digest, Md5};

use crate::event::OutgoingTransaction;
use crate::message::{BRANCH_MAGIC_COOKIE, SipRequest, Uri, UriExt};

/// Prefix of every branch this proxy generates
pub const BRANCH_PREFIX: &str = "z9hG4bK.";

/// A Via branch token, stored without its magic-cookie prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchToken(String);

impl BranchToken {
    /// Wrap a stored branch, dropping a cookie prefix if it has one
    pub fn from_stored(branch: &str) -> Self {
        Self(strip_cookie(branch).to_string())
    }

    /// The token without the cookie, as compared by loop detection
    pub fn token(&self) -> &str {
        &self.0
    }

    /// The full branch parameter value, `z9hG4bK.<token>`
    pub fn value(&self) -> String {
        format!("{}{}", BRANCH_PREFIX, self.0)
    }
}

impl fmt::Display for BranchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", BRANCH_PREFIX, self.0)
    }
}

/// Remove the `z9hG4bK.` or bare `z9hG4bK` prefix from a branch value
pub fn strip_cookie(branch: &str) -> &str {
    branch
        .strip_prefix(BRANCH_PREFIX)
        .or_else(|| branch.strip_prefix(BRANCH_MAGIC_COOKIE))
        .unwrap_or(branch)
}

/// Compute the branch for a request about to be forwarded.
///
/// `server_id` is the proxy instance's unique id. A bound `transaction` that
/// already has a branch wins over the digest.
pub fn compute_branch(
    request: &SipRequest,
    server_id: &str,
    transaction: Option<&OutgoingTransaction>,
) -> BranchToken {
    if let Some(branch) = transaction.and_then(|tx| tx.branch.as_deref()) {
        return BranchToken::from_stored(branch);
    }

    let mut hasher = Md5::new();
    update_str0(&mut hasher, server_id);

    update_uri(&mut hasher, &request.uri);
    if !request.uri.parameters.is_empty() {
        let params: String = request.uri.parameters.iter().map(|param| format!(";{}", param)).collect();
        update_str0(&mut hasher, &params);
    }
    if let Some(call_id) = &request.call_id {
        update_str0(&mut hasher, call_id);
    }
    if let Some(from) = &request.from {
        update_uri(&mut hasher, &from.uri);
        update_str0(&mut hasher, &from.tag().unwrap_or_default().to_ascii_lowercase());
    }
    if let Some(to) = &request.to {
        update_uri(&mut hasher, &to.uri);
    }
    if let Some(cseq) = &request.cseq {
        hasher.update(cseq.seq.to_be_bytes());
    }
    for route in &request.routes {
        update_uri(&mut hasher, &route.uri);
    }

    BranchToken(URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

fn update_str0(hasher: &mut Md5, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update([0u8]);
}

// Canonical URI fields only; parameters are folded in separately where needed
fn update_uri(hasher: &mut Md5, uri: &Uri) {
    update_str0(hasher, uri.scheme.as_str());
    update_str0(hasher, uri.user.as_deref().unwrap_or_default());
    update_str0(hasher, &uri.host.to_string().to_ascii_lowercase());
    update_str0(hasher, &uri.effective_port().to_string());
}
