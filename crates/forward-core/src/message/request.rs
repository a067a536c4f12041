//! # SIP Messages
//!
//! Already-parsed requests and responses. The forwarding core mutates a
//! request in place (Max-Forwards, Route popping, Record-Route/Path insertion,
//! parameter stripping) before handing it to the transport layer; responses
//! go through untouched.

use rvoip_sip_core::types::address::Address;
use rvoip_sip_core::types::uri::Uri;
use rvoip_sip_core::types::via::ViaHeader;
use rvoip_sip_core::types::{CSeq, Method, StatusCode};

/// A SIP request, as handed over by the parser.
///
/// Header lists keep wire order: `vias[0]` is the topmost Via, `routes[0]`
/// the next Route to visit.
#[derive(Debug, Clone, PartialEq)]
pub struct SipRequest {
    pub method: Method,
    /// Request-URI
    pub uri: Uri,
    pub vias: Vec<ViaHeader>,
    pub routes: Vec<Address>,
    pub record_routes: Vec<Address>,
    pub paths: Vec<Address>,
    pub contacts: Vec<Address>,
    pub call_id: Option<String>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub cseq: Option<CSeq>,
    pub max_forwards: Option<u32>,
}

impl SipRequest {
    /// Create a request with no headers
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            vias: Vec::new(),
            routes: Vec::new(),
            record_routes: Vec::new(),
            paths: Vec::new(),
            contacts: Vec::new(),
            call_id: None,
            from: None,
            to: None,
            cseq: None,
            max_forwards: None,
        }
    }

    /// Append a Via below the existing ones
    pub fn with_via(mut self, via: ViaHeader) -> Self {
        self.vias.push(via);
        self
    }

    /// Append a Route after the existing ones
    pub fn with_route(mut self, route: Uri) -> Self {
        self.routes.push(Address::new(route));
        self
    }

    pub fn with_contact(mut self, contact: Uri) -> Self {
        self.contacts.push(Address::new(contact));
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    /// Set the CSeq, using the request's own method
    pub fn with_cseq(mut self, seq: u32) -> Self {
        self.cseq = Some(CSeq::new(seq, self.method.clone()));
        self
    }

    pub fn with_max_forwards(mut self, max_forwards: u32) -> Self {
        self.max_forwards = Some(max_forwards);
        self
    }

    /// The To-tag; its presence means the request is inside a dialog
    pub fn to_tag(&self) -> Option<&str> {
        self.to.as_ref().and_then(|to| to.tag())
    }

    /// Number of Via hops already traversed
    pub fn via_count(&self) -> usize {
        self.vias.len()
    }
}

/// A SIP response.
///
/// The forwarding core never looks inside responses; only the fields needed
/// to correlate them in logs are modelled.
#[derive(Debug, Clone, PartialEq)]
pub struct SipResponse {
    pub status: StatusCode,
    pub reason: String,
    pub vias: Vec<ViaHeader>,
    pub call_id: Option<String>,
    pub cseq: Option<CSeq>,
}

impl SipResponse {
    /// Create a response with the default reason phrase
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.reason_phrase().to_string(),
            vias: Vec::new(),
            call_id: None,
            cseq: None,
        }
    }

    pub fn with_via(mut self, via: ViaHeader) -> Self {
        self.vias.push(via);
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}
