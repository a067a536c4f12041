//! SIP message containers used by the forwarding core.
//!
//! URIs, parameters, Via hops, name-addr headers, methods and status codes
//! come from `rvoip-sip-core`. Parsing whole messages is the job of the layer
//! below; [`SipRequest`] and [`SipResponse`] are the already-parsed form the
//! core reads and mutates.

pub mod ext;
pub mod request;

pub use ext::{
    BRANCH_MAGIC_COOKIE, DEFAULT_SIP_PORT, DEFAULT_SIPS_PORT, TransportProtocol, UriExt, ViaExt, parse_host,
    same_host, via,
};
pub use request::{SipRequest, SipResponse};
pub use rvoip_sip_core::types::address::Address;
pub use rvoip_sip_core::types::param::Param;
pub use rvoip_sip_core::types::uri::{Host, Scheme, Uri};
pub use rvoip_sip_core::types::via::ViaHeader;
pub use rvoip_sip_core::types::{CSeq, Method, StatusCode};
