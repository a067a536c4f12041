//! # Route Resolution
//!
//! Computes where a request goes next, following RFC 3261 Section 16.4–16.6:
//!
//! 1. Max-Forwards is checked against the hops already traversed and
//!    decremented.
//! 2. Route headers that designate this proxy are popped.
//! 3. The next hop is the topmost remaining Route, or the Request-URI.
//! 4. The destination is validated, stripped of local routing metadata, and
//!    possibly replaced by the configured override route.
//!
//! The [`Destination`] is always a copy. Changes to it reach the request only
//! where this module says so explicitly: `regid` removal from a Request-URI
//! destination, and Request-URI rewriting with the override route.
//!
//! ## NAT traversal parameters
//!
//! A previous hop may have recorded the real source address of a NATed peer
//! on the Route it inserted, as `fs-received` (host) and `fs-rport` (port).
//! They replace the host and port of the destination and are removed from its
//! parameters; they never reach the wire.

pub mod self_guard;

use tracing::debug;

use crate::common::errors::{ForwardError, Result};
use crate::config::ForwardConfig;
use crate::message::{Host, Param, Scheme, SipRequest, Uri, UriExt, ViaExt, parse_host};

pub use self_guard::{LocalIdentity, PROXY_ID_PARAM, ProxyIdentity, is_self_destination, route_targets_us};

/// Route parameter overriding the destination host
pub const RECEIVED_PARAM: &str = "fs-received";

/// Route parameter overriding the destination port
pub const RPORT_PARAM: &str = "fs-rport";

/// URI parameter binding a contact to a registration (RFC 5626 reg-id)
pub const REGID_PARAM: &str = "regid";

/// URI parameter marking a GRUU (RFC 5627)
pub const GRUU_PARAM: &str = "gr";

/// Where a destination was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationSource {
    RequestUri,
    Route,
    OverrideRoute,
    /// Resolved contact from the location directory
    Directory,
}

/// The next hop of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub uri: Uri,
    /// Registration id the original destination was bound to, if any.
    /// An outbound connection tied to a different registration must not be
    /// used for this request.
    pub registration_id: Option<u64>,
    pub source: DestinationSource,
}

impl Destination {
    pub fn new(uri: Uri, source: DestinationSource) -> Self {
        Self {
            uri,
            registration_id: None,
            source,
        }
    }

    /// Whether the destination is a GRUU
    pub fn is_gruu(&self) -> bool {
        self.uri.has_param(GRUU_PARAM)
    }
}

/// Resolve the destination of `request`, mutating Max-Forwards and the Route
/// set on the way.
///
/// # Errors
///
/// - [`ForwardError::TooManyHops`] when Max-Forwards is exhausted; the
///   counter is left unchanged.
/// - [`ForwardError::BadRequest`] when the destination is not a usable SIP
///   URI.
pub fn resolve_destination(
    request: &mut SipRequest,
    config: &ForwardConfig,
    identity: &dyn ProxyIdentity,
) -> Result<Destination> {
    check_max_forwards(request)?;
    resolve_next_hop(request, config, identity)
}

/// [`resolve_destination`] without the Max-Forwards check
///
/// # Errors
///
/// [`ForwardError::BadRequest`] when the destination is not a usable SIP URI.
pub fn resolve_next_hop(
    request: &mut SipRequest,
    config: &ForwardConfig,
    identity: &dyn ProxyIdentity,
) -> Result<Destination> {
    pop_self_routes(request, identity);

    let mut destination = match request.routes.first() {
        Some(route) => Destination::new(destination_from_route(&route.uri), DestinationSource::Route),
        None => Destination::new(request.uri.clone(), DestinationSource::RequestUri),
    };

    validate_destination(&destination.uri)?;
    strip_registration_id(request, &mut destination);
    apply_override_route(request, config, &mut destination);
    apply_default_transport(config, &mut destination);

    debug!("Destination resolved to {} ({:?})", destination.uri, destination.source);
    Ok(destination)
}

/// Reject the request when Max-Forwards does not exceed the Via count,
/// otherwise decrement it
pub fn check_max_forwards(request: &mut SipRequest) -> Result<()> {
    let via_count = request.via_count();
    if let Some(max_forwards) = request.max_forwards.as_mut() {
        if (*max_forwards as usize) <= via_count {
            debug!("Too many hops: Max-Forwards {} with {} Via", max_forwards, via_count);
            return Err(ForwardError::TooManyHops {
                max_forwards: *max_forwards,
                via_count,
            });
        }
        *max_forwards -= 1;
    }
    Ok(())
}

/// Pop topmost Route headers while they designate this proxy
pub fn pop_self_routes(request: &mut SipRequest, identity: &dyn ProxyIdentity) -> usize {
    let mut popped = 0;
    while request
        .routes
        .first()
        .is_some_and(|route| route_targets_us(route, identity))
    {
        let route = request.routes.remove(0);
        debug!("Removing top route {}", route.uri);
        popped += 1;
    }
    popped
}

/// Destination taken from a Route URI, with `fs-received`/`fs-rport` applied
pub fn destination_from_route(route: &Uri) -> Uri {
    let mut destination = route.clone();
    if let Some(Some(received)) = destination.remove_param(RECEIVED_PARAM) {
        if !received.is_empty() {
            // IPv6 values may arrive in reference form
            destination.host = parse_host(&received);
        }
    }
    if let Some(Some(rport)) = destination.remove_param(RPORT_PARAM) {
        match rport.parse::<u16>() {
            Ok(port) => destination.port = Some(port),
            Err(_) => debug!("Ignoring invalid {} value '{}'", RPORT_PARAM, rport),
        }
    }
    destination
}

/// A destination must be `sip:`/`sips:` with a host free of `@`
pub fn validate_destination(destination: &Uri) -> Result<()> {
    if !destination.is_sip_family() {
        return Err(ForwardError::bad_request(format!(
            "unsupported scheme '{}'",
            destination.scheme
        )));
    }
    match &destination.host {
        Host::Domain(host) if host.is_empty() => Err(ForwardError::bad_request("destination has no host")),
        // two-'@' URIs leave the second user part in the host
        Host::Domain(host) if host.contains('@') => Err(ForwardError::bad_request(format!(
            "malformed host '{}'",
            host
        ))),
        _ => Ok(()),
    }
}

/// Remove `regid` from the destination, remembering its value.
///
/// When the destination is the Request-URI the parameter is removed from the
/// request as well: it is local metadata and must not be forwarded.
fn strip_registration_id(request: &mut SipRequest, destination: &mut Destination) {
    let Some(value) = destination.uri.remove_param(REGID_PARAM) else {
        return;
    };
    destination.registration_id = value
        .as_deref()
        .and_then(|raw| u64::from_str_radix(raw, 16).ok());
    if destination.source == DestinationSource::RequestUri {
        request.uri.remove_param(REGID_PARAM);
    }
    debug!(
        "Stripped {} from destination (registration id {:?})",
        REGID_PARAM, destination.registration_id
    );
}

/// Replace the destination with the configured override route.
///
/// Skipped when a Via already carries the override route (an earlier proxy
/// of ours forced it and doing it again would loop) and when the destination
/// is already a resolved endpoint.
fn apply_override_route(
    request: &mut SipRequest,
    config: &ForwardConfig,
    destination: &mut Destination,
) {
    let Some(route) = config.route() else {
        return;
    };
    if request.vias.iter().any(|via| via.sent_by_matches(route)) {
        debug!("Found forced outgoing route in via, skipping");
        return;
    }
    if destination.uri.is_resolved() {
        debug!("Destination {} already resolved, not overriding", destination.uri);
        return;
    }
    destination.uri = route.clone();
    destination.source = DestinationSource::OverrideRoute;
    if config.rewrite_req_uri() {
        debug!("Rewriting Request-URI with override route {}", route);
        request.uri = route.clone();
    }
}

fn apply_default_transport(config: &ForwardConfig, destination: &mut Destination) {
    let Some(transport) = config.default_transport().transport_param() else {
        return;
    };
    if destination.uri.scheme == Scheme::Sip && !destination.uri.has_param("transport") {
        destination.uri.parameters.push(Param::transport(transport));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultTransport;
    use crate::message::{Method, StatusCode, TransportProtocol, via};

    fn identity() -> LocalIdentity {
        LocalIdentity::new("proxy-1", "proxy.example.com", 5060)
    }

    fn invite(uri: &str) -> SipRequest {
        invite_to(uri.parse().unwrap())
    }

    fn invite_to(uri: Uri) -> SipRequest {
        SipRequest::new(Method::Invite, uri)
            .with_via(via(TransportProtocol::Udp, "192.0.2.10").with_branch("z9hG4bK.a"))
            .with_max_forwards(70)
    }

    fn host(uri: &Uri) -> String {
        uri.host.to_string()
    }

    #[test]
    fn test_max_forwards_decremented() {
        let mut request = invite("sip:bob@example.org");
        resolve_destination(&mut request, &ForwardConfig::default(), &identity()).unwrap();
        assert_eq!(request.max_forwards, Some(69));
    }

    #[test]
    fn test_max_forwards_exhausted() {
        let mut request = invite("sip:bob@example.org").with_max_forwards(1);
        let error =
            resolve_destination(&mut request, &ForwardConfig::default(), &identity()).unwrap_err();
        assert_eq!(error, ForwardError::TooManyHops { max_forwards: 1, via_count: 1 });
        assert_eq!(request.max_forwards, Some(1));
    }

    #[test]
    fn test_missing_max_forwards_is_allowed() {
        let mut request = invite("sip:bob@example.org");
        request.max_forwards = None;
        resolve_destination(&mut request, &ForwardConfig::default(), &identity()).unwrap();
        assert_eq!(request.max_forwards, None);
    }

    #[test]
    fn test_pops_our_routes_and_uses_next() {
        let mut request = invite("sip:bob@example.org")
            .with_route("sip:proxy.example.com;lr".parse().unwrap())
            .with_route("sip:edge.example.net;lr".parse().unwrap());

        let destination =
            resolve_destination(&mut request, &ForwardConfig::default(), &identity()).unwrap();

        assert_eq!(request.routes.len(), 1);
        assert_eq!(destination.source, DestinationSource::Route);
        assert_eq!(host(&destination.uri), "edge.example.net");
    }

    #[test]
    fn test_route_nat_parameters() {
        let route: Uri = "sip:edge.example.net;lr;fs-received=203.0.113.5;fs-rport=40123"
            .parse()
            .unwrap();
        let destination = destination_from_route(&route);
        assert_eq!(host(&destination), "203.0.113.5");
        assert_eq!(destination.port, Some(40123));
        assert!(!destination.has_param(RECEIVED_PARAM));
        assert!(!destination.has_param(RPORT_PARAM));
        assert!(destination.has_param("lr"));
        // the Route itself is untouched
        assert!(route.has_param(RECEIVED_PARAM));
    }

    #[test]
    fn test_route_nat_parameters_ipv6_reference() {
        let route = Uri::sip("edge.example.net")
            .with_parameter(Param::Lr)
            .with_parameter(Param::new(RECEIVED_PARAM, Some("[2001:db8::1]")))
            .with_parameter(Param::new(RPORT_PARAM, Some("5080")));
        let destination = destination_from_route(&route);
        assert_eq!(destination.host, Host::Address("2001:db8::1".parse().unwrap()));
        assert_eq!(destination.to_string(), "sip:[2001:db8::1]:5080;lr");
    }

    #[test]
    fn test_rejects_non_sip_scheme() {
        let mut request = invite_to(Uri::tel("+15551234567"));
        let error =
            resolve_destination(&mut request, &ForwardConfig::default(), &identity()).unwrap_err();
        assert!(matches!(error, ForwardError::BadRequest { .. }));
    }

    #[test]
    fn test_rejects_at_in_host() {
        for uri in [Uri::sip("b@example.org"), Uri::sips("b@example.org")] {
            let mut request = invite_to(uri.with_user("a"));
            let error = resolve_destination(&mut request, &ForwardConfig::default(), &identity())
                .unwrap_err();
            assert_eq!(error.status_code(), Some(StatusCode::BadRequest));
        }
    }

    #[test]
    fn test_regid_stripped_from_request_uri() {
        let mut request = invite("sip:bob@192.0.2.20:5062;regid=1f;transport=tcp");
        let destination =
            resolve_destination(&mut request, &ForwardConfig::default(), &identity()).unwrap();
        assert_eq!(destination.registration_id, Some(0x1f));
        assert!(!destination.uri.has_param(REGID_PARAM));
        assert!(!request.uri.has_param(REGID_PARAM));
        assert_eq!(request.uri.param("transport").as_deref(), Some("tcp"));
    }

    #[test]
    fn test_override_route_applied() {
        let config = ForwardConfig::default().with_route("sip:backend.example.com".parse().unwrap());
        let mut request = invite("sip:bob@example.org");
        let destination = resolve_destination(&mut request, &config, &identity()).unwrap();
        assert_eq!(destination.source, DestinationSource::OverrideRoute);
        assert_eq!(host(&destination.uri), "backend.example.com");
        assert_eq!(host(&request.uri), "example.org");
    }

    #[test]
    fn test_override_route_rewrites_request_uri() {
        let config = ForwardConfig::default()
            .with_route("sip:backend.example.com".parse().unwrap())
            .with_rewrite_req_uri(true);
        let mut request = invite("sip:bob@example.org");
        resolve_destination(&mut request, &config, &identity()).unwrap();
        assert_eq!(request.uri.to_string(), "sip:backend.example.com");
    }

    #[test]
    fn test_override_route_skipped_when_in_via() {
        let config = ForwardConfig::default().with_route("sip:backend.example.com".parse().unwrap());
        let mut request = invite("sip:bob@example.org")
            .with_via(via(TransportProtocol::Udp, "backend.example.com").with_port(5060));
        let destination = resolve_destination(&mut request, &config, &identity()).unwrap();
        assert_eq!(destination.source, DestinationSource::RequestUri);
    }

    #[test]
    fn test_override_route_on_other_port_not_matched_by_portless_via() {
        // the Via stands for backend.example.com:5060, not the route's 5070
        let config =
            ForwardConfig::default().with_route("sip:backend.example.com:5070".parse().unwrap());
        let mut request =
            invite("sip:bob@example.org").with_via(via(TransportProtocol::Udp, "backend.example.com"));
        let destination = resolve_destination(&mut request, &config, &identity()).unwrap();
        assert_eq!(destination.source, DestinationSource::OverrideRoute);
        assert_eq!(destination.uri.port, Some(5070));
    }

    #[test]
    fn test_override_route_skipped_for_resolved_destination() {
        let config = ForwardConfig::default().with_route("sip:backend.example.com".parse().unwrap());
        let mut request = invite("sip:bob@198.51.100.7:5080");
        let destination = resolve_destination(&mut request, &config, &identity()).unwrap();
        assert_eq!(host(&destination.uri), "198.51.100.7");
    }

    #[test]
    fn test_default_transport_added() {
        let config = ForwardConfig::default().with_default_transport(DefaultTransport::Tcp);
        let mut request = invite("sip:bob@example.org");
        let destination = resolve_destination(&mut request, &config, &identity()).unwrap();
        assert_eq!(destination.uri.param("transport").as_deref(), Some("tcp"));
        // only the destination carries it
        assert!(!request.uri.has_param("transport"));

        let mut request = invite("sip:bob@example.org;transport=udp");
        let destination = resolve_destination(&mut request, &config, &identity()).unwrap();
        assert_eq!(destination.uri.param("transport").as_deref(), Some("udp"));
    }

    #[test]
    fn test_udp_default_adds_nothing() {
        let mut request = invite("sip:bob@example.org");
        let destination =
            resolve_destination(&mut request, &ForwardConfig::default(), &identity()).unwrap();
        assert!(!destination.uri.has_param("transport"));
    }
}
