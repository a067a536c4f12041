//! # Forwarding Helpers
//!
//! The few URI and Via questions the forwarding core asks that
//! `rvoip-sip-core` does not answer directly: generic parameter lookup and
//! removal by name, default ports, whether a URI is already a concrete
//! endpoint, and whether a Via hop was sent by a given URI.
//!
//! ```rust
//! use rvoip_forward_core::message::{TransportProtocol, Uri, UriExt, ViaExt, via};
//!
//! let route: Uri = "sip:backend.example.com:5070".parse().unwrap();
//! assert!(!route.is_resolved());
//!
//! // a port-less Via stands for 5060 over UDP
//! let hop = via(TransportProtocol::Udp, "backend.example.com");
//! assert!(!hop.sent_by_matches(&route));
//! assert!(hop.with_port(5070).sent_by_matches(&route));
//! ```

use std::fmt;
use std::net::IpAddr;

use rvoip_sip_core::types::param::Param;
use rvoip_sip_core::types::uri::{Host, Scheme, Uri};
use rvoip_sip_core::types::via::{SentProtocol, ViaHeader};

/// Magic cookie that starts every RFC 3261 branch parameter
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// Default port for `sip:` URIs over UDP and TCP
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// Default port for `sips:` URIs and TLS transport
pub const DEFAULT_SIPS_PORT: u16 = 5061;

/// Transport protocol of a Via hop or an outbound connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl TransportProtocol {
    /// Upper-case form used in Via headers
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Tls => "TLS",
            TransportProtocol::Ws => "WS",
            TransportProtocol::Wss => "WSS",
        }
    }

    /// Lower-case form used in `transport=` URI parameters
    pub fn param_value(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "udp",
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Tls => "tls",
            TransportProtocol::Ws => "ws",
            TransportProtocol::Wss => "wss",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port a sent-by without one stands for, given its transport token
fn default_port_for_transport(transport: &str) -> u16 {
    if transport.eq_ignore_ascii_case("tls") {
        DEFAULT_SIPS_PORT
    } else {
        DEFAULT_SIP_PORT
    }
}

/// A host from its textual form: IP literals (bracketed or not) become
/// addresses, anything else a domain
pub fn parse_host(value: &str) -> Host {
    let bare = value.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(address) => Host::Address(address),
        Err(_) => Host::Domain(value.to_string()),
    }
}

/// Hosts compare case-insensitively on their textual form
pub fn same_host(a: &Host, b: &Host) -> bool {
    match (a, b) {
        (Host::Address(a), Host::Address(b)) => a == b,
        _ => a.to_string().eq_ignore_ascii_case(&b.to_string()),
    }
}

/// A `SIP/2.0/<transport>` Via hop sent by `host`, without port or parameters
pub fn via(protocol: TransportProtocol, host: &str) -> ViaHeader {
    ViaHeader {
        sent_protocol: SentProtocol {
            name: "SIP".to_string(),
            version: "2.0".to_string(),
            transport: protocol.as_str().to_string(),
        },
        sent_by_host: parse_host(host),
        sent_by_port: None,
        params: Vec::new(),
    }
}

/// Parameter and routing helpers on [`Uri`]
pub trait UriExt {
    /// The value of a parameter, `None` when absent or a flag
    fn param(&self, name: &str) -> Option<String>;

    fn has_param(&self, name: &str) -> bool;

    /// Remove every parameter called `name`, returning the first one's value
    /// (`Some(None)` for a flag)
    fn remove_param(&mut self, name: &str) -> Option<Option<String>>;

    /// Whether the scheme is `sip` or `sips`
    fn is_sip_family(&self) -> bool;

    /// The explicit port, or the default one for the scheme and transport
    fn effective_port(&self) -> u16;

    /// Whether this URI already designates a concrete endpoint.
    ///
    /// A URI is resolved when it carries a `maddr` parameter, or when its
    /// host is an IP literal with an explicit port; no DNS lookup would
    /// change where it goes.
    fn is_resolved(&self) -> bool;
}

impl UriExt for Uri {
    fn param(&self, name: &str) -> Option<String> {
        self.parameters
            .iter()
            .find(|param| param.key().eq_ignore_ascii_case(name))
            .and_then(Param::value)
    }

    fn has_param(&self, name: &str) -> bool {
        self.parameters
            .iter()
            .any(|param| param.key().eq_ignore_ascii_case(name))
    }

    fn remove_param(&mut self, name: &str) -> Option<Option<String>> {
        let index = self
            .parameters
            .iter()
            .position(|param| param.key().eq_ignore_ascii_case(name))?;
        let removed = self.parameters.remove(index).value();
        self.parameters
            .retain(|param| !param.key().eq_ignore_ascii_case(name));
        Some(removed)
    }

    fn is_sip_family(&self) -> bool {
        matches!(self.scheme, Scheme::Sip | Scheme::Sips)
    }

    fn effective_port(&self) -> u16 {
        self.port.filter(|port| *port > 0).unwrap_or_else(|| {
            let tls = self
                .param("transport")
                .is_some_and(|transport| transport.eq_ignore_ascii_case("tls"));
            if self.scheme == Scheme::Sips || tls {
                DEFAULT_SIPS_PORT
            } else {
                DEFAULT_SIP_PORT
            }
        })
    }

    fn is_resolved(&self) -> bool {
        let ip_literal = match &self.host {
            Host::Address(_) => true,
            Host::Domain(domain) => domain.parse::<IpAddr>().is_ok(),
        };
        self.has_param("maddr") || (ip_literal && self.port.is_some())
    }
}

/// Builder and matching helpers on a single Via hop
pub trait ViaExt {
    fn with_port(self, port: u16) -> Self;

    fn with_branch(self, branch: impl Into<String>) -> Self;

    /// Whether this hop's sent-by designates `uri`.
    ///
    /// Hosts compare case-insensitively. A missing port on either side stands
    /// for that side's own default: the Via's from its transport, the URI's
    /// from its scheme and `transport` parameter.
    fn sent_by_matches(&self, uri: &Uri) -> bool;
}

impl ViaExt for ViaHeader {
    fn with_port(mut self, port: u16) -> Self {
        self.sent_by_port = Some(port);
        self
    }

    fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.params.retain(|param| !matches!(param, Param::Branch(_)));
        self.params.push(Param::branch(branch));
        self
    }

    fn sent_by_matches(&self, uri: &Uri) -> bool {
        if !same_host(&self.sent_by_host, &uri.host) {
            return false;
        }
        let via_port = self
            .sent_by_port
            .unwrap_or_else(|| default_port_for_transport(self.transport()));
        via_port == uri.effective_port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(text: &str) -> Uri {
        text.parse().unwrap()
    }

    #[test]
    fn test_param_lookup_is_case_insensitive() {
        let uri = Uri::sip("example.com").with_parameter(Param::new("Pn-Tok", Some("abc")));
        assert_eq!(uri.param("pn-tok").as_deref(), Some("abc"));
        assert!(uri.has_param("PN-TOK"));
        assert!(!uri.has_param("pn-type"));
    }

    #[test]
    fn test_remove_param_returns_first_value() {
        let mut uri = Uri::sip("example.com")
            .with_parameter(Param::new("regid", Some("1f")))
            .with_parameter(Param::Lr)
            .with_parameter(Param::new("regid", Some("2a")));
        assert_eq!(uri.remove_param("regid"), Some(Some("1f".to_string())));
        assert!(!uri.has_param("regid"));
        assert_eq!(uri.remove_param("lr"), Some(None));
        assert_eq!(uri.remove_param("lr"), None);
    }

    #[test]
    fn test_resolved_uris() {
        assert!(uri("sip:10.0.0.1:5070").is_resolved());
        assert!(!uri("sip:10.0.0.1").is_resolved());
        assert!(!uri("sip:example.com:5060").is_resolved());
        assert!(Uri::sip("example.com").with_parameter(Param::Maddr("10.0.0.1".into())).is_resolved());
        // a literal built as a domain still counts
        assert!(Uri::sip("10.0.0.1").with_port(5070).is_resolved());
    }

    #[test]
    fn test_effective_port() {
        assert_eq!(Uri::sip("a.example").effective_port(), 5060);
        assert_eq!(Uri::sips("a.example").effective_port(), 5061);
        assert_eq!(
            Uri::sip("a.example").with_parameter(Param::transport("tls")).effective_port(),
            5061
        );
        assert_eq!(Uri::sip("a.example").with_port(5080).effective_port(), 5080);
    }

    #[test]
    fn test_parse_host_strips_brackets() {
        assert_eq!(parse_host("[2001:db8::1]"), Host::Address("2001:db8::1".parse().unwrap()));
        assert_eq!(parse_host("203.0.113.5"), Host::Address("203.0.113.5".parse().unwrap()));
        assert_eq!(parse_host("edge.example.net"), Host::Domain("edge.example.net".into()));
    }

    #[test]
    fn test_via_sent_by_matches_default_port() {
        let proxy = uri("sip:proxy.example.com");
        let hop = via(TransportProtocol::Udp, "PROXY.example.com");
        assert!(hop.sent_by_matches(&proxy));
        assert!(hop.clone().with_port(5060).sent_by_matches(&proxy));
        assert!(!hop.with_port(5070).sent_by_matches(&proxy));
    }

    #[test]
    fn test_portless_via_uses_its_own_default() {
        let route = uri("sip:backend.example.com:5070");
        assert!(!via(TransportProtocol::Udp, "backend.example.com").sent_by_matches(&route));

        let tls_route = uri("sip:backend.example.com:5061");
        assert!(via(TransportProtocol::Tls, "backend.example.com").sent_by_matches(&tls_route));
        assert!(!via(TransportProtocol::Tcp, "backend.example.com").sent_by_matches(&tls_route));
    }

    #[test]
    fn test_via_branch_replaced() {
        let hop = via(TransportProtocol::Udp, "192.0.2.4")
            .with_branch("z9hG4bK.first")
            .with_branch("z9hG4bK.second");
        assert_eq!(hop.branch(), Some("z9hG4bK.second"));
        assert_eq!(hop.params.len(), 1);
    }
}
