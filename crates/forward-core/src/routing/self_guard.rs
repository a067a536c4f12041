//! # Self-Address Guard
//!
//! Decides whether a Route header or a destination designates this proxy
//! instance. Route headers that point at us are popped before the next hop is
//! chosen; a finalized destination that points at us stops the request, since
//! sending it would only loop it back into this process.
//!
//! A Route can identify us in three ways, any of which suffices:
//!
//! - an `fs-proxy-id` header parameter equal to our instance id,
//! - an `fs-proxy-id` URI parameter equal to our instance id,
//! - a host/port that [`ProxyIdentity::is_us`] recognises.
//!
//! Upstream hops differ in which form of `fs-proxy-id` they write, so both
//! are checked.

use tracing::trace;

use crate::message::{Address, Param, Scheme, TransportProtocol, Uri, UriExt, parse_host};

/// Parameter carrying the unique id of the proxy instance that wrote a
/// Route, Record-Route or Path entry
pub const PROXY_ID_PARAM: &str = "fs-proxy-id";

/// Knowledge of this proxy's own addresses
pub trait ProxyIdentity: Send + Sync {
    /// Whether `uri` addresses this proxy.
    ///
    /// With `strict`, the port must match exactly (defaults applied); without
    /// it, a URI that names no port matches on its host alone.
    fn is_us(&self, uri: &Uri, strict: bool) -> bool;

    /// Identifier unique to this proxy instance
    fn unique_id(&self) -> &str;

    /// Value of the Server header on locally generated replies
    fn server_string(&self) -> &str;

    /// URI describing this proxy when no specific connection is known
    fn local_uri(&self) -> Uri;
}

/// A [`ProxyIdentity`] backed by a static list of host/port aliases.
///
/// ```rust
/// use rvoip_forward_core::routing::{LocalIdentity, ProxyIdentity};
/// use rvoip_forward_core::message::Uri;
///
/// let identity = LocalIdentity::new("proxy-1", "sip.example.com", 5060)
///     .with_alias("10.0.0.1", Some(5060));
///
/// assert!(identity.is_us(&Uri::sip("SIP.example.com"), true));
/// assert!(identity.is_us(&"sip:10.0.0.1".parse().unwrap(), false));
/// assert!(!identity.is_us(&Uri::sip("10.0.0.1").with_port(5070), true));
/// ```
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    unique_id: String,
    server: String,
    local: Uri,
    aliases: Vec<(String, Option<u16>)>,
}

impl LocalIdentity {
    /// Identity listening on `host:port`, which is also its first alias
    pub fn new(unique_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            unique_id: unique_id.into(),
            server: format!("rvoip-forward-core/{}", env!("CARGO_PKG_VERSION")),
            local: Uri::new(Scheme::Sip, parse_host(&host)).with_port(port),
            aliases: vec![(host, Some(port))],
        }
    }

    /// Add another name this proxy answers to; `None` matches any port
    pub fn with_alias(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.aliases.push((host.into(), port));
        self
    }

    pub fn with_server_string(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Advertise a transport in the local URI used for Record-Route and Path
    pub fn with_transport(mut self, transport: TransportProtocol) -> Self {
        if transport != TransportProtocol::Udp {
            self.local.remove_param("transport");
            self.local.parameters.push(Param::transport(transport.param_value()));
        }
        self
    }
}

impl ProxyIdentity for LocalIdentity {
    fn is_us(&self, uri: &Uri, strict: bool) -> bool {
        let host = uri.host.to_string();
        self.aliases.iter().any(|(alias, alias_port)| {
            if !alias.trim_start_matches('[').trim_end_matches(']').eq_ignore_ascii_case(&host) {
                return false;
            }
            match alias_port {
                None => true,
                Some(_) if !strict && uri.port.is_none() => true,
                Some(port) => uri.effective_port() == *port,
            }
        })
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn server_string(&self) -> &str {
        &self.server
    }

    fn local_uri(&self) -> Uri {
        self.local.clone()
    }
}

/// Whether a Route header designates this proxy instance
pub fn route_targets_us(route: &Address, identity: &dyn ProxyIdentity) -> bool {
    let id = identity.unique_id();
    let header_id = route
        .params
        .iter()
        .find(|param| param.key().eq_ignore_ascii_case(PROXY_ID_PARAM))
        .and_then(Param::value);
    if header_id.as_deref() == Some(id) {
        trace!("Route {} matches our proxy id (header parameter)", route.uri);
        return true;
    }
    if route.uri.param(PROXY_ID_PARAM).as_deref() == Some(id) {
        trace!("Route {} matches our proxy id (URI parameter)", route.uri);
        return true;
    }
    identity.is_us(&route.uri, false)
}

/// Whether a finalized destination is this very proxy
pub fn is_self_destination(destination: &Uri, identity: &dyn ProxyIdentity) -> bool {
    identity.is_us(destination, true)
}
