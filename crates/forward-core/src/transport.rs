//! # Transport Selection
//!
//! Picks the live outbound connection a forwarded request should use, and
//! builds the Record-Route and Path entries that describe it.
//!
//! Selection is best effort: when no connection matches, the transport layer
//! opens one on demand and the request goes out anyway. The exception is a
//! connection tied to a client registration (an outbound flow, RFC 5626):
//! when the destination was bound to a different registration the request is
//! dropped rather than delivered to the wrong device.

use tracing::{debug, warn};

use crate::message::{Address, Param, Scheme, TransportProtocol, Uri, UriExt, parse_host};
use crate::routing::{Destination, PROXY_ID_PARAM, ProxyIdentity};

/// A live connection owned by the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: String,
    pub protocol: TransportProtocol,
    /// Our end of the connection
    pub local_host: String,
    pub local_port: u16,
    /// Registration this connection is reserved for, if any
    pub affinity: Option<u64>,
}

impl ConnectionHandle {
    pub fn new(
        id: impl Into<String>,
        protocol: TransportProtocol,
        local_host: impl Into<String>,
        local_port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            protocol,
            local_host: local_host.into(),
            local_port,
            affinity: None,
        }
    }

    pub fn with_affinity(mut self, registration_id: u64) -> Self {
        self.affinity = Some(registration_id);
        self
    }

    /// URI of our end of this connection
    pub fn local_uri(&self) -> Uri {
        let uri = Uri::new(Scheme::Sip, parse_host(&self.local_host)).with_port(self.local_port);
        match self.protocol {
            TransportProtocol::Udp => uri,
            protocol => uri.with_parameter(Param::transport(protocol.param_value())),
        }
    }
}

/// Lookup of existing outbound connections
pub trait TransportRegistry: Send + Sync {
    /// A live connection that can reach `destination`, if one exists
    fn connection_for(&self, destination: &Uri) -> Option<ConnectionHandle>;
}

/// Result of [`select_connection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSelection {
    /// Send on this connection
    Connection(ConnectionHandle),
    /// No live connection; the transport layer will pick one
    Unavailable,
    /// The only live connection belongs to another registration
    AffinityConflict { expected: u64, found: u64 },
}

impl TransportSelection {
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        match self {
            TransportSelection::Connection(connection) => Some(connection),
            _ => None,
        }
    }
}

/// Find the connection for a destination and check its registration affinity
pub fn select_connection(
    registry: &dyn TransportRegistry,
    destination: &Destination,
) -> TransportSelection {
    let Some(connection) = registry.connection_for(&destination.uri) else {
        warn!(
            "Could not find a connection to set a proper outgoing Record-Route to {}",
            destination.uri.host_port()
        );
        return TransportSelection::Unavailable;
    };

    if let (Some(expected), Some(found)) = (destination.registration_id, connection.affinity) {
        if expected != found {
            debug!(
                "Registration id {:x} differs from connection {} registration id {:x}",
                expected, connection.id, found
            );
            return TransportSelection::AffinityConflict { expected, found };
        }
    }

    debug!("Selected connection {} for {}", connection.id, destination.uri);
    TransportSelection::Connection(connection)
}

/// A loose-routing entry naming this proxy on `connection`, or on its default
/// address when no connection is known.
///
/// Used for both Record-Route and Path headers.
pub fn proxy_hop(identity: &dyn ProxyIdentity, connection: Option<&ConnectionHandle>) -> Address {
    let mut uri = match connection {
        Some(connection) => connection.local_uri(),
        None => identity.local_uri(),
    };
    uri.remove_param(PROXY_ID_PARAM);
    uri.remove_param("lr");
    Address::new(
        uri.with_parameter(Param::new(PROXY_ID_PARAM, Some(identity.unique_id())))
            .with_parameter(Param::Lr),
    )
}
