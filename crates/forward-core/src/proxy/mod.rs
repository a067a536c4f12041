//! # Forward Coordinator
//!
//! [`ForwardCoordinator`] is the last stage of request processing: it takes a
//! [`RequestEvent`] that earlier stages have finished with, decides where the
//! request goes, rewrites it for the next hop and hands it to the transport
//! layer through a [`ForwardSink`].
//!
//! ## Request flow
//!
//! 1. Max-Forwards check ([`routing::check_max_forwards`])
//! 2. Next-hop resolution ([`routing::resolve_next_hop`])
//! 3. GRUU resolution through the [`LocationDirectory`], for in-dialog
//!    requests addressed to a GRUU
//! 4. Host overrides, self-forward guard and connection selection
//! 5. Record-Route / Path insertion and parameter sanitization
//! 6. Client transaction binding, branch computation and loop check
//! 7. Hand-off as an [`OutboundRequest`]
//!
//! Failures that have a SIP answer (483, 400, 482, 500) are replied to by the
//! coordinator itself and end in [`ForwardOutcome::Rejected`]; only a failed
//! hand-off to the sink is returned as an error. Responses pass through
//! unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::branch::{BranchToken, compute_branch};
use crate::common::errors::{ForwardError, Result};
use crate::common::types::{ForwardOutcome, ForwardState};
use crate::config::ForwardConfig;
use crate::event::{OutgoingTransaction, RequestEvent, TransactionLayer};
use crate::gruu::{self, GruuResolution, LocationDirectory, LookupOutcome, PendingGruuResolution};
use crate::hosts::HostsResolver;
use crate::loop_detector;
use crate::message::{Host, Method, SipRequest, SipResponse, StatusCode, Uri};
use crate::routing::{self, Destination, ProxyIdentity, is_self_destination};
use crate::sanitize;
use crate::transport::{ConnectionHandle, TransportRegistry, TransportSelection, proxy_hop, select_connection};

/// A request ready for the wire
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub request: SipRequest,
    /// Where to send it; may differ from the Request-URI
    pub destination: Uri,
    /// Branch of the Via the transport layer adds
    pub branch: BranchToken,
    /// Connection to send on, when one was found
    pub connection: Option<ConnectionHandle>,
    /// Client transaction the request belongs to, if forwarded statefully
    pub transaction: Option<OutgoingTransaction>,
}

/// Outbound side of the coordinator: the transport and transaction layers
#[async_trait]
pub trait ForwardSink: Send + Sync {
    /// Send a forwarded request
    async fn send_request(&self, outbound: OutboundRequest) -> Result<()>;

    /// Send a response upstream
    async fn send_response(&self, response: SipResponse) -> Result<()>;

    /// Answer `request` with `status`, advertising `server` in the Server
    /// header
    async fn reply(&self, request: &SipRequest, status: StatusCode, server: &str) -> Result<()>;
}

/// A stage of the request processing chain
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn process_request(&self, event: RequestEvent) -> Result<ForwardOutcome>;

    async fn process_response(&self, response: SipResponse) -> Result<()>;
}

/// Stateless request-forwarding coordinator
pub struct ForwardCoordinator {
    config: Arc<ForwardConfig>,
    identity: Arc<dyn ProxyIdentity>,
    directory: Arc<dyn LocationDirectory>,
    hosts: Arc<dyn HostsResolver>,
    registry: Arc<dyn TransportRegistry>,
    transactions: Arc<dyn TransactionLayer>,
    sink: Arc<dyn ForwardSink>,
}

impl ForwardCoordinator {
    pub fn new(
        config: Arc<ForwardConfig>,
        identity: Arc<dyn ProxyIdentity>,
        directory: Arc<dyn LocationDirectory>,
        hosts: Arc<dyn HostsResolver>,
        registry: Arc<dyn TransportRegistry>,
        transactions: Arc<dyn TransactionLayer>,
        sink: Arc<dyn ForwardSink>,
    ) -> Self {
        Self {
            config,
            identity,
            directory,
            hosts,
            registry,
            transactions,
            sink,
        }
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    pub fn identity(&self) -> &dyn ProxyIdentity {
        self.identity.as_ref()
    }

    /// Resolve the destination of `event`.
    ///
    /// Returns the event with its destination, or a [`PendingGruuResolution`]
    /// when the directory must be consulted first. Errors come back with the
    /// event so the caller can reply.
    pub fn route(&self, mut event: RequestEvent) -> std::result::Result<Routed, (RequestEvent, ForwardError)> {
        if let Err(error) = routing::check_max_forwards(&mut event.request) {
            return Err((event, error));
        }
        event.advance(ForwardState::MaxForwardsChecked);

        let destination =
            match routing::resolve_next_hop(&mut event.request, &self.config, self.identity.as_ref()) {
                Ok(destination) => destination,
                Err(error) => return Err((event, error)),
            };
        event.advance(ForwardState::RouteResolved);

        if gruu::needs_resolution(&event.request, &destination) {
            debug!(request_id = %event.id, "Destination {} is a GRUU, asking the directory", destination.uri);
            return Ok(Routed::Pending(PendingGruuResolution::new(event, destination)));
        }
        Ok(Routed::Ready(event, destination))
    }

    /// Continue a request whose GRUU lookup was answered by `outcome`
    pub async fn resume(&self, pending: PendingGruuResolution, outcome: LookupOutcome) -> Result<ForwardOutcome> {
        self.finish_resolution(pending.resume(outcome)).await
    }

    async fn finish_resolution(&self, resolution: GruuResolution) -> Result<ForwardOutcome> {
        match resolution {
            GruuResolution::Resolved { event, destination } => self.send(event, destination).await,
            GruuResolution::Failed { event, error } => self.reject(event, error).await,
        }
    }

    /// Rewrite `event` for its next hop and hand it to the sink
    pub async fn send(&self, mut event: RequestEvent, mut destination: Destination) -> Result<ForwardOutcome> {
        event.advance(ForwardState::DestinationFinalized);
        self.apply_hosts_override(&mut destination);

        let mut connection = None;
        if event.has_outgoing_leg() {
            if is_self_destination(&destination.uri, self.identity.as_ref()) {
                debug!(request_id = %event.id, "Skipping forwarding of request to us {}", destination.uri);
                return Ok(self.terminate(&mut event));
            }
            match select_connection(self.registry.as_ref(), &destination) {
                TransportSelection::Connection(selected) => connection = Some(selected),
                TransportSelection::Unavailable => {}
                TransportSelection::AffinityConflict { expected, found } => {
                    debug!(
                        request_id = %event.id,
                        "Destination registration id {:x} differs from connection registration id {:x}",
                        expected, found
                    );
                    return Ok(self.terminate(&mut event));
                }
            }
        }
        event.advance(ForwardState::TransportSelected);

        self.add_hops(&mut event, connection.as_ref());
        sanitize::sanitize_request(&mut event.request, self.config.params_to_remove());
        event.advance(ForwardState::Sanitized);

        event.bind_outgoing_transaction(self.transactions.as_ref());
        let transaction = event.outgoing_transaction().cloned();
        let branch = compute_branch(&event.request, self.identity.unique_id(), transaction.as_ref());
        event.advance(ForwardState::BranchComputed);

        if let Err(error) = loop_detector::check_loop(&event.request, &branch) {
            return self.reject(event, error).await;
        }
        event.advance(ForwardState::LoopChecked);

        debug!(
            request_id = %event.id,
            call_id = ?event.request.call_id,
            "Forwarding {} to {} with branch {}",
            event.request.method, destination.uri, branch
        );
        self.sink
            .send_request(OutboundRequest {
                request: event.request,
                destination: destination.uri,
                branch,
                connection,
                transaction,
            })
            .await?;
        Ok(ForwardOutcome::Sent)
    }

    fn apply_hosts_override(&self, destination: &mut Destination) {
        let Host::Domain(host) = &destination.uri.host else {
            return;
        };
        if let Some(address) = self.hosts.resolve(host) {
            debug!("Found {} in hosts override, using {}", host, address);
            destination.uri.host = Host::Address(address);
        }
    }

    // A second Record-Route bridges transports when an earlier stage already
    // recorded the inbound side; REGISTER gets a Path instead.
    fn add_hops(&self, event: &mut RequestEvent, connection: Option<&ConnectionHandle>) {
        let method = event.request.method.clone();
        if event.record_route_added && matches!(method, Method::Invite | Method::Subscribe) {
            let hop = proxy_hop(self.identity.as_ref(), connection);
            debug!(request_id = %event.id, "Adding outgoing Record-Route {}", hop.uri);
            event.request.record_routes.insert(0, hop);
        }
        if self.config.add_path() && method == Method::Register {
            let hop = proxy_hop(self.identity.as_ref(), connection);
            debug!(request_id = %event.id, "Adding Path {}", hop.uri);
            event.request.paths.insert(0, hop);
        }
    }

    fn terminate(&self, event: &mut RequestEvent) -> ForwardOutcome {
        event.advance(ForwardState::Terminated);
        ForwardOutcome::Terminated
    }

    /// Reply to `event` with the status `error` maps to.
    ///
    /// Errors without a status are returned. A failing reply is logged and
    /// swallowed: the upstream transaction may already be gone.
    async fn reject(&self, mut event: RequestEvent, error: ForwardError) -> Result<ForwardOutcome> {
        let Some(status) = error.status_code() else {
            return Err(error);
        };
        debug!(request_id = %event.id, "Rejecting request with {}: {}", status, error);
        if let Err(reply_error) = self
            .sink
            .reply(&event.request, status, self.identity.server_string())
            .await
        {
            warn!(request_id = %event.id, "Failed to reply {}: {}", status, reply_error);
        }
        event.advance(ForwardState::Rejected);
        Ok(ForwardOutcome::Rejected(status))
    }
}

/// Result of [`ForwardCoordinator::route`]
#[derive(Debug)]
pub enum Routed {
    /// Destination known; call [`ForwardCoordinator::send`]
    Ready(RequestEvent, Destination),
    /// Waiting on the location directory
    Pending(PendingGruuResolution),
}

#[async_trait]
impl RequestProcessor for ForwardCoordinator {
    async fn process_request(&self, event: RequestEvent) -> Result<ForwardOutcome> {
        match self.route(event) {
            Ok(Routed::Ready(event, destination)) => self.send(event, destination).await,
            Ok(Routed::Pending(pending)) => {
                let resolution = pending.resolve(self.directory.as_ref()).await;
                self.finish_resolution(resolution).await
            }
            Err((event, error)) => self.reject(event, error).await,
        }
    }

    async fn process_response(&self, response: SipResponse) -> Result<()> {
        self.sink.send_response(response).await
    }
}
