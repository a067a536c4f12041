//! Builder API for assembling a [`ForwardCoordinator`]
//!
//! Only the proxy identity and the outbound sink are required. Everything
//! else has a default that keeps the coordinator usable on its own:
//!
//! - no location directory: GRUU lookups fail and are answered with 500
//! - no host overrides
//! - no connection registry: the transport layer always picks the connection
//! - client transactions keyed by a fresh UUID

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::common::errors::ConfigError;
use crate::config::ForwardConfig;
use crate::event::{OutgoingTransaction, TransactionLayer};
use crate::gruu::{FetchOptions, LocationDirectory, LookupOutcome};
use crate::hosts::{HostsResolver, StaticHosts};
use crate::message::{SipRequest, Uri};
use crate::proxy::{ForwardCoordinator, ForwardSink};
use crate::routing::ProxyIdentity;
use crate::transport::{ConnectionHandle, TransportRegistry};

/// Builder for [`ForwardCoordinator`]
#[derive(Default)]
pub struct ForwardCoordinatorBuilder {
    config: ForwardConfig,
    identity: Option<Arc<dyn ProxyIdentity>>,
    directory: Option<Arc<dyn LocationDirectory>>,
    hosts: Option<Arc<dyn HostsResolver>>,
    registry: Option<Arc<dyn TransportRegistry>>,
    transactions: Option<Arc<dyn TransactionLayer>>,
    sink: Option<Arc<dyn ForwardSink>>,
}

impl ForwardCoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ForwardConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a TOML file with a `[forward]` table
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.config = ForwardConfig::from_file(path)?;
        Ok(self)
    }

    pub fn identity(mut self, identity: Arc<dyn ProxyIdentity>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn LocationDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn hosts(mut self, hosts: Arc<dyn HostsResolver>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    pub fn transport_registry(mut self, registry: Arc<dyn TransportRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn transaction_layer(mut self, transactions: Arc<dyn TransactionLayer>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ForwardSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ForwardCoordinator, ConfigError> {
        let identity = self.identity.ok_or(ConfigError::MissingComponent("proxy identity"))?;
        let sink = self.sink.ok_or(ConfigError::MissingComponent("forward sink"))?;

        if let Some(route) = self.config.route() {
            info!("Forwarding every request through override route {}", route);
        }

        Ok(ForwardCoordinator::new(
            Arc::new(self.config),
            identity,
            self.directory.unwrap_or_else(|| Arc::new(NoDirectory)),
            self.hosts.unwrap_or_else(|| Arc::new(StaticHosts::new())),
            self.registry.unwrap_or_else(|| Arc::new(NoConnections)),
            self.transactions.unwrap_or_else(|| Arc::new(UuidTransactions)),
            sink,
        ))
    }
}

struct NoDirectory;

#[async_trait]
impl LocationDirectory for NoDirectory {
    async fn fetch(&self, _uri: &Uri, _options: FetchOptions) -> LookupOutcome {
        LookupOutcome::Error("no location directory configured".to_string())
    }
}

struct NoConnections;

impl TransportRegistry for NoConnections {
    fn connection_for(&self, _destination: &Uri) -> Option<ConnectionHandle> {
        None
    }
}

struct UuidTransactions;

impl TransactionLayer for UuidTransactions {
    fn create_outgoing_transaction(&self, _request: &SipRequest) -> OutgoingTransaction {
        OutgoingTransaction::new(uuid::Uuid::new_v4().to_string())
    }
}
