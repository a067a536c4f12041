//! Shared mock collaborators for the flow tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rvoip_forward_core::event::OutgoingTransaction;
use rvoip_forward_core::gruu::{FetchOptions, LocationDirectory, LookupOutcome};
use rvoip_forward_core::message::{TransportProtocol, ViaExt, via};
use rvoip_forward_core::{
    ConnectionHandle, ForwardConfig, ForwardCoordinator, ForwardCoordinatorBuilder, ForwardSink,
    Address, LocalIdentity, Method, OutboundRequest, Result, SipRequest, SipResponse, StaticHosts,
    StatusCode, TransactionLayer, TransportRegistry, Uri,
};

pub const PROXY_ID: &str = "proxy-1";

/// Everything the coordinator handed to the outside world
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<OutboundRequest>>,
    pub responses: Mutex<Vec<SipResponse>>,
    pub replies: Mutex<Vec<(StatusCode, String)>>,
    pub replied_requests: Mutex<Vec<SipRequest>>,
    pub fail_replies: bool,
}

impl RecordingSink {
    pub fn failing_replies() -> Self {
        Self {
            fail_replies: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reply_codes(&self) -> Vec<u16> {
        self.replies.lock().unwrap().iter().map(|(status, _)| status.as_u16()).collect()
    }
}

#[async_trait]
impl ForwardSink for RecordingSink {
    async fn send_request(&self, outbound: OutboundRequest) -> Result<()> {
        self.sent.lock().unwrap().push(outbound);
        Ok(())
    }

    async fn send_response(&self, response: SipResponse) -> Result<()> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }

    async fn reply(&self, request: &SipRequest, status: StatusCode, server: &str) -> Result<()> {
        self.replies.lock().unwrap().push((status, server.to_string()));
        self.replied_requests.lock().unwrap().push(request.clone());
        if self.fail_replies {
            return Err(rvoip_forward_core::ForwardError::transport("transaction terminated"));
        }
        Ok(())
    }
}

/// Directory answering every lookup the same way and recording queries
pub struct FixedDirectory {
    pub outcome: LookupOutcome,
    pub queries: Mutex<Vec<(Uri, FetchOptions)>>,
}

impl FixedDirectory {
    pub fn new(outcome: LookupOutcome) -> Self {
        Self {
            outcome,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LocationDirectory for FixedDirectory {
    async fn fetch(&self, uri: &Uri, options: FetchOptions) -> LookupOutcome {
        self.queries.lock().unwrap().push((uri.clone(), options));
        // Let the lookup complete on a later poll, like a real backend would
        tokio::task::yield_now().await;
        self.outcome.clone()
    }
}

/// Registry returning the same connection for every destination
pub struct FixedRegistry(pub Option<ConnectionHandle>);

impl TransportRegistry for FixedRegistry {
    fn connection_for(&self, _destination: &Uri) -> Option<ConnectionHandle> {
        self.0.clone()
    }
}

pub struct CountingTransactions {
    pub created: Mutex<usize>,
}

impl TransactionLayer for CountingTransactions {
    fn create_outgoing_transaction(&self, _request: &SipRequest) -> OutgoingTransaction {
        let mut created = self.created.lock().unwrap();
        *created += 1;
        OutgoingTransaction::new(format!("client-{}", created)).with_branch(format!("z9hG4bK.tx{}", created))
    }
}

pub fn identity() -> LocalIdentity {
    LocalIdentity::new(PROXY_ID, "proxy.example.com", 5060)
        .with_alias("192.0.2.1", Some(5060))
        .with_server_string("forward-test/1.0")
}

pub struct Harness {
    pub coordinator: ForwardCoordinator,
    pub sink: Arc<RecordingSink>,
    pub directory: Arc<FixedDirectory>,
    pub transactions: Arc<CountingTransactions>,
}

pub struct HarnessBuilder {
    config: ForwardConfig,
    sink: RecordingSink,
    outcome: LookupOutcome,
    connection: Option<ConnectionHandle>,
    hosts: StaticHosts,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: ForwardConfig::default(),
            sink: RecordingSink::default(),
            outcome: LookupOutcome::NotFound,
            connection: None,
            hosts: StaticHosts::new(),
        }
    }

    pub fn config(mut self, config: ForwardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sink(mut self, sink: RecordingSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn directory(mut self, outcome: LookupOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn connection(mut self, connection: ConnectionHandle) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn hosts(mut self, hosts: StaticHosts) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn build(self) -> Harness {
        let sink = Arc::new(self.sink);
        let directory = Arc::new(FixedDirectory::new(self.outcome));
        let transactions = Arc::new(CountingTransactions {
            created: Mutex::new(0),
        });
        let coordinator = ForwardCoordinatorBuilder::new()
            .config(self.config)
            .identity(Arc::new(identity()))
            .sink(sink.clone())
            .directory(directory.clone())
            .hosts(Arc::new(self.hosts))
            .transport_registry(Arc::new(FixedRegistry(self.connection)))
            .transaction_layer(transactions.clone())
            .build()
            .unwrap();
        Harness {
            coordinator,
            sink,
            directory,
            transactions,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

/// A name-addr carrying a tag
pub fn tagged(uri: &str, tag: &str) -> Address {
    let mut address = Address::new(uri.parse().unwrap());
    address.set_tag(tag);
    address
}

/// A request from alice to bob with one upstream Via
pub fn request(method: Method, uri: &str) -> SipRequest {
    request_to(method, uri.parse().unwrap())
}

/// Like [`request`], for Request-URIs built field by field
pub fn request_to(method: Method, uri: Uri) -> SipRequest {
    SipRequest::new(method, uri)
        .with_via(via(TransportProtocol::Udp, "198.51.100.20").with_port(5070).with_branch("z9hG4bK.upstream"))
        .with_call_id("a84b4c76e66710@pc33.atlanta.example.com")
        .with_from(tagged("sip:alice@atlanta.example.com", "1928301774"))
        .with_to(Address::new("sip:bob@biloxi.example.com".parse().unwrap()))
        .with_cseq(314159)
        .with_max_forwards(70)
}
