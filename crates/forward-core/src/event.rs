//! # Request Events
//!
//! A [`RequestEvent`] is everything the forwarding core owns about one
//! in-flight request: the request itself, the transaction legs it travels on,
//! and where processing stands. It is moved, never shared: while a GRUU
//! lookup is pending the event lives inside the
//! [`PendingGruuResolution`](crate::gruu::PendingGruuResolution) and nothing
//! else can reach it.

use tracing::{trace, warn};

use crate::common::types::{ForwardState, RequestId};
use crate::message::SipRequest;

/// Handle on a server transaction owned by the transaction layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingTransaction {
    pub key: String,
}

impl IncomingTransaction {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Handle on a client transaction owned by the transaction layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingTransaction {
    pub key: String,
    /// Branch already assigned to this transaction, cookie included or not
    pub branch: Option<String>,
}

impl OutgoingTransaction {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// How the request arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingLeg {
    /// Received without a server transaction
    Stateless,
    Transaction(IncomingTransaction),
}

/// How the request will leave, if it leaves at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingLeg {
    /// Forwarded statelessly
    Stateless,
    Transaction(OutgoingTransaction),
}

/// Creates client transactions on demand
pub trait TransactionLayer: Send + Sync {
    /// Create the client transaction a request will be forwarded on
    fn create_outgoing_transaction(&self, request: &SipRequest) -> OutgoingTransaction;
}

/// Per-request processing context
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub id: RequestId,
    pub request: SipRequest,
    pub incoming: IncomingLeg,
    /// `None` when the request is consumed locally rather than forwarded
    pub outgoing: Option<OutgoingLeg>,
    /// An earlier module already inserted our Record-Route
    pub record_route_added: bool,
    state: ForwardState,
}

impl RequestEvent {
    /// A stateless event with an outgoing leg
    pub fn new(request: SipRequest) -> Self {
        Self {
            id: RequestId::new(),
            request,
            incoming: IncomingLeg::Stateless,
            outgoing: Some(OutgoingLeg::Stateless),
            record_route_added: false,
            state: ForwardState::Received,
        }
    }

    pub fn with_incoming_transaction(mut self, transaction: IncomingTransaction) -> Self {
        self.incoming = IncomingLeg::Transaction(transaction);
        self
    }

    pub fn with_outgoing(mut self, outgoing: Option<OutgoingLeg>) -> Self {
        self.outgoing = outgoing;
        self
    }

    pub fn with_record_route_added(mut self, added: bool) -> Self {
        self.record_route_added = added;
        self
    }

    pub fn state(&self) -> ForwardState {
        self.state
    }

    /// Move to the next processing state.
    ///
    /// Once the request was sent, rejected or dropped its state is final;
    /// later transitions are ignored.
    pub fn advance(&mut self, state: ForwardState) {
        if self.state.is_terminal() {
            warn!(request_id = %self.id, "Ignoring {:?} after terminal state {:?}", state, self.state);
            return;
        }
        trace!(request_id = %self.id, "{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Whether the request will be forwarded
    pub fn has_outgoing_leg(&self) -> bool {
        self.outgoing.is_some()
    }

    /// The bound client transaction, if any
    pub fn outgoing_transaction(&self) -> Option<&OutgoingTransaction> {
        match &self.outgoing {
            Some(OutgoingLeg::Transaction(transaction)) => Some(transaction),
            _ => None,
        }
    }

    /// Create a client transaction when the request arrived on a server
    /// transaction but would leave statelessly.
    ///
    /// Without it, responses would never be routed back through the server
    /// transaction, which would then hang until it times out. Returns whether
    /// a transaction was created.
    pub fn bind_outgoing_transaction(&mut self, layer: &dyn TransactionLayer) -> bool {
        let needs_binding = matches!(self.incoming, IncomingLeg::Transaction(_))
            && matches!(self.outgoing, Some(OutgoingLeg::Stateless));
        if !needs_binding {
            return false;
        }
        let transaction = layer.create_outgoing_transaction(&self.request);
        trace!(request_id = %self.id, "Created outgoing transaction {}", transaction.key);
        self.outgoing = Some(OutgoingLeg::Transaction(transaction));
        true
    }
}
