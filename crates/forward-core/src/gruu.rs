//! # GRUU Resolution
//!
//! In-dialog requests addressed to a GRUU (RFC 5627) cannot be routed on the
//! GRUU itself: it names one registered device, and only the location
//! directory knows which contact that device registered. Out-of-dialog
//! requests are left to the router, so resolution only happens when the
//! request carries a To-tag.
//!
//! Resolution suspends processing. The [`RequestEvent`] moves into a
//! [`PendingGruuResolution`], which is consumed by [`PendingGruuResolution::resume`]
//! once the directory answers. Because the pending value owns the event and
//! `resume` takes it by value, a request is resumed exactly once and nothing
//! else can touch it in the meantime.
//!
//! ```rust
//! use rvoip_forward_core::event::RequestEvent;
//! use rvoip_forward_core::gruu::{Binding, GruuResolution, LookupOutcome, PendingGruuResolution, Record};
//! use rvoip_forward_core::message::{Method, SipRequest};
//! use rvoip_forward_core::routing::{Destination, DestinationSource};
//!
//! let gruu: rvoip_forward_core::message::Uri =
//!     "sip:alice@example.org;gr=urn:uuid:f81d4fae".parse().unwrap();
//! let event = RequestEvent::new(SipRequest::new(Method::Bye, gruu.clone()));
//! let pending = PendingGruuResolution::new(event, Destination::new(gruu, DestinationSource::RequestUri));
//!
//! let record = Record::new("sip:alice@example.org".parse().unwrap())
//!     .with_binding(Binding::new("sip:alice@192.0.2.8:5062".parse().unwrap()));
//!
//! match pending.resume(LookupOutcome::Found(record)) {
//!     GruuResolution::Resolved { event, destination } => {
//!         assert_eq!(event.request.uri.to_string(), "sip:alice@192.0.2.8:5062");
//!         assert_eq!(destination.uri, event.request.uri);
//!     }
//!     GruuResolution::Failed { .. } => unreachable!(),
//! }
//! ```

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::common::errors::ForwardError;
use crate::common::types::ForwardState;
use crate::event::RequestEvent;
use crate::message::{SipRequest, Uri, UriExt};
use crate::routing::{Destination, DestinationSource, GRUU_PARAM, REGID_PARAM};

/// Options of a directory fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Follow aliases to other records
    pub recursive: bool,
    /// Include extended information about the bindings
    pub extra: bool,
}

impl FetchOptions {
    /// Options used for GRUU lookups: a GRUU names exactly one device, so
    /// aliases are never followed
    pub fn gruu() -> Self {
        Self {
            recursive: false,
            extra: false,
        }
    }
}

/// One registered contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub contact: Uri,
    /// Seconds until the registration expires
    pub expires: Option<u32>,
}

impl Binding {
    pub fn new(contact: Uri) -> Self {
        Self {
            contact,
            expires: None,
        }
    }

    pub fn with_expires(mut self, expires: u32) -> Self {
        self.expires = Some(expires);
        self
    }
}

/// Everything the directory knows about one address of record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub aor: Uri,
    pub bindings: Vec<Binding>,
}

impl Record {
    pub fn new(aor: Uri) -> Self {
        Self {
            aor,
            bindings: Vec::new(),
        }
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }
}

/// Answer of a directory fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(Record),
    NotFound,
    /// The directory failed to answer
    Error(String),
    /// The query was rejected as malformed
    Invalid,
}

/// The location directory (registrar database)
#[async_trait]
pub trait LocationDirectory: Send + Sync {
    async fn fetch(&self, uri: &Uri, options: FetchOptions) -> LookupOutcome;
}

/// Whether `destination` must be resolved through the directory first
pub fn needs_resolution(request: &SipRequest, destination: &Destination) -> bool {
    destination.is_gruu() && request.to_tag().is_some()
}

/// Result of resuming a [`PendingGruuResolution`]
#[derive(Debug)]
pub enum GruuResolution {
    /// The request now targets the device's contact; continue sending
    Resolved {
        event: RequestEvent,
        destination: Destination,
    },
    /// Resolution failed; the caller replies with the error's status
    Failed {
        event: RequestEvent,
        error: ForwardError,
    },
}

/// A request waiting for the directory to resolve its GRUU
#[derive(Debug)]
pub struct PendingGruuResolution {
    event: RequestEvent,
    gruu: Destination,
}

impl PendingGruuResolution {
    /// Suspend `event` until the GRUU in `destination` is resolved
    pub fn new(mut event: RequestEvent, gruu: Destination) -> Self {
        event.advance(ForwardState::SuspendedForGruu);
        Self { event, gruu }
    }

    /// The GRUU being resolved
    pub fn gruu(&self) -> &Uri {
        &self.gruu.uri
    }

    pub fn event(&self) -> &RequestEvent {
        &self.event
    }

    /// Query `directory` and resume with its answer
    pub async fn resolve(self, directory: &dyn LocationDirectory) -> GruuResolution {
        debug!(request_id = %self.event.id, "Resolving GRUU {}", self.gruu.uri);
        let outcome = directory.fetch(&self.gruu.uri, FetchOptions::gruu()).await;
        self.resume(outcome)
    }

    /// Resume processing with the directory's answer.
    ///
    /// Exactly one binding is required. Its contact becomes both the
    /// destination and the Request-URI, without `gr` and `regid`.
    pub fn resume(self, outcome: LookupOutcome) -> GruuResolution {
        let PendingGruuResolution { mut event, gruu } = self;
        event.advance(ForwardState::Resumed);

        let contact = match single_contact(&gruu.uri, outcome) {
            Ok(contact) => contact,
            Err(error) => {
                return GruuResolution::Failed { event, error };
            }
        };

        let mut destination = Destination::new(contact, DestinationSource::Directory);
        destination.uri.remove_param(GRUU_PARAM);
        destination.registration_id = destination
            .uri
            .remove_param(REGID_PARAM)
            .flatten()
            .and_then(|raw| u64::from_str_radix(&raw, 16).ok())
            .or(gruu.registration_id);

        debug!(request_id = %event.id, "GRUU {} resolved to {}", gruu.uri, destination.uri);
        event.request.uri = destination.uri.clone();
        GruuResolution::Resolved { event, destination }
    }
}

fn single_contact(gruu: &Uri, outcome: LookupOutcome) -> Result<Uri, ForwardError> {
    match outcome {
        LookupOutcome::Found(record) => {
            let count = record.bindings.len();
            let mut bindings = record.bindings.into_iter();
            match (bindings.next(), count) {
                (Some(binding), 1) => Ok(binding.contact),
                (None, _) => {
                    debug!("Record not found for {}", gruu);
                    Err(ForwardError::directory(format!("no binding for {}", gruu)))
                }
                _ => {
                    debug!("Too many contacts [{}] found for {}", count, gruu);
                    Err(ForwardError::directory(format!(
                        "{} bindings for {}",
                        count, gruu
                    )))
                }
            }
        }
        LookupOutcome::NotFound => {
            debug!("Record not found for {}", gruu);
            Err(ForwardError::directory(format!("record not found for {}", gruu)))
        }
        LookupOutcome::Error(message) => {
            warn!("Directory error while resolving {}: {}", gruu, message);
            Err(ForwardError::directory(message))
        }
        LookupOutcome::Invalid => {
            warn!("Directory rejected lookup of {} as invalid", gruu);
            Err(ForwardError::directory("invalid lookup"))
        }
    }
}
