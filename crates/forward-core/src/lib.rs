//! # RVoIP Forward Core
//!
//! Request-forwarding core for SIP proxies.
//!
//! This library is the final stage of a proxy's request pipeline: given a
//! request that earlier stages (authentication, registrar, router) have
//! finished with, it decides the next hop, rewrites the request for it and
//! hands it to the transport layer.
//!
//! ## Features
//!
//! - **Route resolution**: Max-Forwards, loose routing with Route popping,
//!   NAT parameters recorded on Routes, override routes, default transport
//! - **GRUU resolution**: in-dialog requests addressed to a GRUU are resolved
//!   through the location directory without blocking
//! - **Loop protection**: deterministic Via branches and Via-chain loop
//!   detection, plus a guard against forwarding to ourselves
//! - **Connection affinity**: requests bound to a registration never leave on
//!   another registration's outbound connection
//! - **Record-Route / Path**: transport-bridging Record-Route and Path
//!   insertion
//! - **Sanitization**: push-notification parameters are removed before a
//!   request leaves
//!
//! ## Architecture
//!
//! - `message`: already-parsed SIP requests and responses over the
//!   `rvoip-sip-core` URI, Via and name-addr types
//! - `routing`: next-hop resolution and self-address recognition
//! - `gruu`: location directory lookups and the suspended-request handle
//! - `transport`: connection selection and proxy hop headers
//! - `branch` / `loop_detector`: Via branch computation and loop checks
//! - `sanitize`: URI parameter removal
//! - `proxy`: the [`ForwardCoordinator`] tying it all together
//! - `api`: [`ForwardCoordinatorBuilder`]
//! - `config` / `logging`: TOML configuration and tracing setup
//!
//! ## Example
//!
//! ```rust
//! use rvoip_forward_core::ForwardConfig;
//!
//! let config = ForwardConfig::from_toml_str(
//!     r#"
//!     [forward]
//!     route = "<sip:edge.example.net;transport=tcp>"
//!     add-path = false
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.route().map(|r| r.to_string()).as_deref(), Some("sip:edge.example.net;transport=tcp"));
//! assert!(!config.add_path());
//! ```

pub mod api;
pub mod branch;
pub mod common;
pub mod config;
pub mod event;
pub mod gruu;
pub mod hosts;
pub mod logging;
pub mod loop_detector;
pub mod message;
pub mod proxy;
pub mod routing;
pub mod sanitize;
pub mod transport;

// Re-export key types
pub use api::ForwardCoordinatorBuilder;
pub use branch::{BranchToken, compute_branch};
pub use common::errors::{ConfigError, ForwardError, Result};
pub use common::types::{ForwardOutcome, ForwardState, RequestId};
pub use config::{DefaultTransport, ForwardConfig, ForwardSettings};
pub use event::{IncomingTransaction, OutgoingTransaction, RequestEvent, TransactionLayer};
pub use gruu::{FetchOptions, LocationDirectory, LookupOutcome, PendingGruuResolution};
pub use hosts::{HostsResolver, StaticHosts};
pub use logging::{LogFormat, LoggingConfig, setup_logging};
pub use message::{Address, Method, SipRequest, SipResponse, StatusCode, Uri};
pub use proxy::{ForwardCoordinator, ForwardSink, OutboundRequest, RequestProcessor, Routed};
pub use routing::{Destination, LocalIdentity, ProxyIdentity};
pub use transport::{ConnectionHandle, TransportRegistry};
