//! # Forward Configuration
//!
//! Configuration of the forwarding core, loaded once at startup and read-only
//! afterwards. The on-disk form is a `[forward]` TOML table:
//!
//! ```toml
//! [forward]
//! route = "<sip:backend.example.com;transport=tcp;lr>"
//! add-path = true
//! rewrite-req-uri = false
//! default-transport = "udp"
//! params-to-remove = ["pn-tok", "pn-type", "app-id"]
//! ```
//!
//! [`ForwardSettings`] is the raw deserialized form; [`ForwardConfig`] is the
//! validated form the coordinator uses, with the route already parsed.
//!
//! ```rust
//! use rvoip_forward_core::config::{DefaultTransport, ForwardConfig};
//!
//! let config = ForwardConfig::from_toml_str(r#"
//!     [forward]
//!     route = "sip:backend.example.com"
//!     default-transport = "tcp"
//! "#).unwrap();
//!
//! assert_eq!(config.route().unwrap().host.to_string(), "backend.example.com");
//! assert_eq!(config.default_transport(), DefaultTransport::Tcp);
//! assert!(config.add_path());
//! ```

use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::errors::ConfigError;
use crate::message::{Host, Uri};

/// Parameters stripped by default: push-notification data that only the
/// registrar and the push gateway need
pub const DEFAULT_PARAMS_TO_REMOVE: &[&str] = &[
    "pn-tok",
    "pn-type",
    "app-id",
    "pn-msg-str",
    "pn-call-str",
    "pn-call-snd",
    "pn-msg-snd",
    "pn-timeout",
];

/// Transport assumed for `sip:` destinations without a `transport` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultTransport {
    #[default]
    Udp,
    Tcp,
    Tls,
}

impl DefaultTransport {
    /// The `transport=` value to append; UDP is implicit and adds nothing
    pub fn transport_param(&self) -> Option<&'static str> {
        match self {
            DefaultTransport::Udp => None,
            DefaultTransport::Tcp => Some("tcp"),
            DefaultTransport::Tls => Some("tls"),
        }
    }
}

/// Raw forward settings as they appear in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ForwardSettings {
    /// Route every request not already resolved through this URI; empty
    /// disables the override
    pub route: String,
    /// Add a Path header on forwarded REGISTER requests
    pub add_path: bool,
    /// Rewrite the Request-URI with the override route
    pub rewrite_req_uri: bool,
    pub default_transport: DefaultTransport,
    /// URI and Contact parameters removed before a request leaves the proxy
    pub params_to_remove: Vec<String>,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            route: String::new(),
            add_path: true,
            rewrite_req_uri: false,
            default_transport: DefaultTransport::Udp,
            params_to_remove: DEFAULT_PARAMS_TO_REMOVE
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    forward: ForwardSettings,
}

/// Validated, immutable forward configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardConfig {
    route: Option<Uri>,
    add_path: bool,
    rewrite_req_uri: bool,
    default_transport: DefaultTransport,
    params_to_remove: IndexSet<String>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        let settings = ForwardSettings::default();
        Self {
            route: None,
            add_path: settings.add_path,
            rewrite_req_uri: settings.rewrite_req_uri,
            default_transport: settings.default_transport,
            params_to_remove: normalize_names(&settings.params_to_remove),
        }
    }
}

impl ForwardConfig {
    /// Validate raw settings.
    ///
    /// A non-empty route must parse and must have a host.
    pub fn from_settings(settings: ForwardSettings) -> Result<Self, ConfigError> {
        let route = match settings.route.trim() {
            "" => None,
            raw => {
                let route = parse_route(raw)?;
                debug!("Forward override route set to {}", route);
                Some(route)
            }
        };

        Ok(Self {
            route,
            add_path: settings.add_path,
            rewrite_req_uri: settings.rewrite_req_uri,
            default_transport: settings.default_transport,
            params_to_remove: normalize_names(&settings.params_to_remove),
        })
    }

    /// Load from the `[forward]` table of a TOML document; a missing table
    /// gives the defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        Self::from_settings(file.forward)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Builder-style override route
    pub fn with_route(mut self, route: Uri) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_add_path(mut self, add_path: bool) -> Self {
        self.add_path = add_path;
        self
    }

    pub fn with_rewrite_req_uri(mut self, rewrite: bool) -> Self {
        self.rewrite_req_uri = rewrite;
        self
    }

    pub fn with_default_transport(mut self, transport: DefaultTransport) -> Self {
        self.default_transport = transport;
        self
    }

    pub fn with_params_to_remove<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.params_to_remove = names
            .into_iter()
            .map(|name| name.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn route(&self) -> Option<&Uri> {
        self.route.as_ref()
    }

    pub fn add_path(&self) -> bool {
        self.add_path
    }

    pub fn rewrite_req_uri(&self) -> bool {
        self.rewrite_req_uri
    }

    pub fn default_transport(&self) -> DefaultTransport {
        self.default_transport
    }

    /// Parameter names to strip, lower-cased, in configuration order
    pub fn params_to_remove(&self) -> &IndexSet<String> {
        &self.params_to_remove
    }
}

/// Parse a route given either as a bare URI or as `<uri>`
fn parse_route(raw: &str) -> Result<Uri, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidRoute {
        route: raw.to_string(),
        reason,
    };
    let bare = raw
        .strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(raw);
    let route: Uri = bare.parse().map_err(|e| invalid(format!("{}", e)))?;
    if route.is_custom() || matches!(&route.host, Host::Domain(host) if host.is_empty()) {
        return Err(invalid("route has no host".to_string()));
    }
    Ok(route)
}

fn normalize_names(names: &[String]) -> IndexSet<String> {
    names
        .iter()
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}
