//! Removal of proxy-local URI parameters before a request leaves.
//!
//! Push-notification parameters (`pn-tok`, `pn-type`, ...) are registration
//! metadata: the registrar needs them on REGISTER Contacts, but nobody
//! downstream of a call or message should see a device's push token.

use indexmap::IndexSet;
use tracing::debug;

use crate::message::{Method, SipRequest, Uri};

/// Remove every parameter in `names` from `uri`, returning how many were
/// removed
pub fn strip_params(uri: &mut Uri, names: &IndexSet<String>) -> usize {
    let before = uri.parameters.len();
    uri.parameters
        .retain(|param| !names.contains(&param.key().to_ascii_lowercase()));
    before - uri.parameters.len()
}

/// Strip the configured parameters from a request about to be forwarded.
///
/// Contacts are cleaned on every method but REGISTER; the Request-URI is
/// cleaned on every method.
pub fn sanitize_request(request: &mut SipRequest, names: &IndexSet<String>) {
    if names.is_empty() {
        return;
    }
    if request.method != Method::Register && !request.contacts.is_empty() {
        let removed: usize = request
            .contacts
            .iter_mut()
            .map(|contact| strip_params(&mut contact.uri, names))
            .sum();
        if removed > 0 {
            debug!("Removed {} push params from contacts", removed);
        }
    }
    strip_params(&mut request.uri, names);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::UriExt;

    fn names() -> IndexSet<String> {
        ["pn-tok".to_string()].into_iter().collect()
    }

    fn contact() -> Uri {
        "sip:alice@192.0.2.8:5062;pn-tok=abc123;transport=tcp".parse().unwrap()
    }

    #[test]
    fn test_register_contacts_keep_params() {
        let mut request = SipRequest::new(Method::Register, "sip:example.org".parse().unwrap())
            .with_contact(contact());
        sanitize_request(&mut request, &names());
        assert_eq!(request.contacts[0].uri.param("pn-tok").as_deref(), Some("abc123"));
    }

    #[test]
    fn test_other_methods_lose_params() {
        let mut request = SipRequest::new(
            Method::Invite,
            "sip:alice@192.0.2.8:5062;pn-tok=abc123".parse().unwrap(),
        )
        .with_contact(contact());
        sanitize_request(&mut request, &names());
        assert!(!request.contacts[0].uri.has_param("pn-tok"));
        assert_eq!(request.contacts[0].uri.param("transport").as_deref(), Some("tcp"));
        assert!(!request.uri.has_param("pn-tok"));
    }

    #[test]
    fn test_strip_counts_removed() {
        let mut uri: Uri = "sip:a@b.example;PN-TOK=1;pn-type=apple;lr".parse().unwrap();
        let names: IndexSet<String> = ["pn-tok", "pn-type"].iter().map(|n| n.to_string()).collect();
        assert_eq!(strip_params(&mut uri, &names), 2);
        assert_eq!(uri.to_string(), "sip:a@b.example;lr");
    }
}
