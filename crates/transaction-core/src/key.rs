//! Transaction identifiers and RFC 3261 section 17 matching keys.

use std::fmt;

use rtext_sip_core::{Method, Request, Response};

use crate::error::{Error, Result};

/// Uniquely identifies a transaction within one dispatcher.
///
/// Client keys are `(branch, method)`; server keys additionally carry the
/// topmost Via sent-by (RFC 3261 section 17.2.3). ACK maps onto the INVITE
/// method so responses and ACKs find the INVITE transaction; CANCEL matches
/// its INVITE through [`TransactionKey::with_method`] while its own server
/// transaction keeps the CANCEL method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    /// Branch parameter from the topmost Via
    pub branch: String,
    /// CSeq method, with ACK folded onto INVITE
    pub method: Method,
    /// Whether this is a server-side key
    pub server: bool,
    /// Topmost Via sent-by; only set on server keys
    pub sent_by: Option<String>,
}

impl TransactionKey {
    pub fn new(branch: impl Into<String>, method: Method, server: bool) -> Self {
        TransactionKey {
            branch: branch.into(),
            method: fold_ack(method),
            server,
            sent_by: None,
        }
    }

    /// Client-side key for an outgoing request.
    pub fn client(request: &Request) -> Result<Self> {
        let via = request
            .top_via()
            .ok_or_else(|| Error::InvalidRequest("missing Via".to_string()))?;
        let branch = via
            .branch()
            .ok_or_else(|| Error::InvalidRequest("missing Via branch".to_string()))?;
        Ok(TransactionKey::new(branch, request.method.clone(), false))
    }

    /// Client-side key a response matches against: branch from the topmost
    /// Via, method from CSeq.
    pub fn for_response(response: &Response) -> Result<Self> {
        let via = response
            .top_via()
            .ok_or_else(|| Error::InvalidRequest("missing Via".to_string()))?;
        let branch = via
            .branch()
            .ok_or_else(|| Error::InvalidRequest("missing Via branch".to_string()))?;
        let cseq = response
            .cseq()
            .ok_or_else(|| Error::InvalidRequest("missing CSeq".to_string()))?;
        Ok(TransactionKey::new(branch, cseq.method, false))
    }

    /// Server-side key for an incoming request.
    pub fn server(request: &Request) -> Result<Self> {
        let via = request
            .top_via()
            .ok_or_else(|| Error::InvalidRequest("missing Via".to_string()))?;
        let branch = via
            .branch()
            .ok_or_else(|| Error::InvalidRequest("missing Via branch".to_string()))?;
        let mut key = TransactionKey::new(branch, request.method.clone(), true);
        key.sent_by = Some(via.sent_by());
        Ok(key)
    }

    /// The same key with the method substituted (ACK/CANCEL -> INVITE
    /// matching per RFC 3261 section 17.2.3).
    pub fn with_method(&self, method: Method) -> Self {
        TransactionKey {
            branch: self.branch.clone(),
            method: fold_ack(method),
            server: self.server,
            sent_by: self.sent_by.clone(),
        }
    }
}

fn fold_ack(method: Method) -> Method {
    if method.is_ack() {
        Method::Invite
    } else {
        method
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.server { "server" } else { "client" };
        match &self.sent_by {
            Some(sent_by) => write!(f, "{}:{}:{}:{}", self.branch, sent_by, self.method, side),
            None => write!(f, "{}:{}:{}", self.branch, self.method, side),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtext_sip_core::RequestBuilder;

    fn invite() -> Request {
        RequestBuilder::new(Method::Invite, "sip:bob@example.com")
            .via("client.example.com:5060", "UDP", "z9hG4bK-key-1")
            .from("", "sip:alice@example.com", Some("t1"))
            .to("", "sip:bob@example.com", None)
            .call_id("c1")
            .cseq(1)
            .max_forwards(70)
            .build()
    }

    #[test]
    fn client_key_from_request() {
        let key = TransactionKey::client(&invite()).unwrap();
        assert_eq!(key.branch, "z9hG4bK-key-1");
        assert_eq!(key.method, Method::Invite);
        assert!(!key.server);
        assert!(key.sent_by.is_none());
    }

    #[test]
    fn ack_folds_onto_invite() {
        let mut ack = invite();
        ack.method = Method::Ack;
        ack.headers.set("CSeq", "1 ACK");
        let key = TransactionKey::client(&ack).unwrap();
        assert_eq!(key.method, Method::Invite);
        assert_eq!(key, TransactionKey::client(&invite()).unwrap());
    }

    #[test]
    fn server_key_includes_sent_by() {
        let key = TransactionKey::server(&invite()).unwrap();
        assert!(key.server);
        assert_eq!(key.sent_by.as_deref(), Some("client.example.com:5060"));
        // Client and server keys never collide
        assert_ne!(key, TransactionKey::client(&invite()).unwrap());
    }

    #[test]
    fn cancel_matches_invite_via_method_substitution() {
        let mut cancel = invite();
        cancel.method = Method::Cancel;
        cancel.headers.set("CSeq", "1 CANCEL");

        let cancel_key = TransactionKey::server(&cancel).unwrap();
        let invite_key = TransactionKey::server(&invite()).unwrap();
        assert_ne!(cancel_key, invite_key);
        assert_eq!(cancel_key.with_method(Method::Invite), invite_key);
    }

    #[test]
    fn request_without_branch_is_rejected() {
        let mut req = invite();
        req.headers.set("Via", "SIP/2.0/UDP client.example.com:5060");
        assert!(TransactionKey::client(&req).is_err());
    }
}
