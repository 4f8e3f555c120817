//! Fluent builders for SIP requests and responses.
//!
//! The builders emit raw header values in insertion order; they do not
//! validate completeness — call `is_valid()` on the result when that
//! matters.

use bytes::Bytes;

use crate::error::Result;
use crate::headers::name;
use crate::message::{Request, Response};
use crate::method::Method;
use crate::via::Via;

/// Builder for [`Request`].
///
/// ```
/// use rtext_sip_core::{Method, RequestBuilder};
///
/// let request = RequestBuilder::new(Method::Options, "sip:srv.example.com")
///     .via("client.example.com:5060", "UDP", "z9hG4bK-1")
///     .from("Alice", "sip:alice@example.com", Some("1928301774"))
///     .to("Server", "sip:srv.example.com", None)
///     .call_id("a84b4c76e66710@client.example.com")
///     .cseq(1)
///     .max_forwards(70)
///     .build();
/// assert!(request.is_valid());
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(method: Method, uri: &str) -> Self {
        RequestBuilder {
            request: Request::new(method, uri),
        }
    }

    /// Append a Via header (`sent_by` is `host` or `host:port`).
    pub fn via(mut self, sent_by: &str, transport: &str, branch: &str) -> Self {
        let (host, port) = split_sent_by(sent_by);
        let via = Via::new(transport, host, port, branch);
        self.request.headers.push(name::VIA, via.to_string());
        self
    }

    pub fn from(mut self, display: &str, uri: &str, tag: Option<&str>) -> Self {
        self.request
            .headers
            .push(name::FROM, address_value(display, uri, tag));
        self
    }

    pub fn to(mut self, display: &str, uri: &str, tag: Option<&str>) -> Self {
        self.request
            .headers
            .push(name::TO, address_value(display, uri, tag));
        self
    }

    pub fn call_id(mut self, call_id: &str) -> Self {
        self.request.headers.push(name::CALL_ID, call_id);
        self
    }

    /// CSeq with the sequence number; the method is taken from the request.
    pub fn cseq(mut self, seq: u32) -> Self {
        let value = format!("{} {}", seq, self.request.method);
        self.request.headers.push(name::CSEQ, value);
        self
    }

    pub fn max_forwards(mut self, hops: u32) -> Self {
        self.request.headers.push(name::MAX_FORWARDS, hops.to_string());
        self
    }

    pub fn contact(mut self, uri: &str) -> Self {
        self.request.headers.push(name::CONTACT, format!("<{}>", uri));
        self
    }

    pub fn header(mut self, hname: &str, value: &str) -> Self {
        self.request.headers.push(hname, value);
        self
    }

    pub fn content_type(mut self, value: &str) -> Self {
        self.request.headers.push(name::CONTENT_TYPE, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Finish the request, setting Content-Length to the body size.
    pub fn build(mut self) -> Request {
        let len = self.request.body.len();
        self.request.headers.set(name::CONTENT_LENGTH, len.to_string());
        self.request
    }
}

/// Builder for [`Response`].
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Create a builder; fails on a status code outside 100..=699.
    pub fn new(status: u16, reason: &str) -> Result<Self> {
        Ok(ResponseBuilder {
            response: Response::new(status, reason)?,
        })
    }

    pub fn via_raw(mut self, value: &str) -> Self {
        self.response.headers.push(name::VIA, value);
        self
    }

    pub fn from_raw(mut self, value: &str) -> Self {
        self.response.headers.push(name::FROM, value);
        self
    }

    pub fn to_raw(mut self, value: &str) -> Self {
        self.response.headers.push(name::TO, value);
        self
    }

    pub fn call_id(mut self, call_id: &str) -> Self {
        self.response.headers.push(name::CALL_ID, call_id);
        self
    }

    pub fn cseq(mut self, seq: u32, method: Method) -> Self {
        self.response
            .headers
            .push(name::CSEQ, format!("{} {}", seq, method));
        self
    }

    pub fn contact(mut self, uri: &str) -> Self {
        self.response.headers.push(name::CONTACT, format!("<{}>", uri));
        self
    }

    pub fn header(mut self, hname: &str, value: &str) -> Self {
        self.response.headers.push(hname, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.body = body.into();
        self
    }

    /// Finish the response, setting Content-Length to the body size.
    pub fn build(mut self) -> Response {
        let len = self.response.body.len();
        self.response.headers.set(name::CONTENT_LENGTH, len.to_string());
        self.response
    }
}

fn address_value(display: &str, uri: &str, tag: Option<&str>) -> String {
    let mut value = if display.is_empty() {
        format!("<{}>", uri)
    } else {
        format!("\"{}\" <{}>", display, uri)
    };
    if let Some(tag) = tag {
        value.push_str(";tag=");
        value.push_str(tag);
    }
    value
}

fn split_sent_by(sent_by: &str) -> (&str, Option<u16>) {
    // Keep IPv6 references intact
    if sent_by.starts_with('[') {
        if let Some(close) = sent_by.find(']') {
            let host = &sent_by[..=close];
            let port = sent_by[close + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok());
            return (host, port);
        }
    }
    match sent_by.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (sent_by, None),
        },
        None => (sent_by, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_message;

    #[test]
    fn built_request_is_valid_and_parses() {
        let request = RequestBuilder::new(Method::Invite, "sip:bob@example.com")
            .via("pc33.atlanta.com:5060", "UDP", "z9hG4bK776asdhds")
            .from("Alice", "sip:alice@example.com", Some("1928301774"))
            .to("Bob", "sip:bob@example.com", None)
            .call_id("a84b4c76e66710@pc33.atlanta.com")
            .cseq(314159)
            .max_forwards(70)
            .contact("sip:alice@pc33.atlanta.com")
            .build();

        assert!(request.is_valid());
        assert_eq!(request.top_via().unwrap().branch(), Some("z9hG4bK776asdhds"));
        assert_eq!(request.from_tag().as_deref(), Some("1928301774"));

        let reparsed = parse_message(&request.to_bytes()).unwrap();
        assert!(reparsed.is_valid());
    }

    #[test]
    fn built_response_carries_content_length() {
        let response = ResponseBuilder::new(200, "OK")
            .unwrap()
            .via_raw("SIP/2.0/UDP h;branch=z9hG4bK1")
            .from_raw("<sip:a@b>;tag=1")
            .to_raw("<sip:c@d>;tag=2")
            .call_id("c1")
            .cseq(1, Method::Invite)
            .body("v=0\r\n")
            .build();

        assert_eq!(response.headers.get("Content-Length"), Some("5"));
        assert!(response.is_valid());
    }

    #[test]
    fn sent_by_splitting() {
        assert_eq!(split_sent_by("host.example.com:5060"), ("host.example.com", Some(5060)));
        assert_eq!(split_sent_by("host.example.com"), ("host.example.com", None));
        assert_eq!(split_sent_by("[2001:db8::1]:5060"), ("[2001:db8::1]", Some(5060)));
    }
}
