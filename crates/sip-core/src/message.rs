//! SIP request, response and message types with wire serialization.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::cseq::CSeq;
use crate::error::{Error, Result};
use crate::headers::{name, Headers};
use crate::method::Method;
use crate::via::Via;

/// A SIP request: method, request-URI, headers and optional body.
///
/// The request-URI is carried opaquely; the transaction layer never
/// interprets URI semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// A SIP response: status code, reason phrase, headers and optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// Either a request or a response.
#[derive(Debug, Clone, PartialEq)]
pub enum SipMessage {
    Request(Request),
    Response(Response),
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Request {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Serialize to the RFC 3261 wire format.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.uri.as_bytes());
        buf.put_slice(b" SIP/2.0\r\n");
        write_headers_and_body(&mut buf, &self.headers, &self.body);
        buf.freeze()
    }

    /// Structural validation per RFC 3261 section 8.1.1: mandatory headers
    /// present, CSeq method agrees with the request method, Via non-empty.
    pub fn is_valid(&self) -> bool {
        if self.headers.get_all(name::VIA).is_empty() {
            return false;
        }
        if !self.headers.contains(name::FROM)
            || !self.headers.contains(name::TO)
            || !self.headers.contains(name::CALL_ID)
            || !self.headers.contains(name::MAX_FORWARDS)
        {
            return false;
        }
        match self.cseq() {
            Some(cseq) => cseq.method == self.method,
            None => false,
        }
    }

    /// The topmost Via, parsed.
    pub fn top_via(&self) -> Option<Via> {
        top_via(&self.headers)
    }

    /// All Via values in order, parsed; unparseable entries are dropped.
    pub fn via_list(&self) -> Vec<Via> {
        via_list(&self.headers)
    }

    pub fn cseq(&self) -> Option<CSeq> {
        cseq(&self.headers)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get(name::CALL_ID)
    }

    pub fn from(&self) -> Option<&str> {
        self.headers.get(name::FROM)
    }

    pub fn to(&self) -> Option<&str> {
        self.headers.get(name::TO)
    }

    pub fn from_tag(&self) -> Option<String> {
        self.from().and_then(address_tag)
    }

    pub fn to_tag(&self) -> Option<String> {
        self.to().and_then(address_tag)
    }
}

impl Response {
    pub fn new(status: u16, reason: impl Into<String>) -> Result<Self> {
        if !(100..=699).contains(&status) {
            return Err(Error::InvalidStatusCode(status));
        }
        Ok(Response {
            status,
            reason: reason.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        })
    }

    /// Serialize to the RFC 3261 wire format.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.put_slice(b"SIP/2.0 ");
        buf.put_slice(self.status.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.reason.as_bytes());
        buf.put_slice(b"\r\n");
        write_headers_and_body(&mut buf, &self.headers, &self.body);
        buf.freeze()
    }

    /// Structural validation: mandatory headers present, Via non-empty.
    pub fn is_valid(&self) -> bool {
        if self.headers.get_all(name::VIA).is_empty() {
            return false;
        }
        if !self.headers.contains(name::FROM)
            || !self.headers.contains(name::TO)
            || !self.headers.contains(name::CALL_ID)
        {
            return false;
        }
        self.cseq().is_some()
    }

    /// Provisional response (1xx).
    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.status)
    }

    /// Final response (2xx-6xx).
    pub fn is_final(&self) -> bool {
        self.status >= 200
    }

    /// Success response (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn top_via(&self) -> Option<Via> {
        top_via(&self.headers)
    }

    pub fn via_list(&self) -> Vec<Via> {
        via_list(&self.headers)
    }

    pub fn cseq(&self) -> Option<CSeq> {
        cseq(&self.headers)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get(name::CALL_ID)
    }

    pub fn to(&self) -> Option<&str> {
        self.headers.get(name::TO)
    }

    pub fn to_tag(&self) -> Option<String> {
        self.to().and_then(address_tag)
    }
}

impl SipMessage {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            SipMessage::Request(req) => req.to_bytes(),
            SipMessage::Response(resp) => resp.to_bytes(),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            SipMessage::Request(req) => req.is_valid(),
            SipMessage::Response(resp) => resp.is_valid(),
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            SipMessage::Request(req) => &req.headers,
            SipMessage::Response(resp) => &resp.headers,
        }
    }

    pub fn top_via(&self) -> Option<Via> {
        top_via(self.headers())
    }

    pub fn cseq(&self) -> Option<CSeq> {
        cseq(self.headers())
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SipMessage::Request(req) => write!(f, "{} {}", req.method, req.uri),
            SipMessage::Response(resp) => write!(f, "{} {}", resp.status, resp.reason),
        }
    }
}

impl From<Request> for SipMessage {
    fn from(req: Request) -> Self {
        SipMessage::Request(req)
    }
}

impl From<Response> for SipMessage {
    fn from(resp: Response) -> Self {
        SipMessage::Response(resp)
    }
}

fn write_headers_and_body(buf: &mut BytesMut, headers: &Headers, body: &Bytes) {
    for (hname, value) in headers.iter() {
        buf.put_slice(hname.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"\r\n");
    buf.put_slice(body);
}

fn top_via(headers: &Headers) -> Option<Via> {
    // A Via header field may carry several comma-separated values
    let raw = headers.get(name::VIA)?;
    let first = split_header_values(raw).into_iter().next()?;
    first.parse().ok()
}

fn via_list(headers: &Headers) -> Vec<Via> {
    headers
        .get_all(name::VIA)
        .iter()
        .flat_map(|raw| split_header_values(raw))
        .filter_map(|v| v.parse().ok())
        .collect()
}

fn cseq(headers: &Headers) -> Option<CSeq> {
    headers.get(name::CSEQ)?.parse().ok()
}

/// Extract the `tag` parameter from a From/To header value.
fn address_tag(value: &str) -> Option<String> {
    // Parameters follow the addr-spec; skip anything inside <> first
    let after_addr = match value.rfind('>') {
        Some(idx) => &value[idx + 1..],
        None => value,
    };
    for param in after_addr.split(';') {
        let mut kv = param.splitn(2, '=');
        let key = kv.next().unwrap_or("").trim();
        if key.eq_ignore_ascii_case("tag") {
            return kv.next().map(|v| v.trim().to_string());
        }
    }
    None
}

/// Split a comma-separated header value, honoring quoted strings.
pub(crate) fn split_header_values(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;
    for c in raw.chars() {
        if escape {
            current.push(c);
            escape = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escape = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            ',' if !in_quotes => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    values.push(trimmed.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        values.push(trimmed.to_string());
    }
    values
}
