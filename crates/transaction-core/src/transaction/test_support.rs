//! Shared fixtures for the state-machine unit tests.

use std::net::SocketAddr;

use rtext_sip_core::{Method, Request, RequestBuilder, Response};

use crate::utils::response_for;

pub fn addr(port: u16) -> SocketAddr {
    format!("192.0.2.1:{}", port).parse().unwrap()
}

pub fn options_request(branch: &str) -> Request {
    RequestBuilder::new(Method::Options, "sip:srv.example.com")
        .via("client.example.com:5060", "UDP", branch)
        .from("", "sip:alice@example.com", Some("fromtag"))
        .to("", "sip:srv.example.com", None)
        .call_id("test-call-1")
        .cseq(1)
        .max_forwards(70)
        .build()
}

pub fn invite_request(branch: &str) -> Request {
    RequestBuilder::new(Method::Invite, "sip:bob@example.com")
        .via("client.example.com:5060", "UDP", branch)
        .from("Alice", "sip:alice@example.com", Some("fromtag"))
        .to("Bob", "sip:bob@example.com", None)
        .call_id("test-call-2")
        .cseq(1)
        .max_forwards(70)
        .contact("sip:alice@client.example.com")
        .build()
}

/// A response to `request` with the To tag filled on final responses.
pub fn response_to(request: &Request, status: u16, reason: &str) -> Response {
    response_for(request, status, reason, Some("totag")).unwrap()
}
