//! # rtext-sip-core
//!
//! Core SIP protocol support for the rtext real-time text stack.
//!
//! This crate provides the message model and wire codec the transaction
//! layer is built on:
//!
//! - **Message types**: [`Request`], [`Response`], [`SipMessage`]
//! - **Headers**: insertion-order-preserving multimap with compact-form
//!   expansion, plus typed [`Via`] and [`CSeq`] views
//! - **Codec**: [`parse_message`] and `to_bytes` round-tripping the
//!   RFC 3261 wire format
//! - **Builders**: [`RequestBuilder`] / [`ResponseBuilder`] for
//!   constructing well-formed messages
//! - **SDP accessors**: the consumed [`sdp`] interface the media layer
//!   reads rtpmap/fmtp data through (SDP parsing itself is external)
//!
//! ```
//! use rtext_sip_core::{parse_message, Method, RequestBuilder, SipMessage};
//!
//! let request = RequestBuilder::new(Method::Options, "sip:srv.example.com")
//!     .via("client.example.com:5060", "UDP", "z9hG4bK-probe-1")
//!     .from("", "sip:alice@example.com", Some("1928301774"))
//!     .to("", "sip:srv.example.com", None)
//!     .call_id("a84b4c76e66710")
//!     .cseq(1)
//!     .max_forwards(70)
//!     .build();
//!
//! let parsed = parse_message(&request.to_bytes()).unwrap();
//! assert!(matches!(parsed, SipMessage::Request(_)));
//! ```

pub mod builder;
pub mod cseq;
pub mod error;
pub mod headers;
pub mod message;
pub mod method;
pub mod parser;
pub mod sdp;
pub mod via;

pub use builder::{RequestBuilder, ResponseBuilder};
pub use cseq::CSeq;
pub use error::{Error, Result};
pub use headers::{HeaderName, Headers};
pub use message::{Request, Response, SipMessage};
pub use method::Method;
pub use parser::parse_message;
pub use via::{Via, MAGIC_COOKIE};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::builder::{RequestBuilder, ResponseBuilder};
    pub use crate::cseq::CSeq;
    pub use crate::error::{Error, Result};
    pub use crate::headers::{name, HeaderName, Headers};
    pub use crate::message::{Request, Response, SipMessage};
    pub use crate::method::Method;
    pub use crate::parser::parse_message;
    pub use crate::sdp::{MediaDescription, RtpMap, SessionDescription};
    pub use crate::via::{Via, MAGIC_COOKIE};
}
