//! The SIP Via header value (RFC 3261 section 20.42).
//!
//! The topmost Via of a request carries the branch parameter that keys
//! transaction matching, and its sent-by value participates in the
//! server-side transaction key.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::char,
    sequence::tuple,
    IResult,
};

use crate::error::{Error, Result};

/// Magic cookie every RFC 3261 branch parameter starts with.
pub const MAGIC_COOKIE: &str = "z9hG4bK";

/// A single parsed Via header field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    /// Transport token from the sent-protocol (e.g. "UDP", "TCP", "TLS")
    pub transport: String,
    /// Host part of sent-by
    pub host: String,
    /// Optional port part of sent-by
    pub port: Option<u16>,
    /// Parameters in order of appearance, value-less params carry `None`
    pub params: Vec<(String, Option<String>)>,
}

impl Via {
    /// Create a Via value with a single branch parameter.
    pub fn new(transport: &str, host: &str, port: Option<u16>, branch: &str) -> Self {
        Via {
            transport: transport.to_string(),
            host: host.to_string(),
            port,
            params: vec![("branch".to_string(), Some(branch.to_string()))],
        }
    }

    /// The branch parameter, if present.
    pub fn branch(&self) -> Option<&str> {
        self.param("branch")
    }

    /// Whether the branch parameter carries the RFC 3261 magic cookie.
    pub fn has_rfc3261_branch(&self) -> bool {
        self.branch().map(|b| b.starts_with(MAGIC_COOKIE)).unwrap_or(false)
    }

    /// The sent-by value as written on the wire (`host` or `host:port`).
    pub fn sent_by(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Look up a parameter by name (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            match value {
                Some(v) => write!(f, ";{}={}", name, v)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

fn is_param_char(c: char) -> bool {
    crate::method::is_token_char(c) || c == '[' || c == ']' || c == ':'
}

// sent-protocol: "SIP" SLASH "2.0" SLASH transport
fn sent_protocol(input: &str) -> IResult<&str, &str> {
    let (input, (_, transport)) = tuple((
        tag("SIP/2.0/"),
        take_while1(|c: char| c.is_ascii_alphanumeric()),
    ))(input)?;
    Ok((input, transport))
}

// host [":" port] — IPv6 references are carried verbatim inside brackets
fn sent_by(input: &str) -> IResult<&str, (String, Option<u16>)> {
    if let Some(rest) = input.strip_prefix('[') {
        // IPv6 reference
        let end = rest.find(']').unwrap_or(rest.len());
        let host = format!("[{}]", &rest[..end]);
        let mut remaining = &rest[end.min(rest.len())..];
        remaining = remaining.strip_prefix(']').unwrap_or(remaining);
        let (remaining, port) = opt_port(remaining)?;
        return Ok((remaining, (host, port)));
    }
    let (input, host) = take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '-')(input)?;
    let (input, port) = opt_port(input)?;
    Ok((input, (host.to_string(), port)))
}

fn opt_port(input: &str) -> IResult<&str, Option<u16>> {
    if let Some(rest) = input.strip_prefix(':') {
        let (rest, digits) = take_while1(|c: char| c.is_ascii_digit())(rest)?;
        let port = digits.parse::<u16>().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        Ok((rest, Some(port)))
    } else {
        Ok((input, None))
    }
}

// ";" name ["=" value]
fn via_param(input: &str) -> IResult<&str, (String, Option<String>)> {
    let (input, _) = char(';')(input)?;
    let (input, name) = take_while1(is_param_char)(input)?;
    if let Some(rest) = input.strip_prefix('=') {
        let (rest, value) = take_while1(is_param_char)(rest)?;
        Ok((rest, (name.to_string(), Some(value.to_string()))))
    } else {
        Ok((input, (name.to_string(), None)))
    }
}

impl FromStr for Via {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (rest, transport) =
            sent_protocol(s).map_err(|_| Error::InvalidHeader(format!("Via: {}", s)))?;
        let rest = rest.trim_start();
        let (mut rest, (host, port)) =
            sent_by(rest).map_err(|_| Error::InvalidHeader(format!("Via: {}", s)))?;

        let mut params = Vec::new();
        while let Ok((r, param)) = via_param(rest.trim_start()) {
            params.push(param);
            rest = r;
        }

        Ok(Via {
            transport: transport.to_string(),
            host,
            port,
            params,
        })
    }
}
