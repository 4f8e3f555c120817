//! SIP request methods as defined in RFC 3261 and common extension RFCs.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A SIP request method.
///
/// The transaction layer only distinguishes INVITE, ACK and CANCEL from
/// everything else, but the full set of registered methods is carried so
/// that CSeq values round-trip without loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Register,
    Message,
    Info,
    Update,
    Prack,
    Subscribe,
    Notify,
    Refer,
    /// Any other token-valid method name
    Extension(String),
}

impl Method {
    /// Whether this method creates an INVITE transaction.
    pub fn is_invite(&self) -> bool {
        matches!(self, Method::Invite)
    }

    /// Whether this method is ACK (never creates its own client transaction).
    pub fn is_ack(&self) -> bool {
        matches!(self, Method::Ack)
    }

    /// The canonical on-the-wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Register => "REGISTER",
            Method::Message => "MESSAGE",
            Method::Info => "INFO",
            Method::Update => "UPDATE",
            Method::Prack => "PRACK",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Refer => "REFER",
            Method::Extension(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Method names are case-sensitive tokens (RFC 3261 section 7.1)
        match s {
            "INVITE" => Ok(Method::Invite),
            "ACK" => Ok(Method::Ack),
            "BYE" => Ok(Method::Bye),
            "CANCEL" => Ok(Method::Cancel),
            "OPTIONS" => Ok(Method::Options),
            "REGISTER" => Ok(Method::Register),
            "MESSAGE" => Ok(Method::Message),
            "INFO" => Ok(Method::Info),
            "UPDATE" => Ok(Method::Update),
            "PRACK" => Ok(Method::Prack),
            "SUBSCRIBE" => Ok(Method::Subscribe),
            "NOTIFY" => Ok(Method::Notify),
            "REFER" => Ok(Method::Refer),
            other => {
                if !other.is_empty() && other.chars().all(is_token_char) {
                    Ok(Method::Extension(other.to_string()))
                } else {
                    Err(Error::InvalidMethod(other.to_string()))
                }
            }
        }
    }
}

/// RFC 3261 token character set.
pub(crate) fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.!%*_+`'~".contains(c)
}
