//! The CSeq header value: sequence number plus method.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::method::Method;

/// A parsed CSeq header value (RFC 3261 section 20.16).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        CSeq { seq, method }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split_ascii_whitespace();
        let seq = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| Error::InvalidHeader(format!("CSeq: {}", s)))?;
        let method = parts
            .next()
            .ok_or_else(|| Error::InvalidHeader(format!("CSeq: {}", s)))?
            .parse::<Method>()?;
        if parts.next().is_some() {
            return Err(Error::InvalidHeader(format!("CSeq: {}", s)));
        }
        Ok(CSeq { seq, method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cseq: CSeq = "314159 INVITE".parse().unwrap();
        assert_eq!(cseq.seq, 314159);
        assert_eq!(cseq.method, Method::Invite);
        assert_eq!(cseq.to_string(), "314159 INVITE");
    }

    #[test]
    fn reject_malformed() {
        assert!("INVITE".parse::<CSeq>().is_err());
        assert!("1".parse::<CSeq>().is_err());
        assert!("1 INVITE extra".parse::<CSeq>().is_err());
    }
}
