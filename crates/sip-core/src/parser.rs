//! SIP message wire-format parsing (RFC 3261 section 7).

use bytes::Bytes;

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::char,
    IResult,
};

use crate::error::{Error, Result};
use crate::headers::{name, HeaderName, Headers};
use crate::message::{Request, Response, SipMessage};
use crate::method::{is_token_char, Method};

/// Parse a SIP message from raw bytes.
///
/// Splits head from body at the first CRLF CRLF outside any quoted
/// string, parses the start-line by its first token, folds continuation
/// lines, expands compact header names and extracts the body according
/// to Content-Length.
pub fn parse_message(input: &[u8]) -> Result<SipMessage> {
    let head_end = find_head_end(input)
        .ok_or_else(|| Error::Malformed("missing CRLF CRLF terminator".to_string()))?;
    let head = std::str::from_utf8(&input[..head_end])
        .map_err(|_| Error::Malformed("header section is not valid UTF-8".to_string()))?;
    let body_bytes = &input[head_end + 4..];

    let mut lines = fold_lines(head)?;
    if lines.is_empty() {
        return Err(Error::Malformed("empty message".to_string()));
    }
    let start_line = lines.remove(0);

    let mut headers = Headers::new();
    for line in &lines {
        let (hname, value) = split_header_line(line)?;
        headers.push(HeaderName::new(hname), value.to_string());
    }

    let body = extract_body(&headers, body_bytes)?;

    if let Some(rest) = start_line.strip_prefix("SIP/") {
        // Response start-line: SIP-Version SP Status-Code SP Reason-Phrase
        let (status, reason) = parse_status_line(rest, &start_line)?;
        let mut response = Response::new(status, reason)?;
        response.headers = headers;
        response.body = body;
        Ok(SipMessage::Response(response))
    } else {
        // Request start-line: Method SP Request-URI SP SIP-Version
        let (method, uri) = parse_request_line(&start_line)?;
        let mut request = Request::new(method, uri);
        request.headers = headers;
        request.body = body;
        Ok(SipMessage::Request(request))
    }
}

/// Find the offset of the first CRLF CRLF that is not inside a quoted string.
fn find_head_end(input: &[u8]) -> Option<usize> {
    let mut in_quotes = false;
    let mut escape = false;
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if escape {
            escape = false;
            i += 1;
            continue;
        }
        match b {
            b'\\' if in_quotes => escape = true,
            b'"' => in_quotes = !in_quotes,
            b'\r' if !in_quotes => {
                if input[i..].starts_with(b"\r\n\r\n") {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split the head into logical lines, folding continuation lines
/// (lines starting with SP or HTAB) into their predecessor.
fn fold_lines(head: &str) -> Result<Vec<String>> {
    let mut lines: Vec<String> = Vec::new();
    for raw in head.split("\r\n") {
        if raw.is_empty() {
            // Only reachable when a quoted string spans lines; the real
            // terminator was found by the quote-aware head split.
            continue;
        }
        if raw.starts_with(' ') || raw.starts_with('\t') {
            match lines.last_mut() {
                Some(prev) => {
                    prev.push(' ');
                    prev.push_str(raw.trim_start());
                }
                None => {
                    return Err(Error::Malformed(
                        "continuation line before any header".to_string(),
                    ))
                }
            }
        } else {
            lines.push(raw.to_string());
        }
    }
    Ok(lines)
}

fn split_header_line(line: &str) -> Result<(&str, &str)> {
    let colon = line
        .find(':')
        .ok_or_else(|| Error::Malformed(format!("header line without colon: {}", line)))?;
    let hname = line[..colon].trim_end();
    if hname.is_empty() || !hname.chars().all(is_token_char) {
        return Err(Error::Malformed(format!("bad header name: {}", line)));
    }
    let value = line[colon + 1..].trim();
    Ok((hname, value))
}

fn extract_body(headers: &Headers, body_bytes: &[u8]) -> Result<Bytes> {
    match headers.get(name::CONTENT_LENGTH) {
        Some(raw) => {
            let expected = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::InvalidHeader(format!("Content-Length: {}", raw)))?;
            if body_bytes.len() < expected {
                return Err(Error::TruncatedBody {
                    expected,
                    actual: body_bytes.len(),
                });
            }
            Ok(Bytes::copy_from_slice(&body_bytes[..expected]))
        }
        // No Content-Length: take whatever follows the blank line
        None => Ok(Bytes::copy_from_slice(body_bytes)),
    }
}

// Method SP Request-URI SP "SIP/2.0"
fn request_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, method) = take_while1(is_token_char)(input)?;
    let (input, _) = char(' ')(input)?;
    let (input, uri) = take_while1(|c: char| c != ' ')(input)?;
    let (input, _) = char(' ')(input)?;
    let (input, _) = tag("SIP/2.0")(input)?;
    Ok((input, (method, uri)))
}

fn parse_request_line(line: &str) -> Result<(Method, String)> {
    // Distinguish version errors from structural ones for better diagnostics
    if let Some(idx) = line.rfind(' ') {
        let version = &line[idx + 1..];
        if version.starts_with("SIP/") && version != "SIP/2.0" {
            return Err(Error::UnknownVersion(version.to_string()));
        }
    }
    let (rest, (method, uri)) =
        request_line(line).map_err(|_| Error::Malformed(format!("bad request line: {}", line)))?;
    if !rest.is_empty() {
        return Err(Error::Malformed(format!("bad request line: {}", line)));
    }
    Ok((method.parse()?, uri.to_string()))
}

fn parse_status_line(after_sip_slash: &str, full_line: &str) -> Result<(u16, String)> {
    let mut parts = after_sip_slash.splitn(2, ' ');
    let version = parts.next().unwrap_or("");
    if version != "2.0" {
        return Err(Error::UnknownVersion(format!("SIP/{}", version)));
    }
    let rest = parts
        .next()
        .ok_or_else(|| Error::Malformed(format!("bad status line: {}", full_line)))?;
    let (code_str, reason) = match rest.split_once(' ') {
        Some((code, reason)) => (code, reason),
        // Empty reason phrase is legal
        None => (rest, ""),
    };
    let status = code_str
        .parse::<u16>()
        .map_err(|_| Error::Malformed(format!("bad status code: {}", full_line)))?;
    if !(100..=699).contains(&status) {
        return Err(Error::InvalidStatusCode(status));
    }
    Ok((status, reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONS_MSG: &[u8] = b"OPTIONS sip:srv.example.com SIP/2.0\r\n\
Via: SIP/2.0/UDP client.example.com:5060;branch=z9hG4bK-42\r\n\
From: <sip:alice@example.com>;tag=1928301774\r\n\
To: <sip:srv.example.com>\r\n\
Call-ID: a84b4c76e66710\r\n\
CSeq: 63104 OPTIONS\r\n\
Max-Forwards: 70\r\n\
Content-Length: 0\r\n\
\r\n";

    #[test]
    fn parse_request() {
        let msg = parse_message(OPTIONS_MSG).unwrap();
        let SipMessage::Request(req) = msg else {
            panic!("expected request");
        };
        assert_eq!(req.method, Method::Options);
        assert_eq!(req.uri, "sip:srv.example.com");
        assert_eq!(req.top_via().unwrap().branch(), Some("z9hG4bK-42"));
        assert!(req.is_valid());
        assert!(req.body.is_empty());
    }

    #[test]
    fn parse_response_with_body() {
        let raw = b"SIP/2.0 200 OK\r\n\
Via: SIP/2.0/UDP client.example.com;branch=z9hG4bK-42\r\n\
From: <sip:alice@example.com>;tag=19\r\n\
To: <sip:bob@example.com>;tag=314\r\n\
Call-ID: c1\r\n\
CSeq: 1 INVITE\r\n\
Content-Length: 4\r\n\
\r\nbody";
        let SipMessage::Response(resp) = parse_message(raw).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "OK");
        assert_eq!(&resp.body[..], b"body");
        assert_eq!(resp.to_tag().as_deref(), Some("314"));
    }

    #[test]
    fn content_length_truncates_trailing_bytes() {
        let raw = b"SIP/2.0 200 OK\r\nVia: SIP/2.0/UDP h;branch=z9hG4bK1\r\nFrom: <sip:a@b>;tag=1\r\nTo: <sip:c@d>\r\nCall-ID: x\r\nCSeq: 1 OPTIONS\r\nContent-Length: 2\r\n\r\nabXX";
        let SipMessage::Response(resp) = parse_message(raw).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(&resp.body[..], b"ab");
    }

    #[test]
    fn truncated_body_is_rejected() {
        let raw = b"SIP/2.0 200 OK\r\nVia: SIP/2.0/UDP h;branch=z9hG4bK1\r\nCSeq: 1 OPTIONS\r\nContent-Length: 10\r\n\r\nshort";
        match parse_message(raw) {
            Err(Error::TruncatedBody { expected: 10, actual: 5 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unknown_version_is_rejected() {
        let raw = b"SIP/3.0 200 OK\r\nCSeq: 1 OPTIONS\r\n\r\n";
        assert!(matches!(parse_message(raw), Err(Error::UnknownVersion(_))));

        let raw = b"OPTIONS sip:x SIP/1.0\r\nCSeq: 1 OPTIONS\r\n\r\n";
        assert!(matches!(parse_message(raw), Err(Error::UnknownVersion(_))));
    }

    #[test]
    fn compact_header_names_expand() {
        let raw = b"OPTIONS sip:x SIP/2.0\r\n\
v: SIP/2.0/UDP h;branch=z9hG4bK9\r\n\
f: <sip:a@b>;tag=1\r\n\
t: <sip:c@d>\r\n\
i: compact-call-id\r\n\
CSeq: 9 OPTIONS\r\n\
Max-Forwards: 70\r\n\
l: 0\r\n\
\r\n";
        let SipMessage::Request(req) = parse_message(raw).unwrap() else {
            panic!("expected request");
        };
        assert_eq!(req.call_id(), Some("compact-call-id"));
        assert!(req.is_valid());
        assert_eq!(req.headers.get("Content-Length"), Some("0"));
    }

    #[test]
    fn continuation_lines_fold() {
        let raw = b"OPTIONS sip:x SIP/2.0\r\n\
Via: SIP/2.0/UDP h;branch=z9hG4bK9\r\n\
Subject: I know you're there,\r\n pick up the phone\r\n\tand talk to me!\r\n\
CSeq: 1 OPTIONS\r\n\
\r\n";
        let SipMessage::Request(req) = parse_message(raw).unwrap() else {
            panic!("expected request");
        };
        assert_eq!(
            req.headers.get("Subject"),
            Some("I know you're there, pick up the phone and talk to me!")
        );
    }

    #[test]
    fn crlf_crlf_inside_quoted_string_is_not_a_boundary() {
        // The quoted display name contains a literal CRLF CRLF sequence;
        // the body split must happen at the real terminator after the headers.
        let raw = b"OPTIONS sip:x SIP/2.0\r\n\
From: \"quoted \r\n\r\n name\" <sip:a@b>;tag=1\r\n\
CSeq: 1 OPTIONS\r\n\
\r\n";
        // The embedded CRLF CRLF is skipped while in quotes, so the head ends
        // after the CSeq header and parsing still sees all three headers.
        let msg = parse_message(raw).unwrap();
        assert!(msg.headers().contains("CSeq"));
    }

    #[test]
    fn serialize_parse_round_trip() {
        let msg = parse_message(OPTIONS_MSG).unwrap();
        let reparsed = parse_message(&msg.to_bytes()).unwrap();
        assert_eq!(msg, reparsed);
    }

    #[test]
    fn missing_terminator_is_malformed() {
        let raw = b"OPTIONS sip:x SIP/2.0\r\nCSeq: 1 OPTIONS\r\n";
        assert!(matches!(parse_message(raw), Err(Error::Malformed(_))));
    }
}
