//! Helpers for building the requests and responses the transaction
//! layer itself needs: CANCEL, ACK for non-2xx final responses, and
//! responses derived from a request.

use rand::Rng;

use rtext_sip_core::headers::name;
use rtext_sip_core::{Method, Request, Response};

use crate::error::{Error, Result};

/// Generate an RFC 3261 branch parameter: magic cookie plus random hex.
pub fn generate_branch() -> String {
    let mut rng = rand::thread_rng();
    let suffix: u64 = rng.gen();
    format!("{}{:016x}", rtext_sip_core::MAGIC_COOKIE, suffix)
}

/// Build a CANCEL for a pending INVITE (RFC 3261 section 9.1).
///
/// The CANCEL shares the INVITE's request-URI, topmost Via (same branch),
/// From, To, Call-ID and CSeq number; only the method differs.
pub fn cancel_for_invite(invite: &Request) -> Result<Request> {
    if invite.method != Method::Invite {
        return Err(Error::InvalidMethod(invite.method.clone()));
    }
    let cseq = invite
        .cseq()
        .ok_or_else(|| Error::InvalidRequest("missing CSeq".to_string()))?;

    let mut cancel = Request::new(Method::Cancel, invite.uri.clone());
    copy_first_header(invite, &mut cancel, name::VIA)?;
    copy_first_header(invite, &mut cancel, name::FROM)?;
    copy_first_header(invite, &mut cancel, name::TO)?;
    copy_first_header(invite, &mut cancel, name::CALL_ID)?;
    cancel
        .headers
        .push(name::CSEQ, format!("{} {}", cseq.seq, Method::Cancel));
    cancel.headers.push(name::MAX_FORWARDS, "70");
    cancel.headers.push(name::CONTENT_LENGTH, "0");
    Ok(cancel)
}

/// Build the ACK for a non-2xx final response (RFC 3261 section 17.1.1.3).
///
/// The ACK reuses the INVITE's topmost Via (same branch) and From, but
/// takes the To from the response so the remote tag is echoed.
pub fn ack_for_non_2xx(invite: &Request, response: &Response) -> Result<Request> {
    if invite.method != Method::Invite {
        return Err(Error::InvalidMethod(invite.method.clone()));
    }
    let cseq = invite
        .cseq()
        .ok_or_else(|| Error::InvalidRequest("missing CSeq".to_string()))?;

    let mut ack = Request::new(Method::Ack, invite.uri.clone());
    copy_first_header(invite, &mut ack, name::VIA)?;
    copy_first_header(invite, &mut ack, name::FROM)?;
    let to = response
        .to()
        .or_else(|| invite.to())
        .ok_or_else(|| Error::InvalidRequest("missing To".to_string()))?;
    ack.headers.push(name::TO, to.to_string());
    copy_first_header(invite, &mut ack, name::CALL_ID)?;
    ack.headers
        .push(name::CSEQ, format!("{} {}", cseq.seq, Method::Ack));
    ack.headers.push(name::MAX_FORWARDS, "70");
    ack.headers.push(name::CONTENT_LENGTH, "0");
    Ok(ack)
}

/// Build a response to a request, copying the headers RFC 3261 section
/// 8.2.6.2 requires (all Via values, From, To, Call-ID, CSeq). A To tag
/// is added to final responses that do not already carry one.
pub fn response_for(
    request: &Request,
    status: u16,
    reason: &str,
    to_tag: Option<&str>,
) -> Result<Response> {
    let mut response = Response::new(status, reason)?;
    for via in request.headers.get_all(name::VIA) {
        response.headers.push(name::VIA, via.to_string());
    }
    copy_first_header_resp(request, &mut response, name::FROM)?;

    let mut to = request
        .to()
        .ok_or_else(|| Error::InvalidRequest("missing To".to_string()))?
        .to_string();
    if status >= 200 && request.to_tag().is_none() {
        let tag = to_tag.map(|t| t.to_string()).unwrap_or_else(random_tag);
        to.push_str(";tag=");
        to.push_str(&tag);
    }
    response.headers.push(name::TO, to);

    copy_first_header_resp(request, &mut response, name::CALL_ID)?;
    copy_first_header_resp(request, &mut response, name::CSEQ)?;
    response.headers.push(name::CONTENT_LENGTH, "0");
    Ok(response)
}

fn random_tag() -> String {
    let mut rng = rand::thread_rng();
    let value: u32 = rng.gen();
    format!("{:08x}", value)
}

fn copy_first_header(src: &Request, dst: &mut Request, hname: &str) -> Result<()> {
    let value = src
        .headers
        .get(hname)
        .ok_or_else(|| Error::InvalidRequest(format!("missing {}", hname)))?;
    dst.headers.push(hname, value.to_string());
    Ok(())
}

fn copy_first_header_resp(src: &Request, dst: &mut Response, hname: &str) -> Result<()> {
    let value = src
        .headers
        .get(hname)
        .ok_or_else(|| Error::InvalidRequest(format!("missing {}", hname)))?;
    dst.headers.push(hname, value.to_string());
    Ok(())
}
