//! The four RFC 3261 transaction state machines.
//!
//! Each machine is a plain struct whose handlers are synchronous and
//! return a list of [`Action`]s for the dispatcher loop to execute
//! (send a message, arm or cancel a timer, notify the TU, terminate).
//! This keeps the state machines free of I/O and directly unit-testable;
//! all sending, timing and index bookkeeping happens in one place.

mod client_invite;
mod client_non_invite;
mod server_invite;
mod server_non_invite;

#[cfg(test)]
pub(crate) mod test_support;

pub use client_invite::ClientInviteTransaction;
pub use client_non_invite::ClientNonInviteTransaction;
pub use server_invite::ServerInviteTransaction;
pub use server_non_invite::ServerNonInviteTransaction;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use rtext_sip_core::{Request, Response, SipMessage};

use crate::error::Result;
use crate::key::TransactionKey;
use crate::timer::{TimerSettings, TimerType};

/// Transaction states named after RFC 3261 section 17.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// INVITE client initial state
    Calling,
    /// Non-INVITE initial state (client and server)
    Trying,
    Proceeding,
    Completed,
    /// INVITE server only: ACK received, absorbing retransmissions
    Confirmed,
    Terminated,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Calling => "Calling",
            TransactionState::Trying => "Trying",
            TransactionState::Proceeding => "Proceeding",
            TransactionState::Completed => "Completed",
            TransactionState::Confirmed => "Confirmed",
            TransactionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// The four transaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    ClientInvite,
    ClientNonInvite,
    ServerInvite,
    ServerNonInvite,
}

impl TransactionKind {
    pub fn is_client(&self) -> bool {
        matches!(self, TransactionKind::ClientInvite | TransactionKind::ClientNonInvite)
    }

    pub fn is_server(&self) -> bool {
        !self.is_client()
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::ClientInvite => "client INVITE",
            TransactionKind::ClientNonInvite => "client non-INVITE",
            TransactionKind::ServerInvite => "server INVITE",
            TransactionKind::ServerNonInvite => "server non-INVITE",
        };
        f.write_str(name)
    }
}

/// Why a transaction reached the Terminated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// A final response was received (client side)
    FinalResponseReceived,
    /// A final response was sent (server side, normal completion)
    FinalResponseSent,
    /// A 2xx to INVITE was received; ACK is the TU's responsibility
    OkReceived,
    /// No final response arrived before the transaction timeout
    NoResponseReceived,
    /// No ACK arrived for a non-2xx INVITE final response
    AckNotReceived,
    /// The transport failed or closed under the transaction
    ConnectionFailure,
    /// The caller aborted the transaction
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationReason::FinalResponseReceived => "final response received",
            TerminationReason::FinalResponseSent => "final response sent",
            TerminationReason::OkReceived => "2xx received",
            TerminationReason::NoResponseReceived => "no response received",
            TerminationReason::AckNotReceived => "ACK not received",
            TerminationReason::ConnectionFailure => "connection failure",
            TerminationReason::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Side effects a state machine asks the dispatcher loop to perform.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send a message to the transaction's remote endpoint
    SendMessage(SipMessage),
    /// Arm (or re-arm) a transaction timer
    Arm(TimerType, Duration),
    /// Cancel a transaction timer (idempotent)
    Cancel(TimerType),
    /// Deliver a provisional response to the TU
    Provisional(Response),
    /// The transaction reached Terminated; remove it and resolve its
    /// completion handle
    Terminate(TerminationReason),
}

/// State shared by all four transaction kinds.
#[derive(Debug)]
pub(crate) struct TransactionCore {
    pub key: TransactionKey,
    /// Original request: the one sent (client) or received (server)
    pub request: Request,
    pub remote: SocketAddr,
    /// Reliability of the owning channel; gates retransmission timers
    /// and zeroes the wait timers K/D/I/J
    pub reliable: bool,
    pub settings: TimerSettings,
    pub state: TransactionState,
    /// Last response received (client) or sent (server)
    pub last_response: Option<Response>,
}

impl TransactionCore {
    pub(crate) fn new(
        key: TransactionKey,
        request: Request,
        remote: SocketAddr,
        reliable: bool,
        settings: TimerSettings,
        initial_state: TransactionState,
    ) -> Self {
        TransactionCore {
            key,
            request,
            remote,
            reliable,
            settings,
            state: initial_state,
            last_response: None,
        }
    }
}

/// A transaction of any of the four kinds.
#[derive(Debug)]
pub enum Transaction {
    ClientInvite(ClientInviteTransaction),
    ClientNonInvite(ClientNonInviteTransaction),
    ServerInvite(ServerInviteTransaction),
    ServerNonInvite(ServerNonInviteTransaction),
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Transaction::ClientInvite(_) => TransactionKind::ClientInvite,
            Transaction::ClientNonInvite(_) => TransactionKind::ClientNonInvite,
            Transaction::ServerInvite(_) => TransactionKind::ServerInvite,
            Transaction::ServerNonInvite(_) => TransactionKind::ServerNonInvite,
        }
    }

    fn core(&self) -> &TransactionCore {
        match self {
            Transaction::ClientInvite(tx) => &tx.core,
            Transaction::ClientNonInvite(tx) => &tx.core,
            Transaction::ServerInvite(tx) => &tx.core,
            Transaction::ServerNonInvite(tx) => &tx.core,
        }
    }

    pub fn key(&self) -> &TransactionKey {
        &self.core().key
    }

    pub fn state(&self) -> TransactionState {
        self.core().state
    }

    pub fn remote(&self) -> SocketAddr {
        self.core().remote
    }

    pub fn request(&self) -> &Request {
        &self.core().request
    }

    pub fn last_response(&self) -> Option<&Response> {
        self.core().last_response.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == TransactionState::Terminated
    }

    /// Initial actions on creation (send the request / initial response,
    /// arm the initial timers).
    pub fn start(&mut self) -> Vec<Action> {
        match self {
            Transaction::ClientInvite(tx) => tx.start(),
            Transaction::ClientNonInvite(tx) => tx.start(),
            Transaction::ServerInvite(tx) => tx.start(),
            Transaction::ServerNonInvite(tx) => tx.start(),
        }
    }

    /// Deliver a matched inbound message.
    pub fn on_message(&mut self, message: SipMessage) -> Vec<Action> {
        match (self, message) {
            (Transaction::ClientInvite(tx), SipMessage::Response(resp)) => tx.on_response(resp),
            (Transaction::ClientNonInvite(tx), SipMessage::Response(resp)) => tx.on_response(resp),
            (Transaction::ServerInvite(tx), SipMessage::Request(req)) => tx.on_request(req),
            (Transaction::ServerNonInvite(tx), SipMessage::Request(req)) => tx.on_request(req),
            // A request matched to a client transaction (or response to a
            // server transaction) cannot happen under the matching rules
            _ => Vec::new(),
        }
    }

    /// Deliver a timer expiration.
    pub fn on_timer(&mut self, timer: TimerType) -> Vec<Action> {
        match self {
            Transaction::ClientInvite(tx) => tx.on_timer(timer),
            Transaction::ClientNonInvite(tx) => tx.on_timer(timer),
            Transaction::ServerInvite(tx) => tx.on_timer(timer),
            Transaction::ServerNonInvite(tx) => tx.on_timer(timer),
        }
    }

    /// TU-initiated response on a server transaction.
    pub fn on_send_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self {
            Transaction::ServerInvite(tx) => tx.on_send_response(response),
            Transaction::ServerNonInvite(tx) => tx.on_send_response(response),
            _ => Err(crate::error::Error::InvalidStateForResponse {
                state: self.state(),
                status: 0,
            }),
        }
    }

    /// The transport under this transaction failed.
    pub fn on_transport_error(&mut self) -> Vec<Action> {
        let core = match self {
            Transaction::ClientInvite(tx) => &mut tx.core,
            Transaction::ClientNonInvite(tx) => &mut tx.core,
            Transaction::ServerInvite(tx) => &mut tx.core,
            Transaction::ServerNonInvite(tx) => &mut tx.core,
        };
        if core.state == TransactionState::Terminated {
            return Vec::new();
        }
        core.state = TransactionState::Terminated;
        vec![Action::Terminate(TerminationReason::ConnectionFailure)]
    }

    /// Caller-requested abort.
    pub fn on_abort(&mut self) -> Vec<Action> {
        let core = match self {
            Transaction::ClientInvite(tx) => &mut tx.core,
            Transaction::ClientNonInvite(tx) => &mut tx.core,
            Transaction::ServerInvite(tx) => &mut tx.core,
            Transaction::ServerNonInvite(tx) => &mut tx.core,
        };
        if core.state == TransactionState::Terminated {
            return Vec::new();
        }
        core.state = TransactionState::Terminated;
        vec![Action::Terminate(TerminationReason::Cancelled)]
    }
}
