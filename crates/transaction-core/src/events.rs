//! Events and completion handles delivered to the transaction user.

use std::net::SocketAddr;

use rtext_sip_core::{Request, Response};
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::key::TransactionKey;
use crate::transaction::{TerminationReason, TransactionState};

/// Events the dispatcher reports to the transaction user.
#[derive(Debug)]
pub enum TransactionEvent {
    /// A transaction moved to a new state
    StateChanged {
        key: TransactionKey,
        previous_state: TransactionState,
        new_state: TransactionState,
    },

    /// A provisional response arrived on a client transaction
    ProvisionalReceived {
        key: TransactionKey,
        response: Response,
    },

    /// An ACK was matched to a server INVITE transaction
    AckReceived { key: TransactionKey, request: Request },

    /// A CANCEL matched a live server INVITE transaction. The TU answers
    /// the CANCEL (its own server non-INVITE transaction) and sends
    /// 487 Request Terminated on the INVITE transaction.
    CancelReceived {
        /// Key of the INVITE transaction being cancelled
        key: TransactionKey,
        cancel: Request,
        source: SocketAddr,
    },

    /// A request that matched no transaction
    RequestReceived { request: Request, source: SocketAddr },

    /// A response that matched no transaction
    ResponseReceived { response: Response, source: SocketAddr },

    /// A transaction reached its terminal state and left the index
    TransactionTerminated {
        key: TransactionKey,
        reason: TerminationReason,
        final_response: Option<Response>,
    },

    /// The underlying channel closed; all transactions were terminated
    ChannelClosed,
}

/// The terminal outcome of one transaction.
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub reason: TerminationReason,
    /// Last final response received (client) or sent (server), if any
    pub final_response: Option<Response>,
}

/// A handle to a running transaction.
///
/// Dropping the handle does not affect the transaction; awaiting
/// [`TransactionHandle::wait`] resolves when it terminates.
#[derive(Debug)]
pub struct TransactionHandle {
    pub key: TransactionKey,
    pub(crate) completion: oneshot::Receiver<TransactionOutcome>,
}

impl TransactionHandle {
    /// Wait for the transaction to terminate.
    pub async fn wait(self) -> Result<TransactionOutcome> {
        self.completion.await.map_err(|_| Error::ManagerShutdown)
    }
}
