use thiserror::Error;

use crate::key::TransactionKey;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the transaction layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid API use: the request method does not fit the requested
    /// transaction kind (e.g. a BYE passed to `start_client_invite`)
    #[error("Method {0} is not valid for this transaction kind")]
    InvalidMethod(rtext_sip_core::Method),

    /// The request is structurally unusable as a transaction seed
    /// (missing Via branch, missing CSeq, ...)
    #[error("Request unusable for transaction: {0}")]
    InvalidRequest(String),

    /// A live transaction with the same ID already exists
    #[error("Transaction already exists: {0}")]
    DuplicateTransaction(TransactionKey),

    /// No live transaction with this ID
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionKey),

    /// The response cannot be sent in the transaction's current state
    #[error("Response not allowed in state {state}: {status}")]
    InvalidStateForResponse {
        state: crate::transaction::TransactionState,
        status: u16,
    },

    /// SIP parse/serialize failure
    #[error("SIP message error: {0}")]
    SipCore(#[from] rtext_sip_core::Error),

    /// Channel send failure
    #[error("Channel error: {0}")]
    Channel(#[from] rtext_sip_transport::ChannelError),

    /// The dispatcher task has shut down
    #[error("Transaction manager is shut down")]
    ManagerShutdown,
}
