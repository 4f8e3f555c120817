//! # rtext-transaction-core
//!
//! RFC 3261 transaction layer for the rtext stack: the four transaction
//! state machines (sections 17.1.1, 17.1.2, 17.2.1, 17.2.2), their
//! timers, and the transport dispatcher that matches inbound messages to
//! transactions and escalates everything else to the transaction user.
//!
//! ## Architecture
//!
//! ```text
//!  TU API calls                      TU events / completion handles
//!       │                                       ▲
//!       ▼                                       │
//!  ┌──────────────────────────────────────────────────────┐
//!  │ TransactionManager (single dispatch loop)            │
//!  │   transaction index ── TimerWheel ── state machines  │
//!  └──────────────────────────────────────────────────────┘
//!       │                                       ▲
//!       ▼                                       │
//!   MessageChannel::send              ChannelEvent::MessageReceived
//! ```
//!
//! State machines are synchronous and return action lists; the dispatch
//! loop performs all sending, timing and index bookkeeping. No
//! transaction state is shared outside the loop task.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtext_sip_core::{Method, RequestBuilder};
//! use rtext_sip_transport::MemoryChannel;
//! use rtext_transaction_core::{utils, TransactionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ((channel, channel_rx), _peer) =
//!     MemoryChannel::pair("127.0.0.1:5060".parse()?, "127.0.0.1:5070".parse()?, false);
//! let (manager, mut events) = TransactionManager::new(Arc::new(channel), channel_rx);
//!
//! let request = RequestBuilder::new(Method::Options, "sip:srv.example.com")
//!     .via("127.0.0.1:5060", "UDP", &utils::generate_branch())
//!     .from("", "sip:probe@example.com", Some("tag1"))
//!     .to("", "sip:srv.example.com", None)
//!     .call_id("probe-1")
//!     .cseq(1)
//!     .max_forwards(70)
//!     .build();
//!
//! let handle = manager
//!     .start_client_non_invite(request, "127.0.0.1:5070".parse()?, None)
//!     .await?;
//! let outcome = handle.wait().await?;
//! println!("transaction ended: {}", outcome.reason);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod key;
pub mod manager;
pub mod timer;
pub mod transaction;
pub mod utils;

pub use error::{Error, Result};
pub use events::{TransactionEvent, TransactionHandle, TransactionOutcome};
pub use key::TransactionKey;
pub use manager::TransactionManager;
pub use timer::{TimerSettings, TimerType, TimerWheel};
pub use transaction::{
    TerminationReason, Transaction, TransactionKind, TransactionState,
};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::events::{TransactionEvent, TransactionHandle, TransactionOutcome};
    pub use crate::key::TransactionKey;
    pub use crate::manager::TransactionManager;
    pub use crate::timer::{TimerSettings, TimerType};
    pub use crate::transaction::{TerminationReason, TransactionKind, TransactionState};
    pub use crate::utils;
}
