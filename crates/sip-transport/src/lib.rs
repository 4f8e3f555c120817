//! Message channel abstraction for the rtext SIP stack.
//!
//! The transaction layer owns a [`MessageChannel`] and never touches
//! sockets directly: a channel moves opaque byte buffers to and from a
//! remote endpoint and reports inbound traffic and lifecycle changes as
//! [`ChannelEvent`]s. Concrete TCP/TLS/UDP channels are supplied by the
//! embedding application; this crate ships the contract plus an
//! in-process [`MemoryChannel`] pair used throughout the test suites.

pub mod channel;
pub mod events;
pub mod memory;

pub use channel::{ChannelError, MessageChannel, Result};
pub use events::ChannelEvent;
pub use memory::MemoryChannel;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::channel::{ChannelError, MessageChannel, Result};
    pub use crate::events::ChannelEvent;
    pub use crate::memory::MemoryChannel;
}
