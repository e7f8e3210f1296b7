//! Peer module
//!
//! A session per remote peer, driven through its connection states.

pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use session::PeerSession;
pub use state::SessionState;
