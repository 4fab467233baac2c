//! Client-server connection management
//!
//! A [`ChatPeer`] owns at most one connection to a broadcast server and
//! reports everything worth showing through a chat observer.

mod peer;

pub use peer::{ChatPeer, PeerState};
