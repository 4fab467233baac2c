//! parley-protocol: Wire protocol shared by the chat server and client
//!
//! This crate defines the UTF-32 line codec, the [`Connection`] wrapper
//! used on both sides of a socket, the protocol sentinels and line
//! formats, and the observer boundary towards the UI.

pub mod codec;
pub mod connection;
pub mod messages;
pub mod observer;

// Re-export main types at crate root
pub use codec::{CodecError, Utf32LineCodec, DEFAULT_BUFFER_SIZE, MAX_LINE_CHARS};
pub use connection::{Connection, ConnectionError};
pub use messages::{PeerLine, ServerLine, EXIT, SERVER_EXIT, SERVER_NAME};
pub use observer::{CallbackObserver, ChannelObserver, ChatEvent, ChatObserver, SharedObserver};
