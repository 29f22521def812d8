//! Network Module Implementation
//!
//! This module provides the listener/connection programming model on top of
//! the raw socket primitive provider.
//!
//! # Architecture
//!
//! - Address resolution turns `"a.b.c.d:port"` text into a [`SocketAddress`]
//! - The codec turns a [`SocketAddress`] into the provider's binary layout
//!   and back
//! - [`Listener`] owns a bound, listening socket and hands out connections
//! - [`Connection`] owns a connected socket and exposes byte-stream I/O
//! - [`Dialer`] opens outbound connections
//!
//! # Lifecycle
//!
//! Listeners and connections move from created to active to closed. Every
//! socket is owned by exactly one of them and released once, either by
//! `close` or when the owner is dropped.
//!
//! # Errors
//!
//! - Malformed address text fails with [`AddressParseError`]
//! - Provider failures surface as [`NetError::Socket`] naming the failed call
//! - A zero-byte read or write is [`NetError::Disconnected`], the normal end
//!   of a stream

pub use address::{resolve, AddressParseError, SocketAddress, SUPPORTED_NETWORKS};
pub use codec::{BinarySocketAddress, SOCKADDR_IN_LEN};
pub use connection::{deadline_after, Connection};
pub use dialer::{dial, Dialer};
pub use error::{NetError, NetResult, SocketOp};
pub use listener::{listen, listen_with, Listener, LISTEN_BACKLOG};

mod address;
mod codec;
mod connection;
mod dialer;
mod error;
mod handle;
mod listener;
