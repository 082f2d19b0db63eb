//! Client engine
//!
//! - [`ClientStateMachine`]: phase-driven handshake and packet dispatch
//! - [`ClientConnection`]: channel-backed [`Connection`](crate::core::Connection)
//! - [`QuicClient`]: async handle running the state machine in a task

#[allow(clippy::module_inception)]
mod client;
mod config;
mod connection;
mod state_machine;

pub use client::{ClientError, ClientEvents, QuicClient};
pub use config::{ClientConfig, QuicClientBuilder};
pub use connection::{ChannelStream, ClientConnection, StreamEvent};
pub use state_machine::{ClientStateMachine, ConnectionPhase, HandshakeWaiter};
