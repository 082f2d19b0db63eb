//! Transport layer
//!
//! Packet-level building blocks shared by the handshake and the client
//! engine:
//!
//! - **Packet numbers**: [`PacketNumber`] and its self-describing varint codec
//! - **Frames**: [`Frame`] and [`AckRange`]
//! - **Packets**: [`Packet`] variants per header class, [`ConnectionId`]
//! - **Reliability**: [`PacketBuffer`] tracking sent packets and batching acks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Client state machine            │
//! ├─────────────────────────────────────────┤
//! │   TLS session    │   PacketBuffer       │
//! ├─────────────────────────────────────────┤
//! │   Packets, frames, packet numbers       │  ← This module
//! ├─────────────────────────────────────────┤
//! │         Network layer (external)        │
//! └─────────────────────────────────────────┘
//! ```

mod ack;
mod error;
mod frame;
mod number;
mod packet;

pub use ack::{PacketBuffer, coalesce_ranges};
pub use error::*;
pub use frame::*;
pub use number::PacketNumber;
pub use packet::*;
