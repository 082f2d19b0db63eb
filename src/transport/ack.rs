//! Sent-packet tracking and acknowledgment batching.
//!
//! [`PacketBuffer`] keeps every sent packet until the peer acknowledges it,
//! retires packets named by incoming Ack frames, and batches the packet
//! numbers we receive into our own Ack frames.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::core::{DEFAULT_ACK_DELAY, DEFAULT_ACK_QUEUE_CAPACITY, PacketSender};

use super::{AckRange, Frame, Packet, PacketNumber, ShortPacket, TransportError};

/// Coalesce packet numbers into minimal, disjoint, ascending ranges.
///
/// A new range starts whenever the next number is not exactly one greater
/// than the current range's upper bound. Duplicates are absorbed.
pub fn coalesce_ranges(numbers: impl IntoIterator<Item = PacketNumber>) -> Vec<AckRange> {
    let mut sorted: Vec<PacketNumber> = numbers.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return ranges;
    };

    let (mut lower, mut upper) = (first, first);
    for pn in iter {
        if pn.as_u64() == upper.as_u64() + 1 {
            upper = pn;
        } else {
            ranges.push(AckRange::from_sorted(lower, upper));
            lower = pn;
            upper = pn;
        }
    }
    ranges.push(AckRange::from_sorted(lower, upper));
    ranges
}

/// Outbound packet reliability buffer.
#[derive(Debug)]
pub struct PacketBuffer {
    /// Sent packets awaiting acknowledgment.
    pending: BTreeMap<PacketNumber, Packet>,
    /// Received packet numbers awaiting a local Ack.
    ack_queue: Vec<PacketNumber>,
    /// Bound on `ack_queue`.
    capacity: usize,
}

impl PacketBuffer {
    /// Create a buffer with the default ack queue capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ACK_QUEUE_CAPACITY)
    }

    /// Create a buffer whose ack queue holds at most `capacity` numbers.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: BTreeMap::new(),
            ack_queue: Vec::with_capacity(capacity.min(DEFAULT_ACK_QUEUE_CAPACITY)),
            capacity,
        }
    }

    /// Record `packet` as pending and transmit it.
    ///
    /// The packet is retained until an Ack frame covers its number.
    pub fn send<S: PacketSender + ?Sized>(
        &mut self,
        sender: &mut S,
        packet: Packet,
    ) -> Result<(), TransportError> {
        let pn = packet
            .packet_number()
            .ok_or(TransportError::MissingPacketNumber)?;
        if self.pending.contains_key(&pn) {
            return Err(TransportError::DuplicatePacketNumber(pn));
        }

        trace!(packet_number = %pn, kind = packet.kind(), "tracking sent packet");
        self.pending.insert(pn, packet.clone());
        sender.send_packet(packet);
        Ok(())
    }

    /// Observe a received packet.
    ///
    /// Queues its number for acknowledgment, retires every pending packet
    /// covered by its Ack frames, and flushes our own acks immediately if
    /// the packet carried anything besides acks.
    ///
    /// Returns the number of pending packets retired.
    pub fn on_packet<S: PacketSender + ?Sized>(
        &mut self,
        sender: &mut S,
        packet: &Packet,
    ) -> Result<usize, TransportError> {
        let Some(pn) = packet.packet_number() else {
            return Ok(0);
        };

        if self.ack_queue.len() >= self.capacity {
            debug!(capacity = self.capacity, "ack queue full, flushing early");
            self.flush_acks(sender)?;
        }
        self.ack_queue.push(pn);

        let mut retired = 0;
        for frame in packet.frames() {
            if let Frame::Ack { ranges, .. } = frame {
                for range in ranges {
                    retired += self.retire(range);
                }
            }
        }
        if retired > 0 {
            trace!(retired, remaining = self.pending.len(), "packets acknowledged");
        }

        if !packet.frames().iter().all(Frame::is_ack) {
            self.flush_acks(sender)?;
        }

        Ok(retired)
    }

    /// Drain the ack queue into a single Ack frame and send it.
    ///
    /// The ack packet gets a fresh packet number and is itself tracked.
    /// Flushing an empty queue is a no-op.
    pub fn flush_acks<S: PacketSender + ?Sized>(
        &mut self,
        sender: &mut S,
    ) -> Result<(), TransportError> {
        if self.ack_queue.is_empty() {
            return Ok(());
        }

        let packet_number = sender.next_packet_number()?;
        let ranges = coalesce_ranges(self.ack_queue.drain(..));
        debug!(
            packet_number = %packet_number,
            ranges = ranges.len(),
            "flushing acks"
        );

        let packet = Packet::Short(ShortPacket {
            key_phase: false,
            destination: sender.destination_connection_id().clone(),
            packet_number,
            frames: vec![Frame::ack(DEFAULT_ACK_DELAY, ranges)],
        });
        self.send(sender, packet)
    }

    /// Remove every pending packet inside `range`.
    ///
    /// Numbers that are not pending are ignored, so retiring twice is harmless.
    pub fn retire(&mut self, range: &AckRange) -> usize {
        let acked: Vec<PacketNumber> = self
            .pending
            .range(range.smallest()..=range.largest())
            .map(|(pn, _)| *pn)
            .collect();
        for pn in &acked {
            self.pending.remove(pn);
        }
        acked.len()
    }

    /// Check whether `pn` is still awaiting acknowledgment.
    pub fn is_pending(&self, pn: PacketNumber) -> bool {
        self.pending.contains_key(&pn)
    }

    /// Get a pending packet.
    pub fn pending_packet(&self, pn: PacketNumber) -> Option<&Packet> {
        self.pending.get(&pn)
    }

    /// Number of packets awaiting acknowledgment.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Received packet numbers not yet acknowledged.
    pub fn queued_acks(&self) -> &[PacketNumber] {
        &self.ack_queue
    }

    /// Drop all state (connection teardown).
    pub fn clear(&mut self) {
        self.pending.clear();
        self.ack_queue.clear();
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}
