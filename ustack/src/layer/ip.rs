//! The boundary to the network layer.
//!
//! Routing, fragmentation and delivery happen below this crate. The
//! transport only needs one operation from the layer beneath it, handing
//! over a finished packet, and that operation is the [`Layer`] trait. The
//! in-memory [`Queue`] implementation backs the protocol tests and loopback
//! demonstrations; a production stack implements `Layer` on its real IP
//! layer instead.
//!
//! [`Layer`]: trait.Layer.html
//! [`Queue`]: struct.Queue.html

use std::collections::VecDeque;

use crate::wire::{IpAddress, IpProtocol};

/// An outbound packet boundary.
pub trait Layer {
    /// Hand one finished upper-layer packet to the network layer.
    ///
    /// Returns `false` when the packet could not be transmitted. The
    /// transport never retries a failed hand-over; loss recovery is the
    /// retransmission machinery's business.
    fn send_packet(
        &mut self,
        source: IpAddress,
        destination: IpAddress,
        protocol: IpProtocol,
        packet: &[u8],
    ) -> bool;
}

/// One packet captured by [`Queue`].
///
/// [`Queue`]: struct.Queue.html
#[derive(Debug, Clone)]
pub struct Packet {
    /// The source host handed along with the packet.
    pub source: IpAddress,
    /// The destination host handed along with the packet.
    pub destination: IpAddress,
    /// The upper-layer protocol.
    pub protocol: IpProtocol,
    /// The packet bytes.
    pub payload: Vec<u8>,
}

/// An in-memory network layer that queues every packet it is handed.
///
/// Stands in for the real IP layer wherever packets should loop back into
/// the process instead of reaching a device: the protocol scenario tests
/// inspect the queue segment by segment, and the loopback demonstration
/// shuttles packets between two sessions through a pair of queues.
#[derive(Debug, Default)]
pub struct Queue {
    queue: VecDeque<Packet>,
}

impl Queue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Queue { queue: VecDeque::new() }
    }

    /// Take the oldest queued packet.
    pub fn pop(&mut self) -> Option<Packet> {
        self.queue.pop_front()
    }

    /// The number of queued packets.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no packets are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop all queued packets.
    pub fn clear(&mut self) {
        self.queue.clear()
    }
}

impl Layer for Queue {
    fn send_packet(
        &mut self,
        source: IpAddress,
        destination: IpAddress,
        protocol: IpProtocol,
        packet: &[u8],
    ) -> bool {
        self.queue.push_back(Packet {
            source,
            destination,
            protocol,
            payload: packet.to_vec(),
        });
        true
    }
}
