//! The TCP transport engine.
//!
//! This layer implements the transmission control protocol of RFC 793 on top
//! of the [`ip::Layer`] boundary: the per-connection control block, the send
//! buffer with its go-back-N retransmission machinery, and the socket
//! session state machine that the socket interface above calls into.
//!
//! A connection is one [`SocketSession`]. The session exclusively owns
//! everything per-connection (control block, segment factory, send buffer,
//! receive buffer, TIME-WAIT alarm) and its child components borrow those
//! values only for the duration of a call, so ownership never forms a cycle.
//! Inbound packets reach a session either directly through
//! [`SocketSession::on_segment_arrival`] or demultiplexed by a
//! [`SocketTable`]; everything a session wants to say to the socket
//! interface above travels as a [`Message`] bitmask through the
//! [`Callback`] a session was given.
//!
//! Two deliberate simplifications shape the engine: there is no congestion
//! control (the amount of data in flight is capped at a fixed ten segments)
//! and no adaptive retransmission timeout (the timer is fixed at one
//! second).
//!
//! [`ip::Layer`]: ../ip/trait.Layer.html
//! [`SocketSession`]: struct.SocketSession.html
//! [`SocketSession::on_segment_arrival`]: struct.SocketSession.html#method.on_segment_arrival
//! [`SocketTable`]: struct.SocketTable.html
//! [`Message`]: struct.Message.html
//! [`Callback`]: trait.Callback.html

use crate::time::Duration;
use crate::wire::TCP_HEADER_LEN;

mod control;
mod demux;
mod isn;
mod segment;
mod send_buffer;
mod session;

#[cfg(test)]
mod tests;

pub use self::control::{ControlBlock, ReceiveSequence, SendSequence};
pub use self::demux::{SessionKey, SocketTable};
pub use self::isn::IsnGenerator;
pub use self::segment::{Payload, Segment, SegmentFactory};
pub use self::send_buffer::SendBuffer;
pub use self::session::{Callback, Message, SocketSession, State};

/// The largest payload carried by one segment (MSS), in octets.
pub const MAX_SEGMENT_SIZE: usize = 1460;

/// The largest packet this layer hands to the network layer.
pub const MAX_PACKET_LEN: usize = TCP_HEADER_LEN + MAX_SEGMENT_SIZE;

/// The cap on unacknowledged bytes in the network.
///
/// Ten segments stand in for a real congestion window.
pub const MAX_BYTES_IN_FLIGHT: usize = MAX_SEGMENT_SIZE * 10;

/// The fixed retransmission timeout.
pub const RETRANSMISSION_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a closing connection lingers in TIME-WAIT.
///
/// Two maximum segment lifetimes, kept as one constant.
pub const TIME_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// The advertised receive window, fixed since flow control is not
/// implemented.
pub const DEFAULT_WINDOW: u16 = 65535;
