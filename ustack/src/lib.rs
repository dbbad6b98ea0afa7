//! A user-space TCP transport engine.
//!
//! `ustack` implements the transport half of a socket-intercepting protocol
//! stack: the per-connection control block, the segment wire codec, the
//! retransmission and send-buffer engine, and the RFC 793 connection state
//! machine. Packet delivery, routing and device I/O are *not* part of this
//! crate; they are reached through the narrow [`layer::ip::Layer`] boundary
//! and can equally be a real network layer or an in-memory queue.
//!
//! ## Table of contents
//!
//! 1. [The wire module](wire/index.html): field-level segment access, the
//!    sequence number type and the Internet checksum.
//! 2. [The tcp layer](layer/tcp/index.html): control block, send buffer and
//!    the socket session state machine.
//! 3. [The time module](time/index.html): instants, alarms and the two
//!    clock sources (monotonic system clock, virtual test clock).
//! 4. [The storage module](storage/index.html): the byte ring buffer shared
//!    by the send and receive paths.
//!
//! ## Design
//!
//! Everything a connection owns is owned exactly once: a
//! [`SocketSession`](layer/tcp/struct.SocketSession.html) holds its control
//! block, segment factory, send buffer and receive buffer as plain values.
//! Collaborators that live elsewhere (the network layer, the current time)
//! are passed in per call through a [`layer::Context`]. There is no
//! global stack object and no hidden registry; setup code constructs its
//! context explicitly and hands it down.
//!
//! Timers follow the same rule. An [`Alarm`](time/struct.Alarm.html) is a
//! plain deadline owned by the component that scheduled it; whichever clock
//! drives the stack (a live wait/poll loop or the deterministic
//! [`VirtualClock`](time/struct.VirtualClock.html) used by the protocol
//! tests) polls the session and the session dispatches its own due alarms.
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[macro_use] mod macros;
pub mod layer;
pub mod storage;
pub mod time;
pub mod wire;
