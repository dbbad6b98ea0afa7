//! Byte storage shared by the transport paths.
//!
//! The central structure is the [`RingBuffer`], a fixed-capacity circular
//! byte store. The send path uses one to hold bytes that are buffered but not
//! yet acknowledged, the receive path uses one to hold bytes the application
//! has not yet read. Capacity is chosen once at construction; the buffer
//! never reallocates.
//!
//! [`RingBuffer`]: struct.RingBuffer.html

mod ring;

pub use self::ring::RingBuffer;
