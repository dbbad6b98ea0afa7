//! The protocol layers.
//!
//! Only the transport layer lives in this crate; the network layer below it
//! is an external collaborator reached through the [`ip::Layer`] trait. Both
//! that boundary and the current time are handed to the transport per call in
//! a [`Context`], constructed by whoever drives the stack: a live event
//! loop, a test harness, a simulation.
//!
//! [`ip::Layer`]: ip/trait.Layer.html
//! [`Context`]: struct.Context.html

pub mod ip;
pub mod tcp;

use crate::time::Instant;

/// The collaborators a transport component needs while processing one event.
///
/// There is deliberately no global stack object: whoever owns the event loop
/// constructs a context from its clock and its network layer and passes it
/// down by reference. The same session can thereby be driven by the live
/// clock in production and the virtual clock in tests without knowing the
/// difference.
pub struct Context<'a> {
    /// The current time as observed by the driving clock.
    pub now: Instant,
    /// The network layer packets are handed to.
    pub ip: &'a mut dyn ip::Layer,
}

impl<'a> Context<'a> {
    /// Bundle a point in time and a network layer.
    pub fn new(now: Instant, ip: &'a mut dyn ip::Layer) -> Self {
        Context { now, ip }
    }
}
