use super::{Segment, SegmentFactory, SocketSession};
use crate::layer::Context;
use crate::time::Expiration;
use crate::wire::{IpAddress, IpProtocol, TcpFlags, TcpSeqNumber, TCP_HEADER_LEN};

/// A handle to a session stored in a [`SocketTable`].
///
/// Handles stay valid until the session is removed; slots of removed
/// sessions are reused by later inserts.
///
/// [`SocketTable`]: struct.SocketTable.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey(usize);

/// Owns the established sessions and demultiplexes inbound packets onto
/// them.
///
/// A packet is routed by its address pair: the session whose local endpoint
/// matches the segment's destination and whose remote endpoint matches its
/// source gets the segment. A packet no session claims describes a
/// connection that does not exist, and the table answers it with a bare
/// reset so the far side gives up; a reset itself is never answered.
#[derive(Debug, Default)]
pub struct SocketTable {
    sessions: Vec<Option<SocketSession>>,
}

impl SocketTable {
    /// Create an empty table.
    pub fn new() -> Self {
        SocketTable { sessions: Vec::new() }
    }

    /// Store a session, returning its handle.
    pub fn insert(&mut self, session: SocketSession) -> SessionKey {
        match self.sessions.iter_mut().enumerate().find(|(_, slot)| slot.is_none()) {
            Some((index, slot)) => {
                *slot = Some(session);
                SessionKey(index)
            }
            None => {
                self.sessions.push(Some(session));
                SessionKey(self.sessions.len() - 1)
            }
        }
    }

    /// Look up a session.
    pub fn get(&self, key: SessionKey) -> Option<&SocketSession> {
        self.sessions.get(key.0).and_then(Option::as_ref)
    }

    /// Look up a session for mutation.
    pub fn get_mut(&mut self, key: SessionKey) -> Option<&mut SocketSession> {
        self.sessions.get_mut(key.0).and_then(Option::as_mut)
    }

    /// Take a session out of the table, usually once it [`is_closed`].
    ///
    /// [`is_closed`]: struct.SocketSession.html#method.is_closed
    pub fn remove(&mut self, key: SessionKey) -> Option<SocketSession> {
        self.sessions.get_mut(key.0).and_then(Option::take)
    }

    /// Route one inbound packet to its session, or answer it with a reset.
    ///
    /// Malformed packets are dropped silently.
    pub fn dispatch(
        &mut self,
        cx: &mut Context,
        source: IpAddress,
        destination: IpAddress,
        packet: &[u8],
    ) {
        let segment = match Segment::parse(source, destination, packet) {
            Ok(segment) => segment,
            Err(error) => {
                net_debug!("unparseable packet dropped: {}", error);
                return;
            }
        };

        let session = self.sessions.iter_mut().flatten().find(|session| {
            session.local_endpoint() == segment.destination
                && session.remote_endpoint() == segment.source
        });

        match session {
            Some(session) => session.on_segment_arrival(cx, segment),
            None => reset_unknown(cx, &segment),
        }
    }

    /// Fire due alarms on every session and report the earliest pending
    /// deadline.
    pub fn poll(&mut self, cx: &mut Context) -> Expiration {
        self.sessions
            .iter_mut()
            .flatten()
            .map(|session| session.poll(cx))
            .min()
            .unwrap_or(Expiration::Never)
    }
}

/// Answer a segment of a nonexistent connection (RFC 793, Reset
/// Generation, group 1).
///
/// An acknowledging segment is reset at the sequence number it expected;
/// anything else gets a reset acknowledging the offending segment.
fn reset_unknown(cx: &mut Context, segment: &Segment<'_>) {
    if segment.is_rst() {
        return;
    }

    let factory = SegmentFactory::new(segment.destination, segment.source);
    let reply = if segment.is_ack() {
        factory.control(segment.acknowledgment, TcpFlags::RST)
    } else {
        factory.segment(
            TcpSeqNumber(0),
            segment.sequence + segment.payload_len(),
            TcpFlags::RST | TcpFlags::ACK,
            &[],
        )
    };

    net_trace!("-> {}", reply);
    let mut packet = [0u8; TCP_HEADER_LEN];
    let length = reply.emit(&mut packet);
    let _ = cx.ip.send_packet(
        reply.source.addr,
        reply.destination.addr,
        IpProtocol::Tcp,
        &packet[..length],
    );
}
