use core::fmt;

use super::DEFAULT_WINDOW;
use crate::wire::{
    tcp_segment, Endpoint, IpAddress, Result, TcpFlags, TcpSeqNumber, TCP_HEADER_LEN,
};

/// The payload of a segment: a view into someone else's buffer, or bytes of
/// our own.
///
/// Parsing yields a borrowed view so that the hot path never copies; a
/// segment that must outlive the buffer it was parsed from is explicitly
/// promoted with [`Segment::into_owned`].
///
/// [`Segment::into_owned`]: struct.Segment.html#method.into_owned
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    /// A view borrowed from the buffer the segment was parsed from.
    Borrowed(&'a [u8]),
    /// An independent copy.
    Owned(Vec<u8>),
}

impl Payload<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Payload::Borrowed(slice) => slice,
            Payload::Owned(vec) => vec,
        }
    }
}

/// One TCP segment, parsed or about to be emitted.
///
/// Ephemeral by design: a segment is built, written out and forgotten, or
/// parsed, dispatched and forgotten. The lifetime parameter bounds a
/// [`Payload::Borrowed`] view; a segment with an owned payload may use
/// `'static`.
///
/// [`Payload::Borrowed`]: enum.Payload.html#variant.Borrowed
#[derive(Debug, Clone)]
pub struct Segment<'a> {
    /// Where the segment comes from.
    pub source: Endpoint,
    /// Where the segment is headed.
    pub destination: Endpoint,
    /// The sequence number of the first payload octet.
    pub sequence: TcpSeqNumber,
    /// The acknowledgment number; meaningful only when the ACK flag is set.
    pub acknowledgment: TcpSeqNumber,
    /// The control flags.
    pub flags: TcpFlags,
    /// The advertised window.
    pub window: u16,
    payload: Payload<'a>,
}

impl<'a> Segment<'a> {
    /// Parse a segment out of a packet handed up by the network layer.
    ///
    /// The addresses come from the network layer alongside the packet since
    /// the segment header only carries ports. The payload stays borrowed
    /// from `packet`; the checksum is trusted to have been verified below.
    pub fn parse(
        source: IpAddress,
        destination: IpAddress,
        packet: &'a [u8],
    ) -> Result<Segment<'a>> {
        let header = tcp_segment::new_checked(packet)?;
        Ok(Segment {
            source: Endpoint::new(source, header.src_port()),
            destination: Endpoint::new(destination, header.dst_port()),
            sequence: header.seq_number(),
            acknowledgment: header.ack_number(),
            flags: header.flags(),
            window: header.window_len(),
            payload: Payload::Borrowed(header.payload_slice()),
        })
    }

    /// The payload octets.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// The payload length in octets.
    pub fn payload_len(&self) -> usize {
        self.payload.as_slice().len()
    }

    /// Whether the ACK flag is set.
    pub fn is_ack(&self) -> bool {
        self.flags.ack()
    }

    /// Whether the RST flag is set.
    pub fn is_rst(&self) -> bool {
        self.flags.rst()
    }

    /// Whether the SYN flag is set.
    pub fn is_syn(&self) -> bool {
        self.flags.syn()
    }

    /// Whether the FIN flag is set.
    pub fn is_fin(&self) -> bool {
        self.flags.fin()
    }

    /// Promote a borrowed payload into an owned copy, untying the segment
    /// from the buffer it was parsed from.
    pub fn into_owned(self) -> Segment<'static> {
        Segment {
            source: self.source,
            destination: self.destination,
            sequence: self.sequence,
            acknowledgment: self.acknowledgment,
            flags: self.flags,
            window: self.window,
            payload: match self.payload {
                Payload::Borrowed(slice) => Payload::Owned(slice.to_vec()),
                Payload::Owned(vec) => Payload::Owned(vec),
            },
        }
    }

    /// The number of octets [`emit`] will write.
    ///
    /// [`emit`]: #method.emit
    pub fn buffer_len(&self) -> usize {
        TCP_HEADER_LEN + self.payload_len()
    }

    /// Write the segment into the front of `packet` and fill in the
    /// checksum, returning the number of octets written.
    ///
    /// # Panics
    /// `packet` must hold at least [`buffer_len`] octets.
    ///
    /// [`buffer_len`]: #method.buffer_len
    pub fn emit(&self, packet: &mut [u8]) -> usize {
        let length = self.buffer_len();
        let header = tcp_segment::new_unchecked_mut(&mut packet[..length]);
        header.set_src_port(self.source.port);
        header.set_dst_port(self.destination.port);
        header.set_seq_number(self.sequence);
        header.set_ack_number(self.acknowledgment);
        header.set_header_len(TCP_HEADER_LEN as u8);
        header.set_flags(self.flags);
        header.set_window_len(self.window);
        header.set_urgent_at(0);
        header.payload_mut_slice().copy_from_slice(self.payload.as_slice());
        header.fill_checksum(self.source.addr, self.destination.addr);
        length
    }
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SEQ={}", self.sequence)?;
        if self.is_ack() {
            write!(f, " ACK={}", self.acknowledgment)?;
        }
        if self.is_syn() {
            write!(f, " SYN")?;
        }
        if self.is_rst() {
            write!(f, " RST")?;
        }
        if self.is_fin() {
            write!(f, " FIN")?;
        }
        if self.payload_len() > 0 {
            write!(f, " len={}", self.payload_len())?;
        }
        Ok(())
    }
}

/// Builds the segments of one connection.
///
/// The factory is bound to its connection's address pair once and stamps
/// every segment with those addresses and the fixed advertised window, so
/// call sites only supply what varies: sequence numbers, flags, payload.
/// Owned by a socket session next to the control block.
#[derive(Debug)]
pub struct SegmentFactory {
    local: Endpoint,
    remote: Endpoint,
}

impl SegmentFactory {
    /// Bind a factory to a connection's address pair.
    pub fn new(local: Endpoint, remote: Endpoint) -> Self {
        SegmentFactory { local, remote }
    }

    /// The local endpoint segments are stamped with as their source.
    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    /// The remote endpoint segments are stamped with as their destination.
    pub fn remote_endpoint(&self) -> Endpoint {
        self.remote
    }

    /// Build a segment carrying `data`.
    pub fn segment<'d>(
        &self,
        sequence: TcpSeqNumber,
        acknowledgment: TcpSeqNumber,
        flags: TcpFlags,
        data: &'d [u8],
    ) -> Segment<'d> {
        Segment {
            source: self.local,
            destination: self.remote,
            sequence,
            acknowledgment,
            flags,
            window: DEFAULT_WINDOW,
            payload: Payload::Borrowed(data),
        }
    }

    /// Build a bare control segment without an acknowledgment.
    pub fn control(&self, sequence: TcpSeqNumber, flags: TcpFlags) -> Segment<'static> {
        debug_assert!(!flags.ack(), "an acknowledging segment needs an ack number");
        self.segment(sequence, TcpSeqNumber(0), flags, &[])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::IpAddress;

    const LOCAL: Endpoint = Endpoint::new(IpAddress::new(10, 0, 0, 1), 4000);
    const REMOTE: Endpoint = Endpoint::new(IpAddress::new(10, 0, 0, 2), 80);

    fn factory() -> SegmentFactory {
        SegmentFactory::new(LOCAL, REMOTE)
    }

    #[test]
    fn emit_parse_round_trip() {
        let segment = factory().segment(
            TcpSeqNumber(7000),
            TcpSeqNumber(300),
            TcpFlags::ACK | TcpFlags::PSH,
            b"four scores",
        );

        let mut packet = [0u8; 64];
        let length = segment.emit(&mut packet);
        assert_eq!(length, TCP_HEADER_LEN + 11);

        let parsed = Segment::parse(LOCAL.addr, REMOTE.addr, &packet[..length]).unwrap();
        assert_eq!(parsed.source, LOCAL);
        assert_eq!(parsed.destination, REMOTE);
        assert_eq!(parsed.sequence, TcpSeqNumber(7000));
        assert_eq!(parsed.acknowledgment, TcpSeqNumber(300));
        assert!(parsed.is_ack() && !parsed.is_syn());
        assert_eq!(parsed.window, DEFAULT_WINDOW);
        assert_eq!(parsed.payload(), b"four scores");
    }

    #[test]
    fn emitted_checksum_verifies() {
        let segment = factory().control(TcpSeqNumber(1), TcpFlags::SYN);
        let mut packet = [0u8; 40];
        let length = segment.emit(&mut packet);
        let header = tcp_segment::new_checked(&packet[..length]).unwrap();
        assert!(header.verify_checksum(LOCAL.addr, REMOTE.addr));
    }

    #[test]
    fn owned_segment_outlives_packet() {
        let owned = {
            let mut packet = [0u8; 64];
            let length = factory()
                .segment(TcpSeqNumber(1), TcpSeqNumber(2), TcpFlags::ACK, b"keep me")
                .emit(&mut packet);
            Segment::parse(LOCAL.addr, REMOTE.addr, &packet[..length])
                .unwrap()
                .into_owned()
        };
        assert_eq!(owned.payload(), b"keep me");
    }

    #[test]
    fn truncated_packet_is_rejected() {
        let packet = [0u8; 12];
        assert!(Segment::parse(LOCAL.addr, REMOTE.addr, &packet[..]).is_err());
    }

    #[test]
    fn display_shape() {
        let segment = factory().segment(TcpSeqNumber(100), TcpSeqNumber(301), TcpFlags::SYN | TcpFlags::ACK, &[]);
        assert_eq!(format!("{}", segment), "SEQ=100 ACK=301 SYN");
    }
}
