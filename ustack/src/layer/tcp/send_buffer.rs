use super::{
    ControlBlock, Segment, SegmentFactory, MAX_BYTES_IN_FLIGHT, MAX_PACKET_LEN, MAX_SEGMENT_SIZE,
    RETRANSMISSION_TIMEOUT,
};
use crate::layer::Context;
use crate::storage::RingBuffer;
use crate::time::{Alarm, Expiration};
use crate::wire::{IpProtocol, TcpFlags, TcpSeqNumber};

const SEND_BUFFER_SIZE: usize = 256 * 1024;

/// Delivery state of the SYN and FIN control flags.
///
/// Each consumes one sequence number and must be delivered exactly once,
/// like a byte of data, but lives outside the byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtlState {
    None,
    Sent,
    Acked,
}

/// The sending engine of one connection.
///
/// Buffers outgoing bytes until the peer acknowledges them, segments them
/// for transmission and retransmits on timeout. Retransmission is go-back-N:
/// when the fixed one second timer expires everything beyond the last
/// acknowledgment is sent again. An ACK from the peer releases buffer space
/// and triggers further transmission.
///
/// The send buffer borrows its session's control block and segment factory
/// per call; it owns only the byte buffer, the control flag states and the
/// retransmission alarm.
#[derive(Debug)]
pub struct SendBuffer {
    buffer: RingBuffer,
    syn: CtlState,
    fin: CtlState,
    // bytes sent but not yet acknowledged, at most MAX_BYTES_IN_FLIGHT
    bytes_in_flight: usize,
    retransmission_alarm: Alarm,
}

impl SendBuffer {
    /// Create an idle send buffer.
    pub fn new() -> Self {
        SendBuffer {
            buffer: RingBuffer::new(SEND_BUFFER_SIZE),
            syn: CtlState::None,
            fin: CtlState::None,
            bytes_in_flight: 0,
            retransmission_alarm: Alarm::new(),
        }
    }

    /// Whether the peer has acknowledged our SYN.
    pub fn syn_acked(&self) -> bool {
        self.syn == CtlState::Acked
    }

    /// Whether the peer has acknowledged our FIN.
    pub fn fin_acked(&self) -> bool {
        self.fin == CtlState::Acked
    }

    /// The number of bytes sent but not yet acknowledged.
    pub fn bytes_in_flight(&self) -> usize {
        self.bytes_in_flight
    }

    /// The pending retransmission deadline, if any.
    pub fn next_expiry(&self) -> Expiration {
        self.retransmission_alarm.deadline()
    }

    /// Fire the retransmission alarm if it has come due.
    pub fn poll(&mut self, cx: &mut Context, tcb: &mut ControlBlock, factory: &SegmentFactory) {
        if self.retransmission_alarm.fire(cx.now) {
            net_trace!("retransmission timeout");
            self.retransmit(cx, tcb, factory);
        }
    }

    /// Record our initial sequence number and send the SYN.
    ///
    /// Sends a plain SYN if the peer's SYN has not been seen yet, a SYN+ACK
    /// otherwise.
    pub fn send_syn(
        &mut self,
        cx: &mut Context,
        tcb: &mut ControlBlock,
        factory: &SegmentFactory,
        initial: TcpSeqNumber,
    ) {
        debug_assert!(self.fin == CtlState::None);

        tcb.send.initial = initial;
        tcb.send.next = initial + 1;
        tcb.send.unack = initial;
        self.syn = CtlState::Sent;
        self.transmit(cx, tcb, factory);
    }

    /// Buffer application bytes for transmission.
    ///
    /// Returns how many bytes fit; zero on a full buffer means backpressure,
    /// not an error. Data is transmitted right away once the handshake has
    /// completed, otherwise it waits for the SYN to be acknowledged.
    pub fn send_data(
        &mut self,
        cx: &mut Context,
        tcb: &mut ControlBlock,
        factory: &SegmentFactory,
        data: &[u8],
    ) -> usize {
        debug_assert!(self.fin == CtlState::None, "data after FIN");
        if self.fin != CtlState::None || self.buffer.is_full() {
            return 0;
        }

        let consumed = self.buffer.write(data);
        tcb.send.next += consumed;

        if self.syn_acked() {
            self.transmit(cx, tcb, factory);
        }

        consumed
    }

    /// Queue the FIN, consuming one sequence number.
    ///
    /// With an empty buffer the FIN leaves immediately; otherwise it rides
    /// piggybacked on the final data segment once the buffer drains.
    pub fn send_fin(&mut self, cx: &mut Context, tcb: &mut ControlBlock, factory: &SegmentFactory) {
        self.fin = CtlState::Sent;
        tcb.send.next += 1;

        if self.buffer.is_empty() {
            self.transmit(cx, tcb, factory);
        }
    }

    /// Process an acknowledgment up to sequence number `ack`.
    ///
    /// Frees acknowledged bytes from the buffer, making room for more
    /// [`send_data`], and transmits further data if the acknowledgment
    /// opened the in-flight window. Returns the number of buffered bytes
    /// released; the caller signals writability on a nonzero return.
    ///
    /// The caller has already validated `ack` against the control block;
    /// stale acknowledgments must not reach this point.
    ///
    /// [`send_data`]: #method.send_data
    pub fn acknowledge(
        &mut self,
        cx: &mut Context,
        tcb: &mut ControlBlock,
        factory: &SegmentFactory,
        ack: TcpSeqNumber,
    ) -> usize {
        if self.syn == CtlState::Sent {
            // the first valid acknowledgment consumes the SYN's sequence slot
            debug_assert!(tcb.send.greater_than(ack, tcb.send.initial));
            self.syn = CtlState::Acked;
            tcb.send.unack = tcb.send.initial + 1;
        }

        debug_assert!(tcb.send.greater_or_equal(ack, tcb.send.unack));
        let consumed = ack - tcb.send.unack;
        let freed = self.buffer.consume(consumed);
        tcb.send.unack += freed;
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(freed);

        if self.fin == CtlState::Sent && tcb.send.equal(ack, tcb.send.next) {
            debug_assert!(self.buffer.is_empty());
            self.fin = CtlState::Acked;
            tcb.send.unack += 1;
        }

        if freed > 0 {
            // the in-flight window advanced
            self.transmit(cx, tcb, factory);
        }

        if tcb.send.equal(tcb.send.unack, tcb.send.next) {
            // everything sent has been acknowledged
            self.retransmission_alarm.cancel();
        }

        freed
    }

    /// Send buffered bytes up to the in-flight cap.
    ///
    /// Reads not-yet-sent bytes at offset `bytes_in_flight`, one segment of
    /// at most one MSS at a time, each starting at `unack + bytes_in_flight`.
    /// The FIN flag rides only on the segment that ends exactly at
    /// `send.next`. While the handshake is incomplete this (re)sends the SYN
    /// instead.
    pub fn transmit(&mut self, cx: &mut Context, tcb: &mut ControlBlock, factory: &SegmentFactory) {
        match self.syn {
            CtlState::None => return,
            CtlState::Sent => {
                self.transmit_syn(cx, tcb, factory);
                self.arm(cx);
                return;
            }
            CtlState::Acked => {}
        }

        let mut chunk = [0u8; MAX_SEGMENT_SIZE];
        while self.bytes_in_flight < MAX_BYTES_IN_FLIGHT {
            let length = self.buffer.read_offset(self.bytes_in_flight, &mut chunk);
            let sequence = tcb.send.unack + self.bytes_in_flight;
            self.bytes_in_flight += length;

            let mut flags = TcpFlags::ACK;
            if self.fin == CtlState::Sent && tcb.send.equal(sequence + length + 1, tcb.send.next) {
                // piggyback the FIN on the final segment
                flags |= TcpFlags::FIN;
            } else if length == 0 {
                // the application has nothing more buffered
                break;
            }

            let segment = factory.segment(sequence, tcb.receive.next, flags, &chunk[..length]);
            if !self.send_segment(cx, &segment) {
                break;
            }
            if flags.fin() {
                // the stream ends here
                break;
            }
        }

        if self.bytes_in_flight > 0 || self.fin == CtlState::Sent {
            self.arm(cx);
        }
    }

    fn transmit_syn(&mut self, cx: &mut Context, tcb: &mut ControlBlock, factory: &SegmentFactory) {
        let segment = if tcb.receive.syn_received {
            factory.segment(
                tcb.send.initial,
                tcb.receive.next,
                TcpFlags::SYN | TcpFlags::ACK,
                &[],
            )
        } else {
            factory.control(tcb.send.initial, TcpFlags::SYN)
        };
        let _ = self.send_segment(cx, &segment);
    }

    /// Resend everything beyond the last acknowledgment.
    fn retransmit(&mut self, cx: &mut Context, tcb: &mut ControlBlock, factory: &SegmentFactory) {
        self.bytes_in_flight = 0;
        self.transmit(cx, tcb, factory);
    }

    fn arm(&mut self, cx: &Context) {
        self.retransmission_alarm
            .update(Some(cx.now + RETRANSMISSION_TIMEOUT), Alarm::DEFAULT_GRANULARITY);
    }

    /// Hand one segment to the network layer immediately.
    pub fn send_segment(&self, cx: &mut Context, segment: &Segment) -> bool {
        net_trace!("-> {}", segment);

        let mut packet = [0u8; MAX_PACKET_LEN];
        let length = segment.emit(&mut packet);

        if !cx.ip.send_packet(
            segment.source.addr,
            segment.destination.addr,
            IpProtocol::Tcp,
            &packet[..length],
        ) {
            net_debug!("segment hand-over failed");
            return false;
        }
        true
    }

    /// Disarm the retransmission machinery when the connection aborts.
    pub fn abort(&mut self) {
        self.retransmission_alarm.cancel();
    }
}

impl Default for SendBuffer {
    fn default() -> Self {
        SendBuffer::new()
    }
}
