use core::fmt;
use core::ops;

use super::{
    ControlBlock, IsnGenerator, Segment, SegmentFactory, SendBuffer, MAX_SEGMENT_SIZE,
    TIME_WAIT_TIMEOUT,
};
use crate::layer::Context;
use crate::storage::RingBuffer;
use crate::time::{Alarm, Expiration};
use crate::wire::{Endpoint, TcpFlags, TcpSeqNumber};

const RECEIVE_BUFFER_SIZE: usize = MAX_SEGMENT_SIZE * 10;

/// The connection states of RFC 793 section 3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for a connection request. Entered transiently by a passive
    /// open.
    Listen,
    /// Our SYN is out, nothing heard from the peer yet.
    SynSent,
    /// The peer's SYN has arrived, our SYN is not yet acknowledged.
    SynReceived,
    /// The handshake has completed in both directions.
    Established,
    /// We closed first; our FIN is not yet acknowledged.
    FinWait1,
    /// Our FIN is acknowledged, waiting for the peer's.
    FinWait2,
    /// The peer closed first; we have not closed yet.
    CloseWait,
    /// Both sides closed simultaneously; waiting for our FIN's
    /// acknowledgment.
    Closing,
    /// The peer closed after us; waiting for the final acknowledgment.
    LastAck,
    /// Fully closed, lingering so late segments die out.
    TimeWait,
    /// No connection. Both the initial and the terminal state.
    Closed,
}

impl Default for State {
    fn default() -> Self {
        State::Closed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Transport events posted to the socket interface, as a bitmask.
///
/// A blocked socket call wakes on a message, re-checks its condition and
/// either proceeds or waits again; several bits may be set in one
/// notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Message(pub u16);

impl Message {
    /// Received data is ready to be read.
    pub const READABLE: Message = Message(0x001);
    /// Send buffer space has become available.
    pub const WRITABLE: Message = Message(0x002);
    /// Our close has been acknowledged; the connection is gone.
    pub const CLOSED: Message = Message(0x004);
    /// The peer closed its half of the connection (its FIN arrived).
    pub const CLOSING: Message = Message(0x008);
    /// The connection was reset.
    pub const RESET: Message = Message(0x010);
    /// The connection attempt was refused.
    pub const REFUSED: Message = Message(0x020);
    /// No such connection exists.
    pub const NOTEXIST: Message = Message(0x040);
    /// The connection is shutting down and takes no further requests.
    pub const NOSERVICE: Message = Message(0x080);

    /// Whether every bit of `other` is set in `self`.
    pub fn contains(&self, other: Message) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for Message {
    type Output = Message;

    fn bitor(self, rhs: Message) -> Message {
        Message(self.0 | rhs.0)
    }
}

/// The notification interface a socket session posts [`Message`]s through.
///
/// The socket layer above implements this to wake blocked callers; in the
/// single-threaded tests a closure collecting messages does the same job,
/// through the blanket implementation for `FnMut(Message)`.
///
/// [`Message`]: struct.Message.html
pub trait Callback {
    /// Deliver one notification bitmask.
    fn on_message(&mut self, message: Message);
}

impl<F: FnMut(Message)> Callback for F {
    fn on_message(&mut self, message: Message) {
        self(message)
    }
}

/// One TCP connection: the RFC 793 state machine.
///
/// A session is created around its address pair and brought to life either
/// actively, where [`open`] sends a SYN, or passively, handing the peer's
/// SYN to [`open_passive`]. From then on the network layer feeds inbound segments
/// into [`on_segment_arrival`], the socket interface moves bytes with
/// [`send`] and [`receive`] and eventually calls [`close`], and the driving
/// clock keeps [`poll`]ing so retransmission and TIME-WAIT expiry happen.
///
/// All per-connection state lives here, owned exactly once: the control
/// block, the segment factory, the send buffer and the receive buffer. The
/// session is single-threaded by construction; the runtime above serializes
/// calls into it.
///
/// [`open`]: #method.open
/// [`open_passive`]: #method.open_passive
/// [`on_segment_arrival`]: #method.on_segment_arrival
/// [`send`]: #method.send
/// [`receive`]: #method.receive
/// [`close`]: #method.close
/// [`poll`]: #method.poll
pub struct SocketSession {
    tcb: ControlBlock,
    state: State,
    factory: SegmentFactory,
    send_buffer: SendBuffer,
    receive_buffer: RingBuffer,
    time_wait_alarm: Alarm,
    isn_generator: IsnGenerator,
    callback: Option<Box<dyn Callback>>,
}

impl SocketSession {
    /// Create a closed session for the given address pair.
    pub fn new(local: Endpoint, remote: Endpoint, isn_generator: IsnGenerator) -> Self {
        SocketSession {
            tcb: ControlBlock::default(),
            state: State::Closed,
            factory: SegmentFactory::new(local, remote),
            send_buffer: SendBuffer::new(),
            receive_buffer: RingBuffer::new(RECEIVE_BUFFER_SIZE),
            time_wait_alarm: Alarm::new(),
            isn_generator,
            callback: None,
        }
    }

    /// Register the notification sink for transport events.
    pub fn set_callback(&mut self, callback: Box<dyn Callback>) {
        self.callback = Some(callback);
    }

    /// The current connection state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the connection has fully terminated.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// The local endpoint of the connection.
    pub fn local_endpoint(&self) -> Endpoint {
        self.factory.local_endpoint()
    }

    /// The remote endpoint of the connection.
    pub fn remote_endpoint(&self) -> Endpoint {
        self.factory.remote_endpoint()
    }

    /// The number of bytes sent but not yet acknowledged.
    pub fn bytes_in_flight(&self) -> usize {
        self.send_buffer.bytes_in_flight()
    }

    /// Actively open the connection (RFC 793 section 3.9, OPEN call).
    ///
    /// Chooses an initial sequence number and sends the SYN.
    ///
    /// # Panics
    /// The connection must be closed; opening twice is a programming error
    /// in the socket layer.
    pub fn open(&mut self, cx: &mut Context) {
        assert!(self.state == State::Closed, "already open");

        let initial = self.isn_generator.generate();
        self.send_buffer.send_syn(cx, &mut self.tcb, &self.factory, initial);
        self.set_state(State::SynSent);
    }

    /// Passively open the connection on the peer's SYN.
    ///
    /// Enters LISTEN and immediately dispatches `segment` as if it had
    /// arrived there; a SYN answers with SYN+ACK and moves to SYN-RECEIVED.
    ///
    /// # Panics
    /// The connection must be closed, as for [`open`].
    ///
    /// [`open`]: #method.open
    pub fn open_passive(&mut self, cx: &mut Context, segment: Segment<'_>) {
        assert!(self.state == State::Closed, "already open");

        self.set_state(State::Listen);
        self.on_segment_arrival(cx, segment);
    }

    /// Dispatch one arrived segment through the state machine (RFC 793
    /// section 3.9, SEGMENT ARRIVES).
    pub fn on_segment_arrival(&mut self, cx: &mut Context, segment: Segment<'_>) {
        net_trace!("<- {}", segment);

        match self.state {
            State::Closed => self.arrives_closed(cx, segment),
            State::Listen => self.arrives_listen(cx, segment),
            State::SynSent => self.arrives_syn_sent(cx, segment),
            _ => self.arrives_otherwise(cx, segment),
        }
    }

    /// A closed connection answers everything except resets with a reset
    /// (RFC 793, Reset Generation, group 1).
    fn arrives_closed(&mut self, cx: &mut Context, segment: Segment<'_>) {
        if segment.is_rst() {
            return;
        }

        let reply = if segment.is_ack() {
            self.factory.control(segment.acknowledgment, TcpFlags::RST)
        } else {
            self.factory.segment(
                TcpSeqNumber(0),
                segment.sequence + segment.payload_len(),
                TcpFlags::RST | TcpFlags::ACK,
                &[],
            )
        };
        self.send_buffer.send_segment(cx, &reply);
    }

    fn arrives_listen(&mut self, cx: &mut Context, segment: Segment<'_>) {
        if segment.is_rst() {
            return;
        }

        if segment.is_ack() {
            // nothing has been sent from here that could be acknowledged
            let reply = self.factory.control(segment.acknowledgment, TcpFlags::RST);
            self.send_buffer.send_segment(cx, &reply);
            return;
        }

        if segment.is_syn() {
            // security/compartment and precedence checks of RFC 793 section
            // 3.6 are not implemented
            self.tcb.receive.syn_received = true;
            self.tcb.receive.next = segment.sequence + 1;
            self.tcb.receive.initial = segment.sequence;

            let initial = self.isn_generator.generate();
            self.send_buffer.send_syn(cx, &mut self.tcb, &self.factory, initial);
            self.set_state(State::SynReceived);
        }
    }

    fn arrives_syn_sent(&mut self, cx: &mut Context, segment: Segment<'_>) {
        if segment.is_rst() {
            self.reset();
            return;
        }

        if segment.is_syn() && segment.is_ack() {
            let acks_our_syn = self
                .tcb
                .send
                .greater_than(segment.acknowledgment, self.tcb.send.initial)
                && self.tcb.send.less_or_equal(segment.acknowledgment, self.tcb.send.next);
            if !acks_our_syn {
                // a stray from an old incarnation
                return;
            }

            self.tcb.receive.syn_received = true;
            self.tcb.receive.initial = segment.sequence;
            self.tcb.receive.next = segment.sequence + 1;
            self.send_buffer
                .acknowledge(cx, &mut self.tcb, &self.factory, segment.acknowledgment);
            self.set_state(State::Established);

            let ack = self
                .factory
                .segment(self.tcb.send.next, self.tcb.receive.next, TcpFlags::ACK, &[]);
            self.send_buffer.send_segment(cx, &ack);
            self.signal(Message::WRITABLE);

            // data buffered while the handshake ran can go out now
            self.send_buffer.transmit(cx, &mut self.tcb, &self.factory);
            return;
        }

        if segment.is_syn() {
            // simultaneous open: answer the peer's SYN, ours is still
            // unacknowledged
            self.tcb.receive.syn_received = true;
            self.tcb.receive.initial = segment.sequence;
            self.tcb.receive.next = segment.sequence + 1;
            self.send_buffer.transmit(cx, &mut self.tcb, &self.factory);
            self.set_state(State::SynReceived);
        }
    }

    /// Arrival processing common to every synchronized state.
    ///
    /// Stale duplicates are discarded up front; the rest is processed in
    /// `SEG.SEQ` order: acknowledgment first, then payload, then FIN.
    fn arrives_otherwise(&mut self, cx: &mut Context, segment: Segment<'_>) {
        if segment.is_rst() {
            self.reset();
            return;
        }

        if self.state == State::SynReceived {
            if segment.is_ack()
                && self.tcb.send.greater_than(segment.acknowledgment, self.tcb.send.initial)
            {
                self.send_buffer
                    .acknowledge(cx, &mut self.tcb, &self.factory, segment.acknowledgment);
                self.set_state(State::Established);
                self.signal(Message::WRITABLE);
                // data buffered while the handshake ran can go out now
                self.send_buffer.transmit(cx, &mut self.tcb, &self.factory);
            } else {
                return;
            }
        } else if segment.is_ack() {
            let ack = segment.acknowledgment;
            let valid = self.tcb.send.greater_or_equal(ack, self.tcb.send.unack)
                && self.tcb.send.less_or_equal(ack, self.tcb.send.next);
            if valid {
                let freed =
                    self.send_buffer
                        .acknowledge(cx, &mut self.tcb, &self.factory, ack);
                if freed > 0 {
                    self.signal(Message::WRITABLE);
                }

                if self.send_buffer.fin_acked() {
                    match self.state {
                        State::FinWait1 => self.set_state(State::FinWait2),
                        State::Closing => self.enter_time_wait(cx),
                        State::LastAck => {
                            self.set_state(State::Closed);
                            self.signal(Message::CLOSED);
                        }
                        _ => {}
                    }
                }
            } else {
                net_debug!("acknowledgment out of window, dropped");
            }
        }

        self.process_payload(cx, &segment);

        if segment.is_fin() {
            self.process_fin(cx, &segment);
        }
    }

    fn process_payload(&mut self, cx: &mut Context, segment: &Segment<'_>) {
        let payload = segment.payload();
        if payload.is_empty() {
            return;
        }
        match self.state {
            State::Established | State::FinWait1 | State::FinWait2 => {}
            // the peer already promised no more data with its FIN
            _ => return,
        }

        let sequence = segment.sequence;
        let end = sequence + payload.len();
        if self.tcb.receive.less_or_equal(end, self.tcb.receive.next) {
            // an old duplicate, wholly below the receive cursor
            net_debug!("stale segment dropped");
            return;
        }
        if self.tcb.receive.greater_than(sequence, self.tcb.receive.next) {
            // a hole precedes this segment; the retransmission machinery on
            // the far side will close it
            net_debug!("out of order segment dropped");
            return;
        }

        // take only the part beyond what was already received
        let offset = self.tcb.receive.next - sequence;
        let written = self.receive_buffer.write(&payload[offset..]);
        self.tcb.receive.next += written;

        if written > 0 {
            let ack = self
                .factory
                .segment(self.tcb.send.next, self.tcb.receive.next, TcpFlags::ACK, &[]);
            self.send_buffer.send_segment(cx, &ack);
            self.signal(Message::READABLE);
        }
    }

    fn process_fin(&mut self, cx: &mut Context, segment: &Segment<'_>) {
        // the FIN occupies the sequence slot after its payload; it counts
        // only once everything before it has been received
        let fin_seq = segment.sequence + segment.payload_len();
        if !self.tcb.receive.equal(fin_seq, self.tcb.receive.next) {
            return;
        }

        self.tcb.receive.next += 1;
        let ack = self
            .factory
            .segment(self.tcb.send.next, self.tcb.receive.next, TcpFlags::ACK, &[]);
        self.send_buffer.send_segment(cx, &ack);
        self.signal(Message::CLOSING);

        match self.state {
            State::Established => self.set_state(State::CloseWait),
            State::FinWait1 => {
                if self.send_buffer.fin_acked() {
                    self.enter_time_wait(cx);
                } else {
                    // simultaneous close
                    self.set_state(State::Closing);
                }
            }
            State::FinWait2 => self.enter_time_wait(cx),
            _ => {}
        }
    }

    /// Hand bytes to the send buffer (RFC 793 section 3.9, SEND call).
    ///
    /// Returns how many bytes were accepted, possibly fewer than offered. A
    /// return of zero signals backpressure: the caller waits for a
    /// [`Message::WRITABLE`] notification and retries. Bytes handed over
    /// before the handshake finishes are buffered and leave once it does.
    ///
    /// [`Message::WRITABLE`]: struct.Message.html#associatedconstant.WRITABLE
    pub fn send(&mut self, cx: &mut Context, data: &[u8]) -> usize {
        match self.state {
            State::SynSent | State::SynReceived | State::Established | State::CloseWait => self
                .send_buffer
                .send_data(cx, &mut self.tcb, &self.factory, data),
            _ => 0,
        }
    }

    /// Copy received bytes out of the receive buffer (RFC 793 section 3.9,
    /// RECEIVE call).
    ///
    /// Returns the number of bytes copied. Zero means nothing is buffered
    /// right now, never end of stream; the end of the stream arrives
    /// separately as a [`Message::CLOSING`] notification.
    ///
    /// [`Message::CLOSING`]: struct.Message.html#associatedconstant.CLOSING
    pub fn receive(&mut self, data: &mut [u8]) -> usize {
        self.receive_buffer.read(data)
    }

    /// Close this side of the connection (RFC 793 section 3.9, CLOSE call).
    ///
    /// A connection that never completed its handshake drops straight to
    /// CLOSED without wire traffic; an established one sends its FIN and
    /// walks the closing handshake.
    ///
    /// # Panics
    /// Calling `close` again while the closing handshake runs is a
    /// programming error in the socket layer.
    pub fn close(&mut self, cx: &mut Context) {
        match self.state {
            State::Closed | State::Listen | State::SynSent => {
                // disarm a still pending SYN retransmission
                self.send_buffer.abort();
                self.set_state(State::Closed);
            }

            State::SynReceived | State::Established => {
                self.send_buffer.send_fin(cx, &mut self.tcb, &self.factory);
                self.set_state(State::FinWait1);
            }

            State::CloseWait => {
                self.send_buffer.send_fin(cx, &mut self.tcb, &self.factory);
                self.set_state(State::LastAck);
            }

            State::FinWait1
            | State::FinWait2
            | State::Closing
            | State::LastAck
            | State::TimeWait => panic!("connection closing"),
        }
    }

    /// Fire any alarms that have come due and report the next deadline.
    ///
    /// The driving clock, live loop or virtual, calls this whenever time
    /// passed.
    pub fn poll(&mut self, cx: &mut Context) -> Expiration {
        self.send_buffer.poll(cx, &mut self.tcb, &self.factory);
        if self.time_wait_alarm.fire(cx.now) {
            // 2MSL passed without traffic
            self.set_state(State::Closed);
        }
        self.next_expiry()
    }

    /// The earliest pending alarm deadline of this connection.
    pub fn next_expiry(&self) -> Expiration {
        core::cmp::min(self.send_buffer.next_expiry(), self.time_wait_alarm.deadline())
    }

    fn enter_time_wait(&mut self, cx: &mut Context) {
        self.set_state(State::TimeWait);
        self.time_wait_alarm.set(cx.now + TIME_WAIT_TIMEOUT);
    }

    /// Abort on an arrived RST.
    fn reset(&mut self) {
        net_debug!("connection reset by peer");
        self.send_buffer.abort();
        self.time_wait_alarm.cancel();
        self.set_state(State::Closed);
        self.signal(Message::RESET);
    }

    fn set_state(&mut self, state: State) {
        net_trace!("{} -> {}", self.state, state);
        self.state = state;
    }

    /// Tell the socket interface something happened down here.
    fn signal(&mut self, message: Message) {
        if let Some(callback) = self.callback.as_mut() {
            callback.on_message(message);
        }
    }
}

impl fmt::Debug for SocketSession {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SocketSession")
            .field("local", &self.local_endpoint())
            .field("remote", &self.remote_endpoint())
            .field("state", &self.state)
            .finish()
    }
}
