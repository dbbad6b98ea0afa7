//! Protocol scenarios from RFC 793, replayed under the virtual clock.
//!
//! Each test drives one subject session through an in-memory network layer;
//! the test plays the remote peer by crafting segments with its own factory
//! and inspecting what the subject puts on the wire.

use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::layer::{ip, Context};
use crate::time::{Duration, VirtualClock};
use crate::wire::{Endpoint, IpAddress, TcpFlags, TcpSeqNumber};

const SUBJECT: Endpoint = Endpoint::new(IpAddress::new(192, 168, 0, 0), 10086);
const TESTER: Endpoint = Endpoint::new(IpAddress::new(192, 168, 0, 1), 65535);

struct Harness {
    clock: VirtualClock,
    ip: ip::Queue,
    factory: SegmentFactory,
    session: SocketSession,
}

impl Harness {
    fn new() -> Self {
        Harness {
            clock: VirtualClock::new(),
            ip: ip::Queue::new(),
            factory: SegmentFactory::new(TESTER, SUBJECT),
            session: SocketSession::new(SUBJECT, TESTER, IsnGenerator::new(20191106)),
        }
    }

    fn open(&mut self) {
        let Harness { clock, ip, session, .. } = self;
        session.open(&mut Context::new(clock.now(), ip));
    }

    fn open_passive(&mut self, segment: Segment<'_>) {
        let Harness { clock, ip, session, .. } = self;
        session.open_passive(&mut Context::new(clock.now(), ip), segment);
    }

    fn reply(&mut self, segment: Segment<'_>) {
        let Harness { clock, ip, session, .. } = self;
        session.on_segment_arrival(&mut Context::new(clock.now(), ip), segment);
    }

    fn reply_syn(&mut self, seq: u32) {
        let segment = self.factory.control(TcpSeqNumber(seq), TcpFlags::SYN);
        self.reply(segment);
    }

    fn reply_flags(&mut self, seq: u32, ack: u32, flags: TcpFlags) {
        let segment = self
            .factory
            .segment(TcpSeqNumber(seq), TcpSeqNumber(ack), flags, &[]);
        self.reply(segment);
    }

    fn reply_data(&mut self, seq: u32, ack: u32, data: &[u8]) {
        let segment =
            self.factory
                .segment(TcpSeqNumber(seq), TcpSeqNumber(ack), TcpFlags::ACK, data);
        self.reply(segment);
    }

    fn send(&mut self, data: &[u8]) -> usize {
        let Harness { clock, ip, session, .. } = self;
        session.send(&mut Context::new(clock.now(), ip), data)
    }

    fn close(&mut self) {
        let Harness { clock, ip, session, .. } = self;
        session.close(&mut Context::new(clock.now(), ip));
    }

    fn elapse(&mut self, delta: Duration) {
        let Harness { clock, ip, session, .. } = self;
        clock.elapse(delta, |now| session.poll(&mut Context::new(now, &mut *ip)));
    }

    fn has_segment(&self) -> bool {
        !self.ip.is_empty()
    }

    fn pop(&mut self) -> Segment<'static> {
        let packet = self.ip.pop().expect("a segment should have been sent");
        Segment::parse(packet.source, packet.destination, &packet.payload)
            .expect("emitted segments parse")
            .into_owned()
    }

    fn drop_all(&mut self) {
        self.ip.clear();
    }

    fn record_messages(&mut self) -> Rc<RefCell<Vec<Message>>> {
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&messages);
        self.session
            .set_callback(Box::new(move |message| sink.borrow_mut().push(message)));
        messages
    }
}

fn seen(messages: &Rc<RefCell<Vec<Message>>>, message: Message) -> bool {
    messages.borrow().iter().any(|m| m.contains(message))
}

/// RFC 793, Figure 7: basic 3-way handshake, active side.
#[test]
fn client_basic_handshake() {
    let mut h = Harness::new();
    h.open();
    assert_eq!(h.session.state(), State::SynSent);

    let syn = h.pop();
    assert!(syn.is_syn() && !syn.is_ack());
    let s = syn.sequence.0;

    h.reply_flags(666, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(h.session.state(), State::Established);

    let ack = h.pop();
    assert!(ack.is_ack());
    assert_eq!(ack.sequence, TcpSeqNumber(s.wrapping_add(1)));
    assert_eq!(ack.acknowledgment, TcpSeqNumber(667));

    // an idle established connection stays quiet
    h.elapse(Duration::from_millis(3600));
    while h.has_segment() {
        let segment = h.pop();
        assert!(!segment.is_rst() && !segment.is_fin());
    }
}

/// The passive side emits exactly one SYN+ACK for the queued SYN.
#[test]
fn server_basic_handshake() {
    let mut h = Harness::new();
    let syn = h.factory.control(TcpSeqNumber(300), TcpFlags::SYN);
    h.open_passive(syn);
    assert_eq!(h.session.state(), State::SynReceived);

    let syn_ack = h.pop();
    assert!(syn_ack.is_syn() && syn_ack.is_ack());
    assert_eq!(syn_ack.acknowledgment, TcpSeqNumber(301));
    assert!(!h.has_segment());
}

/// RFC 793, Figure 8: simultaneous connection synchronization.
#[test]
fn simultaneous_open() {
    let mut h = Harness::new();
    h.open();
    let s = h.pop().sequence.0;

    h.reply_syn(300);
    assert_eq!(h.session.state(), State::SynReceived);
    let syn_ack = h.pop();
    assert!(syn_ack.is_syn() && syn_ack.is_ack());
    assert_eq!(syn_ack.acknowledgment, TcpSeqNumber(301));

    h.reply_flags(300, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(h.session.state(), State::Established);
}

/// Bytes handed over while the handshake still runs leave right after it
/// completes.
#[test]
fn data_before_established() {
    let mut h = Harness::new();
    h.open();
    assert_eq!(h.send(b"I Love U."), 9);

    let s = h.pop().sequence.0;
    h.drop_all();
    h.reply_flags(300, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);

    loop {
        let segment = h.pop();
        if segment.payload_len() > 0 {
            assert_eq!(segment.payload(), b"I Love U.");
            assert_eq!(segment.sequence, TcpSeqNumber(s.wrapping_add(1)));
            break;
        }
    }
}

/// Bulk transfer splits at the MSS and a partial acknowledgment does not
/// cause a full retransmission.
#[test]
fn send_bulk_data() {
    let mut h = Harness::new();
    h.open();
    let s = h.pop().sequence.0;
    h.drop_all();

    let data: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();
    assert_eq!(h.send(&data), 2000);

    h.reply_flags(300, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);
    h.drop_all();
    h.elapse(Duration::from_secs(1));

    let first = h.pop();
    assert_eq!(first.payload_len(), MAX_SEGMENT_SIZE);
    assert_eq!(first.payload(), &data[..MAX_SEGMENT_SIZE]);
    assert_eq!(first.sequence, TcpSeqNumber(s.wrapping_add(1)));

    // acknowledge only the first segment
    h.reply_flags(301, s.wrapping_add(1 + MAX_SEGMENT_SIZE as u32), TcpFlags::ACK);
    let rest = h.pop();
    assert_eq!(rest.payload_len(), 2000 - MAX_SEGMENT_SIZE);
    assert_eq!(rest.payload(), &data[MAX_SEGMENT_SIZE..]);
    // the 1460 bytes already acknowledged were not sent again
    while h.has_segment() {
        assert!(h.pop().payload_len() == 0);
    }
}

/// The passive side receives data and acknowledges it.
#[test]
fn server_receives_data() {
    let mut h = Harness::new();
    let syn = h.factory.control(TcpSeqNumber(300), TcpFlags::SYN);
    h.open_passive(syn);
    let s = h.pop().sequence.0;

    h.reply_data(301, s.wrapping_add(1), b"Hello");
    assert_eq!(h.session.state(), State::Established);

    let mut buf = [0u8; 32];
    assert_eq!(h.session.receive(&mut buf[..2]), 2);
    assert_eq!(&buf[..2], b"He");

    let ack = h.pop();
    assert!(ack.is_ack());
    assert_eq!(ack.acknowledgment, TcpSeqNumber(301 + 5));

    // the rest is still buffered
    assert_eq!(h.session.receive(&mut buf), 3);
    assert_eq!(&buf[..3], b"llo");
}

/// Sending on a connection that sat established for a while works the same.
#[test]
fn data_after_established() {
    let mut h = Harness::new();
    h.open();
    let s = h.pop().sequence.0;
    h.reply_flags(300, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);

    h.elapse(Duration::from_secs(3));
    h.send(b"I Love U.");

    loop {
        let segment = h.pop();
        if segment.payload_len() > 0 {
            assert_eq!(segment.payload(), b"I Love U.");
            break;
        }
    }
}

/// A full echo round trip on the active side.
#[test]
fn client_echo() {
    let mut h = Harness::new();
    let messages = h.record_messages();
    h.open();
    let s = h.pop().sequence.0;
    h.reply_flags(300, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);
    assert!(seen(&messages, Message::WRITABLE));

    h.send(b"I Love U.");
    h.drop_all();

    // everything acknowledged: nothing to say
    h.reply_flags(301, s.wrapping_add(10), TcpFlags::ACK);
    assert!(!h.has_segment());

    // the echoed bytes come back
    h.reply_data(301, s.wrapping_add(10), b"Love you too");
    assert!(seen(&messages, Message::READABLE));
    let ack = h.pop();
    assert_eq!(ack.sequence, TcpSeqNumber(s.wrapping_add(10)));
    assert_eq!(ack.acknowledgment, TcpSeqNumber(301 + 12));

    let mut buf = [0u8; 32];
    let n = h.session.receive(&mut buf);
    assert_eq!(&buf[..n], b"Love you too");
}

/// A full echo round trip on the passive side.
#[test]
fn server_echo() {
    let mut h = Harness::new();
    let syn = h.factory.control(TcpSeqNumber(300), TcpFlags::SYN);
    h.open_passive(syn);
    let s = h.pop().sequence.0;

    h.reply_data(301, s.wrapping_add(1), b"Hello");
    h.drop_all();
    h.send(b"stuvwx");
    h.elapse(Duration::from_secs(3));

    let mut found = false;
    while h.has_segment() {
        let segment = h.pop();
        assert!(!segment.is_syn());
        if segment.payload() == b"stuvwx" {
            found = true;
        }
    }
    assert!(found);
}

/// RFC 793, Figure 13: normal close, initiating side, through TIME-WAIT.
#[test]
fn normal_close_initiator() {
    let mut h = Harness::new();
    h.open();
    let s = h.pop().sequence.0;
    h.reply_flags(299, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);

    h.close();
    assert_eq!(h.session.state(), State::FinWait1);
    h.drop_all();

    h.reply_flags(300, s.wrapping_add(2), TcpFlags::ACK | TcpFlags::FIN);
    assert_eq!(h.session.state(), State::TimeWait);
    let ack = h.pop();
    assert!(ack.is_ack());
    assert_eq!(ack.sequence, TcpSeqNumber(s.wrapping_add(2)));
    assert_eq!(ack.acknowledgment, TcpSeqNumber(301));

    h.elapse(TIME_WAIT_TIMEOUT);
    assert_eq!(h.session.state(), State::Closed);
    assert!(h.session.is_closed());
}

/// Normal close, responding side, through CLOSE-WAIT and LAST-ACK.
#[test]
fn normal_close_responder() {
    let mut h = Harness::new();
    let messages = h.record_messages();
    h.open();
    let s = h.pop().sequence.0;
    h.reply_flags(99, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);

    h.reply_flags(100, s.wrapping_add(1), TcpFlags::ACK | TcpFlags::FIN);
    assert_eq!(h.session.state(), State::CloseWait);
    assert!(seen(&messages, Message::CLOSING));

    h.close();
    assert_eq!(h.session.state(), State::LastAck);

    h.reply_flags(101, s.wrapping_add(2), TcpFlags::ACK);
    assert_eq!(h.session.state(), State::Closed);
    assert!(seen(&messages, Message::CLOSED));
}

/// The fixed RTO resends exactly the unacknowledged bytes, go-back-N style.
#[test]
fn retransmission_timeout() {
    let mut h = Harness::new();
    h.open();
    let s = h.pop().sequence.0;
    h.reply_flags(666, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);
    h.drop_all();

    let data = [0x5a; 100];
    assert_eq!(h.send(&data), 100);
    let sent = h.pop();
    assert_eq!(sent.payload(), &data[..]);
    assert_eq!(h.session.bytes_in_flight(), 100);
    h.drop_all();

    // nothing acknowledged: the timeout resends from unack
    h.elapse(RETRANSMISSION_TIMEOUT);
    let resent = h.pop();
    assert_eq!(resent.sequence, TcpSeqNumber(s.wrapping_add(1)));
    assert_eq!(resent.payload(), &data[..]);
    assert_eq!(h.session.bytes_in_flight(), 100);

    // once acknowledged the timer falls silent
    h.reply_flags(667, s.wrapping_add(101), TcpFlags::ACK);
    h.drop_all();
    h.elapse(Duration::from_secs(5));
    assert!(!h.has_segment());
}

/// An arrived RST tears the connection down and surfaces as RESET.
#[test]
fn reset_aborts() {
    let mut h = Harness::new();
    let messages = h.record_messages();
    h.open();
    let s = h.pop().sequence.0;
    h.reply_flags(300, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(h.session.state(), State::Established);

    h.reply_flags(301, s.wrapping_add(1), TcpFlags::RST);
    assert_eq!(h.session.state(), State::Closed);
    assert!(seen(&messages, Message::RESET));

    // a dead connection stays quiet
    h.drop_all();
    h.elapse(Duration::from_secs(3));
    assert!(!h.has_segment());
}

/// A bare ACK arriving at a listener is answered with a reset.
#[test]
fn listen_answers_bare_ack_with_reset() {
    let mut h = Harness::new();
    let stray = h
        .factory
        .segment(TcpSeqNumber(50), TcpSeqNumber(90), TcpFlags::ACK, &[]);
    h.open_passive(stray);
    assert_eq!(h.session.state(), State::Listen);

    let rst = h.pop();
    assert!(rst.is_rst());
    assert_eq!(rst.sequence, TcpSeqNumber(90));
    assert!(!h.has_segment());
}

/// Stale duplicates are dropped without disturbing the receive cursor.
#[test]
fn stale_duplicate_discarded() {
    let mut h = Harness::new();
    let syn = h.factory.control(TcpSeqNumber(300), TcpFlags::SYN);
    h.open_passive(syn);
    let s = h.pop().sequence.0;

    h.reply_data(301, s.wrapping_add(1), b"abcde");
    h.drop_all();

    // the same segment again: no data may be duplicated, no ack generated
    h.reply_data(301, s.wrapping_add(1), b"abcde");
    assert!(!h.has_segment());

    // a straddling retransmission delivers only the new tail
    h.reply_data(303, s.wrapping_add(1), b"cdefg");
    let ack = h.pop();
    assert_eq!(ack.acknowledgment, TcpSeqNumber(301 + 7));

    let mut buf = [0u8; 16];
    let n = h.session.receive(&mut buf);
    assert_eq!(&buf[..n], b"abcdefg");
}

/// A second close during the closing handshake is a contract violation.
#[test]
#[should_panic(expected = "connection closing")]
fn close_while_closing_is_fatal() {
    let mut h = Harness::new();
    h.open();
    let s = h.pop().sequence.0;
    h.reply_flags(300, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);
    h.close();
    h.close();
}

/// A close before anything was ever open produces no wire traffic.
#[test]
fn close_unopened_connection() {
    let mut h = Harness::new();
    h.open();
    h.drop_all();
    assert_eq!(h.session.state(), State::SynSent);
    h.close();
    assert_eq!(h.session.state(), State::Closed);
    assert!(!h.has_segment());
}

/// A full send buffer reports backpressure, and an acknowledgment makes the
/// writer runnable again.
#[test]
fn send_buffer_backpressure() {
    let mut h = Harness::new();
    let messages = h.record_messages();
    h.open();
    let s = h.pop().sequence.0;
    h.reply_flags(300, s.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK);
    h.drop_all();

    // 256 KiB fit, the rest reports backpressure
    let chunk = vec![0u8; 300_000];
    assert_eq!(h.send(&chunk), 256 * 1024);
    assert_eq!(h.send(&chunk), 0);

    // acknowledging in-flight data frees buffer space
    h.drop_all();
    h.reply_flags(301, s.wrapping_add(1 + MAX_BYTES_IN_FLIGHT as u32), TcpFlags::ACK);
    assert!(seen(&messages, Message::WRITABLE));
    assert!(h.send(&chunk) > 0);
}

/// The socket table routes by address pair and resets strangers.
#[test]
fn socket_table_dispatch() {
    let mut clock = VirtualClock::new();
    let mut ip = ip::Queue::new();
    let mut table = SocketTable::new();

    let key = table.insert(SocketSession::new(SUBJECT, TESTER, IsnGenerator::new(7)));
    table
        .get_mut(key)
        .unwrap()
        .open(&mut Context::new(clock.now(), &mut ip));
    let syn = ip.pop().expect("SYN leaves first");
    let s = Segment::parse(syn.source, syn.destination, &syn.payload)
        .unwrap()
        .sequence
        .0;

    // the peer's answer reaches the right session
    let tester = SegmentFactory::new(TESTER, SUBJECT);
    let mut packet = [0u8; MAX_PACKET_LEN];
    let len = tester
        .segment(
            TcpSeqNumber(300),
            TcpSeqNumber(s.wrapping_add(1)),
            TcpFlags::SYN | TcpFlags::ACK,
            &[],
        )
        .emit(&mut packet);
    table.dispatch(
        &mut Context::new(clock.now(), &mut ip),
        TESTER.addr,
        SUBJECT.addr,
        &packet[..len],
    );
    assert_eq!(table.get(key).unwrap().state(), State::Established);

    // a packet for an address pair nobody owns draws a reset
    ip.clear();
    let stranger = SegmentFactory::new(
        Endpoint::new(TESTER.addr, 4242),
        Endpoint::new(SUBJECT.addr, 10086),
    );
    let len = stranger
        .segment(TcpSeqNumber(11), TcpSeqNumber(77), TcpFlags::ACK, &[])
        .emit(&mut packet);
    table.dispatch(
        &mut Context::new(clock.now(), &mut ip),
        TESTER.addr,
        SUBJECT.addr,
        &packet[..len],
    );
    let reset = ip.pop().expect("unknown connections are reset");
    let reset = Segment::parse(reset.source, reset.destination, &reset.payload).unwrap();
    assert!(reset.is_rst());
    assert_eq!(reset.sequence, TcpSeqNumber(77));
    assert_eq!(reset.source.port, 10086);
    assert_eq!(reset.destination.port, 4242);

    // but a reset itself is never answered
    let len = stranger
        .control(TcpSeqNumber(12), TcpFlags::RST)
        .emit(&mut packet);
    table.dispatch(
        &mut Context::new(clock.now(), &mut ip),
        TESTER.addr,
        SUBJECT.addr,
        &packet[..len],
    );
    assert!(ip.is_empty());
}

/// A removed session leaves its slot reusable.
#[test]
fn socket_table_slots() {
    let mut table = SocketTable::new();
    let a = table.insert(SocketSession::new(SUBJECT, TESTER, IsnGenerator::new(1)));
    let b = table.insert(SocketSession::new(
        Endpoint::new(SUBJECT.addr, 2000),
        TESTER,
        IsnGenerator::new(2),
    ));
    assert_ne!(a, b);

    assert!(table.remove(a).is_some());
    assert!(table.get(a).is_none());
    let c = table.insert(SocketSession::new(SUBJECT, TESTER, IsnGenerator::new(3)));
    assert_eq!(a, c);
    assert!(table.get(b).is_some());
}
