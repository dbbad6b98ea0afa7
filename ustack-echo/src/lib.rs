//! An echo client and server wired back to back in one process.
//!
//! Two socket sessions talk to each other through a pair of in-memory packet
//! queues: the client pushes a byte pattern, the server echoes everything it
//! reads, and the run ends with an orderly close in both directions. The
//! server side sits behind a [`SocketTable`] so the demultiplexer and reset
//! responder are exercised the way a full stack would use them.
//!
//! [`SocketTable`]: ../ustack/layer/tcp/struct.SocketTable.html

pub mod config;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use ustack::layer::{ip, Context};
use ustack::layer::tcp::{
    IsnGenerator, Message, Segment, SessionKey, SocketSession, SocketTable, State,
    TIME_WAIT_TIMEOUT,
};
use ustack::time::{sys, Duration, Instant, VirtualClock};
use ustack::wire::{Endpoint, IpAddress};

use crate::config::Config;

const CLIENT: Endpoint = Endpoint::new(IpAddress::new(10, 0, 0, 1), 35000);
const SERVER: Endpoint = Endpoint::new(IpAddress::new(10, 0, 0, 2), 7);

/// What a finished echo run looked like.
pub struct Report {
    /// Bytes pushed by the client.
    pub bytes_sent: usize,
    /// Bytes that came back and verified against the pattern.
    pub bytes_echoed: usize,
    /// Packets moved between the two sessions.
    pub segments: usize,
    /// Pump rounds until both sides were done.
    pub rounds: usize,
    /// The client's final connection state.
    pub client_state: State,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "echoed {} of {} bytes over {} segments in {} rounds, client {}",
            self.bytes_echoed, self.bytes_sent, self.segments, self.rounds, self.client_state
        )
    }
}

fn pattern(at: usize) -> u8 {
    (at % 251) as u8
}

enum Clock {
    Virtual(VirtualClock),
    System,
}

impl Clock {
    fn now(&self) -> Instant {
        match self {
            Clock::Virtual(clock) => clock.now(),
            Clock::System => sys::now().expect("monotonic clock"),
        }
    }

    fn tick(&mut self, session: &mut SocketSession, ip: &mut ip::Queue) {
        match self {
            Clock::Virtual(clock) => {
                clock.elapse(Duration::from_millis(1), |now| {
                    session.poll(&mut Context::new(now, &mut *ip))
                });
            }
            Clock::System => {
                let now = sys::now().expect("monotonic clock");
                session.poll(&mut Context::new(now, ip));
            }
        }
    }
}

/// Run the echo scenario described by `config`.
pub fn run(config: &Config) -> Result<Report, String> {
    if config.chunk_bytes == 0 {
        return Err("chunk size must be nonzero".into());
    }

    let mut clock = if config.realtime {
        Clock::System
    } else {
        Clock::Virtual(VirtualClock::new())
    };

    // one packet queue per direction
    let mut client_ip = ip::Queue::new();
    let mut server_ip = ip::Queue::new();

    let mut client = SocketSession::new(CLIENT, SERVER, IsnGenerator::new(0x1badcafe));

    let mut table = SocketTable::new();
    let mut server_key: Option<SessionKey> = None;
    let server_closing = Rc::new(Cell::new(false));

    let mut bytes_sent = 0;
    let mut bytes_echoed = 0;
    let mut segments = 0;
    let mut echo_backlog: Vec<u8> = Vec::new();
    let mut closed = false;

    client.open(&mut Context::new(clock.now(), &mut client_ip));

    let max_rounds = 64 + (config.total_bytes / config.chunk_bytes + 1) * 8;
    let mut rounds = 0;

    for round in 0..max_rounds {
        rounds = round + 1;

        // hand the client more of the pattern, as far as the stack accepts it
        while bytes_sent < config.total_bytes && !closed {
            let end = std::cmp::min(bytes_sent + config.chunk_bytes, config.total_bytes);
            let chunk: Vec<u8> = (bytes_sent..end).map(pattern).collect();
            let accepted =
                client.send(&mut Context::new(clock.now(), &mut client_ip), &chunk);
            bytes_sent += accepted;
            if accepted < chunk.len() {
                break;
            }
        }

        // client -> server
        while let Some(packet) = client_ip.pop() {
            segments += 1;
            let mut cx = Context::new(clock.now(), &mut server_ip);
            match server_key {
                None => {
                    let segment =
                        Segment::parse(packet.source, packet.destination, &packet.payload)
                            .map_err(|error| format!("client sent garbage: {}", error))?;
                    let mut session =
                        SocketSession::new(SERVER, CLIENT, IsnGenerator::new(0x00c0ffee));
                    let flag = Rc::clone(&server_closing);
                    session.set_callback(Box::new(move |message: Message| {
                        if message.contains(Message::CLOSING) {
                            flag.set(true);
                        }
                    }));
                    session.open_passive(&mut cx, segment);
                    server_key = Some(table.insert(session));
                }
                Some(_) => {
                    table.dispatch(&mut cx, packet.source, packet.destination, &packet.payload)
                }
            }
        }

        // the server echoes whatever it has read
        if let Some(key) = server_key {
            if let Some(server) = table.get_mut(key) {
                let mut buf = [0u8; 4096];
                loop {
                    let n = server.receive(&mut buf);
                    if n == 0 {
                        break;
                    }
                    echo_backlog.extend_from_slice(&buf[..n]);
                }
                if !echo_backlog.is_empty() {
                    let accepted = server
                        .send(&mut Context::new(clock.now(), &mut server_ip), &echo_backlog);
                    echo_backlog.drain(..accepted);
                }
                if server_closing.get() && echo_backlog.is_empty()
                    && server.state() == State::CloseWait
                {
                    server.close(&mut Context::new(clock.now(), &mut server_ip));
                }
            }
        }

        // server -> client
        while let Some(packet) = server_ip.pop() {
            segments += 1;
            let segment = Segment::parse(packet.source, packet.destination, &packet.payload)
                .map_err(|error| format!("server sent garbage: {}", error))?;
            client.on_segment_arrival(&mut Context::new(clock.now(), &mut client_ip), segment);
        }

        // drain and verify the echoed bytes
        let mut buf = [0u8; 4096];
        loop {
            let n = client.receive(&mut buf);
            if n == 0 {
                break;
            }
            for &byte in &buf[..n] {
                if byte != pattern(bytes_echoed) {
                    return Err(format!("echo mismatch at byte {}", bytes_echoed));
                }
                bytes_echoed += 1;
            }
        }

        // everything went around: shut the connection down
        if !closed && bytes_sent == config.total_bytes && bytes_echoed == config.total_bytes {
            client.close(&mut Context::new(clock.now(), &mut client_ip));
            closed = true;
        }

        let server_done = match server_key {
            Some(key) => table.get(key).map(|s| s.is_closed()).unwrap_or(true),
            None => false,
        };
        if closed && server_done && client_ip.is_empty() && server_ip.is_empty() {
            break;
        }

        clock.tick(&mut client, &mut client_ip);
    }

    // a closed server session has no further business in the table
    if let Some(key) = server_key {
        if table.get(key).map(|s| s.is_closed()).unwrap_or(false) {
            table.remove(key);
        }
    }

    // wait out TIME-WAIT; only the virtual clock can afford to
    if let Clock::Virtual(ref mut clock) = clock {
        if client.state() == State::TimeWait {
            clock.elapse(TIME_WAIT_TIMEOUT, |now| {
                client.poll(&mut Context::new(now, &mut client_ip))
            });
        }
    }

    if bytes_echoed != config.total_bytes {
        return Err(format!(
            "run stalled: {} of {} bytes echoed after {} rounds",
            bytes_echoed, config.total_bytes, rounds
        ));
    }

    Ok(Report {
        bytes_sent,
        bytes_echoed,
        segments,
        rounds,
        client_state: client.state(),
    })
}
