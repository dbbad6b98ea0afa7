use structopt::StructOpt;

/// Options of the loopback echo run.
#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "ustack-echo")]
pub struct Config {
    /// Total number of bytes to push through the connection.
    #[structopt(short = "n", long = "total", default_value = "65536")]
    pub total_bytes: usize,

    /// Bytes handed to the stack per send call.
    #[structopt(short = "l", long = "chunk", default_value = "4096")]
    pub chunk_bytes: usize,

    /// Drive the sessions with the monotonic system clock instead of the
    /// virtual clock.
    #[structopt(long = "realtime")]
    pub realtime: bool,
}
