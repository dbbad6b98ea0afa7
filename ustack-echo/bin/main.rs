//! Push a byte pattern through a client and an echo server living in the
//! same process and report what the connection did.
//!
//! Call example:
//!
//! * `ustack-echo -n 1000000 -l 8192`
//! * `ustack-echo --realtime`
use structopt::StructOpt;

use ustack_echo::{config::Config, run};

fn main() {
    let config = Config::from_args();

    println!("[+] Configured sessions, echoing");

    match run(&config) {
        Ok(report) => {
            println!("[+] Done\n");
            println!("{}", report);
        }
        Err(error) => {
            eprintln!("[!] {}", error);
            std::process::exit(1);
        }
    }
}
