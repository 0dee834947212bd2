//! Embedis - an in-memory engine with Redis data-type semantics
//!
//! This binary is an interactive shell: it reads one command per line from
//! stdin, runs it on a single session and prints the reply the way
//! redis-cli does, or as raw RESP2 with `--resp`.

use std::io::{self, BufRead, Write};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use embedis::config::CliArgs;
use embedis::error::Result;
use embedis::protocol::serialize_resp_frame;
use embedis::{logging, Config, Engine, RespFrame, Session};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    let config = Config::from_cli(&args)?;
    logging::init(config.server.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Embedis");

    let engine = Arc::new(Engine::new(&config));
    spawn_expiry_sweeper(Arc::clone(&engine), config.server.hz);

    let mut session = Session::new(engine);
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        let argv = match split_args(&line) {
            Some(argv) if argv.is_empty() => continue,
            Some(argv) => argv,
            None => {
                write_reply(&mut stdout, Ok(RespFrame::error("ERR Invalid argument(s)")), args.resp)?;
                stdout.flush()?;
                continue;
            }
        };
        if argv[0].eq_ignore_ascii_case("quit") || argv[0].eq_ignore_ascii_case("exit") {
            break;
        }
        write_reply(&mut stdout, session.execute(&argv), args.resp)?;
        stdout.flush()?;
    }
    Ok(())
}

/// Print one reply; errors are shown as error replies
fn write_reply<W: Write>(out: &mut W, reply: Result<RespFrame>, raw: bool) -> Result<()> {
    let frame = reply.unwrap_or_else(|err| RespFrame::error(err.to_string()));
    if raw {
        serialize_resp_frame(&frame, out)
    } else {
        writeln!(out, "{}", frame)?;
        Ok(())
    }
}

/// Purge expired keys `hz` times per second
fn spawn_expiry_sweeper(engine: Arc<Engine>, hz: u32) {
    if hz == 0 {
        warn!("Active expiry disabled (hz 0)");
        return;
    }
    let period = Duration::from_millis(1000 / u64::from(hz.min(500)));
    let spawned = thread::Builder::new()
        .name("expiry".to_string())
        .spawn(move || loop {
            thread::sleep(period);
            engine.purge_expired();
        });
    if let Err(e) = spawned {
        warn!("Failed to start expiry thread: {}", e);
    }
}

/// Split a shell line into arguments. Double quotes group words and
/// support backslash escapes, single quotes are literal. `None` when a
/// quote is left open.
fn split_args(line: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            return Some(args);
        };
        let mut arg = String::new();
        match first {
            '"' => {
                chars.next();
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => match chars.next()? {
                            'n' => arg.push('\n'),
                            'r' => arg.push('\r'),
                            't' => arg.push('\t'),
                            other => arg.push(other),
                        },
                        c => arg.push(c),
                    }
                }
            }
            '\'' => {
                chars.next();
                loop {
                    match chars.next()? {
                        '\'' => break,
                        c => arg.push(c),
                    }
                }
            }
            _ => {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    arg.push(c);
                }
            }
        }
        args.push(arg);
    }
}
