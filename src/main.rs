//! respio: pipeline RESP commands to a server and print the replies.
//!
//! Exercises the whole transport path:
//! - off-heap buffer budget and allocator selection
//! - dial with connect, read and write timeouts
//! - batched encoding through `FlushEncoder`
//! - decoding every reply

mod config;

use config::Config;
use respio::buffer;
use respio::protocols::resp::Frame;
use respio::runtime::{Connection, ReadHalf, WriteHalf};
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Commands sent ahead of their replies before stopping to read them.
const MAX_IN_FLIGHT: usize = 128;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    buffer::install_global(config.allocator.strategy())?;
    buffer::set_max_offheap_bytes(config.max_offheap_bytes);
    buffer::set_min_offheap_slice(config.min_offheap_slice);

    info!(
        address = %config.address,
        allocator = ?config.allocator,
        max_offheap_bytes = config.max_offheap_bytes,
        repeat = config.repeat,
        "Starting respio"
    );

    let mut conn = Connection::dial(
        config.address.as_str(),
        config.dial_timeout,
        config.read_buffer_size,
        config.write_buffer_size,
    )?;
    conn.set_read_timeout(config.read_timeout);
    conn.set_write_timeout(config.write_timeout);
    conn.set_keepalive_period(config.keepalive)?;

    // One command per positional argument, split on whitespace.
    let commands: Vec<Vec<Frame>> = config
        .command
        .iter()
        .map(|line| {
            line.split_whitespace()
                .map(|word| Frame::bulk(word.to_owned()))
                .collect::<Vec<_>>()
        })
        .filter(|command| !command.is_empty())
        .collect();

    let (mut rd, mut wr) = conn.into_split();
    let batching = Batching {
        repeat: config.repeat,
        max_buffered: config.max_buffered,
        max_interval: config.max_interval,
    };
    let replies = pipeline(&mut rd, &mut wr, &commands, &batching, &mut io::stdout().lock())?;

    debug!(replies, offheap_bytes = buffer::offheap_bytes(), "done");
    wr.close();
    Ok(())
}

/// How `pipeline` batches its writes.
struct Batching {
    repeat: usize,
    max_buffered: usize,
    max_interval: Duration,
}

/// Send `commands` `repeat` times through a `FlushEncoder`, writing each
/// reply to `out`. At most `MAX_IN_FLIGHT` commands go unanswered before
/// their replies are read. Returns the number of replies.
fn pipeline<W: Write>(
    rd: &mut ReadHalf,
    wr: &mut WriteHalf,
    commands: &[Vec<Frame>],
    batching: &Batching,
    out: &mut W,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut fe = wr
        .flush_encoder()
        .with_max_buffered(batching.max_buffered)
        .with_max_interval(batching.max_interval);
    let mut in_flight = 0;
    let mut replies = 0;
    for _ in 0..batching.repeat {
        for command in commands {
            fe.encode_multi_bulk(command)?;
            fe.flush(false)?;
            in_flight += 1;
            if in_flight >= MAX_IN_FLIGHT {
                fe.flush(true)?;
                replies += read_replies(rd, &mut in_flight, out)?;
            }
        }
    }
    fe.flush(true)?;
    replies += read_replies(rd, &mut in_flight, out)?;
    Ok(replies)
}

fn read_replies<W: Write>(
    rd: &mut ReadHalf,
    in_flight: &mut usize,
    out: &mut W,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut n = 0;
    while *in_flight > 0 {
        let reply = rd.decode()?;
        writeln!(out, "{reply}")?;
        *in_flight -= 1;
        n += 1;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use respio::runtime::listen;
    use std::thread;

    #[test]
    fn test_pipeline_reads_replies_while_sending() {
        const COMMANDS: usize = 2000;
        const REPLY_LEN: usize = 16 * 1024;

        // Answers every command with a large bulk, so unread replies would
        // fill both socket buffers long before the last command is sent.
        let listener = listen("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut conn = Connection::new(stream, 0, 0).unwrap();
            conn.set_write_timeout(Duration::from_secs(10));
            let reply = Frame::bulk(vec![b'r'; REPLY_LEN]);
            while conn.decode_multi_bulk().is_ok() {
                if conn.encode(&reply, true).is_err() {
                    break;
                }
            }
        });

        let mut conn = Connection::dial(addr, Duration::from_secs(1), 0, 0).unwrap();
        conn.set_read_timeout(Duration::from_secs(10));
        conn.set_write_timeout(Duration::from_secs(10));
        let (mut rd, mut wr) = conn.into_split();
        let commands = vec![vec![Frame::bulk("GET"), Frame::bulk("k")]];
        let batching = Batching {
            repeat: COMMANDS,
            max_buffered: 16,
            max_interval: Duration::from_millis(1),
        };
        let mut out = Vec::new();
        let replies = pipeline(&mut rd, &mut wr, &commands, &batching, &mut out).unwrap();
        assert_eq!(replies, COMMANDS);
        assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), COMMANDS);

        wr.close();
        server.join().unwrap();
    }
}
