use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use framemux::{Mux, MuxError, Stream, UnknownStreamPolicy};
use tracing::{debug, info, warn};

use crate::cmd::EchoArgs;
use crate::endpoint::Listener;
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};

/// How often the accept loops re-check for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let config = args.mux.to_config(UnknownStreamPolicy::Lazy)?;
    let listener = Listener::bind(&args.address)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let Some(mux) = listener.accept(config.clone())? else {
            thread::sleep(POLL_INTERVAL);
            continue;
        };

        serve(&mux, &running);
        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

/// Echo every stream the peer opens until the connection ends.
fn serve(mux: &Mux, running: &AtomicBool) {
    let mut workers = Vec::new();

    while running.load(Ordering::SeqCst) {
        match mux.accept_timeout(POLL_INTERVAL) {
            Ok(stream) => {
                let stream_id = stream.id();
                info!(stream_id, "peer opened stream");
                let spawned = thread::Builder::new()
                    .name(format!("echo-{stream_id}"))
                    .spawn(move || echo_stream(stream));
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(err) => warn!(stream_id, error = %err, "failed spawning echo worker"),
                }
            }
            Err(MuxError::Timeout(_)) => continue,
            Err(err) if err.is_clean_close() => {
                info!("connection closed");
                break;
            }
            Err(err) => {
                warn!(error = %err, "connection failed");
                break;
            }
        }
    }

    mux.close();
    for worker in workers {
        let _ = worker.join();
    }
}

/// Copy a stream back onto itself. Returns the number of bytes echoed.
fn echo_stream(stream: Stream) -> u64 {
    match io::copy(&mut &stream, &mut &stream) {
        Ok(bytes) => {
            debug!(stream_id = stream.id(), bytes, "stream finished");
            bytes
        }
        Err(err) => {
            warn!(stream_id = stream.id(), error = %err, "echo stopped");
            0
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    use framemux::MuxConfig;

    use super::*;

    #[test]
    fn echo_stream_returns_bytes_until_peer_closes() {
        let (left, right) = UnixStream::pair().unwrap();
        let server = Mux::with_config(
            left,
            MuxConfig::default().with_unknown_stream_policy(UnknownStreamPolicy::Lazy),
        )
        .unwrap();
        let client = Mux::new(right).unwrap();

        let mut stream = client.stream(4);
        stream.write_all(b"ping").unwrap();

        let accepted = server.accept_timeout(Duration::from_secs(5)).unwrap();
        let worker = thread::spawn(move || echo_stream(accepted));

        let mut echoed = [0u8; 4];
        stream.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"ping");

        drop(stream);
        drop(client);
        assert_eq!(worker.join().unwrap(), 4);
    }

    #[test]
    fn serve_returns_when_peer_disconnects() {
        let (left, right) = UnixStream::pair().unwrap();
        let server = Mux::with_config(
            left,
            MuxConfig::default().with_unknown_stream_policy(UnknownStreamPolicy::Lazy),
        )
        .unwrap();
        let client = Mux::new(right).unwrap();
        client.stream(1).write(b"x").unwrap();

        let running = AtomicBool::new(true);
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(client);
        });
        serve(&server, &running);
        closer.join().unwrap();
        assert!(server.is_terminated());
    }
}
