//! TCP echo: one connection, several streams, each echoed independently.
//!
//! Run with:
//!   cargo run --example tcp-echo

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use framemux::{Mux, MuxConfig, Stream, UnknownStreamPolicy};

fn echo(mut stream: Stream) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(n) => {
                if let Err(err) = stream.write_all(&buf[..n]) {
                    eprintln!("[server] stream {} write failed: {err}", stream.id());
                    return;
                }
            }
            Err(err) => {
                eprintln!("[server] stream {} done: {err}", stream.id());
                return;
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::level_filters::LevelFilter::DEBUG)
        .init();

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    eprintln!("Listening on {addr}");

    let server = thread::spawn(
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let (conn, peer) = listener.accept()?;
            eprintln!("[server] connection from {peer}");
            let config =
                MuxConfig::default().with_unknown_stream_policy(UnknownStreamPolicy::Lazy);
            let mux = Mux::with_config(conn, config)?;

            let mut workers = Vec::new();
            while let Ok(stream) = mux.accept() {
                eprintln!("[server] peer opened stream {}", stream.id());
                workers.push(thread::spawn(move || echo(stream)));
            }
            eprintln!("[server] mux ended: {:?}", mux.termination());
            drop(mux);
            for worker in workers {
                let _ = worker.join();
            }
            Ok(())
        },
    );

    let mux = Mux::new(TcpStream::connect(addr)?)?;
    for (id, message) in [(1u8, "alpha"), (2, "beta"), (3, "gamma")] {
        let mut stream = mux.stream(id);
        stream.write_all(message.as_bytes())?;

        let mut echoed = vec![0u8; message.len()];
        stream.read_exact(&mut echoed)?;
        eprintln!(
            "[client] stream {id} echoed: {}",
            String::from_utf8_lossy(&echoed)
        );
    }
    drop(mux);

    server
        .join()
        .map_err(|_| "server thread panicked")?
        .map_err(|err| err.to_string())?;
    Ok(())
}
