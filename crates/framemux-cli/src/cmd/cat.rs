use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

use framemux::{Stream, UnknownStreamPolicy};
use tracing::{debug, warn};

use crate::cmd::{parse_duration, CatArgs};
use crate::exit::{io_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: CatArgs) -> CliResult<i32> {
    let linger = parse_duration(&args.linger)?;
    let config = args.mux.to_config(UnknownStreamPolicy::Discard)?;
    let mux = Arc::new(args.address.connect(config)?);
    let stream = mux.stream(args.stream);

    {
        let mux = Arc::clone(&mux);
        ctrlc::set_handler(move || mux.close()).map_err(|err| {
            CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
        })?;
    }

    {
        let mux = Arc::clone(&mux);
        let stream = stream.clone();
        thread::Builder::new()
            .name("stdin".to_string())
            .spawn(move || {
                pump_stdin(&stream);
                thread::sleep(linger);
                mux.close();
            })
            .map_err(|err| io_error("failed spawning stdin thread", err))?;
    }

    let copied = copy_to(&stream, &mut io::stdout().lock())
        .map_err(|err| io_error("stream read failed", err))?;
    debug!(bytes = copied, "stream finished");
    Ok(SUCCESS)
}

fn pump_stdin(stream: &Stream) {
    match io::copy(&mut io::stdin().lock(), &mut &*stream) {
        Ok(bytes) => debug!(bytes, "stdin finished"),
        Err(err) => warn!(error = %err, "stdin copy failed"),
    }
}

/// Copy a stream to `out` until the mux ends, flushing after every read.
fn copy_to<W: Write>(stream: &Stream, out: &mut W) -> io::Result<u64> {
    let mut reader = stream;
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = io::Read::read(&mut reader, &mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        out.write_all(&buf[..n])?;
        out.flush()?;
        total += n as u64;
    }
}
