use std::time::Duration;

use clap::{Args, Subcommand};
use framemux::{MuxConfig, StreamId, UnknownStreamPolicy};
use framemux_frame::DEFAULT_MAX_PAYLOAD;

use crate::endpoint::Endpoint;
use crate::exit::{mux_error, CliError, CliResult, USAGE};

pub mod cat;
pub mod echo;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every stream the peer opens.
    Echo(EchoArgs),
    /// Pipe stdin to one stream and the stream to stdout.
    Cat(CatArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::Cat(args) => cat::run(args),
    }
}

/// Knobs shared by every subcommand that runs a mux.
#[derive(Args, Debug, Clone)]
pub struct MuxArgs {
    /// Largest payload per frame in bytes. Both ends should agree.
    #[arg(
        long,
        value_name = "BYTES",
        env = "FRAMEMUX_MAX_FRAME_PAYLOAD",
        default_value_t = DEFAULT_MAX_PAYLOAD
    )]
    pub max_frame_payload: usize,
    /// Send a zero-length probe this often (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", env = "FRAMEMUX_KEEPALIVE")]
    pub keepalive: Option<String>,
    /// Give up on a write that waits this long for the connection.
    #[arg(long, value_name = "DURATION", env = "FRAMEMUX_WRITE_TIMEOUT")]
    pub write_timeout: Option<String>,
}

impl MuxArgs {
    pub fn to_config(&self, policy: UnknownStreamPolicy) -> CliResult<MuxConfig> {
        let config = MuxConfig::default()
            .with_max_frame_payload(self.max_frame_payload)
            .with_unknown_stream_policy(policy)
            .with_keepalive(parse_optional_duration(self.keepalive.as_deref())?)
            .with_write_timeout(parse_optional_duration(self.write_timeout.as_deref())?);
        config
            .validate()
            .map_err(|err| mux_error("invalid options", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to listen on (tcp:HOST:PORT or unix:PATH).
    pub address: Endpoint,
    /// Exit after the first connection ends.
    #[arg(long)]
    pub once: bool,
    #[command(flatten)]
    pub mux: MuxArgs,
}

#[derive(Args, Debug)]
pub struct CatArgs {
    /// Address to connect to (tcp:HOST:PORT or unix:PATH).
    pub address: Endpoint,
    /// Stream to attach to.
    #[arg(long, short = 's', default_value = "1")]
    pub stream: StreamId,
    /// How long to keep printing replies after stdin ends (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub linger: String,
    #[command(flatten)]
    pub mux: MuxArgs,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn parse_optional_duration(input: Option<&str>) -> CliResult<Option<Duration>> {
    input.map(parse_duration).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mux_args() -> MuxArgs {
        MuxArgs {
            max_frame_payload: 1024,
            keepalive: Some("250ms".to_string()),
            write_timeout: None,
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn mux_args_build_config() {
        let config = mux_args().to_config(UnknownStreamPolicy::Lazy).unwrap();
        assert_eq!(config.max_frame_payload, 1024);
        assert_eq!(config.unknown_stream_policy, UnknownStreamPolicy::Lazy);
        assert_eq!(config.keepalive_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.write_timeout, None);
    }

    #[test]
    fn zero_frame_payload_is_a_usage_error() {
        let args = MuxArgs {
            max_frame_payload: 0,
            ..mux_args()
        };
        let err = args.to_config(UnknownStreamPolicy::Discard).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
