use clap::{Args, Subcommand};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use indiwire_client::{ClientError, ClientMirror, MirrorObserver};
use indiwire_codec::{CodecConfig, CodecError, ElementReader, MessageWriter};

use crate::exit::{client_error, codec_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod get;
pub mod set;
pub mod sim;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulated device as a driver on stdin/stdout.
    Sim(SimArgs),
    /// Connect to a server and print property values.
    Get(GetArgs),
    /// Connect to a server and send new property values.
    Set(SetArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Sim(args) => sim::run(args),
        Command::Get(args) => get::run(args, format),
        Command::Set(args) => set::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Device name announced by the simulator.
    #[arg(long, default_value = "Simulator")]
    pub device: String,
    /// Config file for saved property values. Loaded at startup when present.
    #[arg(long, value_name = "FILE", env = "INDICONFIG")]
    pub config: Option<PathBuf>,
    /// Do not echo rejected commands back to the client as messages.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Server host.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port.
    #[arg(long, short = 'p', default_value = "7624")]
    pub port: u16,
    /// How long to wait for traffic before giving up (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    /// Properties to print as `device` or `device.property`. Default: everything.
    pub targets: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    /// Assignments as `device.property.element=value`. Switch values are
    /// `On`/`Off`; BLOB values name a file to upload.
    #[arg(required = true)]
    pub assignments: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
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

/// Both halves of a TCP connection to a server.
pub struct Connection {
    pub reader: ElementReader<TcpStream>,
    pub writer: MessageWriter<TcpStream>,
}

/// Connect to `server`; reads give up after its quiet timeout.
pub fn connect(server: &ServerArgs) -> CliResult<Connection> {
    let timeout = parse_duration(&server.timeout)?;
    let address = format!("{}:{}", server.host, server.port);
    let stream = TcpStream::connect(&address)
        .map_err(|err| io_error(&format!("connect to {address} failed"), err))?;
    let config = CodecConfig {
        read_timeout: Some(timeout),
        write_timeout: Some(timeout),
        ..CodecConfig::default()
    };
    let read_half = stream
        .try_clone()
        .map_err(|err| io_error("socket setup failed", err))?;
    let reader = ElementReader::with_config_tcp(read_half, config.clone())
        .map_err(|err| codec_error("socket setup failed", err))?;
    let writer = MessageWriter::with_config_tcp(stream, config)
        .map_err(|err| codec_error("socket setup failed", err))?;
    tracing::debug!(%address, ?timeout, "connected");
    Ok(Connection { reader, writer })
}

/// Feed server traffic into `mirror` until `done` holds, the server goes
/// quiet or the connection closes. Returns whether `done` was reached.
pub fn pump<O, F>(mirror: &mut ClientMirror<O>, reader: &mut ElementReader<TcpStream>, mut done: F) -> CliResult<bool>
where
    O: MirrorObserver,
    F: FnMut(&ClientMirror<O>) -> bool,
{
    loop {
        if done(mirror) {
            return Ok(true);
        }
        match mirror.process_next(reader) {
            Ok(_) => {}
            Err(ClientError::Codec(CodecError::Io(err)))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                tracing::debug!("server quiet");
                return Ok(false);
            }
            Err(ClientError::Codec(CodecError::ConnectionClosed)) => {
                tracing::debug!("server closed the connection");
                return Ok(false);
            }
            Err(err) if err.is_fatal() => return Err(client_error("read failed", err)),
            Err(err) => tracing::warn!(error = %err, "element skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
}
