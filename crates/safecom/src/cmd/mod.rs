use clap::{Args, Subcommand};
use std::path::PathBuf;

use safecom_core::Role;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod session;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve safety-layer channels and wait for a client to connect.
    Server(SessionArgs),
    /// Open safety-layer channels towards a server.
    Client(SessionArgs),
    /// Decode and verify one SPDU.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Server(args) => session::run(args, Role::Server, format),
        Command::Client(args) => session::run(args, Role::Client, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Socket path to bind.
    pub socket: PathBuf,
    /// Socket path of the peer instance.
    #[arg(long)]
    pub peer: PathBuf,
    /// JSON configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Number of channels (overrides the configuration file).
    #[arg(long)]
    pub channels: Option<u32>,
    /// Instance name (overrides the configuration file).
    #[arg(long)]
    pub instance: Option<String>,
    /// Payload to send on every channel once it is up. Repeatable.
    #[arg(long = "send", value_name = "TEXT")]
    pub send: Vec<String>,
    /// Exit after N payloads have been delivered.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after running this long (e.g. 10s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// How long to keep retrying until the peer socket exists.
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Receive timeout between timer polls.
    #[arg(long, default_value = "10ms")]
    pub tick: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// SPDU bytes as hex.
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub hex: Option<String>,
    /// Read the SPDU bytes from a file.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
