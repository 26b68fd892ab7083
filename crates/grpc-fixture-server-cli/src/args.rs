use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// gRPC Fixture - Replay recorded streaming RPC calls from a dump
#[derive(Debug, Parser)]
#[command(name = "grpc-fixture")]
#[command(author, version, about)]
pub struct ServerArgs {
    /// Recorded dump to replay (overrides fixture.dump from the config file)
    #[arg(short, long)]
    pub dump: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind the fixture server to
    #[arg(short, long)]
    pub address: Option<SocketAddr>,

    /// Logging level (simple version, e.g. 'info', 'debug')
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Advanced logging filter (e.g. "grpc_fixture=debug,grpc_fixture_server=info")
    /// This overrides log_level if provided
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Log directory
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Log to stdout
    #[arg(long)]
    pub log_stdout: bool,
}
