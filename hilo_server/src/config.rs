use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use hilo::{AllocError, AllocatorConfig, USERS_BLOCK};

/// Command-line arguments. Every flag can also come from the environment or
/// a `.env` file.
#[derive(Debug, Clone, Parser)]
#[command(name = "hilo-server", version, about = "HTTP front end for the hilo user service")]
pub struct CliArgs {
    /// Address to listen on.
    #[arg(long, env = "HILO_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// libsql database URL or file path.
    #[arg(long, env = "HILO_DATABASE_URL", default_value = "hilo.db")]
    pub database_url: String,

    /// Counter block user ids are allocated from.
    #[arg(long, env = "HILO_BLOCK_NAME", default_value = USERS_BLOCK)]
    pub block_name: String,

    /// Ids handed out per claimed high value.
    #[arg(long, env = "HILO_MAX_LOW", default_value_t = 1000)]
    pub max_low: u64,

    /// Claim attempts before an allocation fails.
    #[arg(long, env = "HILO_MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: u32,

    /// Base backoff between claim attempts, in milliseconds.
    #[arg(long, env = "HILO_BACKOFF_MS", default_value_t = 10)]
    pub backoff_ms: u64,
}

/// Validated server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub block_name: String,
    pub allocator: AllocatorConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address `{addr}`")]
    ListenAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error(transparent)]
    Allocator(#[from] AllocError),
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let listen_addr = args
            .listen_addr
            .parse()
            .map_err(|source| ConfigError::ListenAddr {
                addr: args.listen_addr.clone(),
                source,
            })?;
        if args.database_url.trim().is_empty() {
            return Err(ConfigError::Empty("database url"));
        }
        if args.block_name.trim().is_empty() {
            return Err(ConfigError::Empty("block name"));
        }
        let allocator = AllocatorConfig::default()
            .with_max_low(args.max_low)
            .with_max_attempts(args.max_attempts)
            .with_backoff_base(Duration::from_millis(args.backoff_ms));
        allocator.validate()?;

        Ok(Self {
            listen_addr,
            database_url: args.database_url,
            block_name: args.block_name,
            allocator,
        })
    }
}
