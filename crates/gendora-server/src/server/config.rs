use core::time::Duration;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use gendora::{AllocatorConfig, ProbeOrder};

/// Runtime configuration for the `gendora-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults suitable for a single-node setup.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "gendora-server",
    version,
    about = "An HTTP service for Snowflake-style IDs backed by leased slots"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Prefix of the slot keys. Every instance that must produce distinct ids
    /// uses the same namespace.
    ///
    /// Environment variable: `NAMESPACE`
    #[arg(long, env = "NAMESPACE", default_value_t = String::from("gendora"))]
    pub namespace: String,

    /// Coordination store backing the slot leases.
    ///
    /// `memory` only coordinates within this process and is meant for a single
    /// instance or local development.
    ///
    /// Environment variable: `STORE`
    #[arg(long, env = "STORE", value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    /// Redis connection URL, e.g. `redis://127.0.0.1:6379`.
    ///
    /// Environment variable: `REDIS_URL`
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Lifetime of a slot lease without renewal, in seconds.
    ///
    /// Environment variable: `SLOT_TTL_SECS`
    #[arg(long, env = "SLOT_TTL_SECS", default_value_t = 300)]
    pub slot_ttl_secs: u64,

    /// Period of lease renewal, in seconds. Must be shorter than the TTL.
    ///
    /// Environment variable: `HEARTBEAT_INTERVAL_SECS`
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Order in which free slots are searched.
    ///
    /// Environment variable: `PROBE_ORDER`
    #[arg(long, env = "PROBE_ORDER", value_enum, default_value_t = ProbeOrderArg::Ascending)]
    pub probe_order: ProbeOrderArg,

    /// Claim a new slot from the heartbeat after the lease is lost, instead of
    /// failing every request until restart.
    ///
    /// Environment variable: `REALLOCATE_ON_LOSS`
    #[arg(long, env = "REALLOCATE_ON_LOSS", default_value_t = false)]
    pub reallocate_on_loss: bool,

    /// Clock used for id timestamps.
    ///
    /// `system` follows the wall clock and refuses to generate while it is
    /// behind; `monotonic` never goes backwards but ignores clock corrections.
    ///
    /// Environment variable: `CLOCK`
    #[arg(long, env = "CLOCK", value_enum, default_value_t = ClockKind::System)]
    pub clock: ClockKind,

    /// Upper bound, in seconds, on stopping the heartbeat and releasing the
    /// slot at shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Log output format. Filtering uses `RUST_LOG` (default `info`).
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Redis,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOrderArg {
    Ascending,
    RandomStart,
}

impl From<ProbeOrderArg> for ProbeOrder {
    fn from(arg: ProbeOrderArg) -> Self {
        match arg {
            ProbeOrderArg::Ascending => Self::Ascending,
            ProbeOrderArg::RandomStart => Self::RandomStart,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    System,
    Monotonic,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Where slot leases live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    #[cfg_attr(not(feature = "redis"), allow(dead_code))]
    Redis { url: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub store: StoreConfig,
    pub allocator: AllocatorConfig,
    pub clock: ClockKind,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.heartbeat_interval_secs == 0 {
            bail!("HEARTBEAT_INTERVAL_SECS must be greater than 0");
        }

        if args.heartbeat_interval_secs >= args.slot_ttl_secs {
            bail!(
                "HEARTBEAT_INTERVAL_SECS ({}) must be less than SLOT_TTL_SECS ({})",
                args.heartbeat_interval_secs,
                args.slot_ttl_secs
            );
        }

        if args.shutdown_timeout_secs == 0 {
            bail!("SHUTDOWN_TIMEOUT_SECS must be greater than 0");
        }

        let store = match (args.store, args.redis_url) {
            (StoreKind::Memory, _) => StoreConfig::Memory,
            (StoreKind::Redis, None) => bail!("REDIS_URL is required when STORE=redis"),
            (StoreKind::Redis, Some(_)) if !cfg!(feature = "redis") => {
                bail!("STORE=redis requires gendora-server to be built with the `redis` feature")
            }
            (StoreKind::Redis, Some(url)) => StoreConfig::Redis { url },
        };

        let shutdown_timeout = Duration::from_secs(args.shutdown_timeout_secs);
        let allocator = AllocatorConfig::new(args.namespace)
            .with_ttl(Duration::from_secs(args.slot_ttl_secs))
            .with_heartbeat_interval(Duration::from_secs(args.heartbeat_interval_secs))
            .with_probe_order(args.probe_order.into())
            .with_reallocate_on_loss(args.reallocate_on_loss)
            .with_shutdown_grace(shutdown_timeout);
        allocator.validate()?;

        Ok(Self {
            server_addr: args.server_addr,
            store,
            allocator,
            clock: args.clock,
            shutdown_timeout,
            log_format: args.log_format,
        })
    }
}
