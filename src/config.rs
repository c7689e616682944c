//! Configuration for the respio probe.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use respio::buffer::{ExternalAllocator, Malloc, System, MIN_OFFHEAP_SLICE};
use respio::bufio::DEFAULT_BUFFER_SIZE;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the probe
#[derive(Parser, Debug)]
#[command(name = "respio")]
#[command(version)]
#[command(about = "Send RESP commands to a server and print the replies", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server address (e.g., 127.0.0.1:6379)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Connect timeout in milliseconds (0 = system default)
    #[arg(long)]
    pub dial_timeout_ms: Option<u64>,

    /// Read timeout in milliseconds (0 = none)
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Write timeout in milliseconds (0 = none)
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Read buffer size in bytes
    #[arg(long)]
    pub read_buffer_size: Option<usize>,

    /// Write buffer size in bytes
    #[arg(long)]
    pub write_buffer_size: Option<usize>,

    /// TCP keep-alive period in seconds (0 = disabled)
    #[arg(long)]
    pub keepalive_secs: Option<u64>,

    /// Flush once more than this many commands are pending
    #[arg(long)]
    pub max_buffered: Option<usize>,

    /// Flush once this many microseconds passed since the last write
    #[arg(long)]
    pub max_interval_us: Option<u64>,

    /// Budget for externally allocated buffers in bytes (0 = none)
    #[arg(long)]
    pub max_offheap_bytes: Option<usize>,

    /// Buffers smaller than this never use the external allocator
    #[arg(long)]
    pub min_offheap_slice: Option<usize>,

    /// External buffer allocator
    #[arg(long, value_enum)]
    pub allocator: Option<AllocatorKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Send the commands this many times, pipelined
    #[arg(short = 'n', long, default_value_t = 1)]
    pub repeat: usize,

    /// Commands to send, one per argument, e.g. "SET key value" "GET key"
    #[arg(required = true, num_args = 1..)]
    pub command: Vec<String>,
}

/// External allocation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    /// libc malloc/free
    #[default]
    Malloc,
    /// The Rust global allocator
    System,
}

impl AllocatorKind {
    pub fn strategy(self) -> Box<dyn ExternalAllocator> {
        match self {
            AllocatorKind::Malloc => Box::new(Malloc),
            AllocatorKind::System => Box::new(System),
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default)]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub write_timeout_ms: u64,
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,
    #[serde(default)]
    pub keepalive_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            dial_timeout_ms: default_dial_timeout_ms(),
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            read_buffer_size: default_buffer_size(),
            write_buffer_size: default_buffer_size(),
            keepalive_secs: 0,
        }
    }
}

/// Batched flush policy
#[derive(Debug, Deserialize, Default)]
pub struct FlushConfig {
    #[serde(default)]
    pub max_buffered: usize,
    #[serde(default)]
    pub max_interval_us: u64,
}

/// Buffer allocator configuration
#[derive(Debug, Deserialize)]
pub struct BufferConfig {
    #[serde(default)]
    pub max_offheap_bytes: usize,
    #[serde(default = "default_min_offheap_slice")]
    pub min_offheap_slice: usize,
    #[serde(default)]
    pub allocator: AllocatorKind,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_offheap_bytes: 0,
            min_offheap_slice: default_min_offheap_slice(),
            allocator: AllocatorKind::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_dial_timeout_ms() -> u64 {
    1000
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_min_offheap_slice() -> usize {
    MIN_OFFHEAP_SLICE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub address: String,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub keepalive: Duration,
    pub max_buffered: usize,
    pub max_interval: Duration,
    pub max_offheap_bytes: usize,
    pub min_offheap_slice: usize,
    pub allocator: AllocatorKind,
    pub log_level: String,
    pub repeat: usize,
    pub command: Vec<String>,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };
        let TomlConfig {
            connection,
            flush,
            buffer,
            logging,
        } = toml_config;

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            address: cli.address.unwrap_or(connection.address),
            dial_timeout: Duration::from_millis(
                cli.dial_timeout_ms.unwrap_or(connection.dial_timeout_ms),
            ),
            read_timeout: Duration::from_millis(
                cli.read_timeout_ms.unwrap_or(connection.read_timeout_ms),
            ),
            write_timeout: Duration::from_millis(
                cli.write_timeout_ms.unwrap_or(connection.write_timeout_ms),
            ),
            read_buffer_size: cli.read_buffer_size.unwrap_or(connection.read_buffer_size),
            write_buffer_size: cli.write_buffer_size.unwrap_or(connection.write_buffer_size),
            keepalive: Duration::from_secs(cli.keepalive_secs.unwrap_or(connection.keepalive_secs)),
            max_buffered: cli.max_buffered.unwrap_or(flush.max_buffered),
            max_interval: Duration::from_micros(
                cli.max_interval_us.unwrap_or(flush.max_interval_us),
            ),
            max_offheap_bytes: cli.max_offheap_bytes.unwrap_or(buffer.max_offheap_bytes),
            min_offheap_slice: cli.min_offheap_slice.unwrap_or(buffer.min_offheap_slice),
            allocator: cli.allocator.unwrap_or(buffer.allocator),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                logging.level
            },
            repeat: cli.repeat,
            command: cli.command,
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.connection.address, "127.0.0.1:6379");
        assert_eq!(config.connection.read_buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.flush.max_buffered, 0);
        assert_eq!(config.buffer.min_offheap_slice, 16 * 1024);
        assert_eq!(config.buffer.allocator, AllocatorKind::Malloc);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [connection]
            address = "10.0.0.1:6380"
            read_timeout_ms = 500
            write_buffer_size = 65536
            keepalive_secs = 60

            [flush]
            max_buffered = 32
            max_interval_us = 300

            [buffer]
            max_offheap_bytes = 1073741824
            allocator = "system"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.address, "10.0.0.1:6380");
        assert_eq!(config.connection.read_timeout_ms, 500);
        assert_eq!(config.connection.write_buffer_size, 65536);
        assert_eq!(config.connection.dial_timeout_ms, 1000);
        assert_eq!(config.connection.keepalive_secs, 60);
        assert_eq!(config.flush.max_buffered, 32);
        assert_eq!(config.flush.max_interval_us, 300);
        assert_eq!(config.buffer.max_offheap_bytes, 1 << 30);
        assert_eq!(config.buffer.allocator, AllocatorKind::System);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unknown_allocator_rejected() {
        let result: Result<TomlConfig, _> = toml::from_str("[buffer]\nallocator = \"jemalloc\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = CliArgs::try_parse_from([
            "respio",
            "--address",
            "localhost:7000",
            "--read-timeout-ms",
            "250",
            "--allocator",
            "system",
            "-n",
            "3",
            "SET k v",
            "GET k",
        ])
        .unwrap();
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.address, "localhost:7000");
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.write_timeout, Duration::ZERO);
        assert_eq!(config.allocator, AllocatorKind::System);
        assert_eq!(config.repeat, 3);
        assert_eq!(config.command, ["SET k v", "GET k"]);
    }

    #[test]
    fn test_command_required() {
        assert!(CliArgs::try_parse_from(["respio"]).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let cli = CliArgs::try_parse_from([
            "respio",
            "--config",
            "/nonexistent/respio.toml",
            "PING",
        ])
        .unwrap();
        let err = Config::from_cli(cli).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(_, _)));
        assert!(err
            .to_string()
            .starts_with("Failed to read config file '/nonexistent/respio.toml'"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
