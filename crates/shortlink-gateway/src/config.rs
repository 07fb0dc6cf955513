use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const CONFIG_ENV: &str = "CONFIG";
pub const URL_LENGTH_ENV: &str = "URL_LENGTH";
pub const TRUSTED_SUBNET_ENV: &str = "TRUSTED_SUBNET";
pub const DELETE_CONCURRENCY_ENV: &str = "DELETE_CONCURRENCY";
pub const COOKIE_SECRET_ENV: &str = "COOKIE_SECRET";
pub const REQUEST_TIMEOUT_ENV: &str = "REQUEST_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_URL_LENGTH: usize = 5;
pub const DEFAULT_DELETE_CONCURRENCY: usize = 16;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid trusted subnet '{0}'")]
    InvalidSubnet(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    #[value(name = "plain")]
    Plain,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plain => write!(f, "plain"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Command line of the gateway. Every setting also reads its environment
/// variable; a flag wins over the variable.
#[derive(Debug, Default, Parser)]
#[command(name = "shortlink-gateway", about = "HTTP gateway of the shortlink URL shortener")]
pub struct Cli {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV)]
    pub server_address: Option<String>,

    /// Public base URL prepended to short codes
    #[arg(short = 'b', long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    /// Append-only log file used when no database is configured
    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV, hide_env_values = true)]
    pub database_dsn: Option<String>,

    /// JSON file with defaults for any setting not given otherwise
    #[arg(short = 'c', long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Length of generated short codes
    #[arg(long, env = URL_LENGTH_ENV)]
    pub url_length: Option<usize>,

    /// CIDR allowed to read internal stats; unset denies everyone
    #[arg(short = 't', long, env = TRUSTED_SUBNET_ENV)]
    pub trusted_subnet: Option<String>,

    /// Fragment lookups allowed in flight during bulk deletes
    #[arg(long, env = DELETE_CONCURRENCY_ENV)]
    pub delete_concurrency: Option<usize>,

    /// Key used to sign session tokens; random per process when unset
    #[arg(long, env = COOKIE_SECRET_ENV, hide_env_values = true)]
    pub cookie_secret: Option<String>,

    /// Per-request deadline in seconds
    #[arg(long, env = REQUEST_TIMEOUT_ENV)]
    pub request_timeout_secs: Option<u64>,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

/// Contents of the `--config` JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server_address: Option<String>,
    pub base_url: Option<String>,
    pub file_storage_path: Option<PathBuf>,
    pub database_dsn: Option<String>,
    pub url_length: Option<usize>,
    pub trusted_subnet: Option<String>,
    pub delete_concurrency: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server_address: String,
    pub base_url: String,
    pub file_storage_path: Option<PathBuf>,
    pub database_dsn: Option<String>,
    pub url_length: usize,
    pub trusted_subnet: Option<Subnet>,
    pub delete_concurrency: usize,
    pub cookie_secret: Option<String>,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            file_storage_path: None,
            database_dsn: None,
            url_length: DEFAULT_URL_LENGTH,
            trusted_subnet: None,
            delete_concurrency: DEFAULT_DELETE_CONCURRENCY,
            cookie_secret: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_format: LogFormat::Plain,
        }
    }
}

impl Settings {
    /// Loads the config file named by `cli`, if any, and resolves.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) if !path.as_os_str().is_empty() => FileConfig::load(path)?,
            _ => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merges flags/environment over the config file over defaults.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        let trusted_subnet = non_empty(cli.trusted_subnet)
            .or(non_empty(file.trusted_subnet))
            .map(|cidr| cidr.parse::<Subnet>())
            .transpose()?;

        Ok(Self {
            server_address: non_empty(cli.server_address)
                .or(non_empty(file.server_address))
                .unwrap_or(defaults.server_address),
            base_url: non_empty(cli.base_url)
                .or(non_empty(file.base_url))
                .unwrap_or(defaults.base_url),
            file_storage_path: cli
                .file_storage_path
                .filter(|p| !p.as_os_str().is_empty())
                .or(file.file_storage_path.filter(|p| !p.as_os_str().is_empty())),
            database_dsn: non_empty(cli.database_dsn).or(non_empty(file.database_dsn)),
            url_length: cli
                .url_length
                .or(file.url_length)
                .unwrap_or(defaults.url_length),
            trusted_subnet,
            delete_concurrency: cli
                .delete_concurrency
                .or(file.delete_concurrency)
                .unwrap_or(defaults.delete_concurrency),
            cookie_secret: non_empty(cli.cookie_secret),
            request_timeout: cli
                .request_timeout_secs
                .or(file.request_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            log_format: cli.log_format,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: IpAddr,
    prefix: u8,
}

impl Subnet {
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            (IpAddr::V4(_), IpAddr::V6(ip)) => ip
                .to_ipv4_mapped()
                .is_some_and(|v4| self.contains(IpAddr::V4(v4))),
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

impl FromStr for Subnet {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSubnet(s.to_string());
        let s = s.trim();

        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let network: IpAddr = addr.parse().map_err(|_| invalid())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(prefix) => prefix.parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix > max {
            return Err(invalid());
        }

        Ok(Self { network, prefix })
    }
}

impl Display for Subnet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::resolve(Cli::default(), FileConfig::default()).unwrap();

        assert_eq!(settings.server_address, DEFAULT_SERVER_ADDRESS);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.url_length, 5);
        assert_eq!(settings.delete_concurrency, 16);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert!(settings.database_dsn.is_none());
        assert!(settings.file_storage_path.is_none());
        assert!(settings.trusted_subnet.is_none());
    }

    #[test]
    fn flags_win_over_file() {
        let cli = Cli {
            server_address: Some("0.0.0.0:9000".into()),
            url_length: Some(8),
            ..Cli::default()
        };
        let file = FileConfig {
            server_address: Some("127.0.0.1:7000".into()),
            base_url: Some("http://short.example".into()),
            url_length: Some(6),
            ..FileConfig::default()
        };

        let settings = Settings::resolve(cli, file).unwrap();
        assert_eq!(settings.server_address, "0.0.0.0:9000");
        assert_eq!(settings.base_url, "http://short.example");
        assert_eq!(settings.url_length, 8);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cli = Cli {
            database_dsn: Some(String::new()),
            ..Cli::default()
        };
        let file = FileConfig {
            database_dsn: Some("postgres://file".into()),
            ..FileConfig::default()
        };

        let settings = Settings::resolve(cli, file).unwrap();
        assert_eq!(settings.database_dsn.as_deref(), Some("postgres://file"));
    }

    #[test]
    fn flags_parse_with_short_names() {
        let cli = Cli::try_parse_from([
            "gateway",
            "-a",
            "0.0.0.0:8081",
            "-b",
            "http://s.example",
            "-f",
            "/tmp/db.json",
            "-t",
            "10.0.0.0/8",
            "--url-length",
            "7",
        ])
        .unwrap();

        assert_eq!(cli.server_address.as_deref(), Some("0.0.0.0:8081"));
        assert_eq!(cli.file_storage_path, Some(PathBuf::from("/tmp/db.json")));
        assert_eq!(cli.url_length, Some(7));
    }

    #[test]
    fn loads_json_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server_address":"127.0.0.1:7070","file_storage_path":"/tmp/urls.json","trusted_subnet":"192.168.0.0/16"}}"#
        )
        .unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Cli::default()
        };
        let settings = Settings::load(cli).unwrap();

        assert_eq!(settings.server_address, "127.0.0.1:7070");
        assert_eq!(
            settings.file_storage_path,
            Some(PathBuf::from("/tmp/urls.json"))
        );
        assert_eq!(
            settings.trusted_subnet.map(|s| s.to_string()).as_deref(),
            Some("192.168.0.0/16")
        );
    }

    #[test]
    fn broken_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Cli::default()
        };
        assert!(matches!(Settings::load(cli), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn subnet_membership() {
        let subnet: Subnet = "192.168.1.0/24".parse().unwrap();
        assert!(subnet.contains("192.168.1.42".parse().unwrap()));
        assert!(!subnet.contains("192.168.2.1".parse().unwrap()));
        assert!(subnet.contains("::ffff:192.168.1.7".parse().unwrap()));

        let everyone: Subnet = "0.0.0.0/0".parse().unwrap();
        assert!(everyone.contains("8.8.8.8".parse().unwrap()));

        let host: Subnet = "10.0.0.1".parse().unwrap();
        assert!(host.contains("10.0.0.1".parse().unwrap()));
        assert!(!host.contains("10.0.0.2".parse().unwrap()));

        let v6: Subnet = "fd00::/8".parse().unwrap();
        assert!(v6.contains("fd12::1".parse().unwrap()));
        assert!(!v6.contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn invalid_subnets_are_rejected() {
        for raw in ["", "nope", "10.0.0.0/33", "10.0.0.0/x", "::/129"] {
            assert!(raw.parse::<Subnet>().is_err(), "{raw}");
        }
    }
}
