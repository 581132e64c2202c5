use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;
use tracing::{info, trace};

use crate::util;

/// Errors raised while loading configuration. These are only ever fatal at
/// startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid hosts file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is not set")]
    MissingVar(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    InvalidVar { name: &'static str, value: String },

    #[error("host entry without a name")]
    EmptyName,

    #[error("host {0:?} is configured more than once")]
    DuplicateHost(String),

    #[error("host {0:?} has an ssh_user but no ip")]
    MissingAddress(String),

    #[error("host {0:?} sets both ssh_key_path and ssh_password")]
    ConflictingAuth(String),

    #[error("host {0:?} needs either ssh_key_path or ssh_password")]
    MissingAuth(String),
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    None,

    /// SQLite database (default)
    Sqlite { path: PathBuf },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

const DEFAULT_DB_PATH: &str = "uptime_history.db";
const DEFAULT_MESSAGE_IDS_FILE: &str = "message_ids.json";
const DEFAULT_UPDATE_INTERVAL: u64 = 60;
const DEFAULT_UPTIME_INTERVAL: u64 = 3600;
const DEFAULT_PROBE_TIMEOUT: u64 = 20;
const DEFAULT_MAX_CONCURRENT_PROBES: usize = 8;
const DEFAULT_RETENTION_DAYS: i64 = 7;
const DEFAULT_SSH_PORT: u16 = 22;

/// Raw `hosts.json` content.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostsFile {
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

/// One entry of `hosts.json` as written by the user.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub ip: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub ssh_user: Option<String>,
    pub ssh_key_path: Option<PathBuf>,
    pub ssh_password: Option<String>,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// A validated host. Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub name: String,
    pub address: Option<String>,
    pub access: HostAccess,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostAccess {
    Local,
    Remote(RemoteAccess),
}

#[derive(Clone, PartialEq)]
pub struct RemoteAccess {
    pub address: String,
    pub port: u16,
    pub user: String,
    pub auth: RemoteAuth,
}

#[derive(Clone, PartialEq)]
pub enum RemoteAuth {
    KeyPath(PathBuf),
    Password(String),
}

// Keeps passwords out of logs.
impl fmt::Debug for RemoteAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = match &self.auth {
            RemoteAuth::KeyPath(path) => format!("key {}", path.display()),
            RemoteAuth::Password(_) => "password".to_string(),
        };
        f.debug_struct("RemoteAccess")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("auth", &auth)
            .finish()
    }
}

// Keeps passwords out of logs.
impl fmt::Debug for RemoteAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteAuth::KeyPath(path) => f.debug_tuple("KeyPath").field(path).finish(),
            RemoteAuth::Password(_) => f.write_str("Password(..)"),
        }
    }
}

impl Host {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: Some("127.0.0.1".to_string()),
            access: HostAccess::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.access, HostAccess::Local)
    }

    pub fn address_display(&self) -> &str {
        self.address.as_deref().unwrap_or("n/a")
    }
}

fn is_loopback(address: &str) -> bool {
    matches!(address, "localhost" | "127.0.0.1" | "::1")
}

impl HostConfig {
    pub fn resolve(self) -> Result<Host, ConfigError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let address = self.ip.filter(|ip| !ip.trim().is_empty());

        let remote = match (&address, self.ssh_user) {
            (Some(ip), Some(user)) if !is_loopback(ip) => Some(user),
            (None, Some(_)) => return Err(ConfigError::MissingAddress(name)),
            _ => None,
        };

        let Some(user) = remote else {
            return Ok(Host {
                name,
                address,
                access: HostAccess::Local,
            });
        };

        let auth = match (self.ssh_key_path, self.ssh_password) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingAuth(name)),
            (Some(path), None) => RemoteAuth::KeyPath(expand_home(path)),
            (None, Some(password)) => RemoteAuth::Password(password),
            (None, None) => return Err(ConfigError::MissingAuth(name)),
        };

        let ip = address.clone().unwrap_or_default();
        Ok(Host {
            name,
            address,
            access: HostAccess::Remote(RemoteAccess {
                address: ip,
                port: self.ssh_port,
                user,
                auth,
            }),
        })
    }
}

fn expand_home(path: PathBuf) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path;
    };
    match util::get_var("HOME") {
        Some(home) => Path::new(&home).join(rest),
        None => path,
    }
}

impl HostsFile {
    /// Validates every entry and makes sure the machine running the bot is
    /// monitored even when `hosts.json` is empty.
    pub fn resolve(self, local_name: &str) -> Result<Vec<Host>, ConfigError> {
        let mut seen = HashSet::new();
        let mut hosts = Vec::with_capacity(self.hosts.len() + 1);

        for entry in self.hosts {
            let host = entry.resolve()?;
            if !seen.insert(host.name.clone()) {
                return Err(ConfigError::DuplicateHost(host.name));
            }
            hosts.push(host);
        }

        if !hosts.iter().any(Host::is_local) {
            let name = if seen.contains(local_name) {
                format!("{local_name} (localhost)")
            } else {
                local_name.to_string()
            };
            hosts.insert(0, Host::local(name));
        }

        Ok(hosts)
    }
}

/// Reads `hosts.json`. A missing file means "local host only".
pub fn read_hosts_file(path: impl AsRef<Path>) -> Result<HostsFile, ConfigError> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(
                "{} not found, only the local host will be monitored",
                path.display()
            );
            return Ok(HostsFile::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str::<HostsFile>(&content)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
        .inspect(|hosts| trace!("loaded {} host entries", hosts.hosts.len()))
}

/// Runtime settings sourced from the environment (`.env`).
#[derive(Clone)]
pub struct Settings {
    pub discord_token: String,
    pub channel_id: u64,
    pub update_interval: Duration,
    pub uptime_interval: Duration,
    pub update_spread: Duration,
    pub probe_timeout: Duration,
    pub max_concurrent_probes: usize,
    pub storage: StorageConfig,
    pub retention: TimeDelta,
    pub message_ids_file: PathBuf,
    pub api_addr: Option<SocketAddr>,
    pub api_token: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("channel_id", &self.channel_id)
            .field("update_interval", &self.update_interval)
            .field("uptime_interval", &self.uptime_interval)
            .field("update_spread", &self.update_spread)
            .field("probe_timeout", &self.probe_timeout)
            .field("max_concurrent_probes", &self.max_concurrent_probes)
            .field("storage", &self.storage)
            .field("retention", &self.retention)
            .field("message_ids_file", &self.message_ids_file)
            .field("api_addr", &self.api_addr)
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(util::get_var)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());
        let parse_u64 = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            Ok(util::parse_value(name, var(name))?.unwrap_or(default))
        };

        let discord_token = var(util::DISCORD_TOKEN).ok_or(ConfigError::MissingVar(util::DISCORD_TOKEN))?;
        let channel_id = util::parse_value(util::CHANNEL_ID, var(util::CHANNEL_ID))?
            .ok_or(ConfigError::MissingVar(util::CHANNEL_ID))?;

        let update_interval = parse_u64(util::UPDATE_INTERVAL, DEFAULT_UPDATE_INTERVAL)?;
        let uptime_interval = parse_u64(util::UPTIME_CHECK_INTERVAL, DEFAULT_UPTIME_INTERVAL)?;
        for (name, value) in [
            (util::UPDATE_INTERVAL, update_interval),
            (util::UPTIME_CHECK_INTERVAL, uptime_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidVar {
                    name,
                    value: value.to_string(),
                });
            }
        }

        let update_interval = Duration::from_secs(update_interval);
        let uptime_interval = Duration::from_secs(uptime_interval);
        let configured_timeout = Duration::from_secs(parse_u64(util::PROBE_TIMEOUT, DEFAULT_PROBE_TIMEOUT)?);

        let max_concurrent_probes: usize =
            util::parse_value(util::MAX_CONCURRENT_PROBES, var(util::MAX_CONCURRENT_PROBES))?
                .unwrap_or(DEFAULT_MAX_CONCURRENT_PROBES);

        let storage = match var(util::STORAGE_BACKEND).as_deref() {
            None | Some("sqlite") => StorageConfig::Sqlite {
                path: var(util::DB_PATH)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            },
            Some("none") | Some("memory") => StorageConfig::None,
            Some(other) => {
                return Err(ConfigError::InvalidVar {
                    name: util::STORAGE_BACKEND,
                    value: other.to_string(),
                });
            }
        };

        let retention_days: i64 = util::parse_value(util::RETENTION_DAYS, var(util::RETENTION_DAYS))?
            .unwrap_or(DEFAULT_RETENTION_DAYS);
        if retention_days <= 0 {
            return Err(ConfigError::InvalidVar {
                name: util::RETENTION_DAYS,
                value: retention_days.to_string(),
            });
        }

        Ok(Self {
            discord_token,
            channel_id,
            update_interval,
            uptime_interval,
            update_spread: Duration::from_secs(parse_u64(util::UPDATE_SPREAD_SECONDS, 0)?),
            probe_timeout: bounded_probe_timeout(configured_timeout, update_interval, uptime_interval),
            max_concurrent_probes: max_concurrent_probes.max(1),
            storage,
            retention: TimeDelta::days(retention_days),
            message_ids_file: var(util::MESSAGE_IDS_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MESSAGE_IDS_FILE)),
            api_addr: util::parse_value(util::API_ADDR, var(util::API_ADDR))?,
            api_token: var(util::API_TOKEN),
        })
    }
}

/// A probe may use at most half of the shorter cycle interval so that one
/// stuck host cannot push either cycle past its next tick.
pub fn bounded_probe_timeout(
    configured: Duration,
    update_interval: Duration,
    uptime_interval: Duration,
) -> Duration {
    configured
        .min(update_interval.min(uptime_interval) / 2)
        .max(Duration::from_secs(1))
}
