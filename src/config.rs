//! Runtime configuration.
//!
//! A [`Config`] is assembled once at startup — defaults, then an INI-style
//! file, then `LINEGATE_*` environment variables, then CLI flags — and is
//! frozen from then on. The server never mutates or reloads it.
//!
//! # File format
//!
//! One `key=value` pair per line. Blank lines and lines starting with `#`
//! or `;` are skipped, `[section]` headers are tolerated and ignored, and
//! unknown keys are rejected. `linuxpath` is accepted as a legacy alias for
//! `data_path`. Durations are integer seconds.
//!
//! ```text
//! [server]
//! linuxpath=/etc/linegate/data.txt
//! reread_on_query=false
//! port=44445
//! ```

use crate::errors::StartupError;
use std::{
    env,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

const ENV_PREFIX: &str = "LINEGATE_";

/// Every recognized option, in the spelling used by file keys and
/// (uppercased) environment variables.
const OPTION_KEYS: &[&str] = &[
    "data_path",
    "reread_on_query",
    "host",
    "port",
    "backlog",
    "max_workers",
    "cache_capacity",
    "buffer_size",
    "max_query_bytes",
    "tls_enabled",
    "tls_cert",
    "tls_key",
    "rate_limit_enabled",
    "requests_per_minute",
    "read_timeout",
    "write_timeout",
    "shutdown_grace",
];

/// Immutable runtime configuration.
///
/// Defaults favor the indexed mode with conservative limits; only
/// `data_path` has no usable default and must be supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// File whose lines form the membership set.
    pub data_path: PathBuf,

    /// `true` disables the index and cache; each query re-scans the file.
    pub reread_on_query: bool,

    pub host: String,
    pub port: u16,

    /// Listen backlog handed to the kernel.
    pub backlog: u32,

    /// Concurrent connection cap; excess connections are closed at accept.
    pub max_workers: usize,

    /// LRU entries; 0 disables the cache.
    pub cache_capacity: usize,

    /// Read buffer size for sockets and file scans.
    pub buffer_size: usize,

    /// Hard upper bound on one request line.
    pub max_query_bytes: usize,

    pub tls_enabled: bool,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,

    pub rate_limit_enabled: bool,
    pub requests_per_minute: u32,

    /// Deadline for reading one request, measured from accept.
    pub read_timeout: Duration,
    /// Deadline for writing the response line.
    pub write_timeout: Duration,
    /// How long shutdown waits for in-flight requests to drain.
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::new(), // required; rejected by validate()
            reread_on_query: false,

            host: "0.0.0.0".to_string(),
            port: 44445,
            backlog: 1024,
            max_workers: 250,

            cache_capacity: 10_000,
            buffer_size: 64 * 1024,
            max_query_bytes: 1024 * 1024,

            tls_enabled: false,
            tls_cert: None,
            tls_key: None,

            rate_limit_enabled: true,
            requests_per_minute: 1000,

            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Defaults, overlaid with the file at `path` (when given), overlaid
    /// with `LINEGATE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, StartupError> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.merge_file(path)?;
        }
        config.merge_env()?;
        Ok(config)
    }

    /// Applies every `key=value` pair found in an INI-style file.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), StartupError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            StartupError::Config(format!("cannot read {}: {err}", path.display()))
        })?;

        for (number, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(StartupError::Config(format!(
                    "{} line {}: expected key=value, got {raw:?}",
                    path.display(),
                    number + 1
                )));
            };

            self.set(key.trim(), value.trim()).map_err(|reason| {
                StartupError::Config(format!("{} line {}: {reason}", path.display(), number + 1))
            })?;
        }

        Ok(())
    }

    /// Applies `LINEGATE_<OPTION>` environment variables.
    pub fn merge_env(&mut self) -> Result<(), StartupError> {
        for key in OPTION_KEYS {
            let variable = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
            if let Ok(value) = env::var(&variable) {
                self.set(key, &value)
                    .map_err(|reason| StartupError::Config(format!("{variable}: {reason}")))?;
            }
        }
        Ok(())
    }

    /// Applies one option by its file/environment spelling.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_ascii_lowercase().as_str() {
            "data_path" | "linuxpath" => self.data_path = PathBuf::from(value),
            "reread_on_query" => self.reread_on_query = parse_bool(key, value)?,
            "host" => self.host = value.to_string(),
            "port" => self.port = parse(key, value)?,
            "backlog" => self.backlog = parse(key, value)?,
            "max_workers" => self.max_workers = parse(key, value)?,
            "cache_capacity" => self.cache_capacity = parse(key, value)?,
            "buffer_size" => self.buffer_size = parse(key, value)?,
            "max_query_bytes" => self.max_query_bytes = parse(key, value)?,
            "tls_enabled" => self.tls_enabled = parse_bool(key, value)?,
            "tls_cert" => self.tls_cert = Some(PathBuf::from(value)),
            "tls_key" => self.tls_key = Some(PathBuf::from(value)),
            "rate_limit_enabled" => self.rate_limit_enabled = parse_bool(key, value)?,
            "requests_per_minute" => self.requests_per_minute = parse(key, value)?,
            "read_timeout" => self.read_timeout = Duration::from_secs(parse(key, value)?),
            "write_timeout" => self.write_timeout = Duration::from_secs(parse(key, value)?),
            "shutdown_grace" => self.shutdown_grace = Duration::from_secs(parse(key, value)?),
            _ => return Err(format!("unknown option {key:?}")),
        }
        Ok(())
    }

    /// Rejects configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), StartupError> {
        let fail = |reason: String| Err(StartupError::Config(reason));

        if self.data_path.as_os_str().is_empty() {
            return fail("data_path is required".to_string());
        }
        if self.max_workers == 0 {
            return fail("max_workers must be at least 1".to_string());
        }
        if self.backlog == 0 {
            return fail("backlog must be at least 1".to_string());
        }
        if self.buffer_size == 0 {
            return fail("buffer_size must be at least 1".to_string());
        }
        if self.max_query_bytes == 0 {
            return fail("max_query_bytes must be at least 1".to_string());
        }
        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return fail("read_timeout and write_timeout must be at least 1".to_string());
        }
        if self.tls_enabled && (self.tls_cert.is_none() || self.tls_key.is_none()) {
            return fail("tls_enabled requires both tls_cert and tls_key".to_string());
        }
        if self.rate_limit_enabled && self.requests_per_minute == 0 {
            return fail("requests_per_minute must be at least 1".to_string());
        }

        Ok(())
    }

    /// `host:port` as passed to the resolver.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, String>
where
    T::Err: Display,
{
    value
        .parse()
        .map_err(|err| format!("{key}: invalid value {value:?}: {err}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("{key}: expected a boolean, got {value:?}")),
    }
}
