//! Configuration for a backup run.
//!
//! Settings are read once, from an environment-style lookup, into a
//! [`BackupConfig`] that is then passed by reference to every component.
//! Validation is fail-fast but exhaustive: every missing or malformed setting
//! is collected into one [`ConfigReport`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::export::PollPolicy;

/// Save directory used when `SAVE_DIR` is unset or empty
pub const DEFAULT_SAVE_DIR: &str = "/tmp/outlinewikibackups";

/// Region used for custom S3-compatible endpoints
pub const CUSTOM_ENDPOINT_REGION: &str = "us-east-1";

/// Environment keys understood by [`BackupConfig::from_lookup`]
pub mod keys {
    #![allow(missing_docs)]
    pub const API_BASE_URL: &str = "API_BASE_URL";
    pub const AUTH_TOKEN: &str = "AUTH_TOKEN";
    pub const SLEEP_DURATION: &str = "SLEEP_DURATION";
    pub const MAX_POLL_ATTEMPTS: &str = "MAX_POLL_ATTEMPTS";
    pub const EXPORT_TIMEOUT: &str = "EXPORT_TIMEOUT";
    pub const SAVE_DIR: &str = "SAVE_DIR";
    pub const UPLOAD_TO_S3: &str = "UPLOAD_TO_S3";
    pub const S3_BUCKET_NAME: &str = "S3_BUCKET_NAME";
    pub const MINIO_ENDPOINT: &str = "MINIO_ENDPOINT";
    pub const AWS_REGION: &str = "AWS_REGION";
    pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
    pub const MINIMAL_S3_PERMISSIONS: &str = "MINIMAL_S3_PERMISSIONS";
    pub const KEEP_BACKUPS: &str = "KEEP_BACKUPS";
}

/// Static credentials for a self-hosted object store
#[derive(Clone, Serialize, Deserialize)]
pub struct StaticCredentials {
    /// `AWS_ACCESS_KEY_ID`
    pub access_key_id: String,
    /// `AWS_SECRET_ACCESS_KEY`
    pub secret_access_key: String,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket receiving the archives
    pub bucket_name: String,
    /// `AWS_REGION`, or `us-east-1` for custom endpoints
    pub region: String,
    /// Custom endpoint (MinIO and friends), always with a scheme
    pub endpoint_url: Option<String>,
    /// Static keys; `None` uses the default AWS provider chain
    pub credentials: Option<StaticCredentials>,
    /// Path-style addressing, required by most self-hosted stores
    pub force_path_style: bool,
    /// Skip the ListBuckets connectivity probe
    pub minimal_permissions: bool,
}

/// Which storage substrate holds the artifacts for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Files in the save directory
    Local,
    /// Objects in an S3 bucket
    ObjectStorage,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("local"),
            Backend::ObjectStorage => f.write_str("s3"),
        }
    }
}

/// Fully validated configuration for one backup run
#[derive(Clone)]
pub struct BackupConfig {
    /// Root URL of the Outline instance
    pub api_base_url: Url,
    /// Bearer token for the Outline API
    pub auth_token: String,
    /// How the export job is polled
    pub poll: PollPolicy,
    /// Where archives are downloaded
    pub save_dir: PathBuf,
    /// Present when artifacts are routed to object storage
    pub s3: Option<S3Config>,
    /// Retention keep-count; `None` disables pruning
    pub keep_backups: Option<usize>,
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("auth_token", &"<redacted>")
            .field("poll", &self.poll)
            .field("save_dir", &self.save_dir)
            .field("s3", &self.s3)
            .field("keep_backups", &self.keep_backups)
            .finish()
    }
}

/// A single configuration problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Environment key at fault
    pub key: &'static str,
    /// What is wrong with it
    pub problem: ConfigProblem,
}

/// Kind of configuration problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigProblem {
    /// Required but unset or empty
    Missing,
    /// Set, but unusable; carries the reason
    Invalid(String),
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            ConfigProblem::Missing => write!(f, "{} is not set", self.key),
            ConfigProblem::Invalid(reason) => write!(f, "{} is invalid: {}", self.key, reason),
        }
    }
}

/// Every configuration problem found during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigReport {
    /// Problems in the order they were found
    pub issues: Vec<ConfigIssue>,
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration ({} issue(s))", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "; {}", issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigReport {}

impl ConfigReport {
    /// Whether `key` was reported
    pub fn mentions(&self, key: &str) -> bool {
        self.issues.iter().any(|issue| issue.key == key)
    }
}

struct Collector<'a, F> {
    lookup: &'a F,
    issues: Vec<ConfigIssue>,
}

impl<'a, F> Collector<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty trimmed value, or `None`
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&mut self, key: &'static str) -> Option<String> {
        let value = self.get(key);
        if value.is_none() {
            self.missing(key);
        }
        value
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).as_deref() == Some("true")
    }

    fn number<T>(&mut self, key: &'static str, default: T, min: T) -> T
    where
        T: std::str::FromStr + PartialOrd + fmt::Display + Copy,
    {
        match self.get(key) {
            None => default,
            Some(raw) => match raw.parse::<T>() {
                Ok(value) if value >= min => value,
                Ok(value) => {
                    self.invalid(key, format!("{} is below the minimum of {}", value, min));
                    default
                }
                Err(_) => {
                    self.invalid(key, format!("{:?} is not a whole number", raw));
                    default
                }
            },
        }
    }

    fn missing(&mut self, key: &'static str) {
        self.issues.push(ConfigIssue {
            key,
            problem: ConfigProblem::Missing,
        });
    }

    fn invalid(&mut self, key: &'static str, reason: impl Into<String>) {
        self.issues.push(ConfigIssue {
            key,
            problem: ConfigProblem::Invalid(reason.into()),
        });
    }
}

impl BackupConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigReport> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigReport>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut c = Collector {
            lookup: &lookup,
            issues: Vec::new(),
        };

        let api_base_url = c.require(keys::API_BASE_URL).and_then(|raw| {
            match Url::parse(&raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
                    Some(url)
                }
                Ok(_) => {
                    c.invalid(keys::API_BASE_URL, "must be an absolute http(s) URL with a host");
                    None
                }
                Err(e) => {
                    c.invalid(keys::API_BASE_URL, e.to_string());
                    None
                }
            }
        });

        let auth_token = c.require(keys::AUTH_TOKEN);

        let defaults = PollPolicy::default();
        let interval = c.number(keys::SLEEP_DURATION, defaults.interval.as_secs(), 0);
        let max_attempts = c.number(keys::MAX_POLL_ATTEMPTS, defaults.max_attempts, 1);
        let max_wait = c.number(keys::EXPORT_TIMEOUT, defaults.max_wait.as_secs(), 1);
        let poll = PollPolicy {
            interval: Duration::from_secs(interval),
            max_attempts,
            max_wait: Duration::from_secs(max_wait),
        };

        let save_dir = c
            .get(keys::SAVE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR));

        let s3 = if c.flag(keys::UPLOAD_TO_S3) {
            Self::s3_from(&mut c)
        } else {
            None
        };

        let keep_backups = c.get(keys::KEEP_BACKUPS).and_then(|raw| match raw.parse::<usize>() {
            Ok(keep) => Some(keep),
            Err(_) => {
                c.invalid(keys::KEEP_BACKUPS, format!("{:?} is not a non-negative integer", raw));
                None
            }
        });

        match (api_base_url, auth_token) {
            (Some(api_base_url), Some(auth_token)) if c.issues.is_empty() => Ok(Self {
                api_base_url,
                auth_token,
                poll,
                save_dir,
                s3,
                keep_backups,
            }),
            _ => Err(ConfigReport { issues: c.issues }),
        }
    }

    fn s3_from<F>(c: &mut Collector<'_, F>) -> Option<S3Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bucket_name = c.require(keys::S3_BUCKET_NAME);
        let minimal_permissions = c.flag(keys::MINIMAL_S3_PERMISSIONS);

        let config = match c.get(keys::MINIO_ENDPOINT) {
            Some(endpoint) => {
                let access_key_id = c.require(keys::AWS_ACCESS_KEY_ID);
                let secret_access_key = c.require(keys::AWS_SECRET_ACCESS_KEY);
                S3Config {
                    bucket_name: bucket_name?,
                    region: CUSTOM_ENDPOINT_REGION.to_string(),
                    endpoint_url: Some(normalize_endpoint(&endpoint)),
                    credentials: Some(StaticCredentials {
                        access_key_id: access_key_id?,
                        secret_access_key: secret_access_key?,
                    }),
                    force_path_style: true,
                    minimal_permissions,
                }
            }
            None => {
                let region = c.require(keys::AWS_REGION);
                S3Config {
                    bucket_name: bucket_name?,
                    region: region?,
                    endpoint_url: None,
                    credentials: None,
                    force_path_style: false,
                    minimal_permissions,
                }
            }
        };
        Some(config)
    }

    /// The backend that receives artifacts and retention for this run
    pub fn backend(&self) -> Backend {
        if self.s3.is_some() {
            Backend::ObjectStorage
        } else {
            Backend::Local
        }
    }

    /// Host name embedded in archive names
    pub fn remote_host(&self) -> &str {
        self.api_base_url.host_str().unwrap_or("outline")
    }
}

/// Prefix `https://` onto endpoints given without a scheme
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BackupConfig::from_lookup(lookup(&[
            ("API_BASE_URL", "https://wiki.example.com"),
            ("AUTH_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.remote_host(), "wiki.example.com");
        assert_eq!(config.save_dir, PathBuf::from(DEFAULT_SAVE_DIR));
        assert_eq!(config.poll.interval, Duration::from_secs(10));
        assert_eq!(config.backend(), Backend::Local);
        assert!(config.keep_backups.is_none());
    }

    #[test]
    fn test_empty_keep_backups_disables_pruning() {
        let config = BackupConfig::from_lookup(lookup(&[
            ("API_BASE_URL", "https://wiki.example.com"),
            ("AUTH_TOKEN", "secret"),
            ("KEEP_BACKUPS", ""),
        ]))
        .unwrap();
        assert!(config.keep_backups.is_none());
    }

    #[test]
    fn test_endpoint_normalization() {
        assert_eq!(normalize_endpoint("minio:9000"), "https://minio:9000");
        assert_eq!(normalize_endpoint("http://minio:9000"), "http://minio:9000");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = BackupConfig::from_lookup(lookup(&[
            ("API_BASE_URL", "https://wiki.example.com"),
            ("AUTH_TOKEN", "super-secret-token"),
        ]))
        .unwrap();
        assert!(!format!("{:?}", config).contains("super-secret-token"));
    }
}
