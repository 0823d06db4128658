use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::daemon::PollConfig;
use crate::daemon::dedup::DedupPolicy;
use crate::mail::session::{Credentials, SearchCriteria, TransportOptions};

pub const APP_PASSWORD_HELP: &str = "\
Please follow these steps:
1. Enable 2-Factor Authentication on your mail account
2. Generate an App Password: https://support.google.com/accounts/answer/185833
3. Set the GMAIL_APP_PASSWORD environment variable
4. Or add it to the config file under [imap] as password = \"...\"";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub imap: ImapConfig,
    pub polling: PollingConfig,
    pub storage: StorageConfig,
    pub log_level: String,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ImapConfig {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub accept_invalid_certs: bool,
    pub folder: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub mark_as_read: bool,
    pub dedup_policy: DedupPolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub reports_folder: PathBuf,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: None,
            host: "imap.gmail.com".to_string(),
            port: 993,
            accept_invalid_certs: false,
            folder: "INBOX".to_string(),
        }
    }
}

impl fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapConfig")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("folder", &self.folder)
            .finish()
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            mark_as_read: true,
            dedup_policy: DedupPolicy::RecordAlways,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reports_folder: PathBuf::from("./all-reports/unparsed-reports"),
        }
    }
}

impl Config {
    pub fn credentials(&self) -> Result<Credentials> {
        let password = self
            .imap
            .password
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| anyhow!("Mail app password not configured.\n{APP_PASSWORD_HELP}"))?;
        Ok(Credentials {
            user: self.imap.user.clone(),
            password,
        })
    }

    pub fn transport(&self) -> TransportOptions {
        TransportOptions {
            accept_invalid_certs: self.imap.accept_invalid_certs,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            folder: self.imap.folder.clone(),
            criteria: SearchCriteria::unread_reports(),
            mark_seen: self.polling.mark_as_read,
            dedup: self.polling.dedup_policy,
        }
    }

    /// Apply environment overrides. `get` is `std::env::var` in production.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = get("GMAIL_USER") {
            self.imap.user = v;
        }
        if let Some(v) = get("GMAIL_APP_PASSWORD") {
            self.imap.password = Some(v);
        }
        if let Some(v) = get("IMAP_HOST") {
            self.imap.host = v;
        }
        if let Some(v) = get("IMAP_PORT") {
            self.imap.port = v
                .trim()
                .parse()
                .map_err(|_| anyhow!("IMAP_PORT must be a port number, got {v:?}"))?;
        }
        if let Some(v) = get("IMAP_ACCEPT_INVALID_CERTS") {
            self.imap.accept_invalid_certs = v.trim() == "true";
        }
        if let Some(v) = get("POLL_INTERVAL") {
            self.polling.interval_ms = v
                .trim()
                .parse()
                .map_err(|_| anyhow!("POLL_INTERVAL must be milliseconds, got {v:?}"))?;
        }
        if let Some(v) = get("MARK_AS_READ") {
            // only an explicit "false" turns it off
            self.polling.mark_as_read = v.trim() != "false";
        }
        if let Some(v) = get("DEDUP_POLICY") {
            self.polling.dedup_policy = v.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Some(v) = get("REPORTS_FOLDER") {
            self.storage.reports_folder = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(anyhow!("polling interval must be greater than zero"));
        }
        if self.imap.host.trim().is_empty() {
            return Err(anyhow!("imap host is empty"));
        }
        if self.imap.folder.trim().is_empty() {
            return Err(anyhow!("imap folder is empty"));
        }
        Ok(())
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("report_ingest"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Defaults, then the TOML file if present, then environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path().ok(),
    };

    let mut cfg = match path {
        Some(p) if p.exists() => {
            let s = fs::read_to_string(&p)?;
            toml::from_str(&s).map_err(|e| anyhow!("Invalid config {}: {e}", p.display()))?
        }
        _ => Config::default(),
    };
    if cfg.log_level.is_empty() {
        cfg.log_level = "info".to_string();
    }

    cfg.apply_env(|k| std::env::var(k).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

/// Write a template for users to edit. Never overwrites.
pub fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("{} already exists; not overwriting", path.display()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let sample = Config {
        imap: ImapConfig {
            user: "you@example.com".to_string(),
            password: None,
            ..ImapConfig::default()
        },
        log_level: "info".to_string(),
        ..Config::default()
    };
    let body = toml::to_string_pretty(&sample)?;
    let header = "# report_ingest configuration\n\
                  # The password is best supplied through GMAIL_APP_PASSWORD.\n\n";
    fs::write(path, format!("{header}{body}"))?;
    Ok(())
}
