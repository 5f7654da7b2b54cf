use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use tasklane_jobs::{ReminderMode, ReminderSettings};

const DEFAULT_VAPID_SUBJECT: &str = "mailto:admin@localhost";

/// Key pair and contact the server identifies itself to push services with.
#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub sweep_interval: Duration,
    pub reminder_interval: Duration,
    pub reminder: ReminderSettings,
    pub push_ttl_secs: u32,
    /// `None` disables the reminder dispatcher.
    pub vapid: Option<VapidConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let vapid = match (var("VAPID_PUBLIC_KEY"), var("VAPID_PRIVATE_KEY")) {
            (Some(public_key), Some(private_key)) => Some(VapidConfig {
                public_key,
                private_key,
                subject: var("VAPID_SUBJECT").unwrap_or_else(|| DEFAULT_VAPID_SUBJECT.into()),
            }),
            _ => None,
        };

        let lookahead_hours: i64 = parsed(&var, "TASKLANE_REMINDER_LOOKAHEAD_HOURS", 6)?;
        anyhow::ensure!(lookahead_hours > 0, "TASKLANE_REMINDER_LOOKAHEAD_HOURS must be positive");

        Ok(Self {
            host: var("TASKLANE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&var, "TASKLANE_PORT", 3000)?,
            db_path: var("TASKLANE_DB_PATH").unwrap_or_else(|| "tasklane.db".into()).into(),
            sweep_interval: seconds(&var, "TASKLANE_SWEEP_INTERVAL_SECS", 60)?,
            reminder_interval: seconds(&var, "TASKLANE_REMINDER_INTERVAL_SECS", 300)?,
            reminder: ReminderSettings {
                lookahead: chrono::Duration::hours(lookahead_hours),
                delivery_timeout: seconds(&var, "TASKLANE_PUSH_TIMEOUT_SECS", 10)?,
                mode: parsed(&var, "TASKLANE_REMINDER_MODE", ReminderMode::EveryTick)?,
            },
            push_ttl_secs: parsed(&var, "TASKLANE_PUSH_TTL_SECS", 86_400)?,
            vapid,
        })
    }
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}={}", key, raw)),
    }
}

fn seconds(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> anyhow::Result<Duration> {
    let secs: u64 = parsed(var, key, default)?;
    anyhow::ensure!(secs > 0, "{} must be at least 1 second", key);
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("tasklane.db"));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.reminder_interval, Duration::from_secs(300));
        assert_eq!(config.reminder.lookahead, chrono::Duration::hours(6));
        assert_eq!(config.reminder.delivery_timeout, Duration::from_secs(10));
        assert_eq!(config.reminder.mode, ReminderMode::EveryTick);
        assert_eq!(config.push_ttl_secs, 86_400);
        assert!(config.vapid.is_none());
    }

    #[test]
    fn overrides_and_vapid_keys() {
        let config = config(&[
            ("TASKLANE_PORT", "8080"),
            ("TASKLANE_REMINDER_MODE", "once"),
            ("TASKLANE_REMINDER_LOOKAHEAD_HOURS", "2"),
            ("VAPID_PUBLIC_KEY", "BPub"),
            ("VAPID_PRIVATE_KEY", "priv"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.reminder.mode, ReminderMode::Once);
        assert_eq!(config.reminder.lookahead, chrono::Duration::hours(2));
        let vapid = config.vapid.unwrap();
        assert_eq!(vapid.public_key, "BPub");
        assert_eq!(vapid.subject, DEFAULT_VAPID_SUBJECT);
    }

    #[test]
    fn half_a_key_pair_disables_push() {
        let config = config(&[("VAPID_PUBLIC_KEY", "BPub"), ("VAPID_PRIVATE_KEY", "  ")]).unwrap();
        assert!(config.vapid.is_none());
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = config(&[("TASKLANE_PORT", "eighty")]).unwrap_err();
        assert!(format!("{:#}", err).contains("TASKLANE_PORT"));

        assert!(config(&[("TASKLANE_SWEEP_INTERVAL_SECS", "0")]).is_err());
        assert!(config(&[("TASKLANE_REMINDER_MODE", "sometimes")]).is_err());
    }
}
