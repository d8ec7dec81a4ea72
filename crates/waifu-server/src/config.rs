use std::num::NonZeroU64;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use waifu_anilist::client::{DEFAULT_MAX_CHARACTERS, DEFAULT_URL};
use waifu_api::roll::MAX_COOLDOWN_HOURS;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["", "changeme", "change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub roll_cooldown_hours: u32,
    pub drop_threshold: NonZeroU64,
    pub anilist_url: String,
    pub max_characters: u32,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("WAIFU_JWT_SECRET").context("WAIFU_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("WAIFU_JWT_SECRET is empty or a placeholder, set a real secret");
        }

        let threshold: u64 = parse_or(&lookup, "WAIFU_DROP_THRESHOLD", 100)?;
        let drop_threshold = NonZeroU64::new(threshold).context("WAIFU_DROP_THRESHOLD must be at least 1")?;

        let roll_cooldown_hours: u32 = parse_or(&lookup, "WAIFU_ROLL_COOLDOWN_HOURS", 24)?;
        if roll_cooldown_hours > MAX_COOLDOWN_HOURS {
            bail!(
                "WAIFU_ROLL_COOLDOWN_HOURS is {}, the maximum is {}",
                roll_cooldown_hours,
                MAX_COOLDOWN_HOURS
            );
        }

        Ok(Self {
            host: lookup("WAIFU_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "WAIFU_PORT", 3000)?,
            db_path: PathBuf::from(lookup("WAIFU_DB_PATH").unwrap_or_else(|| "waifubot.db".into())),
            jwt_secret,
            roll_cooldown_hours,
            drop_threshold,
            anilist_url: lookup("WAIFU_ANILIST_URL").unwrap_or_else(|| DEFAULT_URL.into()),
            max_characters: parse_or(&lookup, "WAIFU_MAX_CHARACTERS", DEFAULT_MAX_CHARACTERS)?,
            upstream_timeout: Duration::from_secs(parse_or(&lookup, "WAIFU_UPSTREAM_TIMEOUT_SECS", 10)?),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("WAIFU_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("waifubot.db"));
        assert_eq!(cfg.roll_cooldown_hours, 24);
        assert_eq!(cfg.drop_threshold.get(), 100);
        assert_eq!(cfg.anilist_url, DEFAULT_URL);
        assert_eq!(cfg.max_characters, 100_000);
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("WAIFU_JWT_SECRET", "a-real-secret"),
            ("WAIFU_PORT", "8080"),
            ("WAIFU_DROP_THRESHOLD", "5"),
            ("WAIFU_ROLL_COOLDOWN_HOURS", "1"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.drop_threshold.get(), 5);
        assert_eq!(cfg.roll_cooldown_hours, 1);
    }

    #[test]
    fn secret_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("WAIFU_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(config(&[("WAIFU_JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        assert!(config(&[("WAIFU_JWT_SECRET", "a-real-secret"), ("WAIFU_DROP_THRESHOLD", "0")]).is_err());
    }

    #[test]
    fn cooldown_is_bounded() {
        let max = MAX_COOLDOWN_HOURS.to_string();
        let cfg = config(&[("WAIFU_JWT_SECRET", "a-real-secret"), ("WAIFU_ROLL_COOLDOWN_HOURS", max.as_str())]).unwrap();
        assert_eq!(cfg.roll_cooldown_hours, MAX_COOLDOWN_HOURS);

        let over = (MAX_COOLDOWN_HOURS + 1).to_string();
        assert!(config(&[("WAIFU_JWT_SECRET", "a-real-secret"), ("WAIFU_ROLL_COOLDOWN_HOURS", over.as_str())]).is_err());
        assert!(config(&[("WAIFU_JWT_SECRET", "a-real-secret"), ("WAIFU_ROLL_COOLDOWN_HOURS", "4294967295")]).is_err());
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        assert!(config(&[("WAIFU_JWT_SECRET", "a-real-secret"), ("WAIFU_PORT", "http")]).is_err());
    }
}
