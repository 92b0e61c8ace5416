use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use murmur_db::notifications::DEFAULT_NOTIFICATION_CAP;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub notification_cap: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("MURMUR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MURMUR_JWT_SECRET is unset or still a placeholder");
        }

        let db_path = get("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()).into();
        let host = get("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("MURMUR_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("MURMUR_PORT must be a port number")?;
        let addr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let notification_cap = match get("MURMUR_NOTIFICATION_CAP") {
            Some(raw) => raw
                .parse()
                .context("MURMUR_NOTIFICATION_CAP must be a positive integer")?,
            None => DEFAULT_NOTIFICATION_CAP,
        };
        if notification_cap == 0 {
            bail!("MURMUR_NOTIFICATION_CAP must be at least 1");
        }

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            notification_cap,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = load(&[("MURMUR_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.db_path, PathBuf::from("murmur.db"));
        assert_eq!(config.notification_cap, 30);
    }

    #[test]
    fn placeholder_or_missing_secret_is_refused() {
        assert!(load(&[]).is_err());
        assert!(load(&[("MURMUR_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_numbers_are_refused() {
        assert!(load(&[("MURMUR_JWT_SECRET", "s"), ("MURMUR_PORT", "http")]).is_err());
        assert!(load(&[("MURMUR_JWT_SECRET", "s"), ("MURMUR_NOTIFICATION_CAP", "0")]).is_err());
        let config = load(&[("MURMUR_JWT_SECRET", "s"), ("MURMUR_NOTIFICATION_CAP", "50")]).unwrap();
        assert_eq!(config.notification_cap, 50);
    }
}
