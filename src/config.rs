use std::env;

use anyhow::{anyhow, bail, Context};
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => bail!("APP_ENV must be development, test or production (got `{other}`)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub frontend_url: String,

    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expire: Duration,
    pub jwt_refresh_expire: Duration,

    pub environment: Environment,
    pub admin_emails: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT must be a number (got `{raw}`)"))?,
            None => 5000,
        };

        let jwt_expire = parse_lifetime(&get("JWT_EXPIRE").unwrap_or_else(|| "7d".into()))
            .context("JWT_EXPIRE is not a valid lifetime")?;
        let jwt_refresh_expire =
            parse_lifetime(&get("JWT_REFRESH_EXPIRE").unwrap_or_else(|| "30d".into()))
                .context("JWT_REFRESH_EXPIRE is not a valid lifetime")?;

        let environment = match get("APP_ENV") {
            Some(raw) => Environment::parse(&raw)?,
            None => Environment::Development,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_url: get("DATABASE_URL"),
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".into()),

            jwt_secret: get("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET must be set"))?,
            jwt_refresh_secret: get("JWT_REFRESH_SECRET")
                .ok_or_else(|| anyhow!("JWT_REFRESH_SECRET must be set"))?,
            jwt_expire,
            jwt_refresh_expire,

            environment,
            admin_emails: get("ADMIN_EMAILS")
                .map(|raw| {
                    raw.split(',')
                        .map(|e| e.trim().to_lowercase())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }
}

/// Parse a token lifetime such as `7d`, `12h`, `90m`, `30s`, `2w` or a bare
/// number of seconds.
pub fn parse_lifetime(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (amount, unit) = raw.split_at(split);
    if amount.is_empty() {
        bail!("lifetime `{raw}` has no amount");
    }
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("lifetime `{raw}` is out of range"))?;

    let lifetime = match unit.trim() {
        "" | "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        "w" => Duration::weeks(amount),
        other => bail!("unknown lifetime unit `{other}` in `{raw}`"),
    };
    if lifetime <= Duration::zero() {
        bail!("lifetime `{raw}` must be positive");
    }
    Ok(lifetime)
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

    const SECRETS: [(&str, &str); 2] = [("JWT_SECRET", "primary"), ("JWT_REFRESH_SECRET", "refresh")];

    #[test]
    fn test_parse_lifetime_units() {
        assert_eq!(parse_lifetime("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_lifetime("30d").unwrap(), Duration::days(30));
        assert_eq!(parse_lifetime("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_lifetime("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_lifetime("2w").unwrap(), Duration::weeks(2));
        assert_eq!(parse_lifetime("3600").unwrap(), Duration::seconds(3600));
    }

    #[test]
    fn test_parse_lifetime_rejects_garbage() {
        assert!(parse_lifetime("").is_err());
        assert!(parse_lifetime("d").is_err());
        assert!(parse_lifetime("7y").is_err());
        assert!(parse_lifetime("0s").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&SECRETS)).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.jwt_expire, Duration::days(7));
        assert_eq!(config.jwt_refresh_expire, Duration::days(30));
        assert_eq!(config.environment, Environment::Development);
        assert!(config.database_url.is_none());
        assert!(!config.is_production());
        assert_eq!(config.listen_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "primary")])).unwrap_err();
        assert!(err.to_string().contains("JWT_REFRESH_SECRET"));
    }

    #[test]
    fn test_production_and_admin_emails() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("APP_ENV", "production"));
        pairs.push(("ADMIN_EMAILS", "Root@MindSpace.app, ops@mindspace.app,"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.is_production());
        assert_eq!(config.admin_emails.len(), 2);
        assert!(config.is_admin_email("root@mindspace.app"));
        assert!(!config.is_admin_email("someone@mindspace.app"));
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("APP_ENV", "staging"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
