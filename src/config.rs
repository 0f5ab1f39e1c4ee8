use std::time::Duration;

use anyhow::{anyhow, Context};
use axum::http::HeaderValue;

const DEFAULT_SESSION_SECRET: &str = "your_session_secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    pub cors_origin: HeaderValue,
    pub session_secret: String,
    pub session_ttl: Duration,
    pub environment: Environment,
    pub bootstrap_admin: Option<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "telemed.db".into(),
            port: 3000,
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            session_secret: DEFAULT_SESSION_SECRET.into(),
            session_ttl: Duration::from_secs(86_400),
            environment: Environment::Development,
            bootstrap_admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("TELEMED_DB_PATH") {
            config.db_path = path;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port.parse().with_context(|| format!("invalid PORT {:?}", port))?;
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            config.cors_origin = HeaderValue::from_str(&origin)
                .with_context(|| format!("invalid CORS_ORIGIN {:?}", origin))?;
        }
        if let Some(secret) = lookup("SESSION_SECRET") {
            config.session_secret = secret;
        }
        if let Some(ttl) = lookup("SESSION_TTL_SECS") {
            let secs: u64 = ttl
                .parse()
                .with_context(|| format!("invalid SESSION_TTL_SECS {:?}", ttl))?;
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(env) = lookup("APP_ENV") {
            config.environment = match env.as_str() {
                "development" => Environment::Development,
                "production" => Environment::Production,
                other => return Err(anyhow!("unknown APP_ENV {:?}", other)),
            };
        }
        if let (Some(user), Some(pass)) = (lookup("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            config.bootstrap_admin = Some((user, pass));
        }

        Ok(config)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.session_secret == DEFAULT_SESSION_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.uses_default_secret());
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("APP_ENV", "production"),
            ("SESSION_TTL_SECS", "60"),
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.environment.is_production());
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(
            config.bootstrap_admin,
            Some(("root".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup_from(&[("PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("APP_ENV", "staging")])).is_err());
    }
}
