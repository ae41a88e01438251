use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;

use denuncia_api::state::Environment;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub frontend_origin: HeaderValue,
    pub environment: Environment,
    pub db_path: PathBuf,
    pub storage_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("DENUNCIA_HOST", "0.0.0.0");
        let port: u16 = var("DENUNCIA_PORT", "3001")
            .parse()
            .context("DENUNCIA_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let frontend_url = var("DENUNCIA_FRONTEND_URL", "http://localhost:5173");
        let frontend_origin = HeaderValue::from_str(frontend_url.trim_end_matches('/'))
            .with_context(|| format!("invalid DENUNCIA_FRONTEND_URL '{}'", frontend_url))?;

        let environment: Environment = var("DENUNCIA_ENV", "production").parse()?;

        let db_path = PathBuf::from(var("DENUNCIA_DB_PATH", "denuncias.db"));

        let timeout_secs: u64 = var("DENUNCIA_DB_TIMEOUT_SECS", "5")
            .parse()
            .context("DENUNCIA_DB_TIMEOUT_SECS must be a whole number of seconds")?;
        anyhow::ensure!(timeout_secs > 0, "DENUNCIA_DB_TIMEOUT_SECS must be positive");

        Ok(Self {
            addr,
            frontend_origin,
            environment,
            db_path,
            storage_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.addr, "0.0.0.0:3001".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.frontend_origin, "http://localhost:5173");
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.db_path, PathBuf::from("denuncias.db"));
        assert_eq!(cfg.storage_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("DENUNCIA_HOST", "127.0.0.1"),
            ("DENUNCIA_PORT", "8080"),
            ("DENUNCIA_FRONTEND_URL", "https://mapa.example.org/"),
            ("DENUNCIA_ENV", "development"),
            ("DENUNCIA_DB_TIMEOUT_SECS", "2"),
        ])
        .unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.frontend_origin, "https://mapa.example.org");
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.storage_timeout, Duration::from_secs(2));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("DENUNCIA_PORT", "http")]).is_err());
        assert!(config(&[("DENUNCIA_ENV", "staging")]).is_err());
        assert!(config(&[("DENUNCIA_DB_TIMEOUT_SECS", "0")]).is_err());
    }
}
