//! Application configuration loaded from environment variables.

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::collections::HashMap;
use std::env;

/// Fixed credit package schema: amount in currency units -> credits granted.
///
/// Fixed at build time per `spec.md` §6.3; extending it means updating both
/// this map and the external payment UI (out of scope here).
pub fn credit_packages() -> HashMap<u32, u32> {
    [(100, 100), (200, 200), (300, 300), (500, 500)]
        .into_iter()
        .collect()
}

/// Application configuration (environment-derived, validated at startup).
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub telegram_webhook_url: Option<String>,
    pub telegram_webhook_secret: Option<String>,

    pub database_url: String,
    pub database_ssl: bool,
    pub redis_url: String,
    pub redis_ssl: bool,

    pub yookassa_shop_id: Option<String>,
    pub yookassa_secret_key: Option<String>,
    pub yookassa_webhook_secret: Option<String>,

    pub admin_ids: Vec<i64>,

    pub max_queued_tasks_per_user: u32,
    pub max_global_queue_size: u32,
    pub max_gpu_jobs: u32,
    pub generation_lock_ttl_secs: u64,
    pub generation_timeout_secs: u64,

    pub port: u16,
}

const CHANGEME: &str = "changeme";

impl Config {
    /// Load configuration from environment variables, validating
    /// dependent/required keys the way `packages/server/src/config.rs`
    /// does for its own required keys.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let telegram_bot_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let telegram_webhook_url = env::var("TELEGRAM_WEBHOOK_URL").ok().filter(|s| !s.is_empty());
        let telegram_webhook_secret =
            env::var("TELEGRAM_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

        if telegram_webhook_url.is_some() {
            match &telegram_webhook_secret {
                None => bail!("TELEGRAM_WEBHOOK_SECRET must be set when TELEGRAM_WEBHOOK_URL is set"),
                Some(secret) if secret == CHANGEME => {
                    bail!("TELEGRAM_WEBHOOK_SECRET must not be the literal \"changeme\"")
                }
                Some(_) => {}
            }
        }

        let raw_database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let (database_url, database_ssl) = normalize_database_url(&raw_database_url);
        let redis_url =
            env::var("REDIS_URL").context("REDIS_URL must be set")?;
        let redis_ssl = env::var("REDIS_SSL")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
            || redis_url.starts_with("rediss://");

        let yookassa_shop_id = env::var("YOOKASSA_SHOP_ID").ok().filter(|s| !s.is_empty());
        let yookassa_secret_key = env::var("YOOKASSA_SECRET_KEY").ok().filter(|s| !s.is_empty());
        let yookassa_webhook_secret =
            env::var("YOOKASSA_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

        if yookassa_shop_id.is_some() && yookassa_secret_key.is_some() {
            match &yookassa_webhook_secret {
                None => bail!(
                    "YOOKASSA_WEBHOOK_SECRET must be set when YOOKASSA_SHOP_ID/YOOKASSA_SECRET_KEY are set"
                ),
                Some(secret) if secret == CHANGEME => {
                    bail!("YOOKASSA_WEBHOOK_SECRET must not be the literal \"changeme\"")
                }
                Some(_) => {}
            }
        }

        let admin_ids = env::var("ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i64>().context("ADMIN_IDS must be comma-separated integers"))
            .collect::<Result<Vec<_>>>()?;

        let max_queued_tasks_per_user = env_or("MAX_QUEUED_TASKS_PER_USER", 3)?;
        let max_global_queue_size = env_or("MAX_GLOBAL_QUEUE_SIZE", 500)?;
        let max_gpu_jobs = env_or("MAX_GPU_JOBS", 1)?;
        let generation_lock_ttl_secs = env_or("GENERATION_LOCK_TTL", 300)?;
        let generation_timeout_secs = env_or("GENERATION_TIMEOUT", 200)?;
        let port = env_or("PORT", 8080)?;

        Ok(Self {
            telegram_bot_token,
            telegram_webhook_url,
            telegram_webhook_secret,
            database_url,
            database_ssl,
            redis_url,
            redis_ssl,
            yookassa_shop_id,
            yookassa_secret_key,
            yookassa_webhook_secret,
            admin_ids,
            max_queued_tasks_per_user,
            max_global_queue_size,
            max_gpu_jobs,
            generation_lock_ttl_secs,
            generation_timeout_secs,
            port,
        })
    }

    /// Whether the payment pipeline (and its reconciler) should be started.
    pub fn payments_enabled(&self) -> bool {
        self.yookassa_shop_id.is_some() && self.yookassa_secret_key.is_some()
    }
}

/// Translate a `postgres://` / `postgresql://` URL into the form the async
/// driver expects, stripping `sslmode` into a boolean SSL flag.
///
/// sqlx's Postgres driver accepts both schemes directly, but the spec
/// requires the translation step explicitly (mirroring the Python
/// implementation's `postgresql+asyncpg://` rewrite) so the SSL decision is
/// made once, here, rather than left to a query-string the driver parses
/// implicitly.
pub fn normalize_database_url(raw: &str) -> (String, bool) {
    let (base, query) = match raw.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (raw, None),
    };

    let base = if let Some(rest) = base.strip_prefix("postgres://") {
        format!("postgresql://{rest}")
    } else {
        base.to_string()
    };

    let mut ssl = false;
    let mut remaining_params = Vec::new();
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                if k.eq_ignore_ascii_case("sslmode") {
                    ssl = !matches!(v, "disable" | "allow");
                    continue;
                }
            }
            if !pair.is_empty() {
                remaining_params.push(pair.to_string());
            }
        }
    }

    if remaining_params.is_empty() {
        (base, ssl)
    } else {
        (format!("{base}?{}", remaining_params.join("&")), ssl)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} must be a valid number: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_packages_match_fixed_schema() {
        let packages = credit_packages();
        assert_eq!(packages.get(&100), Some(&100));
        assert_eq!(packages.get(&500), Some(&500));
        assert_eq!(packages.len(), 4);
    }

    #[test]
    fn normalizes_postgres_scheme_and_strips_sslmode() {
        let (url, ssl) = normalize_database_url("postgres://u:p@host/db?sslmode=require");
        assert_eq!(url, "postgresql://u:p@host/db");
        assert!(ssl);
    }

    #[test]
    fn preserves_other_query_params_and_disables_ssl_on_disable() {
        let (url, ssl) =
            normalize_database_url("postgresql://u:p@host/db?sslmode=disable&application_name=x");
        assert_eq!(url, "postgresql://u:p@host/db?application_name=x");
        assert!(!ssl);
    }

    #[test]
    fn leaves_url_without_query_untouched() {
        let (url, ssl) = normalize_database_url("postgresql://u:p@host/db");
        assert_eq!(url, "postgresql://u:p@host/db");
        assert!(!ssl);
    }
}
