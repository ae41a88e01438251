use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail};
use thiserror::Error;
use tokio::task::JoinError;

use denuncia_db::{Database, Session};

use crate::rate_limit::{RateLimitPolicy, RateLimiter};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub general_limiter: Arc<RateLimiter>,
    pub submission_limiter: Arc<RateLimiter>,
    pub environment: Environment,
    /// Upper bound for a single storage call, including time queued for the
    /// connection.
    pub storage_timeout: Duration,
}

impl AppStateInner {
    /// State with the standard rate-limit policies.
    pub fn new(db: Arc<Database>, environment: Environment, storage_timeout: Duration) -> Self {
        Self {
            db,
            general_limiter: Arc::new(RateLimiter::new(RateLimitPolicy::GENERAL)),
            submission_limiter: Arc::new(RateLimiter::new(RateLimitPolicy::SUBMISSION)),
            environment,
            storage_timeout,
        }
    }

    /// Run blocking database work off the async runtime, bounded by
    /// `storage_timeout`.
    ///
    /// The timeout only covers the wait for the connection. Once the work has
    /// the connection it runs to completion and its result is returned, so a
    /// request never reports a failure for a write that went through. Work
    /// still queued when the timeout fires is dropped without running.
    pub async fn blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Session<'_>) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let claim = Arc::new(AtomicU8::new(QUEUED));
        let task_claim = claim.clone();

        let mut task = tokio::task::spawn_blocking(move || {
            let session = db.session()?;
            if task_claim
                .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                bail!("storage call abandoned after timeout");
            }
            f(&session)
        });

        match tokio::time::timeout(self.storage_timeout, &mut task).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                let abandoned = claim
                    .compare_exchange(QUEUED, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if abandoned {
                    Err(anyhow!(
                        "storage call timed out after {:?}",
                        self.storage_timeout
                    ))
                } else {
                    flatten(task.await)
                }
            }
        }
    }
}

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const ABANDONED: u8 = 2;

fn flatten<T>(joined: Result<anyhow::Result<T>, JoinError>) -> anyhow::Result<T> {
    joined.map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
}

/// Runtime environment. Only `Development` echoes internal error detail to
/// clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn exposes_error_detail(self) -> bool {
        self == Self::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown environment '{0}', expected 'development' or 'production'")]
pub struct UnknownEnvironment(String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(UnknownEnvironment(other.to_string())),
        }
    }
}
