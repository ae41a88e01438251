use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use denuncia_api::rate_limit::RateLimiter;

/// Background task that evicts expired rate-limit windows so the counter
/// maps do not grow with every address ever seen.
///
/// Stops when `shutdown` flips to `true`.
pub async fn run_sweep_loop(
    limiters: Vec<Arc<RateLimiter>>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted: usize = limiters.iter().map(|l| l.cleanup_expired()).sum();
                if evicted > 0 {
                    debug!("Sweep: evicted {} expired rate-limit windows", evicted);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
