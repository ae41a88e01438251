pub mod error;
pub mod health;
pub mod middleware;
pub mod rate_limit;
pub mod reports;
pub mod router;
pub mod state;
pub mod statistics;
pub mod validation;
