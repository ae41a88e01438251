use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A weapon-sighting report as exposed by the read APIs.
/// The audit fields (client ip and user agent) never leave the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}
