//! Database row types. These map directly to SQLite rows and stay
//! independent of the wire types in denuncia-types.

/// Fields supplied by the caller when a report is stored. `id` and
/// `created_at` are assigned by the database.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub latitude: f64,
    pub longitude: f64,
    pub client_ip: String,
    pub client_agent: String,
}

/// A stored report without its audit fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub created_at: String,
}

/// One page of reports plus the unfiltered row count.
#[derive(Debug, Clone)]
pub struct ReportPage {
    pub rows: Vec<ReportRow>,
    pub total: i64,
}

/// Time window for `count_reports`, evaluated against the database clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWindow {
    AllTime,
    /// Rows created on the current UTC calendar date.
    Today,
    /// Rows created within the trailing `n` days.
    LastDays(u32),
}
