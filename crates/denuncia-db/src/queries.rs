use crate::models::{CountWindow, NewReport, ReportPage, ReportRow};
use crate::{Database, Session};
use anyhow::Result;
use rusqlite::Connection;

impl Session<'_> {
    /// Append a report. Id allocation and the write happen in one statement,
    /// so concurrent callers never share or skip an id.
    pub fn insert_report(&self, report: &NewReport) -> Result<ReportRow> {
        let row = self.conn().query_row(
            "INSERT INTO denuncias (latitude, longitude, client_ip, client_agent)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, latitude, longitude, created_at",
            rusqlite::params![
                report.latitude,
                report.longitude,
                &report.client_ip,
                &report.client_agent,
            ],
            map_report_row,
        )?;
        Ok(row)
    }

    /// Most recent reports first. The page and the total are read within one
    /// session, so `total` is consistent with the rows returned.
    pub fn list_reports(&self, limit: i64, offset: i64) -> Result<ReportPage> {
        let rows = query_reports(self.conn(), limit, offset)?;
        let total = count_with(self.conn(), CountWindow::AllTime)?;
        Ok(ReportPage { rows, total })
    }

    pub fn count_reports(&self, window: CountWindow) -> Result<i64> {
        count_with(self.conn(), window)
    }
}

impl Database {
    pub fn insert_report(&self, report: &NewReport) -> Result<ReportRow> {
        self.session()?.insert_report(report)
    }

    pub fn list_reports(&self, limit: i64, offset: i64) -> Result<ReportPage> {
        self.session()?.list_reports(limit, offset)
    }

    pub fn count_reports(&self, window: CountWindow) -> Result<i64> {
        self.session()?.count_reports(window)
    }
}

fn map_report_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_reports(conn: &Connection, limit: i64, offset: i64) -> Result<Vec<ReportRow>> {
    // id breaks ties between rows written within the same second
    let mut stmt = conn.prepare(
        "SELECT id, latitude, longitude, created_at
         FROM denuncias
         ORDER BY created_at DESC, id DESC
         LIMIT ?1 OFFSET ?2",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![limit, offset], map_report_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn count_with(conn: &Connection, window: CountWindow) -> Result<i64> {
    let count = match window {
        CountWindow::AllTime => {
            conn.query_row("SELECT COUNT(*) FROM denuncias", [], |r| r.get(0))?
        }
        CountWindow::Today => conn.query_row(
            "SELECT COUNT(*) FROM denuncias WHERE date(created_at) = date('now')",
            [],
            |r| r.get(0),
        )?,
        CountWindow::LastDays(days) => conn.query_row(
            "SELECT COUNT(*) FROM denuncias WHERE created_at >= datetime('now', ?1)",
            [format!("-{} days", days)],
            |r| r.get(0),
        )?,
    };
    Ok(count)
}
