use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::contact::PhoneKind;
use crate::lead::{LeadRecord, LeadSink};
use crate::scraper::ScanSummary;

pub const DEFAULT_DB_PATH: &str = "data/leads.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id           INTEGER PRIMARY KEY,
            query        TEXT NOT NULL,
            target       INTEGER NOT NULL,
            collected    INTEGER,
            rounds       INTEGER,
            emitted      INTEGER,
            skipped      INTEGER,
            whatsapp     INTEGER,
            stop_reason  TEXT,
            error        TEXT,
            started_at   TEXT NOT NULL DEFAULT (datetime('now')),
            finished_at  TEXT
        );

        CREATE TABLE IF NOT EXISTS leads (
            id             INTEGER PRIMARY KEY,
            run_id         INTEGER NOT NULL REFERENCES runs(id),
            rank           INTEGER NOT NULL,
            name           TEXT NOT NULL,
            raw_phone      TEXT,
            cleaned_phone  TEXT NOT NULL,
            kind           TEXT NOT NULL CHECK(kind IN ('landline','mobile_whatsapp','indeterminate','invalid')),
            messaging_link TEXT NOT NULL DEFAULT '',
            source_query   TEXT NOT NULL,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(run_id, rank)
        );
        CREATE INDEX IF NOT EXISTS idx_leads_run ON leads(run_id);
        CREATE INDEX IF NOT EXISTS idx_leads_kind ON leads(kind);
        ",
    )?;
    Ok(())
}

// ── Runs ──

pub fn start_run(conn: &Connection, query: &str, target: usize) -> Result<i64> {
    conn.execute(
        "INSERT INTO runs (query, target) VALUES (?1, ?2)",
        rusqlite::params![query, target],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, run_id: i64, summary: &ScanSummary) -> Result<()> {
    conn.execute(
        "UPDATE runs
         SET collected = ?2, rounds = ?3, emitted = ?4, skipped = ?5, whatsapp = ?6,
             stop_reason = ?7, finished_at = datetime('now')
         WHERE id = ?1",
        rusqlite::params![
            run_id,
            summary.collected,
            summary.rounds,
            summary.emitted,
            summary.skipped,
            summary.whatsapp,
            summary.stop.as_str(),
        ],
    )?;
    Ok(())
}

pub fn fail_run(conn: &Connection, run_id: i64, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE runs SET error = ?2, finished_at = datetime('now') WHERE id = ?1",
        rusqlite::params![run_id, error],
    )?;
    Ok(())
}

pub struct RunRow {
    pub id: i64,
    pub query: String,
    pub target: usize,
    pub rounds: Option<usize>,
    pub emitted: Option<usize>,
    pub skipped: Option<usize>,
    pub whatsapp: Option<usize>,
    pub stop_reason: Option<String>,
    pub error: Option<String>,
    pub started_at: String,
}

pub fn fetch_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, query, target, rounds, emitted, skipped, whatsapp, stop_reason, error, started_at
         FROM runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                query: row.get(1)?,
                target: row.get(2)?,
                rounds: row.get(3)?,
                emitted: row.get(4)?,
                skipped: row.get(5)?,
                whatsapp: row.get(6)?,
                stop_reason: row.get(7)?,
                error: row.get(8)?,
                started_at: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Leads ──

/// Writes each lead as it arrives, tagged with the run it belongs to.
pub struct SqliteSink<'c> {
    conn: &'c Connection,
    run_id: i64,
}

impl<'c> SqliteSink<'c> {
    pub fn new(conn: &'c Connection, run_id: i64) -> Self {
        SqliteSink { conn, run_id }
    }
}

impl LeadSink for SqliteSink<'_> {
    fn emit(&mut self, r: LeadRecord) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO leads
             (run_id, rank, name, raw_phone, cleaned_phone, kind, messaging_link, source_query)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        stmt.execute(rusqlite::params![
            self.run_id, r.rank, r.name, r.raw_phone, r.cleaned_phone,
            r.kind.as_str(), r.messaging_link, r.source_query,
        ])?;
        Ok(())
    }
}

pub struct LeadRow {
    pub run_id: i64,
    pub rank: u32,
    pub name: String,
    pub raw_phone: Option<String>,
    pub cleaned_phone: String,
    pub kind: PhoneKind,
    pub messaging_link: String,
}

pub fn fetch_leads(
    conn: &Connection,
    kind: Option<PhoneKind>,
    run_id: Option<i64>,
    limit: usize,
) -> Result<Vec<LeadRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(k) = kind {
        conditions.push(format!("kind = ?{}", params.len() + 1));
        params.push(Box::new(k.as_str()));
    }
    if let Some(id) = run_id {
        conditions.push(format!("run_id = ?{}", params.len() + 1));
        params.push(Box::new(id));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT run_id, rank, name, raw_phone, cleaned_phone, kind, messaging_link
         FROM leads{}
         ORDER BY run_id DESC, rank
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            let kind: String = row.get(5)?;
            Ok(LeadRow {
                run_id: row.get(0)?,
                rank: row.get(1)?,
                name: row.get(2)?,
                raw_phone: row.get(3)?,
                cleaned_phone: row.get(4)?,
                kind: kind.parse().map_err(|e: String| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                messaging_link: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub leads: usize,
    pub by_kind: Vec<(PhoneKind, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let leads: usize = conn.query_row("SELECT COUNT(*) FROM leads", [], |r| r.get(0))?;
    let mut by_kind = Vec::with_capacity(PhoneKind::ALL.len());
    for kind in PhoneKind::ALL {
        let n: usize = conn.query_row(
            "SELECT COUNT(*) FROM leads WHERE kind = ?1",
            [kind.as_str()],
            |r| r.get(0),
        )?;
        by_kind.push((kind, n));
    }
    Ok(Stats { runs, leads, by_kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::StopReason;
    use crate::lead::testing::record;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn summary(emitted: usize) -> ScanSummary {
        ScanSummary {
            query: "Dentistas em Praia Grande, SP".to_string(),
            target: 10,
            collected: emitted + 1,
            rounds: 3,
            emitted,
            skipped: 1,
            whatsapp: 1,
            stop: StopReason::EndOfList,
        }
    }

    #[test]
    fn sink_persists_in_rank_order() {
        let conn = memory();
        let run = start_run(&conn, "Dentistas em Praia Grande, SP", 10).unwrap();
        let mut sink = SqliteSink::new(&conn, run);
        sink.emit(record(1, PhoneKind::MobileWhatsApp)).unwrap();
        sink.emit(record(2, PhoneKind::Landline)).unwrap();
        sink.emit(record(3, PhoneKind::Indeterminate)).unwrap();

        let rows = fetch_leads(&conn, None, Some(run), 50).unwrap();
        assert_eq!(rows.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(rows[0].kind, PhoneKind::MobileWhatsApp);
        assert_eq!(rows[0].messaging_link, "https://wa.me/5513999998888");
        assert_eq!(rows[2].raw_phone, None);
        assert_eq!(rows[2].cleaned_phone, "N/A");
    }

    #[test]
    fn duplicate_rank_in_run_rejected() {
        let conn = memory();
        let run = start_run(&conn, "q", 2).unwrap();
        let mut sink = SqliteSink::new(&conn, run);
        sink.emit(record(1, PhoneKind::Landline)).unwrap();
        assert!(sink.emit(record(1, PhoneKind::Landline)).is_err());
    }

    #[test]
    fn filter_by_kind() {
        let conn = memory();
        let run = start_run(&conn, "q", 3).unwrap();
        let mut sink = SqliteSink::new(&conn, run);
        sink.emit(record(1, PhoneKind::MobileWhatsApp)).unwrap();
        sink.emit(record(2, PhoneKind::Landline)).unwrap();

        let mobiles = fetch_leads(&conn, Some(PhoneKind::MobileWhatsApp), None, 50).unwrap();
        assert_eq!(mobiles.len(), 1);
        assert_eq!(mobiles[0].rank, 1);
    }

    #[test]
    fn run_lifecycle() {
        let conn = memory();
        let ok = start_run(&conn, "Dentistas em Praia Grande, SP", 10).unwrap();
        finish_run(&conn, ok, &summary(4)).unwrap();
        let failed = start_run(&conn, "Padarias em Santos, SP", 5).unwrap();
        fail_run(&conn, failed, "result feed not found").unwrap();

        let runs = fetch_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, failed);
        assert_eq!(runs[0].error.as_deref(), Some("result feed not found"));
        assert_eq!(runs[0].emitted, None);
        assert_eq!(runs[1].emitted, Some(4));
        assert_eq!(runs[1].rounds, Some(3));
        assert_eq!(runs[0].rounds, None);
        assert_eq!(runs[1].stop_reason.as_deref(), Some("end_of_list"));
    }

    #[test]
    fn stats_count_kinds() {
        let conn = memory();
        let run = start_run(&conn, "q", 3).unwrap();
        let mut sink = SqliteSink::new(&conn, run);
        sink.emit(record(1, PhoneKind::MobileWhatsApp)).unwrap();
        sink.emit(record(2, PhoneKind::MobileWhatsApp)).unwrap();
        sink.emit(record(3, PhoneKind::Invalid)).unwrap();

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.runs, 1);
        assert_eq!(s.leads, 3);
        assert!(s.by_kind.contains(&(PhoneKind::MobileWhatsApp, 2)));
        assert!(s.by_kind.contains(&(PhoneKind::Landline, 0)));
    }
}
