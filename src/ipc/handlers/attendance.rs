use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule;
use crate::stats::{LectureStatus, PresenceStatus};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn bad_params(message: impl Into<String>) -> HandlerErr {
    HandlerErr {
        code: "bad_params",
        message: message.into(),
        details: None,
    }
}

fn db_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| bad_params(format!("missing {}", key)))
}

fn parse_date_param(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    schedule::parse_iso(&raw).ok_or_else(|| bad_params(format!("{} must be YYYY-MM-DD", key)))
}

fn last_recorded_date(conn: &Connection) -> Result<Option<NaiveDate>, HandlerErr> {
    let raw: Option<String> = conn
        .query_row("SELECT MAX(date) FROM lecture_records", [], |r| r.get(0))
        .map_err(db_err)?;
    match raw {
        None => Ok(None),
        Some(s) => schedule::parse_iso(&s)
            .map(Some)
            .ok_or_else(|| HandlerErr {
                code: "db_query_failed",
                message: format!("stored date is not YYYY-MM-DD: {}", s),
                details: None,
            }),
    }
}

fn attendance_active_date(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    // Tests pin `today`; production callers omit it.
    let today = match params.get("today") {
        Some(_) => parse_date_param(params, "today")?,
        None => Local::now().date_naive(),
    };
    let last = last_recorded_date(conn)?;
    let active = schedule::active_date(last, today);
    Ok(json!({
        "date": schedule::format_iso(active),
        "day": schedule::day_name(active)
    }))
}

#[derive(Debug, Clone)]
struct SubmittedEntry {
    enrollment_no: String,
    status: PresenceStatus,
}

fn parse_entries(params: &serde_json::Value) -> Result<Vec<SubmittedEntry>, HandlerErr> {
    let Some(items) = params.get("entries").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut entries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let enrollment_no = item
            .get("enrollmentNo")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| bad_params(format!("entries[{}] missing enrollmentNo", i)))?
            .to_string();
        let status_raw = item
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| bad_params(format!("entries[{}] missing status", i)))?;
        let status = PresenceStatus::parse(status_raw).ok_or_else(|| {
            bad_params(format!(
                "entries[{}] status must be Present or Absent",
                i
            ))
        })?;
        if !seen.insert(enrollment_no.clone()) {
            return Err(bad_params(format!(
                "duplicate entry for enrollmentNo {}",
                enrollment_no
            )));
        }
        entries.push(SubmittedEntry {
            enrollment_no,
            status,
        });
    }
    Ok(entries)
}

fn check_known_students(conn: &Connection, entries: &[SubmittedEntry]) -> Result<(), HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT 1 FROM students WHERE enrollment_no = ?")
        .map_err(db_err)?;
    let mut unknown: Vec<String> = Vec::new();
    for entry in entries {
        let found = stmt
            .query_row([&entry.enrollment_no], |r| r.get::<_, i64>(0))
            .optional()
            .map_err(db_err)?
            .is_some();
        if !found {
            unknown.push(entry.enrollment_no.clone());
        }
    }
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(HandlerErr {
            code: "bad_params",
            message: "entries reference unknown students".to_string(),
            details: Some(json!({ "unknownEnrollmentNos": unknown })),
        })
    }
}

fn attendance_submit(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = parse_date_param(params, "date")?;
    let date_str = schedule::format_iso(date);
    let day = get_required_str(params, "day")?;
    // `day` is redundant with `date`; a mismatch means the caller's calendar
    // is broken, so reject rather than silently correct.
    let expected_day = schedule::day_name(date);
    if day != expected_day {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("day {} does not match date {} ({})", day, date_str, expected_day),
            details: None,
        });
    }
    let status_raw = get_required_str(params, "lectureStatus")?;
    let status = LectureStatus::parse(&status_raw)
        .ok_or_else(|| bad_params("lectureStatus must be Conducted or Cancelled"))?;
    let submitted_by = get_required_str(params, "submittedBy")?;

    // A cancelled lecture stores no entries, whatever was supplied.
    let entries = match status {
        LectureStatus::Cancelled => Vec::new(),
        LectureStatus::Conducted => parse_entries(params)?,
    };
    check_known_students(conn, &entries)?;

    // Friendly pre-check; the UNIQUE constraint below remains the real guard
    // against two near-simultaneous submissions for the same date.
    let exists = conn
        .query_row(
            "SELECT 1 FROM lecture_records WHERE date = ?",
            [&date_str],
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_err)?
        .is_some();
    if exists {
        return Err(HandlerErr {
            code: "duplicate_date",
            message: format!("attendance already recorded for {}", date_str),
            details: None,
        });
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;

    let record_id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    let inserted = tx.execute(
        "INSERT INTO lecture_records(id, date, day, lecture_status, submitted_by, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &record_id,
            &date_str,
            &day,
            status.as_str(),
            &submitted_by,
            &created_at,
        ),
    );
    if let Err(e) = inserted {
        return Err(match e {
            rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
                HandlerErr {
                    code: "duplicate_date",
                    message: format!("attendance already recorded for {}", date_str),
                    details: None,
                }
            }
            other => HandlerErr {
                code: "db_insert_failed",
                message: other.to_string(),
                details: Some(json!({ "table": "lecture_records" })),
            },
        });
    }

    for entry in &entries {
        tx.execute(
            "INSERT INTO lecture_entries(record_id, enrollment_no, status) VALUES(?, ?, ?)",
            (&record_id, &entry.enrollment_no, entry.status.as_str()),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "lecture_entries" })),
        })?;
    }

    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({
        "recordId": record_id,
        "date": date_str,
        "entryCount": entries.len()
    }))
}

fn attendance_history(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT
               r.id,
               r.date,
               r.day,
               r.lecture_status,
               r.submitted_by,
               (SELECT COUNT(*) FROM lecture_entries e
                WHERE e.record_id = r.id AND e.status = 'Present') AS present_count,
               (SELECT COUNT(*) FROM lecture_entries e
                WHERE e.record_id = r.id AND e.status = 'Absent') AS absent_count
             FROM lecture_records r
             ORDER BY r.date DESC",
        )
        .map_err(db_err)?;
    let records = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "date": r.get::<_, String>(1)?,
                "day": r.get::<_, String>(2)?,
                "status": r.get::<_, String>(3)?,
                "submittedBy": r.get::<_, String>(4)?,
                "presentCount": r.get::<_, i64>(5)?,
                "absentCount": r.get::<_, i64>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(json!({ "records": records }))
}

fn handle_active_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_active_date(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_submit(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_history(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.activeDate" => Some(handle_active_date(state, req)),
        "attendance.submit" => Some(handle_submit(state, req)),
        "attendance.history" => Some(handle_history(state, req)),
        _ => None,
    }
}
