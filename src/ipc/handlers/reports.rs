use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, LectureRow, LectureStatus, PresenceStatus};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

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

fn db_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn corrupt(message: String) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message,
        details: None,
    }
}

#[derive(Debug, Clone)]
struct StudentRow {
    enrollment_no: String,
    name: String,
    department: String,
}

fn load_students(conn: &Connection) -> Result<Vec<StudentRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT enrollment_no, name, department
             FROM students
             ORDER BY enrollment_no",
        )
        .map_err(db_err)?;
    stmt.query_map([], |r| {
        Ok(StudentRow {
            enrollment_no: r.get(0)?,
            name: r.get(1)?,
            department: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

/// Full ledger in date order, entries attached. Every report recomputes from
/// this; the date axis is never cached across calls.
fn load_ledger(conn: &Connection) -> Result<Vec<LectureRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, date, day, lecture_status
             FROM lecture_records
             ORDER BY date",
        )
        .map_err(db_err)?;
    let raw_records = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut entry_stmt = conn
        .prepare(
            "SELECT enrollment_no, status
             FROM lecture_entries
             WHERE record_id = ?",
        )
        .map_err(db_err)?;

    let mut records = Vec::with_capacity(raw_records.len());
    for (id, date, day, status_raw) in raw_records {
        let status = LectureStatus::parse(&status_raw)
            .ok_or_else(|| corrupt(format!("invalid lecture_status stored: {}", status_raw)))?;
        let mut entries: HashMap<String, PresenceStatus> = HashMap::new();
        let rows = entry_stmt
            .query_map([&id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(db_err)?;
        for (enrollment_no, presence_raw) in rows {
            let presence = PresenceStatus::parse(&presence_raw)
                .ok_or_else(|| corrupt(format!("invalid entry status stored: {}", presence_raw)))?;
            entries.insert(enrollment_no, presence);
        }
        records.push(LectureRow {
            date,
            day,
            status,
            entries,
        });
    }
    Ok(records)
}

fn student_report(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(enrollment_no) = params.get("enrollmentNo").and_then(|v| v.as_str()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing enrollmentNo".to_string(),
            details: None,
        });
    };

    let student = conn
        .query_row(
            "SELECT enrollment_no, name, department FROM students WHERE enrollment_no = ?",
            [enrollment_no],
            |r| {
                Ok(StudentRow {
                    enrollment_no: r.get(0)?,
                    name: r.get(1)?,
                    department: r.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        })?;

    let records = load_ledger(conn)?;
    let statistics = stats::student_statistics(&records, &student.enrollment_no);
    let trend = stats::monthly_trend(&records, &student.enrollment_no);

    let attendance_data: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            let status = match record.status {
                LectureStatus::Cancelled => "Cancelled",
                LectureStatus::Conducted => {
                    stats::presence_for(record, &student.enrollment_no).as_str()
                }
            };
            json!({
                "date": record.date,
                "day": record.day,
                "status": status,
                "lectureStatus": record.status.as_str()
            })
        })
        .collect();

    Ok(json!({
        "student": {
            "enrollmentNo": student.enrollment_no,
            "name": student.name,
            "department": student.department
        },
        "statistics": statistics,
        "attendanceData": attendance_data,
        "monthlyTrend": trend
    }))
}

fn cohort_stats(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let total_students: i64 = conn
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .map_err(db_err)?;
    let records = load_ledger(conn)?;
    let summary = stats::cohort_statistics(total_students as usize, &records);
    Ok(serde_json::to_value(summary).unwrap_or_else(|_| json!({})))
}

fn cohort_matrix(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let students = load_students(conn)?;
    let records = load_ledger(conn)?;

    let dates: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            json!({
                "date": r.date,
                "day": r.day,
                "status": r.status.as_str()
            })
        })
        .collect();

    let matrix: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            let mut attendance = serde_json::Map::new();
            for record in &records {
                attendance.insert(
                    record.date.clone(),
                    json!(stats::matrix_cell(record, &s.enrollment_no)),
                );
            }
            json!({
                "enrollmentNo": s.enrollment_no,
                "name": s.name,
                "attendance": attendance
            })
        })
        .collect();

    Ok(json!({ "dates": dates, "students": matrix }))
}

fn handle(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentReport" => Some(handle(state, req, |c| student_report(c, &req.params))),
        "reports.cohortStats" => Some(handle(state, req, cohort_stats)),
        "reports.cohortMatrix" => Some(handle(state, req, cohort_matrix)),
        _ => None,
    }
}
