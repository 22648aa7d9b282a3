use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;

/// The cohort is a single department; imports may omit it.
const DEFAULT_DEPARTMENT: &str = "AI & Machine Learning";

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

#[derive(Debug, Clone)]
struct RosterEntry {
    enrollment_no: String,
    name: String,
    department: String,
}

fn parse_roster(params: &serde_json::Value) -> Result<Vec<RosterEntry>, HandlerErr> {
    let Some(items) = params.get("students").and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing students".to_string(),
            details: None,
        });
    };
    if items.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "students must not be empty".to_string(),
            details: None,
        });
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut roster = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let enrollment_no = item
            .get("enrollmentNo")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("students[{}] missing enrollmentNo", i),
                details: None,
            })?
            .to_string();
        let name = item
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("students[{}] missing name", i),
                details: None,
            })?
            .to_string();
        let department = item
            .get("department")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_DEPARTMENT)
            .to_string();

        if !seen.insert(enrollment_no.clone()) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("duplicate enrollmentNo in payload: {}", enrollment_no),
                details: None,
            });
        }
        roster.push(RosterEntry {
            enrollment_no,
            name,
            department,
        });
    }
    Ok(roster)
}

fn students_import(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roster = parse_roster(params)?;
    let replace = params
        .get("replace")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .map_err(db_err)?;
    if existing > 0 && !replace {
        return Err(HandlerErr {
            code: "roster_exists",
            message: format!("{} students already imported; pass replace to reprovision", existing),
            details: None,
        });
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    if replace {
        // Reprovisioning wipes the ledger too; entries reference students.
        for table in ["lecture_entries", "lecture_records", "students"] {
            tx.execute(&format!("DELETE FROM {}", table), [])
                .map_err(|e| HandlerErr {
                    code: "db_delete_failed",
                    message: e.to_string(),
                    details: Some(json!({ "table": table })),
                })?;
        }
    }
    for entry in &roster {
        tx.execute(
            "INSERT INTO students(enrollment_no, name, department) VALUES(?, ?, ?)",
            (&entry.enrollment_no, &entry.name, &entry.department),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "students", "enrollmentNo": entry.enrollment_no })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "imported": roster.len() }))
}

fn students_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT enrollment_no, name, department
             FROM students
             ORDER BY enrollment_no",
        )
        .map_err(db_err)?;
    let students = stmt
        .query_map([], |r| {
            Ok(json!({
                "enrollmentNo": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "department": r.get::<_, String>(2)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(json!({ "students": students }))
}

fn students_get(
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
    let row = conn
        .query_row(
            "SELECT enrollment_no, name, department FROM students WHERE enrollment_no = ?",
            [enrollment_no],
            |r| {
                Ok(json!({
                    "enrollmentNo": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "department": r.get::<_, String>(2)?
                }))
            },
        )
        .optional()
        .map_err(db_err)?;
    match row {
        Some(student) => Ok(json!({ "student": student })),
        None => Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        }),
    }
}

fn with_conn(
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
        "students.import" => Some(with_conn(state, req, |c| students_import(c, &req.params))),
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.get" => Some(with_conn(state, req, |c| students_get(c, &req.params))),
        _ => None,
    }
}
