use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn handle_export_bundle(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace_path) = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing workspacePath", None);
    };
    let Some(out_path) = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    match backup::export_workspace_bundle(&workspace_path, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "outPath": out_path.to_string_lossy()
            }),
        ),
        Err(e) => err(&req.id, "backup_export_failed", format!("{e:#}"), None),
    }
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace_path) = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing workspacePath", None);
    };
    let Some(in_path) = req
        .params
        .get("inPath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing inPath", None);
    };

    // Drop any open handle onto the database being replaced.
    if state.workspace.as_deref() == Some(workspace_path.as_path()) {
        state.db = None;
    }

    match backup::import_workspace_bundle(&in_path, &workspace_path) {
        Ok(summary) => {
            if state.workspace.as_deref() == Some(workspace_path.as_path()) {
                match crate::db::open_db(&workspace_path) {
                    Ok(conn) => state.db = Some(conn),
                    Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
                }
            }
            ok(
                &req.id,
                json!({ "bundleFormatDetected": summary.bundle_format_detected }),
            )
        }
        Err(e) => err(&req.id, "backup_import_failed", format!("{e:#}"), None),
    }
}

fn load_matrix_rows(
    conn: &Connection,
) -> Result<(Vec<(String, String)>, Vec<(String, String, String)>, HashMap<String, HashMap<String, String>>), rusqlite::Error> {
    let mut student_stmt = conn.prepare(
        "SELECT enrollment_no, name FROM students ORDER BY enrollment_no",
    )?;
    let students = student_stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut record_stmt = conn.prepare(
        "SELECT id, date, lecture_status FROM lecture_records ORDER BY date",
    )?;
    let records = record_stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut entry_stmt = conn.prepare(
        "SELECT enrollment_no, status FROM lecture_entries WHERE record_id = ?",
    )?;
    let mut entries_by_record: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (id, _, _) in &records {
        let entries = entry_stmt
            .query_map([id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        entries_by_record.insert(id.clone(), entries);
    }

    Ok((students, records, entries_by_record))
}

fn handle_export_matrix_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };

    let (students, records, entries_by_record) = match load_matrix_rows(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut csv = String::from("Enrollment No,Name");
    for (_, date, _) in &records {
        csv.push(',');
        csv.push_str(&csv_quote(date));
    }
    csv.push('\n');

    for (enrollment_no, name) in &students {
        csv.push_str(&csv_quote(enrollment_no));
        csv.push(',');
        csv.push_str(&csv_quote(name));
        for (id, _, status) in &records {
            let cell = if status == "Cancelled" {
                "N/A"
            } else {
                entries_by_record
                    .get(id)
                    .and_then(|m| m.get(enrollment_no))
                    .map(String::as_str)
                    .unwrap_or("Absent")
            };
            csv.push(',');
            csv.push_str(&csv_quote(cell));
        }
        csv.push('\n');
    }

    if let Some(parent) = out_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(&req.id, "io_failed", e.to_string(), None);
        }
    }
    if let Err(e) = std::fs::write(&out_path, csv) {
        return err(&req.id, "io_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "outPath": out_path.to_string_lossy(),
            "studentCount": students.len(),
            "dateCount": records.len()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import_bundle(state, req)),
        "exchange.exportMatrixCsv" => Some(handle_export_matrix_csv(state, req)),
        _ => None,
    }
}
