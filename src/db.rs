use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("attendance.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            enrollment_no TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department TEXT NOT NULL
        )",
        [],
    )?;

    // One row per calendar date. The UNIQUE constraint on date is the
    // duplicate-submission guard; an application-level check alone would
    // race between two writers.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lecture_records(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL UNIQUE,
            day TEXT NOT NULL,
            lecture_status TEXT NOT NULL,
            submitted_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lecture_entries(
            record_id TEXT NOT NULL,
            enrollment_no TEXT NOT NULL,
            status TEXT NOT NULL,
            PRIMARY KEY(record_id, enrollment_no),
            FOREIGN KEY(record_id) REFERENCES lecture_records(id),
            FOREIGN KEY(enrollment_no) REFERENCES students(enrollment_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lecture_entries_record ON lecture_entries(record_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lecture_entries_student ON lecture_entries(enrollment_no)",
        [],
    )?;

    Ok(conn)
}
