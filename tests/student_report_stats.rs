
use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{error_code, provision_workspace, request, request_ok, spawn_sidecar, temp_dir};

fn submit(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    date: &str,
    day: &str,
    status: &str,
    entries: serde_json::Value,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "attendance.submit",
        json!({
            "date": date,
            "day": day,
            "lectureStatus": status,
            "entries": entries,
            "submittedBy": "admin"
        }),
    );
}

#[test]
fn report_counts_match_the_spec_scenario() {
    let workspace = temp_dir("cohortd-report-scenario");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    provision_workspace(&mut stdin, &mut reader, &workspace);

    // Ten conducted lectures in March 2024 (Tue-Fri weeks), student present in
    // the first seven, with one cancellation in between.
    let lectures = [
        ("2024-03-05", "Tuesday", true),
        ("2024-03-06", "Wednesday", true),
        ("2024-03-07", "Thursday", true),
        ("2024-03-08", "Friday", true),
        ("2024-03-12", "Tuesday", true),
        ("2024-03-14", "Thursday", true),
        ("2024-03-15", "Friday", true),
        ("2024-03-19", "Tuesday", false),
        ("2024-03-20", "Wednesday", false),
        ("2024-03-21", "Thursday", false),
    ];
    submit(
        &mut stdin,
        &mut reader,
        "cancel",
        "2024-03-13",
        "Wednesday",
        "Cancelled",
        json!([]),
    );
    for (i, (date, day, present)) in lectures.iter().enumerate() {
        let status = if *present { "Present" } else { "Absent" };
        submit(
            &mut stdin,
            &mut reader,
            &format!("lec-{}", i),
            date,
            day,
            "Conducted",
            json!([{ "enrollmentNo": "240280107001", "status": status }]),
        );
    }

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "report",
        "reports.studentReport",
        json!({ "enrollmentNo": "240280107001" }),
    );
    let stats = report.get("statistics").expect("statistics");
    assert_eq!(stats.get("totalLectures").and_then(|v| v.as_i64()), Some(10));
    assert_eq!(stats.get("presentCount").and_then(|v| v.as_i64()), Some(7));
    assert_eq!(stats.get("absentCount").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(stats.get("cancelledCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        stats.get("attendancePercentage").and_then(|v| v.as_f64()),
        Some(70.0)
    );

    // attendanceData covers every ledger date in ascending order, the
    // cancelled one marked as such.
    let data = report
        .get("attendanceData")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(data.len(), 11);
    for window in data.windows(2) {
        let a = window[0].get("date").and_then(|v| v.as_str()).unwrap_or("");
        let b = window[1].get("date").and_then(|v| v.as_str()).unwrap_or("");
        assert!(a < b, "attendanceData must be date-ascending");
    }
    let cancelled_row = data
        .iter()
        .find(|d| d.get("date").and_then(|v| v.as_str()) == Some("2024-03-13"))
        .expect("cancelled row present");
    assert_eq!(
        cancelled_row.get("status").and_then(|v| v.as_str()),
        Some("Cancelled")
    );

    let trend = report
        .get("monthlyTrend")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(trend.len(), 1);
    assert_eq!(
        trend[0].get("month").and_then(|v| v.as_str()),
        Some("2024-03")
    );
    assert_eq!(
        trend[0].get("percentage").and_then(|v| v.as_f64()),
        Some(70.0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unmarked_students_count_as_absent_not_missing() {
    let workspace = temp_dir("cohortd-report-absent-default");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    provision_workspace(&mut stdin, &mut reader, &workspace);

    // Only one student is explicitly marked; the others get no entry.
    submit(
        &mut stdin,
        &mut reader,
        "1",
        "2024-03-05",
        "Tuesday",
        "Conducted",
        json!([{ "enrollmentNo": "240280107001", "status": "Present" }]),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.studentReport",
        json!({ "enrollmentNo": "240280107036" }),
    );
    let stats = report.get("statistics").expect("statistics");
    assert_eq!(stats.get("totalLectures").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(stats.get("presentCount").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(stats.get("absentCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        stats.get("attendancePercentage").and_then(|v| v.as_f64()),
        Some(0.0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn percentage_is_zero_with_no_conducted_lectures() {
    let workspace = temp_dir("cohortd-report-zero");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    provision_workspace(&mut stdin, &mut reader, &workspace);

    submit(
        &mut stdin,
        &mut reader,
        "1",
        "2024-03-05",
        "Tuesday",
        "Cancelled",
        json!([]),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.studentReport",
        json!({ "enrollmentNo": "240280107001" }),
    );
    let stats = report.get("statistics").expect("statistics");
    assert_eq!(stats.get("totalLectures").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(stats.get("cancelledCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        stats.get("attendancePercentage").and_then(|v| v.as_f64()),
        Some(0.0)
    );
    assert!(report
        .get("monthlyTrend")
        .and_then(|v| v.as_array())
        .map(|a| a.is_empty())
        .unwrap_or(false));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_enrollment_is_not_found() {
    let workspace = temp_dir("cohortd-report-unknown");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    provision_workspace(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "reports.studentReport",
        json!({ "enrollmentNo": "000000000000" }),
    );
    assert_eq!(error_code(&resp), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
