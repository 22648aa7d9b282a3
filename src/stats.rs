use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Cell marker for dates whose lecture was cancelled; distinct from Absent.
pub const CANCELLED_CELL: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LectureStatus {
    Conducted,
    Cancelled,
}

impl LectureStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Conducted" => Some(Self::Conducted),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conducted => "Conducted",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Present,
    Absent,
}

impl PresenceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Present" => Some(Self::Present),
            "Absent" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
        }
    }
}

/// One ledger row with its entries, as loaded from storage in date order.
#[derive(Debug, Clone)]
pub struct LectureRow {
    pub date: String,
    pub day: String,
    pub status: LectureStatus,
    pub entries: HashMap<String, PresenceStatus>,
}

/// Read-time convention: a student with no explicit entry on a conducted
/// lecture counts as Absent. Entries are never backfilled at write time, so
/// the ledger keeps recording who was actually marked.
pub fn presence_for(record: &LectureRow, enrollment_no: &str) -> PresenceStatus {
    record
        .entries
        .get(enrollment_no)
        .copied()
        .unwrap_or(PresenceStatus::Absent)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatistics {
    pub total_lectures: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub cancelled_count: i64,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortStatistics {
    pub total_students: i64,
    pub conducted_days: i64,
    pub cancelled_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPoint {
    pub month: String,
    pub percentage: f64,
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Per-student counts over the full ledger. Invariants: present + absent =
/// total_lectures, and total_lectures + cancelled = ledger length.
pub fn student_statistics(records: &[LectureRow], enrollment_no: &str) -> StudentStatistics {
    let mut total_lectures = 0i64;
    let mut present_count = 0i64;
    let mut absent_count = 0i64;
    let mut cancelled_count = 0i64;

    for record in records {
        match record.status {
            LectureStatus::Cancelled => cancelled_count += 1,
            LectureStatus::Conducted => {
                total_lectures += 1;
                match presence_for(record, enrollment_no) {
                    PresenceStatus::Present => present_count += 1,
                    PresenceStatus::Absent => absent_count += 1,
                }
            }
        }
    }

    let attendance_percentage = if total_lectures > 0 {
        round2(100.0 * present_count as f64 / total_lectures as f64)
    } else {
        0.0
    };

    StudentStatistics {
        total_lectures,
        present_count,
        absent_count,
        cancelled_count,
        attendance_percentage,
    }
}

pub fn cohort_statistics(total_students: usize, records: &[LectureRow]) -> CohortStatistics {
    let conducted = records
        .iter()
        .filter(|r| r.status == LectureStatus::Conducted)
        .count();
    CohortStatistics {
        total_students: total_students as i64,
        conducted_days: conducted as i64,
        cancelled_days: (records.len() - conducted) as i64,
    }
}

/// Matrix cell for one (record, student) pair: "N/A" for cancelled dates,
/// otherwise the recorded status with Absent as the default.
pub fn matrix_cell(record: &LectureRow, enrollment_no: &str) -> &'static str {
    match record.status {
        LectureStatus::Cancelled => CANCELLED_CELL,
        LectureStatus::Conducted => presence_for(record, enrollment_no).as_str(),
    }
}

/// Monthly attendance percentage for one student, grouped by the YYYY-MM
/// prefix of the date. Cancelled lectures are excluded; months with no
/// conducted lecture do not appear.
pub fn monthly_trend(records: &[LectureRow], enrollment_no: &str) -> Vec<MonthlyPoint> {
    let mut by_month: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    for record in records {
        if record.status != LectureStatus::Conducted {
            continue;
        }
        let month = record.date.get(0..7).unwrap_or(&record.date).to_string();
        let slot = by_month.entry(month).or_insert((0, 0));
        slot.1 += 1;
        if presence_for(record, enrollment_no) == PresenceStatus::Present {
            slot.0 += 1;
        }
    }
    by_month
        .into_iter()
        .map(|(month, (present, total))| MonthlyPoint {
            month,
            percentage: round1(100.0 * present as f64 / total as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conducted(date: &str, day: &str, present: &[&str], absent: &[&str]) -> LectureRow {
        let mut entries = HashMap::new();
        for e in present {
            entries.insert(e.to_string(), PresenceStatus::Present);
        }
        for e in absent {
            entries.insert(e.to_string(), PresenceStatus::Absent);
        }
        LectureRow {
            date: date.to_string(),
            day: day.to_string(),
            status: LectureStatus::Conducted,
            entries,
        }
    }

    fn cancelled(date: &str, day: &str) -> LectureRow {
        LectureRow {
            date: date.to_string(),
            day: day.to_string(),
            status: LectureStatus::Cancelled,
            entries: HashMap::new(),
        }
    }

    #[test]
    fn empty_ledger_yields_zeroed_statistics() {
        let s = student_statistics(&[], "240280107001");
        assert_eq!(s.total_lectures, 0);
        assert_eq!(s.attendance_percentage, 0.0);
    }

    #[test]
    fn counts_satisfy_the_ledger_identities() {
        let records = vec![
            conducted("2024-03-05", "Tuesday", &["a"], &["b"]),
            cancelled("2024-03-06", "Wednesday"),
            conducted("2024-03-07", "Thursday", &["b"], &[]),
        ];
        for who in ["a", "b", "never-marked"] {
            let s = student_statistics(&records, who);
            assert_eq!(s.present_count + s.absent_count, s.total_lectures);
            assert_eq!(
                s.total_lectures + s.cancelled_count,
                records.len() as i64,
                "identity must hold for {}",
                who
            );
        }
    }

    #[test]
    fn missing_entry_counts_as_absent_not_missing_data() {
        let records = vec![conducted("2024-03-05", "Tuesday", &["a"], &[])];
        let s = student_statistics(&records, "b");
        assert_eq!(s.absent_count, 1);
        assert_eq!(s.present_count, 0);
        assert_eq!(s.attendance_percentage, 0.0);
    }

    #[test]
    fn ten_conducted_seven_present_one_cancelled() {
        let mut records = Vec::new();
        for i in 0..10 {
            let date = format!("2024-03-{:02}", 5 + i);
            if i == 4 {
                records.push(cancelled("2024-03-15", "Friday"));
            }
            let row = if i < 7 {
                conducted(&date, "Tuesday", &["s1"], &[])
            } else {
                conducted(&date, "Tuesday", &[], &["s1"])
            };
            records.push(row);
        }
        let s = student_statistics(&records, "s1");
        assert_eq!(s.total_lectures, 10);
        assert_eq!(s.present_count, 7);
        assert_eq!(s.absent_count, 3);
        assert_eq!(s.cancelled_count, 1);
        assert_eq!(s.attendance_percentage, 70.0);
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        let records = vec![
            conducted("2024-03-05", "Tuesday", &["s1"], &[]),
            conducted("2024-03-06", "Wednesday", &["s1"], &[]),
            conducted("2024-03-07", "Thursday", &[], &["s1"]),
        ];
        let s = student_statistics(&records, "s1");
        // 2/3 -> 66.666... -> 66.67
        assert_eq!(s.attendance_percentage, 66.67);
    }

    #[test]
    fn cohort_statistics_counts_days_by_status() {
        let records = vec![
            conducted("2024-03-05", "Tuesday", &[], &[]),
            cancelled("2024-03-06", "Wednesday"),
            conducted("2024-03-07", "Thursday", &[], &[]),
        ];
        let c = cohort_statistics(42, &records);
        assert_eq!(c.total_students, 42);
        assert_eq!(c.conducted_days, 2);
        assert_eq!(c.cancelled_days, 1);
    }

    #[test]
    fn matrix_cells_distinguish_cancelled_from_absent() {
        let row = conducted("2024-03-05", "Tuesday", &["a"], &[]);
        assert_eq!(matrix_cell(&row, "a"), "Present");
        assert_eq!(matrix_cell(&row, "b"), "Absent");
        let off = cancelled("2024-03-06", "Wednesday");
        assert_eq!(matrix_cell(&off, "a"), CANCELLED_CELL);
    }

    #[test]
    fn monthly_trend_groups_by_month_and_skips_cancelled() {
        let records = vec![
            conducted("2024-03-05", "Tuesday", &["s1"], &[]),
            conducted("2024-03-06", "Wednesday", &[], &["s1"]),
            cancelled("2024-03-07", "Thursday"),
            conducted("2024-04-02", "Tuesday", &["s1"], &[]),
        ];
        let trend = monthly_trend(&records, "s1");
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].month, "2024-03");
        assert_eq!(trend[0].percentage, 50.0);
        assert_eq!(trend[1].month, "2024-04");
        assert_eq!(trend[1].percentage, 100.0);
    }

    #[test]
    fn monthly_trend_is_empty_when_nothing_was_conducted() {
        let records = vec![cancelled("2024-03-05", "Tuesday")];
        assert!(monthly_trend(&records, "s1").is_empty());
    }
}
