use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub type RoomId = u32;
pub type ClassroomId = u32;
pub type StudentId = u32;
pub type SlotId = u32;
pub type LectureId = u32;

/// Physical room with a mounted camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    /// Index of the video device watching this room.
    pub camera_index: u32,
}

/// Student division/section, e.g. "CS-A". Owns a roster of students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classroom {
    pub id: ClassroomId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub roll_no: String,
    pub name: String,
    pub classroom: ClassroomId,
    /// Stable label the recognizer reports for this person.
    pub face_label: String,
}

/// When a timetable slot takes effect.
///
/// Recurring slots repeat weekly on a fixed weekday; extra slots apply
/// to exactly one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotOccurrence {
    Recurring { weekday: Weekday },
    Extra { date: NaiveDate },
}

impl SlotOccurrence {
    pub fn effective_on(&self, date: NaiveDate) -> bool {
        match self {
            SlotOccurrence::Recurring { weekday } => date.weekday() == *weekday,
            SlotOccurrence::Extra { date: d } => *d == date,
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, SlotOccurrence::Recurring { .. })
    }
}

/// One timetable entry: who uses which room at what time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimetableSlot {
    pub id: SlotId,
    pub room: RoomId,
    pub classroom: ClassroomId,
    pub subject: String,
    pub teacher: String,
    pub occurrence: SlotOccurrence,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl TimetableSlot {
    /// Half-open interval overlap test on times of day.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && self.end_time > start
    }
}

/// Candidate slot, validated by the conflict resolver before insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSlot {
    pub room: RoomId,
    pub classroom: ClassroomId,
    pub subject: String,
    pub teacher: String,
    pub occurrence: SlotOccurrence,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Soft-cancellation of one occurrence of a slot. The weekly definition
/// is untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub slot: SlotId,
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LectureStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl std::fmt::Display for LectureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LectureStatus::Scheduled => "scheduled",
            LectureStatus::Active => "active",
            LectureStatus::Completed => "completed",
            LectureStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One concrete, dated occurrence of a timetable slot. Unique per
/// (slot, date); never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lecture {
    pub id: LectureId,
    pub slot: SlotId,
    pub date: NaiveDate,
    pub status: LectureStatus,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    /// Lecture this one inherited attendance from, if any. Always a
    /// completed lecture of the adjacent preceding slot on the same date.
    pub carried_from: Option<LectureId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        };
        f.write_str(s)
    }
}

/// Per-student attendance row, unique per (lecture, student). Created at
/// lecture start and only ever updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub lecture: LectureId,
    pub student: StudentId,
    pub status: AttendanceStatus,
    pub marked_at: Option<NaiveDateTime>,
    pub marked_by_biometric: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recurring_occurrence_matches_weekday() {
        let occ = SlotOccurrence::Recurring { weekday: Weekday::Mon };
        // 2026-01-05 is a Monday
        assert!(occ.effective_on(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()));
        assert!(!occ.effective_on(NaiveDate::from_ymd_opt(2026, 1, 6).unwrap()));
    }

    #[test]
    fn extra_occurrence_matches_exact_date() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let occ = SlotOccurrence::Extra { date };
        assert!(occ.effective_on(date));
        // Same weekday one week later must not match
        assert!(!occ.effective_on(date + chrono::Duration::days(7)));
    }

    #[test]
    fn slot_overlap_is_half_open() {
        let slot = TimetableSlot {
            id: 1,
            room: 1,
            classroom: 1,
            subject: "Data Structures".into(),
            teacher: "Dr. Smith".into(),
            occurrence: SlotOccurrence::Recurring { weekday: Weekday::Mon },
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        };
        // Back-to-back is not an overlap
        assert!(!slot.overlaps(
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap()
        ));
        assert!(slot.overlaps(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap()
        ));
    }
}
