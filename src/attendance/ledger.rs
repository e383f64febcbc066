use crate::common::Result;
use crate::storage::{
    AttendanceRecord, AttendanceStatus, LectureId, Store, StudentId,
};
use chrono::NaiveDateTime;
use std::collections::HashSet;

/// Result of a single `mark_present` call, so callers can suppress
/// duplicate notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkOutcome {
    /// True when this call transitioned the record to present.
    pub newly_marked: bool,
    pub previous_status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BulkSummary {
    pub present: usize,
    pub absent: usize,
}

/// Attendance mutations, all idempotent and keyed by (lecture, student).
pub struct AttendanceLedger<'a> {
    store: &'a dyn Store,
}

impl<'a> AttendanceLedger<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    fn absent_default(lecture: LectureId, student: StudentId) -> AttendanceRecord {
        AttendanceRecord {
            lecture,
            student,
            status: AttendanceStatus::Absent,
            marked_at: None,
            marked_by_biometric: false,
        }
    }

    /// Create a default-absent record for every student enrolled in the
    /// lecture's classroom. Existing records are left untouched.
    pub fn initialize_fresh(&self, lecture: LectureId) -> Result<usize> {
        let lec = self.store.lecture(lecture)?;
        let slot = self.store.slot(lec.slot)?;
        let students = self.store.students_in_classroom(slot.classroom)?;
        let count = students.len();
        for student in students {
            self.store
                .get_or_create_attendance(lecture, student.id, Self::absent_default(lecture, student.id))?;
        }
        Ok(count)
    }

    /// Replicate every record of `source` onto `target`, preserving
    /// status, timestamp and the biometric flag. Idempotent.
    pub fn copy_forward(&self, source: LectureId, target: LectureId) -> Result<usize> {
        let records = self.store.attendance_for_lecture(source)?;
        let count = records.len();
        for record in records {
            let copied = AttendanceRecord {
                lecture: target,
                student: record.student,
                status: record.status,
                marked_at: record.marked_at,
                marked_by_biometric: record.marked_by_biometric,
            };
            self.store
                .get_or_create_attendance(target, record.student, copied)?;
        }
        Ok(count)
    }

    /// Transition a record to present. A record that is already present
    /// is never touched again; the outcome says which case this was.
    pub fn mark_present(
        &self,
        lecture: LectureId,
        student: StudentId,
        by_biometric: bool,
        now: NaiveDateTime,
    ) -> Result<MarkOutcome> {
        let (mut record, _) = self.store.get_or_create_attendance(
            lecture,
            student,
            Self::absent_default(lecture, student),
        )?;

        let previous_status = record.status;
        if previous_status == AttendanceStatus::Present {
            return Ok(MarkOutcome { newly_marked: false, previous_status });
        }

        record.status = AttendanceStatus::Present;
        record.marked_at = Some(now);
        record.marked_by_biometric = by_biometric;
        self.store.update_attendance(&record)?;

        Ok(MarkOutcome { newly_marked: true, previous_status })
    }

    /// Administrative override: present for the given students, absent
    /// for everyone else, bypassing the biometric gate entirely.
    pub fn set_bulk(
        &self,
        lecture: LectureId,
        present: &HashSet<StudentId>,
        now: NaiveDateTime,
    ) -> Result<BulkSummary> {
        let mut summary = BulkSummary::default();
        for mut record in self.store.attendance_for_lecture(lecture)? {
            if present.contains(&record.student) {
                record.status = AttendanceStatus::Present;
                record.marked_at = Some(now);
                summary.present += 1;
            } else {
                record.status = AttendanceStatus::Absent;
                record.marked_at = None;
                summary.absent += 1;
            }
            record.marked_by_biometric = false;
            self.store.update_attendance(&record)?;
        }
        Ok(summary)
    }

    /// (present, total) counts for a lecture.
    pub fn summary(&self, lecture: LectureId) -> Result<(usize, usize)> {
        let records = self.store.attendance_for_lecture(lecture)?;
        let present = records
            .iter()
            .filter(|r| r.status == AttendanceStatus::Present)
            .count();
        Ok((present, records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, NewSlot, SlotOccurrence};
    use chrono::{NaiveDate, NaiveTime, Weekday};

    struct Fixture {
        store: MemoryStore,
        lecture: LectureId,
        students: Vec<StudentId>,
    }

    fn fixture(student_count: usize) -> Fixture {
        let store = MemoryStore::new();
        let room = store.insert_room("Room 101", "", 0).unwrap();
        let class = store.insert_classroom("CS-A", "").unwrap();
        let mut students = Vec::new();
        for i in 0..student_count {
            let s = store
                .insert_student(
                    &format!("CS-A-{:03}", i + 1),
                    &format!("Student {}", i + 1),
                    class.id,
                    &format!("CS-A_{:03}", i + 1),
                )
                .unwrap();
            students.push(s.id);
        }
        let slot = store
            .insert_slot(NewSlot {
                room: room.id,
                classroom: class.id,
                subject: "Data Structures".into(),
                teacher: "Dr. Smith".into(),
                occurrence: SlotOccurrence::Recurring { weekday: Weekday::Mon },
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            })
            .unwrap();
        let lecture = store
            .get_or_create_lecture(slot.id, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        Fixture { store, lecture: lecture.id, students }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap()
    }

    #[test]
    fn initialize_fresh_creates_one_absent_row_per_student() {
        let fx = fixture(4);
        let ledger = AttendanceLedger::new(&fx.store);
        assert_eq!(ledger.initialize_fresh(fx.lecture).unwrap(), 4);

        let records = fx.store.attendance_for_lecture(fx.lecture).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.status == AttendanceStatus::Absent));

        // Re-initialization does not clobber an existing mark.
        ledger.mark_present(fx.lecture, fx.students[0], true, now()).unwrap();
        ledger.initialize_fresh(fx.lecture).unwrap();
        let record = fx
            .store
            .attendance_record(fx.lecture, fx.students[0])
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);
    }

    #[test]
    fn mark_present_is_idempotent() {
        let fx = fixture(2);
        let ledger = AttendanceLedger::new(&fx.store);
        ledger.initialize_fresh(fx.lecture).unwrap();

        let first = ledger.mark_present(fx.lecture, fx.students[0], true, now()).unwrap();
        assert!(first.newly_marked);
        assert_eq!(first.previous_status, AttendanceStatus::Absent);

        let second = ledger.mark_present(fx.lecture, fx.students[0], true, now()).unwrap();
        assert!(!second.newly_marked);
        assert_eq!(second.previous_status, AttendanceStatus::Present);

        let record = fx
            .store
            .attendance_record(fx.lecture, fx.students[0])
            .unwrap()
            .unwrap();
        assert!(record.marked_by_biometric);
        assert_eq!(record.marked_at, Some(now()));
    }

    #[test]
    fn copy_forward_is_an_exact_copy() {
        let fx = fixture(2);
        let ledger = AttendanceLedger::new(&fx.store);
        ledger.initialize_fresh(fx.lecture).unwrap();
        ledger.mark_present(fx.lecture, fx.students[0], true, now()).unwrap();

        let slot = fx.store.slots_for_room(1).unwrap()[0].clone();
        let target = fx
            .store
            .get_or_create_lecture(slot.id, NaiveDate::from_ymd_opt(2026, 1, 12).unwrap())
            .unwrap();

        assert_eq!(ledger.copy_forward(fx.lecture, target.id).unwrap(), 2);
        let copied = fx
            .store
            .attendance_record(target.id, fx.students[0])
            .unwrap()
            .unwrap();
        assert_eq!(copied.status, AttendanceStatus::Present);
        assert_eq!(copied.marked_at, Some(now()));
        assert!(copied.marked_by_biometric);

        let absent = fx
            .store
            .attendance_record(target.id, fx.students[1])
            .unwrap()
            .unwrap();
        assert_eq!(absent.status, AttendanceStatus::Absent);
    }

    #[test]
    fn set_bulk_overrides_and_clears_biometric_flag() {
        let fx = fixture(3);
        let ledger = AttendanceLedger::new(&fx.store);
        ledger.initialize_fresh(fx.lecture).unwrap();
        ledger.mark_present(fx.lecture, fx.students[2], true, now()).unwrap();

        let present: HashSet<StudentId> = [fx.students[0]].into_iter().collect();
        let summary = ledger.set_bulk(fx.lecture, &present, now()).unwrap();
        assert_eq!(summary.present, 1);
        assert_eq!(summary.absent, 2);

        // The biometric mark on student 2 was overridden to absent.
        let record = fx
            .store
            .attendance_record(fx.lecture, fx.students[2])
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert_eq!(record.marked_at, None);
        assert!(!record.marked_by_biometric);
    }
}
