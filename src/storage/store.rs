use crate::common::Result;
use crate::storage::models::*;
use chrono::NaiveDate;

/// Persistence boundary for the attendance core.
///
/// Get-or-create operations must be insert-or-fetch atomic: two monitors
/// racing on the same key must observe a single row. The in-process
/// implementations guarantee this with a single lock around all state.
pub trait Store: Send + Sync {
    // Rooms
    fn room(&self, id: RoomId) -> Result<Room>;
    fn room_by_name(&self, name: &str) -> Result<Option<Room>>;
    fn rooms(&self) -> Result<Vec<Room>>;
    fn insert_room(&self, name: &str, description: &str, camera_index: u32) -> Result<Room>;

    // Classrooms
    fn classroom(&self, id: ClassroomId) -> Result<Classroom>;
    fn classroom_by_name(&self, name: &str) -> Result<Option<Classroom>>;
    fn insert_classroom(&self, name: &str, description: &str) -> Result<Classroom>;

    // Students
    fn student(&self, id: StudentId) -> Result<Student>;
    /// Lookup by enrollment label. A miss is a normal outcome for the
    /// recognition gate, not an error.
    fn student_by_label(&self, face_label: &str) -> Result<Option<Student>>;
    fn students_in_classroom(&self, classroom: ClassroomId) -> Result<Vec<Student>>;
    fn insert_student(
        &self,
        roll_no: &str,
        name: &str,
        classroom: ClassroomId,
        face_label: &str,
    ) -> Result<Student>;

    // Timetable slots
    fn slot(&self, id: SlotId) -> Result<TimetableSlot>;
    fn slots_for_room(&self, room: RoomId) -> Result<Vec<TimetableSlot>>;
    fn slots_for_classroom(&self, classroom: ClassroomId) -> Result<Vec<TimetableSlot>>;
    fn insert_slot(&self, slot: NewSlot) -> Result<TimetableSlot>;

    // Cancellations
    fn is_cancelled(&self, slot: SlotId, date: NaiveDate) -> Result<bool>;
    fn insert_cancellation(&self, slot: SlotId, date: NaiveDate, reason: &str) -> Result<()>;

    // Lectures
    fn lecture(&self, id: LectureId) -> Result<Lecture>;
    fn lecture_for(&self, slot: SlotId, date: NaiveDate) -> Result<Option<Lecture>>;
    /// Idempotent creation keyed on (slot, date). New lectures start
    /// `Scheduled`.
    fn get_or_create_lecture(&self, slot: SlotId, date: NaiveDate) -> Result<Lecture>;
    fn update_lecture(&self, lecture: &Lecture) -> Result<()>;

    // Attendance
    fn attendance_for_lecture(&self, lecture: LectureId) -> Result<Vec<AttendanceRecord>>;
    fn attendance_record(
        &self,
        lecture: LectureId,
        student: StudentId,
    ) -> Result<Option<AttendanceRecord>>;
    /// Idempotent creation keyed on (lecture, student). Returns the row
    /// and whether this call created it.
    fn get_or_create_attendance(
        &self,
        lecture: LectureId,
        student: StudentId,
        default: AttendanceRecord,
    ) -> Result<(AttendanceRecord, bool)>;
    fn update_attendance(&self, record: &AttendanceRecord) -> Result<()>;
}
