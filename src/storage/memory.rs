use crate::common::{AttendanceError, Result};
use crate::storage::models::*;
use crate::storage::store::Store;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Serializable snapshot of everything the store holds. Shared with the
/// file-backed store, which persists it wholesale.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreData {
    pub rooms: BTreeMap<RoomId, Room>,
    pub classrooms: BTreeMap<ClassroomId, Classroom>,
    pub students: BTreeMap<StudentId, Student>,
    pub slots: BTreeMap<SlotId, TimetableSlot>,
    pub cancellations: Vec<Cancellation>,
    pub lectures: BTreeMap<LectureId, Lecture>,
    /// Keyed by (lecture, student); the map enforces uniqueness.
    pub attendance: BTreeMap<(LectureId, StudentId), AttendanceRecord>,
    pub next_id: u32,
}

impl StoreData {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store. One mutex around all state makes every
/// read-then-write sequence atomic, which is what the get-or-create
/// contract requires when several room monitors share the store.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: StoreData) -> Self {
        Self { data: Mutex::new(data) }
    }

    pub fn snapshot(&self) -> StoreData {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        // A poisoned mutex means a panic mid-write; propagating the
        // panic is the only sound option for in-process state.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn room(&self, id: RoomId) -> Result<Room> {
        self.lock()
            .rooms
            .get(&id)
            .cloned()
            .ok_or_else(|| AttendanceError::RoomNotFound(format!("id {}", id)))
    }

    fn room_by_name(&self, name: &str) -> Result<Option<Room>> {
        Ok(self
            .lock()
            .rooms
            .values()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn rooms(&self) -> Result<Vec<Room>> {
        Ok(self.lock().rooms.values().cloned().collect())
    }

    fn insert_room(&self, name: &str, description: &str, camera_index: u32) -> Result<Room> {
        let mut data = self.lock();
        if let Some(existing) = data.rooms.values().find(|r| r.name == name) {
            return Ok(existing.clone());
        }
        let room = Room {
            id: data.allocate_id(),
            name: name.to_string(),
            description: description.to_string(),
            camera_index,
        };
        data.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    fn classroom(&self, id: ClassroomId) -> Result<Classroom> {
        self.lock()
            .classrooms
            .get(&id)
            .cloned()
            .ok_or_else(|| AttendanceError::ClassroomNotFound(format!("id {}", id)))
    }

    fn classroom_by_name(&self, name: &str) -> Result<Option<Classroom>> {
        Ok(self
            .lock()
            .classrooms
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn insert_classroom(&self, name: &str, description: &str) -> Result<Classroom> {
        let mut data = self.lock();
        if let Some(existing) = data.classrooms.values().find(|c| c.name == name) {
            return Ok(existing.clone());
        }
        let classroom = Classroom {
            id: data.allocate_id(),
            name: name.to_string(),
            description: description.to_string(),
        };
        data.classrooms.insert(classroom.id, classroom.clone());
        Ok(classroom)
    }

    fn student(&self, id: StudentId) -> Result<Student> {
        self.lock()
            .students
            .get(&id)
            .cloned()
            .ok_or_else(|| AttendanceError::StudentNotFound(format!("id {}", id)))
    }

    fn student_by_label(&self, face_label: &str) -> Result<Option<Student>> {
        Ok(self
            .lock()
            .students
            .values()
            .find(|s| s.face_label == face_label)
            .cloned())
    }

    fn students_in_classroom(&self, classroom: ClassroomId) -> Result<Vec<Student>> {
        let mut students: Vec<Student> = self
            .lock()
            .students
            .values()
            .filter(|s| s.classroom == classroom)
            .cloned()
            .collect();
        students.sort_by(|a, b| a.roll_no.cmp(&b.roll_no));
        Ok(students)
    }

    fn insert_student(
        &self,
        roll_no: &str,
        name: &str,
        classroom: ClassroomId,
        face_label: &str,
    ) -> Result<Student> {
        let mut data = self.lock();
        if let Some(existing) = data.students.values().find(|s| s.roll_no == roll_no) {
            return Ok(existing.clone());
        }
        let student = Student {
            id: data.allocate_id(),
            roll_no: roll_no.to_string(),
            name: name.to_string(),
            classroom,
            face_label: face_label.to_string(),
        };
        data.students.insert(student.id, student.clone());
        Ok(student)
    }

    fn slot(&self, id: SlotId) -> Result<TimetableSlot> {
        self.lock()
            .slots
            .get(&id)
            .cloned()
            .ok_or(AttendanceError::SlotNotFound(id))
    }

    fn slots_for_room(&self, room: RoomId) -> Result<Vec<TimetableSlot>> {
        let mut slots: Vec<TimetableSlot> = self
            .lock()
            .slots
            .values()
            .filter(|s| s.room == room)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    fn slots_for_classroom(&self, classroom: ClassroomId) -> Result<Vec<TimetableSlot>> {
        let mut slots: Vec<TimetableSlot> = self
            .lock()
            .slots
            .values()
            .filter(|s| s.classroom == classroom)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    fn insert_slot(&self, slot: NewSlot) -> Result<TimetableSlot> {
        let mut data = self.lock();
        let slot = TimetableSlot {
            id: data.allocate_id(),
            room: slot.room,
            classroom: slot.classroom,
            subject: slot.subject,
            teacher: slot.teacher,
            occurrence: slot.occurrence,
            start_time: slot.start_time,
            end_time: slot.end_time,
        };
        data.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    fn is_cancelled(&self, slot: SlotId, date: NaiveDate) -> Result<bool> {
        Ok(self
            .lock()
            .cancellations
            .iter()
            .any(|c| c.slot == slot && c.date == date))
    }

    fn insert_cancellation(&self, slot: SlotId, date: NaiveDate, reason: &str) -> Result<()> {
        let mut data = self.lock();
        if !data.slots.contains_key(&slot) {
            return Err(AttendanceError::SlotNotFound(slot));
        }
        if data.cancellations.iter().any(|c| c.slot == slot && c.date == date) {
            return Ok(());
        }
        data.cancellations.push(Cancellation {
            slot,
            date,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn lecture(&self, id: LectureId) -> Result<Lecture> {
        self.lock()
            .lectures
            .get(&id)
            .cloned()
            .ok_or(AttendanceError::LectureNotFound(id))
    }

    fn lecture_for(&self, slot: SlotId, date: NaiveDate) -> Result<Option<Lecture>> {
        Ok(self
            .lock()
            .lectures
            .values()
            .find(|l| l.slot == slot && l.date == date)
            .cloned())
    }

    fn get_or_create_lecture(&self, slot: SlotId, date: NaiveDate) -> Result<Lecture> {
        let mut data = self.lock();
        if !data.slots.contains_key(&slot) {
            return Err(AttendanceError::SlotNotFound(slot));
        }
        if let Some(existing) = data.lectures.values().find(|l| l.slot == slot && l.date == date) {
            return Ok(existing.clone());
        }
        let lecture = Lecture {
            id: data.allocate_id(),
            slot,
            date,
            status: LectureStatus::Scheduled,
            started_at: None,
            ended_at: None,
            carried_from: None,
        };
        data.lectures.insert(lecture.id, lecture.clone());
        Ok(lecture)
    }

    fn update_lecture(&self, lecture: &Lecture) -> Result<()> {
        let mut data = self.lock();
        match data.lectures.get_mut(&lecture.id) {
            Some(stored) => {
                *stored = lecture.clone();
                Ok(())
            }
            None => Err(AttendanceError::LectureNotFound(lecture.id)),
        }
    }

    fn attendance_for_lecture(&self, lecture: LectureId) -> Result<Vec<AttendanceRecord>> {
        Ok(self
            .lock()
            .attendance
            .values()
            .filter(|r| r.lecture == lecture)
            .cloned()
            .collect())
    }

    fn attendance_record(
        &self,
        lecture: LectureId,
        student: StudentId,
    ) -> Result<Option<AttendanceRecord>> {
        Ok(self.lock().attendance.get(&(lecture, student)).cloned())
    }

    fn get_or_create_attendance(
        &self,
        lecture: LectureId,
        student: StudentId,
        default: AttendanceRecord,
    ) -> Result<(AttendanceRecord, bool)> {
        let mut data = self.lock();
        if let Some(existing) = data.attendance.get(&(lecture, student)) {
            return Ok((existing.clone(), false));
        }
        data.attendance.insert((lecture, student), default.clone());
        Ok((default, true))
    }

    fn update_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        let mut data = self.lock();
        let key = (record.lecture, record.student);
        match data.attendance.get_mut(&key) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(AttendanceError::Storage(format!(
                "No attendance record for lecture {} student {}",
                record.lecture, record.student
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_room_is_get_or_create_on_name() {
        let store = MemoryStore::new();
        let a = store.insert_room("Room 101", "Main hall", 0).unwrap();
        let b = store.insert_room("Room 101", "ignored", 3).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.camera_index, 0);
        assert_eq!(store.rooms().unwrap().len(), 1);
    }

    #[test]
    fn lecture_creation_is_idempotent_per_slot_and_date() {
        let store = MemoryStore::new();
        let room = store.insert_room("Room 101", "", 0).unwrap();
        let class = store.insert_classroom("CS-A", "").unwrap();
        let slot = store
            .insert_slot(NewSlot {
                room: room.id,
                classroom: class.id,
                subject: "Data Structures".into(),
                teacher: "Dr. Smith".into(),
                occurrence: SlotOccurrence::Recurring { weekday: chrono::Weekday::Mon },
                start_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            })
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        let first = store.get_or_create_lecture(slot.id, date).unwrap();
        let second = store.get_or_create_lecture(slot.id, date).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, LectureStatus::Scheduled);
    }

    #[test]
    fn attendance_get_or_create_reports_creation() {
        let store = MemoryStore::new();
        let default = AttendanceRecord {
            lecture: 1,
            student: 2,
            status: AttendanceStatus::Absent,
            marked_at: None,
            marked_by_biometric: false,
        };
        let (_, created) = store.get_or_create_attendance(1, 2, default.clone()).unwrap();
        assert!(created);
        let (row, created) = store.get_or_create_attendance(1, 2, default).unwrap();
        assert!(!created);
        assert_eq!(row.status, AttendanceStatus::Absent);
    }

    #[test]
    fn unknown_ids_are_typed_errors() {
        let store = MemoryStore::new();
        assert!(matches!(store.slot(42), Err(AttendanceError::SlotNotFound(42))));
        assert!(matches!(store.lecture(7), Err(AttendanceError::LectureNotFound(7))));
    }
}
