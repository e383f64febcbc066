use crate::common::{AttendanceError, Result};
use crate::storage::memory::{MemoryStore, StoreData};
use crate::storage::models::*;
use crate::storage::store::Store;
use chrono::NaiveDate;
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

const STORAGE_VERSION: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct Snapshot {
    version: u32,
    data: StoreData,
}

/// File-backed store: an in-memory store persisted as a versioned
/// bincode snapshot after every mutation. Adequate for the data volumes
/// of a timetable plus one attendance row per student per lecture.
pub struct FileStore {
    mem: MemoryStore,
    path: PathBuf,
}

impl FileStore {
    /// Open the store in the platform data directory, creating it on
    /// first run.
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "rollcall", "Rollcall")
            .ok_or_else(|| AttendanceError::Storage("Failed to get project dirs".into()))?;
        let data_dir = dirs.data_dir().to_path_buf();
        Self::open(data_dir)
    }

    pub fn open(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        let path = data_dir.join("attendance.bincode");

        let mem = if path.exists() {
            let bytes = fs::read(&path)?;
            let mut snapshot: Snapshot = bincode::deserialize(&bytes)
                .map_err(|e| AttendanceError::Storage(format!("Failed to deserialize: {}", e)))?;
            if snapshot.version < STORAGE_VERSION {
                // Future migration logic would go here
                snapshot.version = STORAGE_VERSION;
            }
            MemoryStore::from_data(snapshot.data)
        } else {
            MemoryStore::new()
        };

        Ok(Self { mem, path })
    }

    fn persist(&self) -> Result<()> {
        let snapshot = Snapshot {
            version: STORAGE_VERSION,
            data: self.mem.snapshot(),
        };
        let encoded = bincode::serialize(&snapshot)
            .map_err(|e| AttendanceError::Storage(format!("Failed to serialize: {}", e)))?;
        let tmp = self.path.with_extension("bincode.tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn room(&self, id: RoomId) -> Result<Room> {
        self.mem.room(id)
    }

    fn room_by_name(&self, name: &str) -> Result<Option<Room>> {
        self.mem.room_by_name(name)
    }

    fn rooms(&self) -> Result<Vec<Room>> {
        self.mem.rooms()
    }

    fn insert_room(&self, name: &str, description: &str, camera_index: u32) -> Result<Room> {
        let room = self.mem.insert_room(name, description, camera_index)?;
        self.persist()?;
        Ok(room)
    }

    fn classroom(&self, id: ClassroomId) -> Result<Classroom> {
        self.mem.classroom(id)
    }

    fn classroom_by_name(&self, name: &str) -> Result<Option<Classroom>> {
        self.mem.classroom_by_name(name)
    }

    fn insert_classroom(&self, name: &str, description: &str) -> Result<Classroom> {
        let classroom = self.mem.insert_classroom(name, description)?;
        self.persist()?;
        Ok(classroom)
    }

    fn student(&self, id: StudentId) -> Result<Student> {
        self.mem.student(id)
    }

    fn student_by_label(&self, face_label: &str) -> Result<Option<Student>> {
        self.mem.student_by_label(face_label)
    }

    fn students_in_classroom(&self, classroom: ClassroomId) -> Result<Vec<Student>> {
        self.mem.students_in_classroom(classroom)
    }

    fn insert_student(
        &self,
        roll_no: &str,
        name: &str,
        classroom: ClassroomId,
        face_label: &str,
    ) -> Result<Student> {
        let student = self.mem.insert_student(roll_no, name, classroom, face_label)?;
        self.persist()?;
        Ok(student)
    }

    fn slot(&self, id: SlotId) -> Result<TimetableSlot> {
        self.mem.slot(id)
    }

    fn slots_for_room(&self, room: RoomId) -> Result<Vec<TimetableSlot>> {
        self.mem.slots_for_room(room)
    }

    fn slots_for_classroom(&self, classroom: ClassroomId) -> Result<Vec<TimetableSlot>> {
        self.mem.slots_for_classroom(classroom)
    }

    fn insert_slot(&self, slot: NewSlot) -> Result<TimetableSlot> {
        let slot = self.mem.insert_slot(slot)?;
        self.persist()?;
        Ok(slot)
    }

    fn is_cancelled(&self, slot: SlotId, date: NaiveDate) -> Result<bool> {
        self.mem.is_cancelled(slot, date)
    }

    fn insert_cancellation(&self, slot: SlotId, date: NaiveDate, reason: &str) -> Result<()> {
        self.mem.insert_cancellation(slot, date, reason)?;
        self.persist()
    }

    fn lecture(&self, id: LectureId) -> Result<Lecture> {
        self.mem.lecture(id)
    }

    fn lecture_for(&self, slot: SlotId, date: NaiveDate) -> Result<Option<Lecture>> {
        self.mem.lecture_for(slot, date)
    }

    fn get_or_create_lecture(&self, slot: SlotId, date: NaiveDate) -> Result<Lecture> {
        let lecture = self.mem.get_or_create_lecture(slot, date)?;
        self.persist()?;
        Ok(lecture)
    }

    fn update_lecture(&self, lecture: &Lecture) -> Result<()> {
        self.mem.update_lecture(lecture)?;
        self.persist()
    }

    fn attendance_for_lecture(&self, lecture: LectureId) -> Result<Vec<AttendanceRecord>> {
        self.mem.attendance_for_lecture(lecture)
    }

    fn attendance_record(
        &self,
        lecture: LectureId,
        student: StudentId,
    ) -> Result<Option<AttendanceRecord>> {
        self.mem.attendance_record(lecture, student)
    }

    fn get_or_create_attendance(
        &self,
        lecture: LectureId,
        student: StudentId,
        default: AttendanceRecord,
    ) -> Result<(AttendanceRecord, bool)> {
        let result = self.mem.get_or_create_attendance(lecture, student, default)?;
        if result.1 {
            self.persist()?;
        }
        Ok(result)
    }

    fn update_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        self.mem.update_attendance(record)?;
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("rollcall-store-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        {
            let store = FileStore::open(dir.clone()).unwrap();
            let room = store.insert_room("Room 101", "Main hall", 0).unwrap();
            let class = store.insert_classroom("CS-A", "").unwrap();
            store.insert_student("CS-A-001", "Ameya", class.id, "CS-A_001").unwrap();
            assert_eq!(room.name, "Room 101");
        }

        let reopened = FileStore::open(dir.clone()).unwrap();
        assert_eq!(reopened.rooms().unwrap().len(), 1);
        assert!(reopened.student_by_label("CS-A_001").unwrap().is_some());

        let _ = fs::remove_dir_all(&dir);
    }
}
