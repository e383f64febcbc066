use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Classroom not found: {0}")]
    ClassroomNotFound(String),

    #[error("Timetable slot not found: id {0}")]
    SlotNotFound(u32),

    #[error("Lecture not found: id {0}")]
    LectureNotFound(u32),

    #[error("Student not found: {0}")]
    StudentNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
