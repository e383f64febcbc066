use crate::attendance::{AttendanceLedger, EndOutcome, LectureLifecycle, StartOutcome};
use crate::common::{AttendanceError, Result};
use crate::schedule::{validate_and_insert, TimetableIndex};
use crate::storage::{LectureId, NewSlot, SlotId, SlotOccurrence, Store};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Which lecture an administrative request refers to: a concrete slot,
/// or whatever is scheduled in a room right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LectureSelector {
    Slot { slot: SlotId, date: NaiveDate },
    RoomNow { room: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartLectureRequest {
    pub selector: LectureSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartLectureResponse {
    pub lecture: LectureId,
    pub carried_from: Option<LectureId>,
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndLectureRequest {
    pub lecture: LectureId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndLectureResponse {
    pub ended: bool,
    pub present: usize,
    pub absent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAttendanceRequest {
    pub lecture: LectureId,
    /// Roll numbers to mark present; everyone else goes absent.
    pub present: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAttendanceResponse {
    pub present: usize,
    pub absent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExtraSlotRequest {
    pub room: String,
    pub classroom: String,
    pub subject: String,
    pub teacher: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateExtraSlotResponse {
    Created { slot: SlotId },
    /// Human-readable rejection, including the conflicting slot's
    /// subject and time range when there is one.
    Rejected { reason: String },
}

/// Administrative operations over the store, shared by the CLI
/// subcommands. Every mutation goes through the same lifecycle and
/// validation paths the monitor uses.
pub struct AdminApi<'a> {
    store: &'a dyn Store,
}

impl<'a> AdminApi<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    fn resolve_slot(&self, selector: &LectureSelector, now: NaiveDateTime) -> Result<(SlotId, NaiveDate)> {
        match selector {
            LectureSelector::Slot { slot, date } => {
                // Existence check up front so a typo'd id fails cleanly.
                self.store.slot(*slot)?;
                Ok((*slot, *date))
            }
            LectureSelector::RoomNow { room } => {
                let room = self
                    .store
                    .room_by_name(room)?
                    .ok_or_else(|| AttendanceError::RoomNotFound(room.clone()))?;
                let slot = TimetableIndex::new(self.store)
                    .current_slot(room.id, now)?
                    .ok_or_else(|| {
                        AttendanceError::Other(anyhow::anyhow!(
                            "nothing scheduled in {} at {}",
                            room.name,
                            now.time()
                        ))
                    })?;
                Ok((slot.id, now.date()))
            }
        }
    }

    pub fn start_lecture(
        &self,
        request: &StartLectureRequest,
        now: NaiveDateTime,
    ) -> Result<StartLectureResponse> {
        let (slot, date) = self.resolve_slot(&request.selector, now)?;
        let lifecycle = LectureLifecycle::new(self.store);
        let lecture = lifecycle.get_or_create(slot, date)?;
        let outcome = lifecycle.start(lecture.id, true, now)?;
        let carried_from = match outcome {
            StartOutcome::Carried { from, .. } => Some(from),
            _ => self.store.lecture(lecture.id)?.carried_from,
        };
        Ok(StartLectureResponse {
            lecture: lecture.id,
            carried_from,
            outcome: outcome.to_string(),
        })
    }

    pub fn end_lecture(
        &self,
        request: &EndLectureRequest,
        now: NaiveDateTime,
    ) -> Result<EndLectureResponse> {
        match LectureLifecycle::new(self.store).end(request.lecture, now)? {
            EndOutcome::Completed { present, total } => Ok(EndLectureResponse {
                ended: true,
                present,
                absent: total - present,
            }),
            EndOutcome::NotActive(_) => {
                let (present, total) = AttendanceLedger::new(self.store).summary(request.lecture)?;
                Ok(EndLectureResponse { ended: false, present, absent: total - present })
            }
        }
    }

    /// Override the whole roster of a lecture by roll number. Unknown
    /// roll numbers fail the request before anything is written.
    pub fn set_bulk_attendance(
        &self,
        request: &SetAttendanceRequest,
        now: NaiveDateTime,
    ) -> Result<SetAttendanceResponse> {
        let lecture = self.store.lecture(request.lecture)?;
        let slot = self.store.slot(lecture.slot)?;
        let enrolled = self.store.students_in_classroom(slot.classroom)?;

        let mut present = HashSet::new();
        for roll_no in &request.present {
            let student = enrolled
                .iter()
                .find(|s| &s.roll_no == roll_no)
                .ok_or_else(|| AttendanceError::StudentNotFound(roll_no.clone()))?;
            present.insert(student.id);
        }

        let summary = AttendanceLedger::new(self.store).set_bulk(lecture.id, &present, now)?;
        info!(
            lecture = lecture.id,
            present = summary.present,
            absent = summary.absent,
            "attendance overridden"
        );
        Ok(SetAttendanceResponse { present: summary.present, absent: summary.absent })
    }

    pub fn create_extra_slot(
        &self,
        request: &CreateExtraSlotRequest,
        today: NaiveDate,
    ) -> Result<CreateExtraSlotResponse> {
        let room = self
            .store
            .room_by_name(&request.room)?
            .ok_or_else(|| AttendanceError::RoomNotFound(request.room.clone()))?;
        let classroom = self
            .store
            .classroom_by_name(&request.classroom)?
            .ok_or_else(|| AttendanceError::ClassroomNotFound(request.classroom.clone()))?;

        let candidate = NewSlot {
            room: room.id,
            classroom: classroom.id,
            subject: request.subject.clone(),
            teacher: request.teacher.clone(),
            occurrence: SlotOccurrence::Extra { date: request.date },
            start_time: request.start_time,
            end_time: request.end_time,
        };
        match validate_and_insert(self.store, candidate, today)? {
            Ok(slot) => {
                info!(slot = slot.id, date = %request.date, "extra slot created");
                Ok(CreateExtraSlotResponse::Created { slot: slot.id })
            }
            Err(rejection) => Ok(CreateExtraSlotResponse::Rejected { reason: rejection.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AttendanceStatus, MemoryStore};
    use chrono::Weekday;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    fn seeded() -> (MemoryStore, SlotId) {
        let store = MemoryStore::new();
        let room = store.insert_room("Room 101", "", 0).unwrap();
        let class = store.insert_classroom("CS-A", "").unwrap();
        store.insert_student("CS-A-001", "Asha Rao", class.id, "CS-A_001").unwrap();
        store.insert_student("CS-A-002", "Ravi Nair", class.id, "CS-A_002").unwrap();
        let slot = store
            .insert_slot(NewSlot {
                room: room.id,
                classroom: class.id,
                subject: "Data Structures".into(),
                teacher: "Dr. Smith".into(),
                occurrence: SlotOccurrence::Recurring { weekday: Weekday::Mon },
                start_time: time(9, 0),
                end_time: time(10, 0),
            })
            .unwrap();
        (store, slot.id)
    }

    #[test]
    fn start_by_room_resolves_the_current_slot() {
        let (store, slot) = seeded();
        let api = AdminApi::new(&store);

        let response = api
            .start_lecture(
                &StartLectureRequest {
                    selector: LectureSelector::RoomNow { room: "Room 101".into() },
                },
                monday().and_time(time(9, 5)),
            )
            .unwrap();
        let lecture = store.lecture(response.lecture).unwrap();
        assert_eq!(lecture.slot, slot);
        assert_eq!(lecture.date, monday());

        // Outside any slot, the same request fails.
        let err = api.start_lecture(
            &StartLectureRequest {
                selector: LectureSelector::RoomNow { room: "Room 101".into() },
            },
            monday().and_time(time(14, 0)),
        );
        assert!(err.is_err());
    }

    #[test]
    fn end_reports_counts_without_double_ending() {
        let (store, slot) = seeded();
        let api = AdminApi::new(&store);
        let started = api
            .start_lecture(
                &StartLectureRequest {
                    selector: LectureSelector::Slot { slot, date: monday() },
                },
                monday().and_time(time(9, 0)),
            )
            .unwrap();

        api.set_bulk_attendance(
            &SetAttendanceRequest {
                lecture: started.lecture,
                present: vec!["CS-A-001".into()],
            },
            monday().and_time(time(9, 30)),
        )
        .unwrap();

        let ended = api
            .end_lecture(
                &EndLectureRequest { lecture: started.lecture },
                monday().and_time(time(10, 0)),
            )
            .unwrap();
        assert!(ended.ended);
        assert_eq!(ended.present, 1);
        assert_eq!(ended.absent, 1);

        let again = api
            .end_lecture(
                &EndLectureRequest { lecture: started.lecture },
                monday().and_time(time(10, 5)),
            )
            .unwrap();
        assert!(!again.ended);
        assert_eq!(again.present, 1);
    }

    #[test]
    fn unknown_roll_number_fails_before_writing() {
        let (store, slot) = seeded();
        let api = AdminApi::new(&store);
        let started = api
            .start_lecture(
                &StartLectureRequest {
                    selector: LectureSelector::Slot { slot, date: monday() },
                },
                monday().and_time(time(9, 0)),
            )
            .unwrap();

        let err = api.set_bulk_attendance(
            &SetAttendanceRequest {
                lecture: started.lecture,
                present: vec!["CS-A-001".into(), "EE-B-999".into()],
            },
            monday().and_time(time(9, 30)),
        );
        assert!(matches!(err, Err(AttendanceError::StudentNotFound(_))));

        // Nothing was marked present.
        let records = store.attendance_for_lecture(started.lecture).unwrap();
        assert!(records.iter().all(|r| r.status == AttendanceStatus::Absent));
    }

    #[test]
    fn extra_slot_rejection_names_the_conflict() {
        let (store, _) = seeded();
        let api = AdminApi::new(&store);

        let request = CreateExtraSlotRequest {
            room: "Room 101".into(),
            classroom: "CS-A".into(),
            subject: "Revision".into(),
            teacher: "Dr. Smith".into(),
            date: monday(),
            start_time: time(9, 30),
            end_time: time(10, 30),
        };
        match api.create_extra_slot(&request, monday()).unwrap() {
            CreateExtraSlotResponse::Rejected { reason } => {
                assert!(reason.contains("Data Structures"), "reason: {}", reason);
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        // The afternoon is free.
        let request = CreateExtraSlotRequest {
            start_time: time(14, 0),
            end_time: time(15, 0),
            ..request
        };
        assert!(matches!(
            api.create_extra_slot(&request, monday()).unwrap(),
            CreateExtraSlotResponse::Created { .. }
        ));
    }
}
