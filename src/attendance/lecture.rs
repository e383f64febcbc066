use crate::attendance::ledger::AttendanceLedger;
use crate::common::Result;
use crate::schedule::TimetableIndex;
use crate::storage::{Lecture, LectureId, LectureStatus, SlotId, Store};
use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// `start` on an active lecture is a no-op.
    AlreadyActive,
    /// Completed or cancelled lectures cannot be restarted.
    NotStartable(LectureStatus),
    /// Attendance inherited from the adjacent preceding lecture.
    Carried { from: LectureId, records: usize },
    /// Fresh roster, everyone defaulted to absent.
    Fresh { records: usize },
}

impl std::fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartOutcome::AlreadyActive => write!(f, "already started"),
            StartOutcome::NotStartable(status) => write!(f, "not startable ({})", status),
            StartOutcome::Carried { records, .. } => {
                write!(f, "carried forward {} attendance records", records)
            }
            StartOutcome::Fresh { records } => {
                write!(f, "created fresh attendance for {} students", records)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    Completed { present: usize, total: usize },
    /// `end` on a non-active lecture reports the status without mutating.
    NotActive(LectureStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// Completed and already-cancelled lectures stay as they are.
    NotCancellable(LectureStatus),
}

/// State machine for a single lecture instance:
/// scheduled -> active -> completed, with cancelled reachable from
/// scheduled and active.
pub struct LectureLifecycle<'a> {
    store: &'a dyn Store,
}

impl<'a> LectureLifecycle<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Idempotent creation of the lecture instance for (slot, date).
    pub fn get_or_create(&self, slot: SlotId, date: NaiveDate) -> Result<Lecture> {
        self.store.get_or_create_lecture(slot, date)
    }

    /// Activate a lecture and populate its attendance.
    ///
    /// When `carry_forward_allowed` is set and a completed lecture exists
    /// for the adjacent preceding slot (same room, same classroom, end
    /// time equal to this slot's start) on the same date, attendance is
    /// copied from it and `carried_from` recorded. Any missing
    /// precondition silently falls back to fresh initialization.
    pub fn start(
        &self,
        lecture_id: LectureId,
        carry_forward_allowed: bool,
        now: NaiveDateTime,
    ) -> Result<StartOutcome> {
        let mut lecture = self.store.lecture(lecture_id)?;
        match lecture.status {
            LectureStatus::Active => return Ok(StartOutcome::AlreadyActive),
            LectureStatus::Completed | LectureStatus::Cancelled => {
                return Ok(StartOutcome::NotStartable(lecture.status))
            }
            LectureStatus::Scheduled => {}
        }

        lecture.status = LectureStatus::Active;
        lecture.started_at = Some(now);
        self.store.update_lecture(&lecture)?;

        let ledger = AttendanceLedger::new(self.store);

        if carry_forward_allowed {
            if let Some(previous) = self.completed_predecessor(&lecture)? {
                lecture.carried_from = Some(previous.id);
                self.store.update_lecture(&lecture)?;
                let records = ledger.copy_forward(previous.id, lecture.id)?;
                tracing::info!(
                    lecture = lecture.id,
                    carried_from = previous.id,
                    records,
                    "Lecture started with carried-forward attendance"
                );
                return Ok(StartOutcome::Carried { from: previous.id, records });
            }
        }

        let records = ledger.initialize_fresh(lecture.id)?;
        tracing::info!(lecture = lecture.id, records, "Lecture started with fresh attendance");
        Ok(StartOutcome::Fresh { records })
    }

    /// The completed lecture of the adjacent preceding slot on the same
    /// date, if both exist.
    fn completed_predecessor(&self, lecture: &Lecture) -> Result<Option<Lecture>> {
        let index = TimetableIndex::new(self.store);
        let Some(prev_slot) = index.preceding_adjacent(lecture.slot, lecture.date)? else {
            return Ok(None);
        };
        let Some(prev_lecture) = self.store.lecture_for(prev_slot.id, lecture.date)? else {
            return Ok(None);
        };
        // An uncompleted predecessor is not a usable carry-forward
        // source; treat it as absent.
        if prev_lecture.status != LectureStatus::Completed {
            tracing::warn!(
                lecture = lecture.id,
                predecessor = prev_lecture.id,
                status = %prev_lecture.status,
                "Predecessor lecture not completed, starting fresh"
            );
            return Ok(None);
        }
        Ok(Some(prev_lecture))
    }

    /// Complete an active lecture. Attendance rows are left at their
    /// final statuses; anyone never marked stays absent.
    pub fn end(&self, lecture_id: LectureId, now: NaiveDateTime) -> Result<EndOutcome> {
        let mut lecture = self.store.lecture(lecture_id)?;
        if lecture.status != LectureStatus::Active {
            return Ok(EndOutcome::NotActive(lecture.status));
        }

        lecture.status = LectureStatus::Completed;
        lecture.ended_at = Some(now);
        self.store.update_lecture(&lecture)?;

        let (present, total) = AttendanceLedger::new(self.store).summary(lecture.id)?;
        tracing::info!(lecture = lecture.id, present, total, "Lecture ended");
        Ok(EndOutcome::Completed { present, total })
    }

    /// Administrative cancellation, terminal from scheduled or active.
    pub fn cancel(&self, lecture_id: LectureId) -> Result<CancelOutcome> {
        let mut lecture = self.store.lecture(lecture_id)?;
        match lecture.status {
            LectureStatus::Scheduled | LectureStatus::Active => {
                lecture.status = LectureStatus::Cancelled;
                self.store.update_lecture(&lecture)?;
                Ok(CancelOutcome::Cancelled)
            }
            status => Ok(CancelOutcome::NotCancellable(status)),
        }
    }
}
