use crate::common::Result;
use crate::storage::{NewSlot, SlotOccurrence, Store, TimetableSlot};
use chrono::{Datelike, NaiveDate};

/// Why a proposed slot was not accepted.
#[derive(Debug, Clone)]
pub enum SlotRejection {
    /// Overlaps an existing non-cancelled slot in the same room or for
    /// the same classroom on some effective date.
    Conflict {
        existing: TimetableSlot,
        scope: ConflictScope,
    },
    EndNotAfterStart,
    /// Extra slots cannot be scheduled on a date that already passed.
    PastDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictScope {
    Room,
    Classroom,
}

impl std::fmt::Display for SlotRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotRejection::Conflict { existing, scope } => {
                let what = match scope {
                    ConflictScope::Room => "room",
                    ConflictScope::Classroom => "classroom",
                };
                write!(
                    f,
                    "conflicts with {} ({}-{}) in the same {}",
                    existing.subject, existing.start_time, existing.end_time, what
                )
            }
            SlotRejection::EndNotAfterStart => write!(f, "end time must be after start time"),
            SlotRejection::PastDate => write!(f, "extra lectures cannot be scheduled in the past"),
        }
    }
}

/// Validates proposed timetable slots before they are persisted, so the
/// non-overlap invariant holds for every effective date.
pub struct ConflictResolver<'a> {
    store: &'a dyn Store,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Accepts or rejects a candidate slot. `today` anchors the past-date
    /// check for extra slots.
    pub fn validate_new_slot(
        &self,
        candidate: &NewSlot,
        today: NaiveDate,
    ) -> Result<std::result::Result<(), SlotRejection>> {
        if candidate.end_time <= candidate.start_time {
            return Ok(Err(SlotRejection::EndNotAfterStart));
        }
        if let SlotOccurrence::Extra { date } = candidate.occurrence {
            if date < today {
                return Ok(Err(SlotRejection::PastDate));
            }
        }

        let room_slots = self.store.slots_for_room(candidate.room)?;
        if let Some(existing) = self.find_overlap(candidate, &room_slots)? {
            return Ok(Err(SlotRejection::Conflict {
                existing,
                scope: ConflictScope::Room,
            }));
        }

        let class_slots = self.store.slots_for_classroom(candidate.classroom)?;
        if let Some(existing) = self.find_overlap(candidate, &class_slots)? {
            return Ok(Err(SlotRejection::Conflict {
                existing,
                scope: ConflictScope::Classroom,
            }));
        }

        Ok(Ok(()))
    }

    /// First existing slot sharing an effective date and overlapping the
    /// candidate's time interval.
    ///
    /// Recurring-vs-recurring collides on a shared weekday regardless of
    /// cancellations: a cancellation removes one occurrence, not the
    /// weekly collision. Extra dates exclude occurrences cancelled on
    /// that specific date.
    fn find_overlap(
        &self,
        candidate: &NewSlot,
        existing: &[TimetableSlot],
    ) -> Result<Option<TimetableSlot>> {
        for slot in existing {
            if !slot.overlaps(candidate.start_time, candidate.end_time) {
                continue;
            }
            let collides = match (candidate.occurrence, slot.occurrence) {
                (
                    SlotOccurrence::Recurring { weekday: cand_day },
                    SlotOccurrence::Recurring { weekday: slot_day },
                ) => cand_day == slot_day,
                (SlotOccurrence::Recurring { weekday }, SlotOccurrence::Extra { date }) => {
                    date.weekday() == weekday
                }
                (SlotOccurrence::Extra { date }, SlotOccurrence::Recurring { weekday }) => {
                    date.weekday() == weekday && !self.store.is_cancelled(slot.id, date)?
                }
                (
                    SlotOccurrence::Extra { date: cand_date },
                    SlotOccurrence::Extra { date: slot_date },
                ) => cand_date == slot_date,
            };
            if collides {
                return Ok(Some(slot.clone()));
            }
        }
        Ok(None)
    }
}

/// Validate and persist in one step; the common administrative path.
pub fn validate_and_insert(
    store: &dyn Store,
    candidate: NewSlot,
    today: NaiveDate,
) -> Result<std::result::Result<TimetableSlot, SlotRejection>> {
    let resolver = ConflictResolver::new(store);
    match resolver.validate_new_slot(&candidate, today)? {
        Ok(()) => Ok(Ok(store.insert_slot(candidate)?)),
        Err(rejection) => Ok(Err(rejection)),
    }
}
