use crate::common::Result;
use crate::storage::{RoomId, SlotId, Store, TimetableSlot};
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Read-only query surface over timetable slots and cancellations.
///
/// All lookups resolve a slot's effective date through its occurrence
/// (weekday for recurring entries, exact date for extras) and exclude
/// occurrences cancelled on that date.
pub struct TimetableIndex<'a> {
    store: &'a dyn Store,
}

impl<'a> TimetableIndex<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Non-cancelled slots of a room effective on the given date.
    pub fn effective_slots(&self, room: RoomId, date: NaiveDate) -> Result<Vec<TimetableSlot>> {
        let mut slots = Vec::new();
        for slot in self.store.slots_for_room(room)? {
            if slot.occurrence.effective_on(date) && !self.store.is_cancelled(slot.id, date)? {
                slots.push(slot);
            }
        }
        Ok(slots)
    }

    /// The slot whose interval contains `at`, if any.
    ///
    /// If persisted data ever violates the non-overlap invariant, the
    /// extra entry wins over the recurring one, then the earliest start.
    pub fn current_slot(&self, room: RoomId, at: NaiveDateTime) -> Result<Option<TimetableSlot>> {
        let time = at.time();
        let mut candidates: Vec<TimetableSlot> = self
            .effective_slots(room, at.date())?
            .into_iter()
            .filter(|s| s.start_time <= time && time < s.end_time)
            .collect();
        candidates.sort_by_key(|s| (s.occurrence.is_recurring(), s.start_time));
        Ok(candidates.into_iter().next())
    }

    /// Earliest occurrence in this room that has not ended yet, today or
    /// within the next week. Drives the camera pre-roll window.
    pub fn next_slot(
        &self,
        room: RoomId,
        at: NaiveDateTime,
    ) -> Result<Option<(TimetableSlot, NaiveDate)>> {
        // Today: anything still running or yet to start.
        let mut todays: Vec<TimetableSlot> = self
            .effective_slots(room, at.date())?
            .into_iter()
            .filter(|s| s.end_time > at.time())
            .collect();
        todays.sort_by_key(|s| s.start_time);
        if let Some(slot) = todays.into_iter().next() {
            return Ok(Some((slot, at.date())));
        }

        for days_ahead in 1..=7 {
            let date = at.date() + Duration::days(days_ahead);
            let mut slots = self.effective_slots(room, date)?;
            slots.sort_by_key(|s| s.start_time);
            if let Some(slot) = slots.into_iter().next() {
                return Ok(Some((slot, date)));
            }
        }
        Ok(None)
    }

    /// The slot ending exactly when the given slot starts, in the same
    /// room for the same classroom, effective on `date`. This is the
    /// carry-forward predecessor for back-to-back lectures.
    pub fn preceding_adjacent(
        &self,
        slot: SlotId,
        date: NaiveDate,
    ) -> Result<Option<TimetableSlot>> {
        let slot = self.store.slot(slot)?;
        for candidate in self.effective_slots(slot.room, date)? {
            if candidate.id != slot.id
                && candidate.classroom == slot.classroom
                && candidate.end_time == slot.start_time
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}
