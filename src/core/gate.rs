use crate::attendance::AttendanceLedger;
use crate::common::{RecognitionConfig, Result};
use crate::core::liveness::{LivenessVoter, SpoofType};
use crate::core::recognizer::Identification;
use crate::storage::{ClassroomId, LectureId, Store, StudentId};
use chrono::NaiveDateTime;
use image::DynamicImage;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// The student's record transitioned to present.
    Marked { student: StudentId, label: String },
    /// Seen again after already being marked this session.
    AlreadyMarked { label: String },
    Rejected { label: String, reason: RejectReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    LowConfidence(f32),
    Spoof { spoof_type: SpoofType, confidence: f32 },
    UnknownLabel,
    WrongClassroom,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::LowConfidence(c) => write!(f, "match confidence {:.2} too low", c),
            RejectReason::Spoof { spoof_type, confidence } => {
                write!(f, "spoof suspected ({}, confidence {:.2})", spoof_type, confidence)
            }
            RejectReason::UnknownLabel => f.write_str("label has no enrolled student"),
            RejectReason::WrongClassroom => f.write_str("student is not in this lecture's classroom"),
        }
    }
}

/// Per-lecture session memory. Reset when the lecture changes.
pub struct SessionState {
    pub lecture: LectureId,
    pub classroom: ClassroomId,
    /// Labels already marked present, so each student triggers one
    /// write and one notification per session.
    marked: HashSet<String>,
    /// When each label last passed the liveness gate, for periodic
    /// re-checks.
    accepted_at: HashMap<String, NaiveDateTime>,
    /// Labels whose rejection was already logged, to avoid one warning
    /// per frame.
    reported: HashSet<String>,
}

impl SessionState {
    /// Session for a lecture, with labels of students already present
    /// pre-seeded so carried-forward marks are not re-announced.
    pub fn for_lecture(store: &dyn Store, lecture: LectureId) -> Result<Self> {
        let lec = store.lecture(lecture)?;
        let slot = store.slot(lec.slot)?;

        let mut marked = HashSet::new();
        for record in store.attendance_for_lecture(lecture)? {
            if record.status == crate::storage::AttendanceStatus::Present {
                let student = store.student(record.student)?;
                marked.insert(student.face_label);
            }
        }

        Ok(Self {
            lecture,
            classroom: slot.classroom,
            marked,
            accepted_at: HashMap::new(),
            reported: HashSet::new(),
        })
    }

    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }
}

/// Decides, per recognized face, whether to write an attendance mark.
///
/// Order matters: the cheap confidence and duplicate checks run before
/// the liveness analysis so a crowded frame of already-marked students
/// costs almost nothing.
pub struct RecognitionGate {
    config: RecognitionConfig,
    liveness: LivenessVoter,
}

impl RecognitionGate {
    pub fn new(config: RecognitionConfig, liveness: LivenessVoter) -> Self {
        Self { config, liveness }
    }

    /// Run every identification in a frame through the gate.
    pub fn process_frame(
        &self,
        store: &dyn Store,
        state: &mut SessionState,
        frame: &DynamicImage,
        identifications: &[Identification],
        now: NaiveDateTime,
    ) -> Result<Vec<GateDecision>> {
        let mut decisions = Vec::with_capacity(identifications.len());
        for ident in identifications {
            decisions.push(self.admit(store, state, frame, ident, now)?);
        }
        Ok(decisions)
    }

    fn admit(
        &self,
        store: &dyn Store,
        state: &mut SessionState,
        frame: &DynamicImage,
        ident: &Identification,
        now: NaiveDateTime,
    ) -> Result<GateDecision> {
        let label = ident.label.clone();

        if ident.confidence < self.config.match_threshold {
            debug!(%label, confidence = ident.confidence, "below match threshold");
            return Ok(GateDecision::Rejected {
                label,
                reason: RejectReason::LowConfidence(ident.confidence),
            });
        }

        if state.marked.contains(&label) {
            if let Some(reason) = self.recheck(state, frame, ident, now) {
                warn!(%label, %reason, "liveness re-check failed for marked student");
                return Ok(GateDecision::Rejected { label, reason });
            }
            return Ok(GateDecision::AlreadyMarked { label });
        }

        let report = self.liveness.evaluate(&ident.face.crop(frame));
        if !report.is_live {
            let spoof_type = report.spoof_type.unwrap_or(SpoofType::Unknown);
            warn!(
                %label,
                %spoof_type,
                confidence = report.confidence,
                checks_failed = report.failed_checks.len(),
                "presentation attack suspected"
            );
            return Ok(GateDecision::Rejected {
                label,
                reason: RejectReason::Spoof { spoof_type, confidence: report.confidence },
            });
        }

        let student = match store.student_by_label(&label)? {
            Some(student) => student,
            None => {
                if state.reported.insert(label.clone()) {
                    warn!(%label, "recognized label has no enrolled student");
                }
                return Ok(GateDecision::Rejected { label, reason: RejectReason::UnknownLabel });
            }
        };

        if student.classroom != state.classroom {
            if state.reported.insert(label.clone()) {
                warn!(
                    %label,
                    student = %student.name,
                    "student recognized in another classroom's lecture"
                );
            }
            return Ok(GateDecision::Rejected { label, reason: RejectReason::WrongClassroom });
        }

        let ledger = AttendanceLedger::new(store);
        let outcome = ledger.mark_present(state.lecture, student.id, true, now)?;
        state.marked.insert(label.clone());
        state.accepted_at.insert(label.clone(), now);

        if outcome.newly_marked {
            info!(%label, student = %student.name, "attendance marked");
            Ok(GateDecision::Marked { student: student.id, label })
        } else {
            Ok(GateDecision::AlreadyMarked { label })
        }
    }

    /// Optional periodic liveness re-check on students already marked.
    /// A failure is logged but never reverts the mark.
    fn recheck(
        &self,
        state: &mut SessionState,
        frame: &DynamicImage,
        ident: &Identification,
        now: NaiveDateTime,
    ) -> Option<RejectReason> {
        let interval = self.config.liveness_recheck_secs?;
        let last = state.accepted_at.get(&ident.label)?;
        if (now - *last).num_seconds() < interval as i64 {
            return None;
        }

        let report = self.liveness.evaluate(&ident.face.crop(frame));
        state.accepted_at.insert(ident.label.clone(), now);
        if report.is_live {
            None
        } else {
            Some(RejectReason::Spoof {
                spoof_type: report.spoof_type.unwrap_or(SpoofType::Unknown),
                confidence: report.confidence,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LivenessConfig;
    use crate::core::recognizer::FaceBox;
    use crate::storage::{MemoryStore, NewSlot, SlotOccurrence};
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use image::{Rgb, RgbImage};

    struct Fixture {
        store: MemoryStore,
        lecture: LectureId,
        student: StudentId,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let room = store.insert_room("Lab 2", "", 0).unwrap();
        let class = store.insert_classroom("CS-A", "").unwrap();
        let student = store
            .insert_student("CS-A-001", "Asha Rao", class.id, "CS-A_001")
            .unwrap();
        let slot = store
            .insert_slot(NewSlot {
                room: room.id,
                classroom: class.id,
                subject: "Algorithms".into(),
                teacher: "Dr. Iyer".into(),
                occurrence: SlotOccurrence::Recurring { weekday: Weekday::Mon },
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            })
            .unwrap();
        let lecture = store
            .get_or_create_lecture(slot.id, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        AttendanceLedger::new(&store).initialize_fresh(lecture.id).unwrap();
        Fixture { store, lecture: lecture.id, student: student.id }
    }

    fn gate(liveness_enabled: bool) -> RecognitionGate {
        let liveness = LivenessVoter::new(LivenessConfig {
            enabled: liveness_enabled,
            ..LivenessConfig::default()
        });
        RecognitionGate::new(RecognitionConfig::default(), liveness)
    }

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([128, 128, 128])))
    }

    fn ident(label: &str, confidence: f32) -> Identification {
        Identification {
            label: label.into(),
            confidence,
            face: FaceBox { x1: 100, y1: 100, x2: 220, y2: 220 },
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(9, 10, 0)
            .unwrap()
    }

    #[test]
    fn repeated_frames_mark_exactly_once() {
        let fx = fixture();
        let gate = gate(false);
        let mut state = SessionState::for_lecture(&fx.store, fx.lecture).unwrap();
        let frame = frame();
        let ident = ident("CS-A_001", 0.9);

        let mut marked = 0;
        for _ in 0..50 {
            let decisions = gate
                .process_frame(&fx.store, &mut state, &frame, std::slice::from_ref(&ident), now())
                .unwrap();
            if matches!(decisions[0], GateDecision::Marked { .. }) {
                marked += 1;
            }
        }
        assert_eq!(marked, 1);

        let record = fx
            .store
            .attendance_record(fx.lecture, fx.student)
            .unwrap()
            .unwrap();
        assert_eq!(record.status, crate::storage::AttendanceStatus::Present);
        assert!(record.marked_by_biometric);
    }

    #[test]
    fn low_confidence_never_reaches_the_store() {
        let fx = fixture();
        let gate = gate(false);
        let mut state = SessionState::for_lecture(&fx.store, fx.lecture).unwrap();

        let decisions = gate
            .process_frame(&fx.store, &mut state, &frame(), &[ident("CS-A_001", 0.4)], now())
            .unwrap();
        assert!(matches!(
            decisions[0],
            GateDecision::Rejected { reason: RejectReason::LowConfidence(_), .. }
        ));

        let record = fx
            .store
            .attendance_record(fx.lecture, fx.student)
            .unwrap()
            .unwrap();
        assert_eq!(record.status, crate::storage::AttendanceStatus::Absent);
    }

    #[test]
    fn flat_face_crop_is_rejected_as_spoof() {
        let fx = fixture();
        let gate = gate(true);
        let mut state = SessionState::for_lecture(&fx.store, fx.lecture).unwrap();

        let decisions = gate
            .process_frame(&fx.store, &mut state, &frame(), &[ident("CS-A_001", 0.9)], now())
            .unwrap();
        assert!(matches!(
            decisions[0],
            GateDecision::Rejected { reason: RejectReason::Spoof { .. }, .. }
        ));
        assert_eq!(state.marked_count(), 0);
    }

    #[test]
    fn unknown_label_and_wrong_classroom_are_rejected() {
        let fx = fixture();
        let other_class = fx.store.insert_classroom("EE-B", "").unwrap();
        fx.store
            .insert_student("EE-B-001", "Vikram Shah", other_class.id, "EE-B_001")
            .unwrap();
        let gate = gate(false);
        let mut state = SessionState::for_lecture(&fx.store, fx.lecture).unwrap();

        let decisions = gate
            .process_frame(
                &fx.store,
                &mut state,
                &frame(),
                &[ident("no-such-label", 0.9), ident("EE-B_001", 0.9)],
                now(),
            )
            .unwrap();
        assert!(matches!(
            decisions[0],
            GateDecision::Rejected { reason: RejectReason::UnknownLabel, .. }
        ));
        assert!(matches!(
            decisions[1],
            GateDecision::Rejected { reason: RejectReason::WrongClassroom, .. }
        ));
    }

    #[test]
    fn carried_forward_marks_are_preseeded() {
        let fx = fixture();
        AttendanceLedger::new(&fx.store)
            .mark_present(fx.lecture, fx.student, true, now())
            .unwrap();

        let gate = gate(false);
        let mut state = SessionState::for_lecture(&fx.store, fx.lecture).unwrap();
        assert_eq!(state.marked_count(), 1);

        let decisions = gate
            .process_frame(&fx.store, &mut state, &frame(), &[ident("CS-A_001", 0.9)], now())
            .unwrap();
        assert!(matches!(decisions[0], GateDecision::AlreadyMarked { .. }));
    }
}
