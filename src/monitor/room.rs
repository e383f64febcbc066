use crate::attendance::LectureLifecycle;
use crate::camera::{CameraProvider, FrameSource};
use crate::common::{Config, MonitorConfig, Result};
use crate::core::{LivenessVoter, RecognitionGate, Recognizer, SessionState};
use crate::monitor::clock::Clock;
use crate::schedule::TimetableIndex;
use crate::storage::{LectureId, Room, SlotId, Store};
use chrono::{Duration, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// One state transition the monitor should perform this tick.
/// Ordered so an ending lecture is closed before its successor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EndLecture(LectureId),
    StartCamera,
    StartLecture(SlotId),
    StopCamera,
}

/// Compare the room's desired state at `now` against what the monitor
/// currently holds and return the transitions needed.
///
/// The camera is wanted during a lecture and for a pre-roll window
/// before the next one, so it is warmed up when students arrive early.
pub fn reconcile(
    index: &TimetableIndex,
    room: &Room,
    config: &MonitorConfig,
    active: Option<(LectureId, SlotId)>,
    camera_on: bool,
    now: NaiveDateTime,
) -> Result<Vec<Action>> {
    let current = index.current_slot(room.id, now)?;
    let mut actions = Vec::new();

    if let Some((lecture, slot)) = active {
        if current.as_ref().map(|s| s.id) != Some(slot) {
            actions.push(Action::EndLecture(lecture));
        }
    }

    let camera_wanted = if current.is_some() {
        true
    } else {
        match index.next_slot(room.id, now)? {
            Some((slot, date)) => {
                let start = date.and_time(slot.start_time);
                start - now <= Duration::minutes(config.early_start_minutes)
            }
            None => false,
        }
    };

    if camera_wanted && !camera_on {
        actions.push(Action::StartCamera);
    }

    if let Some(slot) = current {
        let already_running = matches!(active, Some((_, s)) if s == slot.id);
        if !already_running {
            actions.push(Action::StartLecture(slot.id));
        }
    }

    if !camera_wanted && camera_on {
        actions.push(Action::StopCamera);
    }

    Ok(actions)
}

struct ActiveLecture {
    lecture: LectureId,
    slot: SlotId,
    session: SessionState,
}

/// Drives one room: follows the timetable, manages the camera, runs
/// every captured frame through recognition and the attendance gate.
pub struct RoomMonitor<'a> {
    store: &'a dyn Store,
    config: Config,
    room: Room,
    clock: &'a dyn Clock,
    recognizer: Box<dyn Recognizer>,
    provider: Box<dyn CameraProvider>,
    gate: RecognitionGate,
    active: Option<ActiveLecture>,
    camera: Option<Box<dyn FrameSource>>,
}

impl<'a> RoomMonitor<'a> {
    pub fn new(
        store: &'a dyn Store,
        config: Config,
        room: Room,
        clock: &'a dyn Clock,
        recognizer: Box<dyn Recognizer>,
        provider: Box<dyn CameraProvider>,
    ) -> Self {
        let gate = RecognitionGate::new(
            config.recognition.clone(),
            LivenessVoter::new(config.liveness.clone()),
        );
        Self {
            store,
            config,
            room,
            clock,
            recognizer,
            provider,
            gate,
            active: None,
            camera: None,
        }
    }

    /// Blocking loop until `shutdown` is raised. An active lecture is
    /// closed out on the way down so no session is left dangling.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        info!(room = %self.room.name, "room monitor started");
        while !shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.tick() {
                warn!(error = %e, "monitor tick failed");
            }
            std::thread::sleep(std::time::Duration::from_secs(
                self.config.monitor.tick_interval_secs,
            ));
        }
        self.stop()
    }

    /// One pass: reconcile lecture and camera state, then process a
    /// frame if a lecture is running.
    pub fn tick(&mut self) -> Result<()> {
        let now = self.clock.now();
        let index = TimetableIndex::new(self.store);
        let actions = reconcile(
            &index,
            &self.room,
            &self.config.monitor,
            self.active.as_ref().map(|a| (a.lecture, a.slot)),
            self.camera.is_some(),
            now,
        )?;
        for action in actions {
            self.apply(action, now)?;
        }
        self.observe(now);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        let now = self.clock.now();
        if let Some(active) = self.active.take() {
            let outcome = LectureLifecycle::new(self.store).end(active.lecture, now)?;
            info!(lecture = active.lecture, ?outcome, "lecture closed on shutdown");
        }
        self.camera = None;
        info!(room = %self.room.name, "room monitor stopped");
        Ok(())
    }

    fn apply(&mut self, action: Action, now: NaiveDateTime) -> Result<()> {
        match action {
            Action::EndLecture(lecture) => {
                let outcome = LectureLifecycle::new(self.store).end(lecture, now)?;
                debug!(lecture, ?outcome, "lecture ended");
                self.active = None;
            }
            Action::StartCamera => {
                // Camera failures are transient: log and retry next tick.
                match self.provider.acquire(self.room.camera_index) {
                    Ok(camera) => {
                        info!(room = %self.room.name, index = self.room.camera_index, "camera acquired");
                        self.camera = Some(camera);
                    }
                    Err(e) => warn!(error = %e, "could not acquire camera"),
                }
            }
            Action::StartLecture(slot) => {
                let lifecycle = LectureLifecycle::new(self.store);
                let lecture = lifecycle.get_or_create(slot, now.date())?;
                let outcome = lifecycle.start(lecture.id, true, now)?;
                info!(lecture = lecture.id, %outcome, "lecture started");
                let session = SessionState::for_lecture(self.store, lecture.id)?;
                self.active = Some(ActiveLecture { lecture: lecture.id, slot, session });
            }
            Action::StopCamera => {
                self.camera = None;
                info!(room = %self.room.name, "camera released");
            }
        }
        Ok(())
    }

    /// Capture one frame and run it through recognition and the gate.
    /// Per-frame failures are logged, never fatal.
    fn observe(&mut self, now: NaiveDateTime) {
        let Some(active) = self.active.as_mut() else { return };
        let Some(camera) = self.camera.as_mut() else { return };

        let frame = match camera.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "frame capture failed");
                return;
            }
        };
        let identifications = match self.recognizer.identify(&frame) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "recognition failed");
                return;
            }
        };
        if identifications.is_empty() {
            return;
        }
        if let Err(e) =
            self.gate
                .process_frame(self.store, &mut active.session, &frame, &identifications, now)
        {
            warn!(error = %e, "attendance update failed");
        }
    }
}
