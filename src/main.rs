use rollcall::admin::{
    AdminApi, CreateExtraSlotRequest, CreateExtraSlotResponse, EndLectureRequest,
    LectureSelector, SetAttendanceRequest, StartLectureRequest,
};
use rollcall::camera::V4lProvider;
use rollcall::core::NullRecognizer;
use rollcall::monitor::{Clock, RoomMonitor, SystemClock};
use rollcall::schedule::ConflictResolver;
use rollcall::storage::{FileStore, NewSlot, SlotOccurrence, Store};
use rollcall::{AttendanceError, Config};

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, Weekday};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Timetable-driven biometric classroom attendance")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Path to the config file (default: configs/rollcall.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the attendance monitor for one room
    Monitor {
        #[arg(short, long)]
        room: String,
    },
    /// Seed sample rooms, classrooms, students and a weekly timetable
    Setup,
    /// Create a one-off extra lecture starting right now
    ScheduleNow {
        #[arg(long)]
        room: String,
        #[arg(long)]
        classroom: String,
        /// Lecture length in minutes
        #[arg(long, default_value = "60")]
        minutes: i64,
        #[arg(long, default_value = "Extra Lecture")]
        subject: String,
        #[arg(long, default_value = "Staff")]
        teacher: String,
    },
    /// Manually activate a lecture
    StartLecture {
        /// Timetable slot id
        #[arg(long, conflicts_with = "room")]
        slot: Option<u32>,
        /// Lecture date (defaults to today, only with --slot)
        #[arg(long, requires = "slot")]
        date: Option<NaiveDate>,
        /// Use whatever is scheduled in this room right now
        #[arg(long)]
        room: Option<String>,
    },
    /// Complete an active lecture
    EndLecture {
        #[arg(long)]
        lecture: u32,
    },
    /// Override a lecture's roster: listed roll numbers present, rest absent
    SetAttendance {
        #[arg(long)]
        lecture: u32,
        /// Roll numbers to mark present
        #[arg(required = true)]
        present: Vec<String>,
    },
    /// Check a proposed slot against the timetable without saving it
    ValidateSlot {
        #[arg(long)]
        room: String,
        #[arg(long)]
        classroom: String,
        /// Weekly slot on this weekday (e.g. mon, tue)
        #[arg(long, conflicts_with = "date")]
        weekday: Option<Weekday>,
        /// One-off slot on this date
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Start time, HH:MM
        #[arg(long)]
        start: String,
        /// End time, HH:MM
        #[arg(long)]
        end: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let store = FileStore::open_default()?;
    let clock = SystemClock;

    match cli.command {
        Commands::Monitor { room } => {
            let room = store
                .room_by_name(&room)?
                .ok_or(AttendanceError::RoomNotFound(room))?;

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

            println!("Monitoring {} (Ctrl-C to stop)", room.name);
            let provider = V4lProvider::new(config.camera.clone());
            let mut monitor = RoomMonitor::new(
                &store,
                config,
                room,
                &clock,
                Box::new(NullRecognizer),
                Box::new(provider),
            );
            monitor.run(&shutdown)?;
        }
        Commands::Setup => setup_sample_data(&store, clock.now().date())?,
        Commands::ScheduleNow { room, classroom, minutes, subject, teacher } => {
            let now = clock.now();
            let request = CreateExtraSlotRequest {
                room,
                classroom,
                subject,
                teacher,
                date: now.date(),
                start_time: now.time(),
                end_time: now.time() + chrono::Duration::minutes(minutes),
            };
            match AdminApi::new(&store).create_extra_slot(&request, now.date())? {
                CreateExtraSlotResponse::Created { slot } => {
                    println!(
                        "Created extra lecture (slot {}) from {} to {}",
                        slot,
                        request.start_time.format("%H:%M"),
                        request.end_time.format("%H:%M")
                    );
                }
                CreateExtraSlotResponse::Rejected { reason } => {
                    println!("Rejected: {}", reason);
                }
            }
        }
        Commands::StartLecture { slot, date, room } => {
            let now = clock.now();
            let selector = match (slot, room) {
                (Some(slot), None) => LectureSelector::Slot {
                    slot,
                    date: date.unwrap_or(now.date()),
                },
                (None, Some(room)) => LectureSelector::RoomNow { room },
                _ => anyhow::bail!("pass exactly one of --slot or --room"),
            };
            let response =
                AdminApi::new(&store).start_lecture(&StartLectureRequest { selector }, now)?;
            println!("Lecture {}: {}", response.lecture, response.outcome);
        }
        Commands::EndLecture { lecture } => {
            let response = AdminApi::new(&store)
                .end_lecture(&EndLectureRequest { lecture }, clock.now())?;
            if response.ended {
                println!(
                    "Lecture {} completed: {} present, {} absent",
                    lecture, response.present, response.absent
                );
            } else {
                println!(
                    "Lecture {} was not active ({} present, {} absent)",
                    lecture, response.present, response.absent
                );
            }
        }
        Commands::SetAttendance { lecture, present } => {
            let response = AdminApi::new(&store)
                .set_bulk_attendance(&SetAttendanceRequest { lecture, present }, clock.now())?;
            println!(
                "Attendance set: {} present, {} absent",
                response.present, response.absent
            );
        }
        Commands::ValidateSlot { room, classroom, weekday, date, start, end } => {
            let room = store
                .room_by_name(&room)?
                .ok_or(AttendanceError::RoomNotFound(room))?;
            let class = store
                .classroom_by_name(&classroom)?
                .ok_or(AttendanceError::ClassroomNotFound(classroom))?;
            let occurrence = match (weekday, date) {
                (Some(weekday), None) => SlotOccurrence::Recurring { weekday },
                (None, Some(date)) => SlotOccurrence::Extra { date },
                _ => anyhow::bail!("pass exactly one of --weekday or --date"),
            };
            let candidate = NewSlot {
                room: room.id,
                classroom: class.id,
                subject: String::new(),
                teacher: String::new(),
                occurrence,
                start_time: NaiveTime::parse_from_str(&start, "%H:%M")?,
                end_time: NaiveTime::parse_from_str(&end, "%H:%M")?,
            };
            match ConflictResolver::new(&store).validate_new_slot(&candidate, clock.now().date())? {
                Ok(()) => println!("OK: slot does not conflict"),
                Err(rejection) => println!("Rejected: {}", rejection),
            }
        }
    }

    Ok(())
}

/// Small campus to play with: two rooms, two classrooms, a handful of
/// students and a Monday-to-Friday timetable.
fn setup_sample_data(store: &dyn Store, today: NaiveDate) -> Result<()> {
    let room_101 = store.insert_room("Room 101", "Main building, first floor", 0)?;
    let lab_1 = store.insert_room("Lab 1", "Computer lab", 1)?;
    let cs_a = store.insert_classroom("CS-A", "Computer Science, section A")?;
    let cs_b = store.insert_classroom("CS-B", "Computer Science, section B")?;
    println!("Rooms: {}, {}", room_101.name, lab_1.name);
    println!("Classrooms: {}, {}", cs_a.name, cs_b.name);

    let roster = [
        ("CS-A-001", "Asha Rao", cs_a.id),
        ("CS-A-002", "Ravi Nair", cs_a.id),
        ("CS-A-003", "Meera Pillai", cs_a.id),
        ("CS-B-001", "Vikram Shah", cs_b.id),
        ("CS-B-002", "Nisha Gupta", cs_b.id),
    ];
    for (roll_no, name, classroom) in roster {
        // Face label convention: roll number with the dash before the
        // serial replaced, matching the enrollment tooling.
        let label = roll_no.replace('-', "_");
        store.insert_student(roll_no, name, classroom, &label)?;
        println!("Student: {} ({})", name, roll_no);
    }

    let weekdays = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];
    let subjects = [
        ("Data Structures", "Dr. Smith"),
        ("Database Management", "Prof. Johnson"),
        ("Operating Systems", "Dr. Iyer"),
    ];
    let mut created = 0;
    for (day_index, weekday) in weekdays.into_iter().enumerate() {
        for (hour_index, (subject, teacher)) in subjects.into_iter().enumerate() {
            // Alternate the two classrooms between the two rooms by day.
            let (room, classroom) = if (day_index + hour_index) % 2 == 0 {
                (room_101.id, cs_a.id)
            } else {
                (lab_1.id, cs_b.id)
            };
            let start = NaiveTime::from_hms_opt(9 + hour_index as u32, 0, 0)
                .ok_or_else(|| anyhow::anyhow!("slot start out of range"))?;
            let end = NaiveTime::from_hms_opt(10 + hour_index as u32, 0, 0)
                .ok_or_else(|| anyhow::anyhow!("slot end out of range"))?;
            let candidate = NewSlot {
                room,
                classroom,
                subject: subject.into(),
                teacher: teacher.into(),
                occurrence: SlotOccurrence::Recurring { weekday },
                start_time: start,
                end_time: end,
            };
            if rollcall::schedule::validate_and_insert(store, candidate, today)?.is_ok() {
                created += 1;
            }
        }
    }
    println!("Timetable: {} weekly slots created", created);
    Ok(())
}

fn setup_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
