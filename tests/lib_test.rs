use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use fitcoach_lib::draft::{ExercisePatch, WeekPatch};
use fitcoach_lib::reorder::is_dense;
use fitcoach_lib::{
    load_config_util, user_message, AppService, Block, Cell, Config, DraftError, Exercise,
    FormError, MeasurementType, Program, ProgramPatch, ProgramStore, SaveOutcome, ScheduleKind,
    Session, TimeUnit, WeightUnit, Week, Workout, WorkoutPatch, WorkoutStore,
};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn create_test_service() -> Result<(TempDir, AppService)> {
    let dir = tempfile::tempdir()?;
    let service = AppService::from_config_path(dir.path().join("config.toml"))?;
    Ok((dir, service))
}

/// Answers each incoming request with the next canned `(status, body)` and
/// hands back the raw requests it saw.
struct CannedBackend {
    base_url: String,
    handle: JoinHandle<Vec<String>>,
}

impl CannedBackend {
    fn start(replies: Vec<(u16, &'static str)>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in replies {
                let Some(mut stream) = accept_within(&listener, Duration::from_secs(5)) else {
                    break;
                };
                seen.push(read_request(&mut stream));
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason(status),
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
            seen
        });
        Ok(Self { base_url, handle })
    }

    fn requests(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

fn accept_within(listener: &TcpListener, limit: Duration) -> Option<TcpStream> {
    let deadline = Instant::now() + limit;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).ok()?;
                stream.set_read_timeout(Some(limit)).ok()?;
                return Some(stream);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock && Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return None,
        }
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).unwrap_or(0);
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        401 => "Unauthorized",
        _ => "Internal Server Error",
    }
}

fn has_header(request: &str, name: &str, value: &str) -> bool {
    let wanted = format!("{}: {}", name.to_lowercase(), value.to_lowercase());
    request.to_lowercase().lines().any(|line| line == wanted)
}

fn body_of(request: &str) -> serde_json::Value {
    let body = request.split_once("\r\n\r\n").map_or("", |(_, b)| b);
    serde_json::from_str(body).unwrap_or(serde_json::Value::Null)
}

fn service_against(backend: &CannedBackend) -> Result<(TempDir, AppService)> {
    let (dir, mut service) = create_test_service()?;
    service.set_api_base_url(&backend.base_url)?;
    Ok((dir, service))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
}

fn program_with_weeks(n: u32) -> Program {
    Program {
        id: Some("p1".to_string()),
        name: "Strength Block".to_string(),
        num_weeks: n,
        weeks: (1..=n)
            .map(|i| Week {
                id: Some(format!("wk{i}")),
                ..Week::numbered(i)
            })
            .collect(),
        ..Program::default()
    }
}

fn week_ids(program: &Program) -> Vec<&str> {
    program
        .weeks
        .iter()
        .map(|w| w.id.as_deref().unwrap_or("-"))
        .collect()
}

fn cell(s: &str) -> Cell {
    s.parse().unwrap()
}

#[test]
fn test_move_last_week_to_front_renumbers_positionally() -> Result<()> {
    let mut store = ProgramStore::new(program_with_weeks(6));
    store.reorder_weeks(5, 0)?;

    let weeks = &store.entity().weeks;
    assert_eq!(
        week_ids(store.entity()),
        ["wk6", "wk1", "wk2", "wk3", "wk4", "wk5"]
    );
    let numbers: Vec<u32> = weeks.iter().map(|w| w.week_number).collect();
    assert_eq!(numbers, [1, 2, 3, 4, 5, 6]);
    // Default names follow the new numbers
    let names: Vec<&str> = weeks.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(
        names,
        ["Week 1", "Week 2", "Week 3", "Week 4", "Week 5", "Week 6"]
    );
    assert!(store.has_unsaved_changes());
    assert!(store.entity().week_count_mismatch().is_none());
    Ok(())
}

#[test]
fn test_removing_a_week_closes_the_numbering_gap() -> Result<()> {
    let mut store = ProgramStore::new(program_with_weeks(4));
    store.remove_week(1)?;

    let numbers: Vec<u32> = store.entity().weeks.iter().map(|w| w.week_number).collect();
    assert_eq!(numbers, [1, 2, 3]);
    assert_eq!(week_ids(store.entity()), ["wk1", "wk3", "wk4"]);
    assert_eq!(store.entity().weeks[1].name, "Week 2");
    // num_weeks is left to the caller
    assert_eq!(store.entity().week_count_mismatch(), Some((4, 3)));
    Ok(())
}

#[test]
fn test_exercise_order_stays_dense_through_edits() -> Result<()> {
    let mut store = WorkoutStore::new(Workout {
        id: Some("w1".to_string()),
        name: "Upper".to_string(),
        ..Workout::default()
    });
    store.add_block(Block::new_default())?;
    for name in ["Press", "Row", "Dip", "Curl", "Fly"] {
        store.add_exercise(
            0,
            Exercise {
                name: name.to_string(),
                ..Exercise::new_default()
            },
        )?;
    }

    for (from, to) in [(0, 4), (3, 1), (2, 2), (4, 0), (1, 3)] {
        store.reorder_exercises(0, from, to)?;
        assert!(is_dense(&store.entity().blocks[0].exercises));
    }

    store.remove_exercise(0, 2)?;
    store.renumber(fitcoach_lib::ListPath::Exercises { block: 0 })?;
    assert!(is_dense(&store.entity().blocks[0].exercises));
    assert_eq!(store.entity().blocks[0].exercises.len(), 4);

    let err = store.reorder_exercises(0, 0, 9).unwrap_err();
    assert!(matches!(err, DraftError::IndexOutOfRange { index: 9, len: 4, .. }));
    Ok(())
}

#[test]
fn test_updates_leave_earlier_snapshots_untouched() -> Result<()> {
    let mut store = WorkoutStore::new(Workout {
        blocks: vec![Block {
            exercises: vec![Exercise::new_default()],
            ..Block::new_default()
        }],
        ..Workout::default()
    });
    let before = store.state();

    store.update_exercise(
        0,
        0,
        ExercisePatch {
            name: Some("Goblet Squat".to_string()),
            target_weight: Some(45.0),
            ..ExercisePatch::default()
        },
    )?;

    assert_eq!(before.workout.blocks[0].exercises[0].name, "New Exercise");
    assert!(!before.unsaved_changes);
    assert_eq!(store.entity().blocks[0].exercises[0].name, "Goblet Squat");
    assert!(store.has_unsaved_changes());
    Ok(())
}

#[test]
fn test_timed_exercise_displays_and_accepts_minutes() {
    let exercise = Exercise {
        measurement_type: MeasurementType::Time,
        target_reps: 90,
        ..Exercise::new_default()
    };
    let mut field = exercise.time_field(TimeUnit::Min);
    assert_eq!(field.display(), "1");
    assert!((field.on_input("2") - 120.0).abs() < f64::EPSILON);

    let mut weight = exercise.weight_field(WeightUnit::Kg);
    let lbs = weight.on_input("20");
    assert!((lbs - 44.1).abs() < 1e-9);
}

#[test]
fn test_schedule_drag_into_viewed_week() -> Result<()> {
    let (_dir, service) = create_test_service()?;
    let mut program = program_with_weeks(2);
    program.weeks[1].start_date = Some(date(2026, 10, 18));

    let (week_index, item) = service.plan_schedule(
        &program,
        2,
        cell("MON 9AM"),
        cell("MON 11AM"),
        ScheduleKind::Workout,
    )?;
    assert_eq!(week_index, 1);
    assert_eq!(item.start, at(2026, 10, 19, 9));
    assert_eq!(item.end, at(2026, 10, 19, 12));

    // Dragging upwards selects the same slot
    let (_, reversed) = service.plan_schedule(
        &program,
        2,
        cell("MON 11AM"),
        cell("MON 9AM"),
        ScheduleKind::Meal,
    )?;
    assert_eq!((reversed.start, reversed.end), (item.start, item.end));

    let workout = item.to_workout("Push Day").unwrap();
    assert_eq!(workout.duration, 180);
    assert_eq!(workout.scheduled_minutes(), Some(180));

    let mut store = ProgramStore::new(program);
    store.upsert_week_workout(week_index, workout)?;
    assert_eq!(store.entity().weeks[1].workouts.len(), 1);
    assert!(store.has_unsaved_changes());

    // The new workout now blocks its first hour
    let blocked = service.plan_schedule(
        store.entity(),
        2,
        cell("MON 9AM"),
        cell("MON 9AM"),
        ScheduleKind::Workout,
    );
    assert!(blocked.is_err());
    Ok(())
}

#[test]
fn test_schedule_rejects_occupied_start_and_unknown_week() -> Result<()> {
    let (_dir, service) = create_test_service()?;
    let mut program = program_with_weeks(1);
    program.weeks[0].start_date = Some(date(2026, 10, 18));
    program.weeks[0].workouts.push(Workout {
        id: Some("w1".to_string()),
        name: "Existing".to_string(),
        start_date: Some(at(2026, 10, 19, 10)),
        end_date: Some(at(2026, 10, 19, 11)),
        ..Workout::default()
    });

    let taken = service.plan_schedule(
        &program,
        1,
        cell("MON 10AM"),
        cell("MON 10AM"),
        ScheduleKind::Workout,
    );
    assert!(taken.is_err());

    let missing = service.plan_schedule(
        &program,
        3,
        cell("MON 9AM"),
        cell("MON 9AM"),
        ScheduleKind::Workout,
    );
    assert!(missing.is_err());

    // A drag across the busy hour keeps only the free cells
    let (_, item) = service.plan_schedule(
        &program,
        1,
        cell("MON 9AM"),
        cell("MON 11AM"),
        ScheduleKind::Note,
    )?;
    assert_eq!(item.start, at(2026, 10, 19, 9));
    assert_eq!(item.end, at(2026, 10, 19, 12));
    assert!(item.to_workout("note").is_none());
    Ok(())
}

#[test]
fn test_session_lifecycle_keeps_device_id() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("session.toml");

    let mut session = Session::load(&path)?;
    assert!(path.exists());
    assert!(!session.is_authenticated());
    let device_id = session.device_id.clone();
    assert!(!device_id.is_empty());

    session.set_tokens("access".to_string(), "refresh".to_string());
    session.save(&path)?;
    let reloaded = Session::load(&path)?;
    assert_eq!(reloaded, session);
    assert!(reloaded.is_authenticated());

    session.clear();
    session.save(&path)?;
    let cleared = Session::load(&path)?;
    assert!(!cleared.is_authenticated());
    assert!(cleared.refresh_token.is_none());
    assert_eq!(cleared.device_id, device_id);
    Ok(())
}

#[test]
fn test_config_is_created_and_updated() -> Result<()> {
    let (dir, mut service) = create_test_service()?;
    let config_path = dir.path().join("config.toml");
    assert!(config_path.exists());
    assert!(dir.path().join("session.toml").exists());
    assert_eq!(service.config, Config::default());

    service.set_units(Some(WeightUnit::Kg), Some(TimeUnit::Min))?;
    service.set_header_color("green")?;
    service.set_request_timeout(5)?;
    assert!(service.set_request_timeout(0).is_err());
    assert!(service.set_header_color("chartreuse").is_err());
    assert!(service.set_api_base_url("   ").is_err());

    let reloaded = load_config_util(&config_path)?;
    assert_eq!(reloaded.weight_unit, WeightUnit::Kg);
    assert_eq!(reloaded.time_unit, TimeUnit::Min);
    assert_eq!(reloaded.theme.header_color, "Green");
    assert_eq!(reloaded.request_timeout_secs, 5);
    Ok(())
}

#[tokio::test]
async fn test_save_skips_clean_drafts_and_guards_double_submit() -> Result<()> {
    let (_dir, service) = create_test_service()?;

    let mut clean = ProgramStore::new(program_with_weeks(1));
    assert_eq!(service.save_program(&mut clean).await?, SaveOutcome::NothingToSave);

    let mut store = ProgramStore::new(program_with_weeks(1));
    store.update_week(
        0,
        WeekPatch {
            name: Some("Deload".to_string()),
            ..WeekPatch::default()
        },
    )?;
    let _pending = store.begin_save()?;
    let err = service.save_program(&mut store).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<DraftError>(),
        Some(&DraftError::SaveInProgress)
    );

    store.abort_save();
    assert!(!store.is_saving());
    assert!(store.has_unsaved_changes());
    Ok(())
}

#[tokio::test]
async fn test_requests_carry_session_headers_and_an_encoded_cursor() -> Result<()> {
    let backend = CannedBackend::start(vec![
        (200, r#"{"accessToken": "access-1", "refreshToken": "refresh-1"}"#),
        (200, r#"{"data": [{"id": "p1", "name": "Base"}], "pagination": {"hasNextPage": true, "cursor": "next"}}"#),
    ])?;
    let (_dir, mut service) = service_against(&backend)?;
    let device_id = service.session.device_id.clone();

    service.login("coach@example.com", "hunter22").await?;
    assert!(service.session.is_authenticated());
    let page = service.list_programs(Some("ab+c/d==&limit=1")).await?;
    assert_eq!(page.data[0].id.as_deref(), Some("p1"));
    assert_eq!(page.pagination.cursor.as_deref(), Some("next"));

    let requests = backend.requests();
    let login = &requests[0];
    assert!(login.starts_with("POST /auth/login "));
    assert!(has_header(login, "X-Device-Id", &device_id));
    assert!(!login.to_lowercase().contains("authorization:"));
    assert_eq!(body_of(login)["email"], "coach@example.com");

    let listing = &requests[1];
    assert!(
        listing.starts_with("GET /programs?cursor=ab%2Bc%2Fd%3D%3D%26limit%3D1 "),
        "{listing}"
    );
    assert!(has_header(listing, "Authorization", "Bearer access-1"));
    assert!(has_header(listing, "X-Device-Id", &device_id));
    Ok(())
}

#[tokio::test]
async fn test_saves_create_then_update_and_install_the_server_copy() -> Result<()> {
    let backend = CannedBackend::start(vec![
        (201, r#"{"id": "p9", "name": "Base", "numWeeks": 1,
                  "weeks": [{"id": "wk1", "name": "Week 1", "weekNumber": 1}]}"#),
        (200, r#"{"id": "p9", "name": "Base v2", "description": "checked by coach",
                  "numWeeks": 1, "weeks": [{"id": "wk1", "name": "Week 1", "weekNumber": 1}]}"#),
        (201, r#"{"id": "w9", "name": "Upper", "duration": 45}"#),
        (200, r#"{"id": "w9", "name": "Upper A", "duration": 45}"#),
    ])?;
    let (_dir, service) = service_against(&backend)?;

    let mut program = ProgramStore::new(Program {
        name: "Base".to_string(),
        ..Program::default()
    });
    program.add_blank_week()?;
    assert_eq!(service.save_program(&mut program).await?, SaveOutcome::Created);
    assert_eq!(program.entity().id.as_deref(), Some("p9"));
    assert_eq!(program.entity().weeks[0].id.as_deref(), Some("wk1"));
    assert!(!program.has_unsaved_changes());
    assert!(!program.is_saving());

    program.update_fields(ProgramPatch {
        name: Some("Base v2".to_string()),
        ..ProgramPatch::default()
    })?;
    assert_eq!(service.save_program(&mut program).await?, SaveOutcome::Updated);
    assert_eq!(program.entity().description, "checked by coach");
    assert!(!program.has_unsaved_changes());

    let mut workout = WorkoutStore::new(Workout::default());
    workout.update_fields(WorkoutPatch {
        name: Some("Upper".to_string()),
        ..WorkoutPatch::default()
    })?;
    assert_eq!(service.save_workout(&mut workout).await?, SaveOutcome::Created);
    assert_eq!(workout.entity().id.as_deref(), Some("w9"));
    workout.update_fields(WorkoutPatch {
        name: Some("Upper A".to_string()),
        ..WorkoutPatch::default()
    })?;
    assert_eq!(service.save_workout(&mut workout).await?, SaveOutcome::Updated);
    assert_eq!(workout.entity().name, "Upper A");
    assert!(!workout.has_unsaved_changes());

    let requests = backend.requests();
    assert!(requests[0].starts_with("POST /programs "));
    assert!(body_of(&requests[0]).get("id").is_none());
    assert!(requests[1].starts_with("PUT /programs/p9 "));
    assert_eq!(body_of(&requests[1])["name"], "Base v2");
    assert!(requests[2].starts_with("POST /workouts "));
    assert!(requests[3].starts_with("PUT /workouts/w9 "));
    Ok(())
}

#[tokio::test]
async fn test_error_statuses_become_readable_messages() -> Result<()> {
    let backend = CannedBackend::start(vec![
        (401, r#"{"message": "Invalid email or password"}"#),
        (401, r#"{"message": "jwt expired"}"#),
        (500, "upstream exploded"),
    ])?;
    let (_dir, mut service) = service_against(&backend)?;

    let err = service.login("coach@example.com", "wrong-pass").await.unwrap_err();
    assert_eq!(user_message(&err), FormError::InvalidCredentials.message());
    assert!(!service.session.is_authenticated());

    let err = service.list_programs(None).await.unwrap_err();
    assert!(user_message(&err).contains("fitcoach login"));

    let err = service.list_programs(None).await.unwrap_err();
    assert_eq!(user_message(&err), "Failed to list programs");
    assert!(format!("{err:#}").contains("upstream exploded"));

    // Local validation never reaches the backend
    let err = service.login("not-an-email", "x").await.unwrap_err();
    assert!(user_message(&err).contains("not a valid email"));

    assert_eq!(backend.requests().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_failed_program_save_deletes_the_scheduled_workout() -> Result<()> {
    let backend = CannedBackend::start(vec![
        (201, r#"{"id": "w7", "name": "Push Day"}"#),
        (500, r#"{"message": "database unavailable"}"#),
        (204, ""),
        (201, r#"{"id": "w8", "name": "Push Day"}"#),
        (500, r#"{"message": "database unavailable"}"#),
        (500, r#"{"message": "still down"}"#),
    ])?;
    let (_dir, service) = service_against(&backend)?;
    let mut program = program_with_weeks(1);
    program.weeks[0].start_date = Some(date(2026, 10, 18));
    let mut store = ProgramStore::new(program);

    let (week_index, item) = service.plan_schedule(
        store.entity(),
        1,
        cell("MON 9AM"),
        cell("MON 10AM"),
        ScheduleKind::Workout,
    )?;
    let err = service
        .schedule_workout(&mut store, week_index, &item, "Push Day")
        .await
        .unwrap_err();
    assert_eq!(user_message(&err), "Could not save event.");
    assert!(store.entity().weeks[0].workouts.is_empty());
    assert!(!store.is_saving());

    // When the cleanup fails too, the orphan is named
    let err = service
        .schedule_workout(&mut store, week_index, &item, "Push Day")
        .await
        .unwrap_err();
    assert!(user_message(&err).contains("Workout 'w8' was created"));
    assert!(store.entity().weeks[0].workouts.is_empty());

    let requests = backend.requests();
    assert!(requests[0].starts_with("POST /workouts "));
    assert!(requests[1].starts_with("PUT /programs/p1 "));
    assert!(requests[2].starts_with("DELETE /workouts/w7 "));
    assert!(requests[5].starts_with("DELETE /workouts/w8 "));
    Ok(())
}

#[tokio::test]
async fn test_week_is_fetched_and_edited_on_its_own() -> Result<()> {
    let backend = CannedBackend::start(vec![
        (200, r#"{"id": "p1", "name": "Base", "numWeeks": 2, "weeks": [
                  {"id": "wk1", "name": "Week 1", "weekNumber": 1},
                  {"id": "wk2", "name": "Week 2", "weekNumber": 2}]}"#),
        (200, r#"{"id": "wk2", "name": "Week 2", "weekNumber": 2,
                  "startDate": "2026-10-25T00:00:00.000Z",
                  "workouts": [{"id": "w1", "name": "Legs"}]}"#),
        (200, r#"{"id": "wk1", "name": "Deload", "weekNumber": 1, "startDate": "2026-10-18"}"#),
    ])?;
    let (_dir, service) = service_against(&backend)?;

    let week = service.open_week("p1", 2).await?;
    assert_eq!(week.start_date, Some(date(2026, 10, 25)));
    assert_eq!(week.workouts.len(), 1);

    let mut store = ProgramStore::new(program_with_weeks(2));
    let outcome = service
        .edit_week(
            &mut store,
            0,
            WeekPatch {
                name: Some("Deload".to_string()),
                start_date: Some(Some(date(2026, 10, 18))),
                ..WeekPatch::default()
            },
        )
        .await?;
    assert_eq!(outcome, SaveOutcome::Updated);
    assert_eq!(store.entity().weeks[0].name, "Deload");
    assert_eq!(store.entity().weeks[1].name, "Week 2");
    assert!(!store.has_unsaved_changes());

    let requests = backend.requests();
    assert!(requests[0].starts_with("GET /programs/p1 "));
    assert!(requests[1].starts_with("GET /programs/p1/weeks/wk2 "));
    assert!(requests[2].starts_with("PUT /programs/p1/weeks/wk1 "));
    assert_eq!(body_of(&requests[2])["startDate"], "2026-10-18");
    Ok(())
}
