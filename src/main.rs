//src/main.rs
mod cli;

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell as TableCell, Color, ContentArrangement, Table};
use std::io::{stdin, stdout, Write};
use tracing::error;
use tracing_subscriber::EnvFilter;

use fitcoach_lib::draft::ExercisePatch;
use fitcoach_lib::reorder::ListDrag;
use fitcoach_lib::units::Unit;
use fitcoach_lib::{
    user_message, AppService, Block, Exercise, ListPath, MeasurementType, Paginated, Program,
    ProgramPatch, ProgramStore, SaveOutcome, ScheduleKind, TimeUnit, Week, WeekPatch, WeightUnit,
    Workout, WorkoutStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = cli::parse_args();

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();

        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    init_logging(cli_args.verbose);

    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;

    if let Err(e) = run(&mut service, cli_args.command).await {
        error!("{e:#}");
        eprintln!("Error: {}", user_message(&e));
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(service: &mut AppService, command: cli::Commands) -> Result<()> {
    let header_color = service.config.theme.header();

    match command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }

        // --- Account ---
        cli::Commands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password")?,
            };
            service.login(&email, &password).await?;
            println!("Logged in as {}.", email.trim());
        }
        cli::Commands::Register { name, email } => {
            let password = prompt("Password")?;
            let confirmation = prompt("Confirm password")?;
            service.register(&name, &email, &password, &confirmation).await?;
            println!("Account created for {}. You are now logged in.", email.trim());
        }
        cli::Commands::Logout => {
            service.logout().await?;
            println!("Logged out.");
        }
        cli::Commands::ResetPassword { email } => {
            service.request_password_reset(&email).await?;
            println!("If an account exists for {}, a reset link is on its way.", email.trim());
        }

        // --- Programs ---
        cli::Commands::Programs { cursor } => {
            let page = service.list_programs(cursor.as_deref()).await?;
            print_program_list(&page, header_color);
            if page.pagination.has_next_page {
                if let Some(next) = &page.pagination.cursor {
                    println!("More programs: fitcoach programs --cursor {next}");
                }
            }
        }
        cli::Commands::ShowProgram { id } => {
            let store = service.open_program(&id).await?;
            print_program(store.entity(), header_color);
        }
        cli::Commands::CreateProgram {
            name,
            description,
            weeks,
            access,
        } => {
            if name.trim().is_empty() {
                bail!("Program name cannot be empty.");
            }
            let mut store = ProgramStore::new(Program {
                name: name.trim().to_string(),
                description: description.unwrap_or_default(),
                access_type: access.unwrap_or_default(),
                ..Program::default()
            });
            for _ in 0..weeks {
                store.add_blank_week()?;
            }
            sync_week_count(&mut store)?;
            service
                .save_program(&mut store)
                .await
                .context("Failed to create program.")?;
            println!(
                "Created program '{}' (ID: {}) with {} week(s).",
                store.entity().name,
                store.entity().id.as_deref().unwrap_or("-"),
                store.entity().weeks.len()
            );
        }
        cli::Commands::EditProgram {
            id,
            name,
            description,
            access,
            types,
        } => {
            let patch = ProgramPatch {
                name: name.map(|n| n.trim().to_string()),
                description,
                access_type: access,
                types: types.map(|t| split_tags(&t)),
                ..ProgramPatch::default()
            };
            if patch == ProgramPatch::default() {
                bail!("Nothing to change. Pass at least one field to edit.");
            }
            let mut store = service.open_program(&id).await?;
            store.update_fields(patch)?;
            report_save(service.save_program(&mut store).await?, "program");
        }
        cli::Commands::AddWeek { program } => {
            let mut store = service.open_program(&program).await?;
            store.add_blank_week()?;
            sync_week_count(&mut store)?;
            report_save(service.save_program(&mut store).await?, "program");
            print_program(store.entity(), header_color);
        }
        cli::Commands::RemoveWeek { program, week } => {
            let mut store = service.open_program(&program).await?;
            store.remove_week(position(week, "Week")?)?;
            sync_week_count(&mut store)?;
            report_save(service.save_program(&mut store).await?, "program");
            print_program(store.entity(), header_color);
        }
        cli::Commands::MoveWeek { program, from, to } => {
            let Some((from, to)) = dragged(from, to, "Week")? else {
                println!("Nothing to move.");
                return Ok(());
            };
            let mut store = service.open_program(&program).await?;
            store.reorder_weeks(from, to)?;
            report_save(service.save_program(&mut store).await?, "program");
            print_program(store.entity(), header_color);
        }
        cli::Commands::ShowWeek { program, week } => {
            let week = service.open_week(&program, week).await?;
            print_week(&week, header_color);
        }
        cli::Commands::EditWeek {
            program,
            week,
            name,
            description,
            start,
            end,
            clear_dates,
        } => {
            let patch = WeekPatch {
                name: name.map(|n| n.trim().to_string()),
                description,
                start_date: if clear_dates { Some(None) } else { start.map(Some) },
                end_date: if clear_dates { Some(None) } else { end.map(Some) },
            };
            if patch == WeekPatch::default() {
                bail!("Nothing to change. Pass at least one field to edit.");
            }
            let mut store = service.open_program(&program).await?;
            let (index, _) = store
                .entity()
                .week_by_number(week)
                .with_context(|| format!("Week {week} not found in program"))?;
            report_save(service.edit_week(&mut store, index, patch).await?, "week");
            print_program(store.entity(), header_color);
        }
        cli::Commands::Schedule {
            program,
            week,
            from,
            to,
            kind,
            name,
        } => {
            let mut store = service.open_program(&program).await?;
            let (week_index, item) =
                service.plan_schedule(store.entity(), week, from, to.unwrap_or(from), kind)?;
            if kind == ScheduleKind::Workout {
                let created = service
                    .schedule_workout(&mut store, week_index, &item, &name)
                    .await?;
                println!(
                    "Scheduled '{}' in week {week}: {} to {} ({} min).",
                    created.name,
                    item.start.format("%a %Y-%m-%d %H:%M"),
                    item.end.format("%H:%M"),
                    created.scheduled_minutes().unwrap_or_default()
                );
            } else {
                println!(
                    "Selected a {kind} slot: {} to {}. Only workouts are stored in a program week.",
                    item.start.format("%a %Y-%m-%d %H:%M"),
                    item.end.format("%H:%M")
                );
            }
        }

        // --- Workouts ---
        cli::Commands::ShowWorkout { id } => {
            let store = service.open_workout(&id).await?;
            print_workout(
                store.entity(),
                header_color,
                service.config.weight_unit,
                service.config.time_unit,
            );
        }
        cli::Commands::AddBlock {
            workout,
            name,
            sets,
            rest,
        } => {
            let mut block = Block::new_default();
            if let Some(n) = name {
                block.name = n;
            }
            if let Some(s) = sets {
                block.sets = s;
            }
            if let Some(r) = rest {
                block.rest = r;
            }
            let mut store = service.open_workout(&workout).await?;
            store.add_block(block)?;
            save_and_show_workout(service, &mut store, header_color).await?;
        }
        cli::Commands::RemoveBlock { workout, block } => {
            let mut store = service.open_workout(&workout).await?;
            store.remove_block(position(block, "Circuit")?)?;
            store.renumber(ListPath::Blocks)?;
            save_and_show_workout(service, &mut store, header_color).await?;
        }
        cli::Commands::MoveBlock { workout, from, to } => {
            let Some((from, to)) = dragged(from, to, "Circuit")? else {
                println!("Nothing to move.");
                return Ok(());
            };
            let mut store = service.open_workout(&workout).await?;
            store.reorder_blocks(from, to)?;
            save_and_show_workout(service, &mut store, header_color).await?;
        }
        cli::Commands::AddExercise {
            workout,
            block,
            name,
            measurement,
            reps,
            weight,
            time,
            weight_unit,
            time_unit,
        } => {
            let block = position(block, "Circuit")?;
            let input = ExerciseInput {
                name,
                measurement,
                reps,
                weight,
                time,
                rest: None,
                notes: None,
                weight_unit: weight_unit.unwrap_or(service.config.weight_unit),
                time_unit: time_unit.unwrap_or(service.config.time_unit),
            };
            let mut store = service.open_workout(&workout).await?;
            store.add_exercise(block, Exercise::new_default())?;
            let index = store
                .entity()
                .blocks
                .get(block)
                .map_or(0, |b| b.exercises.len().saturating_sub(1));
            let patch = input.into_patch(&Exercise::new_default());
            if !patch.is_empty() {
                store.update_exercise(block, index, patch)?;
            }
            save_and_show_workout(service, &mut store, header_color).await?;
        }
        cli::Commands::EditExercise {
            workout,
            block,
            exercise,
            name,
            reps,
            weight,
            time,
            rest,
            notes,
            weight_unit,
            time_unit,
        } => {
            let block = position(block, "Circuit")?;
            let index = position(exercise, "Exercise")?;
            let input = ExerciseInput {
                name,
                measurement: None,
                reps,
                weight,
                time,
                rest,
                notes,
                weight_unit: weight_unit.unwrap_or(service.config.weight_unit),
                time_unit: time_unit.unwrap_or(service.config.time_unit),
            };
            let mut store = service.open_workout(&workout).await?;
            let current = store
                .entity()
                .blocks
                .get(block)
                .and_then(|b| b.exercises.get(index))
                .cloned()
                .with_context(|| {
                    format!("Exercise {exercise} not found in circuit {}", block + 1)
                })?;
            let patch = input.into_patch(&current);
            if patch.is_empty() {
                bail!("Nothing to change. Pass at least one field to edit.");
            }
            store.update_exercise(block, index, patch)?;
            save_and_show_workout(service, &mut store, header_color).await?;
        }
        cli::Commands::RemoveExercise {
            workout,
            block,
            exercise,
        } => {
            let block = position(block, "Circuit")?;
            let mut store = service.open_workout(&workout).await?;
            store.remove_exercise(block, position(exercise, "Exercise")?)?;
            store.renumber(ListPath::Exercises { block })?;
            save_and_show_workout(service, &mut store, header_color).await?;
        }
        cli::Commands::MoveExercise {
            workout,
            block,
            from,
            to,
        } => {
            let block = position(block, "Circuit")?;
            let Some((from, to)) = dragged(from, to, "Exercise")? else {
                println!("Nothing to move.");
                return Ok(());
            };
            let mut store = service.open_workout(&workout).await?;
            store.reorder_exercises(block, from, to)?;
            save_and_show_workout(service, &mut store, header_color).await?;
        }

        // --- Config ---
        cli::Commands::ConfigPath => {
            println!("{}", service.get_config_path().display());
        }
        cli::Commands::SetApiUrl { url } => {
            service.set_api_base_url(&url)?;
            println!("API base URL set to {}. Config updated.", service.config.api_base_url);
        }
        cli::Commands::SetUnits { weight, time } => {
            if weight.is_none() && time.is_none() {
                bail!("Pass --weight and/or --time.");
            }
            service
                .set_units(weight, time)
                .context("Error updating units")?;
            println!(
                "Units set to {} / {}. Config updated.",
                service.config.weight_unit, service.config.time_unit
            );
        }
        cli::Commands::SetTimeout { secs } => {
            service.set_request_timeout(secs)?;
            println!("Request timeout set to {secs}s. Config updated.");
        }
        cli::Commands::SetHeaderColor { color } => {
            service
                .set_header_color(&color)
                .context("Error setting header color")?;
            println!("Header color set to {}. Config updated.", service.config.theme.header_color);
        }
    }

    Ok(())
}

// --- CLI Specific Helper Functions ---

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    stdout().flush().context("Failed to flush stdout")?;
    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Converts a 1-based position typed by the user to an index.
fn position(value: usize, what: &str) -> Result<usize> {
    value
        .checked_sub(1)
        .with_context(|| format!("{what} positions start at 1"))
}

/// A move typed as 1-based positions, played as a list drag.
/// `None` when the item would stay where it is.
fn dragged(from: usize, to: usize, what: &str) -> Result<Option<(usize, usize)>> {
    let mut drag = ListDrag::default();
    drag.begin(position(from, what)?);
    drag.hover(position(to, what)?);
    Ok(drag.drop_item())
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn sync_week_count(store: &mut ProgramStore) -> Result<()> {
    let count = u32::try_from(store.entity().weeks.len())?;
    if store.entity().num_weeks != count {
        store.update_fields(ProgramPatch {
            num_weeks: Some(count),
            ..ProgramPatch::default()
        })?;
    }
    Ok(())
}

fn report_save(outcome: SaveOutcome, what: &str) {
    match outcome {
        SaveOutcome::Created => println!("Created {what}."),
        SaveOutcome::Updated => println!("Saved {what}."),
        SaveOutcome::NothingToSave => println!("No changes to save."),
    }
}

async fn save_and_show_workout(
    service: &AppService,
    store: &mut WorkoutStore,
    header_color: Color,
) -> Result<()> {
    let outcome = service.save_workout(store).await?;
    report_save(outcome, "workout");
    print_workout(
        store.entity(),
        header_color,
        service.config.weight_unit,
        service.config.time_unit,
    );
    Ok(())
}

/// Raw exercise flags, converted from display units on the way in.
struct ExerciseInput {
    name: Option<String>,
    measurement: Option<MeasurementType>,
    reps: Option<u32>,
    weight: Option<String>,
    time: Option<String>,
    rest: Option<u32>,
    notes: Option<String>,
    weight_unit: WeightUnit,
    time_unit: TimeUnit,
}

impl ExerciseInput {
    fn into_patch(self, current: &Exercise) -> ExercisePatch {
        let mut patch = ExercisePatch {
            name: self.name,
            measurement_type: self.measurement,
            target_reps: self.reps,
            rest: self.rest,
            notes: self.notes,
            ..ExercisePatch::default()
        };
        if let Some(raw) = self.weight.as_deref() {
            patch.target_weight = Some(current.weight_field(self.weight_unit).on_input(raw));
        }
        if let Some(raw) = self.time.as_deref() {
            let seconds = whole_seconds(current.time_field(self.time_unit).on_input(raw));
            // TIME exercises keep their target seconds in target_reps
            if self.measurement.unwrap_or(current.measurement_type) == MeasurementType::Time {
                patch.target_reps = Some(seconds);
            } else {
                patch.target_duration_sec = Some(seconds);
            }
        }
        patch
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_seconds(base: f64) -> u32 {
    base.max(0.0).round() as u32
}

// --- Tables ---

fn print_program_list(page: &Paginated<Program>, header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            TableCell::new("ID").fg(header_color),
            TableCell::new("Name").fg(header_color),
            TableCell::new("Weeks").fg(header_color),
            TableCell::new("Access").fg(header_color),
            TableCell::new("Types").fg(header_color),
        ]);

    for program in &page.data {
        table.add_row(vec![
            TableCell::new(program.id.as_deref().unwrap_or("-")),
            TableCell::new(&program.name),
            TableCell::new(program.num_weeks.to_string()),
            TableCell::new(program.access_type.to_string()),
            TableCell::new(if program.types.is_empty() {
                "-".to_string()
            } else {
                program.types.join(", ")
            }),
        ]);
    }
    println!("{table}");
}

fn print_program(program: &Program, header_color: Color) {
    println!(
        "{} ({}){}",
        program.name,
        program.access_type,
        program
            .id
            .as_deref()
            .map_or_else(String::new, |id| format!(" ID: {id}"))
    );
    if !program.description.is_empty() {
        println!("{}", program.description);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            TableCell::new("Week").fg(header_color),
            TableCell::new("Name").fg(header_color),
            TableCell::new("Start").fg(header_color),
            TableCell::new("End").fg(header_color),
            TableCell::new("Workouts").fg(header_color),
        ]);

    for week in &program.weeks {
        let workouts = week
            .workouts
            .iter()
            .map(describe_scheduled)
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            TableCell::new(week.week_number.to_string()),
            TableCell::new(&week.name),
            TableCell::new(week.start_date.map_or("-".to_string(), |d| d.to_string())),
            TableCell::new(week.end_date.map_or("-".to_string(), |d| d.to_string())),
            TableCell::new(if workouts.is_empty() { "-".to_string() } else { workouts }),
        ]);
    }
    println!("{table}");
}

fn print_week(week: &Week, header_color: Color) {
    println!("Week {}: {}", week.week_number, week.name);
    if let (Some(start), Some(end)) = (week.start_date, week.end_date) {
        println!("{start} to {end}");
    }
    if !week.description.is_empty() {
        println!("{}", week.description);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            TableCell::new("ID").fg(header_color),
            TableCell::new("Workout").fg(header_color),
            TableCell::new("Start").fg(header_color),
            TableCell::new("End").fg(header_color),
            TableCell::new("Minutes").fg(header_color),
        ]);
    for workout in &week.workouts {
        table.add_row(vec![
            TableCell::new(workout.id.as_deref().unwrap_or("-")),
            TableCell::new(&workout.name),
            TableCell::new(
                workout
                    .start_date
                    .map_or("-".to_string(), |d| d.format("%a %Y-%m-%d %H:%M").to_string()),
            ),
            TableCell::new(
                workout
                    .end_date
                    .map_or("-".to_string(), |d| d.format("%H:%M").to_string()),
            ),
            TableCell::new(
                workout
                    .scheduled_minutes()
                    .map_or("-".to_string(), |m| m.to_string()),
            ),
        ]);
    }
    println!("{table}");
}

fn describe_scheduled(workout: &Workout) -> String {
    match workout.start_date {
        Some(start) => format!("{} ({})", workout.name, start.format("%a %H:%M")),
        None => workout.name.clone(),
    }
}

fn print_workout(workout: &Workout, header_color: Color, weight_unit: WeightUnit, time_unit: TimeUnit) {
    println!(
        "{}{} - {} min",
        workout.name,
        workout
            .id
            .as_deref()
            .map_or_else(String::new, |id| format!(" (ID: {id})")),
        workout.duration
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            TableCell::new("#").fg(header_color),
            TableCell::new("Exercise").fg(header_color),
            TableCell::new("Type").fg(header_color),
            TableCell::new("Reps").fg(header_color),
            TableCell::new(format!("Weight ({weight_unit})")).fg(header_color),
            TableCell::new(format!("Time ({time_unit})")).fg(header_color),
            TableCell::new("Rest (s)").fg(header_color),
            TableCell::new("Notes").fg(header_color),
        ]);

    for (b, block) in workout.blocks.iter().enumerate() {
        table.add_row(vec![
            TableCell::new(format!("{}", b + 1)),
            TableCell::new(format!("{} x{}", block.name, block.sets)),
            TableCell::new("circuit"),
            TableCell::new(""),
            TableCell::new(""),
            TableCell::new(""),
            TableCell::new(block.rest.to_string()),
            TableCell::new(""),
        ]);
        for (e, exercise) in block.exercises.iter().enumerate() {
            let timed = exercise.measurement_type == MeasurementType::Time;
            let reps = if timed {
                "-".to_string()
            } else {
                exercise.target_reps.to_string()
            };
            let time = if timed || exercise.target_duration_sec > 0 {
                exercise.time_field(time_unit).display().to_string()
            } else {
                "-".to_string()
            };
            let weight = if exercise.target_weight > 0.0 {
                weight_unit.format(exercise.target_weight)
            } else {
                "-".to_string()
            };
            table.add_row(vec![
                TableCell::new(format!("{}.{}", b + 1, e + 1)),
                TableCell::new(&exercise.name),
                TableCell::new(exercise.measurement_type.to_string()),
                TableCell::new(reps),
                TableCell::new(weight),
                TableCell::new(time),
                TableCell::new(exercise.rest.to_string()),
                TableCell::new(if exercise.notes.is_empty() { "-" } else { exercise.notes.as_str() }),
            ]);
        }
    }
    println!("{table}");
}
