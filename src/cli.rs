// src/cli.rs
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use fitcoach_lib::{AccessType, Cell, MeasurementType, ScheduleKind, TimeUnit, WeightUnit};

#[derive(Parser, Debug)]
#[command(author, version, about = "Plan and edit coaching programs from the terminal", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    // --- Account ---
    /// Sign in and store the session tokens
    Login {
        #[arg(short, long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
    },
    /// Sign out. The device id is kept
    Logout,
    /// Ask the backend to email a password reset link
    ResetPassword { email: String },

    // --- Programs ---
    /// List programs
    Programs {
        /// Cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,
    },
    /// Show a program and its weeks
    ShowProgram { id: String },
    /// Create a new program with blank weeks
    CreateProgram {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Number of blank weeks to start with
        #[arg(short, long, default_value_t = 1)]
        weeks: u32,
        #[arg(short, long)]
        access: Option<AccessType>,
    },
    /// Change program fields
    EditProgram {
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        access: Option<AccessType>,
        /// Comma-separated tags (e.g. "strength,hypertrophy"); empty clears
        #[arg(short, long)]
        types: Option<String>,
    },
    /// Append a blank week to a program
    AddWeek { program: String },
    /// Remove a week (1-based). Later weeks are renumbered
    RemoveWeek { program: String, week: usize },
    /// Move a week from one position to another (both 1-based)
    MoveWeek {
        program: String,
        from: usize,
        to: usize,
    },
    /// Show one week and its scheduled workouts
    ShowWeek {
        program: String,
        /// Week number (1-based)
        week: u32,
    },
    /// Change a week's name, description or dates
    EditWeek {
        program: String,
        /// Week number (1-based)
        week: u32,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        /// First day of the week (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day of the week (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Remove both dates
        #[arg(long, conflicts_with_all = ["start", "end"])]
        clear_dates: bool,
    },
    /// Schedule something into a program week by selecting grid cells
    Schedule {
        program: String,
        /// Week number (1-based)
        #[arg(short, long)]
        week: u32,
        /// First cell, e.g. "MON 9AM"
        #[arg(long)]
        from: Cell,
        /// Last cell; a single cell is selected when omitted
        #[arg(long)]
        to: Option<Cell>,
        /// What to create: workout, meal or note
        #[arg(short, long, default_value = "workout")]
        kind: ScheduleKind,
        /// Name for the new workout
        #[arg(short, long, default_value = "New Workout")]
        name: String,
    },

    // --- Workouts ---
    /// Show a workout's circuits and exercises
    ShowWorkout { id: String },
    /// Append a circuit
    AddBlock {
        workout: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        sets: Option<u32>,
        /// Rest between sets, in seconds
        #[arg(short, long)]
        rest: Option<u32>,
    },
    /// Remove a circuit (1-based)
    RemoveBlock { workout: String, block: usize },
    /// Move a circuit (positions are 1-based)
    MoveBlock {
        workout: String,
        from: usize,
        to: usize,
    },
    /// Append an exercise to a circuit
    AddExercise {
        workout: String,
        /// Circuit position (1-based)
        #[arg(short, long)]
        block: usize,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short = 't', long = "type")]
        measurement: Option<MeasurementType>,
        #[arg(short, long)]
        reps: Option<u32>,
        /// Target weight in the configured (or --weight-unit) unit
        #[arg(short, long)]
        weight: Option<String>,
        /// Target time in the configured (or --time-unit) unit
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        weight_unit: Option<WeightUnit>,
        #[arg(long)]
        time_unit: Option<TimeUnit>,
    },
    /// Change an exercise (positions are 1-based)
    EditExercise {
        workout: String,
        #[arg(short, long)]
        block: usize,
        #[arg(short, long)]
        exercise: usize,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        reps: Option<u32>,
        #[arg(short, long)]
        weight: Option<String>,
        #[arg(long)]
        time: Option<String>,
        /// Rest after the exercise, in seconds
        #[arg(long)]
        rest: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        weight_unit: Option<WeightUnit>,
        #[arg(long)]
        time_unit: Option<TimeUnit>,
    },
    /// Remove an exercise (positions are 1-based)
    RemoveExercise {
        workout: String,
        #[arg(short, long)]
        block: usize,
        #[arg(short, long)]
        exercise: usize,
    },
    /// Move an exercise within its circuit (positions are 1-based)
    MoveExercise {
        workout: String,
        #[arg(short, long)]
        block: usize,
        from: usize,
        to: usize,
    },

    // --- Config ---
    /// Show the path to the config file
    ConfigPath,
    /// Set the backend base URL
    SetApiUrl { url: String },
    /// Set display units for weight and/or time
    SetUnits {
        #[arg(short, long)]
        weight: Option<WeightUnit>,
        #[arg(short, long)]
        time: Option<TimeUnit>,
    },
    /// Set the HTTP request timeout in seconds
    SetTimeout { secs: u64 },
    /// Set the table header color (e.g. "Cyan", "Green")
    SetHeaderColor { color: String },

    /// Generate shell completion scripts
    GenerateCompletion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn schedule_parses_grid_cells() {
        let cli = Cli::parse_from([
            "fitcoach", "schedule", "p1", "--week", "2", "--from", "mon@9am", "--to", "mon@11am",
        ]);
        match cli.command {
            Commands::Schedule { week, from, to, kind, .. } => {
                assert_eq!(week, 2);
                assert_eq!(from, "MON 9AM".parse::<Cell>().unwrap());
                assert_eq!(to, Some("MON 11AM".parse::<Cell>().unwrap()));
                assert_eq!(kind, ScheduleKind::Workout);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn edit_week_takes_dates_or_clears_them() {
        let cli = Cli::parse_from([
            "fitcoach", "edit-week", "p1", "2", "--start", "2026-10-18", "--end", "2026-10-24",
        ]);
        match cli.command {
            Commands::EditWeek { week, start, end, clear_dates, .. } => {
                assert_eq!(week, 2);
                assert_eq!(start, NaiveDate::from_ymd_opt(2026, 10, 18));
                assert_eq!(end, NaiveDate::from_ymd_opt(2026, 10, 24));
                assert!(!clear_dates);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from([
            "fitcoach", "edit-week", "p1", "2", "--start", "2026-10-18", "--clear-dates",
        ])
        .is_err());
    }

    #[test]
    fn units_parse_case_insensitively() {
        let cli = Cli::parse_from(["fitcoach", "-v", "set-units", "--weight", "KG", "--time", "min"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::SetUnits { weight, time } => {
                assert_eq!(weight, Some(WeightUnit::Kg));
                assert_eq!(time, Some(TimeUnit::Min));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
