use anyhow::{bail, Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// --- Declare modules ---
pub mod api;
pub mod auth;
mod config;
pub mod draft;
pub mod model;
pub mod reorder;
pub mod schedule;
pub mod session;
pub mod units;

// --- Expose public types ---
pub use api::{ApiClient, ApiError};
pub use auth::{CredentialError, FormError};
pub use config::{
    get_config_path as get_config_path_util, load as load_config_util, parse_color,
    save as save_config_util, Config, ConfigError, StandardColor, Theme,
};
pub use draft::{
    DraftError, ListPath, ProgramDraft, ProgramPatch, ProgramStore, Reducer, WeekPatch,
    WorkoutDraft, WorkoutPatch, WorkoutStore,
};
pub use model::{
    AccessType, Block, Exercise, MeasurementType, Paginated, Program, Week, Workout,
};
pub use schedule::{Cell, GridSelector, ScheduleAnchor, ScheduleKind, ScheduledItem};
pub use session::Session;
pub use units::{TimeUnit, WeightUnit};

/// Result of asking the service to persist a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
    NothingToSave,
}

pub struct AppService {
    pub config: Config,
    pub config_path: PathBuf,
    pub session: Session,
    pub session_path: PathBuf,
    api: ApiClient,
}

fn build_client(config: &Config, session: &Session) -> Result<ApiClient> {
    let mut api = ApiClient::new(
        &config.effective_api_url(),
        Duration::from_secs(config.request_timeout_secs.max(1)),
    )
    .context("Failed to create API client")?;
    api.set_device_id(Some(session.device_id.clone()));
    api.set_access_token(session.access_token.clone());
    Ok(api)
}

impl AppService {
    /// Loads config and session from the default locations.
    /// # Errors
    /// Returns `anyhow::Error` if config/session paths, loading, or client setup fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        Self::from_config_path(config_path)
    }

    /// # Errors
    /// Returns `anyhow::Error` if the config or session file cannot be loaded.
    pub fn from_config_path(config_path: PathBuf) -> Result<Self> {
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;
        let session_path = session::session_path_for(&config_path);
        let session = Session::load(&session_path)
            .with_context(|| format!("Failed to load session from {session_path:?}"))?;
        let api = build_client(&config, &session)?;
        Ok(Self {
            config,
            config_path,
            session,
            session_path,
            api,
        })
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save(&self.config_path, &self.config)
    }

    /// Sets the backend URL and rebuilds the client.
    /// # Errors
    /// - `ConfigError::EmptyApiUrl` if the URL is blank.
    /// - saving or client errors.
    pub fn set_api_base_url(&mut self, url: &str) -> Result<()> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            bail!(ConfigError::EmptyApiUrl);
        }
        self.config.api_base_url = trimmed.to_string();
        self.save_config()?;
        self.api = build_client(&self.config, &self.session)?;
        Ok(())
    }

    /// # Errors
    /// - `ConfigError::InvalidTimeout` for zero.
    /// - saving or client errors.
    pub fn set_request_timeout(&mut self, secs: u64) -> Result<()> {
        if secs == 0 {
            bail!(ConfigError::InvalidTimeout);
        }
        self.config.request_timeout_secs = secs;
        self.save_config()?;
        self.api = build_client(&self.config, &self.session)?;
        Ok(())
    }

    /// # Errors
    /// Returns `ConfigError` variants if saving fails.
    pub fn set_units(&mut self, weight: Option<WeightUnit>, time: Option<TimeUnit>) -> Result<(), ConfigError> {
        if let Some(w) = weight {
            self.config.weight_unit = w;
        }
        if let Some(t) = time {
            self.config.time_unit = t;
        }
        self.save_config()
    }

    /// # Errors
    /// Returns `ConfigError::InvalidColor` for unknown names, or saving errors.
    pub fn set_header_color(&mut self, color: &str) -> Result<(), ConfigError> {
        let parsed = parse_color(color)?;
        self.config.theme.header_color = format!("{parsed:?}");
        self.save_config()
    }

    fn store_tokens(&mut self, tokens: auth::AuthTokens) -> Result<()> {
        self.session
            .set_tokens(tokens.access_token, tokens.refresh_token);
        self.session
            .save(&self.session_path)
            .context("Failed to save session")?;
        self.api.set_access_token(self.session.access_token.clone());
        Ok(())
    }

    // --- Auth ---

    /// # Errors
    /// Returns `anyhow::Error` wrapping `CredentialError` or `ApiError`.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<()> {
        auth::validate_email(email)?;
        let request = auth::LoginRequest {
            email: email.trim(),
            password,
            device_id: &self.session.device_id,
        };
        let tokens = self.api.login(&request).await?;
        self.store_tokens(tokens)?;
        info!("logged in");
        Ok(())
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping `CredentialError` or `ApiError`.
    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<()> {
        if name.trim().is_empty() {
            bail!("Name cannot be empty.");
        }
        auth::validate_email(email)?;
        auth::validate_new_password(password, confirmation)?;
        let request = auth::RegisterRequest {
            name: name.trim(),
            email: email.trim(),
            password,
            device_id: &self.session.device_id,
        };
        let tokens = self.api.register(&request).await?;
        self.store_tokens(tokens)
    }

    /// Exchanges the stored refresh token for new tokens.
    /// # Errors
    /// Fails when signed out or when the backend rejects the token.
    pub async fn refresh_session(&mut self) -> Result<()> {
        let Some(refresh_token) = self.session.refresh_token.clone() else {
            bail!("Not logged in.");
        };
        let request = auth::RefreshRequest {
            refresh_token: &refresh_token,
            device_id: &self.session.device_id,
        };
        let tokens = self.api.refresh(&request).await?;
        self.store_tokens(tokens)
    }

    /// Signs out locally even if the backend call fails.
    /// # Errors
    /// Returns `anyhow::Error` if the session file cannot be written.
    pub async fn logout(&mut self) -> Result<()> {
        if self.session.is_authenticated() {
            if let Err(e) = self.api.logout().await {
                warn!(error = %e, "backend logout failed; clearing local session anyway");
            }
        }
        self.session.clear();
        self.session
            .save(&self.session_path)
            .context("Failed to save session")?;
        self.api.set_access_token(None);
        Ok(())
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping `CredentialError` or `ApiError`.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        auth::validate_email(email)?;
        self.api
            .request_password_reset(&auth::PasswordResetRequest { email: email.trim() })
            .await?;
        Ok(())
    }

    // --- Programs ---

    /// # Errors
    /// Returns `anyhow::Error` wrapping `ApiError`.
    pub async fn list_programs(&self, cursor: Option<&str>) -> Result<Paginated<Program>> {
        self.api
            .list_programs(cursor)
            .await
            .context("Failed to list programs")
    }

    /// Fetches a program into a fresh draft store.
    /// # Errors
    /// Returns `anyhow::Error` wrapping `ApiError`.
    pub async fn open_program(&self, id: &str) -> Result<ProgramStore> {
        let program = self
            .api
            .get_program(id)
            .await
            .with_context(|| format!("Failed to load program '{id}'"))?;
        Ok(ProgramStore::new(program))
    }

    /// Persists a program draft, creating it when it has no id yet.
    /// # Errors
    /// - `DraftError::SaveInProgress` if a save is already pending.
    /// - `anyhow::Error` wrapping `ApiError`; local edits are kept.
    pub async fn save_program(&self, store: &mut ProgramStore) -> Result<SaveOutcome> {
        if !store.has_unsaved_changes() {
            return Ok(SaveOutcome::NothingToSave);
        }
        let snapshot: Arc<ProgramDraft> = store.begin_save()?;
        let program = &snapshot.program;
        if let Some((declared, actual)) = program.week_count_mismatch() {
            warn!(declared, actual, "program week count does not match its weeks");
        }
        let (result, outcome) = if program.id.is_some() {
            (self.api.update_program(program).await, SaveOutcome::Updated)
        } else {
            (self.api.create_program(program).await, SaveOutcome::Created)
        };
        match result {
            Ok(persisted) => {
                info!(id = ?persisted.id, ?outcome, "saved program");
                store.finish_save(persisted);
                Ok(outcome)
            }
            Err(e) => {
                store.abort_save();
                Err(anyhow::Error::new(e).context("Failed to update program."))
            }
        }
    }

    // --- Workouts ---

    /// # Errors
    /// Returns `anyhow::Error` wrapping `ApiError`.
    pub async fn open_workout(&self, id: &str) -> Result<WorkoutStore> {
        let workout = self
            .api
            .get_workout(id)
            .await
            .with_context(|| format!("Failed to load workout '{id}'"))?;
        Ok(WorkoutStore::new(workout))
    }

    /// # Errors
    /// - `DraftError::SaveInProgress` if a save is already pending.
    /// - `anyhow::Error` wrapping `ApiError`; local edits are kept.
    pub async fn save_workout(&self, store: &mut WorkoutStore) -> Result<SaveOutcome> {
        if !store.has_unsaved_changes() {
            return Ok(SaveOutcome::NothingToSave);
        }
        let snapshot = store.begin_save()?;
        let workout = &snapshot.workout;
        let (result, outcome) = if workout.id.is_some() {
            (self.api.update_workout(workout).await, SaveOutcome::Updated)
        } else {
            (self.api.create_workout(workout).await, SaveOutcome::Created)
        };
        match result {
            Ok(persisted) => {
                info!(id = ?persisted.id, ?outcome, "saved workout");
                store.finish_save(persisted);
                Ok(outcome)
            }
            Err(e) => {
                store.abort_save();
                Err(anyhow::Error::new(e).context("Failed to save workout."))
            }
        }
    }

    // --- Scheduling ---

    /// Runs a drag from `from` to `to` over the week's grid, picks `kind`,
    /// and returns the resulting entry. Existing workouts block their hours.
    /// # Errors
    /// Fails on an unknown week, an occupied start cell, or an empty selection.
    pub fn plan_schedule(
        &self,
        program: &Program,
        week_number: u32,
        from: Cell,
        to: Cell,
        kind: ScheduleKind,
    ) -> Result<(usize, ScheduledItem)> {
        let (week_index, week) = program
            .week_by_number(week_number)
            .with_context(|| format!("Week {week_number} not found in program"))?;
        let mut grid = GridSelector::from_workouts(&week.workouts);
        if !grid.pointer_down(from) {
            bail!("{from} is already taken by another workout.");
        }
        grid.pointer_enter(to);
        grid.pointer_up();
        let anchor = ScheduleAnchor::for_week_start(week.start_date);
        let item = grid.choose(kind, anchor, Local::now().date_naive())?;
        Ok((week_index, item))
    }

    /// Creates a workout for a scheduled slot and adds it to the program week.
    /// When the program cannot be saved afterwards, the workout is unlinked
    /// from the draft and deleted again.
    /// # Errors
    /// Returns `anyhow::Error` wrapping `ApiError` or `DraftError`.
    pub async fn schedule_workout(
        &self,
        store: &mut ProgramStore,
        week_index: usize,
        item: &ScheduledItem,
        name: &str,
    ) -> Result<Workout> {
        let draft = item
            .to_workout(name)
            .context("Only workouts can be attached to a program week")?;
        let created = self
            .api
            .create_workout(&draft)
            .await
            .context("Could not save event.")?;
        let linked = match store.upsert_week_workout(week_index, created.clone()) {
            Ok(_) => self.save_program(store).await,
            Err(e) => Err(e.into()),
        };
        let Err(e) = linked else {
            return Ok(created);
        };

        let Some(id) = created.id.as_deref() else {
            return Err(e.context("Could not save event."));
        };
        if store.entity().weeks.get(week_index).is_some_and(|w| {
            w.workouts.iter().any(|wo| wo.id.as_deref() == Some(id))
        }) {
            store.remove_week_workout(week_index, id)?;
        }
        match self.api.delete_workout(id).await {
            Ok(()) => {
                warn!(%id, error = %e, "program save failed; scheduled workout deleted");
                Err(e.context("Could not save event."))
            }
            Err(cleanup) => {
                warn!(%id, error = %e, cleanup_error = %cleanup, "scheduled workout left unlinked");
                Err(e.context(format!(
                    "Could not save event. Workout '{id}' was created but is not linked to any week."
                )))
            }
        }
    }

    // --- Weeks ---

    /// Fetches one week of a program, by its 1-based number.
    /// # Errors
    /// Fails on an unknown week or when the backend call fails.
    pub async fn open_week(&self, program_id: &str, week_number: u32) -> Result<Week> {
        let store = self.open_program(program_id).await?;
        let (_, week) = store
            .entity()
            .week_by_number(week_number)
            .with_context(|| format!("Week {week_number} not found in program"))?;
        let Some(week_id) = week.id.as_deref() else {
            return Ok(week.clone());
        };
        self.api
            .get_week(program_id, week_id)
            .await
            .with_context(|| format!("Failed to load week {week_number}"))
    }

    /// Applies `patch` to a week and saves it. A week that already exists on
    /// the backend is sent on its own when it is the draft's only change;
    /// otherwise the whole program is saved.
    /// # Errors
    /// - `DraftError` for an unknown week or a pending save.
    /// - `anyhow::Error` wrapping `ApiError`; local edits are kept.
    pub async fn edit_week(
        &self,
        store: &mut ProgramStore,
        week_index: usize,
        patch: WeekPatch,
    ) -> Result<SaveOutcome> {
        let was_clean = !store.has_unsaved_changes();
        store.update_week(week_index, patch)?;
        let program_id = store.entity().id.clone();
        let week_id = store.entity().weeks.get(week_index).and_then(|w| w.id.clone());
        let (Some(program_id), Some(_), true) = (program_id, week_id, was_clean) else {
            return self.save_program(store).await;
        };

        let snapshot = store.begin_save()?;
        let mut program = snapshot.program.clone();
        let week = &mut program.weeks[week_index];
        match self.api.update_week(&program_id, week).await {
            Ok(persisted) => {
                info!(id = ?persisted.id, "saved week");
                *week = persisted;
                store.finish_save(program);
                Ok(SaveOutcome::Updated)
            }
            Err(e) => {
                store.abort_save();
                Err(anyhow::Error::new(e).context("Failed to update week."))
            }
        }
    }
}

/// Message shown to the user for a failed command; the full chain goes to the log.
pub fn user_message(err: &anyhow::Error) -> String {
    if let Some(invalid) = err.downcast_ref::<CredentialError>() {
        return invalid.to_string();
    }
    let api = err.chain().find_map(|e| e.downcast_ref::<ApiError>());
    let form = api
        .and_then(ApiError::server_message)
        .map(FormError::from_server_message);
    if api.and_then(ApiError::status) == Some(reqwest::StatusCode::UNAUTHORIZED)
        && matches!(form, None | Some(FormError::Unknown))
    {
        return "Your session has expired. Run `fitcoach login` again.".to_string();
    }
    match form {
        // No context was attached, so the raw server reply is all we have
        Some(form) if err.chain().count() == 1 => form.message().to_string(),
        _ => err.to_string(),
    }
}
