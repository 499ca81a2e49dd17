//src/draft.rs
//! Edit buffers for programs and workouts.
//!
//! A draft is changed only through its pure `reduce` transition, which returns a
//! fresh state and leaves the old one alone. [`Store`] keeps the current state
//! behind an [`Arc`], so a caller holding an earlier snapshot still sees the old
//! values and can use [`Arc::ptr_eq`] to tell whether anything changed.
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{AccessType, Block, Exercise, MeasurementType, Program, Week, Workout};
use crate::reorder::{self, Ordered, ReorderError};

/// Addresses one ordered list inside a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPath {
    Weeks,
    Blocks,
    Exercises { block: usize },
}

impl fmt::Display for ListPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weeks => write!(f, "weeks"),
            Self::Blocks => write!(f, "circuits"),
            Self::Exercises { block } => write!(f, "exercises of circuit {block}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("Circuit {0} does not exist in this workout")]
    BlockNotFound(usize),
    #[error("Index {index} is out of range for {path} ({len} item(s))")]
    IndexOutOfRange {
        path: ListPath,
        index: usize,
        len: usize,
    },
    #[error("This draft has no {0}")]
    PathNotInDraft(ListPath),
    #[error("Item does not belong in {0}")]
    ItemMismatch(ListPath),
    #[error("Workout '{0}' is not scheduled in this week")]
    WorkoutNotFound(String),
    #[error("A save is already in progress")]
    SaveInProgress,
}

/// A partial update merged into an existing value. `None` fields are left as they are.
pub trait Patch<T> {
    fn apply_to(self, target: &mut T);
}

macro_rules! merge {
    ($patch:ident, $target:ident; $($field:ident),+ $(,)?) => {
        $(if let Some(value) = $patch.$field {
            $target.$field = value;
        })+
    };
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub num_weeks: Option<u32>,
    pub has_nutrition_program: Option<bool>,
    pub types: Option<Vec<String>>,
    pub access_type: Option<AccessType>,
}

impl Patch<Program> for ProgramPatch {
    fn apply_to(self, target: &mut Program) {
        let patch = self;
        merge!(patch, target; name, description, num_weeks, has_nutrition_program, types, access_type);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration: Option<u32>,
    pub difficulty: Option<Option<String>>,
    pub categories: Option<Vec<String>>,
    pub access_type: Option<AccessType>,
    pub start_date: Option<Option<NaiveDateTime>>,
    pub end_date: Option<Option<NaiveDateTime>>,
}

impl Patch<Workout> for WorkoutPatch {
    fn apply_to(self, target: &mut Workout) {
        let patch = self;
        merge!(patch, target; name, description, duration, difficulty, categories, access_type, start_date, end_date);
    }
}

// week_number is positional and not patchable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeekPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
}

impl Patch<Week> for WeekPatch {
    fn apply_to(self, target: &mut Week) {
        let patch = self;
        merge!(patch, target; name, description, start_date, end_date);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockPatch {
    pub name: Option<String>,
    pub sets: Option<u32>,
    pub rest: Option<u32>,
}

impl Patch<Block> for BlockPatch {
    fn apply_to(self, target: &mut Block) {
        let patch = self;
        merge!(patch, target; name, sets, rest);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExercisePatch {
    pub name: Option<String>,
    pub measurement_type: Option<MeasurementType>,
    pub target_reps: Option<u32>,
    pub target_weight: Option<f64>,
    pub target_distance: Option<f64>,
    pub target_duration_sec: Option<u32>,
    pub rest: Option<u32>,
    pub notes: Option<String>,
}

impl ExercisePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Patch<Exercise> for ExercisePatch {
    fn apply_to(self, target: &mut Exercise) {
        let patch = self;
        merge!(patch, target; name, measurement_type, target_reps, target_weight,
            target_distance, target_duration_sec, rest, notes);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Week(Week),
    Block(Block),
    Exercise(Exercise),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemPatch {
    Week(WeekPatch),
    Block(BlockPatch),
    Exercise(ExercisePatch),
}

/// Edits that address a list by path. Shared by program and workout drafts.
#[derive(Debug, Clone, PartialEq)]
pub enum ListOp {
    Add {
        path: ListPath,
        item: ListItem,
    },
    Update {
        path: ListPath,
        index: usize,
        patch: ItemPatch,
    },
    /// Leaves a gap in the order fields; follow with `Renumber` or a reorder.
    Remove { path: ListPath, index: usize },
    Reorder {
        path: ListPath,
        from: usize,
        to: usize,
    },
    Renumber(ListPath),
}

impl ListOp {
    pub const fn path(&self) -> ListPath {
        match self {
            Self::Add { path, .. }
            | Self::Update { path, .. }
            | Self::Remove { path, .. }
            | Self::Reorder { path, .. }
            | Self::Renumber(path) => *path,
        }
    }
}

enum ListMut<'a> {
    Weeks(&'a mut Vec<Week>),
    Blocks(&'a mut Vec<Block>),
    Exercises(&'a mut Vec<Exercise>),
}

fn out_of_range(path: ListPath, index: usize, len: usize) -> DraftError {
    DraftError::IndexOutOfRange { path, index, len }
}

fn push_item<T: Ordered>(items: &mut Vec<T>, mut item: T) {
    item.set_position(items.len());
    items.push(item);
}

fn update_at<T, P: Patch<T>>(
    items: &mut [T],
    path: ListPath,
    index: usize,
    patch: P,
) -> Result<(), DraftError> {
    let len = items.len();
    let item = items.get_mut(index).ok_or_else(|| out_of_range(path, index, len))?;
    patch.apply_to(item);
    Ok(())
}

fn remove_at<T>(items: &mut Vec<T>, path: ListPath, index: usize) -> Result<(), DraftError> {
    if index >= items.len() {
        return Err(out_of_range(path, index, items.len()));
    }
    items.remove(index);
    Ok(())
}

fn move_within<T: Ordered>(
    items: &mut Vec<T>,
    path: ListPath,
    from: usize,
    to: usize,
) -> Result<(), DraftError> {
    reorder::move_item(items, from, to)
        .map_err(|ReorderError::OutOfRange { index, len }| out_of_range(path, index, len))
}

impl ListMut<'_> {
    fn apply(self, op: ListOp) -> Result<(), DraftError> {
        let path = op.path();
        match (self, op) {
            (Self::Weeks(items), ListOp::Add { item: ListItem::Week(w), .. }) => push_item(items, w),
            (Self::Blocks(items), ListOp::Add { item: ListItem::Block(b), .. }) => push_item(items, b),
            (Self::Exercises(items), ListOp::Add { item: ListItem::Exercise(e), .. }) => {
                push_item(items, e);
            }
            (Self::Weeks(items), ListOp::Update { index, patch: ItemPatch::Week(p), .. }) => {
                update_at(items, path, index, p)?;
            }
            (Self::Blocks(items), ListOp::Update { index, patch: ItemPatch::Block(p), .. }) => {
                update_at(items, path, index, p)?;
            }
            (Self::Exercises(items), ListOp::Update { index, patch: ItemPatch::Exercise(p), .. }) => {
                update_at(items, path, index, p)?;
            }
            (_, ListOp::Add { .. } | ListOp::Update { .. }) => {
                return Err(DraftError::ItemMismatch(path))
            }
            (Self::Weeks(items), ListOp::Remove { index, .. }) => remove_at(items, path, index)?,
            (Self::Blocks(items), ListOp::Remove { index, .. }) => remove_at(items, path, index)?,
            (Self::Exercises(items), ListOp::Remove { index, .. }) => remove_at(items, path, index)?,
            (Self::Weeks(items), ListOp::Reorder { from, to, .. }) => move_within(items, path, from, to)?,
            (Self::Blocks(items), ListOp::Reorder { from, to, .. }) => move_within(items, path, from, to)?,
            (Self::Exercises(items), ListOp::Reorder { from, to, .. }) => {
                move_within(items, path, from, to)?;
            }
            (Self::Weeks(items), ListOp::Renumber(_)) => reorder::renumber(items),
            (Self::Blocks(items), ListOp::Renumber(_)) => reorder::renumber(items),
            (Self::Exercises(items), ListOp::Renumber(_)) => reorder::renumber(items),
        }
        Ok(())
    }
}

fn program_list(program: &mut Program, path: ListPath) -> Result<ListMut<'_>, DraftError> {
    match path {
        ListPath::Weeks => Ok(ListMut::Weeks(&mut program.weeks)),
        ListPath::Blocks | ListPath::Exercises { .. } => Err(DraftError::PathNotInDraft(path)),
    }
}

fn workout_list(workout: &mut Workout, path: ListPath) -> Result<ListMut<'_>, DraftError> {
    match path {
        ListPath::Blocks => Ok(ListMut::Blocks(&mut workout.blocks)),
        ListPath::Exercises { block } => workout
            .blocks
            .get_mut(block)
            .map(|b| ListMut::Exercises(&mut b.exercises))
            .ok_or(DraftError::BlockNotFound(block)),
        ListPath::Weeks => Err(DraftError::PathNotInDraft(path)),
    }
}

/// A draft state with a pure transition function.
pub trait Reducer: Clone {
    type Entity: Clone;
    type Action: fmt::Debug;

    /// Fresh state for an entity just loaded from (or saved to) the backend.
    fn loaded(entity: Self::Entity) -> Self;
    fn reduce(&self, action: Self::Action) -> Result<Self, DraftError>;
    fn entity(&self) -> &Self::Entity;
    fn has_unsaved_changes(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramAction {
    SetEntireDraft(Program),
    UpdateFields(ProgramPatch),
    List(ListOp),
    /// Replaces the week's workout with the same id, or appends it.
    UpsertWeekWorkout { week: usize, workout: Workout },
    RemoveWeekWorkout { week: usize, workout_id: String },
}

impl From<ListOp> for ProgramAction {
    fn from(op: ListOp) -> Self {
        Self::List(op)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgramDraft {
    pub program: Program,
    pub unsaved_changes: bool,
}

impl ProgramDraft {
    fn week_mut(&mut self, week: usize) -> Result<&mut Week, DraftError> {
        let len = self.program.weeks.len();
        self.program
            .weeks
            .get_mut(week)
            .ok_or_else(|| out_of_range(ListPath::Weeks, week, len))
    }
}

impl Reducer for ProgramDraft {
    type Entity = Program;
    type Action = ProgramAction;

    fn loaded(program: Program) -> Self {
        Self {
            program,
            unsaved_changes: false,
        }
    }

    fn reduce(&self, action: ProgramAction) -> Result<Self, DraftError> {
        let mut next = self.clone();
        match action {
            ProgramAction::SetEntireDraft(program) => return Ok(Self::loaded(program)),
            ProgramAction::UpdateFields(patch) => patch.apply_to(&mut next.program),
            ProgramAction::List(op) => program_list(&mut next.program, op.path())?.apply(op)?,
            ProgramAction::UpsertWeekWorkout { week, workout } => {
                let week = next.week_mut(week)?;
                let existing = workout
                    .id
                    .as_deref()
                    .and_then(|id| week.workouts.iter().position(|w| w.id.as_deref() == Some(id)));
                match existing {
                    Some(i) => week.workouts[i] = workout,
                    None => week.workouts.push(workout),
                }
            }
            ProgramAction::RemoveWeekWorkout { week, workout_id } => {
                let week = next.week_mut(week)?;
                let before = week.workouts.len();
                week.workouts.retain(|w| w.id.as_deref() != Some(workout_id.as_str()));
                if week.workouts.len() == before {
                    return Err(DraftError::WorkoutNotFound(workout_id));
                }
            }
        }
        next.unsaved_changes = true;
        Ok(next)
    }

    fn entity(&self) -> &Program {
        &self.program
    }

    fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkoutAction {
    SetEntireDraft(Workout),
    UpdateFields(WorkoutPatch),
    List(ListOp),
}

impl From<ListOp> for WorkoutAction {
    fn from(op: ListOp) -> Self {
        Self::List(op)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkoutDraft {
    pub workout: Workout,
    pub unsaved_changes: bool,
}

impl Reducer for WorkoutDraft {
    type Entity = Workout;
    type Action = WorkoutAction;

    fn loaded(workout: Workout) -> Self {
        Self {
            workout,
            unsaved_changes: false,
        }
    }

    fn reduce(&self, action: WorkoutAction) -> Result<Self, DraftError> {
        let mut next = self.clone();
        match action {
            WorkoutAction::SetEntireDraft(workout) => return Ok(Self::loaded(workout)),
            WorkoutAction::UpdateFields(patch) => patch.apply_to(&mut next.workout),
            WorkoutAction::List(op) => workout_list(&mut next.workout, op.path())?.apply(op)?,
        }
        next.unsaved_changes = true;
        Ok(next)
    }

    fn entity(&self) -> &Workout {
        &self.workout
    }

    fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }
}

/// Holds the current draft and a guard against overlapping saves.
#[derive(Debug, Clone)]
pub struct Store<S> {
    state: Arc<S>,
    saving: bool,
}

pub type ProgramStore = Store<ProgramDraft>;
pub type WorkoutStore = Store<WorkoutDraft>;

impl<S: Reducer> Store<S> {
    pub fn new(entity: S::Entity) -> Self {
        Self {
            state: Arc::new(S::loaded(entity)),
            saving: false,
        }
    }

    pub fn state(&self) -> Arc<S> {
        Arc::clone(&self.state)
    }

    pub fn entity(&self) -> &S::Entity {
        self.state.entity()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.state.has_unsaved_changes()
    }

    /// Applies one action. On error nothing changes and the error is logged.
    pub fn dispatch(&mut self, action: S::Action) -> Result<Arc<S>, DraftError> {
        debug!(?action, "dispatching draft action");
        match self.state.reduce(action) {
            Ok(next) => {
                self.state = Arc::new(next);
                Ok(self.state())
            }
            Err(e) => {
                warn!(error = %e, "draft action rejected");
                Err(e)
            }
        }
    }

    pub const fn is_saving(&self) -> bool {
        self.saving
    }

    /// Marks a save as pending and returns the snapshot to send.
    pub fn begin_save(&mut self) -> Result<Arc<S>, DraftError> {
        if self.saving {
            warn!("save requested while another is still pending");
            return Err(DraftError::SaveInProgress);
        }
        self.saving = true;
        Ok(self.state())
    }

    /// Installs what the backend returned and clears the unsaved flag.
    pub fn finish_save(&mut self, persisted: S::Entity) -> Arc<S> {
        self.saving = false;
        self.state = Arc::new(S::loaded(persisted));
        self.state()
    }

    /// Releases the save guard after a failure. Local edits are kept.
    pub fn abort_save(&mut self) {
        self.saving = false;
    }
}

impl<S> Store<S>
where
    S: Reducer,
    S::Action: From<ListOp>,
{
    pub fn add_item_to(&mut self, path: ListPath, item: ListItem) -> Result<Arc<S>, DraftError> {
        self.dispatch(ListOp::Add { path, item }.into())
    }

    pub fn update_item_at(
        &mut self,
        path: ListPath,
        index: usize,
        patch: ItemPatch,
    ) -> Result<Arc<S>, DraftError> {
        self.dispatch(ListOp::Update { path, index, patch }.into())
    }

    /// Does not renumber the remaining items.
    pub fn remove_item_at(&mut self, path: ListPath, index: usize) -> Result<Arc<S>, DraftError> {
        self.dispatch(ListOp::Remove { path, index }.into())
    }

    pub fn reorder_items_in(
        &mut self,
        path: ListPath,
        from: usize,
        to: usize,
    ) -> Result<Arc<S>, DraftError> {
        self.dispatch(ListOp::Reorder { path, from, to }.into())
    }

    pub fn renumber(&mut self, path: ListPath) -> Result<Arc<S>, DraftError> {
        self.dispatch(ListOp::Renumber(path).into())
    }
}

impl Store<ProgramDraft> {
    pub fn set_entire_draft(&mut self, program: Program) -> Result<Arc<ProgramDraft>, DraftError> {
        self.dispatch(ProgramAction::SetEntireDraft(program))
    }

    pub fn update_fields(&mut self, patch: ProgramPatch) -> Result<Arc<ProgramDraft>, DraftError> {
        self.dispatch(ProgramAction::UpdateFields(patch))
    }

    pub fn add_week(&mut self, week: Week) -> Result<Arc<ProgramDraft>, DraftError> {
        self.add_item_to(ListPath::Weeks, ListItem::Week(week))
    }

    /// Appends an empty "Week N" numbered after the last week.
    pub fn add_blank_week(&mut self) -> Result<Arc<ProgramDraft>, DraftError> {
        let next_number = u32::try_from(self.entity().weeks.len() + 1).unwrap_or(u32::MAX);
        self.add_week(Week::numbered(next_number))
    }

    pub fn update_week(&mut self, index: usize, patch: WeekPatch) -> Result<Arc<ProgramDraft>, DraftError> {
        self.update_item_at(ListPath::Weeks, index, ItemPatch::Week(patch))
    }

    /// Removes a week and renumbers the rest, since week numbers are positional.
    pub fn remove_week(&mut self, index: usize) -> Result<Arc<ProgramDraft>, DraftError> {
        self.remove_item_at(ListPath::Weeks, index)?;
        self.renumber(ListPath::Weeks)
    }

    pub fn reorder_weeks(&mut self, from: usize, to: usize) -> Result<Arc<ProgramDraft>, DraftError> {
        self.reorder_items_in(ListPath::Weeks, from, to)
    }

    pub fn upsert_week_workout(
        &mut self,
        week: usize,
        workout: Workout,
    ) -> Result<Arc<ProgramDraft>, DraftError> {
        self.dispatch(ProgramAction::UpsertWeekWorkout { week, workout })
    }

    pub fn remove_week_workout(
        &mut self,
        week: usize,
        workout_id: &str,
    ) -> Result<Arc<ProgramDraft>, DraftError> {
        self.dispatch(ProgramAction::RemoveWeekWorkout {
            week,
            workout_id: workout_id.to_string(),
        })
    }
}

impl Store<WorkoutDraft> {
    pub fn set_entire_draft(&mut self, workout: Workout) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.dispatch(WorkoutAction::SetEntireDraft(workout))
    }

    pub fn update_fields(&mut self, patch: WorkoutPatch) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.dispatch(WorkoutAction::UpdateFields(patch))
    }

    pub fn add_block(&mut self, block: Block) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.add_item_to(ListPath::Blocks, ListItem::Block(block))
    }

    pub fn update_block(&mut self, index: usize, patch: BlockPatch) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.update_item_at(ListPath::Blocks, index, ItemPatch::Block(patch))
    }

    pub fn remove_block(&mut self, index: usize) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.remove_item_at(ListPath::Blocks, index)
    }

    pub fn reorder_blocks(&mut self, from: usize, to: usize) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.reorder_items_in(ListPath::Blocks, from, to)
    }

    pub fn add_exercise(&mut self, block: usize, exercise: Exercise) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.add_item_to(ListPath::Exercises { block }, ListItem::Exercise(exercise))
    }

    pub fn update_exercise(
        &mut self,
        block: usize,
        index: usize,
        patch: ExercisePatch,
    ) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.update_item_at(ListPath::Exercises { block }, index, ItemPatch::Exercise(patch))
    }

    pub fn remove_exercise(&mut self, block: usize, index: usize) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.remove_item_at(ListPath::Exercises { block }, index)
    }

    pub fn reorder_exercises(
        &mut self,
        block: usize,
        from: usize,
        to: usize,
    ) -> Result<Arc<WorkoutDraft>, DraftError> {
        self.reorder_items_in(ListPath::Exercises { block }, from, to)
    }
}
