//src/schedule.rs
//! The 7 × 24 weekly calendar grid.
//!
//! A [`GridSelector`] turns pointer gestures over day/hour cells into a
//! rectangular selection, and a confirmed selection into concrete start and
//! end times for a new workout, meal or note.
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::Workout;

pub const SLOTS_PER_DAY: u8 = 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid time slot label: '{0}' (expected e.g. 12AM, 9AM, 3PM)")]
    InvalidSlotLabel(String),
    #[error("Hour {0} is outside 0-23")]
    InvalidHour(u8),
    #[error("Invalid day: '{0}'")]
    InvalidDay(String),
    #[error("Invalid time '{0}' (expected HH:MM)")]
    InvalidTime(String),
    #[error("Invalid cell '{0}' (expected e.g. 'MON 9AM')")]
    InvalidCell(String),
    #[error("No selection is waiting for a choice")]
    NothingSelected,
}

/// Days of the grid, Sunday first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumString, Display,
)]
#[strum(ascii_case_insensitive)]
pub enum Day {
    #[strum(to_string = "SUN", serialize = "sunday")]
    Sunday,
    #[strum(to_string = "MON", serialize = "monday")]
    Monday,
    #[strum(to_string = "TUE", serialize = "tuesday")]
    Tuesday,
    #[strum(to_string = "WED", serialize = "wednesday")]
    Wednesday,
    #[strum(to_string = "THU", serialize = "thursday")]
    Thursday,
    #[strum(to_string = "FRI", serialize = "friday")]
    Friday,
    #[strum(to_string = "SAT", serialize = "saturday")]
    Saturday,
}

impl Day {
    pub fn index(self) -> u32 {
        self.weekday().num_days_from_sunday()
    }

    pub const fn weekday(self) -> Weekday {
        match self {
            Self::Sunday => Weekday::Sun,
            Self::Monday => Weekday::Mon,
            Self::Tuesday => Weekday::Tue,
            Self::Wednesday => Weekday::Wed,
            Self::Thursday => Weekday::Thu,
            Self::Friday => Weekday::Fri,
            Self::Saturday => Weekday::Sat,
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        let index = date.weekday().num_days_from_sunday();
        Self::iter()
            .find(|d| d.index() == index)
            .unwrap_or(Self::Sunday)
    }
}

/// Maps a 12-hour clock reading to a 24-hour one: 12AM is 0, 12PM is 12.
pub const fn hour24(hour12: u8, pm: bool) -> u8 {
    hour12 % 12 + if pm { 12 } else { 0 }
}

/// One hour row of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSlot(u8);

impl TimeSlot {
    pub fn new(hour: u8) -> Result<Self, ScheduleError> {
        if hour < SLOTS_PER_DAY {
            Ok(Self(hour))
        } else {
            Err(ScheduleError::InvalidHour(hour))
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..SLOTS_PER_DAY).map(Self)
    }

    pub const fn hour(self) -> u8 {
        self.0
    }

    pub fn label(self) -> String {
        let suffix = if self.0 < 12 { "AM" } else { "PM" };
        let hour12 = match self.0 % 12 {
            0 => 12,
            h => h,
        };
        format!("{hour12}{suffix}")
    }

    /// 24-hour "HH:00" string.
    pub fn to_hhmm(self) -> String {
        format!("{:02}:00", self.0)
    }

    pub fn start_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.0), 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for TimeSlot {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidSlotLabel(s.to_string());
        let upper = s.trim().to_ascii_uppercase();
        let (digits, pm) = if let Some(d) = upper.strip_suffix("AM") {
            (d, false)
        } else if let Some(d) = upper.strip_suffix("PM") {
            (d, true)
        } else {
            return Err(invalid());
        };
        let hour12: u8 = digits.trim().parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&hour12) {
            return Err(invalid());
        }
        Self::new(hour24(hour12, pm))
    }
}

/// Converts a slot label such as "12PM" to "12:00".
pub fn label_to_hhmm(label: &str) -> Result<String, ScheduleError> {
    label.parse::<TimeSlot>().map(TimeSlot::to_hhmm)
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ScheduleError::InvalidTime(value.to_string()))
}

/// Ordered by day, then slot, so the smallest cell is the earliest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub day: Day,
    pub slot: TimeSlot,
}

impl Cell {
    pub const fn new(day: Day, slot: TimeSlot) -> Self {
        Self { day, slot }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.day, self.slot)
    }
}

// Accepts "MON 9AM" or "mon@9am"
impl FromStr for Cell {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s
            .split(|c: char| c.is_whitespace() || c == '@')
            .filter(|p| !p.is_empty());
        let (Some(day), Some(slot), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ScheduleError::InvalidCell(s.to_string()));
        };
        let day = Day::from_str(day).map_err(|_| ScheduleError::InvalidDay(day.to_string()))?;
        Ok(Self::new(day, slot.parse()?))
    }
}

/// The rectangle spanned by two corner cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub min_day: Day,
    pub max_day: Day,
    pub min_slot: TimeSlot,
    pub max_slot: TimeSlot,
}

impl Rect {
    pub fn spanning(a: Cell, b: Cell) -> Self {
        Self {
            min_day: a.day.min(b.day),
            max_day: a.day.max(b.day),
            min_slot: a.slot.min(b.slot),
            max_slot: a.slot.max(b.slot),
        }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        (self.min_day..=self.max_day).contains(&cell.day)
            && (self.min_slot..=self.max_slot).contains(&cell.slot)
    }

    pub fn cells(self) -> impl Iterator<Item = Cell> {
        Day::iter()
            .filter(move |d| (self.min_day..=self.max_day).contains(d))
            .flat_map(move |day| {
                (self.min_slot.hour()..=self.max_slot.hour()).map(move |h| Cell::new(day, TimeSlot(h)))
            })
    }
}

/// What the popup offers to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScheduleKind {
    Workout,
    Meal,
    Note,
}

/// Which week newly scheduled dates land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAnchor {
    /// Next occurrence of the day, counting today, in the real-world week.
    CurrentWeek,
    /// The Sunday-started week containing this date (e.g. a program week's start).
    WeekOf(NaiveDate),
}

impl ScheduleAnchor {
    pub fn for_week_start(start: Option<NaiveDate>) -> Self {
        start.map_or(Self::CurrentWeek, Self::WeekOf)
    }

    pub fn date_for(self, day: Day, today: NaiveDate) -> NaiveDate {
        match self {
            Self::CurrentWeek => {
                let ahead = (day.index() + 7 - Day::of(today).index()) % 7;
                today + Duration::days(i64::from(ahead))
            }
            Self::WeekOf(date) => {
                let sunday = date - Duration::days(i64::from(Day::of(date).index()));
                sunday + Duration::days(i64::from(day.index()))
            }
        }
    }
}

/// Next occurrence of `day` at or after `now`'s date, at "HH:MM".
pub fn next_occurrence(day: Day, hhmm: &str, now: NaiveDateTime) -> Result<NaiveDateTime, ScheduleError> {
    let time = parse_hhmm(hhmm)?;
    Ok(ScheduleAnchor::CurrentWeek.date_for(day, now.date()).and_time(time))
}

/// A confirmed selection waiting for the user to pick what to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSchedule {
    pub cells: BTreeSet<Cell>,
}

impl PendingSchedule {
    pub fn first(&self) -> Option<Cell> {
        self.cells.first().copied()
    }

    pub fn last(&self) -> Option<Cell> {
        self.cells.last().copied()
    }

    /// Default start ("HH:MM") from the earliest selected cell.
    pub fn default_start(&self) -> Option<String> {
        self.first().map(|c| c.slot.to_hhmm())
    }

    /// Default end ("HH:MM"): one hour past the latest selected cell.
    pub fn default_end(&self) -> Option<String> {
        self.last()
            .map(|c| format!("{:02}:00", (c.slot.hour() + 1) % SLOTS_PER_DAY))
    }

    /// Start and end of the selection. Only the first day is anchored; later
    /// days follow it, so the end never lands before the start.
    pub fn materialize(&self, anchor: ScheduleAnchor, today: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.first()?;
        let last = self.last()?;
        let start_date = anchor.date_for(first.day, today);
        let span = i64::from(last.day.index()) - i64::from(first.day.index());
        let start = start_date.and_time(first.slot.start_time());
        let end = (start_date + Duration::days(span)).and_time(last.slot.start_time()) + Duration::hours(1);
        Some((start, end))
    }
}

/// A new calendar entry produced by the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledItem {
    pub kind: ScheduleKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ScheduledItem {
    /// An empty workout occupying this slot, or `None` for meals and notes.
    pub fn to_workout(&self, name: &str) -> Option<Workout> {
        (self.kind == ScheduleKind::Workout).then(|| Workout {
            name: name.to_string(),
            duration: u32::try_from((self.end - self.start).num_minutes()).unwrap_or(0),
            start_date: Some(self.start),
            end_date: Some(self.end),
            ..Workout::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GridState {
    #[default]
    Idle,
    Dragging {
        anchor: Cell,
        cells: BTreeSet<Cell>,
    },
    PopupOpen(PendingSchedule),
}

/// Pointer-driven selection over the week grid.
#[derive(Debug, Clone, Default)]
pub struct GridSelector {
    occupied: HashSet<Cell>,
    state: GridState,
}

impl GridSelector {
    pub fn new(occupied: impl IntoIterator<Item = Cell>) -> Self {
        Self {
            occupied: occupied.into_iter().collect(),
            state: GridState::Idle,
        }
    }

    /// Builds a grid whose occupied cells are the hours covered by `workouts`.
    pub fn from_workouts<'a>(workouts: impl IntoIterator<Item = &'a Workout>) -> Self {
        Self::new(workouts.into_iter().flat_map(occupied_cells))
    }

    pub const fn state(&self) -> &GridState {
        &self.state
    }

    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.occupied.contains(&cell)
    }

    /// True while a drag is live, i.e. while a release anywhere must be observed.
    pub const fn captures_pointer_up(&self) -> bool {
        matches!(self.state, GridState::Dragging { .. })
    }

    pub fn selected_cells(&self) -> Vec<Cell> {
        match &self.state {
            GridState::Idle => Vec::new(),
            GridState::Dragging { cells, .. } => cells.iter().copied().collect(),
            GridState::PopupOpen(pending) => pending.cells.iter().copied().collect(),
        }
    }

    /// Starts a drag on an empty cell. Returns whether the drag started.
    pub fn pointer_down(&mut self, cell: Cell) -> bool {
        if self.state != GridState::Idle || self.is_occupied(cell) {
            return false;
        }
        debug!(%cell, "grid drag started");
        self.state = GridState::Dragging {
            anchor: cell,
            cells: BTreeSet::from([cell]),
        };
        true
    }

    pub fn pointer_enter(&mut self, cell: Cell) {
        if self.is_occupied(cell) {
            return;
        }
        if let GridState::Dragging { anchor, cells } = &mut self.state {
            let rect = Rect::spanning(*anchor, cell);
            *cells = rect
                .cells()
                .filter(|c| !self.occupied.contains(c))
                .collect();
        }
    }

    /// Ends a drag and opens the popup for the selected cells.
    pub fn pointer_up(&mut self) -> Option<&PendingSchedule> {
        if self.captures_pointer_up() {
            if let GridState::Dragging { cells, .. } = std::mem::take(&mut self.state) {
                debug!(count = cells.len(), "grid drag released");
                self.state = GridState::PopupOpen(PendingSchedule { cells });
            }
        }
        self.pending()
    }

    /// A click without drag selects exactly one cell.
    pub fn click(&mut self, cell: Cell) -> Option<&PendingSchedule> {
        if self.pointer_down(cell) {
            self.pointer_up()
        } else {
            None
        }
    }

    pub const fn pending(&self) -> Option<&PendingSchedule> {
        match &self.state {
            GridState::PopupOpen(pending) => Some(pending),
            _ => None,
        }
    }

    /// Resolves the open popup into a concrete entry and returns to idle.
    /// The chosen cells become occupied.
    pub fn choose(
        &mut self,
        kind: ScheduleKind,
        anchor: ScheduleAnchor,
        today: NaiveDate,
    ) -> Result<ScheduledItem, ScheduleError> {
        if self.pending().is_none() {
            return Err(ScheduleError::NothingSelected);
        }
        let GridState::PopupOpen(pending) = std::mem::take(&mut self.state) else {
            return Err(ScheduleError::NothingSelected);
        };
        let (start, end) = pending
            .materialize(anchor, today)
            .ok_or(ScheduleError::NothingSelected)?;
        self.occupied.extend(pending.cells);
        info!(%kind, %start, %end, "scheduled new entry");
        Ok(ScheduledItem { kind, start, end })
    }

    /// Closes the popup or abandons a drag, dropping the selection.
    pub fn cancel(&mut self) {
        self.state = GridState::Idle;
    }
}

/// Hour cells covered by a workout's start/end dates.
pub fn occupied_cells(workout: &Workout) -> Vec<Cell> {
    let (Some(start), Some(end)) = (workout.start_date, workout.end_date) else {
        return Vec::new();
    };
    let mut cells = Vec::new();
    let Some(mut t) = start.with_minute(0).and_then(|t| t.with_second(0)) else {
        return cells;
    };
    // A week of hours at most
    while t < end && cells.len() < 7 * usize::from(SLOTS_PER_DAY) {
        if let Ok(slot) = TimeSlot::new(u8::try_from(t.hour()).unwrap_or(0)) {
            cells.push(Cell::new(Day::of(t.date()), slot));
        }
        t += Duration::hours(1);
    }
    cells
}
