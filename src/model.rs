//src/model.rs
//! Request/response shapes exchanged with the backend. JSON uses camelCase.
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::units::{TimeUnit, UnitField, WeightUnit};

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AccessType {
    #[default]
    Public,
    Private,
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MeasurementType {
    #[default]
    Reps,
    Time, // target_reps holds seconds
    Distance,
    Bodyweight,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Exercise {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub measurement_type: MeasurementType,
    pub target_reps: u32,
    pub target_weight: f64, // pounds
    pub target_distance: f64,
    pub target_duration_sec: u32,
    pub rest: u32, // seconds
    pub notes: String,
    pub order: usize,
}

impl Exercise {
    pub fn new_default() -> Self {
        Self {
            name: "New Exercise".to_string(),
            target_reps: 10,
            rest: 60,
            ..Self::default()
        }
    }

    pub fn weight_field(&self, unit: WeightUnit) -> UnitField<WeightUnit> {
        UnitField::new(self.target_weight, unit)
    }

    /// Field for the timed target. TIME exercises keep their seconds in `target_reps`.
    pub fn time_field(&self, unit: TimeUnit) -> UnitField<TimeUnit> {
        let seconds = match self.measurement_type {
            MeasurementType::Time => self.target_reps,
            _ => self.target_duration_sec,
        };
        UnitField::new(f64::from(seconds), unit)
    }
}

/// A circuit: exercises repeated together for `sets` rounds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Block {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub sets: u32,
    pub rest: u32, // seconds
    pub order: usize,
    pub exercises: Vec<Exercise>,
}

impl Block {
    pub fn new_default() -> Self {
        Self {
            name: "New Circuit".to_string(),
            sets: 3,
            rest: 60,
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Workout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "title")]
    pub name: String,
    pub description: String,
    pub duration: u32, // minutes
    pub difficulty: Option<String>,
    pub categories: Vec<String>,
    pub access_type: AccessType,
    #[serde(with = "wire_date::datetime")]
    pub start_date: Option<NaiveDateTime>,
    #[serde(with = "wire_date::datetime")]
    pub end_date: Option<NaiveDateTime>,
    pub blocks: Vec<Block>,
}

impl Workout {
    /// Scheduled length derived from the dates, when both are set.
    pub fn scheduled_minutes(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if end > start => Some((end - start).num_minutes()),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Week {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub week_number: u32, // 1-based, follows position in the program
    #[serde(with = "wire_date::date")]
    pub start_date: Option<NaiveDate>,
    #[serde(with = "wire_date::date")]
    pub end_date: Option<NaiveDate>,
    pub workouts: Vec<Workout>,
}

impl Week {
    pub fn default_name(week_number: u32) -> String {
        format!("Week {week_number}")
    }

    pub fn numbered(week_number: u32) -> Self {
        Self {
            name: Self::default_name(week_number),
            week_number,
            ..Self::default()
        }
    }

    pub fn workout(&self, id: &str) -> Option<&Workout> {
        self.workouts.iter().find(|w| w.id.as_deref() == Some(id))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Program {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub num_weeks: u32,
    pub has_nutrition_program: bool,
    pub types: Vec<String>,
    pub access_type: AccessType,
    pub admins: Vec<String>,
    pub members: Vec<String>,
    pub weeks: Vec<Week>,
}

impl Program {
    /// `Some((declared, actual))` when `num_weeks` disagrees with the populated weeks.
    pub fn week_count_mismatch(&self) -> Option<(u32, usize)> {
        let actual = self.weeks.len();
        (usize::try_from(self.num_weeks).ok() != Some(actual)).then_some((self.num_weeks, actual))
    }

    pub fn week_by_number(&self, week_number: u32) -> Option<(usize, &Week)> {
        self.weeks
            .iter()
            .enumerate()
            .find(|(_, w)| w.week_number == week_number)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub has_next_page: bool,
    pub cursor: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Date handling on the wire.
///
/// The backend sends instants such as `2026-10-19T09:00:00.000Z`; older records
/// carry a bare `2026-10-19T09:00:00`. Instants are held as local wall-clock
/// time and written back as UTC. Week dates are calendar days (`2026-10-18`).
pub mod wire_date {
    use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    }

    pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|instant| instant.with_timezone(&Local).naive_local())
            .or_else(|| parse_naive(raw))
    }

    /// The calendar day as written, whatever time or offset follows it.
    pub fn parse_date(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|i| i.date_naive()))
            .or_else(|| parse_naive(raw).map(|dt| dt.date()))
    }

    pub fn format_datetime(value: NaiveDateTime) -> String {
        Local.from_local_datetime(&value).earliest().map_or_else(
            || value.format("%Y-%m-%dT%H:%M:%S").to_string(),
            |local| {
                local
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true)
            },
        )
    }

    pub mod datetime {
        use chrono::NaiveDateTime;
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serializer};

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&super::format_datetime(*v)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .filter(|raw| !raw.trim().is_empty())
                .map(|raw| {
                    super::parse_datetime(&raw)
                        .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
                })
                .transpose()
        }
    }

    pub mod date {
        use chrono::NaiveDate;
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serializer};

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.format("%Y-%m-%d").to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .filter(|raw| !raw.trim().is_empty())
                .map(|raw| {
                    super::parse_date(&raw)
                        .ok_or_else(|| D::Error::custom(format!("invalid date '{raw}'")))
                })
                .transpose()
        }
    }
}
