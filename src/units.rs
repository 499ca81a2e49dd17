//src/units.rs
//! Display-unit handling for weights and durations.
//!
//! Values are always stored canonically (pounds, seconds). A [`UnitField`]
//! keeps the text a user sees in their chosen unit in step with the stored
//! value.
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};

pub const KG_TO_LBS: f64 = 2.20462;

pub fn kg_to_lbs(kg: f64) -> f64 {
    kg * KG_TO_LBS
}

pub fn lbs_to_kg(lbs: f64) -> f64 {
    lbs / KG_TO_LBS
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Parses user input, treating anything unparsable (including empty) as zero.
pub fn parse_display(input: &str) -> f64 {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Formats a number without a trailing `.0`, otherwise with one decimal.
pub fn format_number(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

pub trait Unit: Copy + PartialEq + fmt::Debug {
    /// How many canonical units one of `self` is worth.
    fn factor(self) -> f64;
    /// Rounding applied to a value freshly converted into the canonical unit.
    fn round_base(value: f64) -> f64;
    /// Rounding applied when showing a canonical value in `self`.
    fn round_display(value: f64) -> f64;

    fn to_base(self, value: f64) -> f64 {
        Self::round_base(value * self.factor())
    }

    fn from_base(self, base: f64) -> f64 {
        base / self.factor()
    }

    fn format(self, base: f64) -> String {
        format_number(Self::round_display(self.from_base(base)))
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WeightUnit {
    #[default]
    Lbs,
    Kg,
    Bodyweight, // added load on top of bodyweight, entered in lbs
}

impl Unit for WeightUnit {
    fn factor(self) -> f64 {
        match self {
            Self::Lbs | Self::Bodyweight => 1.0,
            Self::Kg => KG_TO_LBS,
        }
    }

    fn round_base(value: f64) -> f64 {
        round_to_tenth(value)
    }

    fn round_display(value: f64) -> f64 {
        round_to_tenth(value)
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TimeUnit {
    #[default]
    Sec,
    Min,
    Hrs,
}

impl Unit for TimeUnit {
    fn factor(self) -> f64 {
        match self {
            Self::Sec => 1.0,
            Self::Min => 60.0,
            Self::Hrs => 3600.0,
        }
    }

    fn round_base(value: f64) -> f64 {
        value.round()
    }

    // Partial minutes/hours are shown as whole units
    fn round_display(value: f64) -> f64 {
        value.floor()
    }
}

/// A numeric input shown in a user-selected unit backed by a canonical value.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitField<U: Unit> {
    unit: U,
    display: String,
    base: f64,
    editing: bool,
}

impl<U: Unit> UnitField<U> {
    pub fn new(base: f64, unit: U) -> Self {
        Self {
            unit,
            display: unit.format(base),
            base,
            editing: false,
        }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn unit(&self) -> U {
        self.unit
    }

    pub const fn base(&self) -> f64 {
        self.base
    }

    pub const fn is_editing(&self) -> bool {
        self.editing
    }

    /// Records what the user typed and returns the canonical value to store.
    /// The typed text is kept verbatim until [`commit`](Self::commit).
    pub fn on_input(&mut self, input: &str) -> f64 {
        self.editing = true;
        self.display = input.to_string();
        self.base = self.unit.to_base(parse_display(input));
        self.base
    }

    /// Switches unit and reformats the display. The canonical value is unchanged.
    pub fn set_unit(&mut self, unit: U) {
        self.unit = unit;
        self.editing = false;
        self.display = unit.format(self.base);
    }

    /// Takes a canonical value from outside. Ignored while the user is typing.
    /// Returns whether the display was refreshed.
    pub fn sync_from_base(&mut self, base: f64) -> bool {
        if self.editing {
            return false;
        }
        self.base = base;
        self.display = self.unit.format(base);
        true
    }

    /// Ends the typing phase so later syncs may update the display again.
    pub fn commit(&mut self) {
        self.editing = false;
    }
}
