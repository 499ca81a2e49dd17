//src/reorder.rs
//! Moving items around ordered lists (weeks, circuits, exercises) and keeping
//! their persisted position fields dense.
use thiserror::Error;
use tracing::debug;

use crate::model::{Block, Exercise, Week};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderError {
    #[error("Position {index} is out of range for a list of {len} item(s)")]
    OutOfRange { index: usize, len: usize },
}

/// An item that records its own position within its parent list.
pub trait Ordered {
    fn position(&self) -> usize;
    fn set_position(&mut self, position: usize);
}

impl Ordered for Exercise {
    fn position(&self) -> usize {
        self.order
    }

    fn set_position(&mut self, position: usize) {
        self.order = position;
    }
}

impl Ordered for Block {
    fn position(&self) -> usize {
        self.order
    }

    fn set_position(&mut self, position: usize) {
        self.order = position;
    }
}

// Week numbers are positional and 1-based. A default "Week N" name follows
// the number; custom names are kept.
impl Ordered for Week {
    fn position(&self) -> usize {
        (self.week_number as usize).saturating_sub(1)
    }

    fn set_position(&mut self, position: usize) {
        let number = u32::try_from(position + 1).unwrap_or(u32::MAX);
        if self.name == Week::default_name(self.week_number) {
            self.name = Week::default_name(number);
        }
        self.week_number = number;
    }
}

/// Rewrites every item's position field to match its index.
pub fn renumber<T: Ordered>(items: &mut [T]) {
    for (i, item) in items.iter_mut().enumerate() {
        item.set_position(i);
    }
}

/// True when positions are exactly `0..len` in list order.
pub fn is_dense<T: Ordered>(items: &[T]) -> bool {
    items.iter().enumerate().all(|(i, item)| item.position() == i)
}

/// Removes the item at `from`, reinserts it at `to`, then renumbers the list.
pub fn move_item<T: Ordered>(items: &mut Vec<T>, from: usize, to: usize) -> Result<(), ReorderError> {
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(ReorderError::OutOfRange { index, len });
        }
    }
    let item = items.remove(from);
    items.insert(to, item);
    renumber(items);
    debug!(from, to, len, "moved list item");
    Ok(())
}

/// Drag gesture over an ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListDrag {
    #[default]
    Idle,
    Dragging { from: usize, over: usize },
}

impl ListDrag {
    pub fn begin(&mut self, index: usize) {
        *self = Self::Dragging {
            from: index,
            over: index,
        };
    }

    pub fn hover(&mut self, index: usize) {
        if let Self::Dragging { over, .. } = self {
            *over = index;
        }
    }

    /// Ends the gesture. Yields `(from, to)` only if the item actually moved.
    pub fn drop_item(&mut self) -> Option<(usize, usize)> {
        let finished = std::mem::take(self);
        match finished {
            Self::Dragging { from, over } if from != over => Some((from, over)),
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        *self = Self::Idle;
    }

    pub const fn is_dragging(&self) -> bool {
        matches!(self, Self::Dragging { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercises(n: usize) -> Vec<Exercise> {
        (0..n)
            .map(|i| Exercise {
                name: format!("ex{i}"),
                order: i,
                ..Exercise::default()
            })
            .collect()
    }

    fn names(items: &[Exercise]) -> Vec<&str> {
        items.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn moving_forward_and_back_keeps_positions_dense() {
        let mut items = exercises(4);
        move_item(&mut items, 0, 3).unwrap();
        assert_eq!(names(&items), ["ex1", "ex2", "ex3", "ex0"]);
        assert!(is_dense(&items));

        move_item(&mut items, 3, 1).unwrap();
        assert_eq!(names(&items), ["ex1", "ex0", "ex2", "ex3"]);
        assert!(is_dense(&items));
    }

    #[test]
    fn long_sequences_of_moves_stay_a_permutation() {
        let mut items = exercises(7);
        let mut seed: usize = 17;
        for _ in 0..200 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345) % 2_147_483_648;
            let from = seed % 7;
            let to = (seed / 7) % 7;
            move_item(&mut items, from, to).unwrap();
            assert!(is_dense(&items));
        }
        let mut seen = names(&items);
        seen.sort_unstable();
        assert_eq!(seen, ["ex0", "ex1", "ex2", "ex3", "ex4", "ex5", "ex6"]);
    }

    #[test]
    fn out_of_range_positions_are_rejected_untouched() {
        let mut items = exercises(2);
        assert_eq!(
            move_item(&mut items, 0, 2),
            Err(ReorderError::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(names(&items), ["ex0", "ex1"]);
    }

    #[test]
    fn renumber_repairs_gaps_left_by_removal() {
        let mut items = exercises(3);
        items.remove(1);
        assert!(!is_dense(&items));
        renumber(&mut items);
        assert!(is_dense(&items));
    }

    #[test]
    fn week_positions_are_one_based() {
        let mut weeks: Vec<Week> = (1..=3).map(Week::numbered).collect();
        move_item(&mut weeks, 2, 0).unwrap();
        let numbers: Vec<u32> = weeks.iter().map(|w| w.week_number).collect();
        assert_eq!(numbers, [1, 2, 3]);
        assert_eq!(weeks[0].name, "Week 1");
    }

    #[test]
    fn moved_weeks_rename_only_default_names() {
        let mut weeks: Vec<Week> = (1..=3).map(Week::numbered).collect();
        weeks[2].name = "Deload".to_string();
        weeks[0].description = "first".to_string();
        move_item(&mut weeks, 0, 2).unwrap();
        let names: Vec<&str> = weeks.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["Week 1", "Deload", "Week 3"]);
        assert_eq!(weeks[2].description, "first");
        assert_eq!(weeks[1].week_number, 2);
    }

    #[test]
    fn drag_without_movement_yields_nothing() {
        let mut drag = ListDrag::default();
        drag.begin(2);
        assert!(drag.is_dragging());
        assert_eq!(drag.drop_item(), None);

        drag.begin(2);
        drag.hover(0);
        assert_eq!(drag.drop_item(), Some((2, 0)));
        assert!(!drag.is_dragging());

        drag.hover(1);
        assert_eq!(drag, ListDrag::Idle);
    }
}
