//! Left/right adjacency derived from the roster
//!
//! Door state is never set on its own: it is recomputed from the local id
//! and the roster ids after every roster change, and only differences
//! produce notifications.

use shared::{Direction, DoorCommand, DoorState};

/// Door states the local peer should have given the sorted roster ids.
pub fn expected_doors(my_id: u32, roster_ids: &[u32]) -> (DoorState, DoorState) {
    match (roster_ids.first(), roster_ids.last()) {
        (None, _) | (_, None) => (DoorState::Closed, DoorState::Closed),
        (Some(&min), _) if my_id < min => (DoorState::Closed, DoorState::Open),
        (_, Some(&max)) if max < my_id => (DoorState::Open, DoorState::Closed),
        _ => (DoorState::Open, DoorState::Open),
    }
}

/// Current door states, starting closed on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Doors {
    left: DoorState,
    right: DoorState,
}

impl Default for Doors {
    fn default() -> Self {
        Self {
            left: DoorState::Closed,
            right: DoorState::Closed,
        }
    }
}

impl Doors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, side: Direction) -> DoorState {
        match side {
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn left(&self) -> DoorState {
        self.left
    }

    pub fn right(&self) -> DoorState {
        self.right
    }

    /// Moves `side` to `desired`. Returns the notification to emit, or
    /// `None` if the door was already there.
    pub fn assure(&mut self, side: Direction, desired: DoorState) -> Option<DoorCommand> {
        let door = match side {
            Direction::Left => &mut self.left,
            Direction::Right => &mut self.right,
        };
        if *door == desired {
            return None;
        }
        *door = desired;
        Some(DoorCommand::new(desired, side))
    }

    /// Applies the rule for `(my_id, roster_ids)`; returns the changes in
    /// left-then-right order.
    pub fn reconcile(&mut self, my_id: u32, roster_ids: &[u32]) -> Vec<DoorCommand> {
        let (left, right) = expected_doors(my_id, roster_ids);
        self.assure(Direction::Left, left)
            .into_iter()
            .chain(self.assure(Direction::Right, right))
            .collect()
    }
}
