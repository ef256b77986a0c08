use std::fmt;
use std::hash::{Hash, Hasher};

use drifttree_core::DiscretizedAction;

/// One of the ten discretized controls: three forward speeds, three left
/// and three right turn rates, and doing nothing. The bin number fully
/// identifies the action.
#[derive(Debug, Clone, Copy)]
pub struct Nav2DAction {
    bin: usize,
    speed: f64,
    rotational_speed: f64,
}

pub const NAV2D_BIN_COUNT: usize = 10;

impl Nav2DAction {
    /// Build the action for a bin, scaling by the configured maxima.
    /// Returns `None` for bins outside the table.
    pub fn from_bin(bin: usize, max_speed: f64, max_rotational_speed: f64) -> Option<Self> {
        let (speed, rotational_speed) = match bin {
            0 => (0.2 * max_speed, 0.0),
            1 => (0.6 * max_speed, 0.0),
            2 => (max_speed, 0.0),
            3 => (0.0, 0.2 * max_rotational_speed),
            4 => (0.0, 0.6 * max_rotational_speed),
            5 => (0.0, max_rotational_speed),
            6 => (0.0, -0.2 * max_rotational_speed),
            7 => (0.0, -0.6 * max_rotational_speed),
            8 => (0.0, -max_rotational_speed),
            9 => (0.0, 0.0),
            _ => return None,
        };
        Some(Nav2DAction {
            bin,
            speed,
            rotational_speed,
        })
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn rotational_speed(&self) -> f64 {
        self.rotational_speed
    }
}

impl PartialEq for Nav2DAction {
    fn eq(&self, other: &Self) -> bool {
        self.bin == other.bin
    }
}

impl Eq for Nav2DAction {}

impl Hash for Nav2DAction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bin.hash(state);
    }
}

impl fmt::Display for Nav2DAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bin {
            0..=2 => write!(f, "FORWARD_{}", self.bin),
            3..=5 => write!(f, "TURN_LEFT_{}", self.bin - 3),
            6..=8 => write!(f, "TURN_RIGHT_{}", self.bin - 6),
            _ => write!(f, "DO_NOTHING"),
        }
    }
}

impl DiscretizedAction for Nav2DAction {
    fn bin_number(&self) -> usize {
        self.bin
    }
}
