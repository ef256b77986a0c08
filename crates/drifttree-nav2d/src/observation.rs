use std::fmt;
use std::hash::{Hash, Hasher};

use drifttree_core::MetricObservation;

use crate::geometry::Point2D;
use crate::state::Nav2DState;

/// What the vehicle senses after a step: its position while inside an
/// observation area, nothing otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Nav2DObservation {
    sighting: Option<Point2D>,
}

impl Nav2DObservation {
    pub fn blank() -> Self {
        Nav2DObservation { sighting: None }
    }

    pub fn of_state(state: &Nav2DState) -> Self {
        Nav2DObservation {
            sighting: Some(state.position()),
        }
    }

    pub fn sighting(&self) -> Option<Point2D> {
        self.sighting
    }
}

impl PartialEq for Nav2DObservation {
    fn eq(&self, other: &Self) -> bool {
        match (self.sighting, other.sighting) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.x.to_bits() == b.x.to_bits() && a.y.to_bits() == b.y.to_bits()
            }
            _ => false,
        }
    }
}

impl Eq for Nav2DObservation {}

impl Hash for Nav2DObservation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.sighting {
            None => 0u8.hash(state),
            Some(point) => {
                1u8.hash(state);
                point.x.to_bits().hash(state);
                point.y.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for Nav2DObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sighting {
            None => write!(f, "none"),
            Some(point) => write!(f, "{point}"),
        }
    }
}

impl MetricObservation for Nav2DObservation {
    fn distance_to(&self, other: &Self) -> f64 {
        match (self.sighting, other.sighting) {
            (None, None) => 0.0,
            (Some(a), Some(b)) => (a - b).magnitude(),
            _ => f64::INFINITY,
        }
    }
}
