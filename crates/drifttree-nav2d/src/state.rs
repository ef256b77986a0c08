use std::fmt;
use std::hash::{Hash, Hasher};

use drifttree_core::SpatialState;

use crate::geometry::Point2D;

/// Vehicle pose: position plus heading in turns.
#[derive(Debug, Clone, Copy)]
pub struct Nav2DState {
    x: f64,
    y: f64,
    direction: f64,
}

impl Nav2DState {
    pub fn new(position: Point2D, direction: f64) -> Self {
        Nav2DState {
            x: position.x,
            y: position.y,
            direction,
        }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn direction(&self) -> f64 {
        self.direction
    }
}

impl PartialEq for Nav2DState {
    fn eq(&self, other: &Self) -> bool {
        self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.direction.to_bits() == other.direction.to_bits()
    }
}

impl Eq for Nav2DState {}

impl Hash for Nav2DState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
        self.direction.to_bits().hash(state);
    }
}

impl fmt::Display for Nav2DState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}):{}", self.x, self.y, self.direction)
    }
}

impl SpatialState for Nav2DState {
    fn coords(&self) -> Vec<f64> {
        vec![self.x, self.y]
    }
}
