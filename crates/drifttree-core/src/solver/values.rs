use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Capability set shared by every opaque value the engine routes around:
/// states, actions and observations. The engine never inspects these beyond
/// copying, comparing, hashing and printing them.
pub trait SolverValue: Clone + PartialEq + Eq + Hash + Debug + Display {}

impl<T> SolverValue for T where T: Clone + PartialEq + Eq + Hash + Debug + Display {}

/// An action that resolves to a bin number in `[0, bin_count)`. Two actions
/// resolving to the same bin share one mapping entry.
pub trait DiscretizedAction: SolverValue {
    fn bin_number(&self) -> usize;
}

/// The finite real vector identifying a continuous action. Hash and equality
/// are domain-defined and are meant to quotient very similar actions into
/// the same mapping entry.
pub trait ConstructionData: Clone + PartialEq + Eq + Hash + Debug {
    /// The parameter vector consumed by action-choice strategies.
    fn as_slice(&self) -> &[f64];
}

/// An action in a continuous or hybrid action space, keyed by its
/// construction data.
pub trait ContinuousAction: SolverValue {
    type Data: ConstructionData;

    fn construction_data(&self) -> &Self::Data;
}

/// An observation carrying a non-negative distance to its peers. Required
/// only by the approximate observation mapping.
pub trait MetricObservation: SolverValue {
    fn distance_to(&self, other: &Self) -> f64;
}

/// A state whose coordinates can be placed in a spatial index for change
/// propagation. Models without changes never need this.
pub trait SpatialState {
    fn coords(&self) -> Vec<f64>;
}
