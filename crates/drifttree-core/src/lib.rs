mod solver;

pub use solver::changes::ChangeFlags;
pub use solver::config::{SearchConfig, SearchConfigError};
pub use solver::errors::{SerializeError, SolverError};
pub use solver::histories::{Histories, HistoryEntry, HistorySequence};
pub use solver::ids::{ActionNodeId, BeliefId, SequenceId, StateId};
pub use solver::index::{EnumeratedIndex, NullIndex, RTreeIndex, StateIndex};
pub use solver::mappings::actions::{ActionMapping, ActionPool, ChooserBlob, EntryView};
pub use solver::mappings::approximate_obs::{ApproximateObservationMap, ApproximateObservationPool};
pub use solver::mappings::continuous::{
    ActionChooser, ContinuousActionMap, ContinuousActionPool, ContinuousActionSource,
};
pub use solver::mappings::discrete_obs::{DiscreteObservationMap, DiscreteObservationPool};
pub use solver::mappings::discretized::{
    BinnedActionSource, DiscretizedActionMap, DiscretizedActionPool,
};
pub use solver::mappings::observations::{ObsEntry, ObservationMapping, ObservationPool};
pub use solver::model::{Model, Step};
pub use solver::serialization::{ChooserRegistry, TreeSerializer};
pub use solver::simulate::{RepairStats, RunMetrics, SimulationMetrics, Solver};
pub use solver::state_pool::StatePool;
pub use solver::tree::BeliefTree;
pub use solver::values::{
    ConstructionData, ContinuousAction, DiscretizedAction, MetricObservation, SolverValue,
    SpatialState,
};
pub use solver::{ActionNode, BeliefNode};
