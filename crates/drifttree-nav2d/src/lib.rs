mod action;
pub mod changes;
pub mod config;
mod error;
pub mod geometry;
pub mod map;
mod model;
mod observation;
mod state;

pub use action::{Nav2DAction, NAV2D_BIN_COUNT};
pub use changes::{load_changes, parse_changes, MapChange};
pub use config::{ErrorKind, NavConfig};
pub use error::NavError;
pub use map::{AreaType, MapSpec};
pub use model::{Nav2DActionSource, Nav2DModel, PathResult};
pub use observation::Nav2DObservation;
pub use state::Nav2DState;
