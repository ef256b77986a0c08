pub mod actions;
pub mod approximate_obs;
pub mod continuous;
pub mod discrete_obs;
pub mod discretized;
pub mod observations;
