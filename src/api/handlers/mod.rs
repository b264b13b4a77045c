pub mod allocations;
pub mod control;
pub mod dispatches;
pub mod health;
pub mod metrics;
pub mod workers;
