pub mod allocation;
pub mod launcher;
pub mod manager;

pub use allocation::{AllocationError, AllocationRegistry, PortAndMagic};
pub use launcher::{FileDropLauncher, TerminalLauncher};
pub use manager::{FleetError, TerminalFleetManager};
