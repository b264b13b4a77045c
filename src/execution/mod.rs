pub mod monitor;
pub mod router;
pub mod sizer;

pub use monitor::{ResultMonitor, WatchedDispatch};
pub use router::DispatchRouter;
