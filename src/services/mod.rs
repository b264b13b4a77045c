pub mod overlay_cache;
pub mod watchdog;
