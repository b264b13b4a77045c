pub mod fanout;
pub mod signal_listener;
