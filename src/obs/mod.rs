//! External recorder link and poll-based monitoring

mod monitor;

pub use monitor::*;
