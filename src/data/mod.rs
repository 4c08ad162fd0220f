//! Data structures and serialization for input logs

mod events;
mod records;

pub use events::*;
pub use records::*;
