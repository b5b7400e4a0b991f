pub mod race;

pub use race::{or_after, race};
