pub mod time;

pub use time::{Duration, Instant};
