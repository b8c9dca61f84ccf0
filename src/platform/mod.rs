pub mod daemon;
pub mod scheduler;
