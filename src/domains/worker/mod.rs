pub mod classify;
pub mod reaper;
pub mod run_loop;

pub use run_loop::{run, WorkerConfig};
