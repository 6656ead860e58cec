pub mod errors;
pub mod gpu;
pub mod service;

pub use errors::AdmissionError;
pub use service::{admit, AdmissionLimits, AdmissionOutcome};
