pub mod errors;
pub mod models;
pub mod reconciler;
pub mod service;

pub use errors::PaymentError;
pub use models::{Payment, PaymentStatus};
