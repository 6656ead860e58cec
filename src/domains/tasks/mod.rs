pub mod errors;
pub mod models;
pub mod queue;
pub mod service;

pub use errors::TaskError;
pub use models::{JobKind, JobPayload, JobRequest, RequestId, Status};
pub use service::cancel_and_settle;
