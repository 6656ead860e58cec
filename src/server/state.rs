use crate::kernel::deps::Services;

/// Shared Axum state: a thin wrapper so route handlers take `State<AppState>`
/// rather than threading `Services` fields individually.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}
