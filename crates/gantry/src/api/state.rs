//! Application state shared across handlers.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::AuthState;
use crate::cluster::ClusterApi;
use crate::terminal::SessionParams;

/// State handed to every handler. Cloning is cheap; the cluster client is
/// shared, per-session state never lives here.
#[derive(Clone)]
pub struct AppState {
    pub cluster: Arc<dyn ClusterApi>,
    pub auth: AuthState,
    pub params: SessionParams,
}

impl AppState {
    pub fn new(cluster: Arc<dyn ClusterApi>, auth: AuthState, params: SessionParams) -> Self {
        Self {
            cluster,
            auth,
            params,
        }
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
