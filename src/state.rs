use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, notify::Notifier, store::AssessmentStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AssessmentStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
