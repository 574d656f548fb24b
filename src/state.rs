// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    bank::StoreQuestionBank,
    config::Config,
    engine::AssessmentEngine,
    store::DocumentStore,
    utils::clock::Clock,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AssessmentEngine>,
    pub bank: Arc<StoreQuestionBank>,
    pub config: Config,
}

impl AppState {
    /// Wires the question bank and the engine on top of one document store.
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        let bank = Arc::new(StoreQuestionBank::new(store.clone()));
        let engine = AssessmentEngine::new(store, bank.clone(), clock, config.utc_offset);
        Self {
            engine: Arc::new(engine),
            bank,
            config,
        }
    }
}

impl FromRef<AppState> for Arc<AssessmentEngine> {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for Arc<StoreQuestionBank> {
    fn from_ref(state: &AppState) -> Self {
        state.bank.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
