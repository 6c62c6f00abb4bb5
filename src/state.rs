use std::sync::Arc;

use crate::llm::AttributeAnalyzer;

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<dyn AttributeAnalyzer>,
}

impl AppState {
    pub fn new(analyzer: Arc<dyn AttributeAnalyzer>) -> Self {
        AppState { analyzer }
    }
}
