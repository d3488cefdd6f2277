//! Offline research provider backed by semantic memory.

use crate::error::SallieResult;
use crate::memory::{MemoryLevel, MemoryManager};
use crate::modules::ResearchProvider;
use crate::nlp::LanguageAnalysis;
use async_trait::async_trait;
use std::sync::Arc;

/// Answers research queries from facts stored at [`MemoryLevel::Semantic`].
pub struct SemanticMemoryResearch {
    memory: Arc<MemoryManager>,
    limit: usize,
}

impl SemanticMemoryResearch {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self { memory, limit: 3 }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl ResearchProvider for SemanticMemoryResearch {
    async fn research(&self, query: &str, analysis: &LanguageAnalysis) -> SallieResult<Vec<String>> {
        let query = if analysis.keywords.is_empty() {
            query.to_string()
        } else {
            analysis.keywords.join(" ")
        };
        Ok(self
            .memory
            .search(MemoryLevel::Semantic, &query, self.limit)?
            .into_iter()
            .map(|item| item.content)
            .collect())
    }
}
