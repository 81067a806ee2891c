//! Web search boundary.

use async_trait::async_trait;

use crate::graph::state::Passage;
use crate::Result;

/// Live web search returning passages in rank order.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Passage>>;
}
