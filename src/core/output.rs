//! Public output types for deckhand command responses.
//!
//! These are used by CLI commands and by consumers of the deckhand library.

use serde::{Deserialize, Serialize};

// ============================================================================
// Batch Operations
// ============================================================================

/// Per-domain bookkeeping for a batch that writes something to each domain.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
    pub items: Vec<BatchResultItem>,
}

/// Individual item result within a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResultItem {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_updated(&mut self, id: String) {
        self.updated += 1;
        self.items.push(BatchResultItem {
            id,
            status: "updated".to_string(),
            error: None,
        });
    }

    pub fn record_skipped(&mut self, id: String) {
        self.skipped += 1;
        self.items.push(BatchResultItem {
            id,
            status: "skipped".to_string(),
            error: None,
        });
    }

    pub fn record_error(&mut self, id: String, error: String) {
        self.errors += 1;
        self.items.push(BatchResultItem {
            id,
            status: "error".to_string(),
            error: Some(error),
        });
    }

    pub fn summary(&self) -> BulkSummary {
        BulkSummary {
            total: self.items.len(),
            succeeded: self.updated as usize,
            failed: self.errors as usize,
        }
    }
}

// ============================================================================
// Bulk Operations (for commands that process multiple items)
// ============================================================================

/// Summary of bulk operation results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_items() {
        let mut result = BatchResult::new();
        result.record_updated("a.example".to_string());
        result.record_error("b.example".to_string(), "refused".to_string());
        result.record_skipped("c.example".to_string());

        assert_eq!(
            result.summary(),
            BulkSummary {
                total: 3,
                succeeded: 1,
                failed: 1
            }
        );
        assert_eq!(result.items[1].error.as_deref(), Some("refused"));
    }
}
