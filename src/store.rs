//! Session state: conversation history, uploaded datasets, and document
//! metadata.
//!
//! All chat and tool state for one server lives in a single [`Session`]
//! passed explicitly (behind `Arc<RwLock<_>>`) through every call boundary.
//! The store itself performs no validation; it is a pure accumulator.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;

use crate::data::{ChartSpec, DataFrame};
use crate::kb::KnowledgeBase;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One recorded conversation turn, optionally carrying chart/table payloads.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_columns: Option<Vec<String>>,

    /// RFC 3339 creation time.
    pub timestamp: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            chart: None,
            table_data: None,
            table_columns: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn assistant(
        text: impl Into<String>,
        chart: Option<ChartSpec>,
        table_data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
        table_columns: Option<Vec<String>>,
    ) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
            chart,
            table_data,
            table_columns,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Metadata for an uploaded dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetMeta {
    pub filename: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

/// Metadata for an indexed document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMeta {
    pub name: String,
    pub num_chunks: usize,
}

/// All mutable state for one conversation context.
#[derive(Default)]
pub struct Session {
    datasets: HashMap<String, DataFrame>,
    dataset_meta: HashMap<String, DatasetMeta>,
    active_dataset: Option<String>,

    pub documents: HashMap<String, DocumentMeta>,
    pub kb: KnowledgeBase,

    history: Vec<Turn>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Conversation history ─────────────────────────────────────────

    /// Append one turn. O(1), side-effect only.
    pub fn append(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// The last `limit` turns, oldest first.
    pub fn snapshot(&self, limit: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Empty the history and deactivate the dataset reference. Stored
    /// frames and indexed documents themselves are kept.
    pub fn clear(&mut self) {
        self.history.clear();
        self.active_dataset = None;
    }

    // ── Datasets ─────────────────────────────────────────────────────

    /// Store a dataset and make it the active one.
    pub fn insert_dataset(&mut self, id: String, filename: String, frame: DataFrame) {
        self.dataset_meta.insert(
            id.clone(),
            DatasetMeta {
                filename,
                columns: frame.columns().to_vec(),
                row_count: frame.row_count(),
            },
        );
        self.datasets.insert(id.clone(), frame);
        self.active_dataset = Some(id);
    }

    pub fn active_dataset_id(&self) -> Option<&str> {
        self.active_dataset.as_deref()
    }

    /// The currently active frame, if an active dataset is set and stored.
    pub fn active_frame(&self) -> Option<&DataFrame> {
        self.active_dataset
            .as_ref()
            .and_then(|id| self.datasets.get(id))
    }

    pub fn active_meta(&self) -> Option<&DatasetMeta> {
        self.active_dataset
            .as_ref()
            .and_then(|id| self.dataset_meta.get(id))
    }

    /// Resolve a frame by explicit id, falling back to the active dataset.
    pub fn frame<'a>(&'a self, id: Option<&'a str>) -> Option<(&'a str, &'a DataFrame)> {
        let id = id.or(self.active_dataset.as_deref())?;
        let frame = self.datasets.get(id)?;
        Some((id, frame))
    }

    pub fn dataset_meta(&self) -> &HashMap<String, DatasetMeta> {
        &self.dataset_meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::from_csv(b"gene,expression\nTP53,1.5\n", "g.csv").expect("csv")
    }

    #[test]
    fn snapshot_returns_last_n_turns() {
        let mut session = Session::new();
        for i in 0..5 {
            session.append(Turn::user(format!("message {}", i)));
        }
        let recent = session.snapshot(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "message 3");
        assert_eq!(recent[1].text, "message 4");
    }

    #[test]
    fn snapshot_with_large_limit_returns_everything() {
        let mut session = Session::new();
        session.append(Turn::user("only"));
        assert_eq!(session.snapshot(100).len(), 1);
    }

    #[test]
    fn insert_dataset_activates_it() {
        let mut session = Session::new();
        session.insert_dataset("abc".to_string(), "g.csv".to_string(), frame());
        assert_eq!(session.active_dataset_id(), Some("abc"));
        assert!(session.active_frame().is_some());
        assert_eq!(session.active_meta().unwrap().row_count, 1);
    }

    #[test]
    fn clear_empties_history_and_deactivates_dataset() {
        let mut session = Session::new();
        session.insert_dataset("abc".to_string(), "g.csv".to_string(), frame());
        session.append(Turn::user("hello"));
        session.append(Turn::assistant("hi", None, None, None));

        session.clear();

        assert!(session.snapshot(20).is_empty());
        assert!(session.active_frame().is_none());
        assert!(session.active_dataset_id().is_none());
        // The frame itself is retained and addressable by id.
        assert!(session.frame(Some("abc")).is_some());
    }

    #[test]
    fn frame_falls_back_to_active_dataset() {
        let mut session = Session::new();
        session.insert_dataset("abc".to_string(), "g.csv".to_string(), frame());
        let (id, _) = session.frame(None).expect("active frame");
        assert_eq!(id, "abc");
        assert!(session.frame(Some("missing")).is_none());
    }
}
