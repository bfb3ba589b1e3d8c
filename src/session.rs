//! Sessions
//!
//! A session binds one uploaded dataset to a pipeline and an append-only
//! conversation log. Turns of one session run one at a time behind a turn
//! lock; the log has its own lock, taken only to append a finished turn or
//! to read, so history stays readable while a turn is running.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::dataset::DataTable;
use crate::pipeline::{Pipeline, ResponseArtifact, TurnReport};
use crate::types::AppResult;

/// Logged in place of a question for variable explorations
const EXPLORE_PREFIX: &str = "探索指标：";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum LogEntry {
    User {
        turn_id: Uuid,
        question: String,
        created_at: DateTime<Utc>,
    },
    Assistant {
        turn_id: Uuid,
        artifact: ResponseArtifact,
        created_at: DateTime<Utc>,
    },
}

impl LogEntry {
    pub fn turn_id(&self) -> Uuid {
        match self {
            LogEntry::User { turn_id, .. } | LogEntry::Assistant { turn_id, .. } => *turn_id,
        }
    }
}

/// Grows only; there is no way to rewrite or drop an entry.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
}

impl ConversationLog {
    /// Append the question and every artifact of one turn
    pub fn append_turn(&mut self, turn_id: Uuid, question: &str, artifacts: &[ResponseArtifact]) {
        let created_at = Utc::now();
        self.entries.reserve(artifacts.len() + 1);
        self.entries.push(LogEntry::User {
            turn_id,
            question: question.to_string(),
            created_at,
        });
        self.entries.extend(artifacts.iter().map(|artifact| LogEntry::Assistant {
            turn_id,
            artifact: artifact.clone(),
            created_at,
        }));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub turn_id: Uuid,
    #[serde(flatten)]
    pub report: TurnReport,
}

pub struct Session {
    pub id: Uuid,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    data: Arc<DataTable>,
    pipeline: Arc<Pipeline>,
    turn: Mutex<()>,
    log: Mutex<ConversationLog>,
}

impl Session {
    pub fn new(filename: Option<String>, data: DataTable, pipeline: Arc<Pipeline>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename,
            created_at: Utc::now(),
            data: Arc::new(data),
            pipeline,
            turn: Mutex::new(()),
            log: Mutex::new(ConversationLog::default()),
        }
    }

    pub fn data(&self) -> &DataTable {
        &self.data
    }

    /// Model answering this session's turns
    pub fn model(&self) -> &str {
        self.pipeline.model()
    }

    /// Run one turn. A second question on the same session waits until
    /// this one has been logged.
    pub async fn ask(&self, question: &str) -> Turn {
        let _turn = self.turn.lock().await;
        let turn_id = Uuid::new_v4();
        info!(session_id = %self.id, turn_id = %turn_id, "Session turn started");

        let report = self.pipeline.run_turn(&self.data, question).await;
        self.log.lock().await.append_turn(turn_id, question, &report.artifacts);

        Turn { turn_id, report }
    }

    /// Chart and trend narrative of one column, logged like a question.
    /// An unknown or non-numeric column is rejected without a log entry.
    pub async fn explore(&self, variable: &str) -> AppResult<Turn> {
        let _turn = self.turn.lock().await;
        let report = self.pipeline.explore_variable(&self.data, variable).await?;

        let turn_id = Uuid::new_v4();
        let question = format!("{}{}", EXPLORE_PREFIX, variable.trim());
        self.log.lock().await.append_turn(turn_id, &question, &report.artifacts);
        info!(session_id = %self.id, turn_id = %turn_id, "Variable explored");

        Ok(Turn { turn_id, report })
    }

    pub async fn messages(&self) -> Vec<LogEntry> {
        self.log.lock().await.entries().to_vec()
    }
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
}

impl SessionRegistry {
    pub async fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let mut guard = self.inner.write().await;
        guard.insert(session.id, session.clone());
        session
    }

    pub async fn get(&self, session_id: &Uuid) -> Option<Arc<Session>> {
        let guard = self.inner.read().await;
        guard.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompts::{DEPTH_TAG, INTENT_TAG};
    use crate::config::PipelineConfig;
    use crate::query::{QueryMode, QueryOutcome};
    use crate::testing::{revenue_table, ScriptedLLM, ScriptedQueryAgent};
    use std::time::Duration;

    fn session(delay: Duration) -> Session {
        let llm = Arc::new(
            ScriptedLLM::new()
                .on(INTENT_TAG, "narrative")
                .on(DEPTH_TAG, "simple_lookup"),
        );
        let agent = Arc::new(
            ScriptedQueryAgent::new()
                .on(
                    "最高",
                    QueryMode::Direct,
                    QueryOutcome::Text {
                        text: "5月1日".to_string(),
                    },
                )
                .on(
                    "最低",
                    QueryMode::Direct,
                    QueryOutcome::Text {
                        text: "3月1日".to_string(),
                    },
                )
                .with_delay(delay),
        );
        let pipeline = Pipeline::new(llm.llm(), agent, PipelineConfig::default());
        Session::new(Some("revenue.csv".to_string()), revenue_table(), Arc::new(pipeline))
    }

    #[tokio::test]
    async fn test_turn_is_logged_after_completion() {
        let session = session(Duration::ZERO);

        let turn = session.ask("哪天总收入最高？").await;
        assert_eq!(turn.report.artifacts.len(), 1);

        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], LogEntry::User { question, .. } if question == "哪天总收入最高？"));
        assert!(matches!(&messages[1], LogEntry::Assistant { .. }));
        assert!(messages.iter().all(|m| m.turn_id() == turn.turn_id));
    }

    #[tokio::test]
    async fn test_concurrent_turns_do_not_interleave() {
        let session = Arc::new(session(Duration::from_millis(20)));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.ask("哪天总收入最高？").await })
        };
        let second = {
            let session = session.clone();
            tokio::spawn(async move { session.ask("哪天总收入最低？").await })
        };
        first.await.unwrap();
        second.await.unwrap();

        let messages = session.messages().await;
        assert_eq!(messages.len(), 4);
        // Each turn's question is directly followed by its own answer
        assert_eq!(messages[0].turn_id(), messages[1].turn_id());
        assert_eq!(messages[2].turn_id(), messages[3].turn_id());
        assert_ne!(messages[0].turn_id(), messages[2].turn_id());
    }

    #[tokio::test]
    async fn test_history_readable_during_turn() {
        let session = Arc::new(session(Duration::from_millis(300)));
        session.ask("哪天总收入最高？").await;

        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.ask("哪天总收入最低？").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Only the finished turn is visible, and reading does not wait for the running one
        let messages = tokio::time::timeout(Duration::from_millis(100), session.messages())
            .await
            .expect("history read blocked by running turn");
        assert_eq!(messages.len(), 2);

        running.await.unwrap();
        assert_eq!(session.messages().await.len(), 4);
    }

    #[tokio::test]
    async fn test_log_accumulates_across_turns() {
        let session = session(Duration::ZERO);
        session.ask("哪天总收入最高？").await;
        session.ask("哪天总收入最低？").await;
        assert_eq!(session.messages().await.len(), 4);
    }

    #[tokio::test]
    async fn test_exploration_is_logged() {
        let session = session(Duration::ZERO);

        assert!(session.explore("利润").await.is_err());
        assert!(session.messages().await.is_empty());

        let turn = session.explore("DAU").await.unwrap();
        let messages = session.messages().await;
        assert_eq!(messages.len(), 1 + turn.report.artifacts.len());
        assert!(matches!(&messages[0], LogEntry::User { question, .. } if question == "探索指标：DAU"));
    }

    #[tokio::test]
    async fn test_registry_round_trip() {
        let registry = SessionRegistry::default();
        let stored = registry.insert(session(Duration::ZERO)).await;

        let found = registry.get(&stored.id).await.unwrap();
        assert_eq!(found.filename.as_deref(), Some("revenue.csv"));
        assert_eq!(found.data().row_count(), 4);
        assert_eq!(found.model(), "scripted-model");
        assert!(registry.get(&Uuid::new_v4()).await.is_none());
        assert_eq!(registry.len().await, 1);
    }
}
