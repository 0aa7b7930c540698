use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{NodeId, ScenarioId, SessionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    #[must_use]
    pub fn is_closed(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// Latest answer recorded for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResponse {
    pub answer: String,
    pub correct: bool,
    /// Submissions made on this node so far, including this one.
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
    /// Set once the node's score award has been granted.
    #[serde(default)]
    pub scored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionProgress {
    pub percent_complete: u8,
    pub nodes_completed: usize,
    pub score: i64,
}

/// One learner's walk through a scenario graph.
///
/// Mutated only through [`crate::engine::ScenarioEngine`] and
/// [`crate::evaluation::AnswerEvaluator`]; the fields are public for
/// persistence and read-side views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSession {
    pub id: SessionId,
    pub scenario_id: ScenarioId,
    pub user_id: Option<UserId>,
    pub current_node_id: NodeId,
    pub visited_nodes: Vec<NodeId>,
    pub responses: BTreeMap<NodeId, NodeResponse>,
    /// Answers chosen but not yet submitted.
    #[serde(default)]
    pub selections: BTreeMap<NodeId, String>,
    pub progress: SessionProgress,
    #[serde(default)]
    pub resources: BTreeMap<String, i64>,
    #[serde(default)]
    pub flags: BTreeSet<String>,
    pub total_nodes: usize,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
}

impl ScenarioSession {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    #[must_use]
    pub fn response(&self, node_id: &NodeId) -> Option<&NodeResponse> {
        self.responses.get(node_id)
    }

    #[must_use]
    pub fn score(&self) -> i64 {
        self.progress.score
    }

    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    #[must_use]
    pub fn resource(&self, name: &str) -> i64 {
        self.resources.get(name).copied().unwrap_or(0)
    }

    /// Recompute progress counters from the visited list.
    ///
    /// Revisits in cyclic scenarios can push the ratio past 1, so the
    /// percentage is clamped to 100.
    pub(crate) fn recompute_progress(&mut self) {
        self.progress.nodes_completed = self.visited_nodes.len();
        self.progress.percent_complete =
            percent_of(self.progress.nodes_completed, self.total_nodes);
    }
}

fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    // Node counts are small; the f64 round-trip is exact at these sizes.
    #[allow(clippy::cast_precision_loss)]
    let ratio = done as f64 / total as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (ratio * 100.0).round().min(100.0) as u8;
    percent
}
