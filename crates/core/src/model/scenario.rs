use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{KnowledgeComponentId, NodeId, ScenarioId};

/// Well-known outcome keys on node connections.
///
/// Authors may use any other key for decision branches.
pub mod outcome {
    pub const NEXT: &str = "next";
    pub const CORRECT: &str = "correct";
    pub const INCORRECT: &str = "incorrect";
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A scenario definition references content that does not exist.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("scenario {scenario} has no nodes")]
    Empty { scenario: ScenarioId },

    #[error("scenario {scenario} entry node {entry} does not exist")]
    MissingEntryNode { scenario: ScenarioId, entry: NodeId },

    #[error("node {node} connection {outcome:?} targets unknown node {target}")]
    DanglingConnection {
        node: NodeId,
        outcome: String,
        target: NodeId,
    },

    #[error("node {0} is defined more than once")]
    DuplicateNode(NodeId),
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub value: String,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

impl AnswerOption {
    #[must_use]
    pub fn new(value: impl Into<String>, text: impl Into<String>, correct: bool) -> Self {
        Self {
            value: value.into(),
            text: text.into(),
            correct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    /// Skill this question exercises, if it feeds mastery tracking.
    #[serde(default)]
    pub knowledge_component: Option<KnowledgeComponentId>,
}

impl Question {
    /// Exact value comparison; no normalisation or fuzzy matching.
    #[must_use]
    pub fn is_correct(&self, answer: &str) -> bool {
        answer == self.correct_answer
    }

    /// Free-text questions (no options) accept any answer value.
    #[must_use]
    pub fn accepts(&self, answer: &str) -> bool {
        self.options.is_empty() || self.options.iter().any(|o| o.value == answer)
    }
}

//
// ─── EFFECTS ───────────────────────────────────────────────────────────────────
//

/// State changes applied when a session enters a node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeEffects {
    pub score: i64,
    pub resources: BTreeMap<String, i64>,
    pub set_flags: BTreeSet<String>,
    pub clear_flags: BTreeSet<String>,
}

impl NodeEffects {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.score == 0
            && self.resources.is_empty()
            && self.set_flags.is_empty()
            && self.clear_flags.is_empty()
    }
}

//
// ─── NODES ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioNode {
    pub id: NodeId,
    pub content: String,
    #[serde(default)]
    pub question: Option<Question>,
    #[serde(default)]
    pub effects: NodeEffects,
    /// Outcome key to target node. `None` marks an explicit end of the walk.
    #[serde(default)]
    pub connections: BTreeMap<String, Option<NodeId>>,
}

impl ScenarioNode {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            question: None,
            effects: NodeEffects::default(),
            connections: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_question(mut self, question: Question) -> Self {
        self.question = Some(question);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: NodeEffects) -> Self {
        self.effects = effects;
        self
    }

    #[must_use]
    pub fn connect(mut self, outcome: impl Into<String>, target: Option<&str>) -> Self {
        self.connections
            .insert(outcome.into(), target.map(NodeId::new));
        self
    }

    /// A node without any connection ends the scenario whatever the outcome.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.connections.is_empty()
    }

    #[must_use]
    pub fn connection(&self, outcome: &str) -> Option<&Option<NodeId>> {
        self.connections.get(outcome)
    }
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// Serialized shape of a scenario: nodes as an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDocument {
    pub id: ScenarioId,
    pub title: String,
    pub entry_node_id: NodeId,
    pub nodes: Vec<ScenarioNode>,
}

/// Immutable node graph for one scenario, indexed by node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScenarioDocument", into = "ScenarioDocument")]
pub struct ScenarioDefinition {
    id: ScenarioId,
    title: String,
    entry_node_id: NodeId,
    nodes: HashMap<NodeId, ScenarioNode>,
}

impl ScenarioDefinition {
    /// Index nodes by id without checking references.
    ///
    /// Prefer [`ScenarioDefinition::load`] for authored content; this
    /// constructor exists for definitions assembled in code.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::Empty` for an empty node list and
    /// `DefinitionError::DuplicateNode` when two nodes share an id.
    pub fn new(
        id: impl Into<ScenarioId>,
        title: impl Into<String>,
        entry_node_id: impl Into<NodeId>,
        nodes: Vec<ScenarioNode>,
    ) -> Result<Self, DefinitionError> {
        let id = id.into();
        if nodes.is_empty() {
            return Err(DefinitionError::Empty { scenario: id });
        }

        let mut indexed = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if indexed.contains_key(&node.id) {
                return Err(DefinitionError::DuplicateNode(node.id));
            }
            indexed.insert(node.id.clone(), node);
        }

        Ok(Self {
            id,
            title: title.into(),
            entry_node_id: entry_node_id.into(),
            nodes: indexed,
        })
    }

    /// Build and fully validate a definition from its document form.
    ///
    /// # Errors
    ///
    /// Returns any `DefinitionError` from indexing or reference checks.
    pub fn load(document: ScenarioDocument) -> Result<Self, DefinitionError> {
        let definition = Self::new(
            document.id,
            document.title,
            document.entry_node_id,
            document.nodes,
        )?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check that the entry node and every connection target exist.
    ///
    /// Nodes are checked in id order so the reported error is stable.
    ///
    /// # Errors
    ///
    /// Returns `MissingEntryNode` or the first `DanglingConnection`.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !self.nodes.contains_key(&self.entry_node_id) {
            return Err(DefinitionError::MissingEntryNode {
                scenario: self.id.clone(),
                entry: self.entry_node_id.clone(),
            });
        }

        let mut ids: Vec<&NodeId> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            let node = &self.nodes[id];
            for (outcome, target) in &node.connections {
                if let Some(target) = target {
                    if !self.nodes.contains_key(target) {
                        return Err(DefinitionError::DanglingConnection {
                            node: node.id.clone(),
                            outcome: outcome.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &ScenarioId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn entry_node_id(&self) -> &NodeId {
        &self.entry_node_id
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&ScenarioNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.nodes.len()
    }
}

impl TryFrom<ScenarioDocument> for ScenarioDefinition {
    type Error = DefinitionError;

    fn try_from(document: ScenarioDocument) -> Result<Self, Self::Error> {
        Self::load(document)
    }
}

impl From<ScenarioDefinition> for ScenarioDocument {
    fn from(definition: ScenarioDefinition) -> Self {
        let mut nodes: Vec<ScenarioNode> = definition.nodes.into_values().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            id: definition.id,
            title: definition.title,
            entry_node_id: definition.entry_node_id,
            nodes,
        }
    }
}
