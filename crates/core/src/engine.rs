//! Walks a learner through a scenario graph.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    DefinitionError, NodeEffects, NodeId, NodeResponse, ScenarioDefinition, ScenarioNode,
    ScenarioSession, SessionId, SessionProgress, SessionStatus, UserId, outcome,
};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A transition could not be applied. The session is left unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransitionError {
    #[error("node {from} leads to unknown node {target}")]
    DanglingTarget { from: NodeId, target: NodeId },

    #[error("node {0} is not part of this scenario")]
    UnknownNode(NodeId),

    #[error("session belongs to scenario {session}, not {scenario}")]
    ScenarioMismatch { session: String, scenario: String },

    #[error("session is {0:?} and accepts no further changes")]
    SessionClosed(SessionStatus),
}

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Moved { from: NodeId, to: NodeId },
    /// The walk ended on `at`.
    Completed { at: NodeId },
    /// The current node has no connection for the outcome; nothing changed.
    Stalled { at: NodeId, outcome: String },
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Stateless rules for moving a [`ScenarioSession`] through one definition.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioEngine<'a> {
    scenario: &'a ScenarioDefinition,
}

impl<'a> ScenarioEngine<'a> {
    #[must_use]
    pub fn new(scenario: &'a ScenarioDefinition) -> Self {
        Self { scenario }
    }

    /// Open a session on the entry node and apply its effects.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::MissingEntryNode` if the entry node does not exist.
    pub fn start(
        &self,
        session_id: SessionId,
        user_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<ScenarioSession, DefinitionError> {
        let entry_id = self.scenario.entry_node_id();
        let entry = self
            .scenario
            .node(entry_id)
            .ok_or_else(|| DefinitionError::MissingEntryNode {
                scenario: self.scenario.id().clone(),
                entry: entry_id.clone(),
            })?;

        let mut session = ScenarioSession {
            id: session_id,
            scenario_id: self.scenario.id().clone(),
            user_id,
            current_node_id: entry.id.clone(),
            visited_nodes: Vec::new(),
            responses: Default::default(),
            selections: Default::default(),
            progress: SessionProgress::default(),
            resources: Default::default(),
            flags: Default::default(),
            total_nodes: self.scenario.total_nodes(),
            started_at: now,
            last_active_at: now,
            ended_at: None,
            status: SessionStatus::Active,
        };
        apply_effects(&mut session, &entry.effects);
        session.recompute_progress();
        Ok(session)
    }

    /// The node the session currently sits on.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::UnknownNode` when a restored session points
    /// at a node the definition no longer has.
    pub fn current_node(&self, session: &ScenarioSession) -> Result<&'a ScenarioNode, TransitionError> {
        self.scenario
            .node(&session.current_node_id)
            .ok_or_else(|| TransitionError::UnknownNode(session.current_node_id.clone()))
    }

    /// Move directly to `next`, marking the current node visited.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::DanglingTarget` if `next` is not in the
    /// scenario, or `SessionClosed` for a finished session. The session is not
    /// modified on error.
    pub fn advance(
        &self,
        session: &mut ScenarioSession,
        next: &NodeId,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        self.ensure_open(session)?;
        let target = self
            .scenario
            .node(next)
            .ok_or_else(|| TransitionError::DanglingTarget {
                from: session.current_node_id.clone(),
                target: next.clone(),
            })?;

        let from = std::mem::replace(&mut session.current_node_id, target.id.clone());
        session.visited_nodes.push(from.clone());
        apply_effects(session, &target.effects);
        session.recompute_progress();
        session.last_active_at = now;

        Ok(Transition::Moved {
            from,
            to: target.id.clone(),
        })
    }

    /// Follow the current node's connection for `outcome_key`.
    ///
    /// Resolution order: a node without connections ends the walk; an exact
    /// key match is used next, then the `next` connection. An explicit `null`
    /// target ends the walk. When nothing matches the session stalls in place.
    ///
    /// # Errors
    ///
    /// Same as [`ScenarioEngine::advance`], plus `UnknownNode` when the
    /// current node has vanished from the definition.
    pub fn follow(
        &self,
        session: &mut ScenarioSession,
        outcome_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        self.ensure_open(session)?;
        let node = self.current_node(session)?;

        if node.is_terminal() {
            return Ok(complete(session, now));
        }

        let resolved = node
            .connection(outcome_key)
            .or_else(|| node.connection(outcome::NEXT));

        match resolved {
            Some(Some(target)) => self.advance(session, target, now),
            Some(None) => Ok(complete(session, now)),
            None => Ok(Transition::Stalled {
                at: node.id.clone(),
                outcome: outcome_key.to_owned(),
            }),
        }
    }

    /// Upsert the response for `node_id`, accumulating attempts.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode` for ids outside the scenario and `SessionClosed`
    /// for finished sessions.
    pub fn record_response<'s>(
        &self,
        session: &'s mut ScenarioSession,
        node_id: &NodeId,
        answer: &str,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<&'s NodeResponse, TransitionError> {
        self.ensure_open(session)?;
        if !self.scenario.contains(node_id) {
            return Err(TransitionError::UnknownNode(node_id.clone()));
        }

        let (prior_attempts, scored) = session
            .responses
            .get(node_id)
            .map_or((0, false), |r| (r.attempts, r.scored));

        session.selections.remove(node_id);
        session.last_active_at = now;
        session.responses.insert(
            node_id.clone(),
            NodeResponse {
                answer: answer.to_owned(),
                correct,
                attempts: prior_attempts.saturating_add(1),
                timestamp: now,
                scored,
            },
        );
        Ok(&session.responses[node_id])
    }

    /// Remember a pending choice for `node_id`.
    ///
    /// Returns the previous selection when this replaces a different one,
    /// i.e. when the learner revised their answer before submitting.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode` or `SessionClosed`.
    pub fn select_answer(
        &self,
        session: &mut ScenarioSession,
        node_id: &NodeId,
        answer: &str,
    ) -> Result<Option<String>, TransitionError> {
        self.ensure_open(session)?;
        if !self.scenario.contains(node_id) {
            return Err(TransitionError::UnknownNode(node_id.clone()));
        }
        let previous = session
            .selections
            .insert(node_id.clone(), answer.to_owned());
        Ok(previous.filter(|p| p != answer))
    }

    /// End the session early.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session already ended.
    pub fn abandon(
        &self,
        session: &mut ScenarioSession,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_open(session)?;
        session.status = SessionStatus::Abandoned;
        session.ended_at = Some(now);
        session.last_active_at = now;
        Ok(())
    }

    fn ensure_open(&self, session: &ScenarioSession) -> Result<(), TransitionError> {
        if session.status.is_closed() {
            return Err(TransitionError::SessionClosed(session.status));
        }
        if &session.scenario_id != self.scenario.id() {
            return Err(TransitionError::ScenarioMismatch {
                session: session.scenario_id.to_string(),
                scenario: self.scenario.id().to_string(),
            });
        }
        Ok(())
    }
}

fn complete(session: &mut ScenarioSession, now: DateTime<Utc>) -> Transition {
    let at = session.current_node_id.clone();
    session.visited_nodes.push(at.clone());
    session.recompute_progress();
    session.status = SessionStatus::Completed;
    session.ended_at = Some(now);
    session.last_active_at = now;
    Transition::Completed { at }
}

fn apply_effects(session: &mut ScenarioSession, effects: &NodeEffects) {
    if effects.is_empty() {
        return;
    }
    session.progress.score = session.progress.score.saturating_add(effects.score);
    for (name, delta) in &effects.resources {
        let value = session.resources.entry(name.clone()).or_insert(0);
        *value = value.saturating_add(*delta);
    }
    for flag in &effects.set_flags {
        session.flags.insert(flag.clone());
    }
    for flag in &effects.clear_flags {
        session.flags.remove(flag);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
