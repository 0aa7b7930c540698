use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ids::{ContentAtomId, KnowledgeComponentId};

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Ordered difficulty tiers a content atom can be presented at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
    Challenge,
}

impl DifficultyTier {
    pub const ALL: [DifficultyTier; 4] = [
        DifficultyTier::Easy,
        DifficultyTier::Medium,
        DifficultyTier::Hard,
        DifficultyTier::Challenge,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            DifficultyTier::Easy => 0,
            DifficultyTier::Medium => 1,
            DifficultyTier::Hard => 2,
            DifficultyTier::Challenge => 3,
        }
    }

    /// Next tier up, or `None` at the top.
    #[must_use]
    pub fn harder(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Next tier down, or `None` at the bottom.
    #[must_use]
    pub fn easier(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyTier::Easy => "easy",
            DifficultyTier::Medium => "medium",
            DifficultyTier::Hard => "hard",
            DifficultyTier::Challenge => "challenge",
        }
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── CONTENT ATOM ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomKind {
    Question,
    Explanation,
    Activity,
}

/// A presentable unit of learning content.
///
/// Templates reference parameters as `{name}`. Each parameter lists one value
/// per difficulty tier, easiest first; tiers past the end of the list reuse
/// the last value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAtom {
    pub id: ContentAtomId,
    pub knowledge_component: KnowledgeComponentId,
    pub kind: AtomKind,
    pub difficulty: DifficultyTier,
    pub prompt_template: String,
    #[serde(default)]
    pub answer_template: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub hints: Vec<String>,
    /// Atom this one was adapted from.
    #[serde(default)]
    pub variant_of: Option<ContentAtomId>,
}

impl ContentAtom {
    #[must_use]
    pub fn question(
        id: impl Into<ContentAtomId>,
        knowledge_component: impl Into<KnowledgeComponentId>,
        prompt_template: impl Into<String>,
        answer_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            knowledge_component: knowledge_component.into(),
            kind: AtomKind::Question,
            difficulty: DifficultyTier::Medium,
            prompt_template: prompt_template.into(),
            answer_template: Some(answer_template.into()),
            parameters: BTreeMap::new(),
            hints: Vec::new(),
            variant_of: None,
        }
    }

    #[must_use]
    pub fn at(mut self, difficulty: DifficultyTier) -> Self {
        self.difficulty = difficulty;
        self
    }

    #[must_use]
    pub fn with_parameter<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Id of the authored atom this one descends from (itself if authored).
    #[must_use]
    pub fn root_id(&self) -> &ContentAtomId {
        self.variant_of.as_ref().unwrap_or(&self.id)
    }

    /// Value of a parameter at the given tier.
    #[must_use]
    pub fn parameter_value(&self, name: &str, tier: DifficultyTier) -> Option<&str> {
        let values = self.parameters.get(name)?;
        values
            .get(tier.index())
            .or_else(|| values.last())
            .map(String::as_str)
    }

    #[must_use]
    pub fn render_prompt(&self) -> String {
        self.render(&self.prompt_template)
    }

    #[must_use]
    pub fn render_answer(&self) -> Option<String> {
        self.answer_template.as_deref().map(|t| self.render(t))
    }

    /// Exact comparison against the rendered answer; `None` when the atom
    /// has nothing to grade against.
    #[must_use]
    pub fn check_answer(&self, answer: &str) -> Option<bool> {
        self.render_answer().map(|expected| expected == answer)
    }

    fn render(&self, template: &str) -> String {
        let mut out = template.to_owned();
        for name in self.parameters.keys() {
            if let Some(value) = self.parameter_value(name, self.difficulty) {
                out = out.replace(&format!("{{{name}}}"), value);
            }
        }
        out
    }
}
