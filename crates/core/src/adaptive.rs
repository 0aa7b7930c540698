//! Mid-session difficulty stepping for content atoms.
//!
//! The stepper looks only at the rolling window of the atom currently being
//! practised. Rules are checked in a fixed order and the first match wins,
//! so struggling always takes precedence over a fast streak.

use std::collections::VecDeque;

use crate::model::{ContentAtom, ContentAtomId, DifficultyTier};
use crate::policy::AdaptivePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomInteraction {
    pub correct: bool,
    pub response_time_ms: u64,
    pub hints_used: u32,
}

/// Most recent interactions with a single content atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionWindow {
    atom_id: ContentAtomId,
    capacity: usize,
    entries: VecDeque<AtomInteraction>,
}

impl InteractionWindow {
    #[must_use]
    pub fn new(atom_id: ContentAtomId, capacity: usize) -> Self {
        Self {
            atom_id,
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    #[must_use]
    pub fn atom_id(&self) -> &ContentAtomId {
        &self.atom_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, interaction: AtomInteraction) {
        self.entries.push_back(interaction);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Drop all entries, keeping the atom binding.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Rebind the window to a different atom.
    pub fn reset_for(&mut self, atom_id: ContentAtomId) {
        self.atom_id = atom_id;
        self.entries.clear();
    }

    /// The newest `n` entries, or `None` when fewer have been recorded.
    fn latest(&self, n: usize) -> Option<impl Iterator<Item = &AtomInteraction>> {
        if n == 0 || self.entries.len() < n {
            return None;
        }
        Some(self.entries.iter().skip(self.entries.len() - n))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Escalate,
    Deescalate,
}

/// Named adaptation rules, each parameterised by [`AdaptivePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationRule {
    /// The last `deescalate_after_incorrect` answers were all wrong.
    StruggleStreak,
    /// The last `hint_reliance_window` answers each needed at least
    /// `hint_reliance_threshold` hints.
    HintReliance,
    /// The last `escalate_after_correct` answers were correct, hint-free and
    /// no slower than `fast_response_ms`.
    FastCorrectStreak,
}

impl AdaptationRule {
    pub const EVALUATION_ORDER: [AdaptationRule; 3] = [
        AdaptationRule::StruggleStreak,
        AdaptationRule::HintReliance,
        AdaptationRule::FastCorrectStreak,
    ];

    #[must_use]
    pub fn direction(self) -> Direction {
        match self {
            AdaptationRule::StruggleStreak | AdaptationRule::HintReliance => Direction::Deescalate,
            AdaptationRule::FastCorrectStreak => Direction::Escalate,
        }
    }

    #[must_use]
    pub fn matches(self, window: &InteractionWindow, policy: &AdaptivePolicy) -> bool {
        match self {
            AdaptationRule::StruggleStreak => window
                .latest(policy.deescalate_after_incorrect)
                .is_some_and(|mut recent| recent.all(|i| !i.correct)),
            AdaptationRule::HintReliance => window
                .latest(policy.hint_reliance_window)
                .is_some_and(|mut recent| {
                    recent.all(|i| i.hints_used >= policy.hint_reliance_threshold)
                }),
            AdaptationRule::FastCorrectStreak => window
                .latest(policy.escalate_after_correct)
                .is_some_and(|mut recent| {
                    recent.all(|i| {
                        i.correct && i.hints_used == 0 && i.response_time_ms <= policy.fast_response_ms
                    })
                }),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AdaptationRule::StruggleStreak => "struggle_streak",
            AdaptationRule::HintReliance => "hint_reliance",
            AdaptationRule::FastCorrectStreak => "fast_correct_streak",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentModification {
    Difficulty {
        from: DifficultyTier,
        to: DifficultyTier,
    },
    Parameter {
        name: String,
        from: String,
        to: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationDecision {
    pub should_adapt: bool,
    pub new_difficulty: Option<DifficultyTier>,
    pub reason: Option<AdaptationRule>,
    pub content_modifications: Vec<ContentModification>,
}

impl AdaptationDecision {
    #[must_use]
    pub fn keep() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdaptiveStepper {
    policy: AdaptivePolicy,
}

impl AdaptiveStepper {
    #[must_use]
    pub fn new(policy: AdaptivePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &AdaptivePolicy {
        &self.policy
    }

    /// Decide whether the next presentation of `atom` should change tier.
    ///
    /// A window bound to a different atom, or a rule pointing past the
    /// easiest/hardest tier, yields a "keep" decision.
    #[must_use]
    pub fn decide(&self, atom: &ContentAtom, window: &InteractionWindow) -> AdaptationDecision {
        if window.atom_id() != atom.root_id() {
            return AdaptationDecision::keep();
        }

        let Some(rule) = AdaptationRule::EVALUATION_ORDER
            .into_iter()
            .find(|rule| rule.matches(window, &self.policy))
        else {
            return AdaptationDecision::keep();
        };

        let target = match rule.direction() {
            Direction::Escalate => atom.difficulty.harder(),
            Direction::Deescalate => atom.difficulty.easier(),
        };
        let Some(target) = target else {
            return AdaptationDecision::keep();
        };

        let mut content_modifications = vec![ContentModification::Difficulty {
            from: atom.difficulty,
            to: target,
        }];
        for name in atom.parameters.keys() {
            let from = atom.parameter_value(name, atom.difficulty);
            let to = atom.parameter_value(name, target);
            if let (Some(from), Some(to)) = (from, to) {
                if from != to {
                    content_modifications.push(ContentModification::Parameter {
                        name: name.clone(),
                        from: from.to_owned(),
                        to: to.to_owned(),
                    });
                }
            }
        }

        AdaptationDecision {
            should_adapt: true,
            new_difficulty: Some(target),
            reason: Some(rule),
            content_modifications,
        }
    }

    /// Build the adapted copy of `atom` described by `decision`.
    ///
    /// The source atom is never modified. Returns `None` for a "keep" decision.
    #[must_use]
    pub fn synthesize_variant(
        &self,
        atom: &ContentAtom,
        decision: &AdaptationDecision,
    ) -> Option<ContentAtom> {
        if !decision.should_adapt {
            return None;
        }
        let tier = decision.new_difficulty?;
        let root = atom.root_id().clone();

        let mut variant = atom.clone();
        variant.id = ContentAtomId::new(format!("{root}@{tier}"));
        variant.difficulty = tier;
        variant.variant_of = Some(root);
        Some(variant)
    }
}
