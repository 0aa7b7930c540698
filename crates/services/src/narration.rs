//! Spoken or otherwise out-of-band rendering of node content.

/// Receives the content of each node the learner enters.
pub trait Narrator: Send + Sync {
    fn speak(&self, text: &str);
}

/// Narrator that says nothing; the default for players.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNarrator;

impl Narrator for SilentNarrator {
    fn speak(&self, _text: &str) {}
}
