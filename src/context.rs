//! Per-run presentation context.
//!
//! A [`PresentationContext`] is created fresh for every analysis run and owned
//! by that run alone. It records who the deck is being explained to, how many
//! slides the deck has, and the themes and concepts detected so far. Slide N's
//! prompt is built from the state left behind by slides 1..N-1, which is why
//! the orchestrator processes slides strictly in order.
//!
//! Sets are `BTreeSet`s: deduplicated, only ever grown by union, and iterated
//! in a stable (sorted) order when flattened into a [`ContextSnapshot`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Audience phrase used when the caller supplies none.
pub const DEFAULT_AUDIENCE: &str = "general audience";

/// Themes and concepts extracted from one slide's analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSignals {
    pub themes: BTreeSet<String>,
    pub concepts: BTreeSet<String>,
}

impl ContextSignals {
    pub fn is_empty(&self) -> bool {
        self.themes.is_empty() && self.concepts.is_empty()
    }
}

/// Mutable context store for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct PresentationContext {
    audience_description: String,
    total_slides: usize,
    themes: BTreeSet<String>,
    concepts: BTreeSet<String>,
}

impl PresentationContext {
    /// Create a context already initialised for a run.
    pub fn new(audience_description: &str, total_slides: usize) -> Self {
        let mut ctx = Self::default();
        ctx.initialize(audience_description, total_slides);
        ctx
    }

    /// Reset every field for a new run.
    ///
    /// Accumulated themes and concepts are discarded, so this must only be
    /// called before the first slide is analysed.
    pub fn initialize(&mut self, audience_description: &str, total_slides: usize) {
        self.audience_description = audience_description.trim().to_string();
        self.total_slides = total_slides;
        self.themes.clear();
        self.concepts.clear();
    }

    /// Union new themes and concepts into the accumulated sets.
    ///
    /// Blank entries are ignored. Returns the number of values that were new.
    pub fn record_analysis_signals<I, J>(&mut self, themes: I, concepts: J) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        let added_themes = union_into(&mut self.themes, themes);
        let added_concepts = union_into(&mut self.concepts, concepts);
        added_themes + added_concepts
    }

    /// Fold parsed [`ContextSignals`] into the store.
    pub fn record_signals(&mut self, signals: &ContextSignals) -> usize {
        self.record_analysis_signals(&signals.themes, &signals.concepts)
    }

    /// Audience as supplied; may be empty.
    pub fn audience_description(&self) -> &str {
        &self.audience_description
    }

    /// Audience with the neutral default substituted for an empty description.
    pub fn effective_audience(&self) -> &str {
        if self.audience_description.is_empty() {
            DEFAULT_AUDIENCE
        } else {
            &self.audience_description
        }
    }

    pub fn total_slides(&self) -> usize {
        self.total_slides
    }

    pub fn themes(&self) -> &BTreeSet<String> {
        &self.themes
    }

    pub fn concepts(&self) -> &BTreeSet<String> {
        &self.concepts
    }

    /// Immutable, serialisable view with the sets flattened to sorted lists.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            audience_description: self.audience_description.clone(),
            total_slides: self.total_slides,
            themes: self.themes.iter().cloned().collect(),
            concepts: self.concepts.iter().cloned().collect(),
        }
    }
}

fn union_into<I>(set: &mut BTreeSet<String>, values: I) -> usize
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    values
        .into_iter()
        .filter_map(|v| {
            let v = v.as_ref().trim();
            (!v.is_empty()).then(|| v.to_string())
        })
        .filter(|v| set.insert(v.clone()))
        .count()
}

/// JSON-serialisable view of a [`PresentationContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub audience_description: String,
    pub total_slides: usize,
    pub themes: Vec<String>,
    pub concepts: Vec<String>,
}

impl ContextSnapshot {
    /// Whether any themes or concepts have been accumulated.
    pub fn has_signals(&self) -> bool {
        !self.themes.is_empty() || !self.concepts.is_empty()
    }
}
