use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::durations::{DurationError, Durations};
use crate::key::{KEY_COUNT, Key};
use crate::profiles::{KeyProfile, ProfileError};
use crate::scorer;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FinderError {
    #[error("Key profile error: {0}")]
    Profile(#[from] ProfileError),
    #[error("Modulation penalty must be in (0, 1], got {0}")]
    Penalty(f64),
    #[error("Modulation tolerance must be in [0, 1], got {0}")]
    Tolerance(f64),
    #[error("At least one key profile is required")]
    NoProfiles,
    #[error("Profile '{profile}' has overrides under both '{first}' and '{second}'")]
    DuplicateOverride {
        profile: String,
        first: String,
        second: String,
    },
}

/// Tuning knobs of one trellis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinderSettings {
    /// Weight applied to an observation when the path changes key; 1.0 means
    /// changing key costs nothing.
    pub penalty: f64,
    /// Minimum share of the winning path a key needs to be reported.
    pub modulation_tolerance: f64,
    /// Reduce every segment to pitch-class presence before scoring.
    pub flatten: bool,
}

impl FinderSettings {
    pub fn new(penalty: f64, modulation_tolerance: f64, flatten: bool) -> Self {
        Self {
            penalty,
            modulation_tolerance,
            flatten,
        }
    }

    pub fn validate(&self) -> Result<(), FinderError> {
        if !(self.penalty > 0.0 && self.penalty <= 1.0) {
            return Err(FinderError::Penalty(self.penalty));
        }
        if !(0.0..=1.0).contains(&self.modulation_tolerance) {
            return Err(FinderError::Tolerance(self.modulation_tolerance));
        }
        Ok(())
    }
}

/// Position of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub generation: usize,
    pub key: usize,
}

/// Best path ending at one generation while attributed to `key`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub key: Key,
    pub score: f64,
    pub parent: Option<NodeRef>,
}

type Generation = [Node; KEY_COUNT];

fn root_generation() -> Generation {
    std::array::from_fn(|i| Node {
        key: Key::new(i).expect("index below KEY_COUNT"),
        score: 0.0,
        parent: None,
    })
}

/// A maximal run of consecutive segments attributed to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeySpan {
    pub key: Key,
    /// Index of the first non-silent segment in the run.
    pub start: usize,
    pub len: usize,
}

/// The winning path moving from one detected key to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Modulation {
    /// Index of the first non-silent segment in the new key.
    pub segment: usize,
    pub from: Key,
    pub to: Key,
}

/// Dynamic-programming key finder over 24 competing key hypotheses.
///
/// Every non-silent segment appends a generation of 24 nodes to an arena.
/// Node `j` of a new generation extends whichever current leaf maximizes
/// `leaf.score + scores[j] * (1 if leaf stays in key j else penalty)`.
/// The arena is never pruned, so any path can be walked back to the roots.
#[derive(Debug, Clone)]
pub struct TrellisKeyFinder {
    profile: KeyProfile,
    settings: FinderSettings,
    generations: Vec<Generation>,
}

impl TrellisKeyFinder {
    pub fn new(profile: KeyProfile, settings: FinderSettings) -> Result<Self, FinderError> {
        settings.validate()?;
        Ok(Self {
            profile,
            settings,
            generations: vec![root_generation()],
        })
    }

    /// Build from raw templates, validating them like any other profile.
    pub fn from_templates(
        name: &str,
        major: &[f64],
        minor: &[f64],
        settings: FinderSettings,
    ) -> Result<Self, FinderError> {
        Self::new(KeyProfile::new(name, major, minor)?, settings)
    }

    pub fn profile(&self) -> &KeyProfile {
        &self.profile
    }

    pub fn settings(&self) -> &FinderSettings {
        &self.settings
    }

    /// Current leaves, indexed by key.
    pub fn leaves(&self) -> &[Node; KEY_COUNT] {
        self.generations.last().expect("arena always holds the root generation")
    }

    /// Number of non-silent segments inserted so far.
    pub fn segments(&self) -> usize {
        self.generations.len() - 1
    }

    /// Validate and insert one segment. Invalid input leaves the trellis untouched.
    pub fn insert_durations(&mut self, weights: &[f64]) -> Result<(), DurationError> {
        let durations = Durations::try_from(weights)?;
        self.insert(&durations);
        Ok(())
    }

    /// Advance the trellis by one segment. Silent segments are skipped.
    pub fn insert(&mut self, durations: &Durations) {
        if durations.is_silent() {
            return;
        }

        let scores = scorer::score_segment(durations, &self.profile, self.settings.flatten);
        let parent_generation = self.generations.len() - 1;
        let leaves = self.leaves();

        let next: Generation = std::array::from_fn(|j| {
            let candidates: [f64; KEY_COUNT] = std::array::from_fn(|i| {
                let weight = if i == j { 1.0 } else { self.settings.penalty };
                leaves[i].score + scores[j] * weight
            });
            let parent = choose_parent(leaves, &candidates);
            Node {
                key: leaves[j].key,
                score: candidates[parent],
                parent: Some(NodeRef {
                    generation: parent_generation,
                    key: parent,
                }),
            }
        });

        log::trace!(
            "{}: generation {} best leaf {:?}",
            self.profile.name(),
            parent_generation + 1,
            best_leaf(&next).key
        );
        self.generations.push(next);
    }

    fn node(&self, at: NodeRef) -> &Node {
        &self.generations[at.generation][at.key]
    }

    /// Keys along the winning path, in segment order.
    ///
    /// The winning leaf is the highest-scoring one, lowest key index on ties.
    pub fn winning_path(&self) -> Vec<Key> {
        let mut path = Vec::with_capacity(self.segments());
        let mut node = best_leaf(self.leaves());
        while let Some(parent) = node.parent {
            path.push(node.key);
            node = self.node(parent);
        }
        path.reverse();
        path
    }

    /// How many segments of the winning path each key holds.
    pub fn key_counts(&self) -> [usize; KEY_COUNT] {
        let mut counts = [0; KEY_COUNT];
        for key in self.winning_path() {
            counts[key.index()] += 1;
        }
        counts
    }

    /// Keys holding at least `modulation_tolerance` of the winning path.
    /// Empty until a non-silent segment has been inserted.
    pub fn results(&self) -> BTreeSet<Key> {
        let counts = self.key_counts();
        let total: usize = counts.iter().sum();
        if total == 0 {
            return BTreeSet::new();
        }

        let keys: BTreeSet<Key> = Key::all()
            .filter(|k| {
                let count = counts[k.index()];
                count > 0 && count as f64 / total as f64 >= self.settings.modulation_tolerance
            })
            .collect();

        log::debug!(
            "{}: {} segments, detected {}",
            self.profile.name(),
            total,
            crate::key::describe(&keys)
        );
        keys
    }

    /// Runs of the winning path, in segment order.
    pub fn key_spans(&self) -> Vec<KeySpan> {
        let mut spans: Vec<KeySpan> = Vec::new();
        for (segment, key) in self.winning_path().into_iter().enumerate() {
            if let Some(span) = spans.last_mut().filter(|s| s.key == key) {
                span.len += 1;
                continue;
            }
            spans.push(KeySpan {
                key,
                start: segment,
                len: 1,
            });
        }
        spans
    }

    /// Changes between detected keys along the winning path. Excursions into
    /// keys below the tolerance are ignored.
    pub fn modulations(&self) -> Vec<Modulation> {
        let detected = self.results();
        let mut modulations = Vec::new();
        let mut current: Option<Key> = None;

        for span in self.key_spans() {
            if !detected.contains(&span.key) {
                continue;
            }
            match current {
                Some(from) if from != span.key => modulations.push(Modulation {
                    segment: span.start,
                    from,
                    to: span.key,
                }),
                _ => {}
            }
            current = Some(span.key);
        }
        modulations
    }
}

/// Highest-scoring node, lowest key index on ties.
fn best_leaf(leaves: &Generation) -> &Node {
    let mut best = &leaves[0];
    for node in &leaves[1..] {
        if node.score > best.score {
            best = node;
        }
    }
    best
}

/// Pick the parent for one new node.
///
/// Every leaf whose candidate reaches the maximum contends. The contender
/// with the highest cumulative score of its own wins; the lowest key index
/// settles what is left.
fn choose_parent(leaves: &Generation, candidates: &[f64; KEY_COUNT]) -> usize {
    let max = candidates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut chosen: Option<usize> = None;
    for (i, &candidate) in candidates.iter().enumerate() {
        if candidate < max {
            continue;
        }
        match chosen {
            Some(c) if leaves[i].score <= leaves[c].score => {}
            _ => chosen = Some(i),
        }
    }
    chosen.unwrap_or(0)
}
