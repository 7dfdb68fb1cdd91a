pub mod allphone;
pub mod explicit;

use std::sync::Arc;

use ndarray::ArrayView1;

use crate::error::SearchError;

pub use allphone::{AllphoneConfig, AllphoneGraph, AllphoneLinguist};
pub use explicit::{ExplicitGraph, ExplicitGraphBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl StateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub type DensityId = usize;

/// An edge of the search graph. All probabilities are log values; the entry
/// score of the target is the source score plus [`Self::log_probability`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchStateArc {
    pub state: StateId,
    pub log_transition: f32,
    pub log_insertion: f32,
    pub log_language: f32,
}

impl SearchStateArc {
    pub fn new(state: StateId, log_transition: f32) -> Self {
        Self {
            state,
            log_transition,
            log_insertion: 0.0,
            log_language: 0.0,
        }
    }

    pub fn log_probability(&self) -> f32 {
        self.log_transition + self.log_insertion + self.log_language
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFlags {
    /// Needs one acoustic score per frame it is occupied.
    pub emitting: bool,
    /// Accepting state.
    pub final_state: bool,
    /// Unit (word) boundary; subject to the word beam.
    pub word: bool,
}

/// The recognized unit a state belongs to. `instance` separates two units
/// that share a name (e.g. context-dependent variants of one phone).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitLabel {
    pub name: Arc<str>,
    pub filler: bool,
    pub instance: u32,
}

/// Read-only search space. Built once per session and shareable across
/// concurrent decodes.
pub trait SearchGraph: Send + Sync {
    fn initial_state(&self) -> StateId;

    fn state_count(&self) -> usize;

    fn flags(&self, state: StateId) -> StateFlags;

    fn successors(&self, state: StateId) -> &[SearchStateArc];

    /// The acoustic distribution an emitting state is tied to.
    fn density(&self, state: StateId) -> Option<DensityId>;

    fn density_count(&self) -> usize;

    fn score_density(&self, density: DensityId, features: ArrayView1<f32>) -> f32;

    fn feature_dimension(&self) -> Option<usize>;

    fn label(&self, state: StateId) -> Option<&UnitLabel>;

    /// Whether word tokens precede the unit tokens they name.
    fn word_token_first(&self) -> bool {
        false
    }
}

/// Provides the search graph. `allocate` does all expensive setup and its
/// failure is fatal for the session.
pub trait Linguist: Send {
    fn allocate(&mut self) -> Result<Arc<dyn SearchGraph>, SearchError>;

    fn start_recognition(&mut self) {}

    fn stop_recognition(&mut self) {}

    fn deallocate(&mut self) {}
}

/// Hands out a graph that was built elsewhere.
pub struct StaticLinguist {
    graph: Arc<dyn SearchGraph>,
}

impl StaticLinguist {
    pub fn new(graph: Arc<dyn SearchGraph>) -> Self {
        Self { graph }
    }
}

impl Linguist for StaticLinguist {
    fn allocate(&mut self) -> Result<Arc<dyn SearchGraph>, SearchError> {
        Ok(Arc::clone(&self.graph))
    }
}
