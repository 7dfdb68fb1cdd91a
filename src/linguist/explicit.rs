use std::collections::HashMap;
use std::sync::Arc;

use ndarray::ArrayView1;

use super::{DensityId, SearchGraph, SearchStateArc, StateFlags, StateId, UnitLabel};
use crate::acoustic::looks_like_filler;
use crate::error::SearchError;
use crate::logmath::LOG_ZERO;

#[derive(Debug, Clone)]
struct ExplicitState {
    flags: StateFlags,
    density: Option<DensityId>,
    label: Option<UnitLabel>,
}

/// A fully materialized graph whose emitting states read their log-likelihood
/// straight out of the feature frame: state tied to column `c` scores
/// `frame[c]`. Suits synthetic graphs and hybrid models whose per-state
/// likelihoods come from elsewhere.
#[derive(Debug, Clone)]
pub struct ExplicitGraph {
    states: Vec<ExplicitState>,
    arcs: Vec<Vec<SearchStateArc>>,
    initial: StateId,
    columns: usize,
}

impl ExplicitGraph {
    pub fn builder() -> ExplicitGraphBuilder {
        ExplicitGraphBuilder::default()
    }
}

impl SearchGraph for ExplicitGraph {
    fn initial_state(&self) -> StateId {
        self.initial
    }

    fn state_count(&self) -> usize {
        self.states.len()
    }

    fn flags(&self, state: StateId) -> StateFlags {
        self.states[state.index()].flags
    }

    fn successors(&self, state: StateId) -> &[SearchStateArc] {
        &self.arcs[state.index()]
    }

    fn density(&self, state: StateId) -> Option<DensityId> {
        self.states[state.index()].density
    }

    fn density_count(&self) -> usize {
        self.columns
    }

    fn score_density(&self, density: DensityId, features: ArrayView1<f32>) -> f32 {
        features.get(density).copied().unwrap_or(LOG_ZERO)
    }

    fn feature_dimension(&self) -> Option<usize> {
        (self.columns > 0).then_some(self.columns)
    }

    fn label(&self, state: StateId) -> Option<&UnitLabel> {
        self.states[state.index()].label.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct ExplicitGraphBuilder {
    states: Vec<ExplicitState>,
    arcs: Vec<Vec<SearchStateArc>>,
    initial: Option<StateId>,
    instances: HashMap<String, u32>,
}

impl ExplicitGraphBuilder {
    fn push(&mut self, flags: StateFlags, density: Option<DensityId>, label: Option<&str>) -> StateId {
        let label = label.map(|name| {
            let next = self.instances.len() as u32;
            let instance = *self.instances.entry(name.to_string()).or_insert(next);
            UnitLabel {
                name: Arc::from(name),
                filler: looks_like_filler(name),
                instance,
            }
        });
        let id = StateId(self.states.len() as u32);
        self.states.push(ExplicitState {
            flags,
            density,
            label,
        });
        self.arcs.push(Vec::new());
        id
    }

    /// Adds an emitting state scored by frame column `column`.
    pub fn emitting(&mut self, label: &str, column: usize) -> StateId {
        let flags = StateFlags {
            emitting: true,
            ..Default::default()
        };
        self.push(flags, Some(column), Some(label))
    }

    pub fn non_emitting(&mut self, label: Option<&str>) -> StateId {
        self.push(StateFlags::default(), None, label)
    }

    pub fn set_initial(&mut self, state: StateId) -> &mut Self {
        self.initial = Some(state);
        self
    }

    pub fn mark_final(&mut self, state: StateId) -> &mut Self {
        if let Some(s) = self.states.get_mut(state.index()) {
            s.flags.final_state = true;
        }
        self
    }

    pub fn mark_word(&mut self, state: StateId) -> &mut Self {
        if let Some(s) = self.states.get_mut(state.index()) {
            s.flags.word = true;
        }
        self
    }

    pub fn add_arc(&mut self, from: StateId, to: StateId, log_transition: f32) -> &mut Self {
        self.add_full_arc(from, SearchStateArc::new(to, log_transition))
    }

    pub fn add_full_arc(&mut self, from: StateId, arc: SearchStateArc) -> &mut Self {
        if let Some(out) = self.arcs.get_mut(from.index()) {
            out.push(arc);
        }
        self
    }

    pub fn build(self) -> Result<ExplicitGraph, SearchError> {
        let initial = self
            .initial
            .ok_or_else(|| SearchError::InvalidModel("graph has no initial state".into()))?;
        let count = self.states.len();
        if initial.index() >= count {
            return Err(SearchError::InvalidModel(format!(
                "initial state {} out of range",
                initial.0
            )));
        }
        for (from, out) in self.arcs.iter().enumerate() {
            if let Some(arc) = out.iter().find(|a| a.state.index() >= count) {
                return Err(SearchError::InvalidModel(format!(
                    "arc {from} -> {} points outside the graph",
                    arc.state.0
                )));
            }
        }
        let columns = self
            .states
            .iter()
            .filter_map(|s| s.density)
            .max()
            .map_or(0, |c| c + 1);

        Ok(ExplicitGraph {
            states: self.states,
            arcs: self.arcs,
            initial,
            columns,
        })
    }
}
