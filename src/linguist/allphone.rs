use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use ndarray::ArrayView1;
use serde::Deserialize;

use super::{DensityId, Linguist, SearchGraph, SearchStateArc, StateFlags, StateId, UnitLabel};
use crate::acoustic::{looks_like_filler, AcousticModel, SenoneSequence, Unit, SILENCE};
use crate::decoder::config::env_override;
use crate::error::SearchError;
use crate::logmath::{linear_to_log, LOG_ONE, LOG_ZERO};

const CI_INSERTION_PROBABILITY: f64 = 0.05;
const CD_INSERTION_PROBABILITY: f64 = 0.01;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllphoneConfig {
    /// Flat per-phone penalty (linear). Lower values favour fewer, longer phones.
    pub phone_insertion_probability: f64,
    /// When switching this on, retune the insertion probability as well.
    pub use_context_dependent_phones: bool,
}

impl Default for AllphoneConfig {
    fn default() -> Self {
        Self::context_independent()
    }
}

impl AllphoneConfig {
    pub fn context_independent() -> Self {
        Self {
            phone_insertion_probability: CI_INSERTION_PROBABILITY,
            use_context_dependent_phones: false,
        }
    }

    pub fn context_dependent() -> Self {
        Self {
            phone_insertion_probability: CD_INSERTION_PROBABILITY,
            use_context_dependent_phones: true,
        }
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `ALLPHONE_` overrides on top of `self`. Switching the phone mode
    /// resets the insertion probability to that mode's default first.
    pub fn with_env_overrides(mut self) -> Self {
        let prefix = "ALLPHONE_";
        if let Some(cd) = env_override::<bool>(prefix, "CONTEXT_DEPENDENT") {
            if cd != self.use_context_dependent_phones {
                self = if cd {
                    Self::context_dependent()
                } else {
                    Self::context_independent()
                };
            }
        }
        if let Some(p) = env_override(prefix, "INSERTION_PROBABILITY") {
            self.phone_insertion_probability = p;
        }
        self
    }
}

enum ModelSource {
    Path(PathBuf),
    Loaded(Arc<AcousticModel>),
}

/// Phone-loop linguist: every phone may follow every other phone (subject to
/// context constraints in context-dependent mode).
pub struct AllphoneLinguist {
    source: ModelSource,
    config: AllphoneConfig,
    graph: Option<Arc<AllphoneGraph>>,
}

impl AllphoneLinguist {
    pub fn new(model: Arc<AcousticModel>, config: AllphoneConfig) -> Self {
        Self {
            source: ModelSource::Loaded(model),
            config,
            graph: None,
        }
    }

    /// Defers loading the model file until `allocate`.
    pub fn from_path<P: Into<PathBuf>>(path: P, config: AllphoneConfig) -> Self {
        Self {
            source: ModelSource::Path(path.into()),
            config,
            graph: None,
        }
    }

    pub fn config(&self) -> &AllphoneConfig {
        &self.config
    }

    pub fn graph(&self) -> Option<&Arc<AllphoneGraph>> {
        self.graph.as_ref()
    }
}

impl Linguist for AllphoneLinguist {
    fn allocate(&mut self) -> Result<Arc<dyn SearchGraph>, SearchError> {
        if let Some(graph) = &self.graph {
            return Ok(graph.clone());
        }
        let model = match &self.source {
            ModelSource::Path(path) => Arc::new(AcousticModel::from_json_file(path)?),
            ModelSource::Loaded(model) => model.clone(),
        };
        self.source = ModelSource::Loaded(model.clone());
        let graph = Arc::new(AllphoneGraph::build(model, &self.config)?);
        self.graph = Some(graph.clone());
        Ok(graph)
    }

    fn deallocate(&mut self) {
        self.graph = None;
    }
}

#[derive(Debug, Clone)]
enum Successors {
    Local(Vec<SearchStateArc>),
    Shared(usize),
}

#[derive(Debug, Clone)]
struct PhoneState {
    flags: StateFlags,
    senone: Option<DensityId>,
    hmm: Option<usize>,
    successors: Successors,
}

/// The phone-loop search graph derived from an acoustic model.
///
/// Each HMM contributes one emitting state per senone plus a non-emitting exit
/// state. Exit states are unit boundaries and accepting states; their arcs go
/// to the entry states of the successor HMMs, carrying the phone insertion
/// penalty. Successor HMM lists are indexed once at build time so a lookup
/// from any exit state is a single table access.
#[derive(Debug)]
pub struct AllphoneGraph {
    model: Arc<AcousticModel>,
    states: Vec<PhoneState>,
    successor_sets: Vec<Vec<SearchStateArc>>,
    labels: Vec<Option<UnitLabel>>,
    initial: StateId,
    use_cd: bool,
    log_insertion: f32,
    ci_hmms: Vec<usize>,
    filler_hmms: Vec<usize>,
    left_context_sil_hmms: Vec<usize>,
    cd_hmms: HashMap<Arc<str>, HashMap<Arc<str>, Vec<usize>>>,
    senones_to_units: HashMap<SenoneSequence, Vec<Unit>>,
}

impl AllphoneGraph {
    pub fn build(model: Arc<AcousticModel>, config: &AllphoneConfig) -> Result<Self, SearchError> {
        let start = Instant::now();
        let mut graph = Self {
            model,
            states: Vec::new(),
            successor_sets: Vec::new(),
            labels: Vec::new(),
            initial: StateId(0),
            use_cd: config.use_context_dependent_phones,
            log_insertion: linear_to_log(config.phone_insertion_probability),
            ci_hmms: Vec::new(),
            filler_hmms: Vec::new(),
            left_context_sil_hmms: Vec::new(),
            cd_hmms: HashMap::new(),
            senones_to_units: HashMap::new(),
        };

        if graph.use_cd {
            graph.index_context_dependent();
        } else {
            graph.index_context_independent();
        }
        let members = graph.member_hmms();
        if members.is_empty() {
            return Err(SearchError::InvalidModel(
                "acoustic model has no usable HMMs".into(),
            ));
        }
        graph.build_states(&members);

        log::info!(
            "Allphone graph built (cd={}): {} HMMs, {} states, {} successor sets in {:?}",
            graph.use_cd,
            members.len(),
            graph.states.len(),
            graph.successor_sets.len(),
            start.elapsed()
        );
        Ok(graph)
    }

    fn register_senones(&mut self, index: usize) {
        let Some(hmm) = self.model.hmm(index) else {
            return;
        };
        self.senones_to_units
            .entry(hmm.senones.clone())
            .or_default()
            .push(hmm.unit.clone());
    }

    fn index_context_independent(&mut self) {
        let model = self.model.clone();
        for (i, hmm) in model.hmms().enumerate() {
            if !hmm.unit.is_context_dependent() {
                self.register_senones(i);
                self.ci_hmms.push(i);
            }
        }
    }

    fn index_context_dependent(&mut self) {
        let model = self.model.clone();
        for (i, hmm) in model.hmms().enumerate() {
            self.register_senones(i);
            let unit = &hmm.unit;
            if unit.filler {
                self.filler_hmms.push(i);
                continue;
            }
            if !unit.is_context_dependent() {
                continue;
            }
            if unit.left_context() == SILENCE {
                self.left_context_sil_hmms.push(i);
                continue;
            }
            self.cd_hmms
                .entry(Arc::from(unit.left_context()))
                .or_default()
                .entry(unit.base.clone())
                .or_default()
                .push(i);
        }
        // Fillers and silence context both mean "no informative left context".
        let fillers = self.filler_hmms.clone();
        self.left_context_sil_hmms.extend(fillers);
    }

    fn member_hmms(&self) -> Vec<usize> {
        if !self.use_cd {
            return self.ci_hmms.clone();
        }
        let mut members: Vec<usize> = self
            .left_context_sil_hmms
            .iter()
            .copied()
            .chain(self.cd_hmms.values().flat_map(|m| m.values().flatten().copied()))
            .collect();
        members.sort_unstable();
        members.dedup();
        members
    }

    fn build_states(&mut self, members: &[usize]) {
        let model = self.model.clone();

        // initial state first, then per HMM: entry..emitting states, exit
        self.states.push(PhoneState {
            flags: StateFlags::default(),
            senone: None,
            hmm: None,
            successors: Successors::Shared(0),
        });
        self.labels.push(None);

        let mut entry = HashMap::with_capacity(members.len());
        let mut exit = HashMap::with_capacity(members.len());
        for &h in members {
            let Some(hmm) = model.hmm(h) else { continue };
            let first = self.states.len() as u32;
            entry.insert(h, StateId(first));
            exit.insert(h, StateId(first + hmm.emitting_states() as u32));

            let label = self.canonical_label(h);
            for j in 0..hmm.emitting_states() {
                let arcs = (0..=hmm.exit_state())
                    .filter_map(|k| {
                        let p = hmm.transition(j, k);
                        (p > LOG_ZERO).then(|| SearchStateArc::new(StateId(first + k as u32), p))
                    })
                    .collect();
                self.states.push(PhoneState {
                    flags: StateFlags {
                        emitting: true,
                        ..Default::default()
                    },
                    senone: Some(hmm.senones[j]),
                    hmm: Some(h),
                    successors: Successors::Local(arcs),
                });
                self.labels.push(label.clone());
            }
            self.states.push(PhoneState {
                flags: StateFlags {
                    emitting: false,
                    final_state: true,
                    word: true,
                },
                senone: None,
                hmm: Some(h),
                successors: Successors::Shared(0),
            });
            self.labels.push(label);
        }

        let mut set_index: HashMap<(Arc<str>, Arc<str>), usize> = HashMap::new();
        let initial_set = self.successor_hmms(SILENCE, SILENCE).to_vec();
        let initial_arcs = self.entry_arcs(&initial_set, &entry);
        self.successor_sets.push(initial_arcs);
        if self.use_cd {
            set_index.insert((Arc::from(SILENCE), Arc::from(SILENCE)), 0);
        }

        for &h in members {
            let Some(hmm) = model.hmm(h) else { continue };
            let set = if self.use_cd {
                let key = (hmm.unit.base.clone(), Arc::from(hmm.unit.right_context()));
                match set_index.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        let hmms = self.successor_hmms(&key.0, &key.1).to_vec();
                        let arcs = self.entry_arcs(&hmms, &entry);
                        self.successor_sets.push(arcs);
                        let idx = self.successor_sets.len() - 1;
                        set_index.insert(key, idx);
                        idx
                    }
                }
            } else {
                0
            };
            if let Some(exit_state) = exit.get(&h) {
                self.states[exit_state.index()].successors = Successors::Shared(set);
            }
        }
    }

    fn entry_arcs(&self, hmms: &[usize], entry: &HashMap<usize, StateId>) -> Vec<SearchStateArc> {
        hmms.iter()
            .filter_map(|h| entry.get(h))
            .map(|&state| SearchStateArc {
                state,
                log_transition: LOG_ONE,
                log_insertion: self.log_insertion,
                log_language: LOG_ONE,
            })
            .collect()
    }

    fn canonical_label(&self, h: usize) -> Option<UnitLabel> {
        let hmm = self.model.hmm(h)?;
        let unit = self
            .units_for(&hmm.senones)
            .and_then(|units| units.first())
            .unwrap_or(&hmm.unit);
        Some(UnitLabel {
            name: unit.base.clone(),
            filler: unit.filler,
            instance: h as u32,
        })
    }

    /// HMMs that may follow a phone with base `current` and right context
    /// `right`, as model indices.
    fn successor_hmms(&self, current: &str, right: &str) -> &[usize] {
        if self.use_cd {
            self.cd_successors(current, right)
        } else {
            &self.ci_hmms
        }
    }

    pub fn ci_successors(&self) -> &[usize] {
        &self.ci_hmms
    }

    /// Context-dependent HMMs with left context `lc` and base unit `base`.
    pub fn cd_successors(&self, lc: &str, base: &str) -> &[usize] {
        let lc_is_filler = self
            .model
            .context_independent_units()
            .get(lc)
            .map_or_else(|| looks_like_filler(lc), |u| u.filler);
        if lc_is_filler {
            return &self.left_context_sil_hmms;
        }
        if base == SILENCE {
            return &self.filler_hmms;
        }
        self.cd_hmms
            .get(lc)
            .and_then(|by_base| by_base.get(base))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every unit whose HMM uses exactly this senone sequence.
    pub fn units_for(&self, senones: &SenoneSequence) -> Option<&[Unit]> {
        self.senones_to_units.get(senones).map(Vec::as_slice)
    }

    pub fn hmm_of(&self, state: StateId) -> Option<usize> {
        self.states.get(state.index()).and_then(|s| s.hmm)
    }

    pub fn uses_context_dependent_phones(&self) -> bool {
        self.use_cd
    }

    pub fn phone_insertion_log_probability(&self) -> f32 {
        self.log_insertion
    }

    pub fn model(&self) -> &Arc<AcousticModel> {
        &self.model
    }
}

impl SearchGraph for AllphoneGraph {
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
        match &self.states[state.index()].successors {
            Successors::Local(arcs) => arcs,
            Successors::Shared(set) => &self.successor_sets[*set],
        }
    }

    fn density(&self, state: StateId) -> Option<DensityId> {
        self.states[state.index()].senone
    }

    fn density_count(&self) -> usize {
        self.model.senone_count()
    }

    fn score_density(&self, density: DensityId, features: ArrayView1<f32>) -> f32 {
        self.model.score_senone(density, features)
    }

    fn feature_dimension(&self) -> Option<usize> {
        Some(self.model.feature_dimension())
    }

    fn label(&self, state: StateId) -> Option<&UnitLabel> {
        self.labels.get(state.index()).and_then(Option::as_ref)
    }
}
