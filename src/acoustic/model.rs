use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use ndarray::{Array1, Array2, ArrayView1};
use serde::Deserialize;

use super::hmm::{Hmm, SenoneId};
use super::senone::{MixtureComponent, Senone};
use super::unit::{looks_like_filler, Unit};
use crate::error::SearchError;
use crate::logmath::linear_to_log;

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentDefinition {
    pub mean: Vec<f32>,
    pub variance: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenoneDefinition {
    pub components: Vec<ComponentDefinition>,
    /// Linear mixture weights; uniform when omitted.
    #[serde(default)]
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HmmDefinition {
    pub base: String,
    #[serde(default)]
    pub left: Option<String>,
    #[serde(default)]
    pub right: Option<String>,
    /// Inferred from the unit name when omitted.
    #[serde(default)]
    pub filler: Option<bool>,
    pub senones: Vec<SenoneId>,
    /// Linear transition probabilities, `(N+1) x (N+1)`.
    pub transitions: Vec<Vec<f64>>,
}

/// Serialized form of a tied-state acoustic model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDefinition {
    pub feature_dimension: usize,
    pub senones: Vec<SenoneDefinition>,
    pub hmms: Vec<HmmDefinition>,
}

/// Tied-state acoustic model: a senone pool and the HMMs that reference it.
#[derive(Debug, Clone)]
pub struct AcousticModel {
    feature_dimension: usize,
    senones: Vec<Senone>,
    hmms: Vec<Hmm>,
    ci_units: HashMap<String, Unit>,
}

impl AcousticModel {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let start = Instant::now();
        let content = fs::read_to_string(path.as_ref())?;
        let model = Self::from_json_str(&content)?;
        log::info!(
            "Loaded acoustic model from {} ({} senones, {} HMMs) in {:?}",
            path.as_ref().display(),
            model.senones.len(),
            model.hmms.len(),
            start.elapsed()
        );
        Ok(model)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SearchError> {
        let definition: ModelDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    pub fn from_definition(definition: ModelDefinition) -> Result<Self, SearchError> {
        let dim = definition.feature_dimension;
        if dim == 0 {
            return Err(SearchError::InvalidModel(
                "feature_dimension must be positive".into(),
            ));
        }

        let senones = definition
            .senones
            .into_iter()
            .enumerate()
            .map(|(id, s)| build_senone(id, s, dim))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ci_units = HashMap::new();
        let mut hmms = Vec::with_capacity(definition.hmms.len());
        for h in definition.hmms {
            let hmm = build_hmm(h, senones.len())?;
            if !hmm.unit.is_context_dependent() {
                ci_units.insert(hmm.unit.base.to_string(), hmm.unit.clone());
            }
            hmms.push(hmm);
        }

        Ok(Self {
            feature_dimension: dim,
            senones,
            hmms,
            ci_units,
        })
    }

    pub fn feature_dimension(&self) -> usize {
        self.feature_dimension
    }

    pub fn hmms(&self) -> impl Iterator<Item = &Hmm> {
        self.hmms.iter()
    }

    pub fn hmm(&self, index: usize) -> Option<&Hmm> {
        self.hmms.get(index)
    }

    pub fn hmm_count(&self) -> usize {
        self.hmms.len()
    }

    pub fn senone(&self, id: SenoneId) -> Option<&Senone> {
        self.senones.get(id)
    }

    pub fn senone_count(&self) -> usize {
        self.senones.len()
    }

    pub fn score_senone(&self, id: SenoneId, features: ArrayView1<f32>) -> f32 {
        self.senones
            .get(id)
            .map(|s| s.score(features))
            .unwrap_or(crate::logmath::LOG_ZERO)
    }

    pub fn context_independent_units(&self) -> &HashMap<String, Unit> {
        &self.ci_units
    }
}

fn build_senone(id: usize, def: SenoneDefinition, dim: usize) -> Result<Senone, SearchError> {
    if def.components.is_empty() {
        return Err(SearchError::InvalidModel(format!(
            "senone {id} has no mixture components"
        )));
    }
    let mut components = Vec::with_capacity(def.components.len());
    for c in def.components {
        if c.mean.len() != dim || c.variance.len() != dim {
            return Err(SearchError::InvalidModel(format!(
                "senone {id}: component dimension {}/{} does not match {dim}",
                c.mean.len(),
                c.variance.len()
            )));
        }
        components.push(MixtureComponent::new(
            Array1::from_vec(c.mean),
            Array1::from_vec(c.variance),
        ));
    }
    let weights = if def.weights.is_empty() {
        vec![1.0 / components.len() as f64; components.len()]
    } else if def.weights.len() == components.len() {
        def.weights
    } else {
        return Err(SearchError::InvalidModel(format!(
            "senone {id}: {} weights for {} components",
            def.weights.len(),
            components.len()
        )));
    };
    Ok(Senone::new(components, &weights))
}

fn build_hmm(def: HmmDefinition, senone_count: usize) -> Result<Hmm, SearchError> {
    let n = def.senones.len();
    if n == 0 {
        return Err(SearchError::InvalidModel(format!(
            "HMM for {} has no states",
            def.base
        )));
    }
    if let Some(bad) = def.senones.iter().find(|&&s| s >= senone_count) {
        return Err(SearchError::InvalidModel(format!(
            "HMM for {} references unknown senone {bad}",
            def.base
        )));
    }
    if def.transitions.len() != n + 1 || def.transitions.iter().any(|row| row.len() != n + 1) {
        return Err(SearchError::InvalidModel(format!(
            "HMM for {} needs a {}x{} transition matrix",
            def.base,
            n + 1,
            n + 1
        )));
    }

    let flat: Vec<f32> = def
        .transitions
        .iter()
        .flatten()
        .map(|&p| linear_to_log(p))
        .collect();
    let transitions = Array2::from_shape_vec((n + 1, n + 1), flat)?;

    let filler = def.filler.unwrap_or_else(|| looks_like_filler(&def.base));
    let unit = match (def.left, def.right) {
        (None, None) => Unit::context_independent(&def.base, filler),
        (left, right) => Unit {
            filler,
            ..Unit::with_context(
                &def.base,
                left.as_deref().unwrap_or(super::unit::SILENCE),
                right.as_deref().unwrap_or(super::unit::SILENCE),
            )
        },
    };

    Ok(Hmm {
        unit,
        senones: def.senones,
        transitions,
    })
}
