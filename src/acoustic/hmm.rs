use ndarray::Array2;

use super::unit::Unit;

pub type SenoneId = usize;

/// The senones backing each emitting state of an HMM. Units whose HMMs share a
/// sequence are acoustically indistinguishable.
pub type SenoneSequence = Vec<SenoneId>;

/// A left-to-right HMM for one unit. `transitions` is `(N+1) x (N+1)` in the
/// log domain; row/column `N` is the non-emitting exit state.
#[derive(Debug, Clone)]
pub struct Hmm {
    pub unit: Unit,
    pub senones: SenoneSequence,
    pub transitions: Array2<f32>,
}

impl Hmm {
    pub fn emitting_states(&self) -> usize {
        self.senones.len()
    }

    pub fn exit_state(&self) -> usize {
        self.senones.len()
    }

    /// Log transition probability from state `from` to state `to`.
    pub fn transition(&self, from: usize, to: usize) -> f32 {
        self.transitions[[from, to]]
    }
}
