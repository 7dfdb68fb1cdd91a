use super::config::ActiveListConfig;
use super::token::{TokenArena, TokenId};
use crate::logmath::{linear_to_log, LOG_ZERO};

/// Builds empty active lists sharing one set of beam parameters.
#[derive(Debug, Clone, Copy)]
pub struct ActiveListFactory {
    absolute_beam_width: Option<usize>,
    log_relative_beam_width: f32,
}

impl ActiveListFactory {
    pub fn new(config: &ActiveListConfig) -> Self {
        let absolute_beam_width = usize::try_from(config.absolute_beam_width)
            .ok()
            .filter(|&w| w > 0);
        Self {
            absolute_beam_width,
            log_relative_beam_width: linear_to_log(config.relative_beam_width),
        }
    }

    pub fn new_instance(&self) -> ActiveList {
        ActiveList {
            tokens: Vec::new(),
            best: None,
            best_score: LOG_ZERO,
            absolute_beam_width: self.absolute_beam_width,
            log_relative_beam_width: self.log_relative_beam_width,
        }
    }
}

impl Default for ActiveListFactory {
    fn default() -> Self {
        Self::new(&ActiveListConfig::default())
    }
}

/// The tokens surviving at the current frame, in insertion order, plus the
/// best one seen so far.
#[derive(Debug, Clone)]
pub struct ActiveList {
    tokens: Vec<TokenId>,
    best: Option<TokenId>,
    best_score: f32,
    absolute_beam_width: Option<usize>,
    log_relative_beam_width: f32,
}

impl ActiveList {
    pub fn add(&mut self, id: TokenId, arena: &TokenArena) {
        self.tokens.push(id);
        self.offer_best(id, arena[id].score());
    }

    /// Records `score` for a token already on the list, promoting it to best
    /// when it beats the current best.
    pub fn offer_best(&mut self, id: TokenId, score: f32) {
        if self.best.is_none() || score > self.best_score {
            self.best = Some(id);
            self.best_score = score;
        }
    }

    pub fn set_best_token(&mut self, id: TokenId, arena: &TokenArena) {
        self.best = Some(id);
        self.best_score = arena[id].score();
    }

    pub fn best_token(&self) -> Option<TokenId> {
        self.best
    }

    pub fn best_score(&self) -> f32 {
        self.best_score
    }

    /// Score below which tokens fall outside the relative beam.
    pub fn beam_threshold(&self) -> f32 {
        self.best_score + self.log_relative_beam_width
    }

    pub fn log_relative_beam_width(&self) -> f32 {
        self.log_relative_beam_width
    }

    pub fn absolute_beam_width(&self) -> Option<usize> {
        self.absolute_beam_width
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    pub fn iter(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.tokens.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// An empty list with the same beam parameters.
    pub fn new_instance(&self) -> ActiveList {
        ActiveList {
            tokens: Vec::new(),
            best: None,
            best_score: LOG_ZERO,
            absolute_beam_width: self.absolute_beam_width,
            log_relative_beam_width: self.log_relative_beam_width,
        }
    }

    /// Keeps the tokens for which `keep` holds, preserving order. Returns the
    /// number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(TokenId) -> bool) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|&id| keep(id));
        if let Some(best) = self.best {
            if !self.tokens.contains(&best) {
                self.best = None;
                self.best_score = LOG_ZERO;
            }
        }
        before - self.tokens.len()
    }

    pub(crate) fn remap(&mut self, remap: &super::token::TokenRemap) {
        remap.apply(&mut self.tokens);
        self.best = self.best.and_then(|b| remap.get(b));
    }
}
