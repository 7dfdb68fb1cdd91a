use std::time::Duration;

/// Counters kept across one recognition session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStatistics {
    pub frames: usize,
    /// Tokens scored in the current utterance.
    pub tokens_scored: u64,
    /// Tokens scored since the manager was created.
    pub total_tokens_scored: u64,
    pub tokens_created: u64,
    pub beam_pruned: u64,
    pub entry_pruned: u64,
    pub viterbi_pruned: u64,
    pub cycle_skips: u64,
    pub compactions: u64,
    pub max_active: usize,
    pub score_time: Duration,
    pub prune_time: Duration,
    pub grow_time: Duration,
}

impl SearchStatistics {
    pub fn tokens_per_second(&self) -> f64 {
        let busy = (self.score_time + self.prune_time + self.grow_time).as_secs_f64();
        if busy > 0.0 {
            self.tokens_scored as f64 / busy
        } else {
            0.0
        }
    }

    pub fn average_active(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.tokens_scored as f64 / self.frames as f64
        }
    }
}

/// Per-frame snapshot handed to frame listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    pub frame: usize,
    pub scored: usize,
    /// Tokens left after pruning.
    pub survivors: usize,
    /// Tokens on the list after growth.
    pub active: usize,
    pub best_score: f32,
}
