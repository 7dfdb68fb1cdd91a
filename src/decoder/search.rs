use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use super::active_list::{ActiveList, ActiveListFactory};
use super::config::SearchConfig;
use super::pruner::PruneStrategy;
use super::scorer::{ScoreOutcome, ScoreProvider};
use super::stats::{FrameSummary, SearchStatistics};
use super::token::{Token, TokenArena, TokenId};
use crate::error::SearchError;
use crate::linguist::{Linguist, SearchGraph, StateId};
use crate::logmath::linear_to_log;
use crate::result::SearchResult;

/// Drives a decode: owns the tokens and turns feature frames into results.
pub trait SearchManager: Send {
    fn allocate(&mut self) -> Result<(), SearchError>;

    fn start_recognition(&mut self) -> Result<(), SearchError>;

    /// Advances the search by up to `frames` frames. `Ok(None)` means the
    /// stream ran out and there is nothing more to report.
    fn recognize(&mut self, frames: usize) -> Result<Option<SearchResult>, SearchError>;

    fn stop_recognition(&mut self);

    fn deallocate(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    NotStarted,
    Running,
    StreamEnded,
    Terminated,
}

pub type FrameListener = Box<dyn FnMut(&FrameSummary) + Send>;

/// Time-synchronous Viterbi beam search over a [`SearchGraph`]. Each frame
/// is scored, pruned, then grown into the next frame's active list.
pub struct BreadthFirstSearchManager {
    linguist: Box<dyn Linguist>,
    scorer: Box<dyn ScoreProvider>,
    pruner: Box<dyn PruneStrategy>,
    list_factory: ActiveListFactory,
    config: SearchConfig,
    log_relative_word_beam_width: f32,
    graph: Option<Arc<dyn SearchGraph>>,

    arena: TokenArena,
    active_list: ActiveList,
    result_list: Vec<TokenId>,
    best_token_map: HashMap<StateId, TokenId>,
    expanding: Vec<StateId>,
    current_frame: usize,
    threshold: f32,
    word_threshold: f32,
    stream_end: bool,
    phase: SearchPhase,

    stats: SearchStatistics,
    frame_listener: Option<FrameListener>,
}

impl BreadthFirstSearchManager {
    pub fn new(
        linguist: Box<dyn Linguist>,
        scorer: Box<dyn ScoreProvider>,
        pruner: Box<dyn PruneStrategy>,
        list_factory: ActiveListFactory,
        config: SearchConfig,
    ) -> Self {
        let log_relative_word_beam_width = linear_to_log(config.relative_word_beam_width);
        Self {
            linguist,
            scorer,
            pruner,
            active_list: list_factory.new_instance(),
            list_factory,
            config,
            log_relative_word_beam_width,
            graph: None,
            arena: TokenArena::new(),
            result_list: Vec::new(),
            best_token_map: HashMap::new(),
            expanding: Vec::new(),
            current_frame: 0,
            threshold: 0.0,
            word_threshold: 0.0,
            stream_end: false,
            phase: SearchPhase::NotStarted,
            stats: SearchStatistics::default(),
            frame_listener: None,
        }
    }

    pub fn with_frame_listener(mut self, listener: impl FnMut(&FrameSummary) + Send + 'static) -> Self {
        self.frame_listener = Some(Box::new(listener));
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn statistics(&self) -> &SearchStatistics {
        &self.stats
    }

    pub fn active_list(&self) -> &ActiveList {
        &self.active_list
    }

    /// Final tokens collected during the last growth step.
    pub fn result_list(&self) -> &[TokenId] {
        &self.result_list
    }

    pub fn tokens(&self) -> &TokenArena {
        &self.arena
    }

    pub fn graph(&self) -> Option<&Arc<dyn SearchGraph>> {
        self.graph.as_ref()
    }

    fn require_graph(&self) -> Result<Arc<dyn SearchGraph>, SearchError> {
        self.graph.clone().ok_or(SearchError::NotAllocated)
    }

    fn local_start(&mut self, graph: &dyn SearchGraph) {
        self.current_frame = 0;
        self.stream_end = false;
        self.stats = SearchStatistics {
            total_tokens_scored: self.stats.total_tokens_scored,
            ..SearchStatistics::default()
        };
        self.arena.clear();
        self.result_list.clear();
        self.best_token_map.clear();
        self.active_list = self.list_factory.new_instance();

        let initial = graph.initial_state();
        let seed = self
            .arena
            .push(Token::seed(initial, graph.flags(initial), self.current_frame as i64));
        self.active_list.add(seed, &self.arena);
        self.grow_branches(graph);
    }

    /// Scores, prunes and grows one frame. Returns true once the stream has
    /// nothing more for this utterance.
    fn recognize_frame(&mut self, graph: &dyn SearchGraph) -> Result<bool, SearchError> {
        let scored = self.active_list.len();
        let more = self.score_tokens(graph)?;
        if more {
            self.prune_branches();
            let survivors = self.active_list.len();
            let best_score = self.active_list.best_score();
            self.current_frame += 1;

            let skip = self.config.grow_skip_interval;
            if skip == 0 || self.current_frame % skip != 0 {
                self.grow_branches(graph);
            }

            let interval = self.config.compact_interval_frames;
            if interval > 0 && self.current_frame % interval == 0 {
                self.compact_tokens();
            }

            self.stats.frames += 1;
            self.stats.max_active = self.stats.max_active.max(self.active_list.len());
            log::debug!(
                "frame {}: scored {scored}, kept {survivors}, active {}",
                self.current_frame - 1,
                self.active_list.len()
            );
            if let Some(listener) = self.frame_listener.as_mut() {
                listener(&FrameSummary {
                    frame: self.current_frame - 1,
                    scored,
                    survivors,
                    active: self.active_list.len(),
                    best_score,
                });
            }
        }
        Ok(!more)
    }

    fn score_tokens(&mut self, graph: &dyn SearchGraph) -> Result<bool, SearchError> {
        let start = Instant::now();
        let outcome = self
            .scorer
            .calculate_scores(self.active_list.tokens(), &mut self.arena, graph)?;
        self.stats.score_time += start.elapsed();

        match outcome {
            ScoreOutcome::Best(best) => {
                self.active_list.set_best_token(best, &self.arena);
                let scored = self.active_list.len() as u64;
                self.stats.tokens_scored += scored;
                self.stats.total_tokens_scored += scored;
                Ok(true)
            }
            ScoreOutcome::Ended => Ok(false),
            ScoreOutcome::Exhausted => {
                self.stream_end = true;
                Ok(false)
            }
        }
    }

    fn prune_branches(&mut self) {
        let start = Instant::now();
        let removed = self.pruner.prune(&mut self.active_list, &self.arena);
        self.stats.beam_pruned += removed as u64;
        self.stats.prune_time += start.elapsed();
    }

    fn grow_branches(&mut self, graph: &dyn SearchGraph) {
        let start = Instant::now();
        let previous = std::mem::replace(&mut self.active_list, self.list_factory.new_instance());
        self.best_token_map.clear();
        self.best_token_map.reserve(previous.len() * 4);
        self.result_list.clear();
        self.threshold = previous.beam_threshold();
        self.word_threshold = previous.best_score() + self.log_relative_word_beam_width;

        for token in previous.iter() {
            self.collect_successor_tokens(graph, token);
        }
        self.stats.grow_time += start.elapsed();
    }

    fn collect_successor_tokens(&mut self, graph: &dyn SearchGraph, token: TokenId) {
        let (flags, score, state) = {
            let t = &self.arena[token];
            (t.flags(), t.score(), t.state())
        };
        if flags.final_state {
            self.result_list.push(token);
        }
        if score < self.threshold {
            return;
        }
        if flags.word && score < self.word_threshold {
            return;
        }
        let Some(state) = state else {
            return;
        };

        let collect_time = self.current_frame as i64;
        let mut predecessor: Option<Option<TokenId>> = None;
        if !flags.emitting {
            self.expanding.push(state);
        }

        for arc in graph.successors(state) {
            let next = arc.state;
            let next_flags = graph.flags(next);
            let entry_score = score + arc.log_probability();

            if self.config.want_entry_pruning
                && (entry_score < self.threshold
                    || (next_flags.word && entry_score < self.word_threshold))
            {
                self.stats.entry_pruned += 1;
                continue;
            }

            let pred = *predecessor.get_or_insert_with(|| self.result_list_predecessor(token));

            if !next_flags.emitting {
                let new_token = self.arena.push(Token::new(
                    pred,
                    next,
                    next_flags,
                    entry_score,
                    arc.log_insertion,
                    arc.log_language,
                    collect_time,
                ));
                self.stats.tokens_created += 1;
                if self.is_visited(next) {
                    self.stats.cycle_skips += 1;
                } else {
                    self.collect_successor_tokens(graph, new_token);
                }
                continue;
            }

            match self.best_token_map.get(&next).copied() {
                None => {
                    let new_token = self.arena.push(Token::new(
                        pred,
                        next,
                        next_flags,
                        entry_score,
                        arc.log_insertion,
                        arc.log_language,
                        collect_time,
                    ));
                    self.stats.tokens_created += 1;
                    self.best_token_map.insert(next, new_token);
                    self.active_list.add(new_token, &self.arena);
                }
                Some(occupant) => {
                    if self.arena[occupant].score() <= entry_score {
                        self.arena[occupant].update(
                            pred,
                            entry_score,
                            arc.log_insertion,
                            arc.log_language,
                            collect_time,
                        );
                        self.active_list.offer_best(occupant, entry_score);
                    }
                    self.stats.viterbi_pruned += 1;
                }
            }
        }
        if !flags.emitting {
            self.expanding.pop();
        }
    }

    /// The token new successors of `token` should point back to.
    fn result_list_predecessor(&mut self, token: TokenId) -> Option<TokenId> {
        if self.config.keep_all_tokens {
            return Some(token);
        }
        if !self.config.build_word_lattice {
            let t = &self.arena[token];
            return if t.is_word() { Some(token) } else { t.predecessor() };
        }

        let (mut acoustic, mut language, mut insertion) = (0.0f32, 0.0f32, 0.0f32);
        let mut cursor = Some(token);
        while let Some(id) = cursor {
            let t = &self.arena[id];
            if t.is_word() {
                break;
            }
            acoustic += t.acoustic_score();
            language += t.language_score();
            insertion += t.insertion_score();
            cursor = t.predecessor();
        }
        let score = cursor.map_or(self.arena[token].score(), |word| self.arena[word].score());
        Some(self.arena.push(Token::aggregate(
            cursor,
            score,
            insertion,
            acoustic,
            language,
            self.current_frame as i64,
        )))
    }

    /// True when `state` is a non-emitting state already being expanded
    /// further up the current chain.
    fn is_visited(&self, state: StateId) -> bool {
        self.expanding.contains(&state)
    }

    /// The active list after growth holds tokens nobody has scored yet. Walk
    /// each back to the last token that reflects frames actually consumed.
    fn undo_last_grow_step(&self) -> ActiveList {
        let mut fixed = self.active_list.new_instance();
        let mut seen = HashSet::new();
        for token in self.active_list.iter() {
            let mut cursor = token;
            if let Some(first) = self.arena[token].predecessor() {
                cursor = first;
                while let Some(pred) = self.arena[cursor].predecessor() {
                    let t = &self.arena[cursor];
                    let p = &self.arena[pred];
                    let spurious = (t.is_final() && !p.is_final())
                        || (t.is_emitting() && !t.is_scored())
                        || (t.state().is_some() && !t.is_final() && !t.is_emitting());
                    if !spurious {
                        break;
                    }
                    cursor = pred;
                }
            }
            if seen.insert(cursor) {
                fixed.add(cursor, &self.arena);
            }
        }
        fixed
    }

    fn compact_tokens(&mut self) {
        let before = self.arena.len();
        let mut roots: Vec<TokenId> = self.active_list.iter().collect();
        roots.extend_from_slice(&self.result_list);
        let remap = self.arena.compact(&roots);
        self.active_list.remap(&remap);
        remap.apply(&mut self.result_list);
        self.best_token_map.clear();
        self.stats.compactions += 1;
        log::trace!(
            "Compacted tokens at frame {}: {} -> {}",
            self.current_frame,
            before,
            self.arena.len()
        );
    }

    fn snapshot(&self, fixed: &ActiveList, graph: Arc<dyn SearchGraph>, is_final: bool) -> SearchResult {
        let mut roots: Vec<TokenId> = fixed.iter().collect();
        roots.extend_from_slice(&self.result_list);
        let (tokens, remap) = self.arena.extract(&roots);

        let mut active: Vec<TokenId> = fixed.iter().collect();
        remap.apply(&mut active);
        let mut finals = self.result_list.clone();
        remap.apply(&mut finals);
        let best_active = fixed.best_token().and_then(|b| remap.get(b));

        SearchResult::new(
            graph,
            tokens,
            active,
            finals,
            best_active,
            self.current_frame,
            is_final,
        )
    }
}

impl SearchManager for BreadthFirstSearchManager {
    fn allocate(&mut self) -> Result<(), SearchError> {
        let start = Instant::now();
        let graph = self.linguist.allocate()?;
        log::info!(
            "Search graph ready: {} states, {} densities in {:.2?}",
            graph.state_count(),
            graph.density_count(),
            start.elapsed()
        );
        self.graph = Some(graph);
        Ok(())
    }

    fn start_recognition(&mut self) -> Result<(), SearchError> {
        let graph = self.require_graph()?;
        self.linguist.start_recognition();
        self.pruner.start_recognition();
        self.scorer.start_recognition();
        self.local_start(graph.as_ref());
        self.phase = SearchPhase::Running;
        log::debug!("Recognition started with {} active tokens", self.active_list.len());
        Ok(())
    }

    fn recognize(&mut self, frames: usize) -> Result<Option<SearchResult>, SearchError> {
        let graph = self.require_graph()?;
        if matches!(self.phase, SearchPhase::NotStarted | SearchPhase::Terminated) {
            self.start_recognition()?;
        }

        let mut done = false;
        self.stream_end = false;
        for _ in 0..frames {
            if done {
                break;
            }
            done = match self.recognize_frame(graph.as_ref()) {
                Ok(done) => done,
                Err(err) => {
                    log::error!("Decoding failed at frame {}: {err}", self.current_frame);
                    self.stop_recognition();
                    return Err(err);
                }
            };
        }
        if done {
            self.phase = SearchPhase::StreamEnded;
        }

        if self.active_list.best_token().is_none() {
            return Ok(None);
        }
        let fixed = self.undo_last_grow_step();
        if self.stream_end {
            return Ok(None);
        }
        Ok(Some(self.snapshot(&fixed, graph, done)))
    }

    fn stop_recognition(&mut self) {
        self.active_list = self.list_factory.new_instance();
        self.result_list.clear();
        self.best_token_map.clear();
        self.arena.clear();
        self.scorer.stop_recognition();
        self.pruner.stop_recognition();
        self.linguist.stop_recognition();
        if self.phase != SearchPhase::Terminated {
            log::debug!(
                "Recognition stopped after {} frames, {:.0} tokens/s",
                self.stats.frames,
                self.stats.tokens_per_second()
            );
        }
        self.phase = SearchPhase::Terminated;
    }

    fn deallocate(&mut self) {
        self.stop_recognition();
        self.linguist.deallocate();
        self.graph = None;
    }
}
