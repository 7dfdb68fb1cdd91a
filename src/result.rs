use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::decoder::{Token, TokenArena, TokenId};
use crate::linguist::{SearchGraph, UnitLabel};

/// One recognized unit on the best path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitResult {
    pub label: String,
    pub filler: bool,
    pub start_frame: i64,
    pub end_frame: i64,
    /// Path score at the last token of the unit.
    pub score: f32,
    pub acoustic_score: f32,
    pub language_score: f32,
    pub insertion_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatticeNode {
    pub id: usize,
    pub label: String,
    pub filler: bool,
    pub start_frame: i64,
    pub end_frame: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatticeEdge {
    pub from: usize,
    pub to: usize,
    pub acoustic_score: f32,
    pub language_score: f32,
    pub insertion_score: f32,
}

/// Unit-level graph of the hypotheses alive in a result. Node 0 is the
/// utterance start and node 1 its end.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Lattice {
    pub nodes: Vec<LatticeNode>,
    pub edges: Vec<LatticeEdge>,
}

pub const LATTICE_START: usize = 0;
pub const LATTICE_END: usize = 1;

#[derive(Debug, Clone)]
struct Segment {
    first: TokenId,
    label: UnitLabel,
    start_frame: i64,
    last_frame: i64,
    score: f32,
    acoustic_score: f32,
    language_score: f32,
    insertion_score: f32,
}

impl Segment {
    fn open(first: TokenId, label: UnitLabel, token: &Token) -> Self {
        Self {
            first,
            label,
            start_frame: token.collect_time(),
            last_frame: token.collect_time(),
            score: token.score(),
            acoustic_score: 0.0,
            language_score: 0.0,
            insertion_score: 0.0,
        }
    }

    fn absorb(&mut self, token: &Token) {
        self.score = token.score();
        self.acoustic_score += token.acoustic_score();
        self.language_score += token.language_score();
        self.insertion_score += token.insertion_score();
        if token.is_emitting() && token.is_scored() {
            self.last_frame = self.last_frame.max(token.collect_time());
        }
    }
}

/// Snapshot of the search after a call to `recognize`. Owns a compacted copy
/// of every token reachable from its active and final tokens.
#[derive(Clone)]
pub struct SearchResult {
    graph: Arc<dyn SearchGraph>,
    tokens: TokenArena,
    active: Vec<TokenId>,
    finals: Vec<TokenId>,
    best_active: Option<TokenId>,
    frame_number: usize,
    is_final: bool,
}

impl fmt::Debug for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchResult")
            .field("frame_number", &self.frame_number)
            .field("is_final", &self.is_final)
            .field("active", &self.active.len())
            .field("finals", &self.finals.len())
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl SearchResult {
    pub fn new(
        graph: Arc<dyn SearchGraph>,
        tokens: TokenArena,
        active: Vec<TokenId>,
        finals: Vec<TokenId>,
        best_active: Option<TokenId>,
        frame_number: usize,
        is_final: bool,
    ) -> Self {
        Self {
            graph,
            tokens,
            active,
            finals,
            best_active,
            frame_number,
            is_final,
        }
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn frame_number(&self) -> usize {
        self.frame_number
    }

    pub fn word_token_first(&self) -> bool {
        self.graph.word_token_first()
    }

    pub fn tokens(&self) -> &TokenArena {
        &self.tokens
    }

    pub fn token(&self, id: TokenId) -> &Token {
        &self.tokens[id]
    }

    pub fn active_tokens(&self) -> &[TokenId] {
        &self.active
    }

    pub fn final_tokens(&self) -> &[TokenId] {
        &self.finals
    }

    pub fn best_final_token(&self) -> Option<TokenId> {
        best_of(&self.tokens, &self.finals)
    }

    pub fn best_active_token(&self) -> Option<TokenId> {
        self.best_active.or_else(|| best_of(&self.tokens, &self.active))
    }

    /// Best final token when any path reached a final state, otherwise the
    /// best active token.
    pub fn best_token(&self) -> Option<TokenId> {
        self.best_final_token().or_else(|| self.best_active_token())
    }

    /// Token ids from the root of the best chain to the best token.
    pub fn best_path(&self) -> Vec<TokenId> {
        let Some(best) = self.best_token() else {
            return Vec::new();
        };
        let mut path: Vec<TokenId> = self.tokens.chain(best).collect();
        path.reverse();
        path
    }

    pub fn timed_best_result(&self, no_fillers: bool) -> Vec<UnitResult> {
        let Some(best) = self.best_token() else {
            return Vec::new();
        };
        let segments = self.segments(best);
        let mut units = Vec::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            let end_frame = segments
                .get(i + 1)
                .map_or(seg.last_frame, |next| next.start_frame);
            if no_fillers && seg.label.filler {
                continue;
            }
            units.push(UnitResult {
                label: seg.label.name.to_string(),
                filler: seg.label.filler,
                start_frame: seg.start_frame,
                end_frame,
                score: seg.score,
                acoustic_score: seg.acoustic_score,
                language_score: seg.language_score,
                insertion_score: seg.insertion_score,
            });
        }
        units
    }

    /// Space separated unit names on the best path, fillers included.
    pub fn hypothesis(&self) -> String {
        join_labels(self.timed_best_result(false))
    }

    pub fn best_result_no_filler(&self) -> String {
        join_labels(self.timed_best_result(true))
    }

    /// Merges the unit segmentation of every final chain (or every active
    /// chain when nothing is final) into one graph. Chains that share a
    /// prefix share its nodes.
    pub fn lattice(&self) -> Lattice {
        let mut lattice = Lattice {
            nodes: vec![
                LatticeNode {
                    id: LATTICE_START,
                    label: "<s>".to_string(),
                    filler: true,
                    start_frame: 0,
                    end_frame: 0,
                },
                LatticeNode {
                    id: LATTICE_END,
                    label: "</s>".to_string(),
                    filler: true,
                    start_frame: self.frame_number as i64,
                    end_frame: self.frame_number as i64,
                },
            ],
            edges: Vec::new(),
        };
        let mut node_of: HashMap<TokenId, usize> = HashMap::new();
        let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();

        let mut leaves: Vec<TokenId> = if self.finals.is_empty() {
            self.active.clone()
        } else {
            self.finals.clone()
        };
        leaves.sort_unstable();
        leaves.dedup();

        for leaf in leaves {
            let mut from = LATTICE_START;
            for seg in self.segments(leaf) {
                let to = *node_of.entry(seg.first).or_insert_with(|| {
                    lattice.nodes.push(LatticeNode {
                        id: lattice.nodes.len(),
                        label: seg.label.name.to_string(),
                        filler: seg.label.filler,
                        start_frame: seg.start_frame,
                        end_frame: seg.last_frame,
                    });
                    lattice.nodes.len() - 1
                });
                let node = &mut lattice.nodes[to];
                node.end_frame = node.end_frame.max(seg.last_frame);
                add_edge(&mut lattice, &mut seen_edges, from, to, Some(&seg));
                from = to;
            }
            add_edge(&mut lattice, &mut seen_edges, from, LATTICE_END, None);
        }
        lattice
    }

    /// Splits the chain ending at `leaf` into unit segments. A segment opens
    /// at a labeled emitting or word token whose unit instance differs from
    /// the current one, or right after a word boundary.
    fn segments(&self, leaf: TokenId) -> Vec<Segment> {
        let mut path: Vec<TokenId> = self.tokens.chain(leaf).collect();
        path.reverse();

        let mut segments: Vec<Segment> = Vec::new();
        let mut boundary = true;
        for id in path {
            let token = &self.tokens[id];
            let label = token.state().and_then(|s| self.graph.label(s));
            if let Some(label) = label {
                let changed = segments
                    .last()
                    .map_or(true, |seg| seg.label.instance != label.instance);
                if (boundary || changed) && (token.is_emitting() || token.is_word()) {
                    segments.push(Segment::open(id, label.clone(), token));
                    boundary = false;
                }
            }
            if let Some(seg) = segments.last_mut() {
                seg.absorb(token);
            }
            if token.is_word() {
                boundary = true;
            }
        }
        segments
    }
}

fn best_of(tokens: &TokenArena, ids: &[TokenId]) -> Option<TokenId> {
    let mut best: Option<(TokenId, f32)> = None;
    for &id in ids {
        let score = tokens[id].score();
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((id, score));
        }
    }
    best.map(|(id, _)| id)
}

fn join_labels(units: Vec<UnitResult>) -> String {
    units
        .into_iter()
        .map(|u| u.label)
        .collect::<Vec<_>>()
        .join(" ")
}

fn add_edge(
    lattice: &mut Lattice,
    seen: &mut HashSet<(usize, usize)>,
    from: usize,
    to: usize,
    seg: Option<&Segment>,
) {
    if !seen.insert((from, to)) {
        return;
    }
    lattice.edges.push(LatticeEdge {
        from,
        to,
        acoustic_score: seg.map_or(0.0, |s| s.acoustic_score),
        language_score: seg.map_or(0.0, |s| s.language_score),
        insertion_score: seg.map_or(0.0, |s| s.insertion_score),
    });
}
