use std::ops::{Index, IndexMut};

use crate::linguist::{StateFlags, StateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u32);

impl TokenId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node of the hypothesis trellis. Tokens live in a [`TokenArena`] and refer
/// to their predecessor by id, so a Viterbi update can rewrite a token in
/// place and every successor sees the better path.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    state: Option<StateId>,
    flags: StateFlags,
    predecessor: Option<TokenId>,
    score: f32,
    acoustic_score: f32,
    language_score: f32,
    insertion_score: f32,
    collect_time: i64,
    scored: bool,
}

impl Token {
    pub fn seed(state: StateId, flags: StateFlags, collect_time: i64) -> Self {
        Self {
            state: Some(state),
            flags,
            predecessor: None,
            score: 0.0,
            acoustic_score: 0.0,
            language_score: 0.0,
            insertion_score: 0.0,
            collect_time,
            scored: false,
        }
    }

    pub fn new(
        predecessor: Option<TokenId>,
        state: StateId,
        flags: StateFlags,
        score: f32,
        insertion_score: f32,
        language_score: f32,
        collect_time: i64,
    ) -> Self {
        Self {
            state: Some(state),
            flags,
            predecessor,
            score,
            acoustic_score: 0.0,
            language_score,
            insertion_score,
            collect_time,
            scored: false,
        }
    }

    /// A stateless token carrying the score components accumulated since the
    /// previous word token, used when only word tokens are kept.
    pub fn aggregate(
        predecessor: Option<TokenId>,
        score: f32,
        insertion_score: f32,
        acoustic_score: f32,
        language_score: f32,
        collect_time: i64,
    ) -> Self {
        Self {
            state: None,
            flags: StateFlags::default(),
            predecessor,
            score,
            acoustic_score,
            language_score,
            insertion_score,
            collect_time,
            scored: false,
        }
    }

    pub fn state(&self) -> Option<StateId> {
        self.state
    }

    pub fn predecessor(&self) -> Option<TokenId> {
        self.predecessor
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn acoustic_score(&self) -> f32 {
        self.acoustic_score
    }

    pub fn language_score(&self) -> f32 {
        self.language_score
    }

    pub fn insertion_score(&self) -> f32 {
        self.insertion_score
    }

    pub fn collect_time(&self) -> i64 {
        self.collect_time
    }

    pub fn flags(&self) -> StateFlags {
        self.flags
    }

    pub fn is_emitting(&self) -> bool {
        self.flags.emitting
    }

    pub fn is_final(&self) -> bool {
        self.flags.final_state
    }

    pub fn is_word(&self) -> bool {
        self.flags.word
    }

    /// Whether an acoustic score has been applied to this token.
    pub fn is_scored(&self) -> bool {
        self.scored
    }

    /// Viterbi update: a better path reached this token's state this frame.
    pub fn update(
        &mut self,
        predecessor: Option<TokenId>,
        score: f32,
        insertion_score: f32,
        language_score: f32,
        collect_time: i64,
    ) {
        self.predecessor = predecessor;
        self.score = score;
        self.insertion_score = insertion_score;
        self.language_score = language_score;
        self.collect_time = collect_time;
    }

    pub fn apply_acoustic_score(&mut self, score: f32, frame: i64) {
        self.acoustic_score = score;
        self.score += score;
        self.collect_time = frame;
        self.scored = true;
    }
}

/// Old-to-new id mapping produced when an arena is compacted or copied.
#[derive(Debug, Clone)]
pub struct TokenRemap {
    map: Vec<u32>,
}

const UNREACHED: u32 = u32::MAX;

impl TokenRemap {
    pub fn get(&self, id: TokenId) -> Option<TokenId> {
        match self.map.get(id.index()) {
            Some(&UNREACHED) | None => None,
            Some(&new) => Some(TokenId(new)),
        }
    }

    /// Maps `ids` in place, dropping any that did not survive.
    pub fn apply(&self, ids: &mut Vec<TokenId>) {
        ids.retain_mut(|id| match self.get(*id) {
            Some(new) => {
                *id = new;
                true
            }
            None => false,
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenArena {
    tokens: Vec<Token>,
}

impl TokenArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn push(&mut self, token: Token) -> TokenId {
        let id = TokenId(self.tokens.len() as u32);
        self.tokens.push(token);
        id
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(id.index())
    }

    /// Walks from `id` back to the root of its chain.
    pub fn chain(&self, id: TokenId) -> Chain<'_> {
        Chain {
            arena: self,
            next: Some(id),
        }
    }

    /// Copies every token reachable from `roots` into a new arena, preserving
    /// relative order.
    pub fn extract(&self, roots: &[TokenId]) -> (TokenArena, TokenRemap) {
        let remap = self.reachable(roots);
        let mut tokens = Vec::with_capacity(remap.map.iter().filter(|&&m| m != UNREACHED).count());
        for (old, token) in self.tokens.iter().enumerate() {
            if remap.map[old] == UNREACHED {
                continue;
            }
            let mut copy = token.clone();
            copy.predecessor = copy.predecessor.and_then(|p| remap.get(p));
            tokens.push(copy);
        }
        (TokenArena { tokens }, remap)
    }

    /// Drops every token not reachable from `roots`.
    pub fn compact(&mut self, roots: &[TokenId]) -> TokenRemap {
        let (arena, remap) = self.extract(roots);
        *self = arena;
        remap
    }

    fn reachable(&self, roots: &[TokenId]) -> TokenRemap {
        let mut map = vec![UNREACHED; self.tokens.len()];
        let mut stack: Vec<TokenId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            let Some(slot) = map.get_mut(id.index()) else {
                continue;
            };
            if *slot != UNREACHED {
                continue;
            }
            *slot = 0;
            if let Some(p) = self.tokens[id.index()].predecessor {
                stack.push(p);
            }
        }
        let mut next = 0u32;
        for slot in map.iter_mut().filter(|s| **s != UNREACHED) {
            *slot = next;
            next += 1;
        }
        TokenRemap { map }
    }
}

impl Index<TokenId> for TokenArena {
    type Output = Token;

    fn index(&self, id: TokenId) -> &Token {
        &self.tokens[id.index()]
    }
}

impl IndexMut<TokenId> for TokenArena {
    fn index_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.tokens[id.index()]
    }
}

pub struct Chain<'a> {
    arena: &'a TokenArena,
    next: Option<TokenId>,
}

impl Iterator for Chain<'_> {
    type Item = TokenId;

    fn next(&mut self) -> Option<TokenId> {
        let id = self.next?;
        self.next = self.arena.get(id).and_then(Token::predecessor);
        Some(id)
    }
}
