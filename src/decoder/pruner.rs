use std::collections::HashSet;

use super::active_list::ActiveList;
use super::token::{TokenArena, TokenId};

/// Removes tokens from an active list between scoring and growth.
pub trait PruneStrategy: Send {
    fn start_recognition(&mut self) {}

    /// Returns the number of tokens removed. Survivors keep their order.
    fn prune(&mut self, list: &mut ActiveList, arena: &TokenArena) -> usize;

    fn stop_recognition(&mut self) {}
}

/// Relative beam followed by the absolute beam.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplePruner;

impl SimplePruner {
    pub fn new() -> Self {
        Self
    }
}

impl PruneStrategy for SimplePruner {
    fn prune(&mut self, list: &mut ActiveList, arena: &TokenArena) -> usize {
        let threshold = list.beam_threshold();
        let mut removed = list.retain(|id| arena[id].score() >= threshold);

        if let Some(width) = list.absolute_beam_width() {
            if list.len() > width {
                let keep = top_tokens(list, arena, width);
                removed += list.retain(|id| keep.contains(&id));
            }
        }
        removed
    }
}

/// The `width` highest scoring tokens. Ties go to the list's best token, then
/// to earlier positions.
fn top_tokens(list: &ActiveList, arena: &TokenArena, width: usize) -> HashSet<TokenId> {
    let best = list.best_token();
    let mut ranked: Vec<(usize, TokenId)> = list.iter().enumerate().collect();
    ranked.sort_by(|&(pa, a), &(pb, b)| {
        arena[b]
            .score()
            .total_cmp(&arena[a].score())
            .then_with(|| (Some(b) == best).cmp(&(Some(a) == best)))
            .then(pa.cmp(&pb))
    });
    ranked.into_iter().take(width).map(|(_, id)| id).collect()
}
