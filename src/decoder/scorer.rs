use super::token::{TokenArena, TokenId};
use crate::error::SearchError;
use crate::frontend::{Data, FeatureFrame, FeatureSource};
use crate::linguist::SearchGraph;

/// What happened when the scorer pulled the next item from the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// A frame was scored; carries the highest scoring token.
    Best(TokenId),
    /// An end marker arrived. The utterance is over but the stream is not.
    Ended,
    /// Nothing left to decode.
    Exhausted,
}

/// Applies the next frame's acoustic scores to a set of tokens.
pub trait ScoreProvider: Send {
    fn start_recognition(&mut self) {}

    fn calculate_scores(
        &mut self,
        tokens: &[TokenId],
        arena: &mut TokenArena,
        graph: &dyn SearchGraph,
    ) -> Result<ScoreOutcome, SearchError>;

    fn stop_recognition(&mut self) {}
}

/// Scores every token against the next feature frame, pulling from a
/// [`FeatureSource`].
pub struct SimpleAcousticScorer<S> {
    source: S,
    seen_end: bool,
    cache: Vec<f32>,
    frames_scored: usize,
}

impl<S: FeatureSource> SimpleAcousticScorer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            seen_end: false,
            cache: Vec::new(),
            frames_scored: 0,
        }
    }

    pub fn frames_scored(&self) -> usize {
        self.frames_scored
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Skips start markers until a frame or an end marker turns up.
    fn pull(&mut self) -> Result<Result<FeatureFrame, ScoreOutcome>, SearchError> {
        loop {
            return match self.source.next_data()? {
                None => Ok(Err(ScoreOutcome::Exhausted)),
                Some(Data::SpeechStart) => continue,
                Some(Data::SpeechEnd) => {
                    self.seen_end = true;
                    Ok(Err(ScoreOutcome::Ended))
                }
                Some(Data::DataEnd) if self.seen_end => Ok(Err(ScoreOutcome::Exhausted)),
                Some(Data::DataEnd) => Ok(Err(ScoreOutcome::Ended)),
                Some(Data::Features(frame)) => Ok(Ok(frame)),
            };
        }
    }
}

impl<S: FeatureSource> ScoreProvider for SimpleAcousticScorer<S> {
    /// A speech end seen in an earlier utterance still applies: the stream's
    /// trailing `DataEnd` closes it rather than opening an empty utterance.
    fn start_recognition(&mut self) {
        self.frames_scored = 0;
    }

    fn calculate_scores(
        &mut self,
        tokens: &[TokenId],
        arena: &mut TokenArena,
        graph: &dyn SearchGraph,
    ) -> Result<ScoreOutcome, SearchError> {
        let frame = match self.pull()? {
            Ok(frame) => frame,
            Err(outcome) => return Ok(outcome),
        };
        if tokens.is_empty() {
            return Ok(ScoreOutcome::Exhausted);
        }
        if let Some(expected) = graph.feature_dimension() {
            let actual = frame.values.len();
            if actual != expected {
                return Err(SearchError::FeatureDimension { expected, actual });
            }
        }

        self.cache.clear();
        self.cache.resize(graph.density_count(), f32::NAN);
        let features = frame.values.view();
        let collect_time = frame.index as i64;

        let mut best: Option<(TokenId, f32)> = None;
        for &id in tokens {
            let density = arena[id].state().and_then(|s| graph.density(s));
            if let Some(density) = density {
                let score = match self.cache.get(density).copied() {
                    Some(cached) if !cached.is_nan() => cached,
                    slot => {
                        let computed = graph.score_density(density, features);
                        if slot.is_some() {
                            self.cache[density] = computed;
                        }
                        computed
                    }
                };
                arena[id].apply_acoustic_score(score, collect_time);
            }
            let total = arena[id].score();
            if best.map_or(true, |(_, b)| total > b) {
                best = Some((id, total));
            }
        }
        self.frames_scored += 1;

        Ok(best.map_or(ScoreOutcome::Exhausted, |(id, _)| ScoreOutcome::Best(id)))
    }
}
