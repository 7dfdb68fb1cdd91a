use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use num_cpus::get_physical;

use crate::acoustic::AcousticModel;
use crate::decoder::{
    ActiveListConfig, ActiveListFactory, BreadthFirstSearchManager, SearchConfig, SearchManager,
    SimpleAcousticScorer, SimplePruner,
};
use crate::error::SearchError;
use crate::frontend::FeatureSource;
use crate::linguist::{AllphoneConfig, AllphoneLinguist, SearchGraph, StaticLinguist};
use crate::result::SearchResult;

const THREAD_ENV: &str = "DECODER_THREADS";
const BATCH_BLOCK_SIZE: usize = 256;
/// Frames per `recognize` call in [`phoneme_recognizer`]. Each call snapshots
/// the live token chains into its result.
pub const PHONEME_BLOCK_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerState {
    Deallocated,
    Allocating,
    Allocated,
    Ready,
    Recognizing,
    Deallocating,
    Error,
}

pub type StateListener = Box<dyn FnMut(RecognizerState) + Send>;
pub type ResultListener = Box<dyn FnMut(&SearchResult) + Send>;

/// Runs whole utterances through a [`SearchManager`] in blocks of frames,
/// reporting every intermediate result.
pub struct Recognizer {
    search: Box<dyn SearchManager>,
    state: RecognizerState,
    feature_block_size: usize,
    state_listeners: Vec<StateListener>,
    result_listeners: Vec<ResultListener>,
}

impl Recognizer {
    pub fn new(search: Box<dyn SearchManager>, feature_block_size: usize) -> Self {
        Self {
            search,
            state: RecognizerState::Deallocated,
            feature_block_size: feature_block_size.max(1),
            state_listeners: Vec::new(),
            result_listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> RecognizerState {
        self.state
    }

    pub fn feature_block_size(&self) -> usize {
        self.feature_block_size
    }

    pub fn add_state_listener(&mut self, listener: impl FnMut(RecognizerState) + Send + 'static) {
        self.state_listeners.push(Box::new(listener));
    }

    pub fn add_result_listener(&mut self, listener: impl FnMut(&SearchResult) + Send + 'static) {
        self.result_listeners.push(Box::new(listener));
    }

    fn set_state(&mut self, state: RecognizerState) {
        self.state = state;
        for listener in &mut self.state_listeners {
            listener(state);
        }
    }

    pub fn allocate(&mut self) -> Result<(), SearchError> {
        self.set_state(RecognizerState::Allocating);
        let start = Instant::now();
        if let Err(err) = self.search.allocate() {
            log::error!("Recognizer allocation failed: {err}");
            self.set_state(RecognizerState::Error);
            return Err(err);
        }
        self.set_state(RecognizerState::Allocated);
        log::info!("Recognizer allocated in {:?}", start.elapsed());
        self.set_state(RecognizerState::Ready);
        Ok(())
    }

    /// Decodes one utterance. Returns the last result produced, or `None` if
    /// the input was already exhausted.
    pub fn recognize(&mut self) -> Result<Option<SearchResult>, SearchError> {
        if self.state != RecognizerState::Ready {
            return Err(SearchError::NotAllocated);
        }
        self.set_state(RecognizerState::Recognizing);
        let outcome = self.decode();
        self.search.stop_recognition();

        match &outcome {
            Err(err) if err.is_setup_error() => self.set_state(RecognizerState::Error),
            _ => self.set_state(RecognizerState::Ready),
        }
        outcome
    }

    fn decode(&mut self) -> Result<Option<SearchResult>, SearchError> {
        self.search.start_recognition()?;
        let mut last = None;
        loop {
            let Some(result) = self.search.recognize(self.feature_block_size)? else {
                break;
            };
            for listener in &mut self.result_listeners {
                listener(&result);
            }
            let is_final = result.is_final();
            last = Some(result);
            if is_final {
                break;
            }
        }
        Ok(last)
    }

    pub fn deallocate(&mut self) {
        self.set_state(RecognizerState::Deallocating);
        self.search.deallocate();
        self.set_state(RecognizerState::Deallocated);
    }
}

/// Phone-loop recognizer over `model` with the stock beams and
/// context-independent phones, reporting a result every
/// [`PHONEME_BLOCK_SIZE`] frames.
pub fn phoneme_recognizer<S: FeatureSource + 'static>(
    model: Arc<AcousticModel>,
    source: S,
) -> Recognizer {
    let linguist = AllphoneLinguist::new(model, AllphoneConfig::context_independent());
    let search = BreadthFirstSearchManager::new(
        Box::new(linguist),
        Box::new(SimpleAcousticScorer::new(source)),
        Box::new(SimplePruner::new()),
        ActiveListFactory::new(&ActiveListConfig::default()),
        SearchConfig::default(),
    );
    Recognizer::new(Box::new(search), PHONEME_BLOCK_SIZE)
}

fn resolve_thread_count() -> usize {
    std::env::var(THREAD_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or_else(get_physical)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Decodes independent utterances against one shared graph. Results come
/// back in input order.
pub fn decode_batch<S: FeatureSource + 'static>(
    graph: Arc<dyn SearchGraph>,
    sources: Vec<S>,
    search: &SearchConfig,
    lists: &ActiveListConfig,
) -> Vec<Result<Option<SearchResult>, SearchError>> {
    let count = sources.len();
    let workers = resolve_thread_count().min(count).max(1);
    let start = Instant::now();
    log::info!("Decoding {count} utterances on {workers} threads");

    let queue = Mutex::new(sources.into_iter().enumerate());
    let results: Mutex<Vec<Option<Result<Option<SearchResult>, SearchError>>>> =
        Mutex::new((0..count).map(|_| None).collect());
    let factory = ActiveListFactory::new(lists);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let Some((index, source)) = lock(&queue).next() else {
                    break;
                };
                let outcome = decode_one(Arc::clone(&graph), source, search, factory);
                lock(&results)[index] = Some(outcome);
            });
        }
    });

    log::info!("Batch of {count} decoded in {:?}", start.elapsed());
    results
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .into_iter()
        .map(|r| r.unwrap_or(Ok(None)))
        .collect()
}

fn decode_one<S: FeatureSource + 'static>(
    graph: Arc<dyn SearchGraph>,
    source: S,
    config: &SearchConfig,
    factory: ActiveListFactory,
) -> Result<Option<SearchResult>, SearchError> {
    let mut search = BreadthFirstSearchManager::new(
        Box::new(StaticLinguist::new(graph)),
        Box::new(SimpleAcousticScorer::new(source)),
        Box::new(SimplePruner::new()),
        factory,
        config.clone(),
    );
    search.allocate()?;
    search.start_recognition()?;
    let mut last = None;
    while let Some(result) = search.recognize(BATCH_BLOCK_SIZE)? {
        let is_final = result.is_final();
        last = Some(result);
        if is_final {
            break;
        }
    }
    search.stop_recognition();
    Ok(last)
}
