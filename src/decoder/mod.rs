pub mod active_list;
pub mod config;
pub mod pruner;
pub mod scorer;
pub mod search;
pub mod stats;
pub mod token;

pub use active_list::{ActiveList, ActiveListFactory};
pub use config::{ActiveListConfig, SearchConfig};
pub use pruner::{PruneStrategy, SimplePruner};
pub use scorer::{ScoreOutcome, ScoreProvider, SimpleAcousticScorer};
pub use search::{BreadthFirstSearchManager, FrameListener, SearchManager, SearchPhase};
pub use stats::{FrameSummary, SearchStatistics};
pub use token::{Token, TokenArena, TokenId, TokenRemap};
