pub mod acoustic;
pub mod decoder;
pub mod error;
pub mod frontend;
pub mod linguist;
pub mod logmath;
pub mod recognizer;
pub mod result;

pub use decoder::{BreadthFirstSearchManager, SearchConfig, SearchManager};
pub use error::SearchError;
pub use recognizer::{
    decode_batch, phoneme_recognizer, Recognizer, RecognizerState, PHONEME_BLOCK_SIZE,
};
pub use result::{Lattice, SearchResult, UnitResult};
