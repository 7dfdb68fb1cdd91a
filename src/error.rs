use thiserror::Error;

/// Errors raised while building a search graph or decoding an utterance.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ndarray shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Invalid acoustic model: {0}")]
    InvalidModel(String),

    #[error("Feature frame has {actual} values, expected {expected}")]
    FeatureDimension { expected: usize, actual: usize },

    #[error("Front-end failure: {0}")]
    FrontEnd(String),

    #[error("Search manager used before allocate()")]
    NotAllocated,
}

impl SearchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Io(_) => "The decoder could not read its model files. Check the path and permissions.",
            Self::Json(_) | Self::Shape(_) | Self::InvalidModel(_) => {
                "The acoustic model is malformed. Re-export the model and try again."
            }
            Self::FeatureDimension { .. } => {
                "The feature stream does not match the acoustic model. Check the front-end settings."
            }
            Self::FrontEnd(_) => "Reading features failed. The current utterance was abandoned.",
            Self::NotAllocated => "The recognizer must be allocated before decoding.",
        }
    }

    /// True for failures that happen while loading or building the search
    /// space; these abort the whole session and are never retried.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Json(_) | Self::Shape(_) | Self::InvalidModel(_) | Self::NotAllocated
        )
    }
}
