pub mod hmm;
pub mod model;
pub mod senone;
pub mod unit;

pub use hmm::{Hmm, SenoneId, SenoneSequence};
pub use model::{AcousticModel, ModelDefinition};
pub use senone::{MixtureComponent, Senone};
pub use unit::{looks_like_filler, Unit, SILENCE};
