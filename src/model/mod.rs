pub mod ensemble;
pub mod features;
pub mod input;

pub use ensemble::{Confidence, Ensemble, ModelScores, Prediction};
pub use input::RaceInput;
