//! User preference regression (C12) and job scoring against it (C13).

mod linalg;
pub mod regression;
pub mod scorer;

pub use regression::PreferenceTrainer;
pub use scorer::{JobScoreContext, JobScoreOutcome, JobScorer};
