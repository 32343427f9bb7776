pub mod gbdt;
pub mod traits;

pub use gbdt::{GbdtClassifier, GbdtParams};
pub use traits::Classifier;
