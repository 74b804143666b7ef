// Library interface for the Rush command predictor
// This allows benchmarks and tests to access internal modules

pub mod completion;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod predictor;
