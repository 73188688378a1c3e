pub mod process;
pub mod types;

use crate::error::AnalyzerError;
use async_trait::async_trait;

pub use process::ProcessAnalyzer;
pub use types::{AnalyzerInput, AnalyzerOutput, DoctorReport};

/// Runs one analysis over a serialized [`AnalyzerInput`] payload.
///
/// Implementations only guarantee that a successful run exited cleanly;
/// the caller decides whether stdout is usable.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn run(&self, payload: &[u8]) -> Result<AnalyzerOutput, AnalyzerError>;
}
