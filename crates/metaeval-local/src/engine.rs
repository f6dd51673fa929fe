//! The text-generation engine behind the local backend.

use crate::Result;

/// Generates continuations for one batch of already-templated inputs.
///
/// Implementations block until the whole batch is done and return one
/// continuation per input, in input order, without the echoed prompt.
/// Decoding must be deterministic.
pub trait GenerationEngine: Send + Sync + 'static {
    fn generate_batch(&self, inputs: &[String], max_new_tokens: usize) -> Result<Vec<String>>;
}
