//! Batch and payload limits enforced before a mutation is applied or sent.

use crate::mutation::Mutation;
use thiserror::Error;

/// Maximum number of items in a mutation's top-level batch array (records,
/// record ids, or config updates).
pub const MAX_MUTATION_BATCH_SIZE: usize = 50;

/// Maximum JSON-URL-encoded size of a whole mutation, in bytes. Kept just
/// under the backend's 2 MB request ceiling.
pub const MAX_MUTATION_SIZE: usize = 1_900_000;

#[derive(Debug, Error)]
pub enum LimitError {
    #[error(
        "Request for {mutation_type} exceeds the limit of {max} items per batch (got {actual})"
    )]
    BatchTooLarge {
        mutation_type: &'static str,
        actual: usize,
        max: usize,
    },
    #[error("Request for {mutation_type} exceeds the maximum size of {max} bytes (got {actual})")]
    PayloadTooLarge {
        mutation_type: &'static str,
        actual: usize,
        max: usize,
    },
    #[error("mutation could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Length of `s` after percent-encoding, in bytes.
///
/// Unreserved characters (`A-Z a-z 0-9 - _ . ! ~ * ' ( )`) count as one
/// byte; every other byte of the UTF-8 encoding counts as three (`%XX`).
pub fn url_encoded_len(s: &str) -> usize {
    s.bytes()
        .map(|b| if is_unreserved(b) { 1 } else { 3 })
        .sum()
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')')
}

/// JSON-URL-encoded size of a mutation, the metric [`MAX_MUTATION_SIZE`]
/// applies to.
pub fn mutation_encoded_size(mutation: &Mutation) -> Result<usize, LimitError> {
    let encoded = serde_json::to_string(mutation)?;
    Ok(url_encoded_len(&encoded))
}

/// Check both limits. Fails before anything is sent or locally applied.
pub fn check_mutation_under_limits(mutation: &Mutation) -> Result<(), LimitError> {
    let batch_len = mutation.batch_len();
    if batch_len > MAX_MUTATION_BATCH_SIZE {
        return Err(LimitError::BatchTooLarge {
            mutation_type: mutation.type_name(),
            actual: batch_len,
            max: MAX_MUTATION_BATCH_SIZE,
        });
    }
    let size = mutation_encoded_size(mutation)?;
    if size > MAX_MUTATION_SIZE {
        return Err(LimitError::PayloadTooLarge {
            mutation_type: mutation.type_name(),
            actual: size,
            max: MAX_MUTATION_SIZE,
        });
    }
    Ok(())
}
