//! Flattening requests into one encoder batch and regrouping the results

use crate::handler::request::{Request, TextInput};
use crate::models::{EmbeddingError, EmbeddingResult};

/// All texts of a serving batch in request order, plus per-request counts
///
/// Invariant: `group_sizes.iter().sum() == texts.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatBatch {
    pub texts: Vec<String>,
    pub group_sizes: Vec<usize>,
}

impl FlatBatch {
    /// Decode and flatten a batch of requests; the first malformed request fails the batch
    pub fn flatten(requests: &[Request]) -> EmbeddingResult<Self> {
        let inputs = requests
            .iter()
            .enumerate()
            .map(|(index, request)| request.decode(index))
            .collect::<EmbeddingResult<Vec<_>>>()?;
        Ok(Self::from_inputs(inputs))
    }

    pub fn from_inputs(inputs: impl IntoIterator<Item = TextInput>) -> Self {
        let mut batch = FlatBatch::default();
        for input in inputs {
            batch.group_sizes.push(input.len());
            batch.texts.extend(input.into_texts());
        }
        batch
    }

    /// Total number of text items
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn request_count(&self) -> usize {
        self.group_sizes.len()
    }
}

/// Slice a flat, order-preserving output sequence back into per-request groups
///
/// Group `i` holds the `group_sizes[i]` items that follow the first
/// `group_sizes[..i].sum()` items. Zero-sized groups come back empty.
pub fn regroup<T>(flat: Vec<T>, group_sizes: &[usize]) -> EmbeddingResult<Vec<Vec<T>>> {
    let expected: usize = group_sizes.iter().sum();
    if flat.len() != expected {
        return Err(EmbeddingError::BatchMismatch {
            outputs: flat.len(),
            expected,
        });
    }

    let mut items = flat.into_iter();
    Ok(group_sizes
        .iter()
        .map(|&size| items.by_ref().take(size).collect())
        .collect())
}
