//! Reducing model output tensors to one vector per input

use ndarray::{ArrayView2, ArrayView3, Axis};

use crate::models::{Embedding, EmbeddingError, EmbeddingResult};

/// View a flat output buffer as `[batch, seq, hidden]`
pub fn view3<'a>(dims: &[usize], data: &'a [f32]) -> EmbeddingResult<ArrayView3<'a, f32>> {
    if dims.len() != 3 {
        return Err(EmbeddingError::EmbeddingFailed {
            error: format!("Expected 3D output tensor, got {}D", dims.len()),
        });
    }
    ArrayView3::from_shape((dims[0], dims[1], dims[2]), data).map_err(|e| EmbeddingError::EmbeddingFailed {
        error: format!("Failed to create output array view: {:?}", e),
    })
}

/// Hidden state of the first position (`[CLS]`) for every row
pub fn cls_pooling(hidden: ArrayView3<f32>) -> EmbeddingResult<Vec<Embedding>> {
    if hidden.len_of(Axis(1)) == 0 {
        return Err(EmbeddingError::EmbeddingFailed {
            error: "Output tensor has an empty sequence dimension".to_string(),
        });
    }
    Ok(hidden
        .axis_iter(Axis(0))
        .map(|row| row.row(0).to_vec())
        .collect())
}

/// Sparse term weights from masked-LM logits
///
/// For each row and vocabulary entry: the max of `logits * mask` over
/// positions, then `ln(1 + relu(x))`. Entries listed in `special_ids` are
/// dropped, as are zero weights. Returns `(token_id, weight)` pairs in
/// ascending id order.
pub fn sparse_pooling(
    logits: ArrayView3<f32>,
    attention_mask: ArrayView2<i64>,
    special_ids: &[u32],
) -> EmbeddingResult<Vec<Vec<(u32, f32)>>> {
    let (batch, seq, vocab) = logits.dim();
    if attention_mask.dim() != (batch, seq) {
        return Err(EmbeddingError::EmbeddingFailed {
            error: format!(
                "Attention mask shape {:?} doesn't match logits shape {:?}",
                attention_mask.dim(),
                (batch, seq)
            ),
        });
    }

    let mut rows = Vec::with_capacity(batch);
    for b in 0..batch {
        // Masked positions contribute 0, which relu would clamp to anyway
        let mut maxima = vec![0.0f32; vocab];
        for s in 0..seq {
            if attention_mask[[b, s]] == 0 {
                continue;
            }
            let position = logits.slice(ndarray::s![b, s, ..]);
            for (max, &value) in maxima.iter_mut().zip(position.iter()) {
                if value > *max {
                    *max = value;
                }
            }
        }

        for &id in special_ids {
            if let Some(slot) = maxima.get_mut(id as usize) {
                *slot = 0.0;
            }
        }

        rows.push(
            maxima
                .into_iter()
                .enumerate()
                .filter(|(_, value)| *value > 0.0)
                .map(|(id, value)| (id as u32, value.ln_1p()))
                .collect(),
        );
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};

    #[test]
    fn test_cls_pooling_takes_first_position() {
        // [batch=2, seq=2, hidden=3]
        let data = vec![
            1.0, 2.0, 3.0, 9.0, 9.0, 9.0, //
            4.0, 5.0, 6.0, 8.0, 8.0, 8.0,
        ];
        let view = view3(&[2, 2, 3], &data).unwrap();
        let pooled = cls_pooling(view).unwrap();

        assert_eq!(pooled, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_view3_rejects_wrong_rank() {
        assert!(view3(&[2, 3], &[0.0; 6]).is_err());
        assert!(view3(&[2, 2, 2], &[0.0; 7]).is_err());
    }

    #[test]
    fn test_sparse_pooling() {
        // [batch=1, seq=3, vocab=4]; position 2 is padding
        let logits = Array3::from_shape_vec(
            (1, 3, 4),
            vec![
                1.0, -2.0, 0.5, 3.0, //
                2.0, -1.0, 0.0, 1.0, //
                9.0, 9.0, 9.0, 9.0,
            ],
        )
        .unwrap();
        let mask = arr2(&[[1i64, 1, 0]]);

        let rows = sparse_pooling(logits.view(), mask.view(), &[3]).unwrap();

        assert_eq!(rows.len(), 1);
        let ids: Vec<u32> = rows[0].iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!((rows[0][0].1 - 2.0f32.ln_1p()).abs() < 1e-6);
        assert!((rows[0][1].1 - 0.5f32.ln_1p()).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_pooling_all_negative_row_is_empty() {
        let logits = Array3::from_elem((1, 2, 3), -1.0f32);
        let mask = arr2(&[[1i64, 1]]);
        let rows = sparse_pooling(logits.view(), mask.view(), &[]).unwrap();
        assert!(rows[0].is_empty());
    }

    #[test]
    fn test_sparse_pooling_mask_shape_checked() {
        let logits = Array3::from_elem((2, 2, 3), 1.0f32);
        let mask = arr2(&[[1i64, 1]]);
        assert!(sparse_pooling(logits.view(), mask.view(), &[]).is_err());
    }
}
