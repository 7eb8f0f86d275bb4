use std::cmp::Ordering;

use ndarray::{Array2, ArrayD, ArrayView1, Axis};

use crate::error::{Result, ServiceError};
use crate::models::Classification;

pub const DEFAULT_TOP_K: usize = 5;

/// How class indices are ranked. Both strategies return the same order:
/// descending probability, ties broken by ascending index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    ArgSort,
    TopK,
}

/// How a synset line becomes the returned class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFormat {
    Verbatim,
    /// Second whitespace token of the line: `n02123045 tabby, tabby cat` -> `tabby,`.
    StripSynsetId,
}

/// Collapses `(N, C, 1, 1, ..)` network outputs to `(N, C)`.
pub fn squeeze_scores(output: ArrayD<f32>) -> Result<Array2<f32>> {
    let dims = match output.shape() {
        [c] => Some((1, *c)),
        [n, c, rest @ ..] if rest.iter().all(|&d| d == 1) => Some((*n, *c)),
        _ => None,
    };
    let (batch, classes) = dims.ok_or_else(|| ServiceError::ShapeMismatch {
        shape: output.shape().to_vec(),
        reason: "expected (batch, classes) with trailing unit axes".into(),
    })?;

    output
        .into_shape((batch, classes))
        .map_err(|e| ServiceError::ShapeMismatch {
            shape: vec![batch, classes],
            reason: e.to_string(),
        })
}

/// Row-wise softmax along the class axis.
pub fn softmax(scores: Array2<f32>) -> Array2<f32> {
    let mut probs = scores;
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    probs
}

fn by_probability<'r, 'v>(row: &'r ArrayView1<'v, f32>) -> impl Fn(&usize, &usize) -> Ordering + use<'r, 'v> {
    move |&a, &b| row[b].total_cmp(&row[a]).then(a.cmp(&b))
}

/// Every index of `row`, most probable first.
pub fn argsort_descending(row: ArrayView1<f32>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..row.len()).collect();
    order.sort_by(by_probability(&row));
    order
}

/// The `k` most probable indices of `row` without sorting the tail.
pub fn top_k(row: ArrayView1<f32>, k: usize) -> Vec<usize> {
    let k = k.min(row.len());
    if k == 0 {
        return Vec::new();
    }
    let cmp = by_probability(&row);
    let mut order: Vec<usize> = (0..row.len()).collect();
    order.select_nth_unstable_by(k - 1, &cmp);
    order.truncate(k);
    order.sort_by(&cmp);
    order
}

pub fn format_label(label: &str, index: usize, format: LabelFormat) -> Result<String> {
    match format {
        LabelFormat::Verbatim => Ok(label.to_string()),
        LabelFormat::StripSynsetId => label
            .split_whitespace()
            .nth(1)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::MalformedLabel {
                index,
                label: label.to_string(),
            }),
    }
}

/// Top `k` `(label, probability)` pairs of one probability row.
pub fn top_probability(
    row: ArrayView1<f32>,
    labels: &[String],
    k: usize,
    ranking: Ranking,
    format: LabelFormat,
) -> Result<Vec<Classification>> {
    let indices = match ranking {
        Ranking::ArgSort => {
            let mut all = argsort_descending(row);
            all.truncate(k);
            all
        }
        Ranking::TopK => top_k(row, k),
    };

    indices
        .into_iter()
        .map(|i| {
            let label = labels.get(i).ok_or(ServiceError::LabelIndexOutOfRange {
                index: i,
                labels: labels.len(),
            })?;
            Ok(Classification {
                class: format_label(label, i, format)?,
                probability: row[i],
            })
        })
        .collect()
}
