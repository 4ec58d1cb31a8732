//! Sequence classification boundary: the trait the session worker drives,
//! argmax/label resolution, and the ONNX-backed production implementation.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ndarray::Array3;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

/// Maps a fixed `(1, T, 3)` tensor to per-class probabilities.
///
/// Injected into the pipeline at construction so tests can substitute a
/// deterministic double. Failures are recoverable: the session worker
/// resolves them to the fallback label, never a crash.
pub trait SequenceClassifier: Send {
    fn classify(&mut self, input: &Array3<f32>) -> Result<Vec<f32>>;
}

/// ONNX Runtime sign classifier.
pub struct OrtSignClassifier {
    session: Session,
}

impl OrtSignClassifier {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load sign classifier from {}", model_path.display())
            })?;
        Ok(Self { session })
    }
}

impl SequenceClassifier for OrtSignClassifier {
    fn classify(&mut self, input: &Array3<f32>) -> Result<Vec<f32>> {
        let tensor = Tensor::from_array(input.clone())?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run sign classifier session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("sign classifier returned no outputs"));
        }

        let probabilities = outputs[0].try_extract_array::<f32>()?;
        Ok(probabilities.iter().copied().collect())
    }
}

/// Index of the largest probability; ties break toward the lowest index.
/// NaN entries are skipped. `None` only for an empty or all-NaN vector.
pub fn argmax(probabilities: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probabilities.iter().enumerate() {
        if p.is_nan() {
            continue;
        }
        match best {
            None => best = Some((i, p)),
            Some((_, top)) if p > top => best = Some((i, p)),
            Some(_) => {}
        }
    }
    best.map(|(i, _)| i)
}

/// Resolve a probability vector against the ordered label table. `None`
/// when the vector's arity does not match the table; callers treat that as
/// a classifier failure.
pub fn resolve_label(probabilities: &[f32], labels: &[String]) -> Option<(String, f32)> {
    if probabilities.len() != labels.len() {
        return None;
    }
    let winner = argmax(probabilities)?;
    Some((labels[winner].clone(), probabilities[winner]))
}
