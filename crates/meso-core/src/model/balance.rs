//! Class balancing by resampling with replacement.
use rand::Rng;
use tracing::info;

use crate::error::{Error, Result};

/// Resample both classes, with replacement, to `factor × minority count`
/// rows each. The output holds positives first, then negatives.
///
/// With 40 positives and 300 negatives and factor 4, both classes are
/// drawn 160 times: the minority is oversampled, the majority undersampled.
pub fn balance_classes<T, F, R>(rows: &[T], label: F, factor: usize, rng: &mut R) -> Result<Vec<T>>
where
    T: Clone,
    F: Fn(&T) -> bool,
    R: Rng + ?Sized,
{
    let (positives, negatives): (Vec<&T>, Vec<&T>) = rows.iter().partition(|r| label(*r));
    if positives.is_empty() || negatives.is_empty() {
        return Err(Error::SingleClass(format!(
            "{} positive and {} negative rows",
            positives.len(),
            negatives.len()
        )));
    }
    if factor == 0 {
        return Err(Error::Config("balance factor must be at least 1".into()));
    }

    let target = factor * positives.len().min(negatives.len());
    let mut out = Vec::with_capacity(2 * target);
    for class in [&positives, &negatives] {
        out.extend((0..target).map(|_| class[rng.gen_range(0..class.len())].clone()));
    }
    info!(
        positives = positives.len(),
        negatives = negatives.len(),
        per_class = target,
        "classes balanced"
    );
    Ok(out)
}
