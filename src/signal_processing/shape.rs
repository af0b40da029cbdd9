//! Constellation shape matching.
//!
//! Compares the current peak constellation against the calibrated
//! reference and recovers the integer lobe offset: under acoustic
//! distortion the global maximum can hop to a neighbouring carrier peak,
//! and the offset tells the controller which slot the timing anchor
//! actually moved to.

use super::peaks::Constellation;

/// Result of matching a constellation against a reference.
#[derive(Debug, Clone)]
pub struct ShapeMatch {
    /// MSE per candidate offset; index 0 is offset `-search_range / 2`.
    pub mse: Vec<f32>,
    /// Index of the minimum finite MSE, if any entry is finite.
    best: Option<usize>,
    half_range: isize,
}

impl ShapeMatch {
    /// Signed lobe offset of the best match.
    pub fn offset(&self) -> Option<isize> {
        self.best.map(|b| b as isize - self.half_range)
    }

    /// MSE at the best match; NaN when no offset had overlapping peaks.
    pub fn best_mse(&self) -> f32 {
        match self.best {
            Some(b) => self.mse[b],
            None => f32::NAN,
        }
    }
}

/// Slide `current` against `reference` over `[-search_range/2,
/// +search_range/2]` and score each offset with the mean squared amplitude
/// error over slot pairs where both peaks are present. Offsets with no
/// overlapping pairs score NaN; when every offset is NaN the match has
/// failed and `offset()` is `None`.
pub fn match_shape(
    reference: &Constellation,
    current: &Constellation,
    search_range: usize,
) -> ShapeMatch {
    let len = reference.len().min(current.len()) as isize;
    let half_range = (search_range / 2) as isize;
    let mut mse = Vec::with_capacity(search_range);

    for off in -half_range..=half_range {
        let start = (-off).max(0);
        let mut stop = len + off;
        if stop > len {
            stop = len - off;
        }

        let mut sum = 0.0f32;
        let mut count = 0u32;
        for i in start..stop {
            let r = reference.get(i as usize);
            let c = current.get((i + off) as usize);
            if r.present && c.present {
                let v = r.amplitude - c.amplitude;
                sum += v * v;
                count += 1;
            }
        }
        mse.push(if count > 0 { sum / count as f32 } else { f32::NAN });
    }

    let best = mse
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i);

    ShapeMatch {
        mse,
        best,
        half_range,
    }
}
