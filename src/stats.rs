//! Online mean and standard deviation, and the distance kernels shared by
//! every component.
//!
//! The recurrences update one sample at a time so a cluster never has to
//! revisit its members: the mean update is exact, and the standard deviation
//! follows from the previous deviation and the mean shift alone.

use crate::ImageSlice;

use num_traits::AsPrimitive;

/// One step of the running mean: the mean of `count + 1` samples, given the
/// mean of the first `count` and the next sample.
#[inline]
pub(crate) fn update_mean(mean: f64, count: u32, value: f64) -> f64 {
    mean + (value - mean) / f64::from(count + 1)
}

/// One step of the running standard deviation, given the deviation and mean of
/// the first `count` samples and the mean with the next sample added.
///
/// Returns 0 while there are fewer than two samples. The variance term is
/// clamped at zero before the square root; rounding can drive it slightly
/// negative when all samples are equal.
#[inline]
pub(crate) fn update_std_dev(sd: f64, count: u32, mean_before: f64, mean_after: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let count = f64::from(count);
    let shift = mean_after - mean_before;
    let variance = (1.0 - 1.0 / count) * sd * sd + (count + 1.0) * shift * shift;
    variance.max(0.0).sqrt()
}

/// Squared Euclidean distance between two channel vectors of the same length.
#[inline]
pub(crate) fn squared_distance<T>(a: &[T], b: &[T]) -> u64
where
    T: Copy + AsPrimitive<i64>,
{
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0i64;
    for (&x, &y) in a.iter().zip(b) {
        let diff = x.as_() - y.as_();
        sum += diff * diff;
    }
    #[allow(clippy::cast_sign_loss)] // sum of squares
    {
        sum as u64
    }
}

/// Euclidean distance truncated to a whole number; the metric the merge phase
/// compares against its threshold.
#[inline]
pub(crate) fn truncated_distance<T>(a: &[T], b: &[T]) -> f64
where
    T: Copy + AsPrimitive<i64>,
{
    #[allow(clippy::cast_precision_loss)]
    {
        (squared_distance(a, b) as f64).sqrt().trunc()
    }
}

/// Euclidean distance between two running-mean vectors.
#[inline]
pub(crate) fn mean_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Computes the per-channel standard deviation of a whole image.
///
/// Useful for picking the split threshold of
/// [`IsodataOptions::max_std_dev`](crate::IsodataOptions::max_std_dev):
/// a cluster is worth splitting when it is spread out relative to the image.
///
/// # Examples
/// ```
/// # use segmette::{channel_std_dev, ImageSlice, ShapeError};
/// # fn main() -> Result<(), ShapeError> {
/// let data = [0u8, 0, 0, 0, 7, 7, 7, 7];
/// let image = ImageSlice::new(&data, 2, 2, 2)?;
///
/// let sd = channel_std_dev(image);
/// assert_eq!(sd, vec![0.0, 0.0]);
/// # Ok(())
/// # }
/// ```
#[must_use]
pub fn channel_std_dev(image: ImageSlice<'_>) -> Vec<f64> {
    let pixels = image.num_pixels() as usize;
    let mut std_devs = vec![0.0; image.depth()];
    for (c, sd) in std_devs.iter_mut().enumerate() {
        let mut mean = 0.0;
        for p in 0..pixels {
            let value = f64::from(image.channel_value(p, c));
            #[allow(clippy::cast_possible_truncation)]
            let count = p as u32;
            let next = update_mean(mean, count, value);
            *sd = update_std_dev(*sd, count, mean, next);
            mean = next;
        }
    }
    std_devs
}
