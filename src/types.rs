//! Contains various types needed across the crate.

use crate::{MAX_CLUSTERS, MAX_PIXELS};
use std::{
    error::Error,
    fmt::{Debug, Display},
};

#[cfg(feature = "image")]
use image::{GrayImage, RgbImage};

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// An error type for when an input is above the maximum supported value.
///
/// The inner value is the maximum supported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AboveMaxLen<T>(pub T);

impl<T: Display> Display for AboveMaxLen<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "above the maximum length of {}", self.0)
    }
}

impl<T: Debug + Display> Error for AboveMaxLen<T> {}

/// An error type for image buffers whose shape does not describe their data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeError {
    /// The buffer length does not equal `width * height * depth`.
    LengthMismatch {
        /// The length implied by the dimensions.
        expected: usize,
        /// The actual buffer length.
        actual: usize,
    },
    /// `width * height` is above [`MAX_PIXELS`](crate::MAX_PIXELS).
    AboveMaxPixels(AboveMaxLen<u32>),
    /// The channel depth is zero.
    ZeroDepth,
}

impl Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthMismatch { expected, actual } => {
                write!(f, "buffer of length {actual} does not hold {expected} channel values")
            }
            Self::AboveMaxPixels(above) => write!(f, "pixel count is {above}"),
            Self::ZeroDepth => write!(f, "channel depth must be at least one"),
        }
    }
}

impl Error for ShapeError {}

/// An error type for degenerate clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    /// Zero clusters were requested.
    ZeroClusters,
    /// The image contains no pixels.
    EmptyImage,
    /// More clusters were requested than there are pixels to seed them from.
    NotEnoughPixels {
        /// The number of pixels in the image.
        pixels: u32,
        /// The number of requested clusters.
        clusters: u16,
    },
    /// Every cluster was discarded, leaving nothing to label pixels with.
    NoActiveClusters,
}

impl Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroClusters => write!(f, "at least one cluster is required"),
            Self::EmptyImage => write!(f, "the image contains no pixels"),
            Self::NotEnoughPixels { pixels, clusters } => {
                write!(f, "{clusters} clusters requested but the image has only {pixels} pixels")
            }
            Self::NoActiveClusters => {
                write!(f, "every cluster was discarded; the element minimum is too high for this image")
            }
        }
    }
}

impl Error for SegmentError {}

/// A borrowed channel-planar image of `u8` channel values.
///
/// The backing slice stores whole channel planes one after another:
/// the value of pixel `p` on channel `c` is `data[p + width * height * c]`.
/// The pixel count must not be greater than [`MAX_PIXELS`](crate::MAX_PIXELS).
///
/// # Examples
/// ```
/// # use segmette::{ImageSlice, ShapeError};
/// # fn main() -> Result<(), ShapeError> {
/// let data = vec![0u8; 4 * 4 * 3];
/// let image = ImageSlice::new(&data, 4, 4, 3)?;
/// assert_eq!(image.num_pixels(), 16);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSlice<'a> {
    /// The channel-planar data.
    data: &'a [u8],
    /// Image width in pixels.
    width: u32,
    /// Image height in pixels.
    height: u32,
    /// Number of channels per pixel.
    depth: usize,
}

impl<'a> ImageSlice<'a> {
    /// Creates an [`ImageSlice`], validating that the buffer length matches the
    /// dimensions and that the pixel count is supported.
    ///
    /// # Errors
    /// Returns a [`ShapeError`] if `depth` is zero, `width * height` is above
    /// [`MAX_PIXELS`](crate::MAX_PIXELS), or `data` does not hold exactly
    /// `width * height * depth` values.
    pub fn new(data: &'a [u8], width: u32, height: u32, depth: usize) -> Result<Self, ShapeError> {
        if depth == 0 {
            return Err(ShapeError::ZeroDepth);
        }
        let pixels = u64::from(width) * u64::from(height);
        if pixels > u64::from(MAX_PIXELS) {
            return Err(ShapeError::AboveMaxPixels(AboveMaxLen(MAX_PIXELS)));
        }
        #[allow(clippy::cast_possible_truncation)]
        let expected = pixels as usize * depth;
        if data.len() != expected {
            return Err(ShapeError::LengthMismatch { expected, actual: data.len() });
        }
        Ok(Self { data, width, height, depth })
    }

    /// Creates an [`ImageSlice`] without validating the dimensions.
    pub(crate) const fn new_unchecked(
        data: &'a [u8],
        width: u32,
        height: u32,
        depth: usize,
    ) -> Self {
        Self { data, width, height, depth }
    }

    /// Returns the underlying channel-planar data.
    #[must_use]
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Returns the image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns the number of channels per pixel.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the number of pixels, `width * height`.
    #[must_use]
    pub const fn num_pixels(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        {
            (self.width as u64 * self.height as u64) as u32
        }
    }

    /// Returns true if the image has no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.num_pixels() == 0
    }

    /// The value of pixel `p` on channel `c`.
    pub(crate) fn channel_value(&self, p: usize, c: usize) -> u8 {
        self.data[p + self.num_pixels() as usize * c]
    }

    /// Copies the channel vector of pixel `p` into `out`.
    pub(crate) fn copy_pixel(&self, p: usize, out: &mut [u8]) {
        let pixels = self.num_pixels() as usize;
        for (c, value) in out.iter_mut().enumerate() {
            *value = self.data[p + pixels * c];
        }
    }
}

/// An owned channel-planar image of `u8` channel values.
///
/// The owned counterpart of [`ImageSlice`], with the same layout. With the
/// `image` feature enabled, `RgbImage`s and `GrayImage`s convert into this
/// type via `TryFrom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuf {
    /// The channel-planar data.
    data: Vec<u8>,
    /// Image width in pixels.
    width: u32,
    /// Image height in pixels.
    height: u32,
    /// Number of channels per pixel.
    depth: usize,
}

impl ImageBuf {
    /// Creates an [`ImageBuf`] from channel-planar data, validating the shape
    /// like [`ImageSlice::new`].
    ///
    /// # Errors
    /// Returns a [`ShapeError`] under the same conditions as [`ImageSlice::new`].
    pub fn new(data: Vec<u8>, width: u32, height: u32, depth: usize) -> Result<Self, ShapeError> {
        ImageSlice::new(&data, width, height, depth)?;
        Ok(Self { data, width, height, depth })
    }

    /// Borrows the buffer as an [`ImageSlice`].
    #[must_use]
    pub fn as_slice(&self) -> ImageSlice<'_> {
        ImageSlice::new_unchecked(&self.data, self.width, self.height, self.depth)
    }

    /// Returns the underlying channel-planar data.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(feature = "image")]
impl TryFrom<&RgbImage> for ImageBuf {
    type Error = AboveMaxLen<u32>;

    fn try_from(image: &RgbImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        let pixels = u64::from(width) * u64::from(height);
        if pixels > u64::from(MAX_PIXELS) {
            return Err(AboveMaxLen(MAX_PIXELS));
        }
        #[allow(clippy::cast_possible_truncation)]
        let pixels = pixels as usize;

        let mut data = vec![0; pixels * 3];
        for (p, pixel) in image.pixels().enumerate() {
            for (c, &value) in pixel.0.iter().enumerate() {
                data[p + pixels * c] = value;
            }
        }
        Ok(Self { data, width, height, depth: 3 })
    }
}

#[cfg(feature = "image")]
impl TryFrom<&GrayImage> for ImageBuf {
    type Error = AboveMaxLen<u32>;

    fn try_from(image: &GrayImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        let pixels = u64::from(width) * u64::from(height);
        if pixels > u64::from(MAX_PIXELS) {
            return Err(AboveMaxLen(MAX_PIXELS));
        }
        Ok(Self {
            data: image.as_raw().clone(),
            width,
            height,
            depth: 1,
        })
    }
}

/// This type specifies the number of clusters to segment an image into.
///
/// A simple new type wrapper around `u16` with the invariant that it must be
/// less than or equal to [`MAX_CLUSTERS`](crate::MAX_CLUSTERS).
///
/// # Examples
/// Use `into` to create [`ClusterCount`]s from `u8`s.
/// For `u16`s, use `try_into` or [`ClusterCount::from_clamped`].
///
/// ```
/// # use segmette::{ClusterCount, AboveMaxLen};
/// # fn main() -> Result<(), AboveMaxLen<u16>> {
/// let k = ClusterCount::from(16);
/// let k: ClusterCount = 128u16.try_into()?;
/// let k = ClusterCount::from_clamped(1024);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClusterCount(u16);

impl ClusterCount {
    /// The maximum supported cluster count (given by [`MAX_CLUSTERS`](crate::MAX_CLUSTERS)).
    pub const MAX: Self = Self(MAX_CLUSTERS);

    /// Gets the inner `u16` value.
    #[must_use]
    pub const fn into_inner(self) -> u16 {
        self.0
    }

    /// Creates a [`ClusterCount`] by clamping the given `u16` to be less than
    /// or equal to [`MAX_CLUSTERS`](crate::MAX_CLUSTERS).
    #[must_use]
    pub const fn from_clamped(value: u16) -> Self {
        if value <= MAX_CLUSTERS {
            Self(value)
        } else {
            Self(MAX_CLUSTERS)
        }
    }
}

impl From<ClusterCount> for u16 {
    fn from(val: ClusterCount) -> Self {
        val.into_inner()
    }
}

impl From<u8> for ClusterCount {
    fn from(value: u8) -> Self {
        Self(value.into())
    }
}

impl TryFrom<u16> for ClusterCount {
    type Error = AboveMaxLen<u16>;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= MAX_CLUSTERS {
            Ok(ClusterCount(value))
        } else {
            Err(AboveMaxLen(MAX_CLUSTERS))
        }
    }
}

impl Display for ClusterCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_inner())
    }
}

/// The output struct returned by the segmentation drivers.
///
/// `centroids` is a flat channel-minor table: cluster `i` occupies
/// `centroids[i * depth..(i + 1) * depth]`. `labels` holds one index into that
/// table per pixel, in the same raster order as the input image, and `counts`
/// holds the number of pixels labeled with each cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOutput {
    /// The final cluster centroids, one `depth`-length vector per cluster.
    pub centroids: Vec<u8>,
    /// The number of pixels labeled with each cluster.
    pub counts: Vec<u32>,
    /// The per-pixel cluster index.
    pub labels: Vec<u16>,
    /// The number of channels per centroid.
    pub depth: usize,
}

impl SegmentOutput {
    /// Returns the number of clusters in the output.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn num_clusters(&self) -> u16 {
        self.counts.len() as u16
    }

    /// Returns the centroid vector of cluster `i`.
    #[must_use]
    pub fn centroid(&self, i: u16) -> &[u8] {
        let start = usize::from(i) * self.depth;
        &self.centroids[start..start + self.depth]
    }

    /// Rewrites every pixel to its cluster's centroid, producing a
    /// channel-planar image of the same shape as the input.
    #[must_use]
    pub fn mean_color_image(&self) -> Vec<u8> {
        let pixels = self.labels.len();
        let mut out = vec![0; pixels * self.depth];
        if pixels == 0 {
            return out;
        }
        for (c, plane) in out.chunks_exact_mut(pixels).enumerate() {
            for (value, &label) in plane.iter_mut().zip(&self.labels) {
                *value = self.centroids[usize::from(label) * self.depth + c];
            }
        }
        out
    }

    /// Parallel version of [`mean_color_image`](Self::mean_color_image).
    #[cfg(feature = "threads")]
    #[must_use]
    pub fn mean_color_image_par(&self) -> Vec<u8> {
        const CHUNK: usize = 4096;

        let pixels = self.labels.len();
        let mut out = vec![0; pixels * self.depth];
        if pixels == 0 {
            return out;
        }
        for (c, plane) in out.chunks_exact_mut(pixels).enumerate() {
            plane
                .par_chunks_mut(CHUNK)
                .zip(self.labels.par_chunks(CHUNK))
                .for_each(|(plane, labels)| {
                    for (value, &label) in plane.iter_mut().zip(labels) {
                        *value = self.centroids[usize::from(label) * self.depth + c];
                    }
                });
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn image_slice_validates_shape() {
        let data = vec![0u8; 12];
        assert!(ImageSlice::new(&data, 2, 2, 3).is_ok());
        assert_eq!(
            ImageSlice::new(&data, 2, 2, 2),
            Err(ShapeError::LengthMismatch { expected: 8, actual: 12 })
        );
        assert_eq!(ImageSlice::new(&data, 2, 2, 0), Err(ShapeError::ZeroDepth));
        assert_eq!(
            ImageSlice::new(&[], u32::MAX, 2, 1),
            Err(ShapeError::AboveMaxPixels(AboveMaxLen(MAX_PIXELS)))
        );
    }

    #[test]
    fn image_slice_planar_access() {
        // 2x1 image, 2 channels: pixel 0 = (1, 3), pixel 1 = (2, 4).
        let data = [1u8, 2, 3, 4];
        let image = ImageSlice::new(&data, 2, 1, 2).unwrap();

        assert_eq!(image.channel_value(0, 1), 3);
        assert_eq!(image.channel_value(1, 0), 2);

        let mut pixel = [0u8; 2];
        image.copy_pixel(1, &mut pixel);
        assert_eq!(pixel, [2, 4]);
    }

    #[test]
    fn cluster_count_bounds() {
        assert_eq!(ClusterCount::from(16).into_inner(), 16);
        assert_eq!(ClusterCount::try_from(256u16).unwrap(), ClusterCount::MAX);
        assert_eq!(ClusterCount::try_from(257u16), Err(AboveMaxLen(MAX_CLUSTERS)));
        assert_eq!(ClusterCount::from_clamped(1024), ClusterCount::MAX);
    }

    #[test]
    fn mean_color_image_rewrites_labels() {
        let output = SegmentOutput {
            centroids: vec![10, 20, 200, 210],
            counts: vec![2, 1],
            labels: vec![0, 1, 0],
            depth: 2,
        };

        let expected = vec![10, 200, 10, 20, 210, 20];
        assert_eq!(output.mean_color_image(), expected);

        #[cfg(feature = "threads")]
        assert_eq!(output.mean_color_image_par(), expected);
    }

    #[test]
    fn mean_color_image_empty() {
        let output = SegmentOutput {
            centroids: Vec::new(),
            counts: Vec::new(),
            labels: Vec::new(),
            depth: 1,
        };
        assert!(output.mean_color_image().is_empty());
    }

    #[cfg(feature = "image")]
    #[test]
    fn rgb_image_converts_to_planar() {
        let image = RgbImage::from_fn(2, 2, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            let p = (y * 2 + x) as u8;
            image::Rgb([p, p + 10, p + 20])
        });

        let buf = ImageBuf::try_from(&image).unwrap();
        let slice = buf.as_slice();
        assert_eq!(slice.depth(), 3);
        assert_eq!(slice.num_pixels(), 4);
        assert_eq!(slice.data(), &[0, 1, 2, 3, 10, 11, 12, 13, 20, 21, 22, 23]);
    }

    #[cfg(feature = "image")]
    #[test]
    fn gray_image_converts_to_planar() {
        let image = GrayImage::from_raw(2, 2, vec![5, 6, 7, 8]).unwrap();
        let buf = ImageBuf::try_from(&image).unwrap();
        assert_eq!(buf.as_slice().data(), &[5, 6, 7, 8]);
        assert_eq!(buf.as_slice().depth(), 1);
    }
}
