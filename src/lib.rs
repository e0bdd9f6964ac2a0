//! A library for iterative pixel clustering and unsupervised image segmentation.
//!
//! `segmette` assigns every pixel of a channel-planar image to its nearest cluster
//! centroid and iterates until the centroids stop moving. Three interchangeable
//! assignment strategies are provided, together with a self-tuning variant:
//! - [`kmeans::segment`]: k-means with a linear scan over the active clusters.
//! - [`kmeans::segment_kdtree`]: k-means with a kd-tree over the centroids,
//!   rebuilt each pass.
//! - [`kmeans::segment_cached`]: k-means reusing each pixel's previous assignment
//!   when it is still at least as close as before.
//! - [`isodata::segment`]: isodata clustering, which additionally discards,
//!   merges and splits clusters between assignment rounds to self-tune their count.
//!
//! # Features
//! To reduce dependencies and compile times, `segmette` has `cargo` features
//! that can be turned off or on:
//! - `threads`: exposes a parallel version of the label-to-color rewrite via [`rayon`].
//! - `image`: enables integration with the [`image`] crate.
//!
//! # Example
//! ```
//! use segmette::{kmeans, ClusterCount, ImageSlice, KmeansOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // A 4x4 single-channel image with two intensity bands.
//! let data = [10u8; 8].into_iter().chain([200u8; 8]).collect::<Vec<_>>();
//! let image = ImageSlice::new(&data, 4, 4, 1)?;
//!
//! let options = KmeansOptions::new().seed(7);
//! let output = kmeans::segment(image, ClusterCount::from(2u8), &options)?;
//!
//! assert_eq!(output.counts.iter().sum::<u32>(), 16);
//! let recolored = output.mean_color_image();
//! assert_eq!(recolored.len(), data.len());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports
)]

mod assign;
mod kdtree;
mod registry;
mod stats;
mod types;

pub mod isodata;
pub mod kmeans;

pub use isodata::IsodataOptions;
pub use kmeans::KmeansOptions;
pub use stats::channel_std_dev;
pub use types::*;

/// The maximum supported image size in number of pixels is `u32::MAX`.
pub const MAX_PIXELS: u32 = u32::MAX;

/// The maximum supported number of clusters is `256`.
///
/// The isodata driver can hold up to `2 * MAX_CLUSTERS + 2` transient clusters
/// while splitting, which is why cluster ids and labels are `u16` and not `u8`.
pub const MAX_CLUSTERS: u16 = u8::MAX as u16 + 1;

/// Smallest channel value; lower bound of every kd-tree hyperrectangle.
pub(crate) const MIN_CHANNEL: u8 = u8::MIN;

/// Largest channel value; upper bound of every kd-tree hyperrectangle.
pub(crate) const MAX_CHANNEL: u8 = u8::MAX;
