//! Generate a color palette for a bitmap using median cut or k-means clustering.
//!
//! A [`Quantizer`] scans every pixel of a [`BitmapSource`] once, collecting the distinct colors
//! into a concurrent [`UniqueColorTable`]. A [`PaletteEngine`] then reduces those colors to a palette.
//! If the bitmap has no more distinct colors than requested, they are returned as is.
//!
//! # Examples
//!
//! ## Read an image file and get an 8 color median cut palette.
//!
//! ```no_run
//! use colorcut::{ColorQuantizer, Quantizer};
//!
//! let image = image::open("some image").unwrap().into_rgb8();
//! let palette = Quantizer::median_cut(image).quantize(8).unwrap();
//! ```
//!
//! ## Compute several palettes from a single scan.
//!
//! ```no_run
//! use colorcut::{ColorQuantizer, KMeansOptions, Quantizer};
//!
//! let image = image::open("some image").unwrap().into_rgb8();
//! let quantizer = Quantizer::kmeans(image, KMeansOptions { trials: 4, ..Default::default() });
//!
//! let small = quantizer.quantize(4).unwrap();
//! let large = quantizer.quantize(16).unwrap();
//! ```
//!
//! ## Scan a raw pixel buffer.
//!
//! ```
//! use colorcut::{Color, PixelLayout, RasterBuffer};
//!
//! // two pixels of 16 bit RGB565: pure red and pure blue
//! let data = [0x00, 0xF8, 0x1F, 0x00];
//! let source = RasterBuffer::new(&data, 2, 1, PixelLayout::Rgb565).unwrap();
//! let palette = colorcut::median_cut_palette(source, 4).unwrap();
//!
//! assert_eq!(palette.len(), 2);
//! assert!(palette.contains(&Color::new(255, 0, 0)));
//! assert!(palette.contains(&Color::new(0, 0, 255)));
//! ```
//!
//! # Arguments
//!
//! ## Color Count
//!
//! This is the (maximum) number of palette colors. It must be at least 1.
//!
//! Median cut runs `ceil(log2(color_count))` split rounds and keeps the darkest `color_count` cubes,
//! so palettes are sorted by ascending brightness.
//! Fewer colors are returned if there are not enough distinct colors to fill the palette.
//!
//! ## Parallel Scanning
//!
//! [`QuantizeOptions`] controls how many contiguous ranges of pixels are scanned concurrently.
//! The set of distinct colors does not depend on this, only the order in which they were first seen.
//! With the `threads` feature disabled, the ranges are scanned one after another.
//!
//! ## K-means
//!
//! [`KMeansOptions`] selects the normalization of the color channels, the initialization method,
//! the number of trials, and the seed for the random number generator.
//! The trial with the lowest within-cluster sum of squares is kept.
//! The same options and colors always give the same palette.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::cargo)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![warn(clippy::unwrap_used, clippy::unwrap_in_result)]
#![warn(clippy::unneeded_field_pattern, clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::str_to_string, clippy::string_to_string, clippy::string_slice)]
#![warn(missing_docs, clippy::missing_docs_in_private_items, rustdoc::all)]
#![warn(clippy::float_cmp_const, clippy::lossy_float_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::unreadable_literal)]

pub mod codec;
mod color;
mod error;
pub mod kmeans;
pub mod median_cut;
pub mod path;
mod quantizer;
pub mod scan;
pub mod source;
pub mod unique;

pub use codec::{PixelLayout, RawPixel};
pub use color::{dominant_color, Color};
pub use error::{Error, Result};
pub use kmeans::{KMeansOptions, NormalizationMethod, SeedMethod};
pub use median_cut::MedianCut;
pub use path::{PathProvider, Point, RasterPath, SerpentinePath};
pub use quantizer::{
	ColorQuantizer, KMeansPalette, KMeansQuantizer, MedianCutQuantizer, PaletteEngine, QuantizeOptions, Quantizer,
};
pub use source::{BitmapSource, RasterBuffer};
pub use unique::UniqueColorTable;

/// Computes a median cut palette of at most `color_count` colors for `source` with default options.
///
/// See the crate documentation for examples and information on each argument.
///
/// # Errors
/// Returns an error if `color_count` is zero or `source` cannot be scanned.
pub fn median_cut_palette(source: impl BitmapSource + Sync, color_count: usize) -> Result<Vec<Color>> {
	Quantizer::median_cut(source).quantize(color_count)
}

/// Computes a k-means palette of at most `color_count` colors for `source` with default scan options.
///
/// See the crate documentation for examples and information on each argument.
///
/// # Errors
/// Returns an error if `color_count` is zero, `source` cannot be scanned, or clustering fails.
pub fn kmeans_palette(
	source: impl BitmapSource + Sync,
	color_count: usize,
	options: KMeansOptions,
) -> Result<Vec<Color>> {
	Quantizer::kmeans(source, options).quantize(color_count)
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::{Rgb, RgbImage};

	fn two_tone() -> RgbImage {
		RgbImage::from_fn(8, 8, |x, _| if x < 4 { Rgb([250, 20, 20]) } else { Rgb([20, 20, 250]) })
	}

	#[test]
	fn convenience_functions_agree_with_quantizer() {
		let image = two_tone();
		assert_eq!(
			median_cut_palette(&image, 3).unwrap().len(),
			Quantizer::median_cut(&image).quantize(3).unwrap().len()
		);

		let options = KMeansOptions::default();
		let mut palette = kmeans_palette(&image, 2, options).unwrap();
		let mut expected = Quantizer::kmeans(&image, options).quantize(2).unwrap();
		palette.sort_by_key(|c| c.to_argb());
		expected.sort_by_key(|c| c.to_argb());
		assert_eq!(palette, expected);
	}

	#[test]
	fn dominant_color_of_a_palette() {
		let mut palette = median_cut_palette(&two_tone(), 2).unwrap();
		palette.sort_by_key(|c| c.r);
		assert_eq!(dominant_color(&palette), Some(Color::new(20, 20, 250)));
	}
}
