//! Specifies the CLI and handles arg parsing

use clap::{Parser, ValueEnum};
use colorcut::{NormalizationMethod, SeedMethod};
use std::{
	fmt::{Debug, Display},
	num::ParseFloatError,
	ops::RangeBounds,
	path::PathBuf,
	str::FromStr,
};

/// Palette generation algorithms
#[derive(Copy, Clone, ValueEnum)]
pub enum Method {
	/// Recursively split the color cube at the median of its longest side
	MedianCut,
	/// Cluster the colors with k-means
	#[value(name = "kmeans")]
	KMeans,
}

/// Preprocessing of the color channels for k-means
#[derive(Copy, Clone, ValueEnum)]
pub enum Normalization {
	/// Divide each channel by --divisor
	Linear,
	/// Standardize each channel to zero mean and unit variance
	Gaussian,
}

/// Initialization methods for k-means
#[derive(Copy, Clone, ValueEnum)]
pub enum Init {
	/// Assign colors to random clusters
	Random,
	/// Pick spread out starting centers
	#[value(name = "kmeans++")]
	KMeansPlusPlus,
}

impl From<Init> for SeedMethod {
	fn from(init: Init) -> Self {
		match init {
			Init::Random => SeedMethod::Random,
			Init::KMeansPlusPlus => SeedMethod::KMeansPlusPlus,
		}
	}
}

/// The order pixels are visited in while scanning
#[derive(Copy, Clone, ValueEnum)]
pub enum ScanOrder {
	/// Row by row, each from left to right
	Raster,
	/// Row by row, alternating left to right and right to left
	Serpentine,
}

/// Supported output formats for the final colors
#[derive(Copy, Clone, ValueEnum)]
pub enum FormatOutput {
	/// sRGB hexcode
	Hex,
	/// sRGB (r,g,b) triple
	Rgb,
	/// Whitespace with true color background
	Swatch,
}

/// Sort orders for the final colors
#[derive(Copy, Clone, ValueEnum)]
pub enum SortOutput {
	/// The order produced by the algorithm
	None,
	/// Ascending hue
	H,
	/// Ascending saturation
	S,
	/// Ascending lightness
	L,
}

/// Ways to colorize the output text
#[derive(Copy, Clone, ValueEnum)]
pub enum ColorizeOutput {
	/// Foreground
	Fg,
	/// Background
	Bg,
}

/// Reduce the colors of an image to a small palette using median cut or k-means clustering.
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser)]
#[command(version)]
pub struct Options {
	/// The path to the input image
	pub image: PathBuf,

	/// The algorithm used to generate the palette
	#[arg(short, long, default_value = "median-cut")]
	pub method: Method,

	/// The (maximum) number of colors to find
	///
	/// If the image has no more distinct colors than this, they are printed as is.
	#[arg(short = 'k', long, default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..))]
	pub colors: u16,

	/// Scan the image on a single thread
	#[arg(long)]
	pub no_parallel: bool,

	/// The number of parallel tasks used to scan the image
	#[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
	pub tasks: u16,

	/// The order in which pixels are visited while scanning
	///
	/// This does not affect the set of colors found, only the order in which they are found.
	#[arg(long, default_value = "raster")]
	pub scan: ScanOrder,

	/// The normalization applied to the color channels before k-means
	#[arg(long, default_value = "linear")]
	pub normalization: Normalization,

	/// The divisor used by linear normalization
	#[arg(long, default_value_t = 255.0, value_parser = parse_valid_divisor)]
	pub divisor: f64,

	/// The method used to choose the initial k-means clusters
	#[arg(long, default_value = "kmeans++")]
	pub init: Init,

	/// The number of trials of k-means to run
	///
	/// k-means can get stuck in a local minimum, so you may want to run a few or more trials to get better results.
	/// The trial with the lowest within-cluster sum of squares is picked.
	#[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
	pub trials: u32,

	/// The seed value used for the random number generator
	#[arg(long)]
	pub seed: Option<u64>,

	/// The maximum image size, in number of pixels, before a thumbnail is created
	///
	/// Unfortunately, this option may reduce the color accuracy,
	/// as multiple pixels in the original image are interpolated to form a pixel in the thumbnail.
	/// This option is intended for reducing the time needed for large images,
	/// but it can also be used to provide fast, inaccurate results for any image.
	#[arg(short = 'p', long, default_value_t = u32::MAX)]
	pub max_pixels: u32,

	/// The format to print the colors in
	#[arg(short, long, default_value = "hex")]
	pub output: FormatOutput,

	/// Color the foreground or background for each printed color
	#[arg(short, long)]
	pub colorize: Option<ColorizeOutput>,

	/// The order to print the colors in
	///
	/// The h, s, and l options below refer to Okhsl component values and not the HSL color space.
	#[arg(short, long, default_value = "none")]
	pub sort: SortOutput,

	/// Reverse the printed order of the colors
	#[arg(short, long)]
	pub reverse: bool,

	/// Print additional information, such as the running time of each step
	///
	/// The RUST_LOG environment variable takes precedence over this option.
	#[arg(long)]
	pub verbose: bool,
}

impl Options {
	/// The normalization method selected by --normalization and --divisor
	pub fn normalization_method(&self) -> NormalizationMethod {
		match self.normalization {
			Normalization::Linear => NormalizationMethod::Linear(self.divisor),
			Normalization::Gaussian => NormalizationMethod::Gaussian,
		}
	}
}

/// Parse a float value and ensure it in the provided, valid range
fn parse_float_in_range<T>(s: &str, range: impl RangeBounds<T> + Debug) -> Result<T, String>
where
	T: FromStr<Err = ParseFloatError> + Display + PartialOrd,
{
	let value: T = s.parse().map_err(|e| format!("{e}"))?;
	if range.contains(&value) {
		Ok(value)
	} else {
		Err(format!("{value} is not in {range:?}"))
	}
}

/// Parse the linear normalization divisor and ensure it is positive and finite
fn parse_valid_divisor(s: &str) -> Result<f64, String> {
	let value = parse_float_in_range(s, f64::MIN_POSITIVE..)?;
	if value.is_finite() {
		Ok(value)
	} else {
		Err(format!("{value} is not finite"))
	}
}
