//! Median cut: repeatedly bisect the RGB bounding box of the colors at the median of its longest side

use crate::Color;
use tracing::{debug, trace};

/// A color channel that a cube can be split along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
	/// Red channel
	Red,
	/// Green channel
	Green,
	/// Blue channel
	Blue,
}

impl Axis {
	/// The value of this channel in `color`
	const fn channel(self, color: Color) -> u8 {
		match self {
			Axis::Red => color.r,
			Axis::Green => color.g,
			Axis::Blue => color.b,
		}
	}
}

/// A set of colors together with the smallest RGB box containing them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedianCutCube {
	/// Member colors
	colors: Vec<Color>,
	/// Per channel (red, green, blue) lower bound
	low: [u8; 3],
	/// Per channel (red, green, blue) upper bound
	high: [u8; 3],
	/// Position in the final palette, if this cube was selected
	palette_index: Option<usize>,
}

impl MedianCutCube {
	/// Create a cube shrunk to the bounds of `colors`.
	///
	/// An empty cube has inverted bounds, i.e., every side has a negative size.
	#[must_use]
	pub fn new(colors: Vec<Color>) -> Self {
		let mut low = [u8::MAX; 3];
		let mut high = [u8::MIN; 3];
		for color in &colors {
			for (i, v) in [color.r, color.g, color.b].into_iter().enumerate() {
				low[i] = low[i].min(v);
				high[i] = high[i].max(v);
			}
		}

		Self { colors, low, high, palette_index: None }
	}

	/// Size of the side for channel `i`
	fn size(&self, i: usize) -> i32 {
		i32::from(self.high[i]) - i32::from(self.low[i])
	}

	/// Length of the red side
	#[must_use]
	pub fn red_size(&self) -> i32 {
		self.size(0)
	}

	/// Length of the green side
	#[must_use]
	pub fn green_size(&self) -> i32 {
		self.size(1)
	}

	/// Length of the blue side
	#[must_use]
	pub fn blue_size(&self) -> i32 {
		self.size(2)
	}

	/// The longest side. Red wins ties with green and blue, and green wins ties with blue.
	#[must_use]
	pub fn longest_axis(&self) -> Axis {
		let (r, g, b) = (self.red_size(), self.green_size(), self.blue_size());
		if r >= g && r >= b {
			Axis::Red
		} else if g >= b {
			Axis::Green
		} else {
			Axis::Blue
		}
	}

	/// Member colors
	#[must_use]
	pub fn colors(&self) -> &[Color] {
		&self.colors
	}

	/// Number of member colors
	#[must_use]
	pub fn len(&self) -> usize {
		self.colors.len()
	}

	/// Whether this cube has no member colors
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.colors.is_empty()
	}

	/// Position in the final palette, if this cube was selected
	#[must_use]
	pub const fn palette_index(&self) -> Option<usize> {
		self.palette_index
	}

	/// The opaque per channel mean of the member colors, truncated to integers.
	///
	/// An empty cube has a mean of black.
	#[must_use]
	pub fn mean(&self) -> Color {
		if self.colors.is_empty() {
			return Color::BLACK;
		}

		let mut sum = [0u64; 3];
		for color in &self.colors {
			sum[0] += u64::from(color.r);
			sum[1] += u64::from(color.g);
			sum[2] += u64::from(color.b);
		}

		let n = self.colors.len() as u64;
		// the mean of u8 values fits in a u8
		#[allow(clippy::cast_possible_truncation)]
		let [r, g, b] = sum.map(|s| (s / n) as u8);
		Color::new(r, g, b)
	}

	/// Sort the members along the longest side and split them at the median index into `[0, mid)` and `[mid, len)`
	#[must_use]
	pub fn split(self) -> (Self, Self) {
		let axis = self.longest_axis();
		let mut colors = self.colors;
		// stable, so equal channel values keep their relative order
		colors.sort_by_key(|&color| axis.channel(color));
		let upper = colors.split_off(colors.len() / 2);
		(Self::new(colors), Self::new(upper))
	}
}

/// Number of split rounds needed to reach at least `color_count` cubes, i.e., `ceil(log2(color_count))`
#[must_use]
pub const fn split_rounds(color_count: usize) -> u32 {
	if color_count <= 1 {
		0
	} else {
		usize::BITS - (color_count - 1).leading_zeros()
	}
}

/// Replace every cube with its two halves
#[cfg(not(feature = "threads"))]
fn split_all(cubes: Vec<MedianCutCube>) -> Vec<MedianCutCube> {
	cubes
		.into_iter()
		.flat_map(|cube| {
			let (lower, upper) = cube.split();
			[lower, upper]
		})
		.collect()
}

/// Replace every cube with its two halves
#[cfg(feature = "threads")]
fn split_all(cubes: Vec<MedianCutCube>) -> Vec<MedianCutCube> {
	use rayon::prelude::*;

	cubes
		.into_par_iter()
		.flat_map_iter(|cube| {
			let (lower, upper) = cube.split();
			[lower, upper]
		})
		.collect()
}

/// The median cut palette engine
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianCut;

impl MedianCut {
	/// Start with a single cube holding `colors` and run `rounds` split rounds.
	///
	/// The result always has exactly `2^rounds` cubes, some of which may be empty.
	#[must_use]
	pub fn cubes(&self, colors: &[Color], rounds: u32) -> Vec<MedianCutCube> {
		let mut cubes = vec![MedianCutCube::new(colors.to_vec())];
		for round in 0..rounds {
			cubes = split_all(cubes);
			trace!(round, cubes = cubes.len(), "median cut split round");
		}
		cubes
	}

	/// Order `cubes` by the brightness of their means, keep the first `color_count` non-empty cubes,
	/// and mark each with its palette index.
	///
	/// Empty cubes never reach the palette, so it holds no placeholder black entries.
	#[must_use]
	pub fn select(&self, cubes: Vec<MedianCutCube>, color_count: usize) -> Vec<MedianCutCube> {
		let mut cubes = cubes
			.into_iter()
			.filter(|cube| !cube.is_empty())
			.map(|cube| (cube.mean().brightness(), cube))
			.collect::<Vec<_>>();

		cubes.sort_by(|(x, _), (y, _)| f32::total_cmp(x, y));

		cubes
			.into_iter()
			.take(color_count)
			.enumerate()
			.map(|(i, (_, mut cube))| {
				cube.palette_index = Some(i);
				cube
			})
			.collect()
	}

	/// Reduce `colors` to at most `color_count` representative colors in ascending brightness.
	///
	/// Fewer colors are returned if the split rounds produce fewer than `color_count` non-empty cubes.
	#[must_use]
	pub fn palette(&self, colors: &[Color], color_count: usize) -> Vec<Color> {
		// after split_rounds(colors.len()) rounds every cube has at most one color
		let rounds = split_rounds(color_count.min(colors.len()));
		let cubes = self.cubes(colors, rounds);
		let empty = cubes.iter().filter(|cube| cube.is_empty()).count();
		debug!(colors = colors.len(), color_count, rounds, cubes = cubes.len(), empty, "median cut");

		self.select(cubes, color_count).iter().map(MedianCutCube::mean).collect()
	}
}
