//! The canonical 8-bit ARGB color used throughout the crate

use palette::{FromColor, Hsl, Srgb};

/// An 8-bit per channel color with alpha, red, green, and blue components.
///
/// Equality and hashing agree with the packed `0xAARRGGBB` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
	/// Alpha
	pub a: u8,
	/// Red
	pub r: u8,
	/// Green
	pub g: u8,
	/// Blue
	pub b: u8,
}

impl Color {
	/// Opaque black
	pub const BLACK: Self = Self::new(0, 0, 0);

	/// Create an opaque color from its red, green, and blue components
	#[must_use]
	pub const fn new(r: u8, g: u8, b: u8) -> Self {
		Self { a: u8::MAX, r, g, b }
	}

	/// Create a color from all four components
	#[must_use]
	pub const fn from_argb_components(a: u8, r: u8, g: u8, b: u8) -> Self {
		Self { a, r, g, b }
	}

	/// Unpack a `0xAARRGGBB` value
	#[must_use]
	pub const fn from_argb(argb: u32) -> Self {
		let [a, r, g, b] = argb.to_be_bytes();
		Self { a, r, g, b }
	}

	/// Pack into a `0xAARRGGBB` value
	#[must_use]
	pub const fn to_argb(self) -> u32 {
		u32::from_be_bytes([self.a, self.r, self.g, self.b])
	}

	/// The same color with its alpha forced to opaque
	#[must_use]
	pub const fn opaque(self) -> Self {
		Self::new(self.r, self.g, self.b)
	}

	/// HSL lightness in `0.0..=1.0`, i.e., the average of the largest and smallest channel
	#[must_use]
	pub fn brightness(self) -> f32 {
		Hsl::from_color(Srgb::new(self.r, self.g, self.b).into_format::<f32>()).lightness
	}

	/// The difference between the largest and smallest of the red, green, and blue channels
	#[must_use]
	pub fn spread(self) -> u8 {
		let max = self.r.max(self.g).max(self.b);
		let min = self.r.min(self.g).min(self.b);
		max - min
	}
}

impl From<Srgb<u8>> for Color {
	fn from(srgb: Srgb<u8>) -> Self {
		Self::new(srgb.red, srgb.green, srgb.blue)
	}
}

impl From<Color> for Srgb<u8> {
	fn from(color: Color) -> Self {
		Srgb::new(color.r, color.g, color.b)
	}
}

/// Returns the most saturated-looking color of `colors`,
/// measured by the spread between its largest and smallest channel.
///
/// The first color wins ties. Returns `None` for an empty slice.
#[must_use]
pub fn dominant_color(colors: &[Color]) -> Option<Color> {
	let mut best: Option<Color> = None;
	for &color in colors {
		match best {
			Some(current) if color.spread() <= current.spread() => {},
			_ => best = Some(color),
		}
	}
	best
}
