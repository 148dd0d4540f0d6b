//! Decoding raw pixel bytes of the supported layouts into [`Color`]s.
//!
//! All multi-byte layouts are little-endian with channels stored in blue, green, red, (alpha) order,
//! the same order a locked GDI bitmap presents them in.
//! Sub-byte indexed layouts pack pixels from the most significant bit downwards.

use crate::{
	error::{Error, Result},
	Color,
};

/// The bit packing of a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
	/// 1 bit palette index
	Indexed1,
	/// 4 bit palette index
	Indexed4,
	/// 8 bit palette index
	Indexed8,
	/// 16 bits: 1 bit alpha, 5 bits per color channel
	Argb1555,
	/// 16 bits of gray
	Gray16,
	/// 16 bits: 5 bits per color channel, top bit unused
	Rgb555,
	/// 16 bits: 5 bits red, 6 bits green, 5 bits blue
	Rgb565,
	/// 24 bits: 8 bits per color channel
	Rgb24,
	/// 32 bits: 8 bits per color channel, top byte unused
	Rgb32,
	/// 32 bits: 8 bits per channel
	Argb32,
	/// 32 bits: 8 bits per channel, premultiplied alpha
	PArgb32,
	/// 48 bits: 16 bits per color channel
	Rgb48,
	/// 64 bits: 16 bits per channel
	Argb64,
	/// 64 bits: 16 bits per channel, premultiplied alpha
	PArgb64,
}

impl PixelLayout {
	/// Number of bits used by a single pixel
	#[must_use]
	pub const fn bits_per_pixel(self) -> u8 {
		use PixelLayout::*;
		match self {
			Indexed1 => 1,
			Indexed4 => 4,
			Indexed8 => 8,
			Argb1555 | Gray16 | Rgb555 | Rgb565 => 16,
			Rgb24 => 24,
			Rgb32 | Argb32 | PArgb32 => 32,
			Rgb48 => 48,
			Argb64 | PArgb64 => 64,
		}
	}

	/// Number of bytes that need to be read to decode a single pixel
	#[must_use]
	pub const fn bytes_per_pixel(self) -> usize {
		let bytes = (self.bits_per_pixel() / 8) as usize;
		if bytes == 0 {
			1
		} else {
			bytes
		}
	}

	/// Whether the pixel stores a palette index rather than color channels
	#[must_use]
	pub const fn is_indexed(self) -> bool {
		matches!(self, Self::Indexed1 | Self::Indexed4 | Self::Indexed8)
	}

	/// Whether [`decode`] can handle this layout
	#[must_use]
	pub const fn is_supported(self) -> bool {
		!matches!(self, Self::PArgb32 | Self::PArgb64)
	}

	/// The smallest indexed layout able to hold a palette with `color_count` entries
	///
	/// # Errors
	/// Returns [`Error::InvalidArgument`] if `color_count` is not in `1..=256`.
	pub fn for_color_count(color_count: usize) -> Result<Self> {
		match color_count {
			1..=2 => Ok(Self::Indexed1),
			3..=16 => Ok(Self::Indexed4),
			17..=256 => Ok(Self::Indexed8),
			_ => Err(Error::InvalidArgument(format!(
				"no indexed layout holds {color_count} colors"
			))),
		}
	}
}

/// The raw bytes of a single pixel, together with the bit offset of sub-byte pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawPixel {
	/// Pixel bytes, zero padded
	bytes: [u8; 8],
	/// Bit offset from the most significant bit of the first byte
	bit_offset: u8,
}

impl RawPixel {
	/// Copy up to 8 bytes from `bytes` into a new pixel window
	#[must_use]
	pub fn new(bytes: &[u8], bit_offset: u8) -> Self {
		let mut pixel = Self { bytes: [0; 8], bit_offset };
		pixel.load(bytes, bit_offset);
		pixel
	}

	/// Overwrite this pixel window in place, reusing its storage
	pub fn load(&mut self, bytes: &[u8], bit_offset: u8) {
		let len = bytes.len().min(self.bytes.len());
		self.bytes[..len].copy_from_slice(&bytes[..len]);
		self.bytes[len..].fill(0);
		self.bit_offset = bit_offset;
	}

	/// The pixel bytes
	#[must_use]
	pub const fn bytes(&self) -> &[u8; 8] {
		&self.bytes
	}

	/// Bit offset for sub-byte layouts
	#[must_use]
	pub const fn bit_offset(&self) -> u8 {
		self.bit_offset
	}

	/// Little-endian 16 bit word starting at byte `i`
	fn word(&self, i: usize) -> u16 {
		u16::from_le_bytes([self.bytes[i], self.bytes[i + 1]])
	}

	/// Extract the palette index of an indexed layout
	fn index(&self, layout: PixelLayout) -> Result<u8> {
		let byte = self.bytes[0];
		match layout {
			PixelLayout::Indexed1 => Ok((byte >> (7 - (self.bit_offset & 7))) & 0x1),
			PixelLayout::Indexed4 => Ok(if self.bit_offset & 4 == 0 { byte >> 4 } else { byte & 0xF }),
			PixelLayout::Indexed8 => Ok(byte),
			other => Err(Error::InvalidArgument(format!("{other:?} is not an indexed layout"))),
		}
	}
}

/// Scale a 5 bit channel to 8 bits
#[inline]
const fn expand5(v: u16) -> u8 {
	let v = (v & 0x1F) as u8;
	(v << 3) | (v >> 2)
}

/// Scale a 6 bit channel to 8 bits
#[inline]
const fn expand6(v: u16) -> u8 {
	let v = (v & 0x3F) as u8;
	(v << 2) | (v >> 4)
}

/// Truncate a 16 bit channel to 8 bits
#[inline]
const fn truncate16(v: u16) -> u8 {
	(v >> 8) as u8
}

/// Decode `raw` into a color according to `layout`.
///
/// Indexed layouts are resolved through `palette`, whose errors are passed through unchanged.
///
/// # Errors
/// Returns [`Error::UnsupportedFormat`] for premultiplied layouts.
pub fn decode(raw: &RawPixel, layout: PixelLayout, palette: impl Fn(u8) -> Result<Color>) -> Result<Color> {
	use PixelLayout::*;

	let b = &raw.bytes;
	let color = match layout {
		Indexed1 | Indexed4 | Indexed8 => return palette(raw.index(layout)?),
		Argb1555 => {
			let v = raw.word(0);
			let a = if v & 0x8000 == 0 { 0 } else { u8::MAX };
			Color::from_argb_components(a, expand5(v >> 10), expand5(v >> 5), expand5(v))
		},
		Rgb555 => {
			let v = raw.word(0);
			Color::new(expand5(v >> 10), expand5(v >> 5), expand5(v))
		},
		Rgb565 => {
			let v = raw.word(0);
			Color::new(expand5(v >> 11), expand6(v >> 5), expand5(v))
		},
		Gray16 => {
			let gray = truncate16(raw.word(0));
			Color::new(gray, gray, gray)
		},
		Rgb24 | Rgb32 => Color::new(b[2], b[1], b[0]),
		Argb32 => Color::from_argb_components(b[3], b[2], b[1], b[0]),
		Rgb48 => Color::new(truncate16(raw.word(4)), truncate16(raw.word(2)), truncate16(raw.word(0))),
		Argb64 => Color::from_argb_components(
			truncate16(raw.word(6)),
			truncate16(raw.word(4)),
			truncate16(raw.word(2)),
			truncate16(raw.word(0)),
		),
		PArgb32 | PArgb64 => return Err(Error::UnsupportedFormat(layout)),
	};

	Ok(color)
}

/// Pack a color into the signed `0xAARRGGBB` key used by the unique color table.
///
/// Alpha is forced to opaque, so colors differing only in alpha share a key.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn encode_key(color: Color) -> i32 {
	color.opaque().to_argb() as i32
}

/// Unpack a key produced by [`encode_key`]
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn decode_key(key: i32) -> Color {
	Color::from_argb(key as u32)
}
