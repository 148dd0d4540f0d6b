//! Read-only pixel sources that can be scanned for colors

use crate::{
	codec::{PixelLayout, RawPixel},
	error::{Error, Result},
	Color,
};
use image::{ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};

/// A read-only bitmap that can be scanned pixel by pixel.
///
/// Implementations must tolerate concurrent reads from multiple scan workers.
pub trait BitmapSource {
	/// Width in pixels
	fn width(&self) -> u32;

	/// Height in pixels
	fn height(&self) -> u32;

	/// Bit packing of every pixel in this bitmap
	fn layout(&self) -> PixelLayout;

	/// Whether pixels are palette indices
	fn is_indexed(&self) -> bool {
		self.layout().is_indexed()
	}

	/// Load the raw bytes of the pixel at (`x`, `y`) into `pixel`
	///
	/// # Errors
	/// Returns [`Error::PixelOutOfBounds`] if the coordinates are outside of the bitmap.
	fn read_pixel(&self, x: u32, y: u32, pixel: &mut RawPixel) -> Result<()>;

	/// Look up an entry of the bitmap's palette
	///
	/// # Errors
	/// Returns [`Error::PaletteIndexOutOfRange`] if there is no such entry.
	fn palette_color(&self, index: u8) -> Result<Color> {
		Err(Error::PaletteIndexOutOfRange { index, len: 0 })
	}
}

impl<T: BitmapSource + ?Sized> BitmapSource for &T {
	fn width(&self) -> u32 {
		(**self).width()
	}

	fn height(&self) -> u32 {
		(**self).height()
	}

	fn layout(&self) -> PixelLayout {
		(**self).layout()
	}

	fn is_indexed(&self) -> bool {
		(**self).is_indexed()
	}

	fn read_pixel(&self, x: u32, y: u32, pixel: &mut RawPixel) -> Result<()> {
		(**self).read_pixel(x, y, pixel)
	}

	fn palette_color(&self, index: u8) -> Result<Color> {
		(**self).palette_color(index)
	}
}

/// Ensure (`x`, `y`) lies within a `width` by `height` bitmap
fn check_bounds(x: u32, y: u32, width: u32, height: u32) -> Result<()> {
	if x < width && y < height {
		Ok(())
	} else {
		Err(Error::PixelOutOfBounds { x, y, width, height })
	}
}

/// A borrowed buffer of packed pixel rows, as produced by locking a bitmap.
///
/// Rows are `stride` bytes apart. Within a row, pixel `x` starts at bit `x * bits_per_pixel`.
#[derive(Debug, Clone)]
pub struct RasterBuffer<'a> {
	/// Packed pixel rows
	data: &'a [u8],
	/// Width in pixels
	width: u32,
	/// Height in pixels
	height: u32,
	/// Bytes between the start of consecutive rows
	stride: usize,
	/// Pixel layout
	layout: PixelLayout,
	/// Palette of indexed layouts
	palette: Vec<Color>,
}

impl<'a> RasterBuffer<'a> {
	/// The least number of bytes needed to hold one row of `width` pixels
	#[must_use]
	pub fn min_stride(width: u32, layout: PixelLayout) -> usize {
		(width as usize * usize::from(layout.bits_per_pixel()) + 7) / 8
	}

	/// Wrap tightly packed rows (no padding between rows)
	///
	/// # Errors
	/// Returns [`Error::BufferTooSmall`] if `data` cannot hold `width` x `height` pixels.
	pub fn new(data: &'a [u8], width: u32, height: u32, layout: PixelLayout) -> Result<Self> {
		Self::with_stride(data, width, height, Self::min_stride(width, layout), layout)
	}

	/// Wrap rows that start every `stride` bytes
	///
	/// # Errors
	/// - [`Error::InvalidArgument`] if `stride` is shorter than a row
	/// - [`Error::BufferTooSmall`] if `data` cannot hold `height` rows
	pub fn with_stride(data: &'a [u8], width: u32, height: u32, stride: usize, layout: PixelLayout) -> Result<Self> {
		let row = Self::min_stride(width, layout);
		if stride < row {
			return Err(Error::InvalidArgument(format!(
				"stride {stride} is shorter than a row of {width} {layout:?} pixels ({row} bytes)"
			)));
		}

		// the last row does not need to be padded
		let expected = match height {
			0 => 0,
			h => stride * (h as usize - 1) + row,
		};

		if data.len() < expected {
			return Err(Error::BufferTooSmall { expected, actual: data.len() });
		}

		Ok(Self {
			data,
			width,
			height,
			stride,
			layout,
			palette: Vec::new(),
		})
	}

	/// Attach the palette used to resolve indexed pixels
	#[must_use]
	pub fn with_palette(mut self, palette: Vec<Color>) -> Self {
		self.palette = palette;
		self
	}

	/// The attached palette
	#[must_use]
	pub fn palette(&self) -> &[Color] {
		&self.palette
	}

	/// Bytes between rows
	#[must_use]
	pub const fn stride(&self) -> usize {
		self.stride
	}
}

impl BitmapSource for RasterBuffer<'_> {
	fn width(&self) -> u32 {
		self.width
	}

	fn height(&self) -> u32 {
		self.height
	}

	fn layout(&self) -> PixelLayout {
		self.layout
	}

	#[allow(clippy::cast_possible_truncation)]
	fn read_pixel(&self, x: u32, y: u32, pixel: &mut RawPixel) -> Result<()> {
		check_bounds(x, y, self.width, self.height)?;

		let bit = x as usize * usize::from(self.layout.bits_per_pixel());
		let offset = y as usize * self.stride + bit / 8;
		let len = self.layout.bytes_per_pixel();

		let bytes = self.data.get(offset..offset + len).ok_or(Error::BufferTooSmall {
			expected: offset + len,
			actual: self.data.len(),
		})?;

		// bit % 8 < 8
		pixel.load(bytes, (bit % 8) as u8);
		Ok(())
	}

	fn palette_color(&self, index: u8) -> Result<Color> {
		self.palette
			.get(usize::from(index))
			.copied()
			.ok_or(Error::PaletteIndexOutOfRange { index, len: self.palette.len() })
	}
}

impl BitmapSource for RgbImage {
	fn width(&self) -> u32 {
		self.dimensions().0
	}

	fn height(&self) -> u32 {
		self.dimensions().1
	}

	fn layout(&self) -> PixelLayout {
		PixelLayout::Rgb24
	}

	fn read_pixel(&self, x: u32, y: u32, pixel: &mut RawPixel) -> Result<()> {
		check_bounds(x, y, self.width(), self.height())?;
		let Rgb([r, g, b]) = *self.get_pixel(x, y);
		pixel.load(&[b, g, r], 0);
		Ok(())
	}
}

impl BitmapSource for RgbaImage {
	fn width(&self) -> u32 {
		self.dimensions().0
	}

	fn height(&self) -> u32 {
		self.dimensions().1
	}

	fn layout(&self) -> PixelLayout {
		PixelLayout::Argb32
	}

	fn read_pixel(&self, x: u32, y: u32, pixel: &mut RawPixel) -> Result<()> {
		check_bounds(x, y, self.width(), self.height())?;
		let Rgba([r, g, b, a]) = *self.get_pixel(x, y);
		pixel.load(&[b, g, r, a], 0);
		Ok(())
	}
}

impl BitmapSource for ImageBuffer<Rgb<u16>, Vec<u16>> {
	fn width(&self) -> u32 {
		self.dimensions().0
	}

	fn height(&self) -> u32 {
		self.dimensions().1
	}

	fn layout(&self) -> PixelLayout {
		PixelLayout::Rgb48
	}

	fn read_pixel(&self, x: u32, y: u32, pixel: &mut RawPixel) -> Result<()> {
		check_bounds(x, y, self.width(), self.height())?;
		let Rgb([r, g, b]) = *self.get_pixel(x, y);
		let ([b0, b1], [g0, g1], [r0, r1]) = (b.to_le_bytes(), g.to_le_bytes(), r.to_le_bytes());
		pixel.load(&[b0, b1, g0, g1, r0, r1], 0);
		Ok(())
	}
}

impl BitmapSource for ImageBuffer<Rgba<u16>, Vec<u16>> {
	fn width(&self) -> u32 {
		self.dimensions().0
	}

	fn height(&self) -> u32 {
		self.dimensions().1
	}

	fn layout(&self) -> PixelLayout {
		PixelLayout::Argb64
	}

	fn read_pixel(&self, x: u32, y: u32, pixel: &mut RawPixel) -> Result<()> {
		check_bounds(x, y, self.width(), self.height())?;
		let Rgba([r, g, b, a]) = *self.get_pixel(x, y);
		let ([b0, b1], [g0, g1], [r0, r1], [a0, a1]) =
			(b.to_le_bytes(), g.to_le_bytes(), r.to_le_bytes(), a.to_le_bytes());
		pixel.load(&[b0, b1, g0, g1, r0, r1, a0, a1], 0);
		Ok(())
	}
}
