//! Error types for palette generation

use crate::codec::PixelLayout;
use thiserror::Error;

/// Errors that can occur while scanning an image or computing a palette
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// An argument was missing, zero, or otherwise out of range
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// The pixel layout is enumerated but cannot be decoded
	#[error("unsupported pixel format: {0:?}")]
	UnsupportedFormat(PixelLayout),

	/// The input cannot drive the computation (e.g., every selection weight is zero)
	#[error("degenerate input: {0}")]
	DegenerateInput(String),

	/// A pixel outside of the bitmap was requested
	#[error("pixel ({x}, {y}) is outside of the {width}x{height} bitmap")]
	PixelOutOfBounds {
		/// Requested column
		x: u32,
		/// Requested row
		y: u32,
		/// Bitmap width
		width: u32,
		/// Bitmap height
		height: u32,
	},

	/// An indexed pixel referred to a palette entry that does not exist
	#[error("palette index {index} is out of range for a palette of {len} colors")]
	PaletteIndexOutOfRange {
		/// The decoded palette index
		index: u8,
		/// The number of palette entries
		len: usize,
	},

	/// The pixel data is shorter than its dimensions and stride require
	#[error("pixel buffer holds {actual} bytes but {expected} are required")]
	BufferTooSmall {
		/// Required number of bytes
		expected: usize,
		/// Provided number of bytes
		actual: usize,
	},

	/// The background worker of an async quantization stopped without a result
	#[error("the background quantization worker stopped before producing a palette")]
	WorkerLost,
}

/// Result type for palette operations
pub type Result<T> = std::result::Result<T, Error>;
