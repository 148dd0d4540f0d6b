//! The order in which pixels are visited during a scan

/// A pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
	/// Column
	pub x: u32,
	/// Row
	pub y: u32,
}

impl Point {
	/// Create a new point
	#[must_use]
	pub const fn new(x: u32, y: u32) -> Self {
		Self { x, y }
	}
}

/// Enumerates every pixel of a bitmap exactly once.
///
/// The returned path must depend only on `width` and `height`
/// and contain each of the `width * height` coordinates exactly once.
pub trait PathProvider {
	/// The pixel visiting order for a `width` by `height` bitmap
	fn path(&self, width: u32, height: u32) -> Vec<Point>;
}

/// Row-major order: top to bottom, each row left to right
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterPath;

impl PathProvider for RasterPath {
	fn path(&self, width: u32, height: u32) -> Vec<Point> {
		let mut path = Vec::with_capacity(width as usize * height as usize);
		for y in 0..height {
			for x in 0..width {
				path.push(Point::new(x, y));
			}
		}
		path
	}
}

/// Boustrophedon order: top to bottom, alternating left to right and right to left
#[derive(Debug, Clone, Copy, Default)]
pub struct SerpentinePath;

impl PathProvider for SerpentinePath {
	fn path(&self, width: u32, height: u32) -> Vec<Point> {
		let mut path = Vec::with_capacity(width as usize * height as usize);
		for y in 0..height {
			if y % 2 == 0 {
				path.extend((0..width).map(|x| Point::new(x, y)));
			} else {
				path.extend((0..width).rev().map(|x| Point::new(x, y)));
			}
		}
		path
	}
}
