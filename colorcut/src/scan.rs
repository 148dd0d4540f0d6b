//! Splits a pixel path into contiguous ranges and visits them on independent workers

use crate::{
	error::{Error, Result},
	path::Point,
};

/// A half-open range `start..end` of offsets into a pixel path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRange {
	/// First offset in the range
	pub start: usize,
	/// One past the last offset in the range
	pub end: usize,
}

impl TaskRange {
	/// Create a new range
	#[must_use]
	pub const fn new(start: usize, end: usize) -> Self {
		Self { start, end }
	}

	/// Number of offsets in the range
	#[must_use]
	pub const fn len(self) -> usize {
		self.end - self.start
	}

	/// Whether the range has no offsets
	#[must_use]
	pub const fn is_empty(self) -> bool {
		self.start == self.end
	}
}

/// Split `0..len` into `workers` contiguous ranges of near-equal size.
///
/// Range `i` starts at `floor(i * len / workers)`, and the last range always ends at `len`,
/// so the ranges cover every offset exactly once. Some ranges are empty when `workers > len`.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if `workers` is zero.
pub fn split_ranges(len: usize, workers: usize) -> Result<Vec<TaskRange>> {
	if workers == 0 {
		return Err(Error::InvalidArgument("the worker count must be at least 1".to_owned()));
	}

	// u128 so that `i * len` cannot overflow
	#[allow(clippy::cast_possible_truncation)]
	let boundary = |i: usize| (i as u128 * len as u128 / workers as u128) as usize;

	Ok((0..workers)
		.map(|i| {
			let end = if i + 1 == workers { len } else { boundary(i + 1) };
			TaskRange::new(boundary(i), end)
		})
		.collect())
}

/// Visit every point of `range` in path order with a fresh worker state
fn scan_range<S>(
	path: &[Point],
	range: TaskRange,
	init: &impl Fn() -> S,
	per_pixel: &impl Fn(&mut S, Point) -> Result<()>,
) -> Result<()> {
	let mut state = init();
	for &point in &path[range.start..range.end] {
		per_pixel(&mut state, point)?;
	}
	Ok(())
}

/// Visit every point of `path` by splitting it over `workers` ranges.
///
/// Each range gets its own state from `init`, which is then passed to `per_pixel` for each of its points.
/// Points within a range are visited in path order, but ranges may run concurrently in any order.
/// This returns only after every range has finished.
/// The first error from any range fails the whole scan.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if `workers` is zero,
/// or the first error returned by `per_pixel`.
#[cfg(feature = "threads")]
pub fn scan<S>(
	path: &[Point],
	workers: usize,
	init: impl Fn() -> S + Sync,
	per_pixel: impl Fn(&mut S, Point) -> Result<()> + Sync,
) -> Result<()> {
	use rayon::prelude::*;

	let ranges = split_ranges(path.len(), workers)?;
	if ranges.len() == 1 {
		return scan_range(path, ranges[0], &init, &per_pixel);
	}

	ranges
		.into_par_iter()
		.try_for_each(|range| scan_range(path, range, &init, &per_pixel))
}

/// Visit every point of `path` by splitting it over `workers` ranges.
///
/// Without the `threads` feature, the ranges are visited one after another on the calling thread.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if `workers` is zero,
/// or the first error returned by `per_pixel`.
#[cfg(not(feature = "threads"))]
pub fn scan<S>(
	path: &[Point],
	workers: usize,
	init: impl Fn() -> S,
	per_pixel: impl Fn(&mut S, Point) -> Result<()>,
) -> Result<()> {
	for range in split_ranges(path.len(), workers)? {
		scan_range(path, range, &init, &per_pixel)?;
	}
	Ok(())
}
