//! Ties the scan, the unique color table, and a palette engine together

use crate::{
	codec::{decode, RawPixel},
	error::{Error, Result},
	kmeans::{normalize, KMeans, KMeansOptions, Matrix},
	median_cut::MedianCut,
	path::{PathProvider, RasterPath},
	scan::scan,
	source::BitmapSource,
	unique::UniqueColorTable,
	Color,
};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::{future::Future, sync::Arc, thread};
use tracing::{debug, warn};

/// Options controlling how the bitmap is scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizeOptions {
	/// Whether the scan may be split over multiple workers
	pub allow_parallel: bool,
	/// Number of workers used when `allow_parallel` is set
	pub parallel_task_count: usize,
}

impl Default for QuantizeOptions {
	fn default() -> Self {
		Self { allow_parallel: true, parallel_task_count: 4 }
	}
}

impl QuantizeOptions {
	/// Scan everything on the calling thread
	#[must_use]
	pub const fn sequential() -> Self {
		Self { allow_parallel: false, parallel_task_count: 1 }
	}

	/// Set whether the scan may be split over multiple workers
	#[must_use]
	pub const fn with_parallel(mut self, allow_parallel: bool) -> Self {
		self.allow_parallel = allow_parallel;
		self
	}

	/// Set the number of workers used for parallel scans
	#[must_use]
	pub const fn with_task_count(mut self, parallel_task_count: usize) -> Self {
		self.parallel_task_count = parallel_task_count;
		self
	}

	/// Number of workers a scan is split over
	#[must_use]
	pub const fn worker_count(&self) -> usize {
		if self.allow_parallel {
			self.parallel_task_count
		} else {
			1
		}
	}
}

/// Reduces a set of distinct colors to a palette
pub trait PaletteEngine {
	/// Compute at most `color_count` colors representing `colors`
	///
	/// # Errors
	/// Depends on the engine.
	fn palette(&self, colors: &[Color], color_count: usize) -> Result<Vec<Color>>;
}

impl PaletteEngine for MedianCut {
	fn palette(&self, colors: &[Color], color_count: usize) -> Result<Vec<Color>> {
		Ok(MedianCut::palette(self, colors, color_count))
	}
}

/// The k-means palette engine: clusters the RGB channels of the colors and returns the cluster means
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KMeansPalette {
	/// Clustering options
	pub options: KMeansOptions,
}

impl KMeansPalette {
	/// Create an engine with the given options
	#[must_use]
	pub const fn new(options: KMeansOptions) -> Self {
		Self { options }
	}
}

/// Round a denormalized channel value to the nearest 8-bit value
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(v: f64) -> u8 {
	v.round().clamp(0.0, 255.0) as u8
}

impl PaletteEngine for KMeansPalette {
	fn palette(&self, colors: &[Color], color_count: usize) -> Result<Vec<Color>> {
		let k = color_count.min(colors.len());
		if k == 0 {
			return Ok(Vec::new());
		}

		let data = Matrix::from_vec(
			colors.len(),
			3,
			colors
				.iter()
				.flat_map(|color| [color.r, color.g, color.b].map(f64::from))
				.collect(),
		)?;

		let (normalized, scaling) = normalize(&data, self.options.normalization)?;
		let result = KMeans::new(self.options.seed).cluster(&normalized, k, self.options.trials, self.options.seed_method)?;
		debug!(k, wcss = result.wcss, iterations = result.iterations, "k-means palette");

		Ok(scaling
			.denormalize(&result.centers)
			.iter_rows()
			.map(|row| Color::new(to_channel(row[0]), to_channel(row[1]), to_channel(row[2])))
			.collect())
	}
}

/// Something that scans a bitmap for its colors and reduces them to a palette
pub trait ColorQuantizer {
	/// Collect the distinct colors of the bitmap, unless they were already collected
	///
	/// # Errors
	/// Returns an error if the bitmap cannot be read or decoded.
	/// No colors are kept from a failed scan.
	fn scan(&self) -> Result<()>;

	/// Reduce the colors collected so far to at most `color_count` colors
	///
	/// # Errors
	/// Returns [`Error::InvalidArgument`] if `color_count` is zero, or any error from the palette engine.
	fn palette(&self, color_count: usize) -> Result<Vec<Color>>;

	/// Scan the bitmap if needed, then compute a palette of at most `color_count` colors
	///
	/// # Errors
	/// See [`ColorQuantizer::scan`] and [`ColorQuantizer::palette`].
	fn quantize(&self, color_count: usize) -> Result<Vec<Color>> {
		check_color_count(color_count)?;
		self.scan()?;
		self.palette(color_count)
	}
}

/// Reject a palette size of zero
fn check_color_count(color_count: usize) -> Result<()> {
	if color_count == 0 {
		Err(Error::InvalidArgument("the color count must be at least 1".to_owned()))
	} else {
		Ok(())
	}
}

/// Scans a [`BitmapSource`] into a [`UniqueColorTable`] and computes palettes with a [`PaletteEngine`].
///
/// The scan runs at most once; its colors are reused by every later palette until [`Quantizer::reset`].
pub struct Quantizer<S, E> {
	/// The bitmap to scan
	source: S,
	/// Palette engine
	engine: E,
	/// Scan options
	options: QuantizeOptions,
	/// Pixel visiting order
	path_provider: Box<dyn PathProvider + Send + Sync>,
	/// Distinct colors found by the scan
	colors: UniqueColorTable,
	/// Whether `colors` holds a complete scan, locked for the whole scan
	scanned: Mutex<bool>,
}

/// A quantizer using median cut
pub type MedianCutQuantizer<S> = Quantizer<S, MedianCut>;

/// A quantizer using k-means
pub type KMeansQuantizer<S> = Quantizer<S, KMeansPalette>;

impl<S> Quantizer<S, MedianCut> {
	/// Create a median cut quantizer with default options
	#[must_use]
	pub fn median_cut(source: S) -> Self {
		Self::new(source, MedianCut)
	}
}

impl<S> Quantizer<S, KMeansPalette> {
	/// Create a k-means quantizer with default scan options
	#[must_use]
	pub fn kmeans(source: S, options: KMeansOptions) -> Self {
		Self::new(source, KMeansPalette::new(options))
	}
}

impl<S, E> Quantizer<S, E> {
	/// Create a quantizer with default scan options and a row-major path
	#[must_use]
	pub fn new(source: S, engine: E) -> Self {
		Self {
			source,
			engine,
			options: QuantizeOptions::default(),
			path_provider: Box::new(RasterPath),
			colors: UniqueColorTable::new(),
			scanned: Mutex::new(false),
		}
	}

	/// Use the given scan options
	#[must_use]
	pub fn with_options(mut self, options: QuantizeOptions) -> Self {
		self.options = options;
		self
	}

	/// Visit pixels in the order given by `path_provider`
	#[must_use]
	pub fn with_path_provider(mut self, path_provider: impl PathProvider + Send + Sync + 'static) -> Self {
		self.path_provider = Box::new(path_provider);
		self
	}

	/// The scanned bitmap
	#[must_use]
	pub fn source(&self) -> &S {
		&self.source
	}

	/// The palette engine
	#[must_use]
	pub fn engine(&self) -> &E {
		&self.engine
	}

	/// The scan options
	#[must_use]
	pub fn options(&self) -> QuantizeOptions {
		self.options
	}

	/// The distinct colors found so far
	#[must_use]
	pub fn unique_colors(&self) -> &UniqueColorTable {
		&self.colors
	}

	/// Forget the scanned colors so that the next [`ColorQuantizer::quantize`] scans again
	pub fn reset(&self) {
		let mut scanned = self.scanned.lock();
		self.colors.clear();
		*scanned = false;
	}
}

impl<S: BitmapSource + Sync, E> Quantizer<S, E> {
	/// Visit every pixel and record its color
	fn scan_colors(&self) -> Result<()> {
		let source = &self.source;
		let layout = source.layout();
		if !layout.is_supported() {
			return Err(Error::UnsupportedFormat(layout));
		}

		let (width, height) = (source.width(), source.height());
		let path = self.path_provider.path(width, height);
		if path.len() != width as usize * height as usize {
			return Err(Error::InvalidArgument(format!(
				"the pixel path has {} points, but the bitmap has {width}x{height} pixels",
				path.len()
			)));
		}

		let workers = self.options.worker_count();
		debug!(width, height, ?layout, workers, "scanning colors");

		let table = &self.colors;
		let result = scan(&path, workers, RawPixel::default, |pixel, point| {
			source.read_pixel(point.x, point.y, pixel)?;
			let color = decode(pixel, layout, |index| source.palette_color(index))?;
			table.add_color(color);
			Ok(())
		});

		if let Err(err) = result {
			table.clear();
			return Err(err);
		}

		debug!(unique = table.len(), "scan finished");
		Ok(())
	}
}

impl<S: BitmapSource + Sync, E: PaletteEngine> ColorQuantizer for Quantizer<S, E> {
	fn scan(&self) -> Result<()> {
		let mut scanned = self.scanned.lock();
		if !*scanned {
			self.scan_colors()?;
			*scanned = true;
		}
		Ok(())
	}

	fn palette(&self, color_count: usize) -> Result<Vec<Color>> {
		check_color_count(color_count)?;

		let mut colors = self.colors.colors();
		if colors.len() <= color_count {
			debug!(unique = colors.len(), color_count, "few enough colors, skipping the palette engine");
			return Ok(colors);
		}

		// insertion order depends on how the scan was scheduled, so give the engine a canonical order
		colors.sort_unstable_by_key(|color| color.to_argb());
		self.engine.palette(&colors, color_count)
	}
}

impl<S, E> Quantizer<S, E>
where
	S: BitmapSource + Send + Sync + 'static,
	E: PaletteEngine + Send + Sync + 'static,
{
	/// Run [`ColorQuantizer::quantize`] on a background thread.
	///
	/// The returned future resolves to the same result as the blocking call.
	///
	/// # Errors
	/// Same as [`ColorQuantizer::quantize`], or [`Error::WorkerLost`] if the background thread
	/// could not be started or stopped without answering.
	pub fn quantize_async(self: &Arc<Self>, color_count: usize) -> impl Future<Output = Result<Vec<Color>>> {
		let (sender, receiver) = oneshot::channel();
		let quantizer = Arc::clone(self);

		let spawned = thread::Builder::new()
			.name("colorcut-quantize".to_owned())
			.spawn(move || {
				// the caller may have dropped the future
				let _ = sender.send(quantizer.quantize(color_count));
			});

		if let Err(err) = spawned {
			warn!(%err, "failed to spawn the quantization thread");
		}

		async move { receiver.await.unwrap_or(Err(Error::WorkerLost)) }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{codec::PixelLayout, kmeans::NormalizationMethod, path::SerpentinePath, source::RasterBuffer};
	use image::RgbImage;
	use itertools::iproduct;
	use std::collections::HashSet;

	/// Pack colors into tightly packed BGR rows
	fn bgr(colors: &[Color]) -> Vec<u8> {
		colors.iter().flat_map(|c| [c.b, c.g, c.r]).collect()
	}

	fn set(colors: &[Color]) -> HashSet<Color> {
		colors.iter().copied().collect()
	}

	fn grid_colors() -> Vec<Color> {
		iproduct!((0..4u8), (0..4u8))
			.map(|(y, x)| Color::new(x * 60, y * 60, 255 - x * 30))
			.collect()
	}

	fn gradient(width: u32, height: u32) -> RgbImage {
		#[allow(clippy::cast_possible_truncation)]
		RgbImage::from_fn(width, height, |x, y| {
			image::Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, ((x + y) % 7 * 30) as u8])
		})
	}

	#[test]
	fn black_and_white() {
		let data = bgr(&[Color::BLACK, Color::new(255, 255, 255)]);
		let source = RasterBuffer::new(&data, 2, 1, PixelLayout::Rgb24).unwrap();

		let quantizer = Quantizer::median_cut(&source).with_options(QuantizeOptions::sequential());
		assert_eq!(quantizer.quantize(2).unwrap(), vec![Color::BLACK, Color::new(255, 255, 255)]);

		let palette = Quantizer::median_cut(&source).quantize(2).unwrap();
		assert_eq!(set(&palette), set(&[Color::BLACK, Color::new(255, 255, 255)]));
	}

	#[test]
	fn single_color_gives_single_entry() {
		let data = bgr(&[Color::new(10, 10, 10); 6]);
		let source = RasterBuffer::new(&data, 3, 2, PixelLayout::Rgb24).unwrap();

		let palette = Quantizer::median_cut(&source).quantize(5).unwrap();
		assert_eq!(palette, vec![Color::new(10, 10, 10)]);

		let palette = Quantizer::kmeans(&source, KMeansOptions::default()).quantize(5).unwrap();
		assert_eq!(palette, vec![Color::new(10, 10, 10)]);
	}

	#[test]
	fn task_count_does_not_change_the_color_set() {
		let data = bgr(&grid_colors());
		let source = RasterBuffer::new(&data, 4, 4, PixelLayout::Rgb24).unwrap();

		let colors = |options: QuantizeOptions| {
			let quantizer = Quantizer::median_cut(&source).with_options(options);
			quantizer.scan().unwrap();
			set(&quantizer.unique_colors().colors())
		};

		let sequential = colors(QuantizeOptions::default().with_task_count(1));
		assert_eq!(sequential.len(), 16);
		assert_eq!(sequential, colors(QuantizeOptions::default().with_task_count(4)));
		assert_eq!(sequential, colors(QuantizeOptions::default().with_task_count(7)));
		assert_eq!(sequential, colors(QuantizeOptions::sequential()));
		assert_eq!(sequential, set(&grid_colors()));
	}

	#[test]
	fn path_order_does_not_change_the_color_set() {
		let image = gradient(23, 17);
		let raster = Quantizer::median_cut(&image);
		let serpentine = Quantizer::median_cut(&image).with_path_provider(SerpentinePath);
		raster.scan().unwrap();
		serpentine.scan().unwrap();

		assert_eq!(set(&raster.unique_colors().colors()), set(&serpentine.unique_colors().colors()));
		assert_eq!(raster.quantize(8).unwrap(), serpentine.quantize(8).unwrap());
	}

	#[test]
	fn few_colors_are_returned_as_is() {
		let colors = grid_colors();
		let data = bgr(&colors);
		let source = RasterBuffer::new(&data, 4, 4, PixelLayout::Rgb24).unwrap();

		for color_count in [16, 17, 256] {
			let palette = Quantizer::median_cut(&source).quantize(color_count).unwrap();
			assert_eq!(palette.len(), 16);
			assert_eq!(set(&palette), set(&colors));
		}

		let palette = Quantizer::median_cut(&source).quantize(15).unwrap();
		assert!(palette.len() <= 15);
	}

	#[test]
	fn median_cut_is_deterministic() {
		let image = gradient(40, 30);
		let first = Quantizer::median_cut(&image).quantize(10).unwrap();
		assert_eq!(first.len(), 10);
		assert_eq!(Quantizer::median_cut(&image).quantize(10).unwrap(), first);
		assert_eq!(
			Quantizer::median_cut(&image)
				.with_options(QuantizeOptions::sequential())
				.quantize(10)
				.unwrap(),
			first
		);
	}

	#[test]
	fn zero_colors_is_rejected_before_scanning() {
		let image = gradient(4, 4);
		let quantizer = Quantizer::median_cut(&image);
		assert!(matches!(quantizer.quantize(0), Err(Error::InvalidArgument(_))));
		assert!(quantizer.unique_colors().is_empty());
	}

	#[test]
	fn zero_tasks_is_rejected() {
		let image = gradient(4, 4);
		let quantizer = Quantizer::median_cut(&image).with_options(QuantizeOptions::default().with_task_count(0));
		assert!(matches!(quantizer.quantize(2), Err(Error::InvalidArgument(_))));
	}

	#[test]
	fn premultiplied_layouts_are_unsupported() {
		let data = [0; 16];
		let source = RasterBuffer::new(&data, 2, 2, PixelLayout::PArgb32).unwrap();
		let quantizer = Quantizer::median_cut(source);
		assert_eq!(quantizer.quantize(2), Err(Error::UnsupportedFormat(PixelLayout::PArgb32)));
		assert!(quantizer.unique_colors().is_empty());
	}

	#[test]
	fn failed_scan_keeps_no_colors() {
		// 4 bit indices 0..8, but only 4 palette entries
		let data = [0x01, 0x23, 0x45, 0x67];
		let palette = vec![Color::BLACK, Color::new(1, 1, 1), Color::new(2, 2, 2), Color::new(3, 3, 3)];
		let source = RasterBuffer::new(&data, 4, 2, PixelLayout::Indexed4).unwrap().with_palette(palette);

		let quantizer = Quantizer::median_cut(source);
		assert!(matches!(
			quantizer.quantize(2),
			Err(Error::PaletteIndexOutOfRange { len: 4, .. })
		));
		assert!(quantizer.unique_colors().is_empty());
		assert!(quantizer.quantize(2).is_err());
	}

	#[test]
	fn indexed_source() {
		let data = [0x01, 0x10, 0x11, 0x00];
		let palette = vec![Color::new(255, 0, 0), Color::new(0, 0, 255)];
		let source = RasterBuffer::new(&data, 4, 2, PixelLayout::Indexed4).unwrap().with_palette(palette.clone());

		let result = Quantizer::median_cut(source).quantize(4).unwrap();
		assert_eq!(set(&result), set(&palette));
	}

	#[test]
	fn kmeans_finds_the_clusters() {
		let colors = [
			Color::new(10, 10, 10),
			Color::new(12, 12, 12),
			Color::new(14, 14, 14),
			Color::new(200, 200, 200),
			Color::new(202, 202, 202),
			Color::new(204, 204, 204),
		];
		let data = bgr(&colors);
		let source = RasterBuffer::new(&data, 3, 2, PixelLayout::Rgb24).unwrap();

		for normalization in [NormalizationMethod::Linear(255.0), NormalizationMethod::Gaussian] {
			let options = KMeansOptions { normalization, trials: 3, ..KMeansOptions::default() };
			let palette = Quantizer::kmeans(&source, options).quantize(2).unwrap();
			assert_eq!(set(&palette), set(&[Color::new(12, 12, 12), Color::new(202, 202, 202)]));
		}
	}

	#[test]
	fn kmeans_palette_is_reproducible() {
		let image = gradient(32, 32);
		let options = KMeansOptions { seed: Some(5), ..KMeansOptions::default() };
		let first = Quantizer::kmeans(&image, options).quantize(6).unwrap();
		assert_eq!(first.len(), 6);
		assert_eq!(Quantizer::kmeans(&image, options).quantize(6).unwrap(), first);
	}

	#[test]
	fn reset_forgets_the_scan() {
		let image = gradient(16, 16);
		let quantizer = Quantizer::median_cut(&image);
		let first = quantizer.quantize(4).unwrap();
		let unique = quantizer.unique_colors().len();
		assert!(unique > 4);

		quantizer.reset();
		assert!(quantizer.unique_colors().is_empty());
		assert!(quantizer.palette(4).unwrap().is_empty());

		assert_eq!(quantizer.quantize(4).unwrap(), first);
		assert_eq!(quantizer.unique_colors().len(), unique);
	}

	#[test]
	fn repeated_quantize_scans_once() {
		let image = gradient(16, 16);
		let quantizer = Quantizer::median_cut(&image);
		quantizer.quantize(4).unwrap();
		let snapshot = quantizer.unique_colors().snapshot_ordered_by_index();
		quantizer.quantize(8).unwrap();
		assert_eq!(quantizer.unique_colors().snapshot_ordered_by_index(), snapshot);
	}

	#[test]
	fn async_matches_blocking() {
		let quantizer = Arc::new(Quantizer::median_cut(gradient(24, 24)));
		let blocking = quantizer.quantize(7).unwrap();
		let background = futures::executor::block_on(quantizer.quantize_async(7)).unwrap();
		assert_eq!(background, blocking);

		let error = futures::executor::block_on(quantizer.quantize_async(0));
		assert!(matches!(error, Err(Error::InvalidArgument(_))));
	}
}
