//! Provides the implementation for k-means (Lloyd's algorithm) over rows of a dense matrix

use crate::error::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, trace};

/// A dense, row-major matrix of `f64` values
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
	/// Number of rows
	rows: usize,
	/// Number of columns
	cols: usize,
	/// Row-major values
	data: Vec<f64>,
}

impl Matrix {
	/// Create a matrix of zeros
	#[must_use]
	pub fn zeros(rows: usize, cols: usize) -> Self {
		Self { rows, cols, data: vec![0.0; rows * cols] }
	}

	/// Create a matrix from row-major values
	///
	/// # Errors
	/// Returns [`Error::InvalidArgument`] if `data.len() != rows * cols`.
	pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
		if rows.checked_mul(cols) == Some(data.len()) {
			Ok(Self { rows, cols, data })
		} else {
			Err(Error::InvalidArgument(format!(
				"a {rows}x{cols} matrix cannot hold {} values",
				data.len()
			)))
		}
	}

	/// Create a matrix from equally sized rows
	///
	/// # Errors
	/// Returns [`Error::InvalidArgument`] if the rows differ in length.
	pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
		let cols = rows.first().map_or(0, |row| row.as_ref().len());
		let data = rows.iter().flat_map(|row| row.as_ref().iter().copied()).collect();
		Self::from_vec(rows.len(), cols, data)
	}

	/// Number of rows
	#[must_use]
	pub const fn rows(&self) -> usize {
		self.rows
	}

	/// Number of columns
	#[must_use]
	pub const fn cols(&self) -> usize {
		self.cols
	}

	/// Row `i`
	#[must_use]
	pub fn row(&self, i: usize) -> &[f64] {
		&self.data[(i * self.cols)..((i + 1) * self.cols)]
	}

	/// Mutable row `i`
	pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
		&mut self.data[(i * self.cols)..((i + 1) * self.cols)]
	}

	/// Iterate over the rows in order
	pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
		(0..self.rows).map(|i| self.row(i))
	}

	/// Row-major values
	#[must_use]
	pub fn as_slice(&self) -> &[f64] {
		&self.data
	}
}

/// Preprocessing applied to the data before clustering so that no column dominates the distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizationMethod {
	/// Divide every value by a fixed divisor, e.g., `255.0` for 8-bit color channels
	Linear(f64),
	/// Replace each value by its z-score within its column
	Gaussian,
}

impl Default for NormalizationMethod {
	fn default() -> Self {
		Self::Linear(255.0)
	}
}

/// The parameters needed to undo a normalization
#[derive(Debug, Clone, PartialEq)]
pub enum Scaling {
	/// Values were divided by this divisor
	Linear(f64),
	/// Values were centered and scaled per column
	Gaussian {
		/// Column means
		means: Vec<f64>,
		/// Column population standard deviations (zero for constant columns)
		std_devs: Vec<f64>,
	},
}

impl Scaling {
	/// Map a normalized row back to the original scale
	pub fn denormalize_row(&self, row: &mut [f64]) {
		match self {
			Scaling::Linear(divisor) => {
				for v in row {
					*v *= divisor;
				}
			},
			Scaling::Gaussian { means, std_devs } => {
				for ((v, mean), std_dev) in row.iter_mut().zip(means).zip(std_devs) {
					*v = *v * std_dev + mean;
				}
			},
		}
	}

	/// Map normalized data back to the original scale
	#[must_use]
	pub fn denormalize(&self, data: &Matrix) -> Matrix {
		let mut data = data.clone();
		for i in 0..data.rows() {
			self.denormalize_row(data.row_mut(i));
		}
		data
	}
}

/// Normalize `data` with `method`, returning the normalized data and the scaling to undo it.
///
/// Gaussian normalization uses each column's mean and population standard deviation.
/// A column with zero variance is mapped to all zeros.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if a linear divisor is zero or not finite.
pub fn normalize(data: &Matrix, method: NormalizationMethod) -> Result<(Matrix, Scaling)> {
	match method {
		NormalizationMethod::Linear(divisor) => {
			if divisor == 0.0 || !divisor.is_finite() {
				return Err(Error::InvalidArgument(format!(
					"the normalization divisor must be finite and non-zero, got {divisor}"
				)));
			}

			let mut normalized = data.clone();
			for v in &mut normalized.data {
				*v /= divisor;
			}
			Ok((normalized, Scaling::Linear(divisor)))
		},
		NormalizationMethod::Gaussian => {
			let mut normalized = data.clone();
			let mut means = vec![0.0; data.cols()];
			let mut std_devs = vec![0.0; data.cols()];

			#[allow(clippy::cast_precision_loss)]
			let n = data.rows() as f64;

			if data.rows() > 0 {
				for j in 0..data.cols() {
					let mean = data.iter_rows().map(|row| row[j]).sum::<f64>() / n;
					let variance = data.iter_rows().map(|row| (row[j] - mean) * (row[j] - mean)).sum::<f64>() / n;
					let std_dev = variance.sqrt();

					for i in 0..data.rows() {
						let v = &mut normalized.row_mut(i)[j];
						*v = if std_dev > 0.0 { (*v - mean) / std_dev } else { 0.0 };
					}

					means[j] = mean;
					std_devs[j] = std_dev;
				}
			}

			Ok((normalized, Scaling::Gaussian { means, std_devs }))
		},
	}
}

/// How the initial clustering of each trial is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedMethod {
	/// The first `k` rows go to clusters `0..k`, every other row to a uniformly random cluster
	Random,
	/// Spread out the initial centers using distance-weighted random selection
	#[default]
	KMeansPlusPlus,
}

/// Options for k-means based palettes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansOptions {
	/// Preprocessing applied to the color channels
	pub normalization: NormalizationMethod,
	/// Initialization strategy
	pub seed_method: SeedMethod,
	/// Number of independent runs, keeping the one with the lowest WCSS
	pub trials: u32,
	/// Random number generator seed, where `None` means a fixed default seed
	pub seed: Option<u64>,
}

impl Default for KMeansOptions {
	fn default() -> Self {
		Self {
			normalization: NormalizationMethod::default(),
			seed_method: SeedMethod::default(),
			trials: 1,
			seed: None,
		}
	}
}

/// Result from running k-means
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
	/// Cluster of each data row
	pub labels: Vec<usize>,
	/// Mean of each cluster, one row per cluster
	pub centers: Matrix,
	/// Total within-cluster sum of squared distances
	///
	/// A lower value indicates a tighter clustering.
	pub wcss: f64,
	/// Number of elapsed iterations in the kept trial
	pub iterations: u32,
}

impl KMeansResult {
	/// Number of rows in each cluster
	#[must_use]
	pub fn counts(&self) -> Vec<usize> {
		count_labels(&self.labels, self.centers.rows())
	}
}

/// Squared Euclidean distance
fn squared_distance(x: &[f64], y: &[f64]) -> f64 {
	x.iter().zip(y).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Index of the center closest to `row`, where the lowest index wins ties
fn nearest(row: &[f64], centers: &Matrix) -> usize {
	let mut min_dist = f64::INFINITY;
	let mut min_center = 0;
	for (i, center) in centers.iter_rows().enumerate() {
		let dist = squared_distance(row, center);
		if dist < min_dist {
			min_dist = dist;
			min_center = i;
		}
	}
	min_center
}

/// For each data row, find its closest center
#[cfg(not(feature = "threads"))]
fn assign(data: &Matrix, centers: &Matrix) -> Vec<usize> {
	data.iter_rows().map(|row| nearest(row, centers)).collect()
}

/// For each data row, find its closest center
#[cfg(feature = "threads")]
fn assign(data: &Matrix, centers: &Matrix) -> Vec<usize> {
	use rayon::prelude::*;

	data.as_slice()
		.par_chunks_exact(data.cols())
		.map(|row| nearest(row, centers))
		.collect()
}

/// Number of rows assigned to each of the `k` clusters
fn count_labels(labels: &[usize], k: usize) -> Vec<usize> {
	let mut counts = vec![0; k];
	for &label in labels {
		counts[label] += 1;
	}
	counts
}

/// Compute the mean of each cluster, or `None` if any cluster has no rows
fn means(data: &Matrix, labels: &[usize], k: usize) -> Option<Matrix> {
	let counts = count_labels(labels, k);
	if counts.contains(&0) {
		return None;
	}

	let mut means = Matrix::zeros(k, data.cols());
	for (row, &label) in data.iter_rows().zip(labels) {
		for (sum, &v) in means.row_mut(label).iter_mut().zip(row) {
			*sum += v;
		}
	}

	for (i, &n) in counts.iter().enumerate() {
		#[allow(clippy::cast_precision_loss)]
		let n = n as f64;
		for v in means.row_mut(i) {
			*v /= n;
		}
	}

	Some(means)
}

/// Total within-cluster sum of squared distances
fn wcss(data: &Matrix, centers: &Matrix, labels: &[usize]) -> f64 {
	data.iter_rows()
		.zip(labels)
		.map(|(row, &label)| squared_distance(row, centers.row(label)))
		.sum()
}

/// Assign the first `k` rows to clusters `0..k` and the rest uniformly at random
fn random_labels(n: usize, k: usize, rng: &mut impl Rng) -> Vec<usize> {
	(0..n).map(|i| if i < k { i } else { rng.gen_range(0..k) }).collect()
}

/// Choose `k` starting centers using the k-means++ algorithm
fn kmeans_plus_plus(data: &Matrix, k: usize, rng: &mut impl Rng) -> Result<Matrix> {
	use rand::distributions::{Distribution, WeightedError, WeightedIndex};

	let mut centers = Matrix::zeros(k, data.cols());
	let mut weights = vec![f64::INFINITY; data.rows()];

	// Pick any random first center
	centers.row_mut(0).copy_from_slice(data.row(rng.gen_range(0..data.rows())));

	// Pick each next center with a weighted probability based off the squared distance to its closest center
	for i in 1..k {
		for (weight, row) in weights.iter_mut().zip(data.iter_rows()) {
			*weight = f64::min(*weight, squared_distance(row, centers.row(i - 1)));
		}

		let next = match WeightedIndex::new(&weights) {
			Ok(sampler) => sampler.sample(rng),
			Err(WeightedError::AllWeightsZero) => {
				return Err(Error::DegenerateInput(format!(
					"cannot choose center {} of {k}: every row coincides with an existing center",
					i + 1
				)))
			},
			Err(err) => return Err(Error::InvalidArgument(format!("cannot seed k-means: {err}"))),
		};

		centers.row_mut(i).copy_from_slice(data.row(next));
	}

	Ok(centers)
}

/// Run Lloyd's iterations starting from `labels`, returning the final labels and the number of iterations.
///
/// A round that would leave a cluster without rows is rejected and ends the iteration,
/// as does a round in which no row changes cluster.
fn iterate(data: &Matrix, mut labels: Vec<usize>, k: usize, max_iter: usize) -> (Vec<usize>, u32) {
	let mut iterations = 0;
	for _ in 0..max_iter {
		let Some(centers) = means(data, &labels, k) else { break };
		iterations += 1;

		let proposed = assign(data, &centers);
		if proposed == labels {
			break;
		}

		if count_labels(&proposed, k).contains(&0) {
			trace!(iterations, "rejected a reassignment leaving a cluster empty");
			break;
		}

		labels = proposed;
	}

	(labels, iterations)
}

/// Run a single trial of k-means
fn kmeans(data: &Matrix, k: usize, seed_method: SeedMethod, rng: &mut impl Rng) -> Result<KMeansResult> {
	let labels = match seed_method {
		SeedMethod::Random => random_labels(data.rows(), k, rng),
		SeedMethod::KMeansPlusPlus => assign(data, &kmeans_plus_plus(data, k, rng)?),
	};

	let (labels, iterations) = iterate(data, labels, k, 2 * data.rows());

	let centers = means(data, &labels, k)
		.ok_or_else(|| Error::DegenerateInput(format!("fewer than {k} distinct rows to cluster")))?;

	let wcss = wcss(data, &centers, &labels);

	Ok(KMeansResult { labels, centers, wcss, iterations })
}

/// Runs k-means trials with a seeded random number generator shared across calls
#[derive(Debug, Clone)]
pub struct KMeans {
	/// Source of randomness for seeding
	rng: Xoshiro256PlusPlus,
}

impl KMeans {
	/// Create a new instance seeded with `seed`, or a fixed default seed if `None`
	#[must_use]
	pub fn new(seed: Option<u64>) -> Self {
		Self {
			rng: Xoshiro256PlusPlus::seed_from_u64(seed.unwrap_or(0)),
		}
	}

	/// Cluster the rows of `data` into `k` clusters,
	/// keeping the trial with the lowest WCSS (the earliest such trial on ties).
	///
	/// # Errors
	/// Returns [`Error::InvalidArgument`] if `k` or `trials` is zero, `k` exceeds the number of rows,
	/// or `data` has no columns.
	/// Returns [`Error::DegenerateInput`] if k-means++ seeding cannot find `k` distinct centers.
	pub fn cluster(&mut self, data: &Matrix, k: usize, trials: u32, seed_method: SeedMethod) -> Result<KMeansResult> {
		if k == 0 || trials == 0 {
			return Err(Error::InvalidArgument(format!(
				"k and trials must be at least 1, got k = {k} and trials = {trials}"
			)));
		}
		if k > data.rows() {
			return Err(Error::InvalidArgument(format!(
				"cannot form {k} clusters from {} rows",
				data.rows()
			)));
		}
		if data.cols() == 0 {
			return Err(Error::InvalidArgument("the data has no columns".to_owned()));
		}

		let mut best: Option<KMeansResult> = None;
		for trial in 0..trials {
			let result = kmeans(data, k, seed_method, &mut self.rng)?;
			debug!(trial, wcss = result.wcss, iterations = result.iterations, "k-means trial");

			if best.as_ref().map_or(true, |best| result.wcss < best.wcss) {
				best = Some(result);
			}
		}

		best.ok_or_else(|| Error::InvalidArgument("no k-means trial was run".to_owned()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use itertools::iproduct;

	fn test_data() -> Matrix {
		let rows = iproduct!((0..=255).step_by(51), (0..=255).step_by(85), [0, 128, 255])
			.map(|(r, g, b): (u32, u32, u32)| [f64::from(r), f64::from(g), f64::from(b)])
			.collect::<Vec<_>>();
		Matrix::from_rows(&rows).unwrap()
	}

	fn scenario() -> Matrix {
		Matrix::from_rows(&[[0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [100.0, 100.0]]).unwrap()
	}

	#[test]
	fn matrix_shape_is_checked() {
		assert!(Matrix::from_vec(2, 3, vec![0.0; 5]).is_err());
		assert!(Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());

		let matrix = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
		assert_eq!(matrix.row(1), &[3.0, 4.0]);
	}

	#[test]
	fn linear_round_trip() {
		let values = (0..=255).map(f64::from).collect::<Vec<_>>();
		let data = Matrix::from_vec(256, 1, values).unwrap();

		let (normalized, scaling) = normalize(&data, NormalizationMethod::Linear(255.0)).unwrap();
		assert!(normalized.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));

		let restored = scaling.denormalize(&normalized);
		for (&x, &y) in data.as_slice().iter().zip(restored.as_slice()) {
			assert_relative_eq!(x, y, epsilon = 1e-9);
		}
	}

	#[test]
	fn gaussian_columns_are_standardized() {
		let data = test_data();
		let (normalized, scaling) = normalize(&data, NormalizationMethod::Gaussian).unwrap();

		#[allow(clippy::cast_precision_loss)]
		let n = normalized.rows() as f64;
		for j in 0..normalized.cols() {
			let mean = normalized.iter_rows().map(|row| row[j]).sum::<f64>() / n;
			let variance = normalized.iter_rows().map(|row| row[j] * row[j]).sum::<f64>() / n;
			assert_relative_eq!(mean, 0.0, epsilon = 1e-9);
			assert_relative_eq!(variance, 1.0, epsilon = 1e-9);
		}

		let restored = scaling.denormalize(&normalized);
		for (&x, &y) in data.as_slice().iter().zip(restored.as_slice()) {
			assert_relative_eq!(x, y, epsilon = 1e-9);
		}
	}

	#[test]
	fn gaussian_constant_column_maps_to_zero() {
		let data = Matrix::from_rows(&[[7.0, 1.0], [7.0, 3.0]]).unwrap();
		let (normalized, scaling) = normalize(&data, NormalizationMethod::Gaussian).unwrap();

		assert!(normalized.iter_rows().all(|row| row[0] == 0.0));
		assert!(normalized.as_slice().iter().all(|v| v.is_finite()));
		assert_eq!(scaling.denormalize(&normalized), data);
	}

	#[test]
	fn zero_divisor_is_rejected() {
		assert!(matches!(
			normalize(&test_data(), NormalizationMethod::Linear(0.0)),
			Err(Error::InvalidArgument(_))
		));
	}

	#[test]
	fn nearest_prefers_lowest_index_on_ties() {
		let centers = Matrix::from_rows(&[[0.0], [10.0], [10.0]]).unwrap();
		assert_eq!(nearest(&[5.0], &centers), 0);
		assert_eq!(nearest(&[12.0], &centers), 1);
	}

	#[test]
	fn random_labels_cover_every_cluster() {
		let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
		let labels = random_labels(20, 6, &mut rng);
		assert_eq!(&labels[..6], &[0, 1, 2, 3, 4, 5]);
		assert!(labels.iter().all(|&label| label < 6));
	}

	#[test]
	fn kmeans_plus_plus_chooses_distinct_rows() {
		let data = test_data();
		let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
		let centers = kmeans_plus_plus(&data, 8, &mut rng).unwrap();

		for (i, center) in centers.iter_rows().enumerate() {
			assert!(data.iter_rows().any(|row| row == center));
			assert!(centers.iter_rows().skip(i + 1).all(|other| other != center));
		}
	}

	#[test]
	fn kmeans_plus_plus_needs_enough_distinct_rows() {
		let data = Matrix::from_rows(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]).unwrap();
		let result = KMeans::new(None).cluster(&data, 2, 1, SeedMethod::KMeansPlusPlus);
		assert!(matches!(result, Err(Error::DegenerateInput(_))));
	}

	#[test]
	fn reassignment_leaving_a_cluster_empty_is_rejected() {
		// both means are 5.0, so every row would move to cluster 0
		let data = Matrix::from_rows(&[[0.0], [10.0], [0.0], [10.0]]).unwrap();
		let (labels, iterations) = iterate(&data, vec![0, 1, 1, 0], 2, 8);
		assert_eq!(labels, vec![0, 1, 1, 0]);
		assert_eq!(iterations, 1);
	}

	#[test]
	fn three_at_the_origin_and_one_far_away() {
		for (seed, method) in iproduct!(0..16, [SeedMethod::Random, SeedMethod::KMeansPlusPlus]) {
			let result = KMeans::new(Some(seed)).cluster(&scenario(), 2, 1, method).unwrap();

			let mut counts = result.counts();
			counts.sort_unstable();
			assert_eq!(counts, vec![1, 3]);

			let far = result.labels[3];
			assert_eq!(result.centers.row(far), &[100.0, 100.0]);
			assert_eq!(result.centers.row(1 - far), &[0.0, 0.0]);
			assert_relative_eq!(result.wcss, 0.0);
		}
	}

	#[test]
	fn clusters_are_never_empty() {
		let data = test_data();
		for (k, method) in iproduct!([1, 2, 5, 16, 40], [SeedMethod::Random, SeedMethod::KMeansPlusPlus]) {
			let result = KMeans::new(Some(1)).cluster(&data, k, 2, method).unwrap();
			assert_eq!(result.labels.len(), data.rows());
			assert_eq!(result.centers.rows(), k);
			assert!(result.counts().iter().all(|&n| n > 0));
		}
	}

	#[test]
	fn best_trial_has_lowest_wcss() {
		let data = test_data();
		for method in [SeedMethod::Random, SeedMethod::KMeansPlusPlus] {
			let mut single = KMeans::new(Some(9));
			let trials = (0..6)
				.map(|_| single.cluster(&data, 7, 1, method).unwrap().wcss)
				.collect::<Vec<_>>();

			let best = KMeans::new(Some(9)).cluster(&data, 7, 6, method).unwrap();
			let min = trials.iter().copied().fold(f64::INFINITY, f64::min);

			assert!(trials.iter().all(|&wcss| best.wcss <= wcss));
			assert_relative_eq!(best.wcss, min);
		}
	}

	#[test]
	fn wcss_matches_labels_and_centers() {
		let data = test_data();
		let result = KMeans::new(Some(4)).cluster(&data, 5, 1, SeedMethod::KMeansPlusPlus).unwrap();

		let expected = data
			.iter_rows()
			.zip(&result.labels)
			.map(|(row, &label)| squared_distance(row, result.centers.row(label)))
			.sum::<f64>();

		assert_relative_eq!(result.wcss, expected);
	}

	#[test]
	fn same_seed_same_result() {
		let data = test_data();
		let a = KMeans::new(Some(42)).cluster(&data, 6, 3, SeedMethod::KMeansPlusPlus).unwrap();
		let b = KMeans::new(Some(42)).cluster(&data, 6, 3, SeedMethod::KMeansPlusPlus).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn invalid_arguments() {
		let data = scenario();
		let mut kmeans = KMeans::new(None);
		for (k, trials) in [(0, 1), (2, 0), (5, 1)] {
			assert!(matches!(
				kmeans.cluster(&data, k, trials, SeedMethod::Random),
				Err(Error::InvalidArgument(_))
			));
		}
	}

	#[test]
	fn iterations_are_bounded() {
		let data = test_data();
		let result = KMeans::new(Some(2)).cluster(&data, 9, 1, SeedMethod::Random).unwrap();
		assert!(result.iterations as usize <= 2 * data.rows());
		assert!(result.iterations >= 1);
	}
}
