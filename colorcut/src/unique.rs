//! A concurrent table of the distinct colors seen during a scan

use crate::{
	codec::{decode_key, encode_key},
	Color,
};
use parking_lot::Mutex;
use std::{
	collections::HashMap,
	sync::atomic::{AtomicU32, Ordering},
};

/// Number of independently locked shards
const SHARDS: usize = 64;

/// Maps each distinct color key to the index it was first inserted at.
///
/// Keys are spread over independently locked shards,
/// so concurrent scan workers only contend when they hit the same shard at the same time.
/// Indices form the dense range `0..len()` and are assigned exactly once per key:
/// when several workers race on a new key, the first one to reach its shard wins.
#[derive(Debug)]
pub struct UniqueColorTable {
	/// Key -> insertion index, sharded by key
	shards: Box<[Mutex<HashMap<i32, u32>>]>,
	/// The next insertion index to hand out
	next: AtomicU32,
}

impl Default for UniqueColorTable {
	fn default() -> Self {
		Self::new()
	}
}

impl UniqueColorTable {
	/// Create an empty table
	#[must_use]
	pub fn new() -> Self {
		Self {
			shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
			next: AtomicU32::new(0),
		}
	}

	/// The shard responsible for `key`
	#[allow(clippy::cast_sign_loss)]
	fn shard(&self, key: i32) -> &Mutex<HashMap<i32, u32>> {
		// mix the channels so that similar colors land in different shards
		let hash = (key as u32).wrapping_mul(0x9E37_79B9) >> 26;
		&self.shards[hash as usize % SHARDS]
	}

	/// Returns the insertion index of `key`, inserting it with the next free index if absent
	pub fn add_or_get(&self, key: i32) -> u32 {
		*self
			.shard(key)
			.lock()
			.entry(key)
			.or_insert_with(|| self.next.fetch_add(1, Ordering::Relaxed))
	}

	/// Insert a color with its alpha forced to opaque, returning its insertion index
	pub fn add_color(&self, color: Color) -> u32 {
		self.add_or_get(encode_key(color))
	}

	/// Returns the insertion index of `key`, if present
	#[must_use]
	pub fn get(&self, key: i32) -> Option<u32> {
		self.shard(key).lock().get(&key).copied()
	}

	/// Number of distinct keys
	#[must_use]
	pub fn len(&self) -> usize {
		self.shards.iter().map(|shard| shard.lock().len()).sum()
	}

	/// Whether no key has been inserted
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// All `(key, index)` pairs in ascending index order
	#[must_use]
	pub fn snapshot_ordered_by_index(&self) -> Vec<(i32, u32)> {
		let mut pairs = self
			.shards
			.iter()
			.flat_map(|shard| shard.lock().iter().map(|(&key, &index)| (key, index)).collect::<Vec<_>>())
			.collect::<Vec<_>>();

		pairs.sort_unstable_by_key(|&(_, index)| index);
		pairs
	}

	/// All distinct colors in ascending index order
	#[must_use]
	pub fn colors(&self) -> Vec<Color> {
		self.snapshot_ordered_by_index()
			.into_iter()
			.map(|(key, _)| decode_key(key))
			.collect()
	}

	/// Remove every key and restart indices at zero.
	///
	/// Must not race with insertions.
	pub fn clear(&self) {
		for shard in self.shards.iter() {
			shard.lock().clear();
		}
		self.next.store(0, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use itertools::iproduct;
	use std::{collections::HashSet, sync::Arc, thread};

	#[test]
	fn indices_are_assigned_once() {
		let table = UniqueColorTable::new();
		assert_eq!(table.add_color(Color::new(1, 2, 3)), 0);
		assert_eq!(table.add_color(Color::new(4, 5, 6)), 1);
		assert_eq!(table.add_color(Color::new(1, 2, 3)), 0);
		assert_eq!(table.len(), 2);
	}

	#[test]
	fn alpha_is_ignored() {
		let table = UniqueColorTable::new();
		table.add_color(Color::from_argb_components(0, 9, 9, 9));
		table.add_color(Color::from_argb_components(128, 9, 9, 9));
		assert_eq!(table.colors(), vec![Color::new(9, 9, 9)]);
	}

	#[test]
	fn snapshot_is_ordered_by_index() {
		let table = UniqueColorTable::new();
		let colors = iproduct!((0..=255).step_by(51), (0..=255).step_by(85), [0, 255])
			.map(|(r, g, b)| Color::new(r, g, b))
			.collect::<Vec<_>>();

		for &color in &colors {
			table.add_color(color);
		}

		let snapshot = table.snapshot_ordered_by_index();
		#[allow(clippy::cast_possible_truncation)]
		for (i, &(key, index)) in snapshot.iter().enumerate() {
			assert_eq!(index, i as u32);
			assert_eq!(key, encode_key(colors[i]));
		}
		assert_eq!(table.colors(), colors);
	}

	#[test]
	fn concurrent_inserts_assign_dense_unique_indices() {
		let table = Arc::new(UniqueColorTable::new());
		let workers = (0..8)
			.map(|_| {
				let table = Arc::clone(&table);
				thread::spawn(move || {
					for v in 0..=255 {
						table.add_color(Color::new(v, 255 - v, 7));
					}
				})
			})
			.collect::<Vec<_>>();

		for worker in workers {
			worker.join().unwrap();
		}

		let snapshot = table.snapshot_ordered_by_index();
		assert_eq!(snapshot.len(), 256);

		let indices = snapshot.iter().map(|&(_, index)| index).collect::<HashSet<_>>();
		assert_eq!(indices, (0..256).collect());

		for (key, index) in snapshot {
			assert_eq!(table.get(key), Some(index));
		}
	}

	#[test]
	fn clear_restarts_indices() {
		let table = UniqueColorTable::new();
		table.add_color(Color::new(1, 1, 1));
		table.add_color(Color::new(2, 2, 2));
		table.clear();

		assert!(table.is_empty());
		assert_eq!(table.add_color(Color::new(2, 2, 2)), 0);
	}
}
