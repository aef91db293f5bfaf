//! Hopscotch hash tables.
//!
//! Open addressing with neighborhood hopping: every entry lives within a
//! fixed-size window of buckets starting at its hash ("virtual") bucket,
//! and the virtual bucket records which window offsets belong to it in a
//! per-bucket bitmask. The mask and the bucket's own occupancy flag share
//! one 64-bit word, so a lookup reads a single word and then only the
//! buckets the mask names.
//!
//! Insertion probes linearly for the nearest free bucket and then
//! repeatedly swaps a displaceable entry toward its virtual bucket until
//! the free bucket falls inside the window; if no displaceable entry
//! exists, the table doubles and rehashes.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem::MaybeUninit;
use std::ops::Index;

/// Window size. One less than the mask word: the top bit of the word is
/// the bucket's own occupancy flag.
const NEIGHBORHOOD: usize = 63;
const OCCUPIED_BIT: u64 = 1 << NEIGHBORHOOD;
const HOP_MASK: u64 = OCCUPIED_BIT - 1;

const DEFAULT_BUCKETS: usize = 16;
const MIN_LOAD: f32 = 0.3;
const MAX_LOAD: f32 = 0.7;
/// Tables at or below this size never shrink.
const SHRINK_FLOOR: usize = 16;

struct Bucket<T> {
    /// Bits 0..=62: window offsets owned by this bucket as a virtual
    /// bucket. Bit 63: whether this bucket itself holds an entry.
    hop_info: u64,
    slot: MaybeUninit<T>,
}

impl<T> Bucket<T> {
    fn empty() -> Self {
        Bucket {
            hop_info: 0,
            slot: MaybeUninit::uninit(),
        }
    }

    #[inline]
    fn has_value(&self) -> bool {
        self.hop_info & OCCUPIED_BIT != 0
    }

    #[inline]
    fn set_has_value(&mut self, on: bool) {
        if on {
            self.hop_info |= OCCUPIED_BIT;
        } else {
            self.hop_info &= !OCCUPIED_BIT;
        }
    }
}

/// Iterate the set bits of a hop mask, lowest first.
#[inline]
fn hop_bits(mut mask: u64) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if mask == 0 {
            None
        } else {
            let bit = mask.trailing_zeros() as usize;
            mask &= mask - 1;
            Some(bit)
        }
    })
}

/// An unordered map from `K` to `V` using hopscotch hashing.
///
/// The bucket count is always a power of two. Load is kept between fixed
/// bounds by rehashing: halving when erasure drains the table, doubling
/// when insertion fills it or no displacement chain can free a window
/// slot.
///
/// Insertion is first-wins, matching the ordered containers.
pub struct HopscotchMap<K, V, S = RandomState> {
    buckets: Vec<Bucket<(K, V)>>,
    len: usize,
    min_len: usize,
    max_len: usize,
    min_load: f32,
    max_load: f32,
    hasher: S,
}

impl<K: Hash + Eq, V> HopscotchMap<K, V, RandomState> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> HopscotchMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        let mut table = HopscotchMap {
            buckets: Vec::new(),
            len: 0,
            min_len: 0,
            max_len: 0,
            min_load: MIN_LOAD,
            max_load: MAX_LOAD,
            hasher,
        };
        table.buckets = (0..DEFAULT_BUCKETS).map(|_| Bucket::empty()).collect();
        table.update_load_bounds();
        table
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn load_factor(&self) -> f32 {
        self.len as f32 / self.buckets.len() as f32
    }

    pub fn min_load_factor(&self) -> f32 {
        self.min_load
    }

    pub fn max_load_factor(&self) -> f32 {
        self.max_load
    }

    /// Lower load bound; shrinks at once if the table is already below it.
    pub fn set_min_load_factor(&mut self, min_load: f32) {
        self.min_load = min_load;
        self.update_load_bounds();
        if self.len < self.min_len {
            self.rehash(self.buckets.len() / 2);
        }
    }

    /// Upper load bound; grows at once if the table is already above it.
    pub fn set_max_load_factor(&mut self, max_load: f32) {
        self.max_load = max_load;
        self.update_load_bounds();
        if self.len > self.max_len {
            self.rehash(self.buckets.len() * 2);
        }
    }

    /// Size the table for at least `count` entries without rehashing.
    pub fn reserve(&mut self, count: usize) {
        self.rehash((count as f32 / self.max_load).ceil() as usize);
    }

    fn update_load_bounds(&mut self) {
        self.min_len = (self.min_load * self.buckets.len() as f32) as usize;
        self.max_len = (self.max_load * self.buckets.len() as f32) as usize;
    }

    // -- index helpers -------------------------------------------------------

    // Bucket counts are powers of two, so masking is the modulo.

    #[inline]
    fn index_for<Q: Hash + ?Sized>(&self, key: &Q) -> usize {
        self.hasher.hash_one(key) as usize & (self.buckets.len() - 1)
    }

    #[inline]
    fn index_add(&self, index: usize, x: usize) -> usize {
        (index + x) & (self.buckets.len() - 1)
    }

    #[inline]
    fn index_sub(&self, index: usize, x: usize) -> usize {
        index.wrapping_sub(x) & (self.buckets.len() - 1)
    }

    // -- lookup --------------------------------------------------------------

    fn find_index<Q>(&self, key: &Q, virtual_index: usize) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mask = self.buckets[virtual_index].hop_info & HOP_MASK;
        for hop in hop_bits(mask) {
            let index = self.index_add(virtual_index, hop);
            let bucket = &self.buckets[index];
            debug_assert!(bucket.has_value());
            // SAFETY: a set hop bit marks an occupied bucket.
            let (k, _) = unsafe { bucket.slot.assume_init_ref() };
            if k.borrow() == key {
                return Some(index);
            }
        }
        None
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(key, self.index_for(key))?;
        // SAFETY: `find_index` only returns occupied buckets.
        let (_, v) = unsafe { self.buckets[index].slot.assume_init_ref() };
        Some(v)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(key, self.index_for(key))?;
        // SAFETY: `find_index` only returns occupied buckets.
        let (_, v) = unsafe { self.buckets[index].slot.assume_init_mut() };
        Some(v)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_index(key, self.index_for(key)).is_some()
    }

    /// Number of entries stored for `key` (0 or 1).
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_index(key, self.index_for(key)).map_or(0, |_| 1)
    }

    // -- mutation ------------------------------------------------------------

    /// Insert `key` mapping to `value`. Returns `true` if the key was
    /// absent; if it was present the stored entry is left unchanged and
    /// `false` is returned.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let virtual_index = self.index_for(&key);
        if self.find_index(&key, virtual_index).is_some() {
            return false;
        }
        self.insert_at((key, value), virtual_index);
        true
    }

    fn insert_at(&mut self, value: (K, V), virtual_index: usize) {
        // Grow first if this insert would pass the upper load bound.
        if self.len == self.max_len {
            self.rehash(self.buckets.len() * 2);
            let index = self.index_for(&value.0);
            self.insert_at(value, index);
            return;
        }

        // Nearest free bucket, wrapping past the end.
        let mut free_dist = 0;
        let mut free_index = virtual_index;
        while self.buckets[free_index].has_value() {
            free_dist += 1;
            free_index = self.index_add(free_index, 1);
        }

        // Hop the free bucket toward the neighborhood: find a virtual
        // bucket owning an entry stored before the free bucket, and swap
        // that entry into it.
        while free_dist > NEIGHBORHOOD - 1 {
            let mut virtual_move_dist = NEIGHBORHOOD - 1;
            let mut virtual_move_index = self.index_sub(free_index, virtual_move_dist);

            let move_hop;
            loop {
                let mask = self.buckets[virtual_move_index].hop_info & HOP_MASK;
                let first = mask.trailing_zeros() as usize;
                if first < virtual_move_dist {
                    move_hop = first;
                    break;
                }
                virtual_move_dist -= 1;
                virtual_move_index = self.index_add(virtual_move_index, 1);

                if virtual_move_dist == 0 {
                    // Nothing is displaceable: grow and start over.
                    self.rehash(self.buckets.len() * 2);
                    let index = self.index_for(&value.0);
                    self.insert_at(value, index);
                    return;
                }
            }

            let move_dist = virtual_move_dist - move_hop;
            let move_index = self.index_add(virtual_move_index, move_hop);

            // SAFETY: the hop bit marks `move_index` occupied; the value
            // is moved out and the bucket marked free before reuse.
            let moved = unsafe { self.buckets[move_index].slot.assume_init_read() };
            self.buckets[move_index].set_has_value(false);
            self.buckets[free_index].slot.write(moved);
            self.buckets[free_index].set_has_value(true);

            let virtual_move = &mut self.buckets[virtual_move_index];
            virtual_move.hop_info &= !(1 << move_hop);
            virtual_move.hop_info |= 1 << virtual_move_dist;

            free_dist -= move_dist;
            free_index = self.index_sub(free_index, move_dist);
        }

        self.buckets[free_index].slot.write(value);
        self.buckets[free_index].set_has_value(true);
        self.buckets[virtual_index].hop_info |= 1 << free_dist;
        self.len += 1;
    }

    /// Remove the entry for `key` if present. Returns the number of
    /// entries removed.
    pub fn remove<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let virtual_index = self.index_for(key);
        let mask = self.buckets[virtual_index].hop_info & HOP_MASK;

        let mut erased = 0;
        for hop in hop_bits(mask) {
            let index = self.index_add(virtual_index, hop);
            let bucket = &mut self.buckets[index];
            // SAFETY: a set hop bit marks an occupied bucket.
            let matches = unsafe { bucket.slot.assume_init_ref() }.0.borrow() == key;
            if matches {
                // SAFETY: occupied, and the flags are cleared below.
                unsafe { bucket.slot.assume_init_drop() };
                bucket.set_has_value(false);
                self.buckets[virtual_index].hop_info &= !(1 << hop);
                erased += 1;
            }
        }

        self.len -= erased;

        if self.len < self.min_len && self.len > SHRINK_FLOOR {
            self.rehash(self.buckets.len() / 2);
        }

        erased
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            if bucket.has_value() {
                // SAFETY: occupied bucket; hop_info is reset below.
                unsafe { bucket.slot.assume_init_drop() };
            }
            bucket.hop_info = 0;
        }
        self.len = 0;
    }

    /// Rebuild the table with at least `count` buckets (rounded up to a
    /// power of two). Entries that cannot be placed grow the target and
    /// restart placement, so nothing is dropped.
    pub fn rehash(&mut self, count: usize) {
        let target = count.next_power_of_two().max(DEFAULT_BUCKETS);

        let old = std::mem::take(&mut self.buckets);
        self.buckets = (0..target).map(|_| Bucket::empty()).collect();
        self.len = 0;
        self.update_load_bounds();

        for mut bucket in old {
            if bucket.has_value() {
                // SAFETY: occupied; the old vector is dropped without
                // touching the moved-out slot.
                let value = unsafe { bucket.slot.assume_init_read() };
                bucket.hop_info = 0;
                let index = self.index_for(&value.0);
                self.insert_at(value, index);
            }
        }
    }

    pub fn iter(&self) -> HopscotchIter<'_, K, V> {
        HopscotchIter {
            buckets: &self.buckets,
            index: 0,
        }
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}

impl<K, V, S> Drop for HopscotchMap<K, V, S> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<(K, V)>() {
            for bucket in &mut self.buckets {
                if bucket.has_value() {
                    // SAFETY: occupied bucket, dropped exactly once.
                    unsafe { bucket.slot.assume_init_drop() };
                }
            }
        }
    }
}

impl<K: Hash + Eq, V> Default for HopscotchMap<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Clone for HopscotchMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        let buckets = self
            .buckets
            .iter()
            .map(|bucket| {
                let mut out = Bucket::empty();
                out.hop_info = bucket.hop_info;
                if bucket.has_value() {
                    // SAFETY: occupied in the source table.
                    out.slot.write(unsafe { bucket.slot.assume_init_ref() }.clone());
                }
                out
            })
            .collect();
        HopscotchMap {
            buckets,
            len: self.len,
            min_len: self.min_len,
            max_len: self.max_len,
            min_load: self.min_load,
            max_load: self.max_load,
            hasher: self.hasher.clone(),
        }
    }
}

/// Panics if the key is absent; use [`HopscotchMap::get`] for a total
/// lookup.
impl<K, V, S, Q> Index<&Q> for HopscotchMap<K, V, S>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K, V, S> fmt::Debug for HopscotchMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(HopscotchIter {
                buckets: &self.buckets,
                index: 0,
            })
            .finish()
    }
}

pub struct HopscotchIter<'a, K, V> {
    buckets: &'a [Bucket<(K, V)>],
    index: usize,
}

impl<'a, K, V> Iterator for HopscotchIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.buckets.len() {
            let bucket = &self.buckets[self.index];
            self.index += 1;
            if bucket.has_value() {
                // SAFETY: occupied bucket.
                let (k, v) = unsafe { bucket.slot.assume_init_ref() };
                return Some((k, v));
            }
        }
        None
    }
}

impl<'a, K: Hash + Eq, V, S: BuildHasher> IntoIterator for &'a HopscotchMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = HopscotchIter<'a, K, V>;

    fn into_iter(self) -> HopscotchIter<'a, K, V> {
        self.iter()
    }
}

// =============================================================================
// Set
// =============================================================================

/// An unordered set of keys, stored as a map to the unit value.
pub struct HopscotchSet<K, S = RandomState> {
    map: HopscotchMap<K, (), S>,
}

impl<K: Hash + Eq> HopscotchSet<K, RandomState> {
    pub fn new() -> Self {
        HopscotchSet {
            map: HopscotchMap::new(),
        }
    }
}

impl<K: Hash + Eq, S: BuildHasher> HopscotchSet<K, S> {
    pub fn with_hasher(hasher: S) -> Self {
        HopscotchSet {
            map: HopscotchMap::with_hasher(hasher),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.map.bucket_count()
    }

    /// Returns `true` if the key was absent and has been inserted.
    pub fn insert(&mut self, key: K) -> bool {
        self.map.insert(key, ())
    }

    /// Returns the number of keys removed (0 or 1).
    pub fn remove<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn reserve(&mut self, count: usize) {
        self.map.reserve(count);
    }

    pub fn iter(&self) -> HopscotchSetIter<'_, K> {
        HopscotchSetIter {
            inner: self.map.iter(),
        }
    }
}

impl<K: Hash + Eq> Default for HopscotchSet<K, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> Clone for HopscotchSet<K, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        HopscotchSet {
            map: self.map.clone(),
        }
    }
}

impl<K: fmt::Debug + Hash + Eq, S: BuildHasher> fmt::Debug for HopscotchSet<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub struct HopscotchSetIter<'a, K> {
    inner: HopscotchIter<'a, K, ()>,
}

impl<'a, K> Iterator for HopscotchSetIter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, ())| k)
    }
}

impl<'a, K: Hash + Eq, S: BuildHasher> IntoIterator for &'a HopscotchSet<K, S> {
    type Item = &'a K;
    type IntoIter = HopscotchSetIter<'a, K>;

    fn into_iter(self) -> HopscotchSetIter<'a, K> {
        self.iter()
    }
}
