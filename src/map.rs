// MIT License
//
// Copyright (c) 2020 Gregory Meyer
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation files
// (the "Software"), to deal in the Software without restriction,
// including without limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of the Software,
// and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! A concurrent hash table addressed by composite keys.
//!
//! Every sub-key of a composite key is hashed on its own, and the hashes are
//! combined into a mixed-radix bucket index. Keys that agree on all sub-keys
//! but one therefore live in buckets that differ in a single digit, which is
//! what makes partial-key slice queries cheap.

mod bucket;
mod registry;


use bucket::{BucketArray, Node};
use registry::KeyRegistry;

use crate::{
    error::{Error, Result},
    schema::{self, KeySchema, SubKeyValue},
};

use std::{
    env,
    hash::{BuildHasher, Hash},
    marker::PhantomData,
    mem, ptr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use crossbeam_epoch::{self, Atomic, Guard, Owned, Shared};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default hasher for `MultiKeyMap`.
///
/// This is currently [aHash], a hashing algorithm designed around acceleration
/// by the [AES-NI] instruction set on x86 processors. aHash is not
/// cryptographically secure, but is fast and resistant to DoS attacks.
///
/// [aHash]: https://docs.rs/ahash
/// [AES-NI]: https://en.wikipedia.org/wiki/AES_instruction_set
pub type DefaultHashBuilder = ahash::RandomState;

/// How writers coordinate with a concurrent expansion.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Synchronization {
    /// Writers lock only the bucket they mutate, and readers take no lock.
    ///
    /// A writer that loaded the bucket array before an expansion published
    /// its replacement may write into the retired array after its bucket was
    /// copied. That write is lost.
    #[default]
    PerBucket,

    /// Like `PerBucket`, but expansion seals each bucket as it copies it. A
    /// writer that finds its bucket sealed waits for the expansion to finish
    /// and retries against the new array. No write is lost.
    CopyOnWrite,

    /// One readers-writer lock over the whole table. Writers take it
    /// exclusively and readers share it.
    Global,
}

/// Construction parameters for a [`MultiKeyMap`].
///
/// [`MultiKeyMap`]: struct.MultiKeyMap.html
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Options {
    /// Number of distinct digits per sub-key. The table starts with
    /// `range_per_key.pow(key_size)` buckets.
    pub range_per_key: usize,
    /// How writers coordinate with an expansion.
    pub synchronization: Synchronization,
}

impl Default for Options {
    /// Returns options with the default range per key and
    /// [`Synchronization::PerBucket`].
    ///
    /// The default range per key is 32. It can be overridden by setting the
    /// `MULTIKEY_RANGE_PER_KEY` environment variable; the variable is read
    /// once per process.
    ///
    /// [`Synchronization::PerBucket`]: enum.Synchronization.html#variant.PerBucket
    fn default() -> Self {
        Options {
            range_per_key: default_range_per_key(),
            synchronization: Synchronization::default(),
        }
    }
}

/// A concurrent hash table addressed by composite keys.
///
/// Keys are split into sub-keys by a [`KeySchema`]. Two keys are the same
/// entry iff they agree on every sub-key. Besides exact lookups, the table
/// answers slice queries: given a key and one sub-key to leave out, it
/// returns the value of every entry that matches the key on the remaining
/// sub-keys.
///
/// The table has `range_per_key.pow(key_size)` buckets and chains colliding
/// entries. When every bucket is occupied, the next insertion first doubles
/// the range per key and rehashes every entry from its cached sub-key hashes.
///
/// All operations take `&self`. Lookups, slice queries and iteration walk
/// the table without locking, protected by [crossbeam-epoch]. How writers
/// interact with an expansion is chosen with [`Synchronization`].
///
/// Operations that return values clone them, as an entry may be in use by
/// other threads and cannot be moved from. Insertion additionally requires
/// `K: Clone` and `V: Clone`, since expansion copies every entry.
///
/// [`KeySchema`]: struct.KeySchema.html
/// [`Synchronization`]: enum.Synchronization.html
/// [crossbeam-epoch]: https://docs.rs/crossbeam-epoch
pub struct MultiKeyMap<K, V, S = DefaultHashBuilder> {
    buckets: Atomic<BucketArray<K, V>>,
    schema: Arc<KeySchema<K>>,
    registry: KeyRegistry<K>,
    build_hasher: S,
    expansion: Mutex<()>,
    gate: RwLock<()>,
    growth_exhausted: AtomicBool,
    synchronization: Synchronization,
}

impl<K, V> MultiKeyMap<K, V, DefaultHashBuilder> {
    /// Creates an empty table with [`Options::default`].
    ///
    /// [`Options::default`]: struct.Options.html#impl-Default
    pub fn new(schema: Arc<KeySchema<K>>) -> Result<Self> {
        MultiKeyMap::with_options_and_hasher(schema, Options::default(), DefaultHashBuilder::default())
    }

    /// Creates an empty table with `range_per_key.pow(schema.key_size())`
    /// buckets.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if `range_per_key` is zero
    /// or the buckets cannot be allocated.
    ///
    /// [`Error::InvalidConfiguration`]: enum.Error.html#variant.InvalidConfiguration
    pub fn with_range(schema: Arc<KeySchema<K>>, range_per_key: usize) -> Result<Self> {
        MultiKeyMap::with_range_and_hasher(schema, range_per_key, DefaultHashBuilder::default())
    }

    /// Creates an empty table configured by `options`.
    pub fn with_options(schema: Arc<KeySchema<K>>, options: Options) -> Result<Self> {
        MultiKeyMap::with_options_and_hasher(schema, options, DefaultHashBuilder::default())
    }
}

impl<K, V, S: BuildHasher> MultiKeyMap<K, V, S> {
    /// Creates an empty table with the default range per key that uses
    /// `build_hasher` to hash sub-keys.
    pub fn with_hasher(schema: Arc<KeySchema<K>>, build_hasher: S) -> Result<Self> {
        MultiKeyMap::with_options_and_hasher(schema, Options::default(), build_hasher)
    }

    /// Creates an empty table with `range_per_key.pow(schema.key_size())`
    /// buckets that uses `build_hasher` to hash sub-keys.
    pub fn with_range_and_hasher(
        schema: Arc<KeySchema<K>>,
        range_per_key: usize,
        build_hasher: S,
    ) -> Result<Self> {
        let options = Options {
            range_per_key,
            ..Options::default()
        };

        MultiKeyMap::with_options_and_hasher(schema, options, build_hasher)
    }

    /// Creates an empty table configured by `options` that uses
    /// `build_hasher` to hash sub-keys.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if `options.range_per_key`
    /// is zero or the buckets cannot be allocated.
    ///
    /// [`Error::InvalidConfiguration`]: enum.Error.html#variant.InvalidConfiguration
    pub fn with_options_and_hasher(
        schema: Arc<KeySchema<K>>,
        options: Options,
        build_hasher: S,
    ) -> Result<Self> {
        let buckets = BucketArray::with_range(options.range_per_key, schema.key_size())?;

        Ok(MultiKeyMap {
            buckets: Atomic::new(buckets),
            schema,
            registry: KeyRegistry::new(),
            build_hasher,
            expansion: Mutex::new(()),
            gate: RwLock::new(()),
            growth_exhausted: AtomicBool::new(false),
            synchronization: options.synchronization,
        })
    }

    /// Returns the schema keys are split by.
    pub fn schema(&self) -> &KeySchema<K> {
        &self.schema
    }

    /// Returns how writers coordinate with an expansion.
    pub fn synchronization(&self) -> Synchronization {
        self.synchronization
    }

    /// Returns the number of sub-keys per key.
    pub fn key_size(&self) -> usize {
        self.schema.key_size()
    }

    /// Returns the number of bucket slots.
    pub fn capacity(&self) -> usize {
        self.with_bucket_array(BucketArray::capacity)
    }

    /// Returns the number of entries in the table.
    ///
    /// During an expansion this reflects whichever bucket array was current
    /// when it was read.
    pub fn len(&self) -> usize {
        self.with_bucket_array(BucketArray::len)
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of occupied bucket slots.
    pub fn non_empty_nodes(&self) -> usize {
        self.with_bucket_array(BucketArray::non_empty_nodes)
    }

    /// Returns true if every bucket slot is occupied. The next insertion into
    /// a full table expands it first.
    pub fn is_full(&self) -> bool {
        self.with_bucket_array(BucketArray::is_full)
    }

    /// Returns the number of distinct digits per sub-key. Doubles on every
    /// expansion.
    pub fn range_per_key(&self) -> usize {
        self.with_bucket_array(BucketArray::range_per_key)
    }

    /// Returns a copy of the value corresponding to `key`.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get_and(key, V::clone)
    }

    /// Invokes `with_value` with a reference to the value corresponding to
    /// `key`.
    pub fn get_and<F: FnOnce(&V) -> T, T>(&self, key: &K, with_value: F) -> Option<T> {
        let hashes = self.schema.hashes(&self.build_hasher, key);

        let _gate = self.read_gate();
        let guard = &crossbeam_epoch::pin();

        self.bucket_array(guard)
            .get(guard, &self.schema, &hashes, key)
            .map(|node| with_value(&node.value))
    }

    /// Returns true if a key equal to `key` has been inserted and not removed
    /// since.
    ///
    /// This consults the key registry rather than the buckets.
    pub fn contains_key(&self, key: &K) -> bool {
        let _gate = self.read_gate();

        self.registry.contains(&self.schema, key)
    }

    /// Removes every entry whose key equals `key`, returning a copy of the
    /// value of the first one removed.
    pub fn remove(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.remove_and(key, V::clone)
    }

    /// Removes every entry whose key equals `key`, invoking
    /// `with_previous_value` with the value of the first one removed.
    ///
    /// Removing a key that is not present changes nothing.
    pub fn remove_and<F: FnOnce(&V) -> T, T>(
        &self,
        key: &K,
        with_previous_value: F,
    ) -> Option<T> {
        let hashes = self.schema.hashes(&self.build_hasher, key);

        let _gate = self.write_gate();
        let guard = &crossbeam_epoch::pin();
        let mut buckets = self.bucket_array(guard);

        loop {
            let removed = buckets.remove(
                guard,
                &self.schema,
                &hashes,
                key,
                self.respects_seal(),
                Some(&self.registry),
            );

            match removed {
                Ok(removed_ptr) => {
                    return unsafe { removed_ptr.as_ref() }
                        .map(|removed| with_previous_value(&removed.value));
                }
                Err(_) => {
                    self.wait_for_expansion();
                    buckets = self.bucket_array(guard);
                }
            }
        }
    }

    /// Returns the value of every entry whose key matches `key` on all
    /// sub-keys except the one called `name`.
    ///
    /// Values are returned in bucket order, then chain order. Fails with
    /// [`Error::UnknownSubKeyName`] if the schema has no such sub-key.
    ///
    /// [`Error::UnknownSubKeyName`]: enum.Error.html#variant.UnknownSubKeyName
    pub fn get_values_excluding(&self, key: &K, name: &str) -> Result<Vec<V>>
    where
        V: Clone,
    {
        let excluded = self.schema.position_of_name(name)?;

        Ok(self.values_excluding(key, excluded))
    }

    /// Like [`get_values_excluding`], but names the excluded sub-key by its
    /// declared order.
    ///
    /// [`get_values_excluding`]: #method.get_values_excluding
    pub fn get_values_excluding_order(&self, key: &K, order: u32) -> Result<Vec<V>>
    where
        V: Clone,
    {
        let excluded = self.schema.position_of_order(order)?;

        Ok(self.values_excluding(key, excluded))
    }

    /// Returns the value of every entry whose sub-key called `name` equals
    /// `value`, whatever its other sub-keys are.
    ///
    /// Fails with [`Error::UnknownSubKeyName`] if the schema has no such
    /// sub-key, and with [`Error::SubKeyType`] if `T` is not the type the
    /// sub-key's accessor yields.
    ///
    /// [`Error::UnknownSubKeyName`]: enum.Error.html#variant.UnknownSubKeyName
    /// [`Error::SubKeyType`]: enum.Error.html#variant.SubKeyType
    pub fn get_values_by<T>(&self, name: &str, value: &T) -> Result<Vec<V>>
    where
        T: Hash + Eq + Send + Sync + 'static,
        V: Clone,
    {
        let position = self.schema.position_of_name(name)?;
        let value: &dyn SubKeyValue = value;

        if !self.schema.sub_keys()[position].accepts(value) {
            return Err(Error::SubKeyType {
                name: name.to_string(),
            });
        }

        let hash = schema::hash(&self.build_hasher, value);

        let _gate = self.read_gate();
        let guard = &crossbeam_epoch::pin();
        let buckets = self.bucket_array(guard);

        Ok(buckets
            .select_indices(position, hash)
            .flat_map(|index| buckets.chain(guard, index))
            .filter(|node| self.schema.value_matches(position, &node.key, value))
            .map(|node| node.value.clone())
            .collect())
    }

    /// Returns the value of every entry whose `"Id"` sub-key is `id`.
    pub fn get_values_by_id(&self, id: i32) -> Result<Vec<V>>
    where
        V: Clone,
    {
        self.get_values_by("Id", &id)
    }

    /// Returns the value of every entry whose `"Name"` sub-key is `name`.
    ///
    /// The sub-key must be declared as a `String`.
    pub fn get_values_by_name(&self, name: &str) -> Result<Vec<V>>
    where
        V: Clone,
    {
        self.get_values_by("Name", &name.to_string())
    }

    /// Returns a copy of every key stored in the table, in bucket order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let _gate = self.read_gate();
        let guard = &crossbeam_epoch::pin();
        let buckets = self.bucket_array(guard);

        (0..buckets.capacity())
            .flat_map(|index| buckets.chain(guard, index))
            .map(|node| node.key.clone())
            .collect()
    }

    /// Returns an iterator over copies of every value, in bucket order, then
    /// chain order.
    ///
    /// The iterator keeps the current thread pinned until it is dropped, so
    /// memory retired meanwhile is not reclaimed. Entries inserted or removed
    /// during iteration may or may not be observed.
    ///
    /// With [`Synchronization::Global`] the iterator holds the table's read
    /// lock, so writing to the table from the iterating thread deadlocks.
    ///
    /// [`Synchronization::Global`]: enum.Synchronization.html#variant.Global
    pub fn iter(&self) -> Iter<'_, K, V> {
        let gate = self.read_gate();
        let guard = crossbeam_epoch::pin();
        let buckets = self.buckets.load_consume(&guard).as_raw();

        Iter {
            _gate: gate,
            guard,
            buckets,
            index: 0,
            current: ptr::null(),
            _marker: PhantomData,
        }
    }

    /// Discards every entry and every registered key, and starts over with
    /// `range_per_key.pow(key_size)` empty buckets.
    ///
    /// Fails with [`Error::InvalidConfiguration`], leaving the table
    /// untouched, if `range_per_key` is zero or the buckets cannot be
    /// allocated.
    ///
    /// [`Error::InvalidConfiguration`]: enum.Error.html#variant.InvalidConfiguration
    pub fn clear(&self, range_per_key: usize) -> Result<()> {
        let next_array = BucketArray::with_range(range_per_key, self.schema.key_size())?;

        let _gate = self.write_gate();
        let _expansion = self.expansion.lock();
        let guard = &crossbeam_epoch::pin();

        // writers that load the new array push after the registry is emptied
        let previous_ptr = self.buckets.load(Ordering::Acquire, guard);
        unsafe { previous_ptr.deref() }.seal_all();
        self.registry.clear();

        self.buckets.store(Owned::new(next_array), Ordering::Release);
        self.growth_exhausted.store(false, Ordering::Relaxed);

        unsafe { guard.defer_destroy(previous_ptr) };

        debug!("cleared table, range per key is now {}", range_per_key);

        Ok(())
    }
}

impl<K: Clone, V: Clone, S: BuildHasher> MultiKeyMap<K, V, S> {
    /// Inserts a key-value pair, returning a copy of the value it replaced.
    ///
    /// If an entry with an equal key exists, its value is overwritten and
    /// the key already stored is kept. If every bucket is occupied, the table
    /// is expanded first.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.insert_and(key, value, V::clone)
    }

    /// Inserts a key-value pair, invoking `with_previous_value` with the
    /// value it replaced.
    pub fn insert_and<F: FnOnce(&V) -> T, T>(
        &self,
        key: K,
        value: V,
        with_previous_value: F,
    ) -> Option<T> {
        let hashes = self.schema.hashes(&self.build_hasher, &key);

        let _gate = self.write_gate();
        let guard = &crossbeam_epoch::pin();

        let buckets = self.writable_bucket_array(guard);
        let previous_ptr = self.insert_node(guard, buckets, Node::new(key, value, hashes));

        unsafe { previous_ptr.as_ref() }.map(|previous| with_previous_value(&previous.value))
    }

    fn insert_node<'g>(
        &self,
        guard: &'g Guard,
        mut buckets: &'g BucketArray<K, V>,
        mut node: Owned<Node<K, V>>,
    ) -> Shared<'g, Node<K, V>> {
        loop {
            let inserted = buckets.insert(
                guard,
                &self.schema,
                node,
                self.respects_seal(),
                Some(&self.registry),
            );

            match inserted {
                Ok(previous_ptr) => return previous_ptr,
                Err(returned) => {
                    node = returned;
                    self.wait_for_expansion();
                    buckets = self.writable_bucket_array(guard);
                }
            }
        }
    }

    fn writable_bucket_array<'g>(&self, guard: &'g Guard) -> &'g BucketArray<K, V> {
        let current_ptr = self.buckets.load_consume(guard);
        let current = unsafe { current_ptr.deref() };

        if current.is_full() && !self.growth_exhausted.load(Ordering::Relaxed) {
            self.expand(guard, current_ptr)
        } else {
            current
        }
    }

    /// Replaces the full array `full_ptr` with one of twice the range per
    /// key, unless another thread already did.
    fn expand<'g>(
        &self,
        guard: &'g Guard,
        full_ptr: Shared<'g, BucketArray<K, V>>,
    ) -> &'g BucketArray<K, V> {
        let _expansion = self.expansion.lock();

        let current_ptr = self.buckets.load(Ordering::Acquire, guard);

        if current_ptr != full_ptr {
            return unsafe { current_ptr.deref() };
        }

        let full = unsafe { full_ptr.deref() };

        match full.rehash(guard, &self.schema) {
            Some(next_array) => {
                debug!(
                    "expanded bucket array from range {} to {} ({} entries, {} buckets)",
                    full.range_per_key(),
                    next_array.range_per_key(),
                    next_array.len(),
                    next_array.capacity()
                );

                let next_ptr = Owned::new(next_array).into_shared(guard);
                self.buckets.store(next_ptr, Ordering::Release);

                unsafe { guard.defer_destroy(full_ptr) };

                unsafe { next_ptr.deref() }
            }
            None => {
                if !self.growth_exhausted.swap(true, Ordering::Relaxed) {
                    warn!(
                        "bucket array cannot grow past range {}, chaining instead",
                        full.range_per_key()
                    );
                }

                full
            }
        }
    }
}

impl<K, V, S> MultiKeyMap<K, V, S> {
    fn bucket_array<'g>(&self, guard: &'g Guard) -> &'g BucketArray<K, V> {
        let buckets_ptr = self.buckets.load_consume(guard);
        debug_assert!(!buckets_ptr.is_null());

        unsafe { buckets_ptr.deref() }
    }

    fn with_bucket_array<F: FnOnce(&BucketArray<K, V>) -> T, T>(&self, f: F) -> T {
        let _gate = self.read_gate();
        let guard = &crossbeam_epoch::pin();

        f(self.bucket_array(guard))
    }

    fn values_excluding(&self, key: &K, excluded: usize) -> Vec<V>
    where
        V: Clone,
        S: BuildHasher,
    {
        let hashes = self.schema.hashes(&self.build_hasher, key);

        let _gate = self.read_gate();
        let guard = &crossbeam_epoch::pin();
        let buckets = self.bucket_array(guard);

        buckets
            .slice_indices(&hashes, excluded)
            .flat_map(|index| buckets.chain(guard, index))
            .filter(|node| self.schema.keys_equal_except(&node.key, key, excluded))
            .map(|node| node.value.clone())
            .collect()
    }

    fn respects_seal(&self) -> bool {
        self.synchronization != Synchronization::PerBucket
    }

    fn wait_for_expansion(&self) {
        mem::drop(self.expansion.lock());
    }

    fn read_gate(&self) -> Option<RwLockReadGuard<'_, ()>> {
        (self.synchronization == Synchronization::Global).then(|| self.gate.read())
    }

    fn write_gate(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        (self.synchronization == Synchronization::Global).then(|| self.gate.write())
    }
}

impl<K, V, S> Drop for MultiKeyMap<K, V, S> {
    fn drop(&mut self) {
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let buckets_ptr = self.buckets.swap(Shared::null(), Ordering::Acquire, guard);

        if !buckets_ptr.is_null() {
            mem::drop(unsafe { buckets_ptr.into_owned() });
        }
    }
}

impl<'a, K, V: Clone, S: BuildHasher> IntoIterator for &'a MultiKeyMap<K, V, S> {
    type Item = V;
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over copies of the values of a [`MultiKeyMap`]. Created by
/// [`MultiKeyMap::iter`].
///
/// [`MultiKeyMap`]: struct.MultiKeyMap.html
/// [`MultiKeyMap::iter`]: struct.MultiKeyMap.html#method.iter
pub struct Iter<'a, K, V> {
    _gate: Option<RwLockReadGuard<'a, ()>>,
    guard: Guard,
    buckets: *const BucketArray<K, V>,
    index: usize,
    current: *const Node<K, V>,
    _marker: PhantomData<&'a BucketArray<K, V>>,
}

impl<'a, K, V: Clone> Iterator for Iter<'a, K, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        // `guard` has been pinned since `buckets` was loaded
        let buckets = unsafe { &*self.buckets };

        loop {
            if let Some(current) = unsafe { self.current.as_ref() } {
                self.current = current.next.load_consume(&self.guard).as_raw();

                return Some(current.value.clone());
            }

            if self.index >= buckets.capacity() {
                return None;
            }

            self.current = buckets
                .chain(&self.guard, self.index)
                .next()
                .map_or(ptr::null(), |head| head as *const _);
            self.index += 1;
        }
    }
}

fn default_range_per_key() -> usize {
    const DEFAULT_RANGE_PER_KEY: usize = 32;
    static STORAGE: AtomicUsize = AtomicUsize::new(0);

    let mut storage = STORAGE.load(Ordering::Relaxed);

    if storage == 0 {
        storage = env::var("MULTIKEY_RANGE_PER_KEY")
            .ok()
            .as_deref()
            .and_then(|s| s.parse().ok())
            .filter(|&range| range > 0)
            .unwrap_or(DEFAULT_RANGE_PER_KEY);

        STORAGE
            .compare_exchange_weak(0, storage, Ordering::Relaxed, Ordering::Relaxed)
            .ok();
    }

    storage
}
