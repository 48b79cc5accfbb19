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

use super::registry::KeyRegistry;
use crate::{
    error::{Error, Result},
    schema::KeySchema,
};

use std::{
    mem, ptr,
    sync::atomic::{self, AtomicUsize, Ordering},
};

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use log::trace;
use parking_lot::Mutex;

pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hashes: Box<[u64]>,
    pub(crate) next: Atomic<Node<K, V>>,
}

impl<K, V> Node<K, V> {
    pub(crate) fn new(key: K, value: V, hashes: Box<[u64]>) -> Owned<Node<K, V>> {
        Owned::new(Node {
            key,
            value,
            hashes,
            next: Atomic::null(),
        })
    }
}

// writers hold `sealed` for the duration of a chain mutation; readers never
// take it
struct Bucket<K, V> {
    sealed: Mutex<bool>,
    head: Atomic<Node<K, V>>,
}

/// Returned by a write that found its bucket sealed by an expansion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct RelocatedError;

pub(crate) struct BucketArray<K, V> {
    buckets: Box<[Bucket<K, V>]>,
    range_per_key: usize,
    key_size: usize,
    len: AtomicUsize,
    non_empty: AtomicUsize,
}

impl<K, V> BucketArray<K, V> {
    pub(crate) fn with_range(range_per_key: usize, key_size: usize) -> Result<Self> {
        if range_per_key == 0 {
            return Err(Error::invalid_configuration(
                "range per key must be greater than zero",
            ));
        }

        let capacity = u32::try_from(key_size)
            .ok()
            .and_then(|exponent| range_per_key.checked_pow(exponent))
            .filter(|&capacity| {
                capacity
                    .checked_mul(mem::size_of::<Bucket<K, V>>())
                    .map_or(false, |bytes| bytes <= isize::MAX as usize)
            })
            .ok_or_else(|| {
                Error::invalid_configuration(format!(
                    "{}^{} buckets overflow the address space",
                    range_per_key, key_size
                ))
            })?;

        let mut buckets = Vec::new();
        buckets.try_reserve_exact(capacity).map_err(|e| {
            Error::invalid_configuration(format!("cannot allocate {} buckets: {}", capacity, e))
        })?;
        buckets.extend((0..capacity).map(|_| Bucket {
            sealed: Mutex::new(false),
            head: Atomic::null(),
        }));

        Ok(BucketArray {
            buckets: buckets.into_boxed_slice(),
            range_per_key,
            key_size,
            len: AtomicUsize::new(0),
            non_empty: AtomicUsize::new(0),
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn range_per_key(&self) -> usize {
        self.range_per_key
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub(crate) fn non_empty_nodes(&self) -> usize {
        self.non_empty.load(Ordering::Relaxed)
    }

    pub(crate) fn is_full(&self) -> bool {
        self.non_empty_nodes() == self.capacity()
    }

    /// Folds per-dimension digits `hash mod range` into one mixed-radix
    /// index, most significant dimension first.
    pub(crate) fn index(&self, hashes: &[u64]) -> usize {
        debug_assert_eq!(hashes.len(), self.key_size);

        hashes
            .iter()
            .fold(0, |index, &hash| index * self.range_per_key + self.digit(hash))
    }

    /// Indices of every bucket that agrees with `hashes` on all dimensions
    /// except `excluded`, in ascending order.
    pub(crate) fn slice_indices(
        &self,
        hashes: &[u64],
        excluded: usize,
    ) -> impl Iterator<Item = usize> {
        debug_assert!(excluded < self.key_size);

        let range = self.range_per_key;
        let stride = self.stride(excluded);
        let offset = hashes
            .iter()
            .enumerate()
            .fold(0, |index, (i, &hash)| {
                let digit = if i == excluded { 0 } else { self.digit(hash) };

                index * range + digit
            });

        (0..range).map(move |i| offset + i * stride)
    }

    /// Indices of every bucket whose digit in dimension `fixed` is the one
    /// `hash` selects, in ascending order.
    pub(crate) fn select_indices(&self, fixed: usize, hash: u64) -> impl Iterator<Item = usize> {
        debug_assert!(fixed < self.key_size);

        let range = self.range_per_key;
        let stride = self.stride(fixed);
        let base = self.digit(hash) * stride;
        let outer = self.capacity() / (stride * range);

        (0..outer).flat_map(move |high| {
            let start = high * stride * range + base;

            start..start + stride
        })
    }

    pub(crate) fn chain<'g>(&'g self, guard: &'g Guard, index: usize) -> Chain<'g, K, V> {
        Chain {
            current: self.buckets[index].head.load_consume(guard),
            guard,
        }
    }

    fn digit(&self, hash: u64) -> usize {
        (hash % self.range_per_key as u64) as usize
    }

    fn stride(&self, position: usize) -> usize {
        (position + 1..self.key_size).fold(1, |stride, _| stride * self.range_per_key)
    }
}

impl<'g, K, V> BucketArray<K, V> {
    pub(crate) fn get(
        &'g self,
        guard: &'g Guard,
        schema: &KeySchema<K>,
        hashes: &[u64],
        key: &K,
    ) -> Option<&'g Node<K, V>> {
        self.chain(guard, self.index(hashes))
            .find(|node| schema.keys_equal(&node.key, key))
    }

    /// Links `node` into its bucket, or replaces the node holding an equal
    /// key.
    ///
    /// A replacement keeps the key that was already stored. Returns the
    /// replaced node, or null if `node` was appended. The replaced node is
    /// destroyed once `guard` and every other pinned thread have moved on.
    ///
    /// If `respect_seal` is set and the bucket was sealed by an expansion,
    /// `node` is handed back untouched. Otherwise a copy of its key is pushed
    /// to `registry` while the bucket is still locked.
    pub(crate) fn insert(
        &self,
        guard: &'g Guard,
        schema: &KeySchema<K>,
        mut node: Owned<Node<K, V>>,
        respect_seal: bool,
        registry: Option<&KeyRegistry<K>>,
    ) -> std::result::Result<Shared<'g, Node<K, V>>, Owned<Node<K, V>>>
    where
        K: Clone,
    {
        let bucket = &self.buckets[self.index(&node.hashes)];
        let sealed = bucket.sealed.lock();

        if *sealed && respect_seal {
            return Err(node);
        }

        if let Some(registry) = registry {
            registry.push(node.key.clone());
        }

        let mut link = &bucket.head;

        loop {
            let current_ptr = link.load(Ordering::Acquire, guard);

            match unsafe { current_ptr.as_ref() } {
                None => {
                    let is_head = ptr::eq(link, &bucket.head);
                    link.store(node, Ordering::Release);

                    self.len.fetch_add(1, Ordering::Relaxed);

                    if is_head {
                        self.non_empty.fetch_add(1, Ordering::Relaxed);
                        trace!("created chain head in empty bucket");
                    }

                    return Ok(Shared::null());
                }
                Some(current) if schema.keys_equal(&current.key, &node.key) => {
                    node.key = current.key.clone();
                    node.next
                        .store(current.next.load(Ordering::Acquire, guard), Ordering::Relaxed);
                    link.store(node, Ordering::Release);

                    unsafe { guard.defer_destroy(current_ptr) };

                    return Ok(current_ptr);
                }
                Some(current) => link = &current.next,
            }
        }
    }

    /// Unlinks every node in the bucket whose key equals `key`.
    ///
    /// Returns the first node unlinked, or null if there was none. Unlinked
    /// nodes are destroyed once it is safe to do so. If anything was
    /// unlinked, `key` is purged from `registry` before the bucket is
    /// unlocked.
    pub(crate) fn remove(
        &self,
        guard: &'g Guard,
        schema: &KeySchema<K>,
        hashes: &[u64],
        key: &K,
        respect_seal: bool,
        registry: Option<&KeyRegistry<K>>,
    ) -> std::result::Result<Shared<'g, Node<K, V>>, RelocatedError> {
        let bucket = &self.buckets[self.index(hashes)];
        let sealed = bucket.sealed.lock();

        if *sealed && respect_seal {
            return Err(RelocatedError);
        }

        let mut removed_ptr = Shared::null();
        let mut link = &bucket.head;

        loop {
            let current_ptr = link.load(Ordering::Acquire, guard);

            let current = match unsafe { current_ptr.as_ref() } {
                Some(c) => c,
                None => break,
            };

            if schema.keys_equal(&current.key, key) {
                link.store(current.next.load(Ordering::Acquire, guard), Ordering::Release);
                self.len.fetch_sub(1, Ordering::Relaxed);

                unsafe { guard.defer_destroy(current_ptr) };

                if removed_ptr.is_null() {
                    removed_ptr = current_ptr;
                }
            } else {
                link = &current.next;
            }
        }

        if removed_ptr.is_null() {
            return Ok(removed_ptr);
        }

        if let Some(registry) = registry {
            registry.remove_all(schema, key);
        }

        if bucket.head.load(Ordering::Relaxed, guard).is_null() {
            self.non_empty.fetch_sub(1, Ordering::Relaxed);
            trace!("unlinked last node of bucket");
        }

        Ok(removed_ptr)
    }

    /// Seals every bucket, so that writers honoring seals stop mutating this
    /// array.
    pub(crate) fn seal_all(&self) {
        for bucket in self.buckets.iter() {
            *bucket.sealed.lock() = true;
        }
    }

    /// Builds an array with twice the range per key holding a copy of every
    /// node, sealing each bucket of this array as it is copied.
    ///
    /// Nodes are placed with their cached hashes. Returns `None`, leaving
    /// this array unsealed, if the doubled array cannot be sized.
    pub(crate) fn rehash(&'g self, guard: &'g Guard, schema: &KeySchema<K>) -> Option<Self>
    where
        K: Clone,
        V: Clone,
    {
        let next_array = self
            .range_per_key
            .checked_mul(2)
            .and_then(|range| BucketArray::with_range(range, self.key_size).ok())?;

        for bucket in self.buckets.iter() {
            let mut sealed = bucket.sealed.lock();
            *sealed = true;

            let mut current_ptr = bucket.head.load(Ordering::Acquire, guard);

            while let Some(current) = unsafe { current_ptr.as_ref() } {
                let copy = Node::new(
                    current.key.clone(),
                    current.value.clone(),
                    current.hashes.clone(),
                );

                if next_array.insert(guard, schema, copy, false, None).is_err() {
                    unreachable!("unpublished bucket array was sealed");
                }

                current_ptr = current.next.load(Ordering::Acquire, guard);
            }
        }

        Some(next_array)
    }
}

impl<K, V> Drop for BucketArray<K, V> {
    fn drop(&mut self) {
        atomic::fence(Ordering::Acquire);

        let guard = unsafe { crossbeam_epoch::unprotected() };

        for bucket in self.buckets.iter() {
            let mut current_ptr = bucket.head.swap(Shared::null(), Ordering::Relaxed, guard);

            while let Some(current) = unsafe { current_ptr.as_ref() } {
                let next_ptr = current.next.load(Ordering::Relaxed, guard);
                mem::drop(unsafe { current_ptr.into_owned() });

                current_ptr = next_ptr;
            }
        }
    }
}

/// Lock-free walk over one bucket's chain.
pub(crate) struct Chain<'g, K, V> {
    current: Shared<'g, Node<K, V>>,
    guard: &'g Guard,
}

impl<'g, K, V> Iterator for Chain<'g, K, V> {
    type Item = &'g Node<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = unsafe { self.current.as_ref() }?;
        self.current = current.next.load_consume(self.guard);

        Some(current)
    }
}
