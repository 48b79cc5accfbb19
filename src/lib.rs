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

//! Concurrent hash tables addressed by composite keys.
//!
//! A [`MultiKeyMap`] stores values under keys made of several named, ordered
//! sub-keys, described by a [`KeySchema`]. Besides exact lookups, it answers
//! slice queries that fix every sub-key but one:
//!
//! ```
//! use multikey::{KeySchema, MultiKeyMap};
//!
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Person {
//!     id: i32,
//!     name: String,
//! }
//!
//! let schema = KeySchema::builder()
//!     .sub_key(1, "Id", |p: &Person| &p.id)
//!     .sub_key(2, "Name", |p: &Person| &p.name)
//!     .build()
//!     .unwrap();
//!
//! let map = MultiKeyMap::with_range(Arc::new(schema), 10).unwrap();
//! let person = |id, name: &str| Person { id, name: name.to_string() };
//!
//! map.insert(person(1, "Kali Byrd"), 42);
//! map.insert(person(1, "Drew Hopkins"), 75);
//! map.insert(person(2, "Drew Hopkins"), 11);
//!
//! assert_eq!(map.get(&person(1, "Kali Byrd")), Some(42));
//!
//! let mut by_id = map.get_values_by_id(1).unwrap();
//! by_id.sort();
//! assert_eq!(by_id, vec![42, 75]);
//!
//! let mut same_name = map.get_values_excluding(&person(0, "Drew Hopkins"), "Id").unwrap();
//! same_name.sort();
//! assert_eq!(same_name, vec![11, 75]);
//! ```

pub mod error;
pub mod map;
pub mod schema;

pub use error::{Error, Result};
pub use map::{DefaultHashBuilder, Iter, MultiKeyMap, Options, Synchronization};
pub use schema::{KeySchema, KeySchemaBuilder, SubKey};

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    #[derive(Clone, Debug)]
    struct Cell {
        row: i32,
        column: i32,
    }

    fn cell(row: i32, column: i32) -> Cell {
        Cell { row, column }
    }

    fn schema() -> Arc<KeySchema<Cell>> {
        let schema = KeySchema::builder()
            .sub_key(1, "Row", |c: &Cell| &c.row)
            .sub_key(2, "Column", |c: &Cell| &c.column)
            .build()
            .unwrap();

        Arc::new(schema)
    }

    fn map_with(range_per_key: usize, synchronization: Synchronization) -> MultiKeyMap<Cell, i32> {
        MultiKeyMap::with_options(
            schema(),
            Options {
                range_per_key,
                synchronization,
            },
        )
        .unwrap()
    }

    #[test]
    fn multi_key_map_basics() {
        let map = MultiKeyMap::with_range(schema(), 4).unwrap();

        assert_eq!(map.insert(cell(0, 0), 5), None);
        assert_eq!(map.insert(cell(0, 1), 10), None);
        assert_eq!(map.insert(cell(1, 0), 15), None);
        assert_eq!(map.insert(cell(1, 1), 20), None);

        assert_eq!(map.get(&cell(0, 0)), Some(5));
        assert_eq!(map.get(&cell(0, 1)), Some(10));
        assert_eq!(map.get(&cell(1, 0)), Some(15));
        assert_eq!(map.get(&cell(1, 1)), Some(20));

        assert_eq!(map.insert(cell(1, 1), 5), Some(20));
        assert_eq!(map.insert(cell(1, 0), 10), Some(15));
        assert_eq!(map.insert(cell(0, 1), 15), Some(10));
        assert_eq!(map.insert(cell(0, 0), 20), Some(5));

        assert_eq!(map.len(), 4);
    }

    #[test]
    fn multi_key_map_growth() {
        const MAX_VALUE: i32 = 32;

        let map = MultiKeyMap::with_range(schema(), 2).unwrap();

        for i in 0..MAX_VALUE {
            for j in 0..MAX_VALUE {
                assert_eq!(map.insert(cell(i, j), i * MAX_VALUE + j), None);
            }
        }

        assert!(map.range_per_key() > 2);
        assert_eq!(map.len(), (MAX_VALUE * MAX_VALUE) as usize);

        for i in 0..MAX_VALUE {
            for j in 0..MAX_VALUE {
                assert_eq!(map.get(&cell(i, j)), Some(i * MAX_VALUE + j));
                assert_eq!(map.insert(cell(i, j), 0), Some(i * MAX_VALUE + j));
            }
        }
    }

    #[test]
    fn multi_key_map_concurrent_insertion() {
        const MAX_VALUE: i32 = 256;
        const NUM_THREADS: usize = 8;
        const MAX_INSERTED_VALUE: i32 = (NUM_THREADS as i32) * MAX_VALUE;

        // far more buckets than entries, so the table never fills up
        let map = Arc::new(map_with(256, Synchronization::PerBucket));
        let barrier = Arc::new(Barrier::new(NUM_THREADS));

        let threads: Vec<_> = (0..NUM_THREADS)
            .map(|i| {
                let map = map.clone();
                let barrier = barrier.clone();

                thread::spawn(move || {
                    barrier.wait();

                    for j in (0..MAX_VALUE).map(|j| j + (i as i32 * MAX_VALUE)) {
                        assert_eq!(map.insert(cell(j, -j), j), None);
                    }
                })
            })
            .collect();

        for result in threads.into_iter().map(|t| t.join()) {
            assert!(result.is_ok());
        }

        assert_eq!(map.range_per_key(), 256);
        assert_eq!(map.len(), MAX_INSERTED_VALUE as usize);

        for i in 0..MAX_INSERTED_VALUE {
            assert_eq!(map.get(&cell(i, -i)), Some(i));
        }
    }

    #[test]
    fn multi_key_map_concurrent_growth() {
        const MAX_VALUE: i32 = 256;
        const NUM_THREADS: usize = 8;
        const MAX_INSERTED_VALUE: i32 = (NUM_THREADS as i32) * MAX_VALUE;

        for &synchronization in &[Synchronization::CopyOnWrite, Synchronization::Global] {
            let map = Arc::new(map_with(2, synchronization));
            let barrier = Arc::new(Barrier::new(NUM_THREADS));

            let threads: Vec<_> = (0..NUM_THREADS)
                .map(|i| {
                    let map = map.clone();
                    let barrier = barrier.clone();

                    thread::spawn(move || {
                        barrier.wait();

                        for j in (0..MAX_VALUE).map(|j| j + (i as i32 * MAX_VALUE)) {
                            assert_eq!(map.insert(cell(j, j % 7), j), None);
                        }
                    })
                })
                .collect();

            for result in threads.into_iter().map(|t| t.join()) {
                assert!(result.is_ok());
            }

            assert!(map.range_per_key() > 2);
            assert_eq!(map.len(), MAX_INSERTED_VALUE as usize);

            for i in 0..MAX_INSERTED_VALUE {
                assert_eq!(map.get(&cell(i, i % 7)), Some(i));
            }
        }
    }

    #[test]
    fn multi_key_map_removal() {
        const MAX_VALUE: i32 = 512;

        let map = MultiKeyMap::with_range(schema(), 8).unwrap();

        for i in 0..MAX_VALUE {
            assert_eq!(map.insert(cell(i, i / 2), i), None);
        }

        for i in 0..MAX_VALUE {
            assert_eq!(map.remove(&cell(i, i / 2)), Some(i));
        }

        for i in 0..MAX_VALUE {
            assert_eq!(map.get(&cell(i, i / 2)), None);
            assert!(!map.contains_key(&cell(i, i / 2)));
        }

        assert!(map.is_empty());
        assert_eq!(map.non_empty_nodes(), 0);
    }

    #[test]
    fn multi_key_map_concurrent_removal() {
        const MAX_VALUE: i32 = 256;
        const NUM_THREADS: usize = 8;
        const MAX_INSERTED_VALUE: i32 = (NUM_THREADS as i32) * MAX_VALUE;

        let map = Arc::new(map_with(256, Synchronization::PerBucket));

        for i in 0..MAX_INSERTED_VALUE {
            assert_eq!(map.insert(cell(i, 1), i), None);
        }

        let barrier = Arc::new(Barrier::new(NUM_THREADS));

        let threads: Vec<_> = (0..NUM_THREADS)
            .map(|i| {
                let map = map.clone();
                let barrier = barrier.clone();

                thread::spawn(move || {
                    barrier.wait();

                    for j in (0..MAX_VALUE).map(|j| j + (i as i32 * MAX_VALUE)) {
                        assert_eq!(map.remove(&cell(j, 1)), Some(j));
                    }
                })
            })
            .collect();

        for result in threads.into_iter().map(|t| t.join()) {
            assert!(result.is_ok());
        }

        assert_eq!(map.len(), 0);

        for i in 0..MAX_INSERTED_VALUE {
            assert_eq!(map.get(&cell(i, 1)), None);
        }
    }
}
