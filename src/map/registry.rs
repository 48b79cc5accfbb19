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

use crate::schema::KeySchema;

use parking_lot::Mutex;

/// Ordered multiset of the keys inserted into a table.
///
/// Keys are pushed on every insert without deduplication. Removal purges every
/// entry equal to the removed key.
pub(crate) struct KeyRegistry<K> {
    keys: Mutex<Vec<K>>,
}

impl<K> KeyRegistry<K> {
    pub(crate) fn new() -> Self {
        Self {
            keys: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, key: K) {
        self.keys.lock().push(key);
    }

    /// Removes every entry equal to `key` under `schema`, returning how many
    /// were removed.
    pub(crate) fn remove_all(&self, schema: &KeySchema<K>, key: &K) -> usize {
        let mut keys = self.keys.lock();
        let before = keys.len();
        keys.retain(|k| !schema.keys_equal(k, key));

        before - keys.len()
    }

    pub(crate) fn contains(&self, schema: &KeySchema<K>, key: &K) -> bool {
        self.keys.lock().iter().any(|k| schema.keys_equal(k, key))
    }

    pub(crate) fn clear(&self) {
        self.keys.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.keys.lock().len()
    }
}
