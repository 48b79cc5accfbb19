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

//! Composite key schemas.
//!
//! A [`KeySchema`] describes how a composite key type splits into sub-keys.
//! Each sub-key has a declared order, a name, and an accessor that borrows the
//! sub-key's value out of a key. Sub-keys are kept sorted by their declared
//! order; that order fixes the dimension each sub-key occupies in a
//! [`MultiKeyMap`]'s bucket array.
//!
//! Schemas are immutable once built and are shared between tables through an
//! [`Arc`].
//!
//! [`MultiKeyMap`]: crate::MultiKeyMap
//! [`Arc`]: https://doc.rust-lang.org/std/sync/struct.Arc.html

use crate::error::{Error, Result};

use std::{
    any::{Any, TypeId},
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    marker::PhantomData,
};

/// Describes the ordered sub-keys of the composite key type `K`.
///
/// Two keys are equal under a schema iff every sub-key value compares equal.
/// Fields of `K` that are not declared as sub-keys never take part in
/// hashing or equality.
///
/// ```
/// use multikey::KeySchema;
///
/// struct Person {
///     id: i32,
///     name: String,
///     age: u32,
/// }
///
/// let schema = KeySchema::builder()
///     .sub_key(1, "Id", |p: &Person| &p.id)
///     .sub_key(2, "Name", |p: &Person| &p.name)
///     .build()
///     .unwrap();
///
/// let a = Person { id: 1, name: "Kali Byrd".to_string(), age: 30 };
/// let b = Person { id: 1, name: "Kali Byrd".to_string(), age: 41 };
///
/// assert_eq!(schema.key_size(), 2);
/// assert!(schema.keys_equal(&a, &b));
/// ```
pub struct KeySchema<K> {
    sub_keys: Box<[SubKey<K>]>,
}

/// One named, ordered component of a composite key.
pub struct SubKey<K> {
    order: u32,
    name: String,
    value_type: TypeId,
    accessor: Box<dyn Accessor<K>>,
}

/// Builder for [`KeySchema`]. Created by [`KeySchema::builder`].
///
/// [`KeySchema`]: struct.KeySchema.html
/// [`KeySchema::builder`]: struct.KeySchema.html#method.builder
pub struct KeySchemaBuilder<K> {
    sub_keys: Vec<SubKey<K>>,
}

impl<K> KeySchema<K> {
    /// Returns a builder with no sub-keys declared.
    pub fn builder() -> KeySchemaBuilder<K> {
        KeySchemaBuilder {
            sub_keys: Vec::new(),
        }
    }

    /// Returns the number of sub-keys in this schema.
    ///
    /// This is also the number of dimensions of any table built against it.
    pub fn key_size(&self) -> usize {
        self.sub_keys.len()
    }

    /// Returns the sub-keys sorted by declared order.
    pub fn sub_keys(&self) -> &[SubKey<K>] {
        &self.sub_keys
    }

    /// Returns the schema position of the sub-key called `name`.
    pub fn position_of_name(&self, name: &str) -> Result<usize> {
        self.sub_keys
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| Error::UnknownSubKeyName(name.to_string()))
    }

    /// Returns the schema position of the sub-key declared with `order`.
    pub fn position_of_order(&self, order: u32) -> Result<usize> {
        self.sub_keys
            .iter()
            .position(|s| s.order == order)
            .ok_or(Error::UnknownSubKeyOrder(order))
    }

    /// Returns true if every sub-key of `a` equals the matching sub-key of `b`.
    pub fn keys_equal(&self, a: &K, b: &K) -> bool {
        self.sub_keys
            .iter()
            .all(|s| s.value(a).dyn_eq(s.value(b)))
    }

    /// Returns true if `a` and `b` agree on every sub-key except the one at
    /// schema position `excluded`.
    ///
    /// A position past the end of the schema excludes nothing.
    pub fn keys_equal_except(&self, a: &K, b: &K, excluded: usize) -> bool {
        self.sub_keys
            .iter()
            .enumerate()
            .all(|(i, s)| i == excluded || s.value(a).dyn_eq(s.value(b)))
    }

    pub(crate) fn hashes<S: BuildHasher>(&self, build_hasher: &S, key: &K) -> Box<[u64]> {
        self.sub_keys
            .iter()
            .map(|s| hash(build_hasher, s.value(key)))
            .collect()
    }

    pub(crate) fn value_matches(
        &self,
        position: usize,
        key: &K,
        value: &dyn SubKeyValue,
    ) -> bool {
        self.sub_keys[position].value(key).dyn_eq(value)
    }
}

impl<K> fmt::Debug for KeySchema<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.sub_keys.iter()).finish()
    }
}

impl<K> SubKey<K> {
    /// Returns the order this sub-key was declared with.
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Returns the name this sub-key was declared with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn value<'k>(&self, key: &'k K) -> &'k dyn SubKeyValue {
        self.accessor.value(key)
    }

    /// Returns true if `value` has the type this sub-key's accessor yields.
    pub(crate) fn accepts(&self, value: &dyn SubKeyValue) -> bool {
        value.as_any().type_id() == self.value_type
    }
}

impl<K> fmt::Debug for SubKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubKey")
            .field("order", &self.order)
            .field("name", &self.name)
            .finish()
    }
}

impl<K: 'static> KeySchemaBuilder<K> {
    /// Declares a sub-key.
    ///
    /// `accessor` borrows the sub-key's value out of a key. The value type
    /// must implement [`Hash`] and [`Eq`]; these are what the table hashes
    /// and compares.
    ///
    /// Orders need not be contiguous, but must be unique. Sub-keys may be
    /// declared in any order.
    ///
    /// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
    /// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
    pub fn sub_key<T, F>(mut self, order: u32, name: impl Into<String>, accessor: F) -> Self
    where
        T: Hash + Eq + Send + Sync + 'static,
        F: Fn(&K) -> &T + Send + Sync + 'static,
    {
        self.sub_keys.push(SubKey {
            order,
            name: name.into(),
            value_type: TypeId::of::<T>(),
            accessor: Box::new(FieldAccessor {
                accessor,
                _marker: PhantomData,
            }),
        });

        self
    }

    /// Sorts the declared sub-keys by order and builds the schema.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if no sub-keys were
    /// declared, or if an order or a name was declared more than once.
    ///
    /// [`Error::InvalidConfiguration`]: enum.Error.html#variant.InvalidConfiguration
    pub fn build(self) -> Result<KeySchema<K>> {
        let mut sub_keys = self.sub_keys;

        if sub_keys.is_empty() {
            return Err(Error::invalid_configuration(
                "key schema declares no sub-keys",
            ));
        }

        sub_keys.sort_by_key(|s| s.order);

        if let Some(pair) = sub_keys.windows(2).find(|w| w[0].order == w[1].order) {
            return Err(Error::invalid_configuration(format!(
                "sub-key order {} is declared more than once",
                pair[0].order
            )));
        }

        for (i, this_sub_key) in sub_keys.iter().enumerate() {
            if sub_keys[..i].iter().any(|s| s.name == this_sub_key.name) {
                return Err(Error::invalid_configuration(format!(
                    "sub-key name {:?} is declared more than once",
                    this_sub_key.name
                )));
            }
        }

        Ok(KeySchema {
            sub_keys: sub_keys.into_boxed_slice(),
        })
    }
}

pub(crate) fn hash<S: BuildHasher>(build_hasher: &S, value: &dyn SubKeyValue) -> u64 {
    let mut hasher = build_hasher.build_hasher();
    value.hash_into(&mut hasher);

    hasher.finish()
}

/// Type-erased view of a sub-key value.
pub(crate) trait SubKeyValue: Any + Send + Sync {
    fn hash_into(&self, state: &mut dyn Hasher);

    fn dyn_eq(&self, other: &dyn SubKeyValue) -> bool;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Hash + Eq + Send + Sync + 'static> SubKeyValue for T {
    fn hash_into(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }

    fn dyn_eq(&self, other: &dyn SubKeyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

trait Accessor<K>: Send + Sync {
    fn value<'k>(&self, key: &'k K) -> &'k dyn SubKeyValue;
}

struct FieldAccessor<F, T> {
    accessor: F,
    _marker: PhantomData<fn() -> T>,
}

impl<K, T, F> Accessor<K> for FieldAccessor<F, T>
where
    T: SubKeyValue,
    F: Fn(&K) -> &T + Send + Sync,
{
    fn value<'k>(&self, key: &'k K) -> &'k dyn SubKeyValue {
        (self.accessor)(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ahash::RandomState;

    struct Person {
        id: i32,
        name: String,
        age: u32,
    }

    fn person(id: i32, name: &str, age: u32) -> Person {
        Person {
            id,
            name: name.to_string(),
            age,
        }
    }

    fn schema() -> KeySchema<Person> {
        KeySchema::builder()
            .sub_key(2, "Name", |p: &Person| &p.name)
            .sub_key(1, "Id", |p: &Person| &p.id)
            .build()
            .unwrap()
    }

    #[test]
    fn sub_keys_sorted_by_order() {
        let schema = schema();

        assert_eq!(schema.key_size(), 2);
        assert_eq!(schema.sub_keys()[0].name(), "Id");
        assert_eq!(schema.sub_keys()[0].order(), 1);
        assert_eq!(schema.sub_keys()[1].name(), "Name");
        assert_eq!(schema.sub_keys()[1].order(), 2);
    }

    #[test]
    fn orders_need_not_be_contiguous() {
        let schema = KeySchema::builder()
            .sub_key(10, "Name", |p: &Person| &p.name)
            .sub_key(0, "Id", |p: &Person| &p.id)
            .build()
            .unwrap();

        assert_eq!(schema.position_of_order(0), Ok(0));
        assert_eq!(schema.position_of_order(10), Ok(1));
        assert_eq!(
            schema.position_of_order(5),
            Err(Error::UnknownSubKeyOrder(5))
        );
    }

    #[test]
    fn empty_schema() {
        assert!(matches!(
            KeySchema::<Person>::builder().build(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn duplicate_order() {
        let result = KeySchema::builder()
            .sub_key(1, "Id", |p: &Person| &p.id)
            .sub_key(1, "Name", |p: &Person| &p.name)
            .build();

        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn duplicate_name() {
        let result = KeySchema::builder()
            .sub_key(1, "Id", |p: &Person| &p.id)
            .sub_key(2, "Id", |p: &Person| &p.name)
            .build();

        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn position_of_name() {
        let schema = schema();

        assert_eq!(schema.position_of_name("Id"), Ok(0));
        assert_eq!(schema.position_of_name("Name"), Ok(1));
        assert_eq!(
            schema.position_of_name("Age"),
            Err(Error::UnknownSubKeyName("Age".to_string()))
        );
    }

    #[test]
    fn equality_ignores_undeclared_fields() {
        let schema = schema();

        let a = person(1, "Kali Byrd", 30);
        let b = person(1, "Kali Byrd", 99);
        let c = person(1, "Drew Hopkins", 30);
        let d = person(2, "Kali Byrd", 30);

        assert_ne!(a.age, b.age);
        assert!(schema.keys_equal(&a, &b));
        assert!(!schema.keys_equal(&a, &c));
        assert!(!schema.keys_equal(&a, &d));
    }

    #[test]
    fn equality_except_one_sub_key() {
        let schema = schema();

        let a = person(1, "Kali Byrd", 0);
        let b = person(1, "Drew Hopkins", 0);
        let c = person(2, "Kali Byrd", 0);

        assert!(schema.keys_equal_except(&a, &b, 1));
        assert!(!schema.keys_equal_except(&a, &b, 0));
        assert!(schema.keys_equal_except(&a, &c, 0));
        assert!(!schema.keys_equal_except(&a, &c, 1));
        assert!(!schema.keys_equal_except(&a, &b, 2));
    }

    #[test]
    fn hashes_follow_schema_order() {
        let schema = schema();
        let build_hasher = RandomState::new();

        let a = person(7, "Nelson Eaton", 1);
        let b = person(7, "Nelson Eaton", 2);
        let hashes = schema.hashes(&build_hasher, &a);

        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0], hash(&build_hasher, &7i32));
        assert_eq!(hashes[1], hash(&build_hasher, &"Nelson Eaton".to_string()));
        assert_eq!(hashes, schema.hashes(&build_hasher, &b));
    }

    #[test]
    fn value_matches_checks_type() {
        let schema = schema();
        let a = person(3, "Kirsten Watt", 0);

        assert!(schema.value_matches(0, &a, &3i32));
        assert!(!schema.value_matches(0, &a, &4i32));
        assert!(!schema.value_matches(0, &a, &3i64));
        assert!(schema.value_matches(1, &a, &"Kirsten Watt".to_string()));
    }

    #[test]
    fn sub_key_accepts_declared_type() {
        let schema = schema();
        let id = &schema.sub_keys()[0];
        let name = &schema.sub_keys()[1];

        assert!(id.accepts(&5i32));
        assert!(!id.accepts(&5u32));
        assert!(name.accepts(&"Kali Byrd".to_string()));
        assert!(!name.accepts(&"Kali Byrd"));
    }
}
