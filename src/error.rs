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

//! Errors reported by schema construction and table operations.

use thiserror::Error;

/// Errors returned by [`KeySchema`] construction and [`MultiKeyMap`]
/// operations.
///
/// Every error aborts only the call that produced it. The table is left in the
/// state it was in before the call and remains usable.
///
/// A missing key is never an error: lookups return [`None`] and slice queries
/// return an empty [`Vec`].
///
/// [`KeySchema`]: crate::KeySchema
/// [`MultiKeyMap`]: crate::MultiKeyMap
/// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
/// [`Vec`]: https://doc.rust-lang.org/std/vec/struct.Vec.html
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A schema or table was configured with values it cannot be built from,
    /// such as a schema without sub-keys or a range of zero.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No sub-key with this name is declared in the schema.
    #[error("no sub-key named {0:?} in key schema")]
    UnknownSubKeyName(String),

    /// No sub-key with this declared order is present in the schema.
    #[error("no sub-key with order {0} in key schema")]
    UnknownSubKeyOrder(u32),

    /// A sub-key value was supplied with a type other than the one the
    /// schema's accessor yields.
    #[error("value supplied for sub-key {name:?} does not match its declared type")]
    SubKeyType {
        /// Name of the sub-key the value was supplied for.
        name: String,
    },
}

/// Shorthand for results whose error type is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_configuration(reason: impl Into<String>) -> Self {
        Error::InvalidConfiguration(reason.into())
    }
}
