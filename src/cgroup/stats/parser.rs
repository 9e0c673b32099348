//! Generic traits for parsing cgroup v1 pseudo-files into structured types.
//!
//! - [`KeyValueStat`]: multi-line `key value` files such as `memory.stat`.
//! - [`SingleLineStat`]: files holding one line of values, such as
//!   `memory.usage_in_bytes` or `cpuacct.usage_percpu`.
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use plugin_controller::cgroup::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct MyStat {
//!     foo: u64,
//! }
//!
//! fn set_foo(stat: &mut MyStat, foo: u64) {
//!     stat.foo = foo;
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, fn(&mut MyStat, u64)>> = LazyLock::new(|| {
//!     let mut map: HashMap<&'static str, fn(&mut MyStat, u64)> = HashMap::new();
//!     map.insert("foo", set_foo);
//!     map
//! });
//!
//! impl KeyValueStat for MyStat {
//!     const ALLOW_DUPLICATE_KEYS: bool = false;
//!
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &HANDLERS
//!     }
//! }
//!
//! let stat = MyStat::from_reader(&mut "bar 1\nfoo 42\n".as_bytes()).unwrap();
//! assert_eq!(stat.foo, 42);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// A trait for parsing `key value` formatted stat files, one pair per line.
///
/// Implementors define the set of known keys and how to store their values.
/// Unknown keys are ignored.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// If `false`, encountering the same known key more than once is an error.
    const ALLOW_DUPLICATE_KEYS: bool;

    /// Returns a map of known field names to the handlers that store their values.
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Parses a buffered reader into `Self`.
    ///
    /// Reading stops early once every known key has been seen (unless duplicates are
    /// allowed, in which case the whole input is consumed).
    ///
    /// # Errors
    ///
    /// Returns a [`StatParseError`] if reading fails, a known key carries a value that is
    /// not an unsigned integer, or a known key is duplicated.
    fn from_reader<R: BufRead>(buf: &mut R) -> Result<Self, StatParseError> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let field_count = handlers.len();
        let mut seen_keys = HashSet::with_capacity(field_count);

        let mut line = String::new();
        let mut lineno = 0;
        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                Self::parse_and_set(key, val, &mut stat, lineno, handlers, &mut seen_keys)?;
            }
            if !Self::ALLOW_DUPLICATE_KEYS && seen_keys.len() == field_count {
                break;
            }

            line.clear();
        }

        Ok(stat)
    }

    /// Parses a single key-value pair and applies it through the field handler.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::InvalidKeyValue`] if the value cannot be parsed as `u64`,
    /// or [`StatParseError::DuplicateField`] if the key repeats and duplicates are disallowed.
    fn parse_and_set(
        key: &str,
        val: &str,
        stat: &mut Self,
        lineno: usize,
        handlers: &HashMap<&'static str, fn(&mut Self, u64)>,
        seen_keys: &mut HashSet<&'static str>,
    ) -> Result<(), StatParseError> {
        let Some((k, handler)) = handlers.get_key_value(key) else {
            return Ok(());
        };
        let parsed = val
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidKeyValue {
                key: key.to_string(),
                value: val.to_string(),
                line: lineno,
                source,
            })?;
        if !seen_keys.insert(*k) && !Self::ALLOW_DUPLICATE_KEYS {
            return Err(StatParseError::DuplicateField {
                field: key.to_string(),
                line: lineno,
            });
        }
        handler(stat, parsed);
        Ok(())
    }
}

/// A trait for parsing single-line statistics such as `memory.usage_in_bytes`
/// or `cpuacct.usage_percpu`.
pub trait SingleLineStat: Sized {
    /// Parses the statistic from the first line of the reader.
    ///
    /// # Errors
    ///
    /// Returns a [`StatParseError`] if reading fails or the line is malformed.
    fn from_reader<R: BufRead>(buf: &mut R) -> Result<Self, StatParseError>;
}
