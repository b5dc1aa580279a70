//! # recordb Codec
//!
//! Record values and their canonical CBOR encoding.
//!
//! Stores in recordb hold dynamic [`Value`]s. Typed records are converted
//! with [`to_value`] / [`from_value`] through `serde`, and the storage engine
//! keeps them as canonical CBOR bytes produced by [`to_canonical_cbor`].
//!
//! ## Rules
//!
//! - Maps are sorted by key (length-first, then bytewise)
//! - Integers are signed 64-bit
//! - Floats are double precision and order by `f64::total_cmp`
//! - No tags
//!
//! ## Usage
//!
//! ```
//! use recordb_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::map(vec![(Value::from("name"), Value::from("Ada"))]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod error;
mod value;

pub use convert::{from_cbor, from_value, to_canonical_cbor, to_value};
pub use error::{CodecError, CodecResult};
pub use value::Value;
