//! Keys, key paths and key ranges.

use crate::error::{EngineError, EngineResult};
use recordb_codec::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Bound;

/// A record or index key.
///
/// Keys are totally ordered: every number sorts before every text key,
/// text before bytes, and bytes before arrays. Arrays compare element by
/// element, and a shorter array sorts before a longer one sharing its prefix.
///
/// Integers and floats share one numeric order. An integer and a float of
/// the same magnitude are still different keys; the integer sorts first.
#[derive(Debug, Clone)]
pub enum Key {
    /// Signed integer key.
    Integer(i64),
    /// Float key. Never `NaN` when built from a record value.
    Number(f64),
    /// UTF-8 text key.
    Text(String),
    /// Raw byte key.
    Bytes(Vec<u8>),
    /// Compound key.
    Array(Vec<Key>),
}

impl Key {
    /// Converts a record value into a key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Data`] for nulls, booleans, `NaN` and maps, or
    /// arrays containing them.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        match value {
            Value::Integer(n) => Ok(Self::Integer(*n)),
            Value::Float(x) if x.is_nan() => Err(EngineError::data("NaN is not a valid key")),
            // -0.0 and 0.0 name the same key.
            Value::Float(x) if *x == 0.0 => Ok(Self::Number(0.0)),
            Value::Float(x) => Ok(Self::Number(*x)),
            Value::Text(s) => Ok(Self::Text(s.clone())),
            Value::Bytes(b) => Ok(Self::Bytes(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<EngineResult<_>>()
                .map(Self::Array),
            other => Err(EngineError::data(format!("{other:?} is not a valid key"))),
        }
    }

    /// Converts the key back into a record value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(n) => Value::Integer(*n),
            Self::Number(x) => Value::Float(*x),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Bytes(b) => Value::Bytes(b.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
        }
    }

    /// Returns the integer if this is an integer key.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the float if this is a float key.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(x) => Some(*x),
            _ => None,
        }
    }

    /// Returns the components if this is a compound key.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Key]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl Key {
    fn rank(&self) -> u8 {
        match self {
            Self::Integer(_) | Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::Bytes(_) => 2,
            Self::Array(_) => 3,
        }
    }
}

/// Compares an integer with a float without rounding the integer.
fn cmp_integer_number(n: i64, x: f64) -> Ordering {
    // 2^63, the first float above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if x.is_nan() {
        return if x.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if x >= LIMIT {
        return Ordering::Less;
    }
    if x < -LIMIT {
        return Ordering::Greater;
    }

    let whole = x.trunc();
    let truncated = whole as i64;
    n.cmp(&truncated).then(if x < whole {
        Ordering::Greater
    } else {
        Ordering::Less
    })
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Integer(a), Self::Number(b)) => cmp_integer_number(*a, *b),
            (Self::Number(a), Self::Integer(b)) => cmp_integer_number(*b, *a).reverse(),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Integer(n) => n.hash(state),
            Self::Number(x) => x.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
            Self::Array(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Number(x) => write!(f, "{x:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                write!(f, "0x")?;
                b.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for Key {
    fn from(x: f64) -> Self {
        Self::Number(x)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Self::Array(items)
    }
}

impl<A: Into<Key>, B: Into<Key>> From<(A, B)> for Key {
    fn from((a, b): (A, B)) -> Self {
        Self::Array(vec![a.into(), b.into()])
    }
}

impl<A: Into<Key>, B: Into<Key>, C: Into<Key>> From<(A, B, C)> for Key {
    fn from((a, b, c): (A, B, C)) -> Self {
        Self::Array(vec![a.into(), b.into(), c.into()])
    }
}

/// Where a key lives inside a record.
///
/// Each path is a field name or a dotted path into nested maps
/// (`"address.city"`). A compound path produces an array key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPath {
    /// One field.
    Single(String),
    /// Several fields, in order.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Builds a key path from field names: one name gives a single path,
    /// several give a compound one, none gives `None`.
    #[must_use]
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Option<Self> {
        match fields {
            [] => None,
            [single] => Some(Self::Single(single.as_ref().to_string())),
            many => Some(Self::Compound(
                many.iter().map(|f| f.as_ref().to_string()).collect(),
            )),
        }
    }

    /// Whether this path produces array keys.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound(_))
    }

    /// Field paths in order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Single(path) => vec![path.as_str()],
            Self::Compound(paths) => paths.iter().map(String::as_str).collect(),
        }
    }

    /// Evaluates the path against a record.
    ///
    /// Returns `Ok(None)` when any component is missing or null.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Data`] when a component is present but is not a
    /// valid key.
    pub fn evaluate(&self, record: &Value) -> EngineResult<Option<Key>> {
        match self {
            Self::Single(path) => match record.get_path(path) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => Key::from_value(value).map(Some),
            },
            Self::Compound(paths) => {
                let mut parts = Vec::with_capacity(paths.len());
                for path in paths {
                    match record.get_path(path) {
                        None | Some(Value::Null) => return Ok(None),
                        Some(value) => parts.push(Key::from_value(value)?),
                    }
                }
                Ok(Some(Key::Array(parts)))
            }
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(path) => f.write_str(path),
            Self::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        Self::Single(path.to_string())
    }
}

/// A contiguous interval of keys.
///
/// Ranges are validated on construction, so a range is never empty by
/// construction (`lower <= upper`, and equal bounds are both closed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl KeyRange {
    /// Range matching every key.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Range matching exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys at or above `key` (strictly above when `open`).
    pub fn lower_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: bound(key.into(), open),
            upper: Bound::Unbounded,
        }
    }

    /// Keys at or below `key` (strictly below when `open`).
    pub fn upper_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: bound(key.into(), open),
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Data`] when `lower > upper`, or when they are
    /// equal and either side is open.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> EngineResult<Self> {
        let (lower, upper) = (lower.into(), upper.into());
        match lower.cmp(&upper) {
            Ordering::Greater => Err(EngineError::data(format!(
                "lower bound {lower} is greater than upper bound {upper}"
            ))),
            Ordering::Equal if lower_open || upper_open => Err(EngineError::data(format!(
                "range with equal bounds {lower} must be closed"
            ))),
            _ => Ok(Self {
                lower: bound(lower, lower_open),
                upper: bound(upper, upper_open),
            }),
        }
    }

    /// Lower end of the range.
    #[must_use]
    pub fn lower(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    /// Upper end of the range.
    #[must_use]
    pub fn upper(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }

    /// Whether `key` satisfies the lower end.
    #[must_use]
    pub fn admits_lower(&self, key: &Key) -> bool {
        match &self.lower {
            Bound::Included(lower) => key >= lower,
            Bound::Excluded(lower) => key > lower,
            Bound::Unbounded => true,
        }
    }

    /// Whether `key` satisfies the upper end.
    #[must_use]
    pub fn admits_upper(&self, key: &Key) -> bool {
        match &self.upper {
            Bound::Included(upper) => key <= upper,
            Bound::Excluded(upper) => key < upper,
            Bound::Unbounded => true,
        }
    }

    /// Whether `key` lies inside the range.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.admits_lower(key) && self.admits_upper(key)
    }

    /// Entries of `map` whose keys fall inside the range, in key order.
    pub fn scan<'a, V>(
        &self,
        map: &'a BTreeMap<Key, V>,
    ) -> std::collections::btree_map::Range<'a, Key, V> {
        map.range::<Key, _>((self.lower.as_ref(), self.upper.as_ref()))
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        Self::only(key)
    }
}

fn bound(key: Key, open: bool) -> Bound<Key> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_key() -> impl Strategy<Value = Key> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(Key::Integer),
            (-1.0e6f64..1.0e6).prop_map(Key::Number),
            (-3i64..3).prop_map(|n| Key::Number(n as f64)),
            "[a-z]{0,6}".prop_map(Key::Text),
            proptest::collection::vec(any::<u8>(), 0..4).prop_map(Key::Bytes),
        ];
        leaf.prop_recursive(2, 8, 3, |inner| {
            proptest::collection::vec(inner, 0..3).prop_map(Key::Array)
        })
    }

    #[test]
    fn type_order_is_number_text_bytes_array() {
        let keys = [
            Key::Integer(i64::MAX),
            Key::Number(f64::MAX),
            Key::Text(String::new()),
            Key::Bytes(vec![]),
            Key::Array(vec![]),
        ];
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn integers_and_floats_share_one_order() {
        let keys = [
            Key::Number(f64::NEG_INFINITY),
            Key::Integer(i64::MIN),
            Key::Number(-1.5),
            Key::Integer(-1),
            Key::Number(-1.0),
            Key::Number(-0.5),
            Key::Integer(0),
            Key::Number(0.0),
            Key::Number(0.25),
            Key::Integer(1),
            Key::Integer(i64::MAX),
            Key::Number(9.3e18),
        ];
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn float_keys_from_values() {
        assert_eq!(
            Key::from_value(&Value::Float(-0.0)).unwrap(),
            Key::Number(0.0)
        );
        assert_eq!(Key::from_value(&Value::Float(2.5)).unwrap(), Key::from(2.5));
        assert!(Key::from_value(&Value::Float(f64::NAN)).is_err());
    }

    #[test]
    fn arrays_compare_lexicographically() {
        let a = Key::from((1, "foo"));
        let b = Key::from((1, "zzz"));
        let c = Key::from((2, "aaa"));
        assert!(a < b && b < c);
        assert!(Key::Array(vec![Key::Integer(1)]) < a);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Key::from_value(&Value::Null).is_err());
        assert!(Key::from_value(&Value::Bool(true)).is_err());
        assert!(Key::from_value(&Value::empty_map()).is_err());
        assert!(Key::from_value(&Value::Array(vec![Value::Integer(1), Value::Null])).is_err());
    }

    #[test]
    fn key_path_evaluates_nested_and_compound() {
        let record = Value::map(vec![
            (Value::from("id"), Value::from(7)),
            (
                Value::from("address"),
                Value::map(vec![(Value::from("city"), Value::from("Oslo"))]),
            ),
        ]);

        let nested = KeyPath::from("address.city");
        assert_eq!(nested.evaluate(&record).unwrap(), Some(Key::from("Oslo")));

        let compound = KeyPath::from_fields(&["id", "address.city"]).unwrap();
        assert_eq!(
            compound.evaluate(&record).unwrap(),
            Some(Key::from((7, "Oslo")))
        );

        let missing = KeyPath::from_fields(&["id", "name"]).unwrap();
        assert_eq!(missing.evaluate(&record).unwrap(), None);
    }

    #[test]
    fn from_fields_picks_shape() {
        assert_eq!(KeyPath::from_fields::<&str>(&[]), None);
        assert_eq!(KeyPath::from_fields(&["id"]), Some(KeyPath::from("id")));
        assert!(KeyPath::from_fields(&["a", "b"]).unwrap().is_compound());
    }

    #[test]
    fn bound_rejects_inverted_and_open_equal() {
        assert!(KeyRange::bound(5, 1, false, false).is_err());
        assert!(KeyRange::bound(3, 3, true, false).is_err());
        assert!(KeyRange::bound(3, 3, false, false).is_ok());
    }

    #[test]
    fn scan_respects_open_bounds() {
        let map: BTreeMap<Key, ()> = (1..=5).map(|n| (Key::Integer(n), ())).collect();
        let range = KeyRange::bound(2, 4, true, false).unwrap();
        let keys: Vec<_> = range.scan(&map).map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::Integer(3), Key::Integer(4)]);
    }

    proptest! {
        #[test]
        fn ordering_is_total_and_consistent(a in arb_key(), b in arb_key()) {
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
            prop_assert_eq!(a == b, a.cmp(&b) == Ordering::Equal);
        }

        #[test]
        fn key_value_conversion_is_lossless(key in arb_key()) {
            prop_assert_eq!(Key::from_value(&key.to_value()).unwrap(), key);
        }

        #[test]
        fn scan_matches_contains(
            keys in proptest::collection::btree_set(-20i64..20, 0..15),
            lo in -25i64..25,
            hi in -25i64..25,
            lo_open: bool,
            hi_open: bool,
        ) {
            let map: BTreeMap<Key, ()> = keys.iter().map(|k| (Key::Integer(*k), ())).collect();
            if let Ok(range) = KeyRange::bound(lo, hi, lo_open, hi_open) {
                let scanned = range.scan(&map).count();
                let filtered = map.keys().filter(|k| range.contains(k)).count();
                prop_assert_eq!(scanned, filtered);
            }
        }
    }
}
