//! Host keys and their canonical form.
//!
//! Every index touch-point goes through [`Key::canonicalize`] and compares
//! with [`same_value_zero`]; the host language's default equality is never
//! consulted. Integer keys become doubles, so `1` and `1.0` collide, NaN
//! equals NaN, and `+0` equals `-0`.

use core::fmt;
use core::hash::{Hash, Hasher};
use std::rc::Rc;

/// Hash code shared by null and both zeros.
const ZERO_HASH: u64 = 0;

const TAG_UNDEFINED: u8 = 1;
const TAG_BOOLEAN: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_OBJECT: u8 = 5;

/// Opaque identity of a host object used as a key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ObjectId(pub u64);

/// A raw key as supplied by the surrounding object model.
#[derive(Clone, Debug)]
pub enum Key {
    Undefined,
    Null,
    Boolean(bool),
    /// Non-floating numeric representation; normalized to `Number` on entry.
    Integer(i64),
    Number(f64),
    String(Rc<str>),
    Object(ObjectId),
}

/// A key after numeric normalization. This is the form stored in the table
/// and handed back by iterators.
#[derive(Clone)]
pub enum CanonicalKey {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectId),
}

impl Key {
    pub fn canonicalize(self) -> CanonicalKey {
        match self {
            Key::Undefined => CanonicalKey::Undefined,
            Key::Null => CanonicalKey::Null,
            Key::Boolean(b) => CanonicalKey::Boolean(b),
            // Rounds beyond 2^53, same as any double conversion.
            Key::Integer(i) => CanonicalKey::Number(i as f64),
            Key::Number(n) => CanonicalKey::Number(n),
            Key::String(s) => CanonicalKey::String(s),
            Key::Object(id) => CanonicalKey::Object(id),
        }
    }
}

impl CanonicalKey {
    pub fn is_null(&self) -> bool {
        matches!(self, CanonicalKey::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CanonicalKey::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CanonicalKey::String(s) => Some(s),
            _ => None,
        }
    }
}

/// SameValueZero over canonical keys. Total: keys of different shapes are
/// simply unequal.
pub fn same_value_zero(a: &CanonicalKey, b: &CanonicalKey) -> bool {
    use CanonicalKey::*;
    match (a, b) {
        (Undefined, Undefined) | (Null, Null) => true,
        (Boolean(x), Boolean(y)) => x == y,
        // `==` already treats +0 and -0 as equal.
        (Number(x), Number(y)) => (x.is_nan() && y.is_nan()) || x == y,
        (String(x), String(y)) => x == y,
        (Object(x), Object(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for CanonicalKey {
    fn eq(&self, other: &Self) -> bool {
        same_value_zero(self, other)
    }
}

// NaN is equal to itself under SameValueZero, so equality is reflexive.
impl Eq for CanonicalKey {}

impl Hash for CanonicalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            CanonicalKey::Null => state.write_u64(ZERO_HASH),
            CanonicalKey::Number(n) if *n == 0.0 => state.write_u64(ZERO_HASH),
            CanonicalKey::Number(n) => {
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                state.write_u8(TAG_NUMBER);
                state.write_u64(bits);
            }
            CanonicalKey::Undefined => state.write_u8(TAG_UNDEFINED),
            CanonicalKey::Boolean(b) => {
                state.write_u8(TAG_BOOLEAN);
                b.hash(state);
            }
            CanonicalKey::String(s) => {
                state.write_u8(TAG_STRING);
                s.hash(state);
            }
            CanonicalKey::Object(id) => {
                state.write_u8(TAG_OBJECT);
                id.hash(state);
            }
        }
    }
}

impl fmt::Debug for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalKey::Undefined => f.write_str("undefined"),
            CanonicalKey::Null => f.write_str("null"),
            CanonicalKey::Boolean(b) => write!(f, "{b}"),
            CanonicalKey::Number(n) => write!(f, "{n:?}"),
            CanonicalKey::String(s) => write!(f, "{s:?}"),
            CanonicalKey::Object(id) => write!(f, "#{}", id.0),
        }
    }
}

impl From<CanonicalKey> for Key {
    fn from(k: CanonicalKey) -> Self {
        match k {
            CanonicalKey::Undefined => Key::Undefined,
            CanonicalKey::Null => Key::Null,
            CanonicalKey::Boolean(b) => Key::Boolean(b),
            CanonicalKey::Number(n) => Key::Number(n),
            CanonicalKey::String(s) => Key::String(s),
            CanonicalKey::Object(id) => Key::Object(id),
        }
    }
}

impl From<()> for Key {
    fn from(_: ()) -> Self {
        Key::Null
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Boolean(b)
    }
}

macro_rules! integer_keys {
    ($($t:ty),*) => {
        $(impl From<$t> for Key {
            fn from(i: $t) -> Self {
                Key::Integer(i as i64)
            }
        })*
    };
}

integer_keys!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Key {
    fn from(n: f32) -> Self {
        Key::Number(n as f64)
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Key {
    fn from(s: Rc<str>) -> Self {
        Key::String(s)
    }
}

impl From<ObjectId> for Key {
    fn from(id: ObjectId) -> Self {
        Key::Object(id)
    }
}

impl<T: Into<Key>> From<Option<T>> for Key {
    fn from(k: Option<T>) -> Self {
        k.map_or(Key::Null, Into::into)
    }
}
