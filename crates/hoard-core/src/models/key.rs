//! Identifier and column-value keys

use std::fmt;

/// Opaque, hashable value used as a record identifier or a column value
///
/// Integers are normalized: any integer that fits in `i64` is stored as
/// [`Key::Int`] regardless of its source width or signedness, so `put(1u32)`
/// and `get(1i64)` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Bool(bool),
    Int(i64),
    /// Unsigned values above `i64::MAX`
    UInt(u64),
    Text(String),
    Bytes(Vec<u8>),
    /// Multi-column identifier (embedded ids)
    Composite(Vec<Key>),
}

impl Key {
    pub fn text(value: impl Into<String>) -> Self {
        Key::Text(value.into())
    }

    /// Build a composite key; `None` if any part is absent
    pub fn composite<I>(parts: I) -> Option<Self>
    where
        I: IntoIterator,
        I::Item: IntoKey,
    {
        parts
            .into_iter()
            .map(IntoKey::into_key)
            .collect::<Option<Vec<_>>>()
            .map(Key::Composite)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{}", b),
            Key::Int(i) => write!(f, "{}", i),
            Key::UInt(u) => write!(f, "{}", u),
            Key::Text(s) => f.write_str(s),
            Key::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Key::Composite(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Conversion into an optional [`Key`]
///
/// `None` models a null identifier or column value: lookups with it miss and
/// writes with it are no-ops.
pub trait IntoKey {
    fn into_key(self) -> Option<Key>;
}

impl IntoKey for Key {
    fn into_key(self) -> Option<Key> {
        Some(self)
    }
}

impl IntoKey for &Key {
    fn into_key(self) -> Option<Key> {
        Some(self.clone())
    }
}

impl<K: IntoKey> IntoKey for Option<K> {
    fn into_key(self) -> Option<Key> {
        self.and_then(IntoKey::into_key)
    }
}

macro_rules! signed_into_key {
    ($($t:ty),*) => {
        $(impl IntoKey for $t {
            fn into_key(self) -> Option<Key> {
                Some(Key::Int(self as i64))
            }
        })*
    };
}

macro_rules! unsigned_into_key {
    ($($t:ty),*) => {
        $(impl IntoKey for $t {
            fn into_key(self) -> Option<Key> {
                let wide = self as u64;
                Some(match i64::try_from(wide) {
                    Ok(v) => Key::Int(v),
                    Err(_) => Key::UInt(wide),
                })
            }
        })*
    };
}

signed_into_key!(i8, i16, i32, i64, isize);
unsigned_into_key!(u8, u16, u32, u64, usize);

impl IntoKey for bool {
    fn into_key(self) -> Option<Key> {
        Some(Key::Bool(self))
    }
}

impl IntoKey for &str {
    fn into_key(self) -> Option<Key> {
        Some(Key::Text(self.to_owned()))
    }
}

impl IntoKey for String {
    fn into_key(self) -> Option<Key> {
        Some(Key::Text(self))
    }
}

impl IntoKey for &String {
    fn into_key(self) -> Option<Key> {
        Some(Key::Text(self.clone()))
    }
}

impl IntoKey for Vec<u8> {
    fn into_key(self) -> Option<Key> {
        Some(Key::Bytes(self))
    }
}

impl IntoKey for &[u8] {
    fn into_key(self) -> Option<Key> {
        Some(Key::Bytes(self.to_vec()))
    }
}

impl<A: IntoKey, B: IntoKey> IntoKey for (A, B) {
    fn into_key(self) -> Option<Key> {
        Some(Key::Composite(vec![self.0.into_key()?, self.1.into_key()?]))
    }
}

impl<A: IntoKey, B: IntoKey, C: IntoKey> IntoKey for (A, B, C) {
    fn into_key(self) -> Option<Key> {
        Some(Key::Composite(vec![
            self.0.into_key()?,
            self.1.into_key()?,
            self.2.into_key()?,
        ]))
    }
}
