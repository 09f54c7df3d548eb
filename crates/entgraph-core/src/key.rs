//! Entity identifiers.
//!
//! A [`Key`] is the value (or ordered tuple of values) that identifies one
//! entity instance of a given type. Keys are compared and hashed
//! structurally because they are used as map keys across result sets.

use crate::value::Value;
use std::fmt::Debug;
use std::hash::Hash;

/// An entity identifier, simple or composite.
///
/// `to_values` must return exactly `ARITY` values in key column order.
pub trait Key: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Number of columns this key spans.
    const ARITY: usize;

    /// Append the column values of this key, in column order.
    fn push_values(&self, out: &mut Vec<Value>);

    /// The column values of this key, in column order.
    fn to_values(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(Self::ARITY);
        self.push_values(&mut out);
        out
    }
}

macro_rules! scalar_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Key for $ty {
                const ARITY: usize = 1;

                fn push_values(&self, out: &mut Vec<Value>) {
                    out.push(Value::from(self.clone()));
                }
            }
        )*
    };
}

scalar_key!(i16, i32, i64, u32, String, [u8; 16]);

impl<A: Key, B: Key> Key for (A, B) {
    const ARITY: usize = A::ARITY + B::ARITY;

    fn push_values(&self, out: &mut Vec<Value>) {
        self.0.push_values(out);
        self.1.push_values(out);
    }
}

impl<A: Key, B: Key, C: Key> Key for (A, B, C) {
    const ARITY: usize = A::ARITY + B::ARITY + C::ARITY;

    fn push_values(&self, out: &mut Vec<Value>) {
        self.0.push_values(out);
        self.1.push_values(out);
        self.2.push_values(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_keys() {
        assert_eq!(<i64 as Key>::ARITY, 1);
        assert_eq!(42_i64.to_values(), vec![Value::BigInt(42)]);
        assert_eq!(
            "fr".to_string().to_values(),
            vec![Value::Text("fr".to_string())]
        );
    }

    #[test]
    fn test_composite_key_preserves_column_order() {
        let key = (1_i64, "a".to_string());
        assert_eq!(<(i64, String) as Key>::ARITY, 2);
        assert_eq!(
            key.to_values(),
            vec![Value::BigInt(1), Value::Text("a".to_string())]
        );

        let nested = ((1_i32, 2_i32), 3_i64);
        assert_eq!(<((i32, i32), i64) as Key>::ARITY, 3);
        assert_eq!(
            nested.to_values(),
            vec![Value::Int(1), Value::Int(2), Value::BigInt(3)]
        );
    }

    #[test]
    fn test_composite_keys_hash_structurally() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert((1_i64, 10_i64));
        assert!(set.contains(&(1_i64, 10_i64)));
        assert!(!set.contains(&(10_i64, 1_i64)));
    }
}
