//! Inventory facts and spec patterns.
//!
//! Both are 4-tuples of strings in `(category, instance, key, value)` order and
//! serialize as 4-element JSON arrays.

use serde::{Deserialize, Serialize};
use std::ops::Index;

/// One discovered hardware fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact(pub [String; 4]);

/// A 4-element pattern matched position by position against a [`Fact`].
///
/// Each element is a literal, a `$var`, a `$$var`, a `$var=func(...)` or a
/// bare `func(...)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spec(pub [String; 4]);

macro_rules! four_tuple_impls {
    ($ty:ident) => {
        impl $ty {
            pub fn new(
                category: impl Into<String>,
                instance: impl Into<String>,
                key: impl Into<String>,
                value: impl Into<String>,
            ) -> Self {
                $ty([category.into(), instance.into(), key.into(), value.into()])
            }

            pub fn category(&self) -> &str {
                &self.0[0]
            }

            pub fn instance(&self) -> &str {
                &self.0[1]
            }

            pub fn key(&self) -> &str {
                &self.0[2]
            }

            pub fn value(&self) -> &str {
                &self.0[3]
            }

            pub fn fields(&self) -> &[String; 4] {
                &self.0
            }
        }

        impl Index<usize> for $ty {
            type Output = String;

            fn index(&self, idx: usize) -> &String {
                &self.0[idx]
            }
        }

        impl From<(&str, &str, &str, &str)> for $ty {
            fn from(t: (&str, &str, &str, &str)) -> Self {
                $ty::new(t.0, t.1, t.2, t.3)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "({}, {}, {}, {})",
                    self.0[0], self.0[1], self.0[2], self.0[3]
                )
            }
        }
    };
}

four_tuple_impls!(Fact);
four_tuple_impls!(Spec);

impl Spec {
    /// True when the spec equals the fact field by field.
    pub fn is_literally(&self, fact: &Fact) -> bool {
        self.0 == fact.0
    }
}

/// Specs are matched against other specs when summarizing a profile, so a
/// spec can stand in for a fact.
impl From<Spec> for Fact {
    fn from(spec: Spec) -> Self {
        Fact(spec.0)
    }
}

impl From<&Spec> for Fact {
    fn from(spec: &Spec) -> Self {
        Fact(spec.0.clone())
    }
}
