//! Shallow, field-wise merging of partial updates onto snapshots.

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

/// A snapshot type that can absorb a partial update.
///
/// `merge` must copy every field of `self`, replacing exactly the fields the
/// partial carries. Nested values are replaced, never merged recursively.
/// `into_partial` turns a whole snapshot into a partial carrying every field.
///
/// Record structs usually get this through [`snapshot!`](crate::snapshot);
/// maps implement it with keys standing in for fields.
pub trait Merge: Clone {
    /// The "some fields" counterpart of `Self`. `Default` must be the empty
    /// partial.
    type Partial: Clone + Default;

    /// Produce a new snapshot with `partial` laid over `self`.
    fn merge(&self, partial: Self::Partial) -> Self;

    /// Convert a full snapshot into a partial that sets every field.
    fn into_partial(self) -> Self::Partial;
}

/// Declare a record snapshot together with its partial type.
///
/// The partial has the same fields wrapped in `Option`, derives `Clone` and
/// `Default`, and gets one chaining setter per field.
///
/// ```
/// use statebox::{snapshot, Merge};
///
/// snapshot! {
///     #[derive(Clone, Debug, PartialEq)]
///     pub struct Counter => CounterPatch {
///         pub count: i32,
///         pub label: String,
///     }
/// }
///
/// let base = Counter { count: 0, label: "clicks".to_string() };
/// let next = base.merge(CounterPatch::default().count(3));
/// assert_eq!(next, Counter { count: 3, label: "clicks".to_string() });
/// ```
#[macro_export]
macro_rules! snapshot {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident => $partial:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        #[derive(Clone, Default)]
        $vis struct $partial {
            $( $field_vis $field: ::core::option::Option<$ty>, )*
        }

        #[allow(dead_code)]
        impl $partial {
            $(
                $vis fn $field(mut self, value: $ty) -> Self {
                    self.$field = ::core::option::Option::Some(value);
                    self
                }
            )*
        }

        impl $crate::Merge for $name {
            type Partial = $partial;

            fn merge(&self, partial: $partial) -> Self {
                $name {
                    $(
                        $field: match partial.$field {
                            ::core::option::Option::Some(value) => value,
                            ::core::option::Option::None => ::core::clone::Clone::clone(&self.$field),
                        },
                    )*
                }
            }

            fn into_partial(self) -> $partial {
                $partial {
                    $( $field: ::core::option::Option::Some(self.$field), )*
                }
            }
        }
    };
}

impl<K, V> Merge for BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    type Partial = BTreeMap<K, V>;

    fn merge(&self, partial: Self::Partial) -> Self {
        let mut next = self.clone();
        next.extend(partial);
        next
    }

    fn into_partial(self) -> Self::Partial {
        self
    }
}

impl<K, V, S> Merge for HashMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher + Clone + Default,
{
    type Partial = HashMap<K, V, S>;

    fn merge(&self, partial: Self::Partial) -> Self {
        let mut next = self.clone();
        next.extend(partial);
        next
    }

    fn into_partial(self) -> Self::Partial {
        self
    }
}
