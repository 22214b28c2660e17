/// Macro to create a strongly-typed newtype wrapper around a primitive id.
///
/// The generated type derives the usual value-type traits, serializes
/// transparently as its inner primitive, and converts both ways with
/// `From`/`Into`. `Display` prints the bare value; `Debug` prints
/// `Name(value)`.
#[macro_export]
macro_rules! strong_type {
    ($name:ident, $inner:ty) => {
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Wrap a raw value.
            #[inline]
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Unwrap to the raw value.
            #[inline]
            pub const fn raw(self) -> $inner {
                self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    strong_type!(TestId, u64);

    #[test]
    fn test_strong_type_basic() {
        let id = TestId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.0, 42);
    }

    #[test]
    fn test_strong_type_from() {
        let id: TestId = 100u64.into();
        assert_eq!(id.raw(), 100);
        let raw: u64 = id.into();
        assert_eq!(raw, 100);
    }

    #[test]
    fn test_strong_type_display_debug() {
        let id = TestId::new(7);
        assert_eq!(format!("{}", id), "7");
        assert_eq!(format!("{:?}", id), "TestId(7)");
    }

    #[test]
    fn test_strong_type_ord_hash() {
        assert!(TestId::new(1) < TestId::new(2));
        let mut set = HashSet::new();
        set.insert(TestId::new(1));
        set.insert(TestId::new(2));
        set.insert(TestId::new(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_strong_type_serde() {
        let id = TestId::new(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");
        let parsed: TestId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
