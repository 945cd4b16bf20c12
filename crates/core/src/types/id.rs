//! Newtype IDs for type-safe Zoho entity references.
//!
//! Zoho identifies every record with a long numeric string (e.g.
//! `"4265011000000087001"`). The ids are opaque to us: they are never
//! parsed as numbers, only compared and echoed back to Zoho. Use the
//! `define_id!` macro to create wrappers that prevent accidentally mixing
//! ids from different entity types.

/// Macro to define a type-safe Zoho ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use tsh_core::define_id;
/// define_id!(ItemId);
/// define_id!(CustomerId);
///
/// let item_id = ItemId::new("4265011000000087001");
/// let customer_id = CustomerId::new("4265011000000087001");
///
/// // These are different types, so this won't compile:
/// // let _: ItemId = customer_id;
/// assert_eq!(item_id.as_str(), customer_id.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying id string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the id and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Returns true if the id is empty (Zoho sends `""` for unset references).
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Zoho entity IDs
define_id!(CustomerId);
define_id!(ItemId);
define_id!(PriceListId);
define_id!(WarehouseId);
define_id!(SalesOrderId);
define_id!(InvoiceId);
define_id!(PaymentId);
define_id!(CreditNoteId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_as_str() {
        let id = ItemId::new("4265011000000087001");
        assert_eq!(id.as_str(), "4265011000000087001");
        assert_eq!(id.to_string(), "4265011000000087001");
    }

    #[test]
    fn test_id_is_empty() {
        assert!(PriceListId::new("").is_empty());
        assert!(PriceListId::new("  ").is_empty());
        assert!(!PriceListId::new("1").is_empty());
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = CustomerId::new("42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
        let back: CustomerId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(back, id);
    }
}
