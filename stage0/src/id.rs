//! Identifiers for tenants, requests and plans.
//!
//! All three are opaque strings on the wire. The kernel compares, hashes
//! and prints them and never looks inside.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Unwrap into the raw identifier.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id! {
    /// Tenant an execution runs for. Drives tenant-scoped allowlists and
    /// queue routing.
    TenantId
}

string_id! {
    /// One inbound request. Carried through every invocation for
    /// correlation.
    RequestId
}

string_id! {
    /// Key of a plan in a [`crate::PlanCatalog`].
    PlanId
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn ids_are_bare_strings_on_the_wire() {
        let id = TenantId::new("acme");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""acme""#);
        let back: PlanId = serde_json::from_str(r#""qa""#).unwrap();
        assert_eq!(back.as_str(), "qa");
    }

    #[test]
    fn maps_keyed_by_id_accept_str_lookups() {
        let mut plans = BTreeMap::new();
        plans.insert(PlanId::from("qa"), 1);
        assert_eq!(plans.get("qa"), Some(&1));
    }
}
