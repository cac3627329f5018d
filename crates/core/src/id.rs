//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $t:ident) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in
            /// tests for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s).map_err(|e| {
                    DomainError::invalid_id(format!("{}: {}", stringify!($t), e))
                })?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a stocked item.
    ItemId
);
uuid_id!(
    /// Identifier of an item category (owned by catalog management).
    CategoryId
);
uuid_id!(
    /// Identifier of a vendor counterparty.
    VendorId
);
uuid_id!(
    /// Identifier of a customer counterparty.
    CustomerId
);
uuid_id!(
    /// Identifier of a purchase document.
    PurchaseId
);
uuid_id!(
    /// Identifier of a POS transaction.
    SaleId
);
uuid_id!(
    /// Identifier of a POS return.
    ReturnId
);
uuid_id!(
    /// Identifier of a journal entry (one stock movement).
    EntryId
);
uuid_id!(
    /// Identifier of a balance ledger entry (payment or charge).
    PaymentId
);
uuid_id!(
    /// Identifier of the user who created a record.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_input() {
        let err = "not-a-uuid".parse::<VendorId>().unwrap_err();
        match err {
            DomainError::InvalidId(msg) => assert!(msg.contains("VendorId")),
            other => panic!("expected InvalidId, got {other:?}"),
        }
    }
}
