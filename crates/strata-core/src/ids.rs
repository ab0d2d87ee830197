//! Strongly-typed identifiers for domain entities
//!
//! Every id in the store is a positive integer. The wrappers below can only
//! hold positive values, so `0`, negatives and unparseable route parameters
//! all collapse into "absent" at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StrataError;

/// Macro to generate positive integer ID wrappers
macro_rules! define_id {
    ($name:ident, $label:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw id, rejecting zero and negative values
            pub fn new(value: i64) -> Option<Self> {
                (value > 0).then_some(Self(value))
            }

            pub fn get(self) -> i64 {
                self.0
            }

            /// Parse a route or query parameter
            pub fn parse_param(raw: &str) -> Option<Self> {
                raw.trim().parse::<i64>().ok().and_then(Self::new)
            }
        }

        impl TryFrom<i64> for $name {
            type Error = StrataError;

            fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| {
                    StrataError::invalid_input(format!(
                        "{} must be a positive integer, got {}",
                        $label, value
                    ))
                })
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = StrataError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Self::parse_param(s).ok_or_else(|| {
                    StrataError::invalid_input(format!(
                        "{} must be a positive integer, got {:?}",
                        $label, s
                    ))
                })
            }
        }
    };
}

define_id!(UserId, "user id");
define_id!(OrganizationId, "organization id");
define_id!(SubOrganizationId, "sub-organization id");
