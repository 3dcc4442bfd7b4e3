//! Serde helpers for `Amount` fields.
//!
//! TOML, the `config` crate and serde's buffered path (internally tagged or
//! flattened types) have no `u128` support. Amounts are written as integers
//! while they fit in an `i64` and as decimal strings above that; both forms
//! are accepted when reading.
//!
//! ```ignore
//! #[serde(with = "dujyo_primitives::serde_amount")]
//! pub stake: Amount,
//! #[serde(default, with = "dujyo_primitives::serde_amount::option")]
//! pub max_stake: Option<Amount>,
//! ```

use crate::Amount;
use serde::de::{self, Unexpected, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

pub fn serialize<S>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    // TOML integers are signed.
    match i64::try_from(*amount) {
        Ok(small) => serializer.serialize_u64(small as u64),
        Err(_) => serializer.collect_str(amount),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(AmountVisitor)
}

/// Parse a base-10 amount. `_` separators are allowed, signs are not.
pub fn parse_amount(text: &str) -> Option<Amount> {
    let digits: String = text.trim().chars().filter(|c| *c != '_').collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
        Ok(Amount::from(value))
    }

    fn visit_u128<E: de::Error>(self, value: u128) -> Result<Amount, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
        Amount::try_from(value).map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
    }

    fn visit_i128<E: de::Error>(self, value: i128) -> Result<Amount, E> {
        Amount::try_from(value).map_err(|_| E::invalid_value(Unexpected::Other("negative integer"), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
        parse_amount(value).ok_or_else(|| E::invalid_value(Unexpected::Str(value), &self))
    }
}

/// Same encoding for `Option<Amount>`. Pair with `#[serde(default)]`.
pub mod option {
    use super::AmountVisitor;
    use crate::Amount;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(amount: &Option<Amount>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match amount {
            Some(amount) => super::serialize(amount, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Amount>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(OptionVisitor)
    }

    struct OptionVisitor;

    impl<'de> Visitor<'de> for OptionVisitor {
        type Value = Option<Amount>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional amount")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(AmountVisitor).map(Some)
        }
    }
}
