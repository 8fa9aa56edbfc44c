//! Decimal-string serde adapter for wide integers.
//!
//! Persisted records carry seeds, timestamps, counters and prices as decimal
//! strings so that consumers parsing JSON numbers as doubles never lose
//! precision above 2^53. Reads accept either a string or a JSON integer, which
//! keeps entries written by older writers decodable.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Row {
//!     #[serde(with = "rugmirror_core::decimal")]
//!     seed: U256,
//!     #[serde(default, with = "rugmirror_core::decimal::option")]
//!     last_laundered: Option<u64>,
//! }
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use std::fmt::Display;
use std::str::FromStr;

/// Every wire shape a decimal field has been observed in.
#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Text(String),
    Unsigned(u64),
    Float(f64),
}

fn parse<T, E>(repr: Repr) -> Result<T, E>
where
    T: FromStr,
    T::Err: Display,
    E: serde::de::Error,
{
    match repr {
        Repr::Text(text) => text
            .trim()
            .parse::<T>()
            .map_err(|e| E::custom(format!("invalid decimal string {text:?}: {e}"))),
        Repr::Unsigned(n) => n.to_string().parse::<T>().map_err(E::custom),
        Repr::Float(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => {
            format!("{f:.0}").parse::<T>().map_err(E::custom)
        }
        Repr::Float(f) => Err(E::custom(format!("expected a non-negative integer, got {f}"))),
    }
}

pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: Display,
    D: Deserializer<'de>,
{
    parse(Repr::deserialize(deserializer)?)
}

/// Optional decimal fields. `null`, a missing field and an empty string all read as `None`.
pub mod option {
    use super::{parse, Repr};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Repr::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(repr) => parse(repr).map(Some),
        }
    }
}

/// Lists of decimal fields, e.g. recent sale prices.
pub mod vec {
    use super::{parse, Repr};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(values: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|v| v.to_string()))
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        Vec::<Repr>::deserialize(deserializer)?
            .into_iter()
            .map(parse)
            .collect()
    }
}
