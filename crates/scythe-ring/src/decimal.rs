//! Serde adapter that stores a [`Natural`] as its decimal string.

use malachite::Natural;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

pub(crate) fn serialize<S: Serializer>(value: &Natural, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Natural, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse()
        .map_err(|_| D::Error::custom(format!("invalid ring position: {s:?}")))
}
