// src/timestamp.rs
//
// Stored and serialized timestamps share one fixed-width RFC 3339 form
// (millisecond precision, `Z` suffix) so string order is time order.
// Clocks are read through `now()`, which drops sub-millisecond digits, so a
// value read back from MongoDB equals the one that was written.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use mongodb::bson::Bson;
use serde::{de, Deserialize, Deserializer, Serializer};

/// Current time at the precision documents store.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn format(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn to_bson(dt: &DateTime<Utc>) -> Bson {
    Bson::String(format(dt))
}

fn parse<E: de::Error>(raw: &str) -> Result<DateTime<Utc>, E> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(E::custom)
}

pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(dt))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw)
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => serializer.serialize_some(&format(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw).map(Some),
            None => Ok(None),
        }
    }
}
