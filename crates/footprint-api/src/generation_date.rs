// Report generation timestamps
//
// The service keys reports by a `YYYY-MM-DD HH:MM:SS` string in UTC with no
// sub-second part. `GenerationDate` parses that literal and formats it back
// verbatim so it can be used as an ordered map key and a query parameter.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// When a report was generated. Ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationDate(NaiveDateTime);

impl GenerationDate {
    pub fn from_utc(at: DateTime<Utc>) -> Self {
        Self(at.naive_utc())
    }

    pub fn to_utc(self) -> DateTime<Utc> {
        self.0.and_utc()
    }
}

impl FromStr for GenerationDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s.trim(), FORMAT)
            .map(Self)
            .map_err(|e| Error::InvalidTimestamp {
                value: s.to_owned(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for GenerationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

impl Serialize for GenerationDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GenerationDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn round_trips_literal() {
        let raw = "2022-05-16 21:33:29";
        let date: GenerationDate = raw.parse().unwrap();

        let utc = date.to_utc();
        assert_eq!((utc.year(), utc.month(), utc.day()), (2022, 5, 16));
        assert_eq!((utc.hour(), utc.minute(), utc.second()), (21, 33, 29));
        assert_eq!(date.to_string(), raw);
    }

    #[test]
    fn orders_chronologically() {
        let earlier: GenerationDate = "2021-12-31 23:59:59".parse().unwrap();
        let later: GenerationDate = "2022-01-01 00:00:00".parse().unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn rejects_other_shapes() {
        let err = "2022-05-16T21:33:29Z".parse::<GenerationDate>().unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp { .. }));
    }

    #[test]
    fn serde_uses_literal_form() {
        let date: GenerationDate =
            serde_json::from_value(serde_json::json!("2022-05-16 21:33:29")).unwrap();
        assert_eq!(
            serde_json::to_value(date).unwrap(),
            serde_json::json!("2022-05-16 21:33:29")
        );
    }
}
