//! Change-feed records and pages.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Server-assigned record identifier.
///
/// SQL-backed servers send integers, document stores send strings; both are
/// accepted and kept in their canonical text form so they can be echoed
/// back as a `change_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeId(String);

impl ChangeId {
    /// Identifier from its text form.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Identifier from a numeric sequence value.
    #[must_use]
    pub fn from_number(value: u64) -> Self {
        Self(value.to_string())
    }

    /// Canonical text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, when the identifier is a sequence number.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ChangeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_u64() {
            Some(value) => serializer.serialize_u64(value),
            None => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for ChangeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = ChangeId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or a string change identifier")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<ChangeId, E> {
                Ok(ChangeId::from_number(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<ChangeId, E> {
                u64::try_from(value)
                    .map(ChangeId::from_number)
                    .map_err(|_| E::custom(format!("negative change identifier {value}")))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ChangeId, E> {
                if value.is_empty() {
                    return Err(E::custom("empty change identifier"));
                }
                Ok(ChangeId::from_text(value))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// What kind of operation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    /// New metadata was published.
    Update,
    /// The identity was deleted remotely.
    Deletion,
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Deletion => write!(f, "deletion"),
        }
    }
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Monotonic server-assigned identifier.
    #[serde(rename = "ID")]
    pub id: ChangeId,
    /// Identity the operation applied to.
    #[serde(rename = "GUN")]
    pub gun: String,
    /// Operation kind.
    #[serde(rename = "Category")]
    pub category: ChangeCategory,
    /// Timestamp version published, when reported.
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Timestamp checksum, when reported.
    #[serde(rename = "SHA256", default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Server time of the record, when reported.
    #[serde(rename = "CreatedAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChangeRecord {
    /// A record with only the required fields.
    pub fn new(id: ChangeId, gun: impl Into<String>, category: ChangeCategory) -> Self {
        Self {
            id,
            gun: gun.into(),
            category,
            version: None,
            sha256: None,
            created_at: None,
        }
    }
}

/// One page of the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePage {
    /// Number of records the server reports.
    pub count: usize,
    /// Records, oldest first.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub records: Vec<ChangeRecord>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ChangeRecord>, D::Error> {
    Ok(Option::<Vec<ChangeRecord>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChangePage {
    /// Builds a page whose count matches its records.
    #[must_use]
    pub fn from_records(records: Vec<ChangeRecord>) -> Self {
        Self {
            count: records.len(),
            records,
        }
    }

    /// Checks that `count` agrees with the records actually returned.
    pub fn ensure_consistent(&self) -> Result<(), String> {
        if self.count == self.records.len() {
            Ok(())
        } else {
            Err(format!(
                "page reports count {} but carries {} records",
                self.count,
                self.records.len()
            ))
        }
    }

    /// The `index`-th record, if present.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<&ChangeRecord> {
        self.records.get(index)
    }
}
