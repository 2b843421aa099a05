//! Core domain types for assetcount
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Asset record** | One protected-asset inventory entry, owned by a cloud account and tagged with a type |
//! | **Cursor** | Opaque continuation token handed back by a paged API |
//! | **Directory** | Account id to display name lookup, built once per run |
//! | **Aggregate row** | Count of one (account, asset type) pair for a report date |
//! | **Raw blob** | Fetched pages persisted as concatenated JSON arrays |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};

// ============================================
// Cursor
// ============================================

/// Opaque continuation token.
///
/// The asset search API hands back an array (`searchAfter`), the directory
/// API a string marker. Both are kept as raw JSON and sent back untouched.
/// `null`, `""`, `[]` and `{}` are all "empty" and mean there is no next page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(Value);

impl Cursor {
    /// Wrap a cursor value from a response, dropping empty ones.
    pub fn from_response(value: Option<Value>) -> Option<Cursor> {
        value.map(Cursor).filter(|c| !c.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// String form, for marker-style tokens.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }
}

impl From<Value> for Cursor {
    fn from(value: Value) -> Self {
        Cursor(value)
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Cursor(Value::String(value))
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Cursor(Value::String(value.to_string()))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// Asset records
// ============================================

/// One protected asset as returned by the search API.
///
/// Only the owning account and the asset type matter for counting. Every
/// other field is kept in `extra` so raw pages can be persisted without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// External cloud account identifier
    #[serde(rename = "externalCloudAccountId", alias = "accountId", default)]
    pub account_id: String,
    /// Asset category label (e.g. "vm", "db")
    #[serde(rename = "type", alias = "assetType", default)]
    pub asset_type: String,
    /// Remaining upstream fields, untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetRecord {
    pub fn new(account_id: impl Into<String>, asset_type: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            asset_type: asset_type.into(),
            extra: Map::new(),
        }
    }

    /// Both the account and the type must be present and non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.account_id.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "missing externalCloudAccountId (type {:?})",
                self.asset_type
            )));
        }
        if self.asset_type.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "missing type for account {}",
                self.account_id
            )));
        }
        Ok(())
    }
}

// ============================================
// Account directory
// ============================================

/// One account from the directory-listing API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDirectoryEntry {
    #[serde(rename = "id")]
    pub account_id: String,
    #[serde(rename = "name")]
    pub account_name: String,
}

impl AccountDirectoryEntry {
    pub fn new(account_id: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            account_name: account_name.into(),
        }
    }
}

// ============================================
// Aggregate rows
// ============================================

/// Count of assets of one type in one account for the report date.
///
/// Field order matches the report columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AggregateRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Account ID")]
    pub account_id: String,
    #[serde(rename = "Type")]
    pub asset_type: String,
    #[serde(rename = "Quantity")]
    pub quantity: u64,
    #[serde(rename = "Account Name")]
    pub account_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_emptiness() {
        assert!(Cursor::from(Value::Null).is_empty());
        assert!(Cursor::from("").is_empty());
        assert!(Cursor::from(json!([])).is_empty());
        assert!(!Cursor::from(json!(["abc", 17])).is_empty());
        assert!(!Cursor::from("marker-2").is_empty());
    }

    #[test]
    fn test_cursor_from_response() {
        assert!(Cursor::from_response(None).is_none());
        assert!(Cursor::from_response(Some(json!([]))).is_none());
        assert_eq!(
            Cursor::from_response(Some(json!(["x"]))),
            Some(Cursor::from(json!(["x"])))
        );
    }

    #[test]
    fn test_asset_record_keeps_extra_fields() {
        let raw = json!({
            "externalCloudAccountId": "111",
            "type": "vm",
            "region": "ca-central-1",
            "tags": {"env": "prod"}
        });
        let record: AssetRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.account_id, "111");
        assert_eq!(record.asset_type, "vm");
        assert_eq!(record.extra["region"], "ca-central-1");

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_asset_record_aliases() {
        let record: AssetRecord =
            serde_json::from_value(json!({"accountId": "222", "assetType": "db"})).unwrap();
        assert_eq!(record, AssetRecord::new("222", "db"));
    }

    #[test]
    fn test_asset_record_validation() {
        assert!(AssetRecord::new("111", "vm").validate().is_ok());
        assert!(matches!(
            AssetRecord::new("", "vm").validate(),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            AssetRecord::new("111", "").validate(),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_directory_entry_wire_shape() {
        let entry: AccountDirectoryEntry =
            serde_json::from_value(json!({"id": "111", "name": "Alpha"})).unwrap();
        assert_eq!(entry, AccountDirectoryEntry::new("111", "Alpha"));
    }
}
