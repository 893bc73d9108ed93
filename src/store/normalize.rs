//! Canonical field normalization at the record-store boundary
//!
//! Stored collections come from several exporters that disagree on field
//! casing (`DivisionID` vs `DivisionId` vs `divisionId`) and on value types
//! (`"1"` vs `1` vs `true`). Every document is folded onto one canonical
//! snake_case shape here, before typed decoding, so the engine only ever
//! sees canonical names.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::store::RecordKind;

/// Alias table: canonical field followed by every spelling seen in the wild
type AliasTable = &'static [(&'static str, &'static [&'static str])];

const SUBJECT_ALIASES: AliasTable = &[
    ("id", &["id", "ID", "Id", "OperatorID", "OperatorId"]),
    ("first_name", &["first_name", "FirstName", "firstName"]),
    ("last_name", &["last_name", "LastName", "lastName"]),
    ("division", &["division", "DivisionID", "DivisionId", "divisionId", "divisionID", "Division"]),
    ("stage_name", &["stage_name", "StatusName", "Status", "status", "statusName"]),
    ("stage_id", &["stage_id", "StatusId", "StatusID", "statusId", "statusID"]),
    ("order", &["order", "OrderId", "OrderID", "orderId", "orderID"]),
    ("credentials", &["credentials", "Certifications", "certifications"]),
];

const STAGE_ALIASES: AliasTable = &[
    ("id", &["id", "ID", "Id"]),
    ("name", &["name", "Status", "status"]),
    ("division", &["division", "DivisionID", "DivisionId", "divisionId", "divisionID"]),
    ("order", &["order", "OrderID", "OrderId", "orderId", "orderID"]),
    ("deleted", &["deleted", "isDeleted", "IsDeleted", "IsDelete", "isDelete"]),
    (
        "logical_stage_id",
        &["logical_stage_id", "PizzaStatusID", "PizzaStatusId", "pizzaStatusId", "pizzaStatusID"],
    ),
    ("fleet", &["fleet", "Fleet"]),
    ("providers", &["providers", "Providers"]),
];

const LOGICAL_STAGE_ALIASES: AliasTable = &[
    ("id", &["id", "ID", "Id"]),
    ("name", &["name", "Status", "status"]),
    ("description", &["description", "Description"]),
    ("operator", &["operator", "IsOperator", "isOperator"]),
    ("provider", &["provider", "IsProvider", "isProvider"]),
    ("tenant_id", &["tenant_id", "ClientId", "ClientID", "clientId", "clientID"]),
    ("auto_advance", &["auto_advance", "IsAuto", "isAuto"]),
];

const BINDING_ALIASES: AliasTable = &[
    ("id", &["id", "ID", "Id", "CertID", "CertificationID"]),
    ("credential", &["credential", "Certification", "certification"]),
    ("description", &["description", "Description"]),
    ("division", &["division", "DivisionID", "DivisionId", "divisionId", "divisionID"]),
    (
        "logical_stage_id",
        &["logical_stage_id", "PizzaStatusID", "PizzaStatusId", "pizzaStatusId", "pizzaStatusID"],
    ),
    ("deleted", &["deleted", "IsDeleted", "isDeleted", "isDelete", "IsDelete"]),
];

const CREDENTIAL_ALIASES: AliasTable = &[
    ("id", &["id", "ID", "Id", "CertificationId", "CertificationID"]),
    ("subject_id", &["subject_id", "OperatorID", "OperatorId", "operatorId"]),
    ("binding_id", &["binding_id", "CertTypeID", "CertTypeId", "certTypeId"]),
    ("name", &["name", "Name", "CertType"]),
    ("approved", &["approved", "IsApproved", "isApproved"]),
    ("deleted", &["deleted", "IsDeleted", "isDeleted"]),
    (
        "expires_at",
        &["expires_at", "ExpirationDate", "ExpireDate", "expirationDate", "Expiration"],
    ),
];

const HISTORY_ALIASES: AliasTable = &[
    ("id", &["id", "ID", "Id"]),
    ("subject_id", &["subject_id", "OperatorID", "OperatorId"]),
    ("stage_id", &["stage_id", "StatusID", "StatusId"]),
    ("division", &["division", "DivisionID", "DivisionId"]),
    ("date", &["date", "Date"]),
];

fn aliases_for(kind: RecordKind) -> AliasTable {
    match kind {
        RecordKind::Subjects => SUBJECT_ALIASES,
        RecordKind::Stages => STAGE_ALIASES,
        RecordKind::LogicalStages => LOGICAL_STAGE_ALIASES,
        RecordKind::Bindings => BINDING_ALIASES,
        RecordKind::Credentials => CREDENTIAL_ALIASES,
        RecordKind::History => HISTORY_ALIASES,
    }
}

/// Fold every known alias of a record's fields onto the canonical name
///
/// The first non-null alias (in table order) wins. Unknown fields are kept
/// as-is so round-tripping a record does not lose data.
pub fn canonicalize(kind: RecordKind, doc: Value) -> Value {
    let Value::Object(mut fields) = doc else {
        return doc;
    };

    let mut canonical = Map::new();
    for (name, aliases) in aliases_for(kind) {
        let mut chosen: Option<Value> = None;
        for alias in aliases.iter() {
            if let Some(value) = fields.remove(*alias) {
                if chosen.is_none() && !value.is_null() {
                    chosen = Some(value);
                }
            }
        }
        if let Some(value) = chosen {
            canonical.insert((*name).to_string(), value);
        }
    }

    // Embedded credentials on a subject get the same treatment
    if kind == RecordKind::Subjects {
        if let Some(Value::Array(items)) = canonical.remove("credentials") {
            let items = items
                .into_iter()
                .map(|item| canonicalize(RecordKind::Credentials, item))
                .collect();
            canonical.insert("credentials".to_string(), Value::Array(items));
        }
    }

    for (key, value) in fields {
        canonical.entry(key).or_insert(value);
    }
    Value::Object(canonical)
}

/// Extract the record array from a collection document
///
/// Accepts a bare array or an object wrapping exactly one array
/// (e.g. `{"certifications": [...]}`).
pub fn collection_items(doc: Value) -> Option<Vec<Value>> {
    match doc {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.into_iter().find_map(|(_, v)| match v {
            Value::Array(items) => Some(items),
            _ => None,
        }),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

/// Loosely-typed scalar as found in exported data
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Deserialize a boolean from `true/false`, `1/0`, `"1"/"0"`, `"true"/"false"`
///
/// Null, empty and unrecognized values decode as `false`.
pub fn flex_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(match value {
        Some(Loose::Bool(b)) => b,
        Some(Loose::Int(i)) => i != 0,
        Some(Loose::Float(f)) => f != 0.0,
        Some(Loose::Str(s)) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("true")
        }
        None => false,
    })
}

/// Deserialize a string that may have been exported as a number
pub fn flex_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(flex_opt_string(deserializer)?.unwrap_or_default())
}

/// Deserialize an optional string; numbers are stringified, blanks become `None`
pub fn flex_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(match value {
        Some(Loose::Str(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Loose::Int(i)) => Some(i.to_string()),
        Some(Loose::Float(f)) => Some(f.to_string()),
        Some(Loose::Bool(b)) => Some(b.to_string()),
        None => None,
    })
}

/// Deserialize an optional timestamp from any of the exported formats
pub fn flex_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = flex_opt_string(deserializer)?;
    Ok(value.and_then(|s| {
        let parsed = parse_timestamp(&s);
        if parsed.is_none() {
            tracing::warn!(value = %s, "could not parse timestamp, treating as absent");
        }
        parsed
    }))
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a timestamp in RFC 3339, SQL Server export, or date-only form
///
/// Zone-less values are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
