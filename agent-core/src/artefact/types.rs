//! JSON schema types for the inner `header.tar.gz` entries (C4).
//!
//! [`HeaderInfo`] derives `Deserialize` directly — its grammar has no
//! bug-compat quirks. [`TypeInfo`] and the `meta-data` document do not:
//! an empty `type-info` body must still parse (`serde_json::Error::is_eof`
//! distinguishes "nothing here" from "malformed JSON"), and the raw JSON
//! value is retained alongside the typed fields so a caller can recover
//! extension keys the schema does not model.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::error::{ArtefactError, Result};

/// One payload declaration inside `header-info`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayloadDecl {
    /// The payload's file name, as it appears under `data/`.
    pub name: String,
    /// The payload's declared type (matched against `type-info`).
    #[serde(rename = "type")]
    pub type_name: String,
}

/// What this artifact provides, for dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Provides {
    /// Name of the artifact this update installs.
    pub artifact_name: String,
    /// Optional group the artifact belongs to.
    #[serde(default)]
    pub artifact_group: Option<String>,
}

/// What this artifact requires to be applicable, for dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Depends {
    /// Device types this artifact is compatible with.
    #[serde(default)]
    pub device_type: Vec<String>,
    /// Optional required predecessor artifact name.
    #[serde(default)]
    pub artifact_name: Option<String>,
    /// Optional required predecessor artifact group.
    #[serde(default)]
    pub artifact_group: Option<String>,
}

/// The `header-info` JSON document: the entry that opens every
/// `header.tar.gz`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderInfo {
    /// The payload(s) this artifact carries.
    pub payloads: Vec<PayloadDecl>,
    /// Provenance this artifact registers itself under.
    pub provides: Provides,
    /// Constraints this artifact must satisfy to apply.
    #[serde(default)]
    pub depends: Depends,
}

/// The `headers/0000/type-info` JSON document.
///
/// Not derived via `#[derive(Deserialize)]`: the raw document is retained
/// verbatim in [`TypeInfo::raw`] so callers needing extension fields are
/// not limited to what this schema names.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    /// The payload type this header entry describes.
    pub type_name: String,
    /// Provenance keys this update provides, if declared.
    pub artifact_provides: Option<HashMap<String, String>>,
    /// Dependency keys this update requires, if declared.
    pub artifact_depends: Option<HashMap<String, String>>,
    /// Provenance keys this update clears from the device's state, if
    /// declared.
    pub clears_artifact_provides: Option<Vec<String>>,
    /// The full document, for extension fields not named above.
    pub raw: Value,
}

/// Parse a `type-info` document.
///
/// # Errors
///
/// Returns [`ArtefactError::Parse`] if `bytes` is not a JSON object with at
/// least a `type` string field.
pub fn parse_type_info(bytes: &[u8]) -> Result<TypeInfo> {
    let raw: Value = serde_json::from_slice(bytes).map_err(|e| ArtefactError::Parse {
        reason: format!("malformed type-info JSON: {e}"),
    })?;
    let obj = raw.as_object().ok_or_else(|| ArtefactError::Parse {
        reason: "type-info must be a JSON object".to_owned(),
    })?;
    let type_name = match obj.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => "null".to_owned(),
        Some(_) => {
            return Err(ArtefactError::Parse {
                reason: "type-info field 'type' must be a string or null".to_owned(),
            })
        }
        None => {
            return Err(ArtefactError::Parse {
                reason: "type-info missing required field 'type'".to_owned(),
            })
        }
    };
    let artifact_provides = parse_string_map(obj.get("artifact_provides"))?;
    let artifact_depends = parse_string_map(obj.get("artifact_depends"))?;
    let clears_artifact_provides = match obj.get("clears_artifact_provides") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_owned).ok_or_else(|| ArtefactError::Parse {
                        reason: "clears_artifact_provides entries must be strings".to_owned(),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(_) => {
            return Err(ArtefactError::Parse {
                reason: "clears_artifact_provides must be an array of strings".to_owned(),
            })
        }
    };

    Ok(TypeInfo {
        type_name,
        artifact_provides,
        artifact_depends,
        clears_artifact_provides,
        raw,
    })
}

fn parse_string_map(value: Option<&Value>) -> Result<Option<HashMap<String, String>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(obj)) => {
            let mut map = HashMap::with_capacity(obj.len());
            for (k, v) in obj {
                let v = v.as_str().ok_or_else(|| ArtefactError::Parse {
                    reason: format!("expected string value for key {k:?}"),
                })?;
                map.insert(k.clone(), v.to_owned());
            }
            Ok(Some(map))
        }
        Some(_) => Err(ArtefactError::Parse {
            reason: "expected a JSON object of string values".to_owned(),
        }),
    }
}

/// Parse a `meta-data` document.
///
/// An empty body is accepted and treated as [`Value::Null`] (bug-compat
/// with producers that write a zero-byte `meta-data` entry instead of
/// omitting it); any other parse failure, or a non-object top-level value,
/// is rejected.
///
/// # Errors
///
/// Returns [`ArtefactError::Parse`] if `bytes` is non-empty but not valid
/// JSON, or parses to something other than a JSON object.
pub fn parse_meta_data(bytes: &[u8]) -> Result<Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(obj)) => Ok(Value::Object(obj)),
        Ok(other) => Err(ArtefactError::Parse {
            reason: format!("meta-data must be a JSON object, got {other}"),
        }),
        Err(e) if e.is_eof() => Ok(Value::Null),
        Err(e) => Err(ArtefactError::Parse {
            reason: format!("malformed meta-data JSON: {e}"),
        }),
    }
}
