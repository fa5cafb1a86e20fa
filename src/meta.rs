use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{ProtectionFlags, PROTECTION_KEYWORDS};
use crate::error::{Error, Result};
use crate::types::{ChunkAddr, ChunkType, Index, NONE};

/// Neighbour pointers of one chain node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Links {
    /// Previous node, 0 for the head
    pub last: Index,
    /// Next node, 0 for the tail
    pub next: Index,
}

impl Links {
    pub const fn new(last: Index, next: Index) -> Self {
        Links { last, next }
    }
}

/// Record stored as one node of a chain
pub trait ChainNode: Serialize + DeserializeOwned {
    fn links(&self) -> Links;

    fn set_links(&mut self, links: Links);

    /// Well-formedness check run on every decoded node
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate the text stored at `addr`
    fn decode(addr: ChunkAddr, text: &str) -> Result<Self> {
        let node: Self = serde_json::from_str(text).map_err(|e| Error::CorruptMetadata {
            addr,
            reason: e.to_string(),
        })?;
        node.validate()
            .map_err(|reason| Error::CorruptMetadata { addr, reason })?;
        Ok(node)
    }
}

/// Metadata of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMeta {
    pub title: String,
    pub last_index: Index,
    pub next_index: Index,
    /// Raw protection flag string, absent when unprotected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<String>,
}

impl TableMeta {
    pub fn new(title: impl Into<String>) -> Self {
        TableMeta {
            title: title.into(),
            last_index: NONE,
            next_index: NONE,
            protection: None,
        }
    }
}

impl ChainNode for TableMeta {
    fn links(&self) -> Links {
        Links::new(self.last_index, self.next_index)
    }

    fn set_links(&mut self, links: Links) {
        self.last_index = links.last;
        self.next_index = links.next;
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.title.is_empty() {
            return Err("table metadata has an empty title".into());
        }
        Ok(())
    }
}

/// One row of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRecord {
    pub last_index: Index,
    pub next_index: Index,
    /// User content, always carrying `id`
    pub content: Map<String, Value>,
}

impl RowRecord {
    /// Build a row whose content is stamped with `id`
    pub fn new(id: Index, content: Map<String, Value>) -> Self {
        RowRecord {
            last_index: NONE,
            next_index: NONE,
            content: stamp_id(id, content),
        }
    }

    /// Content rendered as a JSON object
    pub fn content_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.content)?)
    }
}

impl ChainNode for RowRecord {
    fn links(&self) -> Links {
        Links::new(self.last_index, self.next_index)
    }

    fn set_links(&mut self, links: Links) {
        self.last_index = links.last;
        self.next_index = links.next;
    }
}

/// Put `id` first in a row's content, replacing any caller-supplied id
pub fn stamp_id(id: Index, content: Map<String, Value>) -> Map<String, Value> {
    let mut stamped = Map::with_capacity(content.len() + 1);
    stamped.insert("id".to_string(), Value::from(id));
    for (key, value) in content {
        if key != "id" {
            stamped.insert(key, value);
        }
    }
    stamped
}

/// Metadata of one uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub title: String,
    pub mime: String,
    pub last_index: Index,
    pub next_index: Index,
}

impl ChainNode for FileMeta {
    fn links(&self) -> Links {
        Links::new(self.last_index, self.next_index)
    }

    fn set_links(&mut self, links: Links) {
        self.last_index = links.last;
        self.next_index = links.next;
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.title.is_empty() {
            return Err("file metadata has an empty title".into());
        }
        Ok(())
    }
}

/// A recyclable index, stored as the content of a free-chunk table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeChunkDescriptor {
    pub chunk_index: Index,
    pub chunk_type: ChunkType,
    pub parent_table_index: Index,
    pub coordinate_space: String,
}

impl FreeChunkDescriptor {
    pub fn to_content(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Json(serde::ser::Error::custom(format!(
                "descriptor serialized to {} instead of an object",
                other
            )))),
        }
    }

    /// Read a descriptor back out of row content, ignoring the row id
    pub fn from_content(content: &Map<String, Value>) -> Result<Self> {
        let mut fields = content.clone();
        fields.remove("id");
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// Parse a comma separated protection flag string
///
/// Keywords must be known, non-empty and unique.
pub fn parse_protection(text: &str) -> Result<ProtectionFlags> {
    let mut flags = ProtectionFlags::empty();

    for word in text.split(',').map(str::trim) {
        if word.is_empty() {
            return Err(Error::InvalidProtectionFlags(format!(
                "empty keyword in \"{}\"",
                text
            )));
        }
        let flag = PROTECTION_KEYWORDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(word))
            .map(|(_, flag)| *flag)
            .ok_or_else(|| Error::InvalidProtectionFlags(format!("unknown keyword \"{}\"", word)))?;
        if flags.contains(flag) {
            return Err(Error::InvalidProtectionFlags(format!(
                "keyword \"{}\" given twice",
                word
            )));
        }
        flags |= flag;
    }

    Ok(flags)
}

/// Canonical text form of a set of protection flags
pub fn render_protection(flags: ProtectionFlags) -> String {
    PROTECTION_KEYWORDS
        .iter()
        .filter(|(_, flag)| flags.contains(*flag))
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(",")
}

/// Exact equality between one field's textual value and `target`
pub fn meets_condition(content: &Map<String, Value>, key: &str, target: &str) -> bool {
    match content.get(key) {
        Some(Value::String(text)) => text == target,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_protection_round_trip() {
        let flags = parse_protection("drop, read,update").unwrap();
        assert!(flags.contains(ProtectionFlags::READ | ProtectionFlags::DROP));
        assert_eq!(render_protection(flags), "read,update,drop");
    }

    #[test]
    fn test_protection_rejects_bad_syntax() {
        for bad in ["", "read,", "read,read", "write", "read,,drop"] {
            assert!(
                matches!(parse_protection(bad), Err(Error::InvalidProtectionFlags(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_condition_is_exact_text_equality() {
        let row = object(json!({"id": 1, "v": 2, "name": "Ann", "ok": true}));
        assert!(meets_condition(&row, "v", "2"));
        assert!(!meets_condition(&row, "v", "02"));
        assert!(meets_condition(&row, "name", "Ann"));
        assert!(!meets_condition(&row, "name", "ann"));
        assert!(meets_condition(&row, "ok", "true"));
        assert!(!meets_condition(&row, "missing", ""));
    }

    #[test]
    fn test_stamp_id_goes_first_and_overrides() {
        let row = RowRecord::new(4, object(json!({"v": 1, "id": 99})));
        assert_eq!(row.content_json().unwrap(), r#"{"id":4,"v":1}"#);
    }

    #[test]
    fn test_table_meta_without_protection_omits_field() {
        let meta = TableMeta::new("t");
        assert_eq!(
            meta.encode().unwrap(),
            r#"{"title":"t","lastIndex":0,"nextIndex":0}"#
        );
        let addr = ChunkAddr::new(0, 2);
        assert_eq!(TableMeta::decode(addr, &meta.encode().unwrap()).unwrap(), meta);
        assert!(matches!(
            TableMeta::decode(addr, r#"{"title":"","lastIndex":0,"nextIndex":0}"#),
            Err(Error::CorruptMetadata { .. })
        ));
    }

    #[test]
    fn test_descriptor_survives_row_stamping() {
        let descriptor = FreeChunkDescriptor {
            chunk_index: 3,
            chunk_type: ChunkType::Row,
            parent_table_index: 2,
            coordinate_space: "row_table_2".into(),
        };
        let row = RowRecord::new(9, descriptor.to_content().unwrap());
        assert_eq!(FreeChunkDescriptor::from_content(&row.content).unwrap(), descriptor);
    }
}
