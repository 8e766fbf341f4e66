//! Payload types returned by the Logseq API.
//!
//! The Editor API answers with camel-case keys (`originalName`, `journalDay`)
//! while Datascript pulls answer with kebab-case attribute names
//! (`original-name`, `journal-day`, `journal?`). Both spellings deserialize
//! into the same canonical field here, so no consumer ever looks at raw keys.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A named node in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: i64,
    /// Lower-cased unique name (the lookup key).
    pub name: String,
    #[serde(default, alias = "original-name", skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, alias = "journal?", deserialize_with = "null_as_default")]
    pub journal: bool,
    /// YYYYMMDD key of a journal page
    #[serde(default, alias = "journal-day", skip_serializing_if = "Option::is_none")]
    pub journal_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

impl Page {
    /// Name with its original casing, falling back to the lookup key.
    pub fn display_name(&self) -> &str {
        self.original_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn is_journal(&self) -> bool {
        self.journal || self.journal_day.is_some()
    }
}

/// Reference to another entity by database id (`{"id": 12}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
}

/// A content fragment attached to a page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityRef>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BlockChild>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<EntityRef>,
    #[serde(default, alias = "created-at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, alias = "updated-at", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Child entry of a block: a nested block when the tree was requested,
/// otherwise a `["uuid", "..."]` stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockChild {
    Block(Box<Block>),
    Stub(Value),
}

/// A page that links to some target, with the blocks that carry the links.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backlink {
    pub page: Page,
    pub blocks: Vec<Block>,
}

impl<'de> Deserialize<'de> for Backlink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Wire shape is a two-element array: [page, [blocks...]]
        let (page, blocks): (Page, Option<Vec<Block>>) = Deserialize::deserialize(deserializer)?;
        Ok(Backlink {
            page,
            blocks: blocks.unwrap_or_default(),
        })
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Flatten a block tree into pre-order (document order).
pub fn flatten_blocks(blocks: &[Block]) -> Vec<Block> {
    let mut out = Vec::new();
    for block in blocks {
        push_flat(block, &mut out);
    }
    out
}

fn push_flat(block: &Block, out: &mut Vec<Block>) {
    let mut flat = block.clone();
    flat.children = Vec::new();
    out.push(flat);
    for child in &block.children {
        if let BlockChild::Block(child) = child {
            push_flat(child, out);
        }
    }
}
