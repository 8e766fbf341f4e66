//! In-memory Logseq graph for tests.
//!
//! Implements [`GraphGateway`] by answering the Editor API methods and the
//! Datalog shapes produced by [`crate::query`] directly from a page/block
//! table. Block references come from [`index_refs`], a hand-written model of
//! Logseq's reference indexer that shares no code with [`crate::content`].

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::{BridgeError, Result};
use crate::gateway::{methods, GraphGateway, LogseqApi};
use crate::query::normalize_page_name;

#[derive(Debug, Clone)]
struct StoredPage {
    id: i64,
    name: String,
    original_name: String,
    journal_day: Option<u32>,
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Clone)]
struct StoredBlock {
    id: i64,
    page_id: i64,
    parent_id: Option<i64>,
    content: String,
    properties: Option<Map<String, Value>>,
}

#[derive(Default)]
pub struct MemoryGraph {
    next_id: i64,
    pages: Vec<StoredPage>,
    blocks: Vec<StoredBlock>,
    overrides: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    fn alloc_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_page(&mut self, name: &str) -> i64 {
        let id = self.alloc_id();
        self.pages.push(StoredPage {
            id,
            name: normalize_page_name(name),
            original_name: name.to_string(),
            journal_day: None,
            properties: None,
        });
        id
    }

    pub fn add_journal(&mut self, name: &str, day: u32) -> i64 {
        let id = self.add_page(name);
        if let Some(page) = self.pages.iter_mut().find(|p| p.id == id) {
            page.journal_day = Some(day);
        }
        id
    }

    pub fn set_page_properties(&mut self, page_id: i64, properties: Value) {
        if let Some(page) = self.pages.iter_mut().find(|p| p.id == page_id) {
            page.properties = properties.as_object().cloned();
        }
    }

    /// Top-level block on `page`; the page must already exist.
    pub fn add_block(&mut self, page: &str, content: &str) -> i64 {
        let page_id = self
            .page_by_name(page)
            .map(|p| p.id)
            .unwrap_or_else(|| panic!("add_block: unknown page {}", page));
        let id = self.alloc_id();
        self.blocks.push(StoredBlock {
            id,
            page_id,
            parent_id: None,
            content: content.to_string(),
            properties: None,
        });
        id
    }

    pub fn add_child_block(&mut self, parent_id: i64, content: &str) -> i64 {
        let page_id = self
            .blocks
            .iter()
            .find(|b| b.id == parent_id)
            .map(|b| b.page_id)
            .unwrap_or_else(|| panic!("add_child_block: unknown parent {}", parent_id));
        let id = self.alloc_id();
        self.blocks.push(StoredBlock {
            id,
            page_id,
            parent_id: Some(parent_id),
            content: content.to_string(),
            properties: None,
        });
        id
    }

    pub fn set_block_properties(&mut self, block_id: i64, properties: Value) {
        if let Some(block) = self.blocks.iter_mut().find(|b| b.id == block_id) {
            block.properties = properties.as_object().cloned();
        }
    }

    /// Answer `method` with a fixed payload.
    pub fn override_method(&self, method: &str, value: Value) {
        self.overrides
            .lock()
            .unwrap()
            .insert(method.to_string(), value);
    }

    /// Make `method` fail with a remote error.
    pub fn fail_method(&self, method: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(method.to_string(), message.to_string());
    }

    /// Number of calls made to `method` so far.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    pub fn into_api(self) -> LogseqApi {
        LogseqApi::new(Arc::new(self))
    }

    pub fn into_shared(self) -> (Arc<MemoryGraph>, LogseqApi) {
        let shared = Arc::new(self);
        let api = LogseqApi::new(shared.clone());
        (shared, api)
    }

    pub fn uuid_of(id: i64) -> String {
        format!("00000000-0000-4000-8000-{:012}", id)
    }

    // ---------------------------------------------------------------
    // lookups
    // ---------------------------------------------------------------

    fn page_by_name(&self, name: &str) -> Option<&StoredPage> {
        let key = normalize_page_name(name);
        self.pages.iter().find(|p| p.name == key)
    }

    fn page_by_id(&self, id: i64) -> Option<&StoredPage> {
        self.pages.iter().find(|p| p.id == id)
    }

    fn refs_of(&self, block: &StoredBlock) -> Vec<i64> {
        let mut ids = Vec::new();
        for name in index_refs(&block.content) {
            if let Some(page) = self.page_by_name(&name) {
                if !ids.contains(&page.id) {
                    ids.push(page.id);
                }
            }
        }
        ids
    }

    fn page_json(&self, page: &StoredPage) -> Value {
        let mut obj = json!({
            "id": page.id,
            "name": page.name,
            "originalName": page.original_name,
            "uuid": Self::uuid_of(page.id),
            "journal?": page.journal_day.is_some(),
        });
        if let Some(day) = page.journal_day {
            obj["journalDay"] = json!(day);
        }
        if let Some(props) = &page.properties {
            obj["properties"] = Value::Object(props.clone());
        }
        obj
    }

    /// Datascript pull spelling (kebab-case keys).
    fn page_pull_json(&self, page: &StoredPage) -> Value {
        let mut obj = json!({
            "id": page.id,
            "name": page.name,
            "original-name": page.original_name,
            "journal?": page.journal_day.is_some(),
        });
        if let Some(day) = page.journal_day {
            obj["journal-day"] = json!(day);
        }
        obj
    }

    fn block_json(&self, block: &StoredBlock, with_children: bool) -> Value {
        let refs: Vec<Value> = self.refs_of(block).into_iter().map(|id| json!({"id": id})).collect();
        let mut obj = json!({
            "id": block.id,
            "uuid": Self::uuid_of(block.id),
            "content": block.content,
            "page": {"id": block.page_id},
            "parent": {"id": block.parent_id.unwrap_or(block.page_id)},
            "refs": refs,
        });
        if let Some(props) = &block.properties {
            obj["properties"] = Value::Object(props.clone());
        }
        if with_children {
            let children: Vec<Value> = self
                .blocks
                .iter()
                .filter(|b| b.parent_id == Some(block.id))
                .map(|b| self.block_json(b, true))
                .collect();
            obj["children"] = json!(children);
        }
        obj
    }

    fn page_tree(&self, page_id: i64) -> Value {
        let top: Vec<Value> = self
            .blocks
            .iter()
            .filter(|b| b.page_id == page_id && b.parent_id.is_none())
            .map(|b| self.block_json(b, true))
            .collect();
        json!(top)
    }

    fn linked_references(&self, page_id: i64) -> Value {
        let mut grouped: Vec<(i64, Vec<Value>)> = Vec::new();
        for block in &self.blocks {
            if block.page_id == page_id || !self.refs_of(block).contains(&page_id) {
                continue;
            }
            match grouped.iter_mut().find(|(pid, _)| *pid == block.page_id) {
                Some((_, blocks)) => blocks.push(self.block_json(block, false)),
                None => grouped.push((block.page_id, vec![self.block_json(block, false)])),
            }
        }
        grouped.sort_by_key(|(pid, _)| *pid);
        Value::Array(
            grouped
                .into_iter()
                .filter_map(|(pid, blocks)| {
                    self.page_by_id(pid)
                        .map(|p| json!([self.page_json(p), blocks]))
                })
                .collect(),
        )
    }

    /// `(source, connected, rel)` link rows for one page, deduplicated.
    fn link_rows(&self, source: i64) -> BTreeSet<(i64, i64, &'static str)> {
        let mut rows = BTreeSet::new();
        for block in &self.blocks {
            let refs = self.refs_of(block);
            if block.page_id == source {
                for target in refs.iter().copied().filter(|t| *t != source) {
                    rows.insert((source, target, "outbound"));
                }
            } else if refs.contains(&source) {
                rows.insert((source, block.page_id, "inbound"));
            }
        }
        rows
    }

    fn answer_query(&self, query: &str) -> Result<Value> {
        let name_re = Regex::new(r#":block/name "((?:[^"\\]|\\.)*)""#).unwrap();
        let queried_name = name_re
            .captures(query)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replace("\\\"", "\"").replace("\\\\", "\\"));

        if query.contains("(contains? #{") {
            let bound = query.find("[?source :block/name]");
            let predicate = query.find("[(contains?");
            if !matches!((bound, predicate), (Some(b), Some(p)) if b < p) {
                return Err(BridgeError::Remote(
                    "Insufficient bindings: none of #{?source} is bound in (contains? ...)".to_string(),
                ));
            }
            let ids_re = Regex::new(r"#\{([0-9 ]*)\}").unwrap();
            let ids: Vec<i64> = ids_re
                .captures(query)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().split_whitespace().filter_map(|s| s.parse().ok()).collect())
                .unwrap_or_default();
            let mut rows = Vec::new();
            for id in ids {
                for (source, connected, rel) in self.link_rows(id) {
                    if let Some(page) = self.page_by_id(connected) {
                        rows.push(json!([source, self.page_pull_json(page), rel]));
                    }
                }
            }
            return Ok(json!(rows));
        }

        if query.contains("(pull ?source [*]) (pull ?connected") {
            let Some(root) = queried_name.as_deref().and_then(|n| self.page_by_name(n)) else {
                return Ok(json!([]));
            };
            let rows: Vec<Value> = self
                .link_rows(root.id)
                .into_iter()
                .filter_map(|(_, connected, rel)| {
                    self.page_by_id(connected).map(|p| {
                        json!([self.page_pull_json(root), self.page_pull_json(p), rel])
                    })
                })
                .collect();
            return Ok(json!(rows));
        }

        if query.contains(":block/journal-day ?d") {
            let bound = |op: &str| -> Option<u32> {
                let re = Regex::new(&format!(r"\({} \?d ([0-9]+)\)", regex::escape(op))).ok()?;
                re.captures(query)?.get(1)?.as_str().parse().ok()
            };
            let start = bound(">=").unwrap_or(0);
            let end = bound("<=").unwrap_or(u32::MAX);
            let rows: Vec<Value> = self
                .pages
                .iter()
                .filter(|p| matches!(p.journal_day, Some(d) if d >= start && d <= end))
                .map(|p| json!([self.page_pull_json(p)]))
                .collect();
            return Ok(json!(rows));
        }

        if query.contains("[?b :block/page ?p]") {
            let Some(page) = queried_name.as_deref().and_then(|n| self.page_by_name(n)) else {
                return Ok(json!([]));
            };
            let rows: Vec<Value> = self
                .blocks
                .iter()
                .filter(|b| b.page_id == page.id)
                .map(|b| json!([self.block_json(b, false)]))
                .collect();
            return Ok(json!(rows));
        }

        if query.contains("clojure.string/includes? ?lc") {
            let needle_re = Regex::new(r#"includes\? \?lc "((?:[^"\\]|\\.)*)""#).unwrap();
            let needle = needle_re
                .captures(query)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().replace("\\\"", "\""))
                .unwrap_or_default();
            let rows: Vec<Value> = self
                .blocks
                .iter()
                .filter(|b| b.content.to_lowercase().contains(&needle))
                .map(|b| json!([self.block_json(b, false)]))
                .collect();
            return Ok(json!(rows));
        }

        if query.contains(":block/properties") {
            let key_re = Regex::new(r"\(get \?props :([^)\s]+)\)").unwrap();
            let value_re = Regex::new(r#"includes\? \?lvs "((?:[^"\\]|\\.)*)""#).unwrap();
            let key = key_re
                .captures(query)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let value = value_re
                .captures(query)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            let rows: Vec<Value> = self
                .blocks
                .iter()
                .filter(|b| {
                    let Some(v) = b.properties.as_ref().and_then(|p| p.get(&key)) else {
                        return false;
                    };
                    let text = match v {
                        Value::String(s) => s.to_lowercase(),
                        other => other.to_string().to_lowercase(),
                    };
                    value.as_deref().map_or(true, |needle| text.contains(needle))
                })
                .map(|b| json!([self.block_json(b, false)]))
                .collect();
            return Ok(json!(rows));
        }

        if query.contains("[?p :block/name") {
            let rows: Vec<Value> = queried_name
                .as_deref()
                .and_then(|n| self.page_by_name(n))
                .map(|p| vec![json!([self.page_pull_json(p)])])
                .unwrap_or_default();
            return Ok(json!(rows));
        }

        Err(BridgeError::Remote(format!("unsupported query: {}", query)))
    }
}

#[async_trait]
impl GraphGateway for MemoryGraph {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.calls.lock().unwrap().push(method.to_string());

        if let Some(message) = self.failures.lock().unwrap().get(method) {
            return Err(BridgeError::Remote(message.clone()));
        }
        if let Some(value) = self.overrides.lock().unwrap().get(method) {
            return Ok(value.clone());
        }

        let arg0 = args.first().and_then(|v| v.as_str()).unwrap_or_default();
        if method == methods::GET_PAGE {
            if let Some(id) = args.first().and_then(|v| v.as_i64()) {
                // getPage pulls any entity by id, blocks included
                if let Some(page) = self.page_by_id(id) {
                    return Ok(self.page_json(page));
                }
                return Ok(self
                    .blocks
                    .iter()
                    .find(|b| b.id == id)
                    .map(|b| self.block_json(b, false))
                    .unwrap_or(Value::Null));
            }
        }
        match method {
            methods::GET_PAGE => Ok(self
                .page_by_name(arg0)
                .map(|p| self.page_json(p))
                .unwrap_or(Value::Null)),
            methods::GET_PAGE_BLOCKS_TREE => Ok(self
                .page_by_name(arg0)
                .map(|p| self.page_tree(p.id))
                .unwrap_or(Value::Null)),
            methods::GET_PAGE_LINKED_REFERENCES => Ok(self
                .page_by_name(arg0)
                .map(|p| self.linked_references(p.id))
                .unwrap_or(Value::Null)),
            methods::GET_BLOCK => Ok(self
                .blocks
                .iter()
                .find(|b| Self::uuid_of(b.id) == arg0)
                .map(|b| self.block_json(b, true))
                .unwrap_or(Value::Null)),
            methods::DATASCRIPT_QUERY => self.answer_query(arg0),
            methods::GET_CURRENT_GRAPH => Ok(json!({"name": "test-graph", "path": "/tmp/test-graph"})),
            other => Err(BridgeError::Remote(format!("MethodNotExist: {}", other))),
        }
    }
}

/// Reference names in `content` as Logseq indexes them: `[[links]]`,
/// `#[[links]]`, `#tags` (trailing `.`/`:` dropped), and the values of
/// `tags::` / `alias::` lines. Text inside backticks is skipped.
fn index_refs(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in content.lines() {
        if let Some((key, value)) = line.trim_start().split_once("::") {
            let key = key.trim().to_lowercase();
            if key == "tags" || key == "alias" {
                for item in value.split(',') {
                    let item = item
                        .trim()
                        .trim_start_matches('#')
                        .trim_start_matches("[[")
                        .trim_end_matches("]]")
                        .trim();
                    if !item.is_empty() {
                        names.push(item.to_string());
                    }
                }
                continue;
            }
        }

        let chars: Vec<char> = line.chars().collect();
        let mut in_code = false;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '`' {
                in_code = !in_code;
                i += 1;
                continue;
            }
            if in_code {
                i += 1;
                continue;
            }
            if c == '[' && chars.get(i + 1) == Some(&'[') {
                let close = (i + 2..chars.len().saturating_sub(1))
                    .find(|&j| chars[j] == ']' && chars[j + 1] == ']');
                if let Some(end) = close {
                    let name: String = chars[i + 2..end].iter().collect();
                    if !name.trim().is_empty() {
                        names.push(name.trim().to_string());
                    }
                    i = end + 2;
                    continue;
                }
            }
            if c == '#' && (i == 0 || chars[i - 1].is_whitespace()) && chars.get(i + 1) != Some(&'[') {
                let mut j = i + 1;
                while j < chars.len() && !chars[j].is_whitespace() && !",;!?()[]\"#`".contains(chars[j]) {
                    j += 1;
                }
                let tag: String = chars[i + 1..j].iter().collect();
                let tag = tag.trim_end_matches(|c| c == '.' || c == ':');
                if !tag.is_empty() {
                    names.push(tag.to_string());
                }
                i = j;
                continue;
            }
            i += 1;
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_refs() {
        assert_eq!(
            index_refs("see [[A]] and #b.\ntags:: c, [[D]]\n`[[not]]` #v1.0"),
            vec!["A", "b", "c", "D", "v1.0"]
        );
    }
}
