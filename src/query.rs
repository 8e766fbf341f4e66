//! Datalog query composition for `logseq.DB.datascriptQuery`.
//!
//! Every builder is a pure function of its inputs. Page names always pass
//! through [`normalize_page_name`] before they are embedded, because
//! `:block/name` stores the lower-cased name.

/// Lookup key for a page name: trimmed and lower-cased.
pub fn normalize_page_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Escape a string for embedding inside an EDN string literal.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn name_literal(name: &str) -> String {
    format!("\"{}\"", escape_string(&normalize_page_name(name)))
}

/// Outbound/inbound disjunction shared by the network queries.
/// Binds `?connected` and `?rel` for a bound `?source`.
const LINK_CLAUSE: &str = r#"(or-join [?source ?connected ?rel]
   (and [?b :block/page ?source]
        [?b :block/refs ?connected]
        [?connected :block/name]
        [(!= ?connected ?source)]
        [(ground "outbound") ?rel])
   (and [?b :block/refs ?source]
        [?b :block/page ?connected]
        [?connected :block/name]
        [(!= ?connected ?source)]
        [(ground "inbound") ?rel]))"#;

/// Pull pattern for pages discovered through links.
const PAGE_PULL: &str = "[:db/id :block/name :block/original-name :block/journal? :block/journal-day]";

/// `[[page]]` rows for the page with the given name.
pub fn page_by_name(name: &str) -> String {
    format!(
        "[:find (pull ?p [*]) :where [?p :block/name {}]]",
        name_literal(name)
    )
}

/// `[[block]]` rows for every block on the named page.
pub fn blocks_of_page(name: &str) -> String {
    format!(
        "[:find (pull ?b [*]) :where [?p :block/name {}] [?b :block/page ?p]]",
        name_literal(name)
    )
}

/// Root page with its direct neighbours.
///
/// With `max_hops == 0` this is [`page_by_name`]. Otherwise rows are
/// `[root, connected, "outbound" | "inbound"]`.
pub fn concept_network(name: &str, max_hops: usize) -> String {
    if max_hops == 0 {
        return page_by_name(name);
    }
    format!(
        "[:find (pull ?source [*]) (pull ?connected {}) ?rel\n :where [?source :block/name {}]\n {}]",
        PAGE_PULL,
        name_literal(name),
        LINK_CLAUSE
    )
}

/// Neighbours of a set of already-discovered pages, one hop out.
///
/// `?source` is bound to page entities before the `contains?` predicate
/// runs; Datascript rejects predicates over unbound variables.
/// Rows are `[source-id, connected, "outbound" | "inbound"]`.
pub fn connected_pages(ids: &[i64]) -> String {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let set = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "[:find ?source (pull ?connected {}) ?rel\n :where [?source :block/name]\n [(contains? #{{{}}} ?source)]\n {}]",
        PAGE_PULL, set, LINK_CLAUSE
    )
}

/// Blocks whose content contains `text`, case-insensitively.
pub fn blocks_containing(text: &str) -> String {
    format!(
        "[:find (pull ?b [*]) :where [?b :block/content ?c] [(clojure.string/lower-case ?c) ?lc] [(clojure.string/includes? ?lc \"{}\")]]",
        escape_string(&text.to_lowercase())
    )
}

/// Blocks carrying property `key`, optionally with a value containing `value`.
pub fn blocks_with_property(key: &str, value: Option<&str>) -> String {
    let key = key.trim().trim_start_matches(':').to_lowercase();
    match value {
        Some(value) => format!(
            "[:find (pull ?b [*]) :where [?b :block/properties ?props] [(get ?props :{}) ?v] [(str ?v) ?vs] [(clojure.string/lower-case ?vs) ?lvs] [(clojure.string/includes? ?lvs \"{}\")]]",
            key,
            escape_string(&value.to_lowercase())
        ),
        None => format!(
            "[:find (pull ?b [*]) :where [?b :block/properties ?props] [(get ?props :{}) ?v]]",
            key
        ),
    }
}

/// Journal pages whose date key lies in `[start, end]`.
pub fn journals_between(start: u32, end: u32) -> String {
    format!(
        "[:find (pull ?p [*]) :where [?p :block/journal-day ?d] [(>= ?d {})] [(<= ?d {})]]",
        start, end
    )
}
