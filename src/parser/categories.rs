use std::sync::LazyLock;

use regex::Regex;

use crate::db::CategoryRow;

static NODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^|\[]*?)\s*\[\s*(\d+)\s*\]").unwrap());

/// One `name[id]` element of a category path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub name: Option<String>,
    pub id: i64,
}

/// Tokenize `name1[id1]|name2[id2]|...`, outermost category first.
///
/// Returns `None` when the line holds no `name[id]` element at all.
pub fn parse_path(line: &str) -> Option<Vec<CategoryNode>> {
    let nodes: Vec<CategoryNode> = NODE_RE
        .captures_iter(line)
        .filter_map(|caps| {
            let id = caps[2].parse::<i64>().ok()?;
            let name = caps[1].trim();
            Some(CategoryNode {
                name: (!name.is_empty()).then(|| name.to_string()),
                id,
            })
        })
        .collect();
    if nodes.is_empty() {
        None
    } else {
        Some(nodes)
    }
}

/// Category rows for one path: the root has no parent, every later node
/// points at the node right before it.
pub fn link_parents(path: &[CategoryNode]) -> Vec<CategoryRow> {
    path.iter()
        .enumerate()
        .map(|(i, node)| CategoryRow {
            id: node.id,
            name: node.name.clone(),
            parent_id: i.checked_sub(1).map(|p| path[p].id),
        })
        .collect()
}

// ── Tests ──
