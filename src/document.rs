use crate::error::EngineError;
use crate::event::EventHandler;
use crate::node::NodeKind;
use crate::tree::{NodeId, Tree};
use crate::value::{Map, Value};
use anyhow::{Context, Result};
use std::fs;

/// Keys holding child element lists.
const CHILD_KEYS: [&str; 2] = ["pages", "elements"];

/// Builds a tree from a document value. The top-level map is the root.
pub fn from_value(document: &Value) -> Result<(Tree, NodeId), EngineError> {
    let root = document
        .as_map()
        .ok_or_else(|| EngineError::InvalidDocument("document is not a dictionary".to_string()))?;
    let mut tree = Tree::new();
    let id = insert_element(&mut tree, None, root)?;
    Ok((tree, id))
}

pub fn from_str(json: &str) -> Result<(Tree, NodeId), EngineError> {
    let document: Value = serde_json::from_str(json)?;
    from_value(&document)
}

pub fn load(path: &str) -> Result<(Tree, NodeId)> {
    let data =
        fs::read_to_string(path).with_context(|| format!("Failed to read document: {}", path))?;
    let loaded = from_str(&data).with_context(|| format!("Failed to parse document: {}", path))?;
    Ok(loaded)
}

fn insert_element(
    tree: &mut Tree,
    parent: Option<NodeId>,
    info: &Map,
) -> Result<NodeId, EngineError> {
    let events = info
        .get("events")
        .map(EventHandler::parse)
        .unwrap_or_default();
    let name = info.get("id").and_then(Value::as_str).map(str::to_string);
    let fields: Map = info
        .iter()
        .filter(|(k, _)| k.as_str() != "events" && !CHILD_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let id = tree.insert(parent, name, events, NodeKind::Element(fields));

    for key in CHILD_KEYS {
        let Some(children) = info.get(key) else {
            continue;
        };
        let children = children
            .as_list()
            .ok_or_else(|| EngineError::InvalidDocument(format!("{key} must be a list")))?;
        for child in children {
            let child = child.as_map().ok_or_else(|| {
                EngineError::InvalidDocument(format!("{key} entries must be dictionaries"))
            })?;
            insert_element(tree, Some(id), child)?;
        }
    }
    Ok(id)
}
