use crate::node::{Lookup, NodeKind};
use crate::tree::{NodeId, Tree};
use crate::value::{Map, Value};

/// Walks `path` through `base` from the `"params"` key. A string names the leaf;
/// a map descends one level under its first key.
pub fn walk_params(base: &Map, path: &Map) -> Option<Value> {
    let mut item = base;
    let mut path = path;
    let mut property = "params";

    loop {
        match path.get(property)? {
            Value::Str(next) => return item.get(property)?.as_map()?.get(next).cloned(),
            Value::Map(next) => {
                item = item.get(property)?.as_map()?;
                path = next;
                property = next.keys().next().map(String::as_str)?;
            }
            _ => return None,
        }
    }
}

impl Tree {
    /// `"search": "children"` searches down, anything else up. With `"id"`, only
    /// the node carrying that name answers.
    pub fn get_value(&self, node: NodeId, originator: NodeId, info: &Map) -> Option<Value> {
        let current = self.get(node)?;
        let up = info.get("search").and_then(Value::as_str) != Some("children");
        let here = match info.get("id").and_then(Value::as_str) {
            Some(id) => current.name.as_deref() == Some(id),
            None => true,
        };

        match info.get("property") {
            Some(Value::Str(property)) if here => {
                return self.get_property_value(node, originator, property);
            }
            Some(Value::Map(properties)) if here => {
                return self.get_properties_value(node, originator, properties);
            }
            _ => {}
        }

        if up {
            let parent = self.parent(node)?;
            self.get_value(parent, originator, info)
        } else {
            current
                .children
                .iter()
                .find_map(|child| self.get_value(*child, originator, info))
        }
    }

    pub fn get_property_value(
        &self,
        node: NodeId,
        originator: NodeId,
        property: &str,
    ) -> Option<Value> {
        let current = self.get(node)?;
        if let Some(Lookup::Resolved(value)) = current
            .behavior
            .as_ref()
            .map(|b| b.property(originator, property))
        {
            return value;
        }
        if let Some(value) = current.fields().and_then(|f| f.get(property)) {
            return Some(value.clone());
        }
        let parent = self.parent(node)?;
        self.get_property_value(parent, originator, property)
    }

    pub fn get_properties_value(
        &self,
        node: NodeId,
        originator: NodeId,
        info: &Map,
    ) -> Option<Value> {
        let current = self.get(node)?;
        if let Some(Lookup::Resolved(value)) = current
            .behavior
            .as_ref()
            .map(|b| b.properties(originator, info))
        {
            return value;
        }
        if let NodeKind::Request(request) = &current.kind {
            // Requests answer for themselves and never delegate.
            if info.keys().next().map(String::as_str) != Some("params") {
                return None;
            }
            let (Some(_params), Some(data)) = (&request.params, &request.data) else {
                return None;
            };
            let base = Map::from([("params".to_string(), Value::Map(data.clone()))]);
            return walk_params(&base, info);
        }
        let parent = self.parent(node)?;
        self.get_properties_value(parent, originator, info)
    }

    /// Replaces every top-level `{"valueOf": {...}}` entry with its resolved
    /// value, or `""` when nothing resolves.
    pub fn evaluate(&self, node: NodeId, info: &Map) -> Map {
        info.iter()
            .map(|(key, value)| {
                let resolved = match value.get("valueOf").and_then(Value::as_map) {
                    Some(reference) => self
                        .get_value(node, node, reference)
                        .unwrap_or_else(|| Value::Str(String::new())),
                    None => value.clone(),
                };
                (key.clone(), resolved)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Verb;
    use crate::event::EventHandler;
    use crate::node::{NodeBehavior, RequestState};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn map(json: serde_json::Value) -> Map {
        Value::from(json).as_map().cloned().unwrap_or_default()
    }

    fn element(tree: &mut Tree, parent: Option<NodeId>, fields: serde_json::Value) -> NodeId {
        tree.insert(
            parent,
            None,
            EventHandler::default(),
            NodeKind::Element(map(fields)),
        )
    }

    #[test]
    fn walk_reaches_nested_leaf() {
        let base = map(json!({"params": {"user": {"name": "Ann"}}}));
        let path = map(json!({"params": {"user": "name"}}));
        assert_eq!(walk_params(&base, &path), Some(Value::from("Ann")));

        let missing = map(json!({"params": {"user": "age"}}));
        assert_eq!(walk_params(&base, &missing), None);
    }

    #[test]
    fn walk_stops_on_type_mismatch() {
        let base = map(json!({"params": {"user": "Ann"}}));
        assert_eq!(walk_params(&base, &map(json!({"params": {"user": "name"}}))), None);
        assert_eq!(walk_params(&base, &map(json!({"params": 3}))), None);
        assert_eq!(walk_params(&base, &map(json!({"params": {}}))), None);
    }

    #[test]
    fn upward_search_reaches_ancestor() {
        let mut tree = Tree::new();
        let root = element(&mut tree, None, json!({"foo": "bar"}));
        let page = element(&mut tree, Some(root), json!({}));
        let leaf = element(&mut tree, Some(page), json!({}));

        let info = map(json!({"property": "foo"}));
        assert_eq!(tree.get_value(leaf, leaf, &info), Some(Value::from("bar")));
        let missing = map(json!({"property": "nope"}));
        assert_eq!(tree.get_value(leaf, leaf, &missing), None);
    }

    #[test]
    fn nearest_ancestor_wins() {
        let mut tree = Tree::new();
        let root = element(&mut tree, None, json!({"foo": 1}));
        let page = element(&mut tree, Some(root), json!({"foo": 2}));
        let leaf = element(&mut tree, Some(page), json!({}));
        let info = map(json!({"property": "foo"}));
        assert_eq!(tree.get_value(leaf, leaf, &info), Some(Value::Int(2)));
    }

    #[test]
    fn evaluate_substitutes_value_of() {
        let mut tree = Tree::new();
        let root = element(&mut tree, None, json!({"foo": "V"}));
        let leaf = element(&mut tree, Some(root), json!({}));

        let info = map(json!({
            "x": {"valueOf": {"property": "foo"}},
            "y": {"valueOf": {"property": "absent"}},
            "z": 5,
            "w": {"plain": true}
        }));
        let out = tree.evaluate(leaf, &info);
        assert_eq!(out.get("x"), Some(&Value::from("V")));
        assert_eq!(out.get("y"), Some(&Value::from("")));
        assert_eq!(out.get("z"), Some(&Value::Int(5)));
        assert_eq!(out.get("w"), info.get("w"));
    }

    #[derive(Debug)]
    struct Fixed(&'static str);

    impl NodeBehavior for Fixed {
        fn property(&self, _originator: NodeId, name: &str) -> Lookup {
            if name == "label" {
                Lookup::Resolved(Some(Value::from(self.0)))
            } else {
                Lookup::Delegate
            }
        }
    }

    #[test]
    fn behavior_overrides_property_lookup() {
        let mut tree = Tree::new();
        let root = element(&mut tree, None, json!({"label": "root"}));
        let page = element(&mut tree, Some(root), json!({}));
        tree.set_behavior(page, Box::new(Fixed("page")));

        let label = map(json!({"property": "label"}));
        assert_eq!(tree.get_value(page, page, &label), Some(Value::from("page")));
        let foo = map(json!({"property": "label", "id": "elsewhere"}));
        assert_eq!(tree.get_value(page, page, &foo), None);
    }

    #[derive(Debug, Default)]
    struct Recorder {
        seen: Rc<RefCell<Vec<NodeId>>>,
    }

    impl NodeBehavior for Recorder {
        fn property(&self, originator: NodeId, _name: &str) -> Lookup {
            self.seen.borrow_mut().push(originator);
            Lookup::Resolved(Some(Value::from("recorded")))
        }

        fn properties(&self, originator: NodeId, _info: &Map) -> Lookup {
            self.seen.borrow_mut().push(originator);
            Lookup::Resolved(Some(Value::from("recorded")))
        }
    }

    #[test]
    fn originator_reaches_overrides_unchanged() {
        let mut tree = Tree::new();
        let root = element(&mut tree, None, json!({}));
        let page = element(&mut tree, Some(root), json!({}));
        let leaf = element(&mut tree, Some(page), json!({}));
        let slot = named(&mut tree, leaf, "slot", json!({}));

        let above = Recorder::default();
        let above_seen = above.seen.clone();
        tree.set_behavior(root, Box::new(above));
        let below = Recorder::default();
        let below_seen = below.seen.clone();
        tree.set_behavior(slot, Box::new(below));

        let label = map(json!({"property": "label"}));
        assert_eq!(tree.get_value(page, leaf, &label), Some(Value::from("recorded")));
        assert_eq!(*above_seen.borrow(), vec![leaf]);

        let params = map(json!({"property": {"params": "k"}}));
        assert_eq!(tree.get_value(leaf, leaf, &params), Some(Value::from("recorded")));
        assert_eq!(*above_seen.borrow(), vec![leaf, leaf]);

        let down = map(json!({"id": "slot", "property": "label", "search": "children"}));
        assert_eq!(tree.get_value(page, page, &down), Some(Value::from("recorded")));
        assert_eq!(*below_seen.borrow(), vec![page]);
        let down = map(json!({"id": "slot", "property": {"params": "k"}, "search": "children"}));
        assert_eq!(tree.get_value(root, leaf, &down), Some(Value::from("recorded")));
        assert_eq!(*below_seen.borrow(), vec![page, leaf]);
        assert_eq!(*above_seen.borrow(), vec![leaf, leaf]);
    }

    fn named(tree: &mut Tree, parent: NodeId, name: &str, fields: serde_json::Value) -> NodeId {
        tree.insert(
            Some(parent),
            Some(name.to_string()),
            EventHandler::default(),
            NodeKind::Element(map(fields)),
        )
    }

    #[test]
    fn downward_search_returns_first_child_in_order() {
        let mut tree = Tree::new();
        let root = element(&mut tree, None, json!({}));
        let a = named(&mut tree, root, "a", json!({}));
        let b = named(&mut tree, root, "title", json!({"text": "first"}));
        named(&mut tree, a, "title", json!({"text": "nested"}));
        named(&mut tree, b, "title", json!({"text": "deeper"}));

        // `a` is declared first, so its descendant wins over the later sibling.
        let info = map(json!({"id": "title", "property": "text", "search": "children"}));
        assert_eq!(tree.get_value(root, root, &info), Some(Value::from("nested")));

        let absent = map(json!({"id": "caption", "property": "text", "search": "children"}));
        assert_eq!(tree.get_value(root, root, &absent), None);
    }

    #[test]
    fn named_upward_search_skips_other_ancestors() {
        let mut tree = Tree::new();
        let root = tree.insert(
            None,
            Some("book".to_string()),
            EventHandler::default(),
            NodeKind::Element(map(json!({"title": "Book"}))),
        );
        let page = named(&mut tree, root, "page", json!({"title": "Page"}));
        let leaf = named(&mut tree, page, "leaf", json!({}));

        let info = map(json!({"id": "book", "property": "title"}));
        assert_eq!(tree.get_value(leaf, leaf, &info), Some(Value::from("Book")));
    }

    #[test]
    fn request_nodes_expose_params_path() {
        let mut tree = Tree::new();
        let root = element(&mut tree, None, json!({}));
        let mut state = RequestState::new(Verb::Get);
        state.data = Some(map(json!({"k": 1, "user": {"name": "Ann"}})));
        state.params = Some(Map::new());
        let get = tree.spawn(root, EventHandler::default(), NodeKind::Request(state));

        let k = map(json!({"property": {"params": "k"}}));
        assert_eq!(tree.get_value(get, get, &k), Some(Value::Int(1)));
        let name = map(json!({"property": {"params": {"user": "name"}}}));
        assert_eq!(tree.get_value(get, get, &name), Some(Value::from("Ann")));
        let other = map(json!({"property": {"other": "k"}}));
        assert_eq!(tree.get_value(get, get, &other), None);
    }

    #[test]
    fn request_without_exposed_data_resolves_nothing() {
        let mut tree = Tree::new();
        let root = element(&mut tree, None, json!({}));
        let get = tree.spawn(
            root,
            EventHandler::default(),
            NodeKind::Request(RequestState::new(Verb::Get)),
        );
        let k = map(json!({"property": {"params": "k"}}));
        assert_eq!(tree.get_value(get, get, &k), None);
    }
}
