use crate::value::{Map, Value};
use std::collections::BTreeMap;

/// An immutable directive taken from document data.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    info: Map,
}

/// What an action asks for, classified by its recognized key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Directive<'a> {
    Get(&'a Map),
    Post(&'a Map),
    Timer(&'a Map),
    Unrecognized,
}

impl Action {
    pub fn new(info: Map) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &Map {
        &self.info
    }

    /// `get` wins over `post`, which wins over `timer`. A recognized key whose
    /// value is not a map does not count.
    pub fn directive(&self) -> Directive<'_> {
        if let Some(spec) = self.info.get("get").and_then(Value::as_map) {
            Directive::Get(spec)
        } else if let Some(spec) = self.info.get("post").and_then(Value::as_map) {
            Directive::Post(spec)
        } else if let Some(spec) = self.info.get("timer").and_then(Value::as_map) {
            Directive::Timer(spec)
        } else {
            Directive::Unrecognized
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub params: Map,
    pub actions: Vec<Action>,
}

impl Event {
    fn parse(name: &str, info: &Map) -> Self {
        let params = info
            .get("params")
            .and_then(Value::as_map)
            .cloned()
            .unwrap_or_default();

        let actions = match info.get("actions") {
            Some(list) => list
                .as_list()
                .unwrap_or_default()
                .iter()
                .filter_map(|item| match item.as_map() {
                    Some(map) => Some(Action::new(map.clone())),
                    None => {
                        log::debug!("event {name}: skipping non-map action {item:?}");
                        None
                    }
                })
                .collect(),
            None => {
                let inline: Map = info
                    .iter()
                    .filter(|(k, _)| k.as_str() != "params")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if inline.is_empty() {
                    Vec::new()
                } else {
                    vec![Action::new(inline)]
                }
            }
        };

        Self { params, actions }
    }
}

/// Per-node registry of event name to params and actions. Built once, never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventHandler {
    events: BTreeMap<String, Event>,
}

impl EventHandler {
    pub fn parse(events: &Value) -> Self {
        let Some(map) = events.as_map() else {
            return Self::default();
        };
        let events = map
            .iter()
            .filter_map(|(name, info)| {
                info.as_map()
                    .map(|info| (name.clone(), Event::parse(name, info)))
            })
            .collect();
        Self { events }
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.get(name)
    }

    pub fn actions_for(&self, name: &str) -> &[Action] {
        self.events
            .get(name)
            .map(|e| e.actions.as_slice())
            .unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
