//! Values tree navigation
//!
//! Chart values are arbitrary YAML. A [`ValuePath`] addresses one node inside
//! them using dots between keys and `[n]` for sequence items, e.g.
//! `controller.image.tag` or `sidecars[0].image.digest`.

use serde_yaml::{Mapping, Value};
use std::fmt;

use crate::error::ResolutionError;

/// One step of a [`ValuePath`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parsed location inside a values tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePath(Vec<PathSegment>);

impl ValuePath {
    /// Parse a dotted path
    pub fn parse(raw: &str) -> Result<Self, ResolutionError> {
        let invalid = || ResolutionError::InvalidPath {
            path: raw.to_string(),
        };

        let mut segments = Vec::new();
        for part in raw.trim().split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(open) => part.split_at(open),
                None => (part, ""),
            };

            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            } else if rest.is_empty() {
                return Err(invalid());
            }

            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(invalid)?;
                if !rest.starts_with('[') {
                    return Err(invalid());
                }
                let index = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Same path nested one level down under `key`
    pub fn nested_under(&self, key: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.push(PathSegment::Key(key.to_string()));
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{}", key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Look up the node at `path`
pub fn get<'a>(root: &'a Value, path: &ValuePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| match segment {
            PathSegment::Key(key) => node.get(key.as_str()),
            PathSegment::Index(index) => node.get(*index),
        })
}

/// Look up a scalar (string, number or bool) at `path`
pub fn scalar<'a>(root: &'a Value, path: &ValuePath) -> Result<&'a Value, ResolutionError> {
    match get(root, path) {
        None | Some(Value::Null) => Err(ResolutionError::PathNotFound {
            path: path.to_string(),
        }),
        Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => Ok(value),
        Some(_) => Err(ResolutionError::NotScalar {
            path: path.to_string(),
        }),
    }
}

/// Render a scalar the way it would be written in an image reference
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Write `leaf` at `path`, creating intermediate mappings and sequence slots
pub fn set(root: &mut Value, path: &ValuePath, leaf: Value) {
    let mut node = root;
    for segment in path.segments() {
        node = match segment {
            PathSegment::Key(key) => child_by_key(node, key),
            PathSegment::Index(index) => child_by_index(node, *index),
        };
    }
    *node = leaf;
}

/// Recursively merge `overlay` into `base`.
///
/// Mappings merge key by key; any other overlay value, sequences included,
/// replaces what is in `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn child_by_key<'a>(node: &'a mut Value, key: &str) -> &'a mut Value {
    if !node.is_mapping() {
        *node = Value::Mapping(Mapping::new());
    }
    match node {
        Value::Mapping(map) => map
            .entry(Value::String(key.to_string()))
            .or_insert(Value::Null),
        _ => unreachable!("node was just replaced with a mapping"),
    }
}

fn child_by_index(node: &mut Value, index: usize) -> &mut Value {
    if !node.is_sequence() {
        *node = Value::Sequence(Vec::new());
    }
    match node {
        Value::Sequence(items) => {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        _ => unreachable!("node was just replaced with a sequence"),
    }
}
