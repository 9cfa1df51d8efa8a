//! The canonical dynamic value Hermod uses at the engine boundary.
//!
//! Source/sink adapters exchange arbitrarily-shaped payloads; internally we
//! canonicalize every payload to this small variant (string, i64, f64, bool,
//! bytes, list, map, null) rather than carrying adapter-specific dynamic
//! types through the DAG. See spec §9 "Dynamic payloads".

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically-typed value flowing through a [`Message`](crate) payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl Value {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(f) => Some(*f),
            Self::I64(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render the value as a comparable string, for the filter/router
    /// `=`, `!=`, `contains`, `regex` operators (spec §4.6).
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::I64(i) => i.to_string(),
            Self::F64(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Bytes(b) => format!("{b:?}"),
            Self::List(_) | Self::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Resolve a dotted/indexed path (`a.b.2`, `a.b.-1`, `a.b.#`) against
    /// this value, per spec §9.
    ///
    /// - A plain segment indexes into a [`Value::Map`].
    /// - A non-negative integer segment indexes into a [`Value::List`].
    /// - `-1` is only meaningful as a write target (append); reading it
    ///   returns `None`.
    /// - `#` returns the length of a [`Value::List`] as a [`Value::I64`];
    ///   it must be the final segment.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        let segments: Vec<&str> = path.split('.').collect();
        for (i, seg) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            if *seg == "#" {
                if !is_last {
                    return None;
                }
                return None; // length queries return an owned Value; use `len_path`.
            }
            if let Ok(idx) = seg.parse::<i64>() {
                if idx < 0 {
                    return None;
                }
                let list = current.as_list()?;
                current = list.get(idx as usize)?;
            } else {
                let map = current.as_map()?;
                current = map.get(*seg)?;
            }
        }
        Some(current)
    }

    /// Like [`get_path`](Self::get_path) but resolves a trailing `#`
    /// segment to the length of the addressed list.
    #[must_use]
    pub fn len_path(&self, path: &str) -> Option<i64> {
        let (prefix, last) = path.rsplit_once('.').unwrap_or(("", path));
        if last != "#" {
            return None;
        }
        let target = if prefix.is_empty() {
            Some(self)
        } else {
            self.get_path(prefix)
        }?;
        target.as_list().map(|l| l.len() as i64)
    }

    /// Set a value at a dotted/indexed path, creating intermediate maps as
    /// needed. An index of `-1` on a list segment appends.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        let segments: Vec<&str> = path.split('.').collect();
        Self::set_segments(self, &segments, value)
    }

    fn set_segments(current: &mut Value, segments: &[&str], value: Value) -> Result<(), PathError> {
        let Some((seg, rest)) = segments.split_first() else {
            return Err(PathError::EmptyPath);
        };

        if rest.is_empty() {
            Self::write_leaf(current, seg, value)
        } else if let Ok(idx) = seg.parse::<i64>() {
            let list = Self::list_mut(current)?;
            let slot = Self::index_for_write(list, idx)?;
            Self::set_segments(slot, rest, value)
        } else {
            let map = Self::map_mut(current)?;
            let entry = map.entry((*seg).to_string()).or_insert(Value::Null);
            Self::set_segments(entry, rest, value)
        }
    }

    fn write_leaf(current: &mut Value, seg: &str, value: Value) -> Result<(), PathError> {
        if let Ok(idx) = seg.parse::<i64>() {
            let list = Self::list_mut(current)?;
            if idx == -1 {
                list.push(value);
            } else if idx >= 0 && (idx as usize) < list.len() {
                list[idx as usize] = value;
            } else {
                return Err(PathError::IndexOutOfBounds(idx));
            }
        } else {
            let map = Self::map_mut(current)?;
            map.insert(seg.to_string(), value);
        }
        Ok(())
    }

    fn list_mut(current: &mut Value) -> Result<&mut Vec<Value>, PathError> {
        if matches!(current, Value::Null) {
            *current = Value::List(Vec::new());
        }
        match current {
            Value::List(l) => Ok(l),
            _ => Err(PathError::NotAList),
        }
    }

    fn map_mut(current: &mut Value) -> Result<&mut BTreeMap<String, Value>, PathError> {
        if matches!(current, Value::Null) {
            *current = Value::Map(BTreeMap::new());
        }
        match current {
            Value::Map(m) => Ok(m),
            _ => Err(PathError::NotAMap),
        }
    }

    fn index_for_write(list: &mut Vec<Value>, idx: i64) -> Result<&mut Value, PathError> {
        if idx == -1 {
            list.push(Value::Null);
            return Ok(list.last_mut().expect("just pushed"));
        }
        if idx < 0 {
            return Err(PathError::IndexOutOfBounds(idx));
        }
        let idx = idx as usize;
        while list.len() <= idx {
            list.push(Value::Null);
        }
        Ok(&mut list[idx])
    }
}

/// Error resolving a write path against a [`Value`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    EmptyPath,
    #[error("path segment addresses a list but the value is not a list")]
    NotAList,
    #[error("path segment addresses a map but the value is not a map")]
    NotAMap,
    #[error("list index {0} is out of bounds")]
    IndexOutOfBounds(i64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::I64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::F64(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
