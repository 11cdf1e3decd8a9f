//! Generic parsed-output tree shared by the three format parsers.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn empty_map() -> Self {
        Value::Map(IndexMap::new())
    }

    /// Map lookup; `None` for missing keys and for non-map values.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Sequence lookup; `None` when out of range or not a sequence.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Array(xs) => xs.get(index),
            _ => None,
        }
    }

    /// Dotted/bracket path lookup such as `Step.actions[1].name`.
    ///
    /// Any missing segment yields `None` rather than an error.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            let (key, rest) = match segment.find('[') {
                Some(pos) => (&segment[..pos], &segment[pos..]),
                None => (segment, ""),
            };
            if !key.is_empty() {
                current = current.get(key)?;
            }
            let mut rest = rest;
            while let Some(stripped) = rest.strip_prefix('[') {
                let close = stripped.find(']')?;
                let index: usize = stripped[..close].trim().parse().ok()?;
                current = current.at(index)?;
                rest = &stripped[close + 1..];
            }
        }
        Some(current)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Elements of a field read as a sequence. Repeated-tag XML cannot tell a
    /// one-element sequence from a scalar, nor an empty one from an empty
    /// element, so a lone value is one element and `null` or `{}` is none.
    pub fn items(&self) -> Vec<&Value> {
        match self {
            Value::Array(xs) => xs.iter().collect(),
            Value::Null => Vec::new(),
            Value::Map(map) if map.is_empty() => Vec::new(),
            other => vec![other],
        }
    }

    /// Insert under `key`, turning a repeated key into a sequence of its values.
    pub(crate) fn push_entry(map: &mut IndexMap<String, Value>, key: String, value: Value) {
        match map.get_mut(&key) {
            None => {
                map.insert(key, value);
            }
            Some(Value::Array(xs)) => xs.push(value),
            Some(existing) => {
                let first = std::mem::take(existing);
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(xs) => Value::Array(xs.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => {
                Value::Map(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Integer(i) => serde_json::Value::from(i),
            // non-finite floats have no JSON form
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(xs) => serde_json::Value::Array(xs.into_iter().map(Into::into).collect()),
            Value::Map(m) => serde_json::Value::Object(m.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_walks_maps_and_sequences() {
        let v = Value::from(json!({"Step": {"actions": [{"name": "a"}, {"name": "b"}]}}));
        assert_eq!(v.lookup("Step.actions[1].name").and_then(Value::as_str), Some("b"));
        assert_eq!(v.lookup("Step.actions[2].name"), None);
        assert_eq!(v.lookup("Step.missing"), None);
        assert!(v.get("Step").is_some());
        assert_eq!(v.at(0), None);
    }

    #[test]
    fn items_read_lone_values_as_sequences() {
        let v = Value::from(json!({"one": "only", "many": [1, 2], "none": {}, "nil": null, "obj": {"a": 1}}));
        assert_eq!(v.get("one").unwrap().items(), vec![&Value::String("only".into())]);
        assert_eq!(v.get("many").unwrap().items().len(), 2);
        assert!(v.get("none").unwrap().items().is_empty());
        assert!(v.get("nil").unwrap().items().is_empty());
        assert_eq!(v.get("obj").unwrap().items().len(), 1);
    }

    #[test]
    fn repeated_entries_become_sequences() {
        let mut map = IndexMap::new();
        Value::push_entry(&mut map, "h".into(), Value::Integer(1));
        Value::push_entry(&mut map, "h".into(), Value::Integer(2));
        Value::push_entry(&mut map, "h".into(), Value::Integer(3));
        assert_eq!(
            map.get("h"),
            Some(&Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]))
        );
    }

    #[test]
    fn json_conversion_keeps_integers_distinct_from_floats() {
        let v = Value::from(json!({"a": 1, "b": 1.5, "c": [true, null]}));
        assert_eq!(v.get("a"), Some(&Value::Integer(1)));
        assert_eq!(v.get("b"), Some(&Value::Float(1.5)));
        let back: serde_json::Value = v.into();
        assert_eq!(back, json!({"a": 1, "b": 1.5, "c": [true, null]}));
    }
}
