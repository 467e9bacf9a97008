//! Flattening JSON events into the sorted field list the matcher consumes.
//!
//! ```text
//! {"a": {"b": "x"}, "c": [1, 2]}
//!   -> a.b = "x"
//!      c   = 1    (array 0, index 0)
//!      c   = 2    (array 0, index 1)
//! ```
//!
//! String values keep their JSON quotes so that `"1"` and `1` stay distinct.
//! Every array gets a fresh id, and each value records the element index it
//! came from in every enclosing array.

use serde_json::Value;

use crate::array_membership::ArrayMembership;
use crate::error::{Result, RulerError};

/// One flattened `(name, value)` pair of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub array_membership: ArrayMembership,
}

impl Field {
    /// A field outside any array.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            array_membership: ArrayMembership::new(),
        }
    }

    pub fn with_membership(
        name: impl Into<String>,
        value: impl Into<String>,
        array_membership: ArrayMembership,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            array_membership,
        }
    }
}

/// A flattened event: fields sorted by name, then by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    fields: Vec<Field>,
}

struct Flattener<'a> {
    fields: Vec<Field>,
    next_array_id: u32,
    filter: Option<&'a dyn Fn(&str) -> bool>,
}

impl Flattener<'_> {
    fn visit(&mut self, name: &str, value: &Value, membership: &ArrayMembership) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = if name.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", name, key)
                    };
                    self.visit(&path, child, membership);
                }
            }
            Value::Array(items) => {
                let array_id = self.next_array_id;
                self.next_array_id += 1;
                for (index, item) in items.iter().enumerate() {
                    let mut element = membership.clone();
                    element.put(array_id, index as u32);
                    self.visit(name, item, &element);
                }
            }
            leaf => {
                if self.filter.is_some_and(|keep| !keep(name)) {
                    return;
                }
                self.fields.push(Field::with_membership(
                    name,
                    encode_leaf(leaf),
                    membership.clone(),
                ));
            }
        }
    }
}

/// The matcher's text for a scalar JSON value.
pub(crate) fn encode_leaf(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

impl Event {
    /// Flatten a JSON object. `filter`, when given, keeps only the fields
    /// whose name it accepts.
    pub fn flatten_json(json: &str, filter: Option<&dyn Fn(&str) -> bool>) -> Result<Event> {
        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(RulerError::InvalidJson(
                "event must be a JSON object".to_string(),
            ));
        }
        let mut flattener = Flattener {
            fields: Vec::new(),
            next_array_id: 0,
            filter,
        };
        flattener.visit("", &value, &ArrayMembership::new());
        Ok(Event::from_fields(flattener.fields))
    }

    /// An event from already-flattened fields, which are sorted here.
    pub fn from_fields(mut fields: Vec<Field>) -> Event {
        sort_fields(&mut fields);
        Event { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }
}

pub(crate) fn sort_fields(fields: &mut [Field]) {
    fields.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.value.cmp(&b.value)));
}

pub(crate) fn is_sorted(fields: &[Field]) -> bool {
    fields
        .windows(2)
        .all(|w| (&w[0].name, &w[0].value) <= (&w[1].name, &w[1].value))
}
