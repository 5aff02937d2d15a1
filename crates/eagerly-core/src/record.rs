//! Records: rows decorated with loaded relations.
//!
//! A [`Record`] is what callers receive. It starts as a copy of a raw
//! [`Row`](crate::row::Row) and gains one attribute per loaded relation:
//! a single record (or nothing) for BelongsTo, a list for HasMany and
//! BelongsToMany. Records are plain data; two records for the same table
//! row are independent copies.

use crate::row::Row;
use crate::value::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One named attribute on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// A scalar column or computed value.
    Value(Value),
    /// A BelongsTo relation: the related record, or none.
    One(Option<Box<Record>>),
    /// A HasMany / BelongsToMany relation.
    Many(Vec<Record>),
}

impl Attribute {
    /// The scalar value, if this attribute is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Attribute::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this attribute holds related records rather than a scalar.
    pub fn is_relation(&self) -> bool {
        !matches!(self, Attribute::Value(_))
    }
}

/// An ordered map of attribute name to [`Attribute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Attribute)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy a raw row into a record, preserving column order.
    pub fn from_row(row: Row) -> Self {
        let fields = row
            .into_pairs()
            .into_iter()
            .map(|(name, value)| (name, Attribute::Value(value)))
            .collect();
        Self { fields }
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no attributes.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, attr)| attr)
    }

    /// Look up a scalar attribute by name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(Attribute::as_value)
    }

    /// The BelongsTo record stored under `name`.
    pub fn one(&self, name: &str) -> Option<&Record> {
        match self.get(name) {
            Some(Attribute::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    /// The related list stored under `name`.
    pub fn many(&self, name: &str) -> Option<&[Record]> {
        match self.get(name) {
            Some(Attribute::Many(records)) => Some(records),
            _ => None,
        }
    }

    /// Whether an attribute exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set an attribute, replacing an existing one in place.
    pub fn set(&mut self, name: impl Into<String>, attr: Attribute) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(field, _)| *field == name) {
            slot.1 = attr;
        } else {
            self.fields.push((name, attr));
        }
    }

    /// Set a scalar attribute.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.set(name, Attribute::Value(value.into()));
    }

    /// Remove an attribute, returning it.
    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let idx = self.fields.iter().position(|(field, _)| field == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over (name, attribute) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.fields.iter().map(|(name, attr)| (name.as_str(), attr))
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len());
        for (name, attr) in &self.fields {
            map.insert(name.clone(), attribute_json(attr));
        }
        serde_json::Value::Object(map)
    }
}

fn attribute_json(attr: &Attribute) -> serde_json::Value {
    match attr {
        Attribute::Value(v) => v.to_json(),
        Attribute::One(Some(record)) => record.to_json(),
        Attribute::One(None) => serde_json::Value::Null,
        Attribute::Many(records) => {
            serde_json::Value::Array(records.iter().map(Record::to_json).collect())
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, attr) in &self.fields {
            map.serialize_entry(name, &attribute_json(attr))?;
        }
        map.end()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name, Attribute::Value(value)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer() -> Record {
        Record::from_row(Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::BigInt(1), Value::Text("Ada".into())],
        ))
    }

    #[test]
    fn set_replaces_in_place() {
        let mut record = customer();
        record.set_value("name", "Grace");
        assert_eq!(record.names().collect::<Vec<_>>(), ["id", "name"]);
        assert_eq!(record.value("name"), Some(&Value::Text("Grace".into())));
    }

    #[test]
    fn relations_serialize_as_nested_json() {
        let mut record = customer();
        let mut order = Record::new();
        order.set_value("id", 10i64);
        record.set("orders", Attribute::Many(vec![order]));
        record.set("country", Attribute::One(None));

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": 1, "name": "Ada", "orders": [{"id": 10}], "country": null})
        );
        assert_eq!(record.to_json(), serde_json::to_value(&record).unwrap());
        assert_eq!(record.many("orders").map(<[Record]>::len), Some(1));
        assert!(record.one("country").is_none());
    }

    #[test]
    fn remove_returns_attribute() {
        let mut record = customer();
        assert!(record.remove("name").is_some());
        assert!(!record.contains("name"));
        assert!(record.remove("name").is_none());
    }
}
