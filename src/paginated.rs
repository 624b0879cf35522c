use serde::Serialize;
use serde_json::Value;
use std::ops::Deref;

use crate::error::Result;

/// A page of resources plus the raw listing payload.
///
/// Collection endpoints wrap their elements differently (`printers`,
/// `members`, `jobs`) and carry count/link metadata alongside; the parse
/// step is supplied per resource as a closure from the raw payload to the
/// typed elements, and the payload itself is retained so the metadata is
/// not lost.
#[derive(Debug)]
pub struct Paginated<T> {
    items: Vec<T>,
    raw: Value,
}

impl<T> Paginated<T> {
    pub fn from_payload<F>(payload: Value, parse: F) -> Result<Self>
    where
        F: FnOnce(&Value) -> Result<Vec<T>>,
    {
        let items = parse(&payload)?;
        Ok(Self {
            items,
            raw: payload,
        })
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// The raw listing payload, including any count/offset/link metadata.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl<T> Deref for Paginated<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<T> IntoIterator for Paginated<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Standard limit/offset/sort/filter options accepted by the collection
/// endpoints. Serializes straight into query parameters; unset fields are
/// omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ListParams {
    pub fn to_query(&self) -> Value {
        // Infallible: the struct is all scalars and strings.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
