//! Parsed gateway documents and the record projection applied to them.
//!
//! A payload is accepted or rejected as a unit at parse time: anything that is
//! not a JSON object with an `items` array is malformed. Individual items are
//! judged later, during extraction, and a bad item only costs itself.

use crate::content::Record;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    items: Vec<Value>,
}

/// Records pulled out of one payload plus the number of items that did not
/// have the expected `{ "item": { <field>: "<string>" } }` shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub skipped: usize,
}

impl Payload {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Projects every item onto `item.<field>`, preserving item order.
    pub fn extract(&self, field: &str) -> Extraction {
        let mut extraction = Extraction {
            records: Vec::with_capacity(self.items.len()),
            skipped: 0,
        };

        for (index, item) in self.items.iter().enumerate() {
            match project(item, field) {
                Some(record) => extraction.records.push(record.to_owned()),
                None => {
                    tracing::trace!(index, field, "skipping item without expected shape");
                    extraction.skipped += 1;
                }
            }
        }

        extraction
    }
}

fn project<'a>(item: &'a Value, field: &str) -> Option<&'a str> {
    item.get("item")?.get(field)?.as_str()
}
