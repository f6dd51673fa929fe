//! Dataset schema and structural validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DatasetError, Result};

/// One annotation dimension; its fields vary between datasets.
pub type Annotation = Map<String, Value>;

/// One item to be answered by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: u64,

    /// Everything besides `id` (prompt text, references, ratings, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Instance {
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub instances: Vec<Instance>,
    pub annotations: Vec<Annotation>,

    /// Unknown top-level keys, kept so a round trip loses nothing
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dataset {
    /// Validate a parsed document and convert it.
    pub fn from_value(value: Value) -> Result<Self> {
        validate(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn first_id(&self) -> Option<u64> {
        self.instances.first().map(|i| i.id)
    }

    pub fn ids(&self) -> Vec<u64> {
        self.instances.iter().map(|i| i.id).collect()
    }

    /// The named text field of every instance, in instance order.
    pub fn prompts(&self, field: &str) -> Result<Vec<String>> {
        self.instances
            .iter()
            .map(|instance| {
                instance
                    .text(field)
                    .map(str::to_string)
                    .ok_or_else(|| DatasetError::MissingField {
                        id: instance.id,
                        field: field.to_string(),
                    })
            })
            .collect()
    }
}

/// Structural check of the raw document. Reports the first violation with
/// its JSON path.
pub fn validate(value: &Value) -> Result<()> {
    let root = value
        .as_object()
        .ok_or_else(|| DatasetError::schema("$", "document must be an object"))?;

    let instances = root
        .get("instances")
        .ok_or_else(|| DatasetError::schema("$.instances", "missing"))?
        .as_array()
        .ok_or_else(|| DatasetError::schema("$.instances", "must be an array"))?;

    let mut seen = HashSet::with_capacity(instances.len());
    for (i, instance) in instances.iter().enumerate() {
        let path = format!("$.instances[{i}]");
        let object = instance
            .as_object()
            .ok_or_else(|| DatasetError::schema(&path, "must be an object"))?;
        let id = object
            .get("id")
            .ok_or_else(|| DatasetError::schema(format!("{path}.id"), "missing"))?
            .as_u64()
            .ok_or_else(|| DatasetError::schema(format!("{path}.id"), "must be a non-negative integer"))?;
        if !seen.insert(id) {
            return Err(DatasetError::schema(format!("{path}.id"), format!("duplicate id {id}")));
        }
    }

    let annotations = root
        .get("annotations")
        .ok_or_else(|| DatasetError::schema("$.annotations", "missing"))?
        .as_array()
        .ok_or_else(|| DatasetError::schema("$.annotations", "must be an array"))?;

    if let Some(i) = annotations.iter().position(|a| !a.is_object()) {
        return Err(DatasetError::schema(format!("$.annotations[{i}]"), "must be an object"));
    }

    Ok(())
}
