use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::ToolError;

/// Flattened JSON schema of a tool's input object, in the shape model
/// providers expect for function declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    pub properties: serde_json::Map<String, Value>,
    pub required: Vec<String>,
    #[serde(rename = "type")]
    pub schema_type: String,
}

impl InputSchema {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "type": self.schema_type,
            "properties": self.properties,
            "required": self.required,
        })
    }
}

impl From<schemars::Schema> for InputSchema {
    fn from(schema: schemars::Schema) -> Self {
        let schema_value =
            serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::Value::Null);
        let summary = SchemaSummary::from_value(&schema_value);
        Self {
            properties: summary.properties,
            required: summary.required,
            schema_type: summary.schema_type,
        }
    }
}

struct SchemaSummary {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
    schema_type: String,
}

impl SchemaSummary {
    fn from_value(schema: &Value) -> Self {
        let mut properties = serde_json::Map::new();
        let mut required = BTreeSet::new();
        let schema_type = schema
            .as_object()
            .and_then(|obj| obj.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("object")
            .to_string();

        Self::merge_schema(schema, &mut properties, &mut required);

        Self {
            properties,
            required: required.into_iter().collect(),
            schema_type,
        }
    }

    fn merge_schema(
        schema: &Value,
        properties: &mut serde_json::Map<String, Value>,
        required: &mut BTreeSet<String>,
    ) {
        let Some(obj) = schema.as_object() else {
            return;
        };

        if let Some(prop_obj) = obj.get("properties").and_then(|v| v.as_object()) {
            for (key, value) in prop_obj {
                properties
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        if let Some(req) = obj.get("required").and_then(|v| v.as_array()) {
            required.extend(req.iter().filter_map(|v| v.as_str()).map(str::to_string));
        }

        if let Some(all_of) = obj.get("allOf").and_then(|v| v.as_array()) {
            for sub in all_of {
                Self::merge_schema(sub, properties, required);
            }
        }
    }
}

/// Declaration of a tool as advertised to the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

/// Static description of a client-side tool: its name, its declared input
/// shape and how raw model-provided input is turned into typed parameters.
pub trait ToolSpec {
    type Params: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + Send;

    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    /// Semantic checks that the type system cannot express.
    fn validate(_params: &Self::Params) -> Result<(), String> {
        Ok(())
    }

    fn schema() -> ToolSchema {
        ToolSchema {
            name: Self::NAME.to_string(),
            description: Self::DESCRIPTION.to_string(),
            input_schema: schemars::schema_for!(Self::Params).into(),
        }
    }

    fn parse_params(input: &Value) -> Result<Self::Params, ToolError> {
        let params: Self::Params = serde_json::from_value(input.clone())
            .map_err(|e| ToolError::invalid_params(Self::NAME, e.to_string()))?;
        Self::validate(&params).map_err(|message| ToolError::invalid_params(Self::NAME, message))?;
        Ok(params)
    }
}
