use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::message::ToolCall;

/// Function-calling description of a tool, as sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ToolParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ToolParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties", default)]
    pub additional_properties: bool,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }
}

impl ToolParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(
        mut self,
        name: impl Into<String>,
        schema: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    fn typed(schema_type: &str, description: Option<String>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description,
            items: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", Some(description.into()))
    }

    /// An array of plain strings.
    pub fn string_array(description: impl Into<String>) -> Self {
        Self {
            items: Some(Box::new(Self::typed("string", None))),
            ..Self::typed("array", Some(description.into()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error>;
}

/// Tools available to an agent, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Definitions sorted by name so requests are stable across runs.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run one tool call and render the outcome as tool-result text.
    ///
    /// Never fails: unknown tools and tool errors come back as `Error: ...`
    /// strings the model can read. The flag is true for those.
    pub async fn execute_call(&self, call: &ToolCall) -> (String, bool) {
        let Some(tool) = self.get(&call.name) else {
            return (format!("Error: Unknown tool '{}'", call.name), true);
        };

        match tool.execute(call.arguments.clone()).await {
            Ok(output) if output.is_error => (format!("Error: {}", output.content), true),
            Ok(output) => (output.content, false),
            Err(e) => (format!("Error executing tool: {}", e), true),
        }
    }
}
