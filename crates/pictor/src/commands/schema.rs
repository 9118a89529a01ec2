use super::Command;
use crate::error::Error;
use async_trait::async_trait;
use eyre::Result;
use pictor_tools::ToolSchema;
use pictor_tools::tools::client_tool_schemas;
use serde_json::{Value, json};
use std::io::Write;

pub struct SchemaCommand;

#[async_trait]
impl Command for SchemaCommand {
    async fn execute(&self) -> Result<()> {
        let mut stdout = std::io::stdout();
        write_schemas(&mut stdout)?;
        Ok(())
    }
}

/// Declarations in the function-calling shape sent to the model.
pub fn declarations(schemas: &[ToolSchema]) -> Value {
    Value::Array(
        schemas
            .iter()
            .map(|schema| {
                json!({
                    "name": schema.name,
                    "description": schema.description,
                    "parameters": schema.input_schema.to_json(),
                })
            })
            .collect(),
    )
}

fn write_schemas(out: &mut impl Write) -> std::result::Result<(), Error> {
    let json = serde_json::to_string_pretty(&declarations(&client_tool_schemas()))?;
    writeln!(out, "{json}")?;
    Ok(())
}
