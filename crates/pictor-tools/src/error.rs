use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParams { tool_name: String, message: String },

    /// The external operation behind the tool failed. Displays as the bare
    /// message so it can be surfaced to the user verbatim.
    #[error("{message}")]
    Execution { tool_name: String, message: String },
}

impl ToolError {
    pub fn execution<T: Into<String>, M: Into<String>>(tool_name: T, message: M) -> Self {
        ToolError::Execution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_params<T: Into<String>, M: Into<String>>(tool_name: T, message: M) -> Self {
        ToolError::InvalidParams {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    pub fn tool_name(&self) -> &str {
        match self {
            ToolError::UnknownTool(name)
            | ToolError::InvalidParams {
                tool_name: name, ..
            }
            | ToolError::Execution {
                tool_name: name, ..
            } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_displays_bare_message() {
        let err = ToolError::execution("generateTextToImage", "rate limited");
        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(err.tool_name(), "generateTextToImage");
    }

    #[test]
    fn invalid_params_names_the_tool() {
        let err = ToolError::invalid_params("generateTextToImage", "prompt must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid parameters for generateTextToImage: prompt must not be empty"
        );
    }
}
