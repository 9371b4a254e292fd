//! Basic arithmetic tool.
//!
//! Takes structured operands instead of an expression string, which pushes
//! parsing onto the model and keeps this side trivial.

use crate::ToolExecutor;
use async_trait::async_trait;
use relay_core::{JsonSchema, RelayError, RelayResult, Tool};
use serde::Deserialize;

/// Performs basic arithmetic.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorTool;

impl CalculatorTool {
    /// Create the tool.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct CalculatorArgs {
    operand1: f64,
    operand2: f64,
    operator: String,
}

#[async_trait]
impl ToolExecutor for CalculatorTool {
    fn definition(&self) -> Tool {
        Tool::function(
            "calculate",
            "Performs a basic arithmetic calculation (add, subtract, multiply, divide).",
            JsonSchema::object(
                [
                    (
                        "operand1",
                        JsonSchema::number("The first number in the calculation."),
                    ),
                    (
                        "operator",
                        JsonSchema::string("The operator to use. Must be one of '+', '-', '*', '/'."),
                    ),
                    (
                        "operand2",
                        JsonSchema::number("The second number in the calculation."),
                    ),
                ],
                &["operand1", "operator", "operand2"],
            ),
        )
    }

    async fn execute(&self, arguments: &str) -> RelayResult<String> {
        let args: CalculatorArgs = serde_json::from_str(arguments)
            .map_err(|e| RelayError::tool(format!("invalid arguments for calculator: {e}")))?;

        let result = match args.operator.as_str() {
            "+" => args.operand1 + args.operand2,
            "-" => args.operand1 - args.operand2,
            "*" => args.operand1 * args.operand2,
            "/" => {
                if args.operand2 == 0.0 {
                    return Ok("Error: Division by zero is not allowed.".to_string());
                }
                args.operand1 / args.operand2
            }
            other => {
                return Ok(format!(
                    "Error: Unsupported operator '{other}'. Please use +, -, *, or /."
                ));
            }
        };

        // {result} formats without trailing zeros, so "84" not "84.000000".
        Ok(format!("The result is {result}."))
    }
}
