//! Interactive console front end
//!
//! Lists the server's tools by index, prompts for each declared parameter
//! and prints the first text item of the result, until the user enters `q`
//! or input ends. It only talks to the server through [`ToolSession`].

use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

use crate::mcp::{ClientError, ToolSession};
use crate::registry::{ParamSpec, ParamType, ToolDescriptor};

/// Errors that end the console loop
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("console I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session ended: {0}")]
    Session(#[from] ClientError),
}

/// Parse what the user typed for one parameter
///
/// Returns `Ok(None)` when an optional parameter is left empty so the
/// server-side default applies.
pub fn parse_argument(spec: &ParamSpec, raw: &str) -> Result<Option<Value>, String> {
    let raw = raw.trim_end_matches(['\r', '\n']);

    if raw.trim().is_empty() && !spec.required {
        return Ok(None);
    }

    match spec.param_type {
        ParamType::String => Ok(Some(json!(raw))),
        _ if raw.trim().is_empty() => Err(format!("'{}' is required", spec.name)),
        ParamType::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(|n| Some(Value::Number(n)))
            .ok_or_else(|| format!("'{}' must be a number", spec.name)),
        ParamType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(|n| Some(json!(n)))
            .map_err(|_| format!("'{}' must be a whole number", spec.name)),
        ParamType::Boolean => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" => Ok(Some(json!(true))),
            "false" | "no" | "n" => Ok(Some(json!(false))),
            _ => Err(format!("'{}' must be yes or no", spec.name)),
        },
    }
}

/// Menu loop over a line-oriented input and an output stream
pub struct Console<R, W> {
    input: Lines<R>,
    output: W,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: input.lines(),
            output,
        }
    }

    /// Run until the user quits, input ends or the session dies
    pub async fn run(&mut self, session: &dyn ToolSession) -> Result<(), ConsoleError> {
        loop {
            let tools = session.tools().await?;
            self.show_menu(&tools).await?;

            self.write("\nSelect a tool number: ").await?;
            let Some(choice) = self.input.next_line().await? else {
                break;
            };
            let choice = choice.trim();

            if choice.eq_ignore_ascii_case("q") {
                break;
            }

            let tool = match choice.parse::<usize>().ok().and_then(|i| tools.get(i)) {
                Some(tool) => tool,
                None => {
                    self.write("Invalid input, please try again.\n").await?;
                    continue;
                }
            };

            let Some(arguments) = self.prompt_arguments(tool).await? else {
                break;
            };

            match session.invoke(&tool.name, arguments).await {
                Ok(output) => match output.text() {
                    Some(text) => self.write(&format!("\nResult: {}\n", text)).await?,
                    None => self.write("\nNo text result.\n").await?,
                },
                Err(ClientError::TransportClosed) => return Err(ClientError::TransportClosed.into()),
                Err(e) => self.write(&format!("Error calling tool: {}\n", e)).await?,
            }
        }

        self.write("Goodbye.\n").await?;
        Ok(())
    }

    async fn show_menu(&mut self, tools: &[ToolDescriptor]) -> Result<(), ConsoleError> {
        let mut menu = String::from("\nAvailable tools:\n");
        for (index, tool) in tools.iter().enumerate() {
            menu.push_str(&format!("[{}] {} - {}\n", index, tool.name, tool.description));
        }
        menu.push_str("[Q] Quit\n");
        self.write(&menu).await
    }

    /// Ask for every declared parameter; `None` if input ended midway
    async fn prompt_arguments(
        &mut self,
        tool: &ToolDescriptor,
    ) -> Result<Option<HashMap<String, Value>>, ConsoleError> {
        let mut arguments = HashMap::new();

        for spec in &tool.parameters {
            loop {
                let optional = if spec.required { "" } else { ", optional" };
                self.write(&format!("Enter {} ({}{}): ", spec.name, spec.description, optional))
                    .await?;

                let Some(line) = self.input.next_line().await? else {
                    return Ok(None);
                };

                match parse_argument(spec, &line) {
                    Ok(Some(value)) => {
                        arguments.insert(spec.name.clone(), value);
                        break;
                    }
                    Ok(None) => break,
                    Err(problem) => self.write(&format!("{}\n", problem)).await?,
                }
            }
        }

        Ok(Some(arguments))
    }

    async fn write(&mut self, text: &str) -> Result<(), ConsoleError> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }
}
