//! The two tools the client can advertise: today's date and fetching a URL's body.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::ToolError;
use crate::agent::ToolExecutor;
use crate::llm::{ToolDefinition, ToolFunctionDefinition};

pub const GET_CURRENT_DATE: &str = "get_current_date";
pub const FETCH_URL_CONTENT: &str = "fetch_url_content";

/// Built-in tool executor (date lookup, URL fetch).
#[derive(Clone, Default)]
pub struct BuiltinTools {
    client: reqwest::Client,
}

impl BuiltinTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Today's local date as YYYY-MM-DD.
    pub fn get_current_date() -> String {
        chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
    }

    /// GET the URL and return the body as text. Non-success statuses are errors.
    pub async fn fetch_url_content(&self, url: &str) -> Result<String, ToolError> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(res.text().await?)
    }
}

fn function(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        typ: "function".to_string(),
        function: ToolFunctionDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters,
        },
    }
}

/// Function-calling descriptors for the built-in tools.
pub fn builtin_definitions() -> Vec<ToolDefinition> {
    vec![
        function(
            GET_CURRENT_DATE,
            "Returns the current date in ISO format (YYYY-MM-DD).",
            json!({ "type": "object", "properties": {}, "required": [] }),
        ),
        function(
            FETCH_URL_CONTENT,
            "Fetches the content of the given URL and returns it as text.",
            json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "The URL to fetch." }
                },
                "required": ["url"]
            }),
        ),
    ]
}

#[async_trait]
impl ToolExecutor for BuiltinTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        builtin_definitions()
    }

    async fn execute(&self, name: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
        match name {
            GET_CURRENT_DATE => Ok(Self::get_current_date()),
            FETCH_URL_CONTENT => {
                let url = args
                    .get("url")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(ToolError::MissingArgument("url"))?;
                self.fetch_url_content(url).await
            }
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_date_is_iso() {
        let date = BuiltinTools::get_current_date();
        assert!(chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok());
        assert_eq!(date.len(), 10);
    }

    #[test]
    fn definitions_cover_both_tools() {
        let tools = BuiltinTools::new();
        let names: Vec<String> = tools
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec![GET_CURRENT_DATE, FETCH_URL_CONTENT]);
    }

    #[tokio::test]
    async fn unknown_name_is_reported_as_unknown() {
        let tools = BuiltinTools::new();
        let err = tools.execute("foo", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::Unknown(ref name) if name == "foo"));
    }

    #[tokio::test]
    async fn fetch_without_url_is_an_error() {
        let tools = BuiltinTools::new();
        let err = tools.execute(FETCH_URL_CONTENT, &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument("url")));
    }

    #[tokio::test]
    async fn date_ignores_arguments() {
        let tools = BuiltinTools::new();
        let mut args = Map::new();
        args.insert("tz".to_string(), json!("UTC"));
        let out = tools.execute(GET_CURRENT_DATE, &args).await.unwrap();
        assert_eq!(out.len(), 10);
    }
}
