//! Demo tools
//!
//! Offline stand-ins for the tools a real deployment would register:
//! canned weather, a small calculator, a canned search index, and a canned
//! page fetcher. They exist so the orchestrator can be exercised end to end
//! without network access.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use orcha_kernel::error::{EngineError, EngineResult};
use orcha_kernel::tool::Tool;

pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Current weather for a location"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "location": { "type": "string" } },
            "required": ["location"]
        })
    }

    async fn invoke(&self, args: Value) -> EngineResult<Value> {
        let location = args
            .get("location")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::invalid_args("weather", "missing location"))?;
        // Deterministic canned data keyed off the location text.
        let temp = 50 + (location.len() as i64 % 40);
        Ok(json!({
            "location": location,
            "temperature": temp,
            "condition": if temp > 70 { "Sunny" } else { "Cloudy" },
            "humidity": 45,
        }))
    }
}

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Basic arithmetic over two operands"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": { "type": "string", "enum": ["add", "sub", "mul", "div"] },
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "required": ["op", "a", "b"]
        })
    }

    async fn invoke(&self, args: Value) -> EngineResult<Value> {
        let op = args.get("op").and_then(Value::as_str).unwrap_or("add");
        let a = args
            .get("a")
            .and_then(Value::as_f64)
            .ok_or_else(|| EngineError::invalid_args("calculator", "a must be a number"))?;
        let b = args
            .get("b")
            .and_then(Value::as_f64)
            .ok_or_else(|| EngineError::invalid_args("calculator", "b must be a number"))?;
        let result = match op {
            "add" => a + b,
            "sub" => a - b,
            "mul" => a * b,
            "div" => {
                if b == 0.0 {
                    return Err(EngineError::tool_execution_failed(
                        "calculator",
                        "division by zero",
                    ));
                }
                a / b
            }
            other => {
                return Err(EngineError::invalid_args(
                    "calculator",
                    format!("unsupported op {other:?}"),
                ));
            }
        };
        Ok(json!({ "op": op, "a": a, "b": b, "result": result }))
    }
}

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Web search returning result snippets and URLs"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> EngineResult<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::invalid_args("search", "missing query"))?;
        let results: Vec<Value> = (1..=3)
            .map(|i| {
                json!({
                    "title": format!("Result {i} for {query}"),
                    "url": format!("https://example.com/{}/{i}", query.replace(' ', "-")),
                    "snippet": format!("Snippet {i} mentioning {query}."),
                })
            })
            .collect();
        Ok(json!({ "query": query, "results": results }))
    }
}

pub struct VisitUrlTool;

#[async_trait]
impl Tool for VisitUrlTool {
    fn name(&self) -> &str {
        "visit_url"
    }

    fn description(&self) -> &str {
        "Fetch a page and return its text"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"]
        })
    }

    async fn invoke(&self, args: Value) -> EngineResult<Value> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::invalid_args("visit_url", "missing url"))?;
        Ok(json!({
            "url": url,
            "title": format!("Page at {url}"),
            "text": format!("Canned page content for {url}."),
        }))
    }
}

/// All demo tools, ready to register.
pub fn demo_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(WeatherTool),
        Arc::new(CalculatorTool),
        Arc::new(SearchTool),
        Arc::new(VisitUrlTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calculator_divides_and_rejects_zero() {
        let calc = CalculatorTool;
        let ok = calc
            .invoke(json!({"op": "div", "a": 6, "b": 2}))
            .await
            .unwrap();
        assert_eq!(ok["result"], json!(3.0));

        let err = calc
            .invoke(json!({"op": "div", "a": 6, "b": 0}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[tokio::test]
    async fn search_returns_three_results() {
        let search = SearchTool;
        let out = search.invoke(json!({"query": "cheese"})).await.unwrap();
        assert_eq!(out["results"].as_array().unwrap().len(), 3);
    }
}
