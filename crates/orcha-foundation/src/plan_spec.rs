//! Plan JSON contract
//!
//! The planner LLM produces a JSON plan; this module parses it (tolerating
//! markdown code fences) and validates every step against a tool allow-list:
//! unknown tools, missing required args, extra args, and type mismatches are
//! all rejected.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use orcha_kernel::error::{EngineError, EngineResult};

/// A plan as produced by the planner LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSpec {
    pub title: String,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// A single step of a [`PlanSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub title: String,
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<DependsOn>,
}

/// A dependency reference: planners emit either 1-based step numbers or
/// hierarchical index strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    Number(u64),
    Index(String),
}

impl DependsOn {
    /// Normalize to a hierarchical index string.
    pub fn as_index(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Index(s) => s.clone(),
        }
    }
}

/// Expected JSON type of a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ArgType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String => "str",
            Self::Number => "number",
            Self::Boolean => "bool",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// Allow-list of tools and their required argument signatures.
///
/// Every listed argument is required; arguments not listed are rejected.
#[derive(Debug, Clone, Default)]
pub struct ToolAllowList {
    tools: HashMap<String, Vec<(String, ArgType)>>,
}

impl ToolAllowList {
    /// Create an empty allow-list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a tool with the given argument signature (builder style).
    pub fn allow(mut self, tool: impl Into<String>, params: &[(&str, ArgType)]) -> Self {
        self.tools.insert(
            tool.into(),
            params
                .iter()
                .map(|(name, ty)| (name.to_string(), *ty))
                .collect(),
        );
        self
    }

    /// Returns `true` when the tool is allowed.
    pub fn contains(&self, tool: &str) -> bool {
        self.tools.contains_key(tool)
    }

    /// Allowed tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Render one signature line per tool for the planner system prompt,
    /// e.g. `  - search  {query:str}`.
    pub fn signature_lines(&self) -> String {
        self.tool_names()
            .iter()
            .map(|name| {
                let params = &self.tools[*name];
                let inner: Vec<String> = params
                    .iter()
                    .map(|(arg, ty)| format!("{arg}:{}", ty.name()))
                    .collect();
                format!("  - {name}  {{{}}}", inner.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validate every step of a plan.
    pub fn validate(&self, plan: &PlanSpec) -> EngineResult<()> {
        for step in &plan.steps {
            self.validate_step(step)?;
        }
        Ok(())
    }

    /// Validate one step: known tool, no missing/extra args, types match.
    pub fn validate_step(&self, step: &StepSpec) -> EngineResult<()> {
        let Some(params) = self.tools.get(&step.tool) else {
            return Err(EngineError::UnknownTool(step.tool.clone()));
        };

        let missing: Vec<&str> = params
            .iter()
            .filter(|(name, _)| !step.args.contains_key(name))
            .map(|(name, _)| name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::invalid_args(
                &step.tool,
                format!("missing {missing:?}"),
            ));
        }

        let extra: Vec<&str> = step
            .args
            .keys()
            .filter(|key| !params.iter().any(|(name, _)| name == *key))
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            return Err(EngineError::invalid_args(
                &step.tool,
                format!("unknown {extra:?}"),
            ));
        }

        let bad: Vec<&str> = params
            .iter()
            .filter(|(name, ty)| {
                step.args
                    .get(name)
                    .is_some_and(|value| !ty.matches(value))
            })
            .map(|(name, _)| name.as_str())
            .collect();
        if !bad.is_empty() {
            return Err(EngineError::invalid_args(
                &step.tool,
                format!("invalid {bad:?}"),
            ));
        }

        Ok(())
    }
}

/// Parse a plan JSON document, stripping markdown code fences when the model
/// wrapped its answer in ```json blocks.
pub fn parse_plan_json(raw: &str) -> EngineResult<PlanSpec> {
    let stripped = strip_code_fences(raw);
    serde_json::from_str(stripped)
        .map_err(|err| EngineError::Serialization(format!("invalid plan JSON: {err}")))
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn allow_list() -> ToolAllowList {
        ToolAllowList::new()
            .allow("search", &[("query", ArgType::String)])
            .allow("weather", &[("location", ArgType::String)])
            .allow(
                "calculator",
                &[
                    ("op", ArgType::String),
                    ("a", ArgType::Number),
                    ("b", ArgType::Number),
                ],
            )
    }

    fn step(tool: &str, args: Value) -> StepSpec {
        StepSpec {
            title: "a step".into(),
            tool: tool.into(),
            args: args.as_object().cloned().unwrap_or_default(),
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        let plain = r#"{"title": "t", "steps": []}"#;
        assert_eq!(parse_plan_json(plain).unwrap().title, "t");

        let fenced = "```json\n{\"title\": \"t\", \"steps\": []}\n```";
        assert_eq!(parse_plan_json(fenced).unwrap().title, "t");

        assert!(parse_plan_json("not json").is_err());
    }

    #[test]
    fn depends_on_accepts_ints_and_strings() {
        let raw = r#"{
            "title": "t",
            "steps": [
                {"title": "s", "tool": "search", "args": {"query": "x"}, "depends_on": [1, "2.1"]}
            ]
        }"#;
        let plan = parse_plan_json(raw).unwrap();
        let deps: Vec<String> = plan.steps[0].depends_on.iter().map(|d| d.as_index()).collect();
        assert_eq!(deps, vec!["1", "2.1"]);
    }

    #[test]
    fn validation_rules() {
        let allow = allow_list();

        assert!(allow.validate_step(&step("search", json!({"query": "cheese"}))).is_ok());

        let err = allow.validate_step(&step("rm_rf", json!({}))).unwrap_err();
        assert!(matches!(err, EngineError::UnknownTool(_)));

        let err = allow.validate_step(&step("search", json!({}))).unwrap_err();
        assert!(err.to_string().contains("missing"));

        let err = allow
            .validate_step(&step("search", json!({"query": "x", "extra": 1})))
            .unwrap_err();
        assert!(err.to_string().contains("unknown"));

        let err = allow
            .validate_step(&step("calculator", json!({"op": "add", "a": "one", "b": 2})))
            .unwrap_err();
        assert!(err.to_string().contains("invalid"));

        // Empty strings fail the string check.
        let err = allow
            .validate_step(&step("search", json!({"query": "  "})))
            .unwrap_err();
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn signature_lines_are_prompt_ready() {
        let lines = allow_list().signature_lines();
        assert!(lines.contains("- search  {query:str}"));
        assert!(lines.contains("a:number"));
    }
}
