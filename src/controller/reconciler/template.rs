//! # Template Engine
//!
//! Renders resource templates into Kubernetes objects.
//!
//! Uses minijinja with its default syntax:
//! - Variables: `{{ foo }}`, also accepted Go-style as `{{ .foo }}`
//! - Blocks: `{% if foo %}...{% endif %}`
//! - Comments: `{# ... #}`
//!
//! Every merged value is a top-level variable, and the whole map is also
//! exposed as `Values` for keys that are not identifiers
//! (`{{ Values["team.name"] }}`).
//!
//! Filters:
//! - `b64enc`: standard base64 encoding
//! - `b64dec`: standard base64 decoding
//!
//! Rendered text is parsed as a single YAML document whose root must be a
//! mapping. Scalar mapping keys (integers, floats, booleans) are stringified.

use crate::constants::NO_VALUE_SENTINEL;
use base64::{engine::general_purpose::STANDARD, Engine};
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use minijinja::{Environment, ErrorKind, UndefinedBehavior, Value};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use thiserror::Error;

/// How undefined variables are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Undefined variables fail the render (reconciliation)
    Strict,
    /// Undefined variables render as `<no value>` (admission validation)
    Lenient,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("{0}")]
    Render(#[from] minijinja::Error),
    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{0}")]
    Structure(String),
    #[error("missing {0}")]
    MissingField(&'static str),
}

/// A rendered template, ready to be placed into a namespace
#[derive(Debug, Clone)]
pub struct RenderedResource {
    pub gvk: GroupVersionKind,
    pub object: DynamicObject,
}

impl RenderedResource {
    #[must_use]
    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.object.metadata.namespace.as_deref().unwrap_or_default()
    }
}

/// Template engine for resource templates
#[derive(Debug)]
pub struct TemplateEngine {
    env: Environment<'static>,
    mode: RenderMode,
}

impl TemplateEngine {
    #[must_use]
    pub fn new(mode: RenderMode) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(match mode {
            RenderMode::Strict => UndefinedBehavior::Strict,
            RenderMode::Lenient => UndefinedBehavior::Lenient,
        });
        env.add_filter("b64enc", b64enc);
        env.add_filter("b64dec", b64dec);

        Self { env, mode }
    }

    #[must_use]
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Render a template to text
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Render` if the syntax is invalid, a filter fails,
    /// or (in strict mode) a variable is undefined.
    pub fn render(
        &self,
        template: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let source = rewrite_dot_references(template);
        let compiled = self.env.template_from_str(&source)?;

        let mut context: BTreeMap<String, Value> = BTreeMap::new();
        if self.mode == RenderMode::Lenient {
            for name in compiled.undeclared_variables(false) {
                context.insert(name, Value::from(NO_VALUE_SENTINEL));
            }
        }
        for (key, value) in values {
            context.insert(key.clone(), Value::from(value.as_str()));
        }
        context.insert("Values".to_string(), Value::from_serialize(values));

        Ok(compiled.render(context)?)
    }

    /// Render a template and parse it into an object
    ///
    /// The object must carry a non-empty `apiVersion`, `kind` and `metadata.name`.
    pub fn render_resource(
        &self,
        template: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<RenderedResource, TemplateError> {
        let rendered = self.render(template, values)?;
        parse_resource(&rendered)
    }
}

/// Parse rendered text into an object
pub fn parse_resource(rendered: &str) -> Result<RenderedResource, TemplateError> {
    let document: serde_yaml::Value = serde_yaml::from_str(rendered)?;
    let json = yaml_to_json(document)?;
    if !json.is_object() {
        return Err(TemplateError::Structure(
            "rendered document is not a mapping".to_string(),
        ));
    }

    let api_version = required_str(&json, &["apiVersion"], "apiVersion")?;
    let kind = required_str(&json, &["kind"], "kind")?;
    required_str(&json, &["metadata", "name"], "metadata.name")?;

    let (group, version) = api_version.split_once('/').unwrap_or(("", &api_version));
    let gvk = GroupVersionKind::gvk(group, version, &kind);

    let object: DynamicObject = serde_json::from_value(json)
        .map_err(|e| TemplateError::Structure(format!("not a Kubernetes object: {e}")))?;

    Ok(RenderedResource { gvk, object })
}

fn required_str(
    json: &JsonValue,
    path: &[&str],
    field: &'static str,
) -> Result<String, TemplateError> {
    path.iter()
        .try_fold(json, |node, key| node.get(*key))
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(TemplateError::MissingField(field))
}

/// Convert a YAML document to JSON, repairing non-string mapping keys
fn yaml_to_json(value: serde_yaml::Value) -> Result<JsonValue, TemplateError> {
    Ok(match value {
        serde_yaml::Value::Null => JsonValue::Null,
        serde_yaml::Value::Bool(b) => JsonValue::Bool(b),
        serde_yaml::Value::Number(n) => number_to_json(&n)?,
        serde_yaml::Value::String(s) => JsonValue::String(s),
        serde_yaml::Value::Sequence(items) => JsonValue::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut object = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                object.insert(mapping_key(key)?, yaml_to_json(value)?);
            }
            JsonValue::Object(object)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn number_to_json(n: &serde_yaml::Number) -> Result<JsonValue, TemplateError> {
    if let Some(i) = n.as_i64() {
        Ok(JsonValue::from(i))
    } else if let Some(u) = n.as_u64() {
        Ok(JsonValue::from(u))
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(|| TemplateError::Structure(format!("unsupported number {n}")))
    }
}

fn mapping_key(key: serde_yaml::Value) -> Result<String, TemplateError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) if n.as_f64().is_none_or(f64::is_finite) => Ok(n.to_string()),
        serde_yaml::Value::Tagged(tagged) => mapping_key(tagged.value),
        other => Err(TemplateError::Structure(format!(
            "unsupported mapping key {other:?}"
        ))),
    }
}

fn b64enc(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

fn b64dec(value: &str) -> Result<String, minijinja::Error> {
    let bytes = STANDARD.decode(value).map_err(|e| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode error: {e}"),
        )
    })?;
    String::from_utf8(bytes).map_err(|e| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode produced invalid UTF-8: {e}"),
        )
    })
}

/// Rewrite Go-style `.name` references inside `{{ }}` and `{% %}` to `name`
fn rewrite_dot_references(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some((start, close)) = next_tag(remaining) {
        result.push_str(&remaining[..start + 2]);
        remaining = &remaining[start + 2..];

        if let Some(end) = remaining.find(close) {
            result.push_str(&strip_leading_dots(&remaining[..end]));
            result.push_str(close);
            remaining = &remaining[end + close.len()..];
        } else {
            // Unterminated tag, minijinja reports it
            result.push_str(remaining);
            remaining = "";
        }
    }

    result.push_str(remaining);
    result
}

fn next_tag(s: &str) -> Option<(usize, &'static str)> {
    let variable = s.find("{{").map(|i| (i, "}}"));
    let block = s.find("{%").map(|i| (i, "%}"));
    match (variable, block) {
        (Some(v), Some(b)) => Some(if v.0 < b.0 { v } else { b }),
        (v, b) => v.or(b),
    }
}

fn strip_leading_dots(expr: &str) -> String {
    let mut result = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            result.push(ch);
            if ch == '\\' {
                if let Some(escaped) = chars.next() {
                    result.push(escaped);
                }
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                result.push(ch);
            }
            '.' => {
                // Attribute access (`a.b`, `f().b`, `x[0].b`) and numbers keep their dot
                let binds_left = result
                    .chars()
                    .last()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == ')' || c == ']');
                let starts_name = chars.peek().is_some_and(|c| c.is_alphabetic() || *c == '_');
                if binds_left || !starts_name {
                    result.push('.');
                }
            }
            _ => result.push(ch),
        }
    }

    result
}
