//! Built-in capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Capability, CapabilityDescriptor, CapabilityError, CapabilitySettings};
use crate::workflow::ExecutionContext;

/// Compile-time capability catalog.
pub static CATALOG: &[CapabilityDescriptor] = &[
    CapabilityDescriptor {
        name: "echo",
        description: "Returns its parameters unchanged",
        build: build_echo,
    },
    CapabilityDescriptor {
        name: "json.pick",
        description: "Selects `keys` from a prior step output (`from`) or from the parameters",
        build: build_json_pick,
    },
    CapabilityDescriptor {
        name: "json.merge",
        description: "Shallow-merges the outputs of the steps listed in `from`, later wins",
        build: build_json_merge,
    },
    CapabilityDescriptor {
        name: "text.template",
        description: "Renders `{{name}}` placeholders in `template` from the parameters",
        build: build_text_template,
    },
    CapabilityDescriptor {
        name: "text.case",
        description: "Converts `text` to `mode` = upper | lower",
        build: build_text_case,
    },
    CapabilityDescriptor {
        name: "math.sum",
        description: "Sums the numbers in `values`",
        build: build_math_sum,
    },
    CapabilityDescriptor {
        name: "http.request",
        description: "Performs an outbound HTTP request (`url`, `method`, `headers`, `body`)",
        build: build_http_request,
    },
];

fn build_echo(_: &CapabilitySettings) -> Arc<dyn Capability> {
    Arc::new(Echo)
}

fn build_json_pick(_: &CapabilitySettings) -> Arc<dyn Capability> {
    Arc::new(JsonPick)
}

fn build_json_merge(_: &CapabilitySettings) -> Arc<dyn Capability> {
    Arc::new(JsonMerge)
}

fn build_text_template(_: &CapabilitySettings) -> Arc<dyn Capability> {
    Arc::new(TextTemplate)
}

fn build_text_case(_: &CapabilitySettings) -> Arc<dyn Capability> {
    Arc::new(TextCase)
}

fn build_math_sum(_: &CapabilitySettings) -> Arc<dyn Capability> {
    Arc::new(MathSum)
}

fn build_http_request(settings: &CapabilitySettings) -> Arc<dyn Capability> {
    Arc::new(HttpRequest::new(settings))
}

fn object(params: &Value) -> Result<&Map<String, Value>, CapabilityError> {
    params
        .as_object()
        .ok_or_else(|| CapabilityError::InvalidParameters("expected an object".into()))
}

fn required_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, CapabilityError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CapabilityError::InvalidParameters(format!("'{key}' must be a string")))
}

fn string_list(params: &Map<String, Value>, key: &str) -> Result<Vec<String>, CapabilityError> {
    params
        .get(key)
        .and_then(Value::as_array)
        .and_then(|items| {
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| CapabilityError::InvalidParameters(format!("'{key}' must be a list of strings")))
}

struct Echo;

#[async_trait]
impl Capability for Echo {
    async fn invoke(&self, params: Value, _ctx: &ExecutionContext) -> Result<Value, CapabilityError> {
        Ok(params)
    }
}

struct JsonPick;

#[async_trait]
impl Capability for JsonPick {
    async fn invoke(&self, params: Value, ctx: &ExecutionContext) -> Result<Value, CapabilityError> {
        let map = object(&params)?;
        let keys = string_list(map, "keys")?;
        let source = match map.get("from").and_then(Value::as_str) {
            Some(step_id) => ctx.prior_outputs.get(step_id).ok_or_else(|| {
                CapabilityError::InvalidParameters(format!("no output recorded for step '{step_id}'"))
            })?,
            None => &params,
        };
        let source = object(source)?;

        let picked: Map<String, Value> = keys
            .into_iter()
            .filter_map(|k| source.get(&k).cloned().map(|v| (k, v)))
            .collect();
        Ok(Value::Object(picked))
    }
}

struct JsonMerge;

#[async_trait]
impl Capability for JsonMerge {
    async fn invoke(&self, params: Value, ctx: &ExecutionContext) -> Result<Value, CapabilityError> {
        let steps = string_list(object(&params)?, "from")?;
        let mut merged = Map::new();
        for step_id in steps {
            match ctx.prior_outputs.get(&step_id) {
                Some(Value::Object(output)) => {
                    merged.extend(output.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Some(_) => {
                    return Err(CapabilityError::InvalidParameters(format!(
                        "output of step '{step_id}' is not an object"
                    )))
                }
                None => {
                    return Err(CapabilityError::InvalidParameters(format!(
                        "no output recorded for step '{step_id}'"
                    )))
                }
            }
        }
        Ok(Value::Object(merged))
    }
}

struct TextTemplate;

impl TextTemplate {
    fn render(template: &str, vars: &Map<String, Value>) -> Result<String, CapabilityError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| CapabilityError::InvalidParameters("unterminated placeholder".into()))?;
            let name = after[..end].trim();
            match vars.get(name) {
                Some(Value::String(s)) => out.push_str(s),
                Some(other) => out.push_str(&other.to_string()),
                None => {
                    return Err(CapabilityError::InvalidParameters(format!(
                        "no value for placeholder '{name}'"
                    )))
                }
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[async_trait]
impl Capability for TextTemplate {
    async fn invoke(&self, params: Value, _ctx: &ExecutionContext) -> Result<Value, CapabilityError> {
        let map = object(&params)?;
        let template = required_str(map, "template")?;
        let text = Self::render(template, map)?;
        Ok(serde_json::json!({ "text": text }))
    }
}

struct TextCase;

#[async_trait]
impl Capability for TextCase {
    async fn invoke(&self, params: Value, _ctx: &ExecutionContext) -> Result<Value, CapabilityError> {
        let map = object(&params)?;
        let text = required_str(map, "text")?;
        let converted = match map.get("mode").and_then(Value::as_str).unwrap_or("upper") {
            "upper" => text.to_uppercase(),
            "lower" => text.to_lowercase(),
            other => {
                return Err(CapabilityError::InvalidParameters(format!(
                    "unknown mode '{other}'"
                )))
            }
        };
        Ok(serde_json::json!({ "text": converted }))
    }
}

struct MathSum;

#[async_trait]
impl Capability for MathSum {
    async fn invoke(&self, params: Value, _ctx: &ExecutionContext) -> Result<Value, CapabilityError> {
        let values = object(&params)?
            .get("values")
            .and_then(Value::as_array)
            .ok_or_else(|| CapabilityError::InvalidParameters("'values' must be a list".into()))?;
        let mut sum = 0.0;
        for v in values {
            sum += v
                .as_f64()
                .ok_or_else(|| CapabilityError::InvalidParameters(format!("{v} is not a number")))?;
        }
        Ok(serde_json::json!({ "sum": sum }))
    }
}

struct HttpRequest {
    client: reqwest::Client,
}

impl HttpRequest {
    fn new(settings: &CapabilitySettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Capability for HttpRequest {
    async fn invoke(&self, params: Value, _ctx: &ExecutionContext) -> Result<Value, CapabilityError> {
        let map = object(&params)?;
        let url = url::Url::parse(required_str(map, "url")?)
            .map_err(|e| CapabilityError::InvalidParameters(format!("bad url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CapabilityError::InvalidParameters(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let method = map
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase()
            .parse::<reqwest::Method>()
            .map_err(|_| CapabilityError::InvalidParameters("bad method".into()))?;

        let mut request = self.client.request(method, url);
        if let Some(headers) = map.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }
        if let Some(body) = map.get("body") {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CapabilityError::Upstream(e.without_url().to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| CapabilityError::Upstream(e.without_url().to_string()))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        Ok(serde_json::json!({ "status": status, "body": body }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(outputs: Value) -> ExecutionContext {
        ExecutionContext {
            prior_outputs: outputs.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_template_renders_placeholders() {
        let out = TextTemplate
            .invoke(
                json!({"template": "Hello {{ name }}, you have {{count}} items", "name": "Ada", "count": 3}),
                &ExecutionContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({"text": "Hello Ada, you have 3 items"}));
    }

    #[tokio::test]
    async fn test_template_missing_placeholder_fails() {
        let err = TextTemplate
            .invoke(json!({"template": "{{missing}}"}), &ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_pick_from_prior_output() {
        let ctx = ctx_with(json!({"fetch": {"a": 1, "b": 2, "c": 3}}));
        let out = JsonPick
            .invoke(json!({"from": "fetch", "keys": ["a", "c", "z"]}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, json!({"a": 1, "c": 3}));
    }

    #[tokio::test]
    async fn test_merge_later_wins() {
        let ctx = ctx_with(json!({"one": {"a": 1, "b": 1}, "two": {"b": 2}}));
        let out = JsonMerge
            .invoke(json!({"from": ["one", "two"]}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_sum_and_case() {
        let ctx = ExecutionContext::default();
        let sum = MathSum.invoke(json!({"values": [1, 2.5, 3]}), &ctx).await.unwrap();
        assert_eq!(sum, json!({"sum": 6.5}));

        let lower = TextCase
            .invoke(json!({"text": "MiXeD", "mode": "lower"}), &ctx)
            .await
            .unwrap();
        assert_eq!(lower, json!({"text": "mixed"}));

        assert!(MathSum.invoke(json!({"values": ["x"]}), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_http_rejects_non_http_scheme() {
        let handler = HttpRequest::new(&CapabilitySettings::default());
        let err = handler
            .invoke(json!({"url": "file:///etc/passwd"}), &ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidParameters(_)));
    }
}
