use crate::error::{EngineError, FetchError, Verb};
use crate::transport::Request;
use crate::value::{Map, PayloadError, Value};
use reqwest::Url;

/// Request-level settings shared by every Get and Post.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub bypass_cache: bool,
    pub content_type: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            bypass_cache: true,
            content_type: "application/json".to_string(),
        }
    }
}

/// Validates a get/post spec and builds the request. `evaluate` resolves
/// `valueOf` references against the owning node.
pub(crate) fn prepare(
    verb: Verb,
    spec: &Map,
    evaluate: impl Fn(&Map) -> Map,
    config: &RequestConfig,
) -> Result<Request, EngineError> {
    let source = match verb {
        Verb::Get => spec.get("source"),
        Verb::Post => spec.get("target").or_else(|| spec.get("source")),
    }
    .and_then(Value::as_map)
    .ok_or(EngineError::MissingSource(verb))?;

    let source = evaluate(source);
    let raw = source
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or(EngineError::InvalidUrl { verb, url: None })?;
    let url = Url::parse(raw).map_err(|_| EngineError::InvalidUrl {
        verb,
        url: Some(raw.to_string()),
    })?;

    let mut headers = Vec::new();
    let mut body = None;
    if verb == Verb::Post {
        let shape = |cause: String| EngineError::InvalidPayloadShape {
            verb,
            url: raw.to_string(),
            cause,
        };

        match spec.get("headers") {
            None => {}
            Some(Value::Map(map)) => {
                for (name, value) in map {
                    let value = value
                        .as_str()
                        .ok_or_else(|| shape(format!("header {name} is not a string")))?;
                    headers.push((name.clone(), value.to_string()));
                }
            }
            Some(_) => return Err(shape("headers must be a dictionary".to_string())),
        }

        let data = match spec.get("data") {
            None => Map::new(),
            Some(Value::Map(map)) => evaluate(map),
            Some(_) => return Err(shape("data must be a dictionary".to_string())),
        };
        let json = serde_json::to_vec(&Value::Map(data)).map_err(|e| shape(e.to_string()))?;
        if !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            headers.push(("Content-Type".to_string(), config.content_type.clone()));
        }
        body = Some(json);
    }

    Ok(Request {
        verb,
        url,
        headers,
        body,
        bypass_cache: config.bypass_cache,
    })
}

/// Turns a transport answer into the exposed data of a request node.
pub(crate) fn decode(
    verb: Verb,
    url: &str,
    result: Result<Vec<u8>, FetchError>,
) -> Result<Map, EngineError> {
    let bytes = result.map_err(|cause| EngineError::FetchFailure {
        verb,
        url: url.to_string(),
        cause,
    })?;
    if verb == Verb::Post && bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    Value::object_from_slice(&bytes).map_err(|e: PayloadError| EngineError::InvalidPayload {
        verb,
        url: url.to_string(),
        cause: e.to_string(),
    })
}
