use crate::error::VetdeskError;
use crate::social::provider::Provider;
use reqwest::StatusCode;
use serde_json::Value;

/// A provider response read in full: JSON when it parses, raw text always.
#[derive(Debug, Clone)]
pub struct UpstreamBody {
    pub status: StatusCode,
    pub json: Option<Value>,
    pub text: String,
}

impl UpstreamBody {
    pub async fn read(resp: reqwest::Response) -> Result<Self, VetdeskError> {
        let status = resp.status();
        let text = resp.text().await?;
        Ok(Self::new(status, text))
    }

    pub fn new(status: StatusCode, text: String) -> Self {
        let json = serde_json::from_str::<Value>(&text).ok();
        Self { status, json, text }
    }

    /// Extract `(code, description)` from whichever error shape the provider uses.
    pub fn error_detail(&self) -> (String, String) {
        let fallback_code = format!("http_{}", self.status.as_u16());
        let fallback_description = {
            let t = self.text.trim();
            if t.is_empty() {
                self.status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_string()
            } else {
                t.to_string()
            }
        };

        let Some(json) = self.json.as_ref() else {
            return (fallback_code, fallback_description);
        };

        let code = first_scalar(
            json,
            &[
                "/error",
                "/error/type",
                "/error/code",
                "/error_type",
                "/errors/0/code",
                "/code",
                "/serviceErrorCode",
            ],
        )
        .unwrap_or(fallback_code);
        let description = first_scalar(
            json,
            &[
                "/error_description",
                "/error/message",
                "/error_message",
                "/errors/0/message",
                "/message",
            ],
        )
        .unwrap_or(fallback_description);
        (code, description)
    }

    pub fn into_error(self, provider: Provider, stage: &'static str) -> VetdeskError {
        let (code, description) = self.error_detail();
        VetdeskError::Provider {
            provider,
            stage,
            status: self.status.as_u16(),
            code,
            description,
        }
    }
}

/// First pointer that resolves to a string or number.
fn first_scalar(json: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match json.pointer(p)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Render a string or number found at `pointer`.
pub(crate) fn scalar_at(json: &Value, pointer: &str) -> Option<String> {
    first_scalar(json, &[pointer])
}
