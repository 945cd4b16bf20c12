//! Upstash Redis REST client.
//!
//! Upstash accepts a Redis command as a JSON array posted to the database
//! URL and answers `{"result": ...}` or `{"error": "..."}`. Multiple
//! commands can be sent in one round trip to `{url}/pipeline`.
//!
//! # API Reference
//!
//! - Authentication: `Authorization: Bearer <token>`
//! - Single command: `POST {url}` with `["SET", "key", "value", "EX", "60"]`
//! - Pipeline: `POST {url}/pipeline` with `[[...], [...]]`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::{KvError, KvStore};

/// Compare-and-delete used to release locks only by their owner.
const DEL_IF_EQ_SCRIPT: &str =
    "if redis.call('GET', KEYS[1]) == ARGV[1] then return redis.call('DEL', KEYS[1]) else return 0 end";

/// Response envelope for one command.
#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl CommandResponse {
    fn into_result(self) -> Result<Value, KvError> {
        match self.error {
            Some(error) => Err(KvError::Command(error)),
            None => Ok(self.result),
        }
    }
}

/// Upstash-backed [`KvStore`].
#[derive(Clone)]
pub struct UpstashKv {
    inner: Arc<UpstashKvInner>,
}

struct UpstashKvInner {
    client: reqwest::Client,
    url: String,
}

impl UpstashKv {
    /// Create a client for the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the token is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(url: &str, token: &SecretString) -> Result<Self, KvError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", token.expose_secret());
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| KvError::Command(format!("Invalid Upstash token: {e}")))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            inner: Arc::new(UpstashKvInner {
                client,
                url: url.trim_end_matches('/').to_string(),
            }),
        })
    }

    /// Execute one command.
    async fn command(&self, args: Vec<String>) -> Result<Value, KvError> {
        let response = self
            .inner
            .client
            .post(&self.inner.url)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: CommandResponse = serde_json::from_str(&body).map_err(|_| {
            KvError::UnexpectedResponse(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;
        parsed.into_result()
    }

    /// Execute several commands in one round trip.
    async fn pipeline(&self, commands: Vec<Vec<String>>) -> Result<Vec<Value>, KvError> {
        let response = self
            .inner
            .client
            .post(format!("{}/pipeline", self.inner.url))
            .json(&commands)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Vec<CommandResponse> = serde_json::from_str(&body).map_err(|_| {
            KvError::UnexpectedResponse(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;
        parsed.into_iter().map(CommandResponse::into_result).collect()
    }
}

impl std::fmt::Debug for UpstashKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstashKv")
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

fn cmd(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

fn as_i64(value: &Value) -> Result<i64, KvError> {
    value
        .as_i64()
        .ok_or_else(|| KvError::UnexpectedResponse(format!("expected integer, got {value}")))
}

#[async_trait]
impl KvStore for UpstashKv {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        match self.command(cmd(&["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(KvError::UnexpectedResponse(format!(
                "expected string, got {other}"
            ))),
        }
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut args = cmd(&["SET", key, value]);
        if let Some(ttl) = ttl {
            args.push("EX".to_string());
            args.push(ttl.as_secs().max(1).to_string());
        }
        self.command(args).await?;
        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let ttl_secs = ttl.as_secs().max(1).to_string();
        let result = self
            .command(cmd(&["SET", key, value, "NX", "EX", &ttl_secs]))
            .await?;
        Ok(!result.is_null())
    }

    #[instrument(skip(self, expected))]
    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        let result = self
            .command(cmd(&["EVAL", DEL_IF_EQ_SCRIPT, "1", key, expected]))
            .await?;
        Ok(as_i64(&result)? > 0)
    }

    #[instrument(skip(self), fields(count = keys.len()))]
    async fn del(&self, keys: &[String]) -> Result<u64, KvError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args = vec!["DEL".to_string()];
        args.extend(keys.iter().cloned());
        let removed = as_i64(&self.command(args).await?)?;
        Ok(u64::try_from(removed).unwrap_or(0))
    }

    #[instrument(skip(self, members), fields(count = members.len()))]
    async fn sadd(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        if members.is_empty() {
            return Ok(());
        }
        let mut sadd = vec!["SADD".to_string(), key.to_string()];
        sadd.extend(members.iter().cloned());

        match ttl {
            Some(ttl) => {
                let ttl_secs = ttl.as_secs().max(1).to_string();
                self.pipeline(vec![sadd, cmd(&["EXPIRE", key, &ttl_secs])])
                    .await?;
            }
            None => {
                self.command(sadd).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        match self.command(cmd(&["SMEMBERS", key])).await? {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(KvError::UnexpectedResponse(format!(
                "expected array, got {other}"
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        let count = as_i64(&self.command(cmd(&["INCR", key])).await?)?;
        if count == 1 {
            let ttl_secs = ttl.as_secs().max(1).to_string();
            self.command(cmd(&["EXPIRE", key, &ttl_secs])).await?;
        }
        Ok(count)
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.command(cmd(&["PING"])).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_command_response_result() {
        let ok: CommandResponse = serde_json::from_str(r#"{"result":"OK"}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), Value::String("OK".to_string()));

        let null: CommandResponse = serde_json::from_str(r#"{"result":null}"#).unwrap();
        assert!(null.into_result().unwrap().is_null());
    }

    #[test]
    fn test_command_response_error() {
        let err: CommandResponse =
            serde_json::from_str(r#"{"error":"WRONGTYPE Operation against a key"}"#).unwrap();
        assert!(matches!(err.into_result(), Err(KvError::Command(msg)) if msg.starts_with("WRONGTYPE")));
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(as_i64(&serde_json::json!(3)).unwrap(), 3);
        assert!(as_i64(&serde_json::json!("3")).is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let kv = UpstashKv::new(
            "https://eu1-fine-cat.upstash.io/",
            &SecretString::from("AXk5ASQgsecret"),
        )
        .unwrap();
        let debug_output = format!("{kv:?}");
        assert!(debug_output.contains("https://eu1-fine-cat.upstash.io"));
        assert!(!debug_output.contains("AXk5ASQgsecret"));
    }
}
