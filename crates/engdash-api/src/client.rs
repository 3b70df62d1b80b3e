use std::time::Duration;

use serde_json::Value;

use crate::entity::Entity;
use crate::error::ApiError;

/// Kind of write against a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteMode {
    /// POST a new record.
    Create(Value),
    /// PUT an existing record.
    Update { id: i64, body: Value },
    Delete { id: i64 },
}

impl WriteMode {
    /// Create when the entity has no id yet, update otherwise.
    pub fn save(entity: &Entity, with_parent: bool) -> Self {
        let body = entity.payload(with_parent);
        match entity.id {
            Some(id) => Self::Update { id, body },
            None => Self::Create(body),
        }
    }

    fn method(&self) -> reqwest::Method {
        match self {
            Self::Create(_) => reqwest::Method::POST,
            Self::Update { .. } => reqwest::Method::PUT,
            Self::Delete { .. } => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The stored record as returned by the server.
    Saved(Entity),
    /// Whether the record existed and was removed.
    Deleted(bool),
}

/// REST client for entity collections under a base URL.
///
/// Routes: `GET {base}/{collection}/`, `GET {base}/{collection}/{id}/`,
/// `POST {base}/{collection}/`, `PUT`/`DELETE {base}/{collection}/{id}/`.
#[derive(Debug, Clone)]
pub struct EntityClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl EntityClient {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}/", self.base_url, collection.trim_matches('/'))
    }

    pub fn entity_url(&self, collection: &str, id: &str) -> String {
        format!("{}{}/", self.collection_url(collection), id)
    }

    pub async fn fetch_entities(&self, collection: &str) -> Result<Vec<Entity>, ApiError> {
        let body = self
            .send(reqwest::Method::GET, self.collection_url(collection), None)
            .await?;
        decode_list(&body)
    }

    pub async fn fetch_entity(&self, collection: &str, id: &str) -> Result<Entity, ApiError> {
        let body = self
            .send(reqwest::Method::GET, self.entity_url(collection, id), None)
            .await?;
        decode_entity(&body)
    }

    pub async fn write_entity(
        &self,
        collection: &str,
        mode: WriteMode,
    ) -> Result<WriteOutcome, ApiError> {
        let method = mode.method();
        match mode {
            WriteMode::Create(body) => {
                let resp = self
                    .send(method, self.collection_url(collection), Some(&body))
                    .await?;
                saved(&resp, body)
            }
            WriteMode::Update { id, body } => {
                let url = self.entity_url(collection, &id.to_string());
                let resp = self.send(method, url, Some(&body)).await?;
                let mut fallback = body;
                if let Value::Object(map) = &mut fallback {
                    map.insert("id".into(), Value::from(id));
                }
                saved(&resp, fallback)
            }
            WriteMode::Delete { id } => {
                let url = self.entity_url(collection, &id.to_string());
                match self.send(method, url, None).await {
                    Ok(_) => Ok(WriteOutcome::Deleted(true)),
                    Err(e) if e.is_not_found() => Ok(WriteOutcome::Deleted(false)),
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: String,
        body: Option<&Value>,
    ) -> Result<String, ApiError> {
        tracing::debug!(%method, %url, "request");
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(%method, %url, error = %e, "request failed");
            ApiError::from(e)
        })?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        check_status(status, text).inspect_err(|e| {
            tracing::warn!(%method, %url, status, error = %e, "request rejected");
        })
    }
}

/// Turn a status and body into the body or an [`ApiError::Status`].
pub fn check_status(status: u16, body: String) -> Result<String, ApiError> {
    if (200..300).contains(&status) {
        Ok(body)
    } else {
        Err(ApiError::Status { status, body })
    }
}

/// A collection body: either a bare array or a paginated envelope with
/// a `results` array.
pub fn decode_list(body: &str) -> Result<Vec<Entity>, ApiError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => Ok(serde_json::from_value(Value::Array(items))?),
        Value::Object(mut map) => match map.remove("results") {
            Some(results @ Value::Array(_)) => Ok(serde_json::from_value(results)?),
            _ => Err(ApiError::Decode(
                "expected an array or an object with `results`".into(),
            )),
        },
        _ => Err(ApiError::Decode("expected an array of entities".into())),
    }
}

pub fn decode_entity(body: &str) -> Result<Entity, ApiError> {
    match serde_json::from_str::<Value>(body)? {
        value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
        _ => Err(ApiError::Decode("expected an entity object".into())),
    }
}

/// A successful POST/PUT. Servers answering `204 No Content` get the
/// request body echoed back as the stored record.
fn saved(resp: &str, sent: Value) -> Result<WriteOutcome, ApiError> {
    if resp.trim().is_empty() {
        return Ok(WriteOutcome::Saved(serde_json::from_value(sent)?));
    }
    decode_entity(resp).map(WriteOutcome::Saved)
}
