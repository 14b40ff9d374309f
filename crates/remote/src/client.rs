//! The HTTP client implementing the pipeline's collaborator traits.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    ContinuationToken, FetchError, Item, ItemId, ItemMutator, MutationError, Page, PageFetcher,
    PendingCountSource,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{RemoteConfig, ID_PLACEHOLDER};
use crate::RemoteError;

/// Longest response-body excerpt carried in an error message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default, rename = "nextPageToken", alias = "next_page_token")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: i64,
}

/// Talks to a JSON REST collection.
///
/// One instance serves as [`PendingCountSource`], [`PageFetcher`] and
/// [`ItemMutator`]; the inner `reqwest::Client` pools connections across all
/// three.
#[derive(Debug, Clone)]
pub struct HttpCollectionClient {
    http: reqwest::Client,
    base_url: Url,
    config: RemoteConfig,
}

impl HttpCollectionClient {
    /// Validates `config` and builds the underlying HTTP client.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        config.validate()?;
        let base_url = config.parsed_base_url()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("sweep/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Appends `path` to the base URL's own path. With `id` given, `{id}` in a
    /// segment is replaced by the id, which is percent-encoded as one segment.
    fn endpoint(&self, path: &str, id: Option<&ItemId>) -> Url {
        let mut url = self.base_url.clone();
        // Validated http(s) URLs always have a path to extend.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                match id {
                    Some(id) if segment.contains(ID_PLACEHOLDER) => {
                        segments.push(&segment.replace(ID_PLACEHOLDER, id.as_str()));
                    }
                    _ => {
                        segments.push(segment);
                    }
                }
            }
        }
        url
    }

    fn authorised(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl PendingCountSource for HttpCollectionClient {
    async fn estimated_pending_count(&self) -> Result<i64, FetchError> {
        let Some(count_path) = &self.config.count_path else {
            return Err(FetchError::Unsupported {
                message: "no count_path configured".into(),
            });
        };
        let response = self
            .authorised(self.http.get(self.endpoint(count_path, None)))
            .send()
            .await
            .map_err(transport_error)?;
        let body: CountResponse = decode(check_fetch_status(response).await?).await?;
        debug!(count = body.count, "Pending-count estimate received");
        Ok(body.count)
    }
}

#[async_trait]
impl PageFetcher for HttpCollectionClient {
    #[instrument(skip_all, fields(has_token = token.is_some()))]
    async fn fetch(&self, token: Option<&ContinuationToken>) -> Result<Page, FetchError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(size) = self.config.page_size {
            query.push((self.config.page_size_param.as_str(), size.to_string()));
        }
        if let Some(token) = token {
            query.push((self.config.token_param.as_str(), token.as_str().to_string()));
        }

        let response = self
            .authorised(self.http.get(self.endpoint(&self.config.list_path, None)).query(&query))
            .send()
            .await
            .map_err(transport_error)?;
        let body: ListResponse = decode(check_fetch_status(response).await?).await?;

        let listed = body.items.len();
        let items: Vec<Item> = body.items.into_iter().filter_map(to_item).collect();
        // An empty page ends the run, so a listing with nothing usable must not
        // turn into one.
        if listed > 0 && items.is_empty() {
            return Err(FetchError::Decode {
                message: format!("none of the {listed} listed entries has a usable id"),
            });
        }
        if items.len() < listed {
            warn!(
                dropped = listed - items.len(),
                "Listing returned entries without a usable id"
            );
        }
        debug!(items = items.len(), has_next = body.next_page_token.is_some(), "Page received");
        Ok(Page::new(items, body.next_page_token))
    }
}

#[async_trait]
impl ItemMutator for HttpCollectionClient {
    async fn mutate(&self, item: &Item) -> Result<(), MutationError> {
        let mut request = self
            .http
            .request(
                self.config.mutate_method.as_reqwest(),
                self.endpoint(&self.config.mutate_path, Some(&item.id)),
            );
        if let Some(body) = &self.config.mutate_body {
            request = request.json(body);
        }
        let response = self
            .authorised(request)
            .send()
            .await
            .map_err(|err| MutationError::Transport {
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = error_body(response).await;
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MutationError::Unauthorized,
            StatusCode::NOT_FOUND => MutationError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => MutationError::RateLimited,
            s if s.is_client_error() => MutationError::Rejected { message },
            s => MutationError::Status {
                status: s.as_u16(),
                message,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn transport_error(err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        message: err.to_string(),
    }
}

async fn check_fetch_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Unauthorized);
    }
    Err(FetchError::Status {
        status: status.as_u16(),
        message: error_body(response).await,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, FetchError> {
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text).map_err(|err| FetchError::Decode {
        message: err.to_string(),
    })
}

async fn error_body(response: Response) -> String {
    let reason = response
        .status()
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string();
    match response.text().await {
        Ok(text) if !text.trim().is_empty() => {
            let mut text = text.trim().to_string();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            text
        }
        _ => reason,
    }
}

/// Builds an item from one listing entry. String and integer ids are accepted.
fn to_item(entry: serde_json::Value) -> Option<Item> {
    let id = match entry.get("id")? {
        serde_json::Value::String(s) => ItemId::new(s.clone())?,
        serde_json::Value::Number(n) => ItemId::new(n.to_string())?,
        _ => return None,
    };
    Some(Item::with_payload(id, entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_need_a_non_empty_id() {
        assert!(to_item(serde_json::json!({ "id": "" })).is_none());
        assert!(to_item(serde_json::json!({ "name": "x" })).is_none());
        assert_eq!(
            to_item(serde_json::json!({ "id": 42 })).unwrap().id.as_str(),
            "42"
        );
    }

    fn client(base: &str, mutate_path: &str) -> HttpCollectionClient {
        let mut config = RemoteConfig::new(base);
        config.mutate_path = mutate_path.into();
        HttpCollectionClient::new(config).unwrap()
    }

    #[test]
    fn mutate_url_substitutes_the_id() {
        let client = client("https://api.example.com/v1/", "/items/{id}");
        let id = ItemId::new("m 1").unwrap();
        assert_eq!(
            client.endpoint(&client.config.mutate_path, Some(&id)).as_str(),
            "https://api.example.com/v1/items/m%201"
        );
    }

    #[test]
    fn id_with_slash_stays_one_segment() {
        let client = client("https://api.example.com", "/messages/{id}/read");
        let id = ItemId::new("a/b%c").unwrap();
        assert_eq!(
            client.endpoint(&client.config.mutate_path, Some(&id)).as_str(),
            "https://api.example.com/messages/a%2Fb%25c/read"
        );
    }

    #[test]
    fn debug_output_hides_the_token() {
        let client = HttpCollectionClient::new(
            RemoteConfig::new("https://api.example.com").with_bearer_token("tok-123"),
        )
        .unwrap();
        assert!(!format!("{client:?}").contains("tok-123"));
    }

    #[test]
    fn list_path_extends_base_prefix() {
        let client = client("http://127.0.0.1:9000/api", "/items/{id}");
        assert_eq!(
            client.endpoint("/items", None).as_str(),
            "http://127.0.0.1:9000/api/items"
        );
    }
}
