//! Endpoint configuration for [`HttpCollectionClient`](crate::HttpCollectionClient).

use serde::{Deserialize, Serialize};
use url::Url;

use crate::RemoteError;

/// Placeholder in [`RemoteConfig::mutate_path`] replaced by the item id.
pub const ID_PLACEHOLDER: &str = "{id}";

/// HTTP method used for the per-item mutation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutateMethod {
    #[default]
    Post,
    Patch,
    Put,
    Delete,
}

impl MutateMethod {
    pub(crate) fn as_reqwest(self) -> reqwest::Method {
        match self {
            MutateMethod::Post => reqwest::Method::POST,
            MutateMethod::Patch => reqwest::Method::PATCH,
            MutateMethod::Put => reqwest::Method::PUT,
            MutateMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Where the collection lives and how to talk to it.
///
/// Deserialised from the `[remote]` table of the run configuration. The
/// bearer token is never read from the file; the caller supplies it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Scheme, host and optional path prefix, e.g. `https://api.example.com/v1`.
    pub base_url: String,

    /// Listing endpoint, relative to `base_url`.
    #[serde(default = "default_list_path")]
    pub list_path: String,

    /// Pending-count endpoint. When absent the estimate is reported unknown.
    #[serde(default)]
    pub count_path: Option<String>,

    /// Mutation endpoint containing `{id}`.
    #[serde(default = "default_mutate_path")]
    pub mutate_path: String,

    #[serde(default)]
    pub mutate_method: MutateMethod,

    /// JSON body sent with every mutation call, if any.
    #[serde(default)]
    pub mutate_body: Option<serde_json::Value>,

    /// Requested page size. The service may return fewer items.
    #[serde(default)]
    pub page_size: Option<u32>,

    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,

    #[serde(default = "default_token_param")]
    pub token_param: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(skip)]
    pub bearer_token: Option<String>,
}

fn default_list_path() -> String {
    "/items".into()
}

fn default_mutate_path() -> String {
    format!("/items/{ID_PLACEHOLDER}")
}

fn default_page_size_param() -> String {
    "pageSize".into()
}

fn default_token_param() -> String {
    "pageToken".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl RemoteConfig {
    /// Creates a config for `base_url` with every other field at its default.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            list_path: default_list_path(),
            count_path: None,
            mutate_path: default_mutate_path(),
            mutate_method: MutateMethod::default(),
            mutate_body: None,
            page_size: None,
            page_size_param: default_page_size_param(),
            token_param: default_token_param(),
            request_timeout_secs: default_timeout_secs(),
            bearer_token: None,
        }
    }

    /// Attaches the credential sent as `Authorization: Bearer …`.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Parses `base_url`. Only absolute `http`/`https` URLs with a host pass.
    pub fn parsed_base_url(&self) -> Result<Url, RemoteError> {
        let url = Url::parse(&self.base_url).map_err(|err| RemoteError::InvalidConfig {
            message: format!("base_url '{}' is not a valid URL: {err}", self.base_url),
        })?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(RemoteError::InvalidConfig {
                    message: format!("base_url must use http or https, got '{scheme}'"),
                });
            }
        }
        if url.host().is_none() {
            return Err(RemoteError::InvalidConfig {
                message: format!("base_url '{}' has no host", self.base_url),
            });
        }
        Ok(url)
    }

    /// Checks the fields that would otherwise fail on the first request.
    pub fn validate(&self) -> Result<(), RemoteError> {
        self.parsed_base_url()?;
        if !self.mutate_path.contains(ID_PLACEHOLDER) {
            return Err(RemoteError::InvalidConfig {
                message: format!("mutate_path must contain '{ID_PLACEHOLDER}'"),
            });
        }
        if self.page_size == Some(0) {
            return Err(RemoteError::InvalidConfig {
                message: "page_size must be at least 1".into(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(RemoteError::InvalidConfig {
                message: "request_timeout_secs must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("list_path", &self.list_path)
            .field("count_path", &self.count_path)
            .field("mutate_path", &self.mutate_path)
            .field("mutate_method", &self.mutate_method)
            .field("mutate_body", &self.mutate_body)
            .field("page_size", &self.page_size)
            .field("page_size_param", &self.page_size_param)
            .field("token_param", &self.token_param)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
