//! A [`RemoteSyncClient`] speaking JSON over HTTP.
//!
//! Every request carries the session's bearer credential. Paths are relative
//! to the base url:
//!
//! | call | request |
//! |---|---|
//! | fetch | `GET {kind}/{user}` |
//! | add | `POST {kind}/{user}/items` with `{"product": .., "quantity": n}` |
//! | remove | `POST {kind}/{user}/items/{item}/remove` with `{"quantity": n}` |
//! | clear | `DELETE {kind}/{user}` |
//! | unread counts | `GET chats/{user}/unread` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shopsync_client::{RemoteError, RemoteSyncClient};
use shopsync_common::{ChannelSummary, CollectionKind, CollectionSnapshot, ItemId, NewItem, Session};
use tracing::{debug, trace, warn};
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Settings for the HTTP client
pub struct RestSettings {
    /// Per-request timeout in milliseconds (default: 10s)
    pub timeout_ms: u64,
    pub user_agent: Option<String>,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: None,
        }
    }
}

#[derive(Serialize)]
struct AddBody<'a> {
    product: &'a NewItem,
    quantity: u32,
}

#[derive(Serialize)]
struct RemoveBody {
    quantity: u32,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Talks to the shop backend over HTTP.
#[derive(Clone, Debug)]
pub struct HttpSyncClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSyncClient {
    pub fn new(base_url: Url, settings: &RestSettings) -> Result<Self, RemoteError> {
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Network(format!("{} cannot be used as a base url", base_url)));
        }

        let mut builder = reqwest::Client::builder().timeout(Duration::from_millis(settings.timeout_ms));
        if let Some(user_agent) = &settings.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|err| RemoteError::Network(err.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn parse(base_url: &str, settings: &RestSettings) -> Result<Self, RemoteError> {
        let base_url =
            Url::parse(base_url).map_err(|err| RemoteError::Network(format!("invalid base url: {}", err)))?;
        Self::new(base_url, settings)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base url with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn collection_url(&self, kind: CollectionKind, session: &Session) -> Url {
        self.endpoint(&[kind.path_segment(), session.user_id.as_str()])
    }

    fn request(&self, method: Method, url: Url, session: &Session) -> RequestBuilder {
        trace!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(session.token.expose())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("credential rejected by {}", response.url());
            return Err(RemoteError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("{} answered {}: {}", self.base_url, status, body);
        Err(status_error(status, &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))
    }
}

#[async_trait(?Send)]
impl RemoteSyncClient for HttpSyncClient {
    async fn fetch_collection(
        &self,
        session: &Session,
        kind: CollectionKind,
    ) -> Result<CollectionSnapshot, RemoteError> {
        let url = self.collection_url(kind, session);
        self.json(self.request(Method::GET, url, session)).await
    }

    async fn add_to_collection(
        &self,
        session: &Session,
        kind: CollectionKind,
        item: &NewItem,
        quantity: u32,
    ) -> Result<CollectionSnapshot, RemoteError> {
        let url = self.endpoint(&[kind.path_segment(), session.user_id.as_str(), "items"]);
        let body = AddBody {
            product: item,
            quantity,
        };
        self.json(self.request(Method::POST, url, session).json(&body))
            .await
    }

    async fn remove_from_collection(
        &self,
        session: &Session,
        kind: CollectionKind,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<CollectionSnapshot, RemoteError> {
        let url = self.endpoint(&[
            kind.path_segment(),
            session.user_id.as_str(),
            "items",
            item_id.as_str(),
            "remove",
        ]);
        self.json(self.request(Method::POST, url, session).json(&RemoveBody { quantity }))
            .await
    }

    async fn clear_collection(&self, session: &Session, kind: CollectionKind) -> Result<(), RemoteError> {
        let url = self.collection_url(kind, session);
        self.send(self.request(Method::DELETE, url, session)).await?;
        Ok(())
    }

    async fn fetch_channel_summaries(&self, session: &Session) -> Result<Vec<ChannelSummary>, RemoteError> {
        let url = self.endpoint(&["chats", session.user_id.as_str(), "unread"]);
        self.json(self.request(Method::GET, url, session)).await
    }
}

fn network_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Network(String::from("request timed out"))
    } else if err.is_decode() {
        RemoteError::Decode(err.to_string())
    } else {
        RemoteError::Network(err.to_string())
    }
}

/// Prefers the `message` of a JSON error body, then the raw body, then the
/// reason phrase.
fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { message }) => message,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
    };
    RemoteError::Status {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsync_common::{AuthToken, Price};

    fn client(base: &str) -> HttpSyncClient {
        HttpSyncClient::parse(base, &RestSettings::default()).unwrap()
    }

    fn session() -> Session {
        Session::new("user 7", AuthToken::new("abc"), "Grace")
    }

    #[test]
    fn endpoints_are_relative_to_the_base_path() {
        let api = client("https://shop.test/api/v1/");
        assert_eq!(
            api.collection_url(CollectionKind::Wishlist, &session()).as_str(),
            "https://shop.test/api/v1/wishlist/user%207"
        );

        let api = client("https://shop.test/api");
        let url = api.endpoint(&["cart", "u1", "items", "a/b", "remove"]);
        assert_eq!(url.as_str(), "https://shop.test/api/cart/u1/items/a%2Fb/remove");
    }

    #[test]
    fn requests_carry_the_bearer_credential() {
        let api = client("https://shop.test/");
        let url = api.endpoint(&["chats", "u1", "unread"]);
        let request = api.request(Method::GET, url, &session()).build().unwrap();
        assert_eq!(request.headers()[reqwest::header::AUTHORIZATION], "Bearer abc");
        assert_eq!(request.method(), &Method::GET);
    }

    #[test]
    fn add_body_wraps_the_product() {
        let item = NewItem::new("p1", "Lamp", Price::from_minor(1250));
        let body = serde_json::to_value(AddBody {
            product: &item,
            quantity: 2,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "product": {"productId": "p1", "title": "Lamp", "price": 12.5},
                "quantity": 2
            })
        );
        assert_eq!(
            serde_json::to_value(RemoveBody { quantity: 3 }).unwrap(),
            serde_json::json!({"quantity": 3})
        );
    }

    #[test]
    fn status_errors_prefer_the_server_message() {
        let err = status_error(StatusCode::CONFLICT, r#"{"message":"out of stock"}"#);
        assert_eq!(
            err,
            RemoteError::Status {
                status: 409,
                message: "out of stock".into()
            }
        );

        let err = status_error(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.to_string(), "server responded with 502: upstream down");

        let err = status_error(StatusCode::NOT_FOUND, "");
        assert_eq!(err.to_string(), "server responded with 404: Not Found");
    }

    #[test]
    fn opaque_urls_are_rejected() {
        assert!(HttpSyncClient::parse("mailto:shop@example.com", &RestSettings::default()).is_err());
        assert!(HttpSyncClient::parse("not a url", &RestSettings::default()).is_err());
    }

    #[test]
    fn settings_fall_back_to_defaults() {
        let settings: RestSettings = serde_json::from_str(r#"{"user_agent": "shop/1.0"}"#).unwrap();
        assert_eq!(settings.timeout_ms, 10_000);
        assert_eq!(settings.user_agent.as_deref(), Some("shop/1.0"));
    }
}
