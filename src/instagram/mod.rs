//! Instagram Graph API client
//!
//! Covers the three provider interactions the service needs: building the
//! OAuth dialog URL, exchanging an authorization code for an access token
//! (with a long-lived upgrade), and looking up pages/media on behalf of a
//! connected business account. Base URLs are injectable so tests can point
//! the client at a mock server.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Instagram client specific errors
#[derive(Debug, Error)]
pub enum InstagramError {
    #[error("OAuth authentication failed: {0}")]
    OAuthError(String),

    #[error("API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("no linked Instagram business account found")]
    NoLinkedAccount,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Token endpoint response. `expires_in` is the provider-declared lifetime
/// in seconds; Meta omits it for tokens that do not expire.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// The linked business account resolved from the page listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessAccount {
    /// Page the account hangs off
    pub page_id: String,
    /// The instagram_business_account id used for media lookups
    pub account_id: String,
    pub username: String,
    pub account_type: String,
}

/// A story/media object returned by the Graph API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryMedia {
    pub id: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageListing {
    #[serde(default)]
    data: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    id: String,
    #[serde(default)]
    instagram_business_account: Option<LinkedAccount>,
}

#[derive(Debug, Deserialize)]
struct LinkedAccount {
    id: String,
    #[serde(default)]
    username: Option<String>,
}

/// Instagram Graph API client
#[derive(Clone)]
pub struct InstagramClient {
    app_id: Option<String>,
    app_secret: Option<String>,
    oauth_base: String,
    graph_base: String,
    redirect_uri: String,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl InstagramClient {
    /// Create a client from explicit parts.
    pub fn new(
        app_id: Option<String>,
        app_secret: Option<String>,
        oauth_base: String,
        graph_base: String,
        redirect_uri: String,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            app_id,
            app_secret,
            oauth_base: oauth_base.trim_end_matches('/').to_string(),
            graph_base: graph_base.trim_end_matches('/').to_string(),
            redirect_uri,
            scopes,
            http: reqwest::Client::new(),
        }
    }

    /// Create a client from application configuration.
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self::new(
            config.instagram_app_id.clone(),
            config.instagram_app_secret.clone(),
            config.instagram_oauth_base.clone(),
            config.instagram_graph_base.clone(),
            config.oauth_redirect_uri(),
            config.instagram_scope_list(),
        )
    }

    fn app_id(&self) -> Result<&str, InstagramError> {
        self.app_id
            .as_deref()
            .ok_or_else(|| InstagramError::ConfigError("Instagram app id is not set".to_string()))
    }

    fn app_secret(&self) -> Result<&str, InstagramError> {
        self.app_secret.as_deref().ok_or_else(|| {
            InstagramError::ConfigError("Instagram app secret is not set".to_string())
        })
    }

    /// Build the OAuth dialog URL for the given state token. Pure: no I/O.
    pub fn authorize_url(&self, state: &str) -> Result<Url, InstagramError> {
        let app_id = self.app_id()?;

        let mut url = Url::parse(&format!("{}/v19.0/dialog/oauth", self.oauth_base))?;
        url.query_pairs_mut()
            .append_pair("client_id", app_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", &self.scopes.join(","))
            .append_pair("response_type", "code");

        Ok(url)
    }

    /// Exchange an authorization code for a short-lived access token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, InstagramError> {
        let app_id = self.app_id()?.to_string();
        let app_secret = self.app_secret()?.to_string();

        let mut url = Url::parse(&format!("{}/oauth/access_token", self.graph_base))?;
        url.query_pairs_mut()
            .append_pair("client_id", &app_id)
            .append_pair("client_secret", &app_secret)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("code", code);

        let response = self.http.get(url).send().await?;

        if response.status().is_success() {
            let token: TokenResponse = response.json().await?;
            Ok(token)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(InstagramError::OAuthError(format!(
                "Token exchange failed: {} - {}",
                status, body
            )))
        }
    }

    /// Upgrade a short-lived token to a long-lived one (~60 days).
    pub async fn exchange_long_lived(
        &self,
        access_token: &str,
    ) -> Result<TokenResponse, InstagramError> {
        let app_id = self.app_id()?.to_string();
        let app_secret = self.app_secret()?.to_string();

        let mut url = Url::parse(&format!("{}/oauth/access_token", self.graph_base))?;
        url.query_pairs_mut()
            .append_pair("grant_type", "fb_exchange_token")
            .append_pair("client_id", &app_id)
            .append_pair("client_secret", &app_secret)
            .append_pair("fb_exchange_token", access_token);

        let response = self.http.get(url).send().await?;

        if response.status().is_success() {
            let token: TokenResponse = response.json().await?;
            Ok(token)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(InstagramError::OAuthError(format!(
                "Long-lived token exchange failed: {} - {}",
                status, body
            )))
        }
    }

    /// Resolve the connected page and its linked Instagram business account.
    pub async fn resolve_business_account(
        &self,
        access_token: &str,
    ) -> Result<BusinessAccount, InstagramError> {
        let mut url = Url::parse(&format!("{}/me/accounts", self.graph_base))?;
        url.query_pairs_mut()
            .append_pair("fields", "id,name,instagram_business_account{id,username}")
            .append_pair("access_token", access_token);

        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InstagramError::ApiError {
                status,
                message: format!("Failed to list pages: {}", body),
            });
        }

        let listing: PageListing = response.json().await?;

        let linked = listing
            .data
            .into_iter()
            .find_map(|page| {
                page.instagram_business_account
                    .map(|account| (page.id, account))
            })
            .ok_or(InstagramError::NoLinkedAccount)?;

        let (page_id, account) = linked;
        Ok(BusinessAccount {
            page_id,
            username: account.username.unwrap_or_default(),
            account_id: account.id,
            account_type: "business".to_string(),
        })
    }

    /// Look up a story/media object by its external id. A successful
    /// response proves the content exists.
    pub async fn get_story(
        &self,
        story_id: &str,
        access_token: &str,
    ) -> Result<StoryMedia, InstagramError> {
        let mut url = Url::parse(&format!("{}/{}", self.graph_base, story_id))?;
        url.query_pairs_mut()
            .append_pair("fields", "id,media_type,media_url,permalink,timestamp")
            .append_pair("access_token", access_token);

        let response = self.http.get(url).send().await?;

        if response.status().is_success() {
            let media: StoryMedia = response.json().await?;
            Ok(media)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(InstagramError::ApiError {
                status,
                message: format!("Story lookup failed: {}", body),
            })
        }
    }
}

/// Extract the external story id from a submitted story URL.
///
/// Accepts the canonical `https://instagram.com/stories/{username}/{id}`
/// shape and falls back to a bare numeric id.
pub fn extract_story_id(content_url: &str) -> Option<String> {
    if content_url.chars().all(|c| c.is_ascii_digit()) && !content_url.is_empty() {
        return Some(content_url.to_string());
    }

    let url = Url::parse(content_url).ok()?;
    let mut segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    // .../stories/{username}/{story_id}
    let story_id = segments.pop()?;
    if segments.len() >= 2 && segments[segments.len() - 2] == "stories" {
        if story_id.chars().all(|c| c.is_ascii_digit()) {
            return Some(story_id.to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> InstagramClient {
        InstagramClient::new(
            Some("app-id-123".to_string()),
            Some("app-secret-456".to_string()),
            "https://www.facebook.com".to_string(),
            "https://graph.facebook.com/v19.0".to_string(),
            "https://app.example.com/oauth/callback".to_string(),
            vec![
                "instagram_basic".to_string(),
                "instagram_manage_insights".to_string(),
            ],
        )
    }

    #[test]
    fn authorize_url_contains_required_parameters() {
        let client = test_client();
        let url = client.authorize_url("state-abc").unwrap();

        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("www.facebook.com"));
        assert_eq!(url.path(), "/v19.0/dialog/oauth");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("client_id").unwrap(), "app-id-123");
        assert_eq!(pairs.get("state").unwrap(), "state-abc");
        assert_eq!(pairs.get("response_type").unwrap(), "code");
        assert_eq!(
            pairs.get("scope").unwrap(),
            "instagram_basic,instagram_manage_insights"
        );
        assert_eq!(
            pairs.get("redirect_uri").unwrap(),
            "https://app.example.com/oauth/callback"
        );
        // The raw query must carry the redirect URI percent-encoded.
        assert!(url.query().unwrap().contains("redirect_uri=https%3A%2F%2F"));
    }

    #[test]
    fn authorize_url_requires_app_id() {
        let client = InstagramClient::new(
            None,
            None,
            "https://www.facebook.com".to_string(),
            "https://graph.facebook.com/v19.0".to_string(),
            "https://app.example.com/oauth/callback".to_string(),
            vec![],
        );

        assert!(matches!(
            client.authorize_url("state"),
            Err(InstagramError::ConfigError(_))
        ));
    }

    #[test]
    fn extract_story_id_from_canonical_url() {
        assert_eq!(
            extract_story_id("https://instagram.com/stories/chef_anna/18012345678901234"),
            Some("18012345678901234".to_string())
        );
        assert_eq!(
            extract_story_id("https://www.instagram.com/stories/chef_anna/18012345678901234/"),
            Some("18012345678901234".to_string())
        );
    }

    #[test]
    fn extract_story_id_accepts_bare_ids() {
        assert_eq!(
            extract_story_id("18012345678901234"),
            Some("18012345678901234".to_string())
        );
    }

    #[test]
    fn extract_story_id_rejects_other_urls() {
        assert_eq!(extract_story_id("https://instagram.com/p/abc123/"), None);
        assert_eq!(
            extract_story_id("https://instagram.com/stories/chef_anna/not-an-id"),
            None
        );
        assert_eq!(extract_story_id("not a url"), None);
    }
}
