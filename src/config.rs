/// Endpoint configuration for a printcloud application.
///
/// Mirrors the values handed out when an app is registered with the
/// service: the app key plus the URLs of the authentication server that
/// exchanges secrets/codes for tokens, and the API base URL itself.
/// Built once and handed to [`SessionManager::new`](crate::SessionManager::new).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub guest_token_url: String,
    pub access_token_url: String,
    pub refresh_token_url: String,
    pub api_base_url: String,
}

impl ClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        guest_token_url: impl Into<String>,
        access_token_url: impl Into<String>,
        refresh_token_url: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            guest_token_url: guest_token_url.into(),
            access_token_url: access_token_url.into(),
            refresh_token_url: refresh_token_url.into(),
            api_base_url: api_base_url.into(),
        }
    }
}
