use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::PlanningError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub access_token: String,
}

/// Identity snapshot handed to callers: `loading` is true until the
/// first session lookup finishes, after which `user` is authoritative.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub loading: bool,
    pub user: Option<User>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: User,
}

/// Client for the store's bundled identity provider. Sessions live in a
/// file under the data directory so the CLI stays signed in across runs.
#[derive(Debug, Clone)]
pub struct AuthClient {
    auth_url: String,
    api_key: String,
    session_path: PathBuf,
    client: reqwest::Client,
}

impl AuthClient {
    pub fn new(
        store_url: impl Into<String>,
        api_key: impl Into<String>,
        data_dir: &Path,
    ) -> Result<Self, PlanningError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            auth_url: format!("{}/auth/v1", store_url.into()),
            api_key: api_key.into(),
            session_path: data_dir.join("session.data"),
            client,
        })
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, PlanningError> {
        let url = format!("{}/token?grant_type=password", self.auth_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PlanningError::Server {
                status: status.as_u16(),
                detail: detail.trim().to_string(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|_| PlanningError::Format("token response"))?;

        info!(email = %token.user.email, "signed in");
        Ok(Session {
            user: token.user,
            access_token: token.access_token,
        })
    }

    #[instrument(skip(self, session))]
    pub async fn sign_out(&self, session: &Session) -> Result<(), PlanningError> {
        let url = format!("{}/logout", self.auth_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Local sign-out still proceeds; the server-side revoke is
            // best-effort.
            warn!(status = %status, "logout request rejected");
        }
        Ok(())
    }

    /// Persist a session so later invocations pick it up.
    pub fn remember(&self, session: &Session) -> anyhow::Result<()> {
        let payload = serde_json::to_string(session)?;
        fs::write(&self.session_path, payload)?;
        debug!(path = %self.session_path.display(), "session saved");
        Ok(())
    }

    pub fn forget(&self) -> anyhow::Result<()> {
        if self.session_path.exists() {
            fs::remove_file(&self.session_path)?;
        }
        Ok(())
    }

    /// The remembered session, if any. A corrupt session file counts as
    /// signed out.
    pub fn current(&self) -> Option<Session> {
        let raw = fs::read_to_string(&self.session_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable session file");
                None
            }
        }
    }

    pub fn state(&self) -> AuthState {
        AuthState {
            loading: false,
            user: self.current().map(|s| s.user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(dir: &Path) -> AuthClient {
        AuthClient::new("https://plans.example.co", "anon-key", dir).expect("client")
    }

    #[test]
    fn sessions_round_trip_through_the_session_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = client(dir.path());

        assert!(auth.current().is_none());
        assert!(auth.state().user.is_none());

        let session = Session {
            user: User {
                id: Uuid::new_v4(),
                email: "sam@example.co".to_string(),
            },
            access_token: "jwt".to_string(),
        };
        auth.remember(&session).expect("remember");

        let restored = auth.current().expect("session");
        assert_eq!(restored.user, session.user);

        auth.forget().expect("forget");
        assert!(auth.current().is_none());
    }

    #[test]
    fn corrupt_session_file_reads_as_signed_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = client(dir.path());
        fs::write(dir.path().join("session.data"), "{not json").expect("write");
        assert!(auth.current().is_none());
    }
}
