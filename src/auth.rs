//! OAuth2 installed-flow authentication for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{OrganizerError, Result};

/// Message metadata and modification plus label management. No permanent deletion.
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Build an authenticated hub, running the browser flow when no cached token exists
///
/// With `force`, the cached token is discarded first so the user re-consents.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
    force: bool,
) -> Result<GmailHub> {
    if force && token_cache_path.exists() {
        tokio::fs::remove_file(token_cache_path).await?;
        tracing::info!("Removed cached token at {:?}", token_cache_path);
    }

    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| {
            OrganizerError::AuthError(format!(
                "Failed to read credentials from {:?}: {}",
                credentials_path, e
            ))
        })?;

    if let Some(parent) = token_cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| OrganizerError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token up front so it is cached with every scope the run needs
    auth.token(REQUIRED_SCOPES)
        .await
        .map_err(|e| OrganizerError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| OrganizerError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Shape of a desktop-app credentials.json
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

/// Parse credentials.json so a missing or malformed file is reported before the browser opens
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        OrganizerError::AuthError(format!("Failed to read credentials from {:?}: {}", path, e))
    })?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Restrict the cached token to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_credentials() {
        let credentials_json = r#"{
            "installed": {
                "client_id": "organizer-client",
                "project_id": "mail-organizer",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "shh",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), credentials_json)
            .await
            .unwrap();

        let creds = load_credentials(temp_file.path()).await.unwrap();
        assert_eq!(creds.installed.client_id, "organizer-client");
        assert_eq!(creds.installed.project_id, "mail-organizer");
    }

    #[tokio::test]
    async fn test_load_credentials_missing_file() {
        let result = load_credentials(Path::new("/nonexistent/credentials.json")).await;
        assert!(matches!(result, Err(OrganizerError::AuthError(_))));
    }

    #[tokio::test]
    async fn test_initialize_without_credentials_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = initialize_gmail_hub(
            &dir.path().join("credentials.json"),
            &dir.path().join("token.json"),
            false,
        )
        .await;
        assert!(matches!(result, Err(OrganizerError::AuthError(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_secure_token_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "token").await.unwrap();

        secure_token_file(temp_file.path()).await.unwrap();

        let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_scopes() {
        assert_eq!(REQUIRED_SCOPES.len(), 2);
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.modify"));
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.labels"));
    }
}
