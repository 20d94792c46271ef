use serde::Deserialize;

/// What the identity provider vouches for after verifying an ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity provider rejected the token")]
    Rejected,

    #[error("Token was issued for a different client")]
    AudienceMismatch,
}

/// Response subset of the provider's tokeninfo endpoint.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    email: String,
    name: Option<String>,
    picture: Option<String>,
    aud: Option<String>,
}

/// Verifies Google ID tokens against the tokeninfo endpoint. The endpoint is
/// configurable so tests can point it at a local stub.
#[derive(Clone)]
pub struct GoogleVerifier {
    client: reqwest::Client,
    tokeninfo_url: String,
    expected_audience: Option<String>,
}

impl GoogleVerifier {
    pub fn new(tokeninfo_url: &str, expected_audience: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokeninfo_url: tokeninfo_url.to_string(),
            expected_audience,
        }
    }

    pub async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, VerifyError> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VerifyError::Rejected);
        }

        let info: TokenInfo = response.json().await?;

        if let Some(expected) = &self.expected_audience {
            if info.aud.as_deref() != Some(expected.as_str()) {
                return Err(VerifyError::AudienceMismatch);
            }
        }

        // The provider decorates picture URLs with sizing params; store the
        // bare URL so it stays stable across logins.
        let picture = info.picture.as_deref().map(strip_url_query);

        let name = info
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| info.email.split('@').next().unwrap_or("user").to_string());

        Ok(VerifiedIdentity {
            email: info.email,
            name,
            picture,
        })
    }
}

/// Drop any query-string suffix from a URL, leaving it untouched if it does
/// not parse.
pub fn strip_url_query(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_url_query_removes_suffix() {
        assert_eq!(
            strip_url_query("https://lh3.googleusercontent.com/a/photo.jpg?sz=50"),
            "https://lh3.googleusercontent.com/a/photo.jpg"
        );
    }

    #[test]
    fn strip_url_query_leaves_clean_urls_alone() {
        assert_eq!(
            strip_url_query("https://lh3.googleusercontent.com/a/photo.jpg"),
            "https://lh3.googleusercontent.com/a/photo.jpg"
        );
    }

    #[test]
    fn strip_url_query_passes_through_unparseable_input() {
        assert_eq!(strip_url_query("not a url"), "not a url");
    }
}
