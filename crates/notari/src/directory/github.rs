//! GitHub directory client. Issues one GraphQL query per lookup and maps the
//! response into a normalized [`User`](super::User).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{Key, Provider, User};

const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

// Teams are fetched alongside public keys in the same round trip, but
// intentionally never surfaced in claims below — the token's claim list is
// exhaustive and does not include them.
const QUERY: &str = r#"
query($login: String!) {
  user(login: $login) {
    login
    id
    name
    databaseId
    publicKeys(first: 100) {
      totalCount
      nodes { id fingerprint key }
    }
    organizations(first: 100) {
      nodes {
        id
        name
        databaseId
        teams(first: 100, userLogins: [$login]) {
          nodes { id name databaseId }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    data: Option<GraphqlData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    user: Option<GithubUserData>,
}

#[derive(Debug, Deserialize)]
struct GithubUserData {
    login: String,
    #[allow(dead_code)]
    id: String,
    name: Option<String>,
    #[serde(rename = "databaseId")]
    database_id: i64,
    #[serde(rename = "publicKeys")]
    public_keys: Nodes<GithubKey>,
    organizations: Nodes<GithubOrganization>,
}

#[derive(Debug, Deserialize)]
struct GithubKey {
    #[allow(dead_code)]
    id: String,
    key: String,
    fingerprint: String,
}

#[derive(Debug, Deserialize)]
struct GithubOrganization {
    #[allow(dead_code)]
    id: String,
    name: String,
    #[allow(dead_code)]
    #[serde(rename = "databaseId")]
    database_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

/// Builds the claims GitHub contributes, unprefixed — the caller (the token
/// minter) applies `config.claim_prefix`.
fn claims_for(user: &GithubUserData) -> HashMap<String, Value> {
    let mut claims = HashMap::new();
    claims.insert(
        "github_name".to_string(),
        Value::String(user.name.clone().unwrap_or_default()),
    );
    claims.insert(
        "github_username".to_string(),
        Value::String(user.login.clone()),
    );
    claims.insert(
        "github_user_id".to_string(),
        Value::Number(user.database_id.into()),
    );
    let organizations: Vec<Value> = user
        .organizations
        .nodes
        .iter()
        .map(|org| Value::String(org.name.clone()))
        .collect();
    claims.insert(
        "github_organizations".to_string(),
        Value::Array(organizations),
    );
    claims
}

pub struct GithubProvider {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl GithubProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: GITHUB_GRAPHQL_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn new_with_base_url(token: Option<String>, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url,
        }
    }
}

#[async_trait]
impl Provider for GithubProvider {
    async fn get_user(&self, username: &str) -> Result<User, anyhow::Error> {
        let mut request = self
            .client
            .post(&self.base_url)
            .header("Accept", "application/vnd.github.v4.idl")
            .json(&serde_json::json!({
                "query": QUERY,
                "variables": { "login": username },
            }));

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let envelope: GraphqlEnvelope = response.error_for_status()?.json().await?;

        if let Some(error) = envelope.errors.first() {
            anyhow::bail!("github graphql error: {}", error.message);
        }

        let user = envelope
            .data
            .and_then(|d| d.user)
            .ok_or_else(|| anyhow::anyhow!("github returned no user for '{username}'"))?;

        let keys = user
            .public_keys
            .nodes
            .iter()
            .map(|k| Key {
                blob: k.key.clone(),
                fingerprint: k.fingerprint.clone(),
            })
            .collect();

        Ok(User {
            sub: format!("https://github.com/{}", user.login),
            username: user.login.clone(),
            keys,
            claims: claims_for(&user),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn maps_a_successful_response_into_a_user() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "data": {
                "user": {
                    "login": "octocat",
                    "id": "MDQ6VXNlcjE=",
                    "name": "The Octocat",
                    "databaseId": 1,
                    "publicKeys": {
                        "totalCount": 1,
                        "nodes": [{ "id": "k1", "fingerprint": "SHA256:abc", "key": "ssh-rsa AAAA" }]
                    },
                    "organizations": {
                        "nodes": [{ "id": "o1", "name": "octo-org", "databaseId": 9 }]
                    }
                }
            }
        });
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider =
            GithubProvider::new_with_base_url(None, format!("{}/graphql", server.uri()));
        let user = provider.get_user("octocat").await.unwrap();

        assert_eq!(user.sub, "https://github.com/octocat");
        assert_eq!(user.username, "octocat");
        assert_eq!(user.keys.len(), 1);
        assert_eq!(user.keys[0].fingerprint, "SHA256:abc");
        assert_eq!(
            user.claims.get("github_username").unwrap().as_str(),
            Some("octocat")
        );
        assert_eq!(
            user.claims.get("github_organizations").unwrap(),
            &serde_json::json!(["octo-org"])
        );
    }

    #[tokio::test]
    async fn graphql_errors_are_surfaced_as_a_failure() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "data": null,
            "errors": [{ "message": "Could not resolve to a User" }]
        });
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider =
            GithubProvider::new_with_base_url(None, format!("{}/graphql", server.uri()));
        let err = provider.get_user("ghost").await.unwrap_err();
        assert!(err.to_string().contains("Could not resolve to a User"));
    }
}
