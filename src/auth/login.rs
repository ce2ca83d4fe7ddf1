//! Credential login, logout and session status

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::jwt::peek_claims;
use crate::api::client::AdminClient;
use crate::api::crud::CrudService;
use crate::api::refresh::TokenPair;
use crate::api::request::{join_url, ApiRequest};
use crate::config::Config;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// The parts of the user profile kept in the session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Store code the user belongs to
    #[serde(default)]
    pub merchant: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Group {
    pub name: String,
}

/// Exchange credentials for tokens, then load roles and store from the
/// profile. The login call itself bypasses the refresh pipeline: a 401 there
/// means bad credentials, not an expired token.
pub async fn sign_in(
    client: &AdminClient,
    config: &Config,
    username: &str,
    password: &str,
) -> Result<Profile> {
    let url = join_url(client.base_url(), &config.login_path)?;
    tracing::debug!("Login POST {}", url);

    let resp = client
        .http()
        .post(url)
        .json(&LoginRequest { username, password })
        .send()
        .await
        .context("Login request failed")?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!("Invalid username or password");
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Login failed: HTTP {}: {}", status.as_u16(), body);
    }

    let pair: TokenPair = resp.json().await.context("Failed to parse login response")?;
    let store = client.store();
    // Nothing from a previous user's session may survive a new login.
    store.clear();
    store.set_tokens(pair.token, pair.refresh_token);

    let profile: Profile = CrudService::new(client.clone())
        .fetch(ApiRequest::get(config.profile_path.as_str()))
        .await
        .context("Failed to load user profile")?;

    store.set_roles(profile.groups.iter().map(|g| g.name.clone()).collect());
    if profile.merchant.is_some() {
        store.set_tenant(profile.merchant.clone());
    }

    Ok(profile)
}

/// Perform credential login
pub async fn login(
    client: &AdminClient,
    config: &Config,
    username: &str,
    password: &str,
) -> Result<()> {
    let profile = sign_in(client, config, username, password).await?;

    println!(
        "Logged in as {}.",
        profile.user_name.as_deref().unwrap_or(username)
    );
    if let Some(store) = client.store().tenant() {
        println!("Current store: {}", store);
    }
    Ok(())
}

/// Clear stored credentials
pub fn logout(client: &AdminClient) {
    client.store().clear();
    println!("Logged out.");
}

/// Select the store (tenant) used to scope list calls
pub fn use_store(client: &AdminClient, code: &str) -> Result<()> {
    if code.trim().is_empty() {
        bail!("Store code must not be empty");
    }
    client.store().set_tenant(Some(code.trim().to_string()));
    println!("Current store: {}", code.trim());
    Ok(())
}

/// Display current session status
pub fn status(client: &AdminClient) {
    let store = client.store();
    println!("Backend:     {}", client.base_url());

    match store.access_token() {
        Some(token) => {
            println!("Access tok:  present");
            if let Some(claims) = peek_claims(&token) {
                if let Some(ref sub) = claims.sub {
                    println!("  subject:   {}", sub);
                }
                let now = chrono::Utc::now().timestamp();
                match claims.expires_in(now) {
                    Some(secs) if secs > 0 => println!("  expires:   in {}s", secs),
                    Some(_) => println!("  expires:   past (will refresh on next call)"),
                    None => {}
                }
            }
        }
        None => println!("Access tok:  none"),
    }

    match store.refresh_token() {
        Some(_) => println!("Refresh tok: present"),
        None => println!("Refresh tok: none"),
    }

    let roles = store.roles();
    if roles.is_empty() {
        println!("Roles:       none");
    } else {
        println!("Roles:       {}", roles.join(", "));
    }

    match store.tenant() {
        Some(tenant) => println!("Store:       {}", tenant),
        None => println!("Store:       none"),
    }

    if store.access_token().is_none() {
        println!("\nRun 'shop-admin login' to authenticate.");
    }
}
