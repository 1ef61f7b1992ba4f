// Last.fm desktop authentication flow
// https://www.last.fm/api/desktopauth

use super::lastfm::{call_api, ApiError};
use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use serde::Deserialize;
use std::io::{self, Write};
use std::process::Command;
use std::time::Duration;

const AUTH_URL: &str = "https://www.last.fm/api/auth/";

/// "This token has not been authorized"
const ERROR_UNAUTHORIZED_TOKEN: i64 = 14;

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session: Session,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Perform the complete Last.fm authentication flow through the browser
/// Returns the session on success
pub fn authenticate(api_key: &str, api_secret: &str) -> Result<Session> {
    println!("Starting Last.fm authentication...\n");

    let token = get_token(api_key, api_secret)?;
    let url = authorization_url(api_key, &token);

    if let Err(e) = open_browser(&url) {
        log::warn!("Failed to open browser: {:#}", e);
    }

    println!("Please open the following URL in your browser and authorize the application:\n\n{}\n", url);
    print!("Finished authorization? [Y/n] ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    if !answer.is_empty() && answer != "y" {
        anyhow::bail!("Authorization cancelled");
    }

    println!("\nFetching session from Last.fm...");
    let session = wait_for_session(api_key, api_secret, &token)?;
    println!("Logged in as {}\n", session.name);

    Ok(session)
}

pub fn authorization_url(api_key: &str, token: &str) -> String {
    format!("{}?api_key={}&token={}", AUTH_URL, api_key, token)
}

/// `api_sig`: md5 over the alphabetically sorted parameters followed by the secret
fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut raw = String::new();
    for (key, value) in sorted {
        raw.push_str(key);
        raw.push_str(value);
    }
    raw.push_str(api_secret);

    format!("{:x}", md5::compute(raw))
}

fn signed_call(mut params: Vec<(&str, String)>, api_secret: &str) -> Result<serde_json::Value> {
    let signature = sign(&params, api_secret);
    params.push(("api_sig", signature));
    call_api(&params)
}

fn get_token(api_key: &str, api_secret: &str) -> Result<String> {
    let response = signed_call(
        vec![
            ("method", "auth.gettoken".to_string()),
            ("api_key", api_key.to_string()),
        ],
        api_secret,
    )
    .context("Failed to get authorization token")?;

    let token: TokenResponse = serde_json::from_value(response).context("Unexpected auth.getToken response")?;
    Ok(token.token)
}

fn get_session(api_key: &str, api_secret: &str, token: &str) -> Result<Session> {
    let response = signed_call(
        vec![
            ("method", "auth.getsession".to_string()),
            ("api_key", api_key.to_string()),
            ("token", token.to_string()),
        ],
        api_secret,
    )?;

    let session: SessionResponse =
        serde_json::from_value(response).context("Unexpected auth.getSession response")?;
    Ok(session.session)
}

/// Poll auth.getSession while the user has not finished authorizing yet
fn wait_for_session(api_key: &str, api_secret: &str, token: &str) -> Result<Session> {
    let policy = ExponentialBackoff {
        current_interval: Duration::from_secs(2),
        initial_interval: Duration::from_secs(2),
        max_elapsed_time: Some(Duration::from_secs(120)),
        ..ExponentialBackoff::default()
    };

    backoff::retry(policy, || {
        get_session(api_key, api_secret, token).map_err(|e| {
            let unauthorized = e
                .downcast_ref::<ApiError>()
                .is_some_and(|api| api.code == ERROR_UNAUTHORIZED_TOKEN);
            if unauthorized {
                log::info!("Token not authorized yet, retrying");
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .map_err(|e| match e {
        backoff::Error::Permanent(e) | backoff::Error::Transient { err: e, .. } => e,
    })
    .context("Failed to fetch session key from Last.fm")
}

fn open_browser(url: &str) -> Result<()> {
    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };

    let status = Command::new(opener)
        .arg(url)
        .status()
        .with_context(|| format!("Failed to run {}", opener))?;

    if !status.success() {
        anyhow::bail!("{} exited with {}", opener, status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_parameters() {
        let params = vec![
            ("method", "auth.gettoken".to_string()),
            ("api_key", "key".to_string()),
        ];
        let expected = format!("{:x}", md5::compute("api_keykeymethodauth.gettokensecret"));
        assert_eq!(sign(&params, "secret"), expected);
    }

    #[test]
    fn builds_authorization_url() {
        assert_eq!(
            authorization_url("key", "tok"),
            "https://www.last.fm/api/auth/?api_key=key&token=tok"
        );
    }
}
