//! [`SessionClient`] for a Hauk location sharing server.
//!
//! Hauk answers every call with a plain text body whose first line is the
//! status (`OK` on success). Session creation returns the session id, the
//! share link and the link id on the following lines.

use std::time::Duration;

use relay_core::{ClientError, HaukConfig, SessionClient};
use relay_protocol::{params, LocationParams, Session};
use reqwest::{StatusCode, Url};
use tracing::debug;

pub const ENDPOINT_CREATE: &str = "api/create.php";
pub const ENDPOINT_POST: &str = "api/post.php";
pub const ENDPOINT_STOP: &str = "api/stop.php";

const STATUS_OK: &str = "OK";
const SESSION_EXPIRED_MARKER: &str = "Session expired";

// Line indices of the create response.
const CREATE_INDEX_STATUS: usize = 0;
const CREATE_INDEX_SID: usize = 1;
const CREATE_INDEX_URL: usize = 2;
const CREATE_INDEX_ID: usize = 3;

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("invalid server address: {0}")]
    Address(String),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Borrowed form body in field order.
type FormPairs<'a> = Vec<(&'a str, &'a str)>;

pub struct HaukClient {
    http: reqwest::Client,
    base: Url,
    config: HaukConfig,
}

impl HaukClient {
    pub fn new(config: HaukConfig) -> Result<Self, BuildError> {
        let scheme = if config.tls { "https" } else { "http" };
        let raw = format!("{scheme}://{}:{}/", config.host, config.port);
        let base = Url::parse(&raw).map_err(|e| BuildError::Address(format!("{raw}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { http, base, config })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn post_form(
        &self,
        endpoint: &str,
        form: &FormPairs<'_>,
    ) -> Result<(StatusCode, String), ClientError> {
        let url = self
            .base
            .join(endpoint)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!(endpoint, status = status.as_u16(), "hauk response");
        Ok((status, body))
    }
}

fn rejected(status: StatusCode, body: &str) -> ClientError {
    ClientError::Rejected {
        status: status.as_u16(),
        body: body.trim().to_string(),
    }
}

fn first_line(body: &str) -> &str {
    body.lines().next().unwrap_or_default().trim()
}

fn parse_session(body: &str) -> Result<Session, ClientError> {
    let lines: Vec<&str> = body.lines().map(str::trim).collect();
    let status = lines.get(CREATE_INDEX_STATUS).copied().unwrap_or_default();
    if status != STATUS_OK {
        return Err(ClientError::MalformedResponse(format!(
            "unexpected status line {status:?}"
        )));
    }
    let token = lines
        .get(CREATE_INDEX_SID)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClientError::MalformedResponse("missing session id".into()))?;
    let share_url = lines
        .get(CREATE_INDEX_URL)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClientError::MalformedResponse("missing share url".into()))?;
    let mut session = Session::new(*token, *share_url);
    session.id = lines
        .get(CREATE_INDEX_ID)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    Ok(session)
}

#[async_trait::async_trait]
impl SessionClient for HaukClient {
    async fn create_session(&self) -> Result<Session, ClientError> {
        let duration = self.config.duration.to_string();
        let interval = self.config.interval.to_string();
        let mut form: FormPairs = vec![
            (params::DURATION, duration.as_str()),
            (params::INTERVAL, interval.as_str()),
            (params::PASSWORD, self.config.password.as_str()),
        ];
        if !self.config.anonymous {
            form.push((params::USER, self.config.user.as_str()));
        }
        let (status, body) = self.post_form(ENDPOINT_CREATE, &form).await?;
        if status != StatusCode::OK {
            return Err(rejected(status, &body));
        }
        parse_session(&body)
    }

    async fn post_location(
        &self,
        token: &str,
        location: &LocationParams,
    ) -> Result<(), ClientError> {
        let mut form: FormPairs = Vec::with_capacity(location.len() + 1);
        form.push((params::SESSION_ID, token));
        for (name, value) in location.iter() {
            form.push((name, value));
        }
        let (status, body) = self.post_form(ENDPOINT_POST, &form).await?;
        if body.contains(SESSION_EXPIRED_MARKER) {
            return Err(ClientError::SessionExpired);
        }
        if status != StatusCode::OK || first_line(&body) != STATUS_OK {
            return Err(rejected(status, &body));
        }
        Ok(())
    }

    async fn stop_session(&self, token: &str) -> Result<(), ClientError> {
        let form: FormPairs = vec![(params::SESSION_ID, token)];
        let (status, body) = self.post_form(ENDPOINT_STOP, &form).await?;
        if status != StatusCode::OK || first_line(&body) != STATUS_OK {
            return Err(rejected(status, &body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_follows_tls_flag() {
        let plain = HaukClient::new(HaukConfig {
            host: "hauk.local".into(),
            port: 8080,
            ..HaukConfig::default()
        })
        .expect("client");
        assert_eq!(plain.base_url().as_str(), "http://hauk.local:8080/");

        let tls = HaukClient::new(HaukConfig {
            host: "hauk.local".into(),
            port: 8443,
            tls: true,
            ..HaukConfig::default()
        })
        .expect("client");
        assert_eq!(
            tls.base_url().join(ENDPOINT_POST).unwrap().as_str(),
            "https://hauk.local:8443/api/post.php"
        );
    }

    #[test]
    fn invalid_host_is_rejected() {
        let err = HaukClient::new(HaukConfig {
            host: "bad host".into(),
            ..HaukConfig::default()
        })
        .err()
        .expect("spaces are not a valid host");
        assert!(matches!(err, BuildError::Address(_)));
    }

    #[test]
    fn parses_create_response() {
        let session = parse_session("OK\nSID42\nhttps://hauk.local/?AB-CD\nAB-CD\n").unwrap();
        assert_eq!(session.token, "SID42");
        assert_eq!(session.share_url, "https://hauk.local/?AB-CD");
        assert_eq!(session.id.as_deref(), Some("AB-CD"));

        let without_id = parse_session("OK\r\nSID42\r\nhttps://hauk.local/?AB\r\n").unwrap();
        assert_eq!(without_id.token, "SID42");
        assert_eq!(without_id.id, None);
    }

    #[test]
    fn rejects_unexpected_create_response() {
        assert!(matches!(
            parse_session("Something unexpected!"),
            Err(ClientError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_session("OK\n"),
            Err(ClientError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_session(""),
            Err(ClientError::MalformedResponse(_))
        ));
    }
}
