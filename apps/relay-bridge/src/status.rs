//! Status page listing the share link of every topic seen since start.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use parking_lot::RwLock;
use relay_core::FrontendConfig;
use relay_events::{topics, Envelope};
use relay_notify::SessionCreated;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedSession {
    pub topic: String,
    pub share_url: String,
    pub created: String,
}

/// Latest session per topic.
#[derive(Clone, Default)]
pub struct SessionBook {
    sessions: Arc<RwLock<BTreeMap<String, TrackedSession>>>,
}

impl SessionBook {
    pub fn record(&self, session: TrackedSession) {
        self.sessions
            .write()
            .insert(session.topic.clone(), session);
    }

    /// Sorted by topic.
    pub fn list(&self) -> Vec<TrackedSession> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    fn apply(&self, env: Envelope) {
        if env.kind != topics::TOPIC_SESSION_CREATED {
            return;
        }
        match serde_json::from_value::<SessionCreated>(env.payload) {
            Ok(created) => {
                debug!(topic = %created.topic, "status page tracking session");
                self.record(TrackedSession {
                    topic: created.topic,
                    share_url: created.share_url,
                    created: env.time,
                });
            }
            Err(err) => warn!("malformed {} payload: {err}", topics::TOPIC_SESSION_CREATED),
        }
    }
}

/// Fold bus events into `book` until the bus closes.
pub async fn track(book: SessionBook, mut rx: broadcast::Receiver<Envelope>) {
    loop {
        match rx.recv().await {
            Ok(env) => book.apply(env),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "status page fell behind the event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[derive(Debug)]
struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    fn accepts(&self, header_value: &str) -> bool {
        let Some((scheme, encoded)) = header_value.trim().split_once(' ') else {
            return false;
        };
        if !scheme.eq_ignore_ascii_case("basic") {
            return false;
        }
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        matches!(
            decoded.split_once(':'),
            Some((user, password)) if user == self.user && password == self.password
        )
    }
}

async fn basic_auth_mw(creds: Arc<Credentials>, req: Request<Body>, next: Next) -> Response {
    let allowed = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| creds.accepts(v))
        .unwrap_or(false);
    if allowed {
        return next.run(req).await;
    }
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"relay\"")],
    )
        .into_response()
}

pub fn router(book: SessionBook, config: &FrontendConfig) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/sessions", get(sessions))
        .with_state(book);
    if config.anonymous {
        return router;
    }
    info!(user = %config.user, "status page requires basic auth");
    let creds = Arc::new(Credentials {
        user: config.user.clone(),
        password: config.password.clone(),
    });
    router.layer(middleware::from_fn(move |req, next| {
        let creds = creds.clone();
        async move { basic_auth_mw(creds, req, next).await }
    }))
}

async fn sessions(State(book): State<SessionBook>) -> Json<Vec<TrackedSession>> {
    Json(book.list())
}

async fn index(State(book): State<SessionBook>) -> Html<String> {
    let mut page = String::from("<html><head><title>relay</title></head><body>\n");
    for session in book.list() {
        page.push_str(&format!(
            "<a href=\"{}\">{}</a><br>\n",
            escape(&session.share_url),
            escape(&session.topic)
        ));
    }
    page.push_str("</body></html>\n");
    Html(page)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
