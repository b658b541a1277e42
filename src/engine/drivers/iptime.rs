//! ipTIME Router Driver
//!
//! JSON-RPC over HTTP against `/cgi/service.cgi`. The session lives in the
//! `efm_session_id` cookie held by the client's cookie store. Routers on the
//! LAN present self-signed certificates, so TLS verification is disabled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{RouterControl, RouterFactory};
use crate::engine::types::{PortLink, SessionState};

const SERVICE_PATH: &str = "/cgi/service.cgi";
const SESSION_COOKIE: &str = "efm_session_id";

const METHOD_LOGIN: &str = "session/login";
const METHOD_WOL: &str = "wol/signal";
const METHOD_PORT_STATUS: &str = "port/link/status";

/// ipTIME control API client
pub struct IpTimeRouter {
    base_url: String,
    client: Client,
    state: SessionState,
}

impl IpTimeRouter {
    pub fn new(base_url: &str, request_timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(true)
            .timeout(request_timeout)
            .build()
            .map_err(|e| EngineError::internal(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            state: SessionState::Unauthenticated,
        })
    }

    fn service_url(&self) -> String {
        format!("{}{}", self.base_url, SERVICE_PATH)
    }

    /// Posts one JSON-RPC call. Transport failures and non-success statuses
    /// are reported here; the body is left to the caller.
    async fn call(&mut self, method: &str, params: Option<Value>, referer: &str) -> EngineResult<Response> {
        let mut body = json!({ "method": method });
        if let Some(params) = params {
            body["params"] = params;
        }

        let response = self
            .client
            .post(self.service_url())
            .header("Accept", "*/*")
            .header("Cache-Control", "no-store")
            .header("Origin", &self.base_url)
            .header("Referer", format!("{}{}", self.base_url, referer))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            if self.state == SessionState::Authenticated {
                warn!(method, "router session lost");
            }
            self.state = SessionState::Unauthenticated;
            return Err(EngineError::protocol(method, format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(EngineError::network(format!("{} returned HTTP {}", method, status)));
        }
        Ok(response)
    }

    fn require_session(&self, method: &str) -> EngineResult<()> {
        match self.state {
            SessionState::Authenticated => Ok(()),
            SessionState::Unauthenticated => Err(EngineError::protocol(
                method,
                "router session is not authenticated",
            )),
        }
    }
}

#[async_trait]
impl RouterControl for IpTimeRouter {
    fn state(&self) -> SessionState {
        self.state
    }

    #[instrument(skip(self, pw), fields(router = %self.base_url))]
    async fn login(&mut self, id: &str, pw: &str) -> EngineResult<()> {
        let response = self
            .call(METHOD_LOGIN, Some(json!({ "id": id, "pw": pw })), "/ui/")
            .await?;

        let session = response
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .map(|c| c.value().to_string());

        if let Some(session) = session {
            let prefix: String = session.chars().take(8).collect();
            info!(session = %prefix, "router login succeeded");
            self.state = SessionState::Authenticated;
            return Ok(());
        }

        let body = read_json(METHOD_LOGIN, response).await?;
        if reports_success(&body) {
            info!("router login succeeded");
            self.state = SessionState::Authenticated;
            Ok(())
        } else {
            self.state = SessionState::Unauthenticated;
            Err(EngineError::protocol(METHOD_LOGIN, describe_error(&body)))
        }
    }

    #[instrument(skip(self), fields(router = %self.base_url))]
    async fn send_wake(&mut self, mac: &str) -> EngineResult<()> {
        self.require_session(METHOD_WOL)?;

        let response = self.call(METHOD_WOL, Some(json!([mac])), "/ui/wol").await?;
        let body = read_json(METHOD_WOL, response).await?;

        if reports_success(&body) {
            info!("wake signal sent");
            Ok(())
        } else {
            Err(EngineError::protocol(METHOD_WOL, describe_error(&body)))
        }
    }

    #[instrument(skip(self), fields(router = %self.base_url))]
    async fn port_link_status(&mut self) -> EngineResult<Vec<PortLink>> {
        self.require_session(METHOD_PORT_STATUS)?;

        let response = self.call(METHOD_PORT_STATUS, None, "/ui/port_setup").await?;
        let body = read_json(METHOD_PORT_STATUS, response).await?;

        let rows = match body.get("result") {
            Some(Value::Array(rows)) => rows,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(_) => {
                return Err(EngineError::protocol(
                    METHOD_PORT_STATUS,
                    "result is not a list",
                ))
            }
        };

        let parsed: Vec<PortLink> = rows.iter().filter_map(PortLink::from_value).collect();
        if parsed.len() != rows.len() {
            debug!(
                skipped = rows.len() - parsed.len(),
                "ignored unparseable port rows"
            );
        }
        Ok(parsed)
    }
}

/// Success is an explicit `"result": "success"` or no `error` at all
fn reports_success(body: &Value) -> bool {
    body.get("result").and_then(Value::as_str) == Some("success")
        || body.get("error").map_or(true, Value::is_null)
}

fn describe_error(body: &Value) -> String {
    match body.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
        Some(other) => other.to_string(),
        None => body.to_string(),
    }
}

async fn read_json(method: &str, response: Response) -> EngineResult<Value> {
    response
        .json::<Value>()
        .await
        .map_err(|e| EngineError::protocol(method, format!("unparseable response: {}", e)))
}

fn transport_error(method: &str, err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::network(format!("{} timed out", method))
    } else if err.is_connect() {
        EngineError::network(format!("{}: connection failed: {}", method, err))
    } else {
        EngineError::network(format!("{}: {}", method, err))
    }
}

/// Factory registered under `"iptime"`
pub struct IpTimeFactory;

impl RouterFactory for IpTimeFactory {
    fn router_type(&self) -> &'static str {
        "iptime"
    }

    fn create(&self, url: &str, request_timeout: Duration) -> EngineResult<Box<dyn RouterControl>> {
        Ok(Box::new(IpTimeRouter::new(url, request_timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn router(server: &Server) -> IpTimeRouter {
        IpTimeRouter::new(&server.url(), Duration::from_secs(2)).expect("client")
    }

    async fn logged_in(server: &mut Server) -> IpTimeRouter {
        server
            .mock("POST", SERVICE_PATH)
            .match_body(Matcher::PartialJson(json!({"method": METHOD_LOGIN})))
            .with_status(200)
            .with_header("set-cookie", "efm_session_id=abcdef0123456789; Path=/")
            .with_body("{}")
            .create_async()
            .await;
        let mut router = router(server);
        router.login("admin", "pw").await.expect("login");
        router
    }

    #[tokio::test]
    async fn login_succeeds_on_session_cookie() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", SERVICE_PATH)
            .match_body(Matcher::Json(json!({
                "method": "session/login",
                "params": {"id": "admin", "pw": "secret"}
            })))
            .with_status(200)
            .with_header("set-cookie", "efm_session_id=abcdef0123456789; Path=/")
            .with_body(r#"{"error": {"message": "ignored when cookie present"}}"#)
            .create_async()
            .await;

        let mut router = router(&server);
        assert_eq!(router.state(), SessionState::Unauthenticated);
        router.login("admin", "secret").await.unwrap();
        assert_eq!(router.state(), SessionState::Authenticated);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn login_falls_back_to_body_success_marker() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", SERVICE_PATH)
            .with_status(200)
            .with_body(r#"{"result": "success"}"#)
            .create_async()
            .await;

        let mut router = router(&server);
        router.login("admin", "pw").await.unwrap();
        assert_eq!(router.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn login_rejection_is_protocol_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", SERVICE_PATH)
            .with_status(200)
            .with_body(r#"{"result": null, "error": {"message": "invalid password"}}"#)
            .create_async()
            .await;

        let mut router = router(&server);
        let err = router.login("admin", "bad").await.unwrap_err();
        match err {
            EngineError::ProtocolError { operation, message } => {
                assert_eq!(operation, "session/login");
                assert_eq!(message, "invalid password");
            }
            other => panic!("expected ProtocolError, got {:?}", other),
        }
        assert_eq!(router.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn unreachable_router_is_network_error() {
        // bind then drop to get a closed local port
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut router =
            IpTimeRouter::new(&format!("http://127.0.0.1:{}", port), Duration::from_secs(2))
                .unwrap();
        let err = router.login("admin", "pw").await.unwrap_err();
        assert!(matches!(err, EngineError::NetworkError { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn wake_requires_login() {
        let server = Server::new_async().await;
        let mut router = router(&server);
        let err = router.send_wake("10:FF:E0:38:F4:D5").await.unwrap_err();
        assert!(matches!(err, EngineError::ProtocolError { .. }));
    }

    #[tokio::test]
    async fn wake_sends_mac_and_accepts_missing_error() {
        let mut server = Server::new_async().await;
        let mut router = logged_in(&mut server).await;
        let mock = server
            .mock("POST", SERVICE_PATH)
            .match_body(Matcher::Json(json!({
                "method": "wol/signal",
                "params": ["10:FF:E0:38:F4:D5"]
            })))
            .match_header("cookie", Matcher::Regex("efm_session_id=abcdef0123456789".into()))
            .with_status(200)
            .with_body(r#"{"result": null}"#)
            .create_async()
            .await;

        router.send_wake("10:FF:E0:38:F4:D5").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn wake_error_field_is_surfaced() {
        let mut server = Server::new_async().await;
        let mut router = logged_in(&mut server).await;
        server
            .mock("POST", SERVICE_PATH)
            .match_body(Matcher::PartialJson(json!({"method": METHOD_WOL})))
            .with_status(200)
            .with_body(r#"{"error": "unknown mac"}"#)
            .create_async()
            .await;

        let err = router.send_wake("10:FF:E0:38:F4:D5").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::ProtocolError { ref message, .. } if message == "unknown mac"
        ));
    }

    #[tokio::test]
    async fn session_loss_drops_back_to_unauthenticated() {
        let mut server = Server::new_async().await;
        let mut router = logged_in(&mut server).await;
        server
            .mock("POST", SERVICE_PATH)
            .match_body(Matcher::PartialJson(json!({"method": METHOD_WOL})))
            .with_status(401)
            .create_async()
            .await;

        assert!(router.send_wake("10:FF:E0:38:F4:D5").await.is_err());
        assert_eq!(router.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn port_status_skips_bad_rows() {
        let mut server = Server::new_async().await;
        let mut router = logged_in(&mut server).await;
        server
            .mock("POST", SERVICE_PATH)
            .match_body(Matcher::Json(json!({"method": "port/link/status"})))
            .with_status(200)
            .with_body(
                r#"{"result": [
                    {"type": "wan", "port": 1, "link": "1000f"},
                    {"type": "lan", "port": "bogus", "link": "100f"},
                    {"type": "lan", "port": 4, "link": "100f"},
                    {"type": "lan", "port": 3, "link": ""}
                ]}"#,
            )
            .expect(3)
            .create_async()
            .await;

        let rows = router.port_link_status().await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(router.is_lan_port_up(4).await.unwrap());
        assert!(!router.is_lan_port_up(3).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_body_is_protocol_error() {
        let mut server = Server::new_async().await;
        let mut router = logged_in(&mut server).await;
        server
            .mock("POST", SERVICE_PATH)
            .match_body(Matcher::PartialJson(json!({"method": METHOD_PORT_STATUS})))
            .with_status(200)
            .with_body("<html>busy</html>")
            .create_async()
            .await;

        let err = router.port_link_status().await.unwrap_err();
        assert!(matches!(err, EngineError::ProtocolError { .. }));
    }
}
