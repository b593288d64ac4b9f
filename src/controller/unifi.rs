//! UniFi OS controller implementation
//!
//! Each authorization is a fresh two-step exchange: log in to obtain the
//! session cookies and CSRF token, then post the `authorize-guest` command
//! for the configured site. Sessions are never cached or reused.

use super::{AuthError, GuestAuthorizer};
use crate::config::ControllerConfig;
use crate::http::HttpClient;
use crate::models::{AuthorizeGuestCmd, ControllerLogin, GuestGrant};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::Response;

const CSRF_HEADER: &str = "x-csrf-token";

/// Cookies and CSRF token from one successful login. Lives for a single
/// authorization.
#[derive(Debug)]
struct ControllerSession {
    cookies: String,
    csrf_token: Option<String>,
}

pub struct UnifiController {
    base_url: String,
    site: String,
    username: String,
    password: String,
    client: HttpClient,
}

impl UnifiController {
    pub fn new(cfg: &ControllerConfig) -> Result<Self, AuthError> {
        Ok(Self {
            base_url: cfg.url.trim_end_matches('/').to_string(),
            site: cfg.site.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            client: HttpClient::new(cfg)?,
        })
    }

    fn login_url(&self) -> String {
        format!("{}/api/auth/login", self.base_url)
    }

    fn stamgr_url(&self) -> String {
        format!(
            "{}/proxy/network/api/s/{}/cmd/stamgr",
            self.base_url,
            urlencoding::encode(&self.site)
        )
    }

    /// Step 1: Login - obtain session cookies and CSRF token
    async fn login(&self) -> Result<ControllerSession, AuthError> {
        tracing::info!("Step 1: Logging in to controller as {}...", self.username);

        let body = ControllerLogin {
            username: &self.username,
            password: &self.password,
        };
        let resp = self.client.post_json(&self.login_url(), &body).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::LoginFailed {
                status,
                body: body_text(resp).await,
            });
        }

        let cookies = resp
            .cookies()
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect::<Vec<_>>()
            .join("; ");

        let csrf_token = resp
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if csrf_token.is_none() {
            tracing::debug!("   -> Controller sent no {} header", CSRF_HEADER);
        }

        Ok(ControllerSession {
            cookies,
            csrf_token,
        })
    }

    /// Step 2: Authorize - send the authorize-guest command for the site
    async fn authorize(
        &self,
        session: &ControllerSession,
        grant: &GuestGrant,
    ) -> Result<(), AuthError> {
        tracing::info!(
            "Step 2: Authorizing {} on AP {} for {} minutes...",
            grant.device_id,
            grant.ap_id,
            grant.minutes
        );

        let mut headers = HeaderMap::new();
        if !session.cookies.is_empty() {
            headers.insert(COOKIE, HeaderValue::from_str(&session.cookies)?);
        }
        if let Some(ref token) = session.csrf_token {
            headers.insert(
                HeaderName::from_static(CSRF_HEADER),
                HeaderValue::from_str(token)?,
            );
        }

        let resp = self
            .client
            .post_json_with_headers(
                &self.stamgr_url(),
                &AuthorizeGuestCmd::for_grant(grant),
                headers,
            )
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::AuthorizationFailed {
                status,
                body: body_text(resp).await,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl GuestAuthorizer for UnifiController {
    async fn authorize_guest(&self, grant: &GuestGrant) -> Result<(), AuthError> {
        let session = self.login().await?;
        self.authorize(&session, grant).await?;

        tracing::info!("Guest {} authorized", grant.device_id);
        Ok(())
    }
}

async fn body_text(resp: Response) -> String {
    resp.text().await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{header::SET_COOKIE, HeaderMap as AxumHeaders, StatusCode};
    use axum::response::{AppendHeaders, IntoResponse};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct SeenAuthorize {
        site: String,
        cookie: Option<String>,
        csrf: Option<String>,
        cmd: AuthorizeGuestCmd,
    }

    struct MockController {
        login_status: StatusCode,
        auth_status: StatusCode,
        auth_delay: Duration,
        logins: Mutex<Vec<serde_json::Value>>,
        authorizations: Mutex<Vec<SeenAuthorize>>,
    }

    impl MockController {
        fn new(login_status: StatusCode, auth_status: StatusCode) -> Arc<Self> {
            Self::with_delay(login_status, auth_status, Duration::ZERO)
        }

        fn with_delay(
            login_status: StatusCode,
            auth_status: StatusCode,
            auth_delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                login_status,
                auth_status,
                auth_delay,
                logins: Mutex::new(Vec::new()),
                authorizations: Mutex::new(Vec::new()),
            })
        }
    }

    async fn mock_login(
        State(mock): State<Arc<MockController>>,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        mock.logins.lock().unwrap().push(body);
        if mock.login_status != StatusCode::OK {
            return (mock.login_status, "bad credentials").into_response();
        }
        (
            AppendHeaders([
                (SET_COOKIE, "TOKEN=session-abc; Path=/; HttpOnly"),
                (SET_COOKIE, "unifises=legacy-1; Path=/"),
            ]),
            [("x-csrf-token", "csrf-123")],
            "{}",
        )
            .into_response()
    }

    async fn mock_stamgr(
        State(mock): State<Arc<MockController>>,
        Path(site): Path<String>,
        headers: AxumHeaders,
        Json(cmd): Json<AuthorizeGuestCmd>,
    ) -> axum::response::Response {
        tokio::time::sleep(mock.auth_delay).await;
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        mock.authorizations.lock().unwrap().push(SeenAuthorize {
            site,
            cookie: header("cookie"),
            csrf: header("x-csrf-token"),
            cmd,
        });
        (mock.auth_status, r#"{"meta":{"rc":"ok"}}"#).into_response()
    }

    async fn spawn_controller(mock: Arc<MockController>) -> String {
        let app = Router::new()
            .route("/api/auth/login", post(mock_login))
            .route("/proxy/network/api/s/:site/cmd/stamgr", post(mock_stamgr))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn controller_config(url: String) -> ControllerConfig {
        ControllerConfig {
            url,
            site: "default".to_string(),
            username: "portal".to_string(),
            password: "secret".to_string(),
            timeout: 1,
            connect_timeout: 1,
            ..ControllerConfig::default()
        }
    }

    fn grant() -> GuestGrant {
        GuestGrant {
            device_id: "AA:BB:CC:DD:EE:FF".to_string(),
            ap_id: "11:22:33:44:55:66".to_string(),
            minutes: 60,
        }
    }

    #[tokio::test]
    async fn test_two_step_authorization() {
        let mock = MockController::new(StatusCode::OK, StatusCode::OK);
        let url = spawn_controller(mock.clone()).await;
        let controller = UnifiController::new(&controller_config(url)).unwrap();

        controller.authorize_guest(&grant()).await.unwrap();

        let logins = mock.logins.lock().unwrap().clone();
        assert_eq!(
            logins,
            vec![serde_json::json!({"username": "portal", "password": "secret"})]
        );

        let seen = mock.authorizations.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].site, "default");
        assert_eq!(
            seen[0].cookie.as_deref(),
            Some("TOKEN=session-abc; unifises=legacy-1")
        );
        assert_eq!(seen[0].csrf.as_deref(), Some("csrf-123"));
        assert_eq!(seen[0].cmd, AuthorizeGuestCmd::for_grant(&grant()));
    }

    #[tokio::test]
    async fn test_each_authorization_logs_in_again() {
        let mock = MockController::new(StatusCode::OK, StatusCode::OK);
        let url = spawn_controller(mock.clone()).await;
        let controller = UnifiController::new(&controller_config(url)).unwrap();

        controller.authorize_guest(&grant()).await.unwrap();
        controller.authorize_guest(&grant()).await.unwrap();

        assert_eq!(mock.logins.lock().unwrap().len(), 2);
        assert_eq!(mock.authorizations.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_login_failure_skips_authorize() {
        let mock = MockController::new(StatusCode::UNAUTHORIZED, StatusCode::OK);
        let url = spawn_controller(mock.clone()).await;
        let controller = UnifiController::new(&controller_config(url)).unwrap();

        let err = controller.authorize_guest(&grant()).await.unwrap_err();
        match err {
            AuthError::LoginFailed { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "bad credentials");
            }
            other => panic!("expected LoginFailed, got {other:?}"),
        }
        assert!(mock.authorizations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_failure_carries_body() {
        let mock = MockController::new(StatusCode::OK, StatusCode::BAD_REQUEST);
        let url = spawn_controller(mock.clone()).await;
        let controller = UnifiController::new(&controller_config(url)).unwrap();

        let err = controller.authorize_guest(&grant()).await.unwrap_err();
        match err {
            AuthError::AuthorizationFailed { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(body.contains("meta"));
            }
            other => panic!("expected AuthorizationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_controller_times_out() {
        let mock =
            MockController::with_delay(StatusCode::OK, StatusCode::OK, Duration::from_secs(3));
        let url = spawn_controller(mock).await;
        let controller = UnifiController::new(&controller_config(url)).unwrap();

        let err = controller.authorize_guest(&grant()).await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_unreachable_controller_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let controller = UnifiController::new(&controller_config(url)).unwrap();
        let err = controller.authorize_guest(&grant()).await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
    }

    #[test]
    fn test_urls() {
        let mut cfg = controller_config("https://unifi.lan/".to_string());
        cfg.site = "guest wing".to_string();
        let controller = UnifiController::new(&cfg).unwrap();
        assert_eq!(controller.login_url(), "https://unifi.lan/api/auth/login");
        assert_eq!(
            controller.stamgr_url(),
            "https://unifi.lan/proxy/network/api/s/guest%20wing/cmd/stamgr"
        );
    }
}
