//! Page rendering and static assets
//!
//! The login and success pages are built frontend files. Before they are
//! served the page title placeholder is filled in and, on the login page,
//! the pending-login token is exposed to the page script as `window.cacheId`.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use std::path::PathBuf;
use tower::ServiceExt;
use tower_http::services::ServeDir;

const TITLE_PLACEHOLDER: &str = "%VITE_PAGE_TITLE%";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Login,
    Success,
}

impl Page {
    fn file_name(self) -> &'static str {
        match self {
            Page::Login => "index.html",
            Page::Success => "success.html",
        }
    }

    /// The page a direct request for its file name refers to.
    pub fn for_path(path: &str) -> Option<Self> {
        match path.strip_prefix('/')? {
            "index.html" => Some(Page::Login),
            "success.html" => Some(Page::Success),
            _ => None,
        }
    }
}

/// Paths the controller redirects guests to.
pub fn is_entry_path(path: &str) -> bool {
    matches!(path, "" | "/" | "/guest/s/default/")
}

pub struct Frontend {
    dir: PathBuf,
    title: String,
}

impl Frontend {
    pub fn new(dir: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            title: title.into(),
        }
    }

    /// Render a page, embedding `token` when given. 404 if the file is missing.
    pub async fn render(&self, page: Page, token: Option<&str>) -> Response {
        let path = self.dir.join(page.file_name());
        match tokio::fs::read_to_string(&path).await {
            Ok(html) => Html(substitute(&html, token, &self.title)).into_response(),
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", path.display(), e);
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }

    /// Serve a file from the frontend directory verbatim. The two page
    /// templates still go through `render`.
    pub async fn asset(&self, request: Request) -> Response {
        if let Some(page) = Page::for_path(request.uri().path()) {
            return self.render(page, None).await;
        }
        match ServeDir::new(&self.dir).oneshot(request).await {
            Ok(resp) => resp.into_response(),
            Err(never) => match never {},
        }
    }
}

pub fn substitute(html: &str, token: Option<&str>, title: &str) -> String {
    let html = match token {
        Some(token) => html.replacen(
            "</body>",
            &format!(r#"<script>window.cacheId = "{}";</script></body>"#, token),
            1,
        ),
        None => html.to_string(),
    };
    html.replace(TITLE_PLACEHOLDER, title)
}
