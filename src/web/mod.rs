//! HTTP front end: the HTML search page, a JSON API over the same query and a
//! health check.

pub mod error;
pub mod page;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use cookie::Cookie;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::db;
use crate::search::{self, SearchPage, SearchParams, SearchRequest};

use error::ApiError;

const THEME_COOKIE: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Dark => "Dark",
            Self::Light => "Light",
        }
    }
}

/// Query parameter first when it names a theme, then the cookie, then dark.
pub fn resolve_theme(requested: Option<&str>, headers: &HeaderMap) -> Theme {
    requested
        .and_then(Theme::parse)
        .or_else(|| cookie_value(headers, THEME_COOKIE).and_then(|v| Theme::parse(&v)))
        .unwrap_or(Theme::Dark)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value_trimmed().to_string())
}

fn theme_cookie(theme: Theme) -> HeaderValue {
    HeaderValue::from_static(match theme {
        Theme::Dark => "theme=dark; Path=/; Max-Age=31536000; SameSite=Lax",
        Theme::Light => "theme=light; Path=/; Max-Age=31536000; SameSite=Lax",
    })
}

/// Shared by all handlers. `store` is `None` when the database could not be
/// opened at startup; every search then reports the store as unavailable.
pub struct AppState {
    pub store: Option<Mutex<Connection>>,
}

impl AppState {
    pub fn open(path: &std::path::Path) -> Self {
        let store = match db::connect(path).and_then(|conn| {
            db::init_schema(&conn)?;
            Ok(conn)
        }) {
            Ok(conn) => {
                info!("Opened professor store at {}", path.display());
                Some(Mutex::new(conn))
            }
            Err(e) => {
                warn!("Professor store unavailable: {:#}", e);
                None
            }
        };
        Self { store }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/professors", get(api_professors))
        .route("/health", get(health))
        .with_state(state)
}

async fn run_search(state: Arc<AppState>, request: SearchRequest) -> Result<SearchPage, ApiError> {
    let page = tokio::task::spawn_blocking(move || {
        let guard = state
            .store
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner));
        let result = search::search(guard.as_deref(), &request);
        result
    })
    .await??;
    Ok(page)
}

/// Raw query pairs; a repeated key is allowed and its first value wins.
pub type QueryPairs = Query<Vec<(String, String)>>;

pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(pairs): QueryPairs,
    headers: HeaderMap,
) -> Response {
    let params = SearchParams::from_pairs(pairs);
    let theme = resolve_theme(params.theme.as_deref(), &headers);
    let request = SearchRequest::from_params(&params);

    let (status, html) = match run_search(state, request.clone()).await {
        Ok(page) => (StatusCode::OK, page::render(&page, &request, theme)),
        Err(e) => {
            if let ApiError::Internal(err) = &e {
                warn!("Search page failed: {:#}", err);
            }
            (StatusCode::INTERNAL_SERVER_ERROR, page::render_unavailable(theme))
        }
    };

    let mut response = (status, Html(html)).into_response();
    response.headers_mut().insert(header::SET_COOKIE, theme_cookie(theme));
    response
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    #[serde(flatten)]
    pub page: SearchPage,
    pub request: SearchRequest,
}

pub async fn api_professors(
    State(state): State<Arc<AppState>>,
    Query(pairs): QueryPairs,
) -> Result<Json<ApiResponse>, ApiError> {
    let params = SearchParams::from_pairs(pairs);
    let request = SearchRequest::from_params(&params);
    let page = run_search(state, request.clone()).await?;
    Ok(Json(ApiResponse { page, request }))
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn serve(settings: &Settings, bind: &str) -> Result<()> {
    let state = Arc::new(AppState::open(&settings.db_path));
    let router = create_router(state);
    let addr: SocketAddr = bind.parse().with_context(|| format!("Invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Serving on http://{}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
