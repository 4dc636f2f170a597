use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::NaiveDate;
use maud::Markup;
use quinico_config::QuinicoConfig;
use quinico_core::{LinkBuilder, OutputFormat};
use quinico_store::{DashSettings, SqliteStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod context;
pub mod csv;
pub mod error;
pub mod forms;
pub mod templates;

mod assets;
mod composite;
mod keyword_rank;
mod pagespeed;
mod report;
mod webpagetest;

pub use composite::default_graphs;
pub use context::{QueryMap, REMOTE_USER_HEADER, RequestContext};
pub use csv::CsvDocument;
pub use error::DashboardError;
pub use forms::FormErrors;
pub use report::{ReportRule, UrlBlock, flatten_report};

/// Shared, read-only state handed to every request.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

#[derive(Debug, Clone)]
struct StateInner {
    database_path: PathBuf,
    upload_dir: PathBuf,
    config: QuinicoConfig,
    today: Option<NaiveDate>,
}

impl AppState {
    pub fn new(root: impl AsRef<Path>, config: QuinicoConfig) -> Self {
        let root = root.as_ref();
        Self {
            inner: Arc::new(StateInner {
                database_path: config.database_path(root),
                upload_dir: config.pagespeed_upload_dir(root),
                config,
                today: None,
            }),
        }
    }

    /// Pins the calendar date views treat as today.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        Arc::make_mut(&mut self.inner).today = Some(today);
        self
    }

    pub fn config(&self) -> &QuinicoConfig {
        &self.inner.config
    }

    pub fn database_path(&self) -> &Path {
        &self.inner.database_path
    }

    pub(crate) fn upload_dir(&self) -> &Path {
        &self.inner.upload_dir
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.inner
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub(crate) fn open_store(&self) -> Result<SqliteStore, DashboardError> {
        let store = SqliteStore::open(&self.inner.database_path)?
            .with_utc_offset(self.inner.config.pagespeed.utc_offset_minutes);
        Ok(store)
    }

    /// Saved settings of the requesting user, else the configured defaults.
    pub(crate) fn dash_settings(
        &self,
        store: &SqliteStore,
        user: Option<&str>,
    ) -> Result<DashSettings, DashboardError> {
        if let Some(user) = user {
            if let Some(settings) = store.dash_settings(user)? {
                return Ok(settings);
            }
        }

        let defaults = self.inner.config.dashboard;
        Ok(DashSettings {
            width: defaults.width,
            height: defaults.height,
            font: defaults.font,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(composite::dashboard))
        .route("/dashboard", get(composite::dashboard))
        .route("/dashboard/graphs", get(composite::graphs))
        .route("/keyword_rank/dashboard", get(keyword_rank::dashboard))
        .route("/keyword_rank/trends", get(keyword_rank::trends))
        .route("/pagespeed/trends", get(pagespeed::trends))
        .route("/pagespeed/breakdown", get(pagespeed::breakdown))
        .route("/pagespeed/history", get(pagespeed::history))
        .route("/pagespeed/report", get(pagespeed::report))
        .route("/webpagetest/trends", get(webpagetest::trends))
        .route("/webpagetest/history", get(webpagetest::history))
        .route("/webpagetest/report", get(webpagetest::report))
        .route("/static/{*path}", get(assets::serve))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET]),
        )
        .with_state(state)
}

/// What a view decided to answer with.
pub(crate) enum View {
    Page(Markup),
    NoData(&'static str),
    Json(serde_json::Value),
    Csv(CsvDocument),
}

impl View {
    pub(crate) fn json<T: serde::Serialize>(value: &T) -> Result<Self, DashboardError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

impl IntoResponse for View {
    fn into_response(self) -> Response {
        match self {
            Self::Page(markup) => markup.into_response(),
            Self::NoData(kind) => templates::no_data(kind).into_response(),
            Self::Json(value) => axum::Json(value).into_response(),
            Self::Csv(document) => document.into_response(),
        }
    }
}

/// Runs a view on the blocking pool; SQLite access is synchronous.
pub(crate) async fn run_view<F>(
    state: AppState,
    ctx: RequestContext,
    view: F,
) -> Result<View, DashboardError>
where
    F: FnOnce(&AppState, &RequestContext) -> Result<View, DashboardError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || view(&state, &ctx)).await?
}

pub(crate) fn link_builder(ctx: &RequestContext) -> LinkBuilder {
    LinkBuilder::new(ctx.host.as_str())
}

pub(crate) fn log_invalid_form(form: &'static str, errors: &FormErrors) {
    tracing::error!(form, errors = %errors, "invalid form");
}

pub(crate) fn unsupported_format(form: &'static str, format: OutputFormat) -> View {
    let errors = FormErrors::unsupported_format(format);
    log_invalid_form(form, &errors);
    View::Page(templates::invalid_request(&errors))
}
