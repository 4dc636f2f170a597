use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

pub mod format;
pub mod links;
pub mod rank;

pub use format::OutputFormat;
pub use links::{GraphLink, KeywordTarget, LinkBuilder, PagespeedTarget};
pub use rank::{
    ChangeCounts, DAY_OFFSETS, DayChange, FirstPageCount, KeywordRanks, Movement, NOT_AVAILABLE,
    RankMatrix, RankObservation, RankSource, RankValue, build_rank_matrix, classify_movement,
    compute_changes,
};

/// Window applied when a request omits either end of its date range.
pub const DEFAULT_RANGE_DAYS: u64 = 30;

pub const SEOMOZ_FREE_METRICS: &[&str] = &["ueid", "uid", "umrp", "fmrp", "upa", "pda"];
pub const SEOMOZ_PAID_METRICS: &[&str] = &[
    "uid", "ueid", "feid", "peid", "ujid", "uifq", "uipl", "fid", "pid", "fuid", "puid", "fipl",
    "fmrp", "umrp", "upa", "pda", "pmrp", "utrp", "ftrp", "ptrp", "uemrp", "fejp", "pejp", "fjp",
    "pjp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Mobile,
    Desktop,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::Desktop, Strategy::Mobile];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Desktop => "desktop",
        }
    }

    pub fn alternate(self) -> Self {
        match self {
            Self::Mobile => Self::Desktop,
            Self::Desktop => Self::Mobile,
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" => Err("No strategy selected".to_owned()),
            "mobile" => Ok(Self::Mobile),
            "desktop" => Ok(Self::Desktop),
            other => Err(format!("Improperly formatted strategy:{other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagespeedMetric {
    Score,
    NumberHosts,
    NumberResources,
    NumberStaticResources,
    NumberCssResources,
    TotalRequestBytes,
    TextResponseBytes,
    CssResponseBytes,
    HtmlResponseBytes,
    ImageResponseBytes,
    JavascriptResponseBytes,
    OtherResponseBytes,
}

impl PagespeedMetric {
    pub const ALL: [PagespeedMetric; 12] = [
        Self::Score,
        Self::NumberHosts,
        Self::NumberResources,
        Self::NumberStaticResources,
        Self::NumberCssResources,
        Self::TotalRequestBytes,
        Self::TextResponseBytes,
        Self::CssResponseBytes,
        Self::HtmlResponseBytes,
        Self::ImageResponseBytes,
        Self::JavascriptResponseBytes,
        Self::OtherResponseBytes,
    ];

    /// Name used in query strings and exports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::NumberHosts => "numberHosts",
            Self::NumberResources => "numberResources",
            Self::NumberStaticResources => "numberStaticResources",
            Self::NumberCssResources => "numberCssResources",
            Self::TotalRequestBytes => "totalRequestBytes",
            Self::TextResponseBytes => "textResponseBytes",
            Self::CssResponseBytes => "cssResponseBytes",
            Self::HtmlResponseBytes => "htmlResponseBytes",
            Self::ImageResponseBytes => "imageResponseBytes",
            Self::JavascriptResponseBytes => "javascriptResponseBytes",
            Self::OtherResponseBytes => "otherResponseBytes",
        }
    }

    /// Backing column in the scores table.
    pub fn column(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::NumberHosts => "number_hosts",
            Self::NumberResources => "number_resources",
            Self::NumberStaticResources => "number_static_resources",
            Self::NumberCssResources => "number_css_resources",
            Self::TotalRequestBytes => "total_request_bytes",
            Self::TextResponseBytes => "text_response_bytes",
            Self::CssResponseBytes => "css_response_bytes",
            Self::HtmlResponseBytes => "html_response_bytes",
            Self::ImageResponseBytes => "image_response_bytes",
            Self::JavascriptResponseBytes => "javascript_response_bytes",
            Self::OtherResponseBytes => "other_response_bytes",
        }
    }
}

impl std::str::FromStr for PagespeedMetric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == value)
            .ok_or_else(|| format!("Improperly formatted metric:{value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebpagetestMetric {
    LoadTime,
    BytesOut,
    BytesOutDoc,
    BytesIn,
    BytesInDoc,
    Requests,
    RequestsDoc,
    Render,
    FullyLoaded,
    DocTime,
    GzipTotal,
    ImageTotal,
}

impl WebpagetestMetric {
    pub const ALL: [WebpagetestMetric; 12] = [
        Self::LoadTime,
        Self::BytesOut,
        Self::BytesOutDoc,
        Self::BytesIn,
        Self::BytesInDoc,
        Self::Requests,
        Self::RequestsDoc,
        Self::Render,
        Self::FullyLoaded,
        Self::DocTime,
        Self::GzipTotal,
        Self::ImageTotal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadTime => "loadTime",
            Self::BytesOut => "bytesOut",
            Self::BytesOutDoc => "bytesOutDoc",
            Self::BytesIn => "bytesIn",
            Self::BytesInDoc => "bytesInDoc",
            Self::Requests => "requests",
            Self::RequestsDoc => "requestsDoc",
            Self::Render => "render",
            Self::FullyLoaded => "fullyLoaded",
            Self::DocTime => "docTime",
            Self::GzipTotal => "gzip_total",
            Self::ImageTotal => "image_total",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::LoadTime => "load_time",
            Self::BytesOut => "bytes_out",
            Self::BytesOutDoc => "bytes_out_doc",
            Self::BytesIn => "bytes_in",
            Self::BytesInDoc => "bytes_in_doc",
            Self::Requests => "requests",
            Self::RequestsDoc => "requests_doc",
            Self::Render => "render",
            Self::FullyLoaded => "fully_loaded",
            Self::DocTime => "doc_time",
            Self::GzipTotal => "gzip_total",
            Self::ImageTotal => "image_total",
        }
    }
}

impl std::str::FromStr for WebpagetestMetric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == value)
            .ok_or_else(|| format!("Improperly formatted metric:{value}"))
    }
}

/// How the composite dashboard embeds a graph URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphKind {
    Qgraph,
    Qpie,
}

impl GraphKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qgraph => "qgraph",
            Self::Qpie => "qpie",
        }
    }
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn trailing(today: NaiveDate, days: u64) -> Self {
        Self {
            from: days_before(today, days),
            to: today,
        }
    }

    /// Both ends or neither: a half-specified range falls back to the
    /// trailing default window.
    pub fn resolve(from: Option<NaiveDate>, to: Option<NaiveDate>, today: NaiveDate) -> Self {
        match (from, to) {
            (Some(from), Some(to)) => Self { from, to },
            _ => Self::trailing(today, DEFAULT_RANGE_DAYS),
        }
    }
}

pub fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

pub fn days_after(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
