use std::collections::BTreeMap;
use std::path::{Component, Path};

use axum::extract::State;
use chrono::NaiveDate;
use maud::{Markup, html};
use quinico_core::links::pagespeed_breakdown_relative;
use quinico_core::{
    DEFAULT_RANGE_DAYS, DateRange, GraphKind, OutputFormat, PagespeedMetric, PagespeedTarget,
    Strategy, days_after, days_before, format_date,
};
use quinico_store::{MetricPoint, PagespeedRun, PagespeedScore, SqliteStore};
use serde_json::{Map, Value, json};

use crate::context::RequestContext;
use crate::csv::CsvDocument;
use crate::error::DashboardError;
use crate::forms::{
    FormErrors, PagespeedBreakdownForm, PagespeedHistoryForm, PagespeedTrendForm, ReportForm,
};
use crate::report::{ReportRule, flatten_report};
use crate::templates::{self, ChartFrame, ChartPoint};
use crate::{AppState, View, link_builder, log_invalid_form, run_view, unsupported_format};

const KIND: &str = "pagespeed";
const HISTORY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const RESOURCE_METRICS: [PagespeedMetric; 3] = [
    PagespeedMetric::NumberResources,
    PagespeedMetric::NumberStaticResources,
    PagespeedMetric::NumberCssResources,
];

const BYTE_METRICS: [PagespeedMetric; 7] = [
    PagespeedMetric::TotalRequestBytes,
    PagespeedMetric::TextResponseBytes,
    PagespeedMetric::CssResponseBytes,
    PagespeedMetric::HtmlResponseBytes,
    PagespeedMetric::ImageResponseBytes,
    PagespeedMetric::JavascriptResponseBytes,
    PagespeedMetric::OtherResponseBytes,
];

/// Response byte kinds drawn as pie slices; the request total is left out.
const PIE_METRICS: [PagespeedMetric; 6] = [
    PagespeedMetric::TextResponseBytes,
    PagespeedMetric::CssResponseBytes,
    PagespeedMetric::HtmlResponseBytes,
    PagespeedMetric::ImageResponseBytes,
    PagespeedMetric::JavascriptResponseBytes,
    PagespeedMetric::OtherResponseBytes,
];

pub(crate) async fn trends(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, trends_view).await
}

pub(crate) async fn breakdown(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, breakdown_view).await
}

pub(crate) async fn history(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, history_view).await
}

pub(crate) async fn report(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, report_view).await
}

fn trends_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    const TITLE: &str = "Pagespeed Trends";

    let store = state.open_store()?;
    let today = state.today();
    let index = |errors: &FormErrors| {
        let extra = html! {
            (templates::select_input(
                "metric",
                "Metric",
                PagespeedMetric::ALL.iter().map(|metric| metric.as_str()),
            ))
            (range_inputs(today))
        };
        pagespeed_index(&store, TITLE, "/pagespeed/trends", errors, extra, PagespeedTrendForm::FORMATS)
    };
    if ctx.query.is_empty() {
        return index(&FormErrors::default());
    }
    let form = match PagespeedTrendForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("PagespeedTrendForm", &errors);
            return index(&errors);
        }
    };

    let target = PagespeedTarget {
        domain: &form.domain,
        url: &form.url,
        strategy: form.strategy,
    };
    let range = DateRange::resolve(form.date_from, form.date_to, today);
    let points = store.pagespeed_daily_average(&target, form.metric, range)?;
    tracing::debug!(
        domain = %form.domain,
        url = %form.url,
        metric = form.metric.as_str(),
        points = points.len(),
        "loaded pagespeed trend"
    );

    let title = format!("{} ({})", form.metric.as_str(), form.strategy.as_str());
    match form.format {
        OutputFormat::Json => Ok(View::Json(trend_json(form.metric, &points))),
        OutputFormat::Csv => {
            let mut document = CsvDocument::with_header(&["date", "value"]);
            for point in &points {
                document.push_row(&[format_date(point.date), optional_number(point.value)]);
            }
            Ok(View::Csv(document))
        }
        OutputFormat::Db => {
            let settings = state.dash_settings(&store, ctx.user.as_deref())?;
            let frame = ChartFrame::embedded(settings, form.size);
            Ok(View::Page(templates::fragment(
                TITLE,
                frame,
                templates::chart(GraphKind::Qgraph, &title, &metric_points(&points), frame),
            )))
        }
        // Rejected by the form.
        OutputFormat::Db1
        | OutputFormat::Db2
        | OutputFormat::Json1
        | OutputFormat::Json2
        | OutputFormat::Graph => Ok(unsupported_format("PagespeedTrendForm", form.format)),
        OutputFormat::Page => {
            let links = link_builder(ctx);
            let nav = [
                (
                    "Dashboard",
                    links.pagespeed_trends(&target, form.metric, None, OutputFormat::Db),
                ),
                (
                    "JSON",
                    links.pagespeed_trends(&target, form.metric, None, OutputFormat::Json),
                ),
                (
                    "CSV",
                    links.pagespeed_trends(&target, form.metric, Some(range), OutputFormat::Csv),
                ),
                (
                    "History",
                    links.pagespeed_history(&target, Some(range), OutputFormat::Page),
                ),
                (
                    "Breakdown",
                    links.pagespeed_breakdown(&target, None, OutputFormat::Page),
                ),
            ];
            let body = html! {
                h2 { (form.url) }
                (templates::links(&nav))
                (templates::chart(
                    GraphKind::Qgraph,
                    &title,
                    &metric_points(&points),
                    ChartFrame::page(form.size),
                ))
            };
            Ok(View::Page(templates::layout(TITLE, body)))
        }
    }
}

fn breakdown_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    const TITLE: &str = "Pagespeed Breakdown";

    let store = state.open_store()?;
    let index = |errors: &FormErrors| {
        let extra = html! {
            label {
                "Date"
                input type="date" name="date";
            }
        };
        pagespeed_index(
            &store,
            TITLE,
            "/pagespeed/breakdown",
            errors,
            extra,
            PagespeedBreakdownForm::FORMATS,
        )
    };
    if ctx.query.is_empty() {
        return index(&FormErrors::default());
    }
    let form = match PagespeedBreakdownForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("PagespeedBreakdownForm", &errors);
            return index(&errors);
        }
    };

    let target = PagespeedTarget {
        domain: &form.domain,
        url: &form.url,
        strategy: form.strategy,
    };
    let date = match form.date {
        Some(date) => date,
        None => match store.latest_pagespeed_date(&target)? {
            Some(latest) => latest,
            None => {
                tracing::debug!(domain = %form.domain, url = %form.url, "no pagespeed runs");
                return Ok(View::NoData(KIND));
            }
        },
    };
    let scores = store.pagespeed_scores_on(&target, date)?;
    let day_links = [
        (
            "Back",
            pagespeed_breakdown_relative(&target, days_before(date, 1)),
        ),
        (
            "Forward",
            pagespeed_breakdown_relative(&target, days_after(date, 1)),
        ),
    ];

    if scores.is_empty() {
        let message = format!(
            "The report returned no data.  Domain:{}, Url:{}, Strategy:{}, Date:{}",
            form.domain,
            form.url,
            form.strategy.as_str(),
            format_date(date)
        );
        return Ok(View::Page(templates::generic_message(
            "No Data",
            &message,
            &day_links,
        )));
    }

    match form.format {
        OutputFormat::Json => Ok(View::Json(Value::Array(
            scores
                .iter()
                .map(|score| breakdown_json(&form.url, score))
                .collect(),
        ))),
        OutputFormat::Db => {
            let settings = state.dash_settings(&store, ctx.user.as_deref())?;
            let frame = ChartFrame::embedded(settings, form.size);
            Ok(View::Page(templates::fragment(
                TITLE,
                frame,
                byte_pie(&form.url, &scores, frame),
            )))
        }
        // Rejected by the form.
        OutputFormat::Db1
        | OutputFormat::Db2
        | OutputFormat::Json1
        | OutputFormat::Json2
        | OutputFormat::Csv
        | OutputFormat::Graph => Ok(unsupported_format("PagespeedBreakdownForm", form.format)),
        OutputFormat::Page => {
            let links = link_builder(ctx);
            let alternate = PagespeedTarget {
                strategy: form.strategy.alternate(),
                ..target
            };
            let mut nav = day_links.to_vec();
            nav.push((
                strategy_label(alternate.strategy),
                links.pagespeed_breakdown(&alternate, Some(date), OutputFormat::Page),
            ));
            nav.push((
                "Dashboard",
                links.pagespeed_breakdown(&target, None, OutputFormat::Db),
            ));
            nav.push((
                "JSON",
                links.pagespeed_breakdown(&target, None, OutputFormat::Json),
            ));

            let frame = ChartFrame::page(form.size);
            let mut headings = vec!["date".to_owned()];
            headings.extend(
                RESOURCE_METRICS
                    .iter()
                    .chain(&BYTE_METRICS)
                    .map(|metric| metric.as_str().to_owned()),
            );
            let rows: Vec<Vec<String>> = scores
                .iter()
                .map(|score| {
                    let mut row = vec![score.date.format(HISTORY_DATE_FORMAT).to_string()];
                    row.extend(
                        RESOURCE_METRICS
                            .iter()
                            .chain(&BYTE_METRICS)
                            .map(|metric| score.metric_value(*metric).to_string()),
                    );
                    row
                })
                .collect();
            let body = html! {
                h2 { (form.url) " on " (format_date(date)) " (" (form.strategy.as_str()) ")" }
                (templates::links(&nav))
                (resource_pie(&form.url, &scores, frame))
                (byte_pie(&form.url, &scores, frame))
                (templates::table(&headings, &rows))
            };
            Ok(View::Page(templates::layout(TITLE, body)))
        }
    }
}

fn history_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    const TITLE: &str = "Pagespeed History";

    let store = state.open_store()?;
    let today = state.today();
    let index = |errors: &FormErrors| {
        pagespeed_index(
            &store,
            TITLE,
            "/pagespeed/history",
            errors,
            range_inputs(today),
            PagespeedHistoryForm::FORMATS,
        )
    };
    if ctx.query.is_empty() {
        return index(&FormErrors::default());
    }
    let form = match PagespeedHistoryForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("PagespeedHistoryForm", &errors);
            return index(&errors);
        }
    };

    let target = PagespeedTarget {
        domain: &form.domain,
        url: &form.url,
        strategy: form.strategy,
    };
    let range = DateRange::resolve(form.date_from, form.date_to, today);
    let runs = store.pagespeed_history(&target, range)?;
    let headings = history_headings();

    if form.format == OutputFormat::Csv {
        let mut document = CsvDocument::with_header(&headings);
        for run in &runs {
            document.push_row(&history_row(&run.score));
        }
        return Ok(View::Csv(document));
    }

    let links = link_builder(ctx);
    let nav = [(
        "CSV",
        links.pagespeed_history(&target, Some(range), OutputFormat::Csv),
    )];
    let body = html! {
        h2 { (form.url) " (" (form.strategy.as_str()) ")" }
        p { (format_date(range.from)) " to " (format_date(range.to)) }
        (templates::links(&nav))
        (history_table(&headings, &runs))
    };
    Ok(View::Page(templates::layout(TITLE, body)))
}

fn report_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    let form = match ReportForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("PagespeedReportForm", &errors);
            return Ok(View::Page(templates::invalid_request(&errors)));
        }
    };

    let store = state.open_store()?;
    let Some(name) = store.pagespeed_report_name(form.id)? else {
        return Ok(View::NoData("pagespeed report"));
    };
    if !is_plain_file_name(&name) {
        tracing::warn!(id = form.id, name = %name, "refusing report outside the upload directory");
        return Ok(View::NoData("pagespeed report"));
    }

    let path = state.upload_dir().join(&name);
    let raw = std::fs::read_to_string(&path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let rules = flatten_report(&parsed);
    tracing::debug!(id = form.id, rules = rules.len(), "loaded pagespeed report");

    Ok(View::Page(templates::layout(
        "Pagespeed Report",
        report_body(&rules),
    )))
}

fn pagespeed_index(
    store: &SqliteStore,
    title: &str,
    action: &str,
    errors: &FormErrors,
    extra: Markup,
    formats: &[OutputFormat],
) -> Result<View, DashboardError> {
    let tests = store.pagespeed_tests()?;
    let mut by_domain: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for test in &tests {
        by_domain
            .entry(test.domain.as_str())
            .or_default()
            .push(test.url.as_str());
    }
    let urls: Vec<&str> = tests.iter().map(|test| test.url.as_str()).collect();

    let fields = html! {
        (templates::select_input("domain", "Domain", by_domain.keys()))
        (templates::select_input("url", "Url", &urls))
        (templates::select_input("strategy", "Strategy", Strategy::ALL.iter().map(|s| s.as_str())))
        (extra)
        (templates::format_select(formats))
    };
    let body = html! {
        (templates::query_form(action, errors, fields))
        @for (domain, urls) in &by_domain {
            h3 { (domain) }
            ul {
                @for url in urls {
                    li { (url) }
                }
            }
        }
    };
    Ok(View::Page(templates::layout(title, body)))
}

fn range_inputs(today: NaiveDate) -> Markup {
    let range = DateRange::trailing(today, DEFAULT_RANGE_DAYS);
    html! {
        (templates::date_input("date_from", "From", range.from))
        (templates::date_input("date_to", "To", range.to))
    }
}

fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Desktop => "Desktop breakdown",
        Strategy::Mobile => "Mobile breakdown",
    }
}

fn trend_json(metric: PagespeedMetric, points: &[MetricPoint]) -> Value {
    Value::Array(
        points
            .iter()
            .map(|point| {
                let mut row = Map::new();
                row.insert("date".to_owned(), json!(format_date(point.date)));
                row.insert(metric.as_str().to_owned(), json!(point.value));
                Value::Object(row)
            })
            .collect(),
    )
}

fn breakdown_json(url: &str, score: &PagespeedScore) -> Value {
    let mut row = Map::new();
    row.insert("url".to_owned(), json!(url));
    for metric in RESOURCE_METRICS.iter().chain(&BYTE_METRICS) {
        row.insert(metric.as_str().to_owned(), json!(score.metric_value(*metric)));
    }
    Value::Object(row)
}

fn metric_points(points: &[MetricPoint]) -> Vec<ChartPoint> {
    points
        .iter()
        .map(|point| ChartPoint::new(format_date(point.date), point.value))
        .collect()
}

fn optional_number(value: Option<f64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

/// Pie of the day's most recent run.
fn byte_pie(url: &str, scores: &[PagespeedScore], frame: ChartFrame) -> Markup {
    metric_pie(&format!("Response bytes: {url}"), &PIE_METRICS, scores, frame)
}

fn resource_pie(url: &str, scores: &[PagespeedScore], frame: ChartFrame) -> Markup {
    metric_pie(&format!("Resources: {url}"), &RESOURCE_METRICS[1..], scores, frame)
}

fn metric_pie(
    title: &str,
    metrics: &[PagespeedMetric],
    scores: &[PagespeedScore],
    frame: ChartFrame,
) -> Markup {
    let points: Vec<ChartPoint> = match scores.last() {
        Some(score) => metrics
            .iter()
            .map(|metric| {
                ChartPoint::new(metric.as_str(), Some(score.metric_value(*metric) as f64))
            })
            .collect(),
        None => Vec::new(),
    };
    templates::chart(GraphKind::Qpie, title, &points, frame)
}

fn history_headings() -> Vec<String> {
    let mut headings = vec!["date".to_owned()];
    headings.extend(
        PagespeedMetric::ALL
            .iter()
            .map(|metric| metric.as_str().to_owned()),
    );
    headings
}

fn history_row(score: &PagespeedScore) -> Vec<String> {
    let mut row = vec![score.date.format(HISTORY_DATE_FORMAT).to_string()];
    row.extend(
        PagespeedMetric::ALL
            .iter()
            .map(|metric| score.metric_value(*metric).to_string()),
    );
    row
}

fn history_table(headings: &[String], runs: &[PagespeedRun]) -> Markup {
    html! {
        table.history {
            thead {
                tr {
                    @for heading in headings {
                        th { (heading) }
                    }
                    th { "Report" }
                }
            }
            tbody {
                @for run in runs {
                    tr {
                        @for cell in history_row(&run.score) {
                            td { (cell) }
                        }
                        td {
                            @if run.score.report.is_some() {
                                a href=(quinico_core::links::relative(
                                    "/pagespeed/report",
                                    &[("id", run.id.to_string().as_str())],
                                )) { "View" }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn report_body(rules: &[ReportRule]) -> Markup {
    html! {
        @if rules.is_empty() {
            p { "The report contains no rule results." }
        }
        @for rule in rules {
            section.rule {
                h3 { (rule.localized_name) }
                p.meta {
                    (rule.name) " | score " (rule.score) " | impact " (rule.impact)
                }
                @for block in &rule.url_blocks {
                    p { (block.header) }
                    @if !block.urls.is_empty() {
                        ul {
                            @for url in &block.urls {
                                li { (url) }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    fn score(date: &str, text: i64, image: i64) -> PagespeedScore {
        PagespeedScore {
            date: NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S").expect("datetime"),
            strategy: Strategy::Desktop,
            score: 88,
            number_hosts: 3,
            number_resources: 40,
            number_static_resources: 30,
            number_css_resources: 4,
            total_request_bytes: 1_000,
            text_response_bytes: text,
            css_response_bytes: 2_000,
            html_response_bytes: 3_000,
            image_response_bytes: image,
            javascript_response_bytes: 5_000,
            other_response_bytes: 0,
            report: None,
        }
    }

    #[test]
    fn trend_json_keys_values_by_metric_name() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 1).expect("date");
        let value = trend_json(
            PagespeedMetric::ImageResponseBytes,
            &[MetricPoint {
                date,
                value: Some(1_500.5),
            }],
        );
        assert_eq!(
            value,
            json!([{"date": "2026-06-01", "imageResponseBytes": 1500.5}])
        );
    }

    #[test]
    fn history_rows_follow_the_headings() {
        let headings = history_headings();
        let row = history_row(&score("2026-06-01 07:30:00", 10, 20));
        assert_eq!(headings.len(), row.len());
        assert_eq!(headings[1], "score");
        assert_eq!(headings[12], "otherResponseBytes");
        assert_eq!(row[0], "2026-06-01 07:30:00");
        assert_eq!(row[1], "88");
    }

    #[test]
    fn breakdown_json_carries_url_and_camel_case_fields() {
        let row = breakdown_json("https://example.com/", &score("2026-06-01 07:30:00", 10, 20));
        assert_eq!(row["url"], "https://example.com/");
        assert_eq!(row["numberCssResources"], 4);
        assert_eq!(row["imageResponseBytes"], 20);
        assert!(row.get("score").is_none());
    }

    #[test]
    fn pies_use_the_latest_run_of_the_day() {
        let markup = byte_pie(
            "https://example.com/",
            &[
                score("2026-06-01 07:30:00", 111, 1),
                score("2026-06-01 19:30:00", 999, 2),
            ],
            ChartFrame::page(Default::default()),
        )
        .into_string();
        assert!(markup.contains("999"));
        assert!(!markup.contains("111"));
        assert!(markup.contains(r#"class="qpie""#));
    }

    #[test]
    fn report_names_must_stay_inside_the_upload_directory() {
        assert!(is_plain_file_name("report-1.json"));
        assert!(!is_plain_file_name("../secrets.json"));
        assert!(!is_plain_file_name("/etc/passwd"));
        assert!(!is_plain_file_name("nested/report.json"));
    }
}
