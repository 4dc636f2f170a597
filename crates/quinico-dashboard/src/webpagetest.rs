use axum::extract::State;
use chrono::NaiveDate;
use maud::{Markup, html};
use quinico_core::links::relative;
use quinico_core::{
    DEFAULT_RANGE_DAYS, DateRange, GraphKind, OutputFormat, WebpagetestMetric, format_date,
};
use quinico_store::{SeriesPoint, SqliteStore, WebpagetestRun};
use serde_json::{Map, Value, json};

use crate::context::RequestContext;
use crate::csv::CsvDocument;
use crate::error::DashboardError;
use crate::forms::{FormErrors, ReportForm, WebpagetestHistoryForm, WebpagetestTrendForm};
use crate::templates::{self, ChartFrame, ChartPoint};
use crate::{AppState, View, link_builder, log_invalid_form, run_view, unsupported_format};

const KIND: &str = "webpagetest";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) async fn trends(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, trends_view).await
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
    const TITLE: &str = "Webpagetest Trends";

    let store = state.open_store()?;
    let today = state.today();
    let index = |errors: &FormErrors| {
        let extra = html! {
            (templates::select_input(
                "metric",
                "Metric",
                WebpagetestMetric::ALL.iter().map(|metric| metric.as_str()),
            ))
            label {
                "Include failed runs"
                input type="checkbox" name="include_failed" value="on";
            }
        };
        webpagetest_index(
            &store,
            today,
            TITLE,
            "/webpagetest/trends",
            errors,
            extra,
            WebpagetestTrendForm::FORMATS,
        )
    };
    if ctx.query.is_empty() {
        return index(&FormErrors::default());
    }
    let form = match WebpagetestTrendForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("WebpagetestTrendForm", &errors);
            return index(&errors);
        }
    };

    let Some(test) = store.webpagetest_test(form.test_id)? else {
        tracing::debug!(test_id = form.test_id, "unknown webpagetest test");
        return Ok(View::NoData(KIND));
    };
    let range = DateRange::resolve(form.date_from, form.date_to, today);
    let series = store.webpagetest_series(form.test_id, form.metric, range, form.include_failed)?;
    tracing::debug!(
        test_id = form.test_id,
        metric = form.metric.as_str(),
        include_failed = form.include_failed,
        points = series.len(),
        "loaded webpagetest trend"
    );

    let title = format!("{} ({}, {})", form.metric.as_str(), test.url, test.location);
    match form.format {
        OutputFormat::Json => Ok(View::Json(trend_json(form.metric, &series))),
        OutputFormat::Csv => {
            let mut document = CsvDocument::with_header(&["date", "value"]);
            for point in &series {
                document.push_row(&[
                    point.at.format(TIMESTAMP_FORMAT).to_string(),
                    point.value.to_string(),
                ]);
            }
            Ok(View::Csv(document))
        }
        OutputFormat::Db => {
            let settings = state.dash_settings(&store, ctx.user.as_deref())?;
            let frame = ChartFrame::embedded(settings, form.size);
            Ok(View::Page(templates::fragment(
                TITLE,
                frame,
                templates::chart(GraphKind::Qgraph, &title, &series_points(&series), frame),
            )))
        }
        OutputFormat::Graph => {
            let frame = ChartFrame::page(form.size);
            Ok(View::Page(templates::fragment(
                TITLE,
                frame,
                templates::chart(GraphKind::Qgraph, &title, &series_points(&series), frame),
            )))
        }
        // Rejected by the form.
        OutputFormat::Db1
        | OutputFormat::Db2
        | OutputFormat::Json1
        | OutputFormat::Json2 => Ok(unsupported_format("WebpagetestTrendForm", form.format)),
        OutputFormat::Page => {
            let links = link_builder(ctx);
            let nav = [
                (
                    "Dashboard",
                    links.webpagetest_trends(test.id, form.metric, None, OutputFormat::Db),
                ),
                (
                    "Graph",
                    links.webpagetest_trends(test.id, form.metric, None, OutputFormat::Graph),
                ),
                (
                    "JSON",
                    links.webpagetest_trends(test.id, form.metric, None, OutputFormat::Json),
                ),
                (
                    "CSV",
                    links.webpagetest_trends(test.id, form.metric, Some(range), OutputFormat::Csv),
                ),
                (
                    "History",
                    links.webpagetest_history(test.id, Some(range), OutputFormat::Page),
                ),
            ];
            let body = html! {
                h2 { (test.url) " from " (test.location) }
                (templates::links(&nav))
                (templates::chart(
                    GraphKind::Qgraph,
                    &title,
                    &series_points(&series),
                    ChartFrame::page(form.size),
                ))
            };
            Ok(View::Page(templates::layout(TITLE, body)))
        }
    }
}

fn history_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    const TITLE: &str = "Webpagetest History";

    let store = state.open_store()?;
    let today = state.today();
    let index = |errors: &FormErrors| {
        webpagetest_index(
            &store,
            today,
            TITLE,
            "/webpagetest/history",
            errors,
            html! {},
            WebpagetestHistoryForm::FORMATS,
        )
    };
    if ctx.query.is_empty() {
        return index(&FormErrors::default());
    }
    let form = match WebpagetestHistoryForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("WebpagetestHistoryForm", &errors);
            return index(&errors);
        }
    };

    let Some(test) = store.webpagetest_test(form.test_id)? else {
        return Ok(View::NoData(KIND));
    };
    let range = DateRange::resolve(form.date_from, form.date_to, today);
    let runs = store.webpagetest_history(form.test_id, range)?;
    let headings = history_headings();

    if form.format == OutputFormat::Csv {
        let mut document = CsvDocument::with_header(&headings);
        for run in &runs {
            document.push_row(&history_row(run));
        }
        return Ok(View::Csv(document));
    }

    let links = link_builder(ctx);
    let nav = [(
        "CSV",
        links.webpagetest_history(test.id, Some(range), OutputFormat::Csv),
    )];
    let body = html! {
        h2 { (test.url) " from " (test.location) }
        p { (format_date(range.from)) " to " (format_date(range.to)) }
        (templates::links(&nav))
        table.history {
            thead {
                tr {
                    @for heading in &headings {
                        th { (heading) }
                    }
                    th { "Report" }
                }
            }
            tbody {
                @for run in &runs {
                    tr.failed[!run.result.successful] {
                        @for cell in history_row(run) {
                            td { (cell) }
                        }
                        td { a href=(report_link(run.id)) { "View" } }
                    }
                }
            }
        }
    };
    Ok(View::Page(templates::layout(TITLE, body)))
}

fn report_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    let form = match ReportForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("WebpagetestReportForm", &errors);
            return Ok(View::Page(templates::invalid_request(&errors)));
        }
    };

    let store = state.open_store()?;
    let Some(run) = store.webpagetest_run(form.id)? else {
        return Ok(View::NoData("webpagetest report"));
    };
    Ok(View::Page(templates::layout(
        "Webpagetest Report",
        report_body(&run),
    )))
}

fn webpagetest_index(
    store: &SqliteStore,
    today: NaiveDate,
    title: &str,
    action: &str,
    errors: &FormErrors,
    extra: Markup,
    formats: &[OutputFormat],
) -> Result<View, DashboardError> {
    let tests = store.webpagetest_tests()?;
    let range = DateRange::trailing(today, DEFAULT_RANGE_DAYS);
    let fields = html! {
        (templates::select_input(
            "test_id",
            "Test",
            tests.iter().map(|test| test.id.to_string()),
        ))
        (extra)
        (templates::date_input("date_from", "From", range.from))
        (templates::date_input("date_to", "To", range.to))
        (templates::format_select(formats))
    };
    let body = html! {
        (templates::query_form(action, errors, fields))
        @if tests.is_empty() {
            p { "No webpagetest tests are configured." }
        } @else {
            table {
                thead { tr { th { "Test" } th { "Url" } th { "Location" } } }
                tbody {
                    @for test in &tests {
                        tr {
                            td { (test.id) }
                            td { (test.url) }
                            td { (test.location) }
                        }
                    }
                }
            }
        }
    };
    Ok(View::Page(templates::layout(title, body)))
}

fn trend_json(metric: WebpagetestMetric, series: &[SeriesPoint]) -> Value {
    Value::Array(
        series
            .iter()
            .map(|point| {
                let mut row = Map::new();
                row.insert(
                    "date".to_owned(),
                    json!(point.at.format(TIMESTAMP_FORMAT).to_string()),
                );
                row.insert(metric.as_str().to_owned(), json!(point.value));
                Value::Object(row)
            })
            .collect(),
    )
}

fn series_points(series: &[SeriesPoint]) -> Vec<ChartPoint> {
    series
        .iter()
        .map(|point| {
            ChartPoint::new(
                point.at.format(TIMESTAMP_FORMAT).to_string(),
                Some(point.value as f64),
            )
        })
        .collect()
}

fn history_headings() -> Vec<String> {
    let mut headings = vec!["date".to_owned(), "successful".to_owned()];
    headings.extend(
        WebpagetestMetric::ALL
            .iter()
            .map(|metric| metric.as_str().to_owned()),
    );
    headings
}

fn history_row(run: &WebpagetestRun) -> Vec<String> {
    let mut row = vec![
        run.result.date.format(TIMESTAMP_FORMAT).to_string(),
        run.result.successful.to_string(),
    ];
    row.extend(
        WebpagetestMetric::ALL
            .iter()
            .map(|metric| run.result.metric_value(*metric).to_string()),
    );
    row
}

fn report_link(run_id: i64) -> String {
    relative("/webpagetest/report", &[("id", run_id.to_string().as_str())])
}

fn report_body(run: &WebpagetestRun) -> Markup {
    html! {
        h2 { (run.test.url) " from " (run.test.location) }
        dl.report {
            dt { "Run" } dd { (run.id) }
            dt { "Date" } dd { (run.result.date.format(TIMESTAMP_FORMAT).to_string()) }
            dt { "Successful" } dd { @if run.result.successful { "yes" } @else { "no" } }
            @for metric in WebpagetestMetric::ALL {
                dt { (metric.as_str()) }
                dd { (run.result.metric_value(metric)) }
            }
        }
    }
}
