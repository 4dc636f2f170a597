use axum::extract::State;
use maud::{Markup, html};
use quinico_core::{
    DEFAULT_RANGE_DAYS, DateRange, DayChange, FirstPageCount, GraphKind, KeywordTarget,
    OutputFormat, RankMatrix, build_rank_matrix, compute_changes, format_date,
};
use quinico_store::{KeywordDomain, RankPoint, SqliteStore, TopTenEntry};

use crate::context::RequestContext;
use crate::csv::CsvDocument;
use crate::error::DashboardError;
use crate::forms::{FormErrors, KeywordDashboardForm, KeywordTrendForm};
use crate::templates::{self, ChartFrame, ChartPoint};
use crate::{AppState, View, link_builder, log_invalid_form, run_view, unsupported_format};

const KIND: &str = "keyword rank";
const DASHBOARD_TITLE: &str = "Keyword Dashboard";
const TRENDS_TITLE: &str = "Keyword Trends";
const SPARKLINE: ChartFrame = ChartFrame {
    width: 160,
    height: 40,
    font: 8,
    step: None,
    max: None,
};

pub(crate) async fn dashboard(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, dashboard_view).await
}

pub(crate) async fn trends(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, trends_view).await
}

fn dashboard_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    let store = state.open_store()?;
    if ctx.query.is_empty() {
        return dashboard_index(&store, &FormErrors::default());
    }
    let form = match KeywordDashboardForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("KeywordDashboardForm", &errors);
            return dashboard_index(&store, &errors);
        }
    };

    let Some(domain) = store.keyword_domain(form.id)? else {
        tracing::debug!(domain_id = form.id, "unknown keyword domain");
        return Ok(View::NoData(KIND));
    };
    let today = state.today();
    let Some(matrix) = build_rank_matrix(&store, form.id, today)? else {
        tracing::debug!("keyword rank collection has never run");
        return Ok(View::NoData(KIND));
    };
    let changes = compute_changes(&matrix);
    tracing::debug!(
        domain_id = form.id,
        format = %form.format,
        keywords = matrix.keywords.len(),
        "built keyword rank matrix"
    );

    match form.format {
        OutputFormat::Json1 => View::json(&changes),
        OutputFormat::Json2 => View::json(&matrix.first_page),
        OutputFormat::Csv => Ok(View::Csv(matrix_csv(&matrix))),
        OutputFormat::Db | OutputFormat::Db1 | OutputFormat::Db2 => {
            let settings = state.dash_settings(&store, ctx.user.as_deref())?;
            let frame = ChartFrame::embedded(settings, form.size);
            let body = match form.format {
                OutputFormat::Db => first_page_chart(&matrix.first_page, frame),
                OutputFormat::Db1 => changes_table(&changes),
                _ => html! {
                    (first_page_chart(&matrix.first_page, frame))
                    (changes_table(&changes))
                },
            };
            Ok(View::Page(templates::fragment(
                DASHBOARD_TITLE,
                frame,
                html! {
                    h2 { (domain_label(&domain)) }
                    (body)
                },
            )))
        }
        // Rejected by the form.
        OutputFormat::Json | OutputFormat::Graph => {
            Ok(unsupported_format("KeywordDashboardForm", form.format))
        }
        OutputFormat::Page => {
            let history_range = DateRange::trailing(today, DEFAULT_RANGE_DAYS);
            let mut histories = Vec::with_capacity(matrix.keywords.len());
            for keyword in matrix.keywords.keys() {
                histories.push(store.keyword_rank_history(form.id, keyword, history_range)?);
            }
            let page = DashboardPage {
                domain: &domain,
                matrix: &matrix,
                changes: &changes,
                histories: &histories,
                keyword_count: store.keyword_count(form.id)?,
                max_keyword_results: state.config().keyword_rank.max_keyword_results,
            };
            Ok(View::Page(page.render(ctx, form.size)))
        }
    }
}

struct DashboardPage<'a> {
    domain: &'a KeywordDomain,
    matrix: &'a RankMatrix,
    changes: &'a [DayChange],
    histories: &'a [Vec<RankPoint>],
    keyword_count: usize,
    max_keyword_results: u32,
}

impl DashboardPage<'_> {
    fn render(&self, ctx: &RequestContext, size: crate::forms::ChartSize) -> Markup {
        let links = link_builder(ctx);
        let id = self.domain.id;
        let download_links = [
            ("Dashboard (db)", links.keyword_dashboard(id, OutputFormat::Db)),
            ("Dashboard (db1)", links.keyword_dashboard(id, OutputFormat::Db1)),
            ("Dashboard (db2)", links.keyword_dashboard(id, OutputFormat::Db2)),
            ("Changes (json1)", links.keyword_dashboard(id, OutputFormat::Json1)),
            ("First page (json2)", links.keyword_dashboard(id, OutputFormat::Json2)),
            ("CSV", links.keyword_dashboard(id, OutputFormat::Csv)),
        ];

        let body = html! {
            h2 { (domain_label(self.domain)) }
            p { "Tracking " (self.keyword_count) " keywords." }
            (templates::links(&download_links))
            (first_page_chart(&self.matrix.first_page, ChartFrame::page(size)))
            (changes_table(self.changes))
            table.ranks {
                thead {
                    tr {
                        @for heading in self.matrix.headings() {
                            th { (heading) }
                        }
                    }
                }
                tbody {
                    @for ((keyword, ranks), history) in self.matrix.keywords.iter().zip(self.histories) {
                        tr {
                            td { (keyword) }
                            @for cell in ranks.cells() {
                                td { (cell) }
                            }
                            td { (sparkline(history, self.max_keyword_results)) }
                        }
                    }
                }
            }
        };
        templates::layout(DASHBOARD_TITLE, body)
    }
}

fn dashboard_index(store: &SqliteStore, errors: &FormErrors) -> Result<View, DashboardError> {
    let domains = store.keyword_domains()?;
    let body = html! {
        (templates::form_errors(errors))
        @if domains.is_empty() {
            p { "No keyword domains are configured." }
        } @else {
            table {
                thead { tr { th { "Domain" } th { "gl" } th { "googlehost" } } }
                tbody {
                    @for domain in &domains {
                        tr {
                            td {
                                a href=(quinico_core::links::relative(
                                    "/keyword_rank/dashboard",
                                    &[("id", domain.id.to_string().as_str())],
                                )) { (domain.domain) }
                            }
                            td { (domain.gl) }
                            td { (domain.googlehost) }
                        }
                    }
                }
            }
        }
    };
    Ok(View::Page(templates::layout(DASHBOARD_TITLE, body)))
}

fn trends_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    let store = state.open_store()?;
    let today = state.today();
    if ctx.query.is_empty() {
        return trends_index(&store, today, &FormErrors::default());
    }
    let form = match KeywordTrendForm::parse(&ctx.query) {
        Ok(form) => form,
        Err(errors) => {
            log_invalid_form("KeywordTrendForm", &errors);
            return trends_index(&store, today, &errors);
        }
    };

    let range = DateRange::resolve(form.date_from, form.date_to, today);
    let target = KeywordTarget {
        domain: &form.domain,
        keyword: &form.keyword,
        gl: &form.gl,
        googlehost: &form.googlehost,
    };
    let ranks = store.keyword_trend(&target, range)?;
    tracing::debug!(
        domain = %form.domain,
        keyword = %form.keyword,
        points = ranks.len(),
        format = %form.format,
        "loaded keyword trend"
    );

    match form.format {
        OutputFormat::Json => View::json(&ranks),
        OutputFormat::Csv => {
            let mut document = CsvDocument::with_header(&["date", "rank"]);
            for point in &ranks {
                document.push_row(&[format_date(point.date), point.rank.to_string()]);
            }
            Ok(View::Csv(document))
        }
        OutputFormat::Db => {
            let settings = state.dash_settings(&store, ctx.user.as_deref())?;
            let frame = ChartFrame::embedded(settings, form.size);
            Ok(View::Page(templates::fragment(
                TRENDS_TITLE,
                frame,
                trend_chart(&form, &ranks, frame),
            )))
        }
        // Rejected by the form.
        OutputFormat::Db1
        | OutputFormat::Db2
        | OutputFormat::Json1
        | OutputFormat::Json2
        | OutputFormat::Graph => Ok(unsupported_format("KeywordTrendForm", form.format)),
        OutputFormat::Page => {
            let top_ten = match ranks.last() {
                Some(last) => store.top_ten(&target, last.date)?,
                None => Vec::new(),
            };
            let links = link_builder(ctx);
            let download_links = [
                ("Dashboard", links.keyword_trends(&target, None, OutputFormat::Db)),
                ("JSON", links.keyword_trends(&target, None, OutputFormat::Json)),
                ("CSV", links.keyword_trends(&target, Some(range), OutputFormat::Csv)),
            ];
            let body = html! {
                h2 { (form.keyword) " on " (form.domain) " (" (form.gl) ", " (form.googlehost) ")" }
                (templates::links(&download_links))
                (trend_chart(&form, &ranks, ChartFrame::page(form.size)))
                (top_ten_table(&top_ten))
            };
            Ok(View::Page(templates::layout(TRENDS_TITLE, body)))
        }
    }
}

fn trends_index(
    store: &SqliteStore,
    today: chrono::NaiveDate,
    errors: &FormErrors,
) -> Result<View, DashboardError> {
    let domains = store.keyword_domain_names()?;
    let mut keywords = Vec::with_capacity(domains.len());
    for domain in &domains {
        keywords.push(store.keywords_for_domain_name(domain)?);
    }
    let gl_values = store.keyword_gl_values()?;
    let googlehost_values = store.keyword_googlehost_values()?;
    let default_range = DateRange::trailing(today, DEFAULT_RANGE_DAYS);

    let fields = html! {
        (templates::select_input("domain", "Domain", &domains))
        (templates::text_input("keyword", "Keyword"))
        (templates::select_input("gl", "gl", &gl_values))
        (templates::select_input("googlehost", "googlehost", &googlehost_values))
        (templates::date_input("date_from", "From", default_range.from))
        (templates::date_input("date_to", "To", default_range.to))
        (templates::format_select(KeywordTrendForm::FORMATS))
    };
    let body = html! {
        (templates::query_form("/keyword_rank/trends", errors, fields))
        @for (domain, keywords) in domains.iter().zip(&keywords) {
            h3 { (domain) }
            ul {
                @for keyword in keywords {
                    li { (keyword) }
                }
            }
        }
    };
    Ok(View::Page(templates::layout(TRENDS_TITLE, body)))
}

fn domain_label(domain: &KeywordDomain) -> String {
    format!("{} ({}, {})", domain.domain, domain.gl, domain.googlehost)
}

fn matrix_csv(matrix: &RankMatrix) -> CsvDocument {
    let mut document = CsvDocument::with_header(&matrix.headings());
    for (keyword, ranks) in &matrix.keywords {
        let mut row = Vec::with_capacity(ranks.ranks.len() + 3);
        row.push(keyword.clone());
        row.extend(ranks.cells());
        row.push(String::new());
        document.push_row(&row);
    }
    document
}

fn first_page_chart(first_page: &[FirstPageCount], frame: ChartFrame) -> Markup {
    let points: Vec<ChartPoint> = first_page
        .iter()
        .rev()
        .map(|day| ChartPoint::new(format_date(day.date), Some(day.count as f64)))
        .collect();
    templates::chart(GraphKind::Qgraph, "First page keywords", &points, frame)
}

fn changes_table(changes: &[DayChange]) -> Markup {
    html! {
        table.changes {
            thead {
                tr { th { "Compared to" } th { "Up" } th { "Down" } th { "Unchanged" } }
            }
            tbody {
                @for change in changes {
                    tr {
                        td { (format_date(change.date)) }
                        td { (change.counts.up) }
                        td { (change.counts.down) }
                        td { (change.counts.unch) }
                    }
                }
            }
        }
    }
}

fn sparkline(history: &[RankPoint], max_rank: u32) -> Markup {
    let frame = ChartFrame {
        max: Some(max_rank),
        ..SPARKLINE
    };
    templates::series(GraphKind::Qgraph, &rank_points(history), frame)
}

fn trend_chart(form: &KeywordTrendForm, ranks: &[RankPoint], frame: ChartFrame) -> Markup {
    let title = format!("{} rank", form.keyword);
    templates::chart(GraphKind::Qgraph, &title, &rank_points(ranks), frame)
}

fn rank_points(ranks: &[RankPoint]) -> Vec<ChartPoint> {
    ranks
        .iter()
        .map(|point| ChartPoint::new(format_date(point.date), Some(f64::from(point.rank))))
        .collect()
}

fn top_ten_table(entries: &[TopTenEntry]) -> Markup {
    html! {
        h3 { "Top ten" }
        @if entries.is_empty() {
            p { "No top ten results were recorded." }
        } @else {
            ol.top-ten {
                @for entry in entries {
                    li value=(entry.rank) { a href=(entry.url) { (entry.url) } }
                }
            }
        }
    }
}
