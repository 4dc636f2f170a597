use maud::{DOCTYPE, Markup, html};
use quinico_core::{GraphKind, OutputFormat, format_date};
use quinico_store::DashSettings;
use serde::Serialize;

use crate::forms::{ChartSize, FormErrors};

const PAGE_WIDTH: u32 = 900;
const PAGE_HEIGHT: u32 = 350;
const PAGE_FONT: u32 = 12;

const NAV: &[(&str, &str)] = &[
    ("Dashboard", "/dashboard"),
    ("Keyword Dashboard", "/keyword_rank/dashboard"),
    ("Keyword Trends", "/keyword_rank/trends"),
    ("Pagespeed Trends", "/pagespeed/trends"),
    ("Pagespeed Breakdown", "/pagespeed/breakdown"),
    ("Pagespeed History", "/pagespeed/history"),
    ("Webpagetest Trends", "/webpagetest/trends"),
    ("Webpagetest History", "/webpagetest/history"),
];

/// Pixel box and font a chart is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartFrame {
    pub width: u32,
    pub height: u32,
    pub font: u32,
    pub step: Option<u32>,
    /// Fixed top of the y axis; the renderer scales to the data otherwise.
    pub max: Option<u32>,
}

impl ChartFrame {
    /// Chart on a full report page; explicit sizes still win.
    pub fn page(size: ChartSize) -> Self {
        Self {
            width: size.width.unwrap_or(PAGE_WIDTH),
            height: size.height.unwrap_or(PAGE_HEIGHT),
            font: PAGE_FONT,
            step: size.step,
            max: None,
        }
    }

    /// Chart inside an embeddable fragment, sized by the viewer's settings.
    pub fn embedded(settings: DashSettings, size: ChartSize) -> Self {
        Self {
            width: size.width.unwrap_or(settings.width),
            height: size.height.unwrap_or(settings.height),
            font: settings.font,
            step: size.step,
            max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: Option<f64>,
}

impl ChartPoint {
    pub fn new(label: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

pub fn layout(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "Quinico | " (title) }
                link rel="stylesheet" href="/static/quinico.css";
                script src="/static/quinico.js" defer {}
            }
            body {
                nav {
                    @for (label, href) in NAV {
                        a href=(href) { (label) }
                    }
                }
                main {
                    h1 { (title) }
                    (body)
                }
            }
        }
    }
}

/// Minimal document meant to be loaded inside an iframe.
pub fn fragment(title: &str, frame: ChartFrame, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { (title) }
                link rel="stylesheet" href="/static/quinico.css";
                script src="/static/quinico.js" defer {}
            }
            body.fragment style=(format!("font-size: {}px", frame.font)) {
                (body)
            }
        }
    }
}

pub fn chart(kind: GraphKind, title: &str, points: &[ChartPoint], frame: ChartFrame) -> Markup {
    html! {
        figure.chart {
            figcaption { (title) }
            (series(kind, points, frame))
        }
    }
}

/// Bare chart container without a caption.
pub fn series(kind: GraphKind, points: &[ChartPoint], frame: ChartFrame) -> Markup {
    let series = serde_json::to_string(points).unwrap_or_else(|err| {
        tracing::error!(%err, "failed to encode chart series");
        "[]".to_owned()
    });
    html! {
        div class=(kind.as_str())
            data-series=(series)
            data-width=(frame.width)
            data-height=(frame.height)
            data-font=(frame.font)
            data-step=[frame.step]
            data-max=[frame.max] {}
    }
}

pub fn links(items: &[(&str, String)]) -> Markup {
    html! {
        ul.links {
            @for (label, href) in items {
                li { a href=(href) { (label) } }
            }
        }
    }
}

pub fn table<H, C>(headings: &[H], rows: &[Vec<C>]) -> Markup
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    html! {
        table {
            thead {
                tr {
                    @for heading in headings {
                        th { (heading.as_ref()) }
                    }
                }
            }
            tbody {
                @for row in rows {
                    tr {
                        @for cell in row {
                            td { (cell.as_ref()) }
                        }
                    }
                }
            }
        }
    }
}

pub fn form_errors(errors: &FormErrors) -> Markup {
    html! {
        @if !errors.is_empty() {
            ul.errors {
                @for (field, messages) in errors.iter() {
                    @for message in messages {
                        li { strong { (field) } ": " (message) }
                    }
                }
            }
        }
    }
}

pub fn text_input(name: &str, label: &str) -> Markup {
    html! {
        label {
            (label)
            input type="text" name=(name);
        }
    }
}

pub fn select_input<I, S>(name: &str, label: &str, options: I) -> Markup
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    html! {
        label {
            (label)
            select name=(name) {
                @for option in options {
                    option value=(option.as_ref()) { (option.as_ref()) }
                }
            }
        }
    }
}

pub fn date_input(name: &str, label: &str, value: chrono::NaiveDate) -> Markup {
    html! {
        label {
            (label)
            input type="date" name=(name) value=(format_date(value));
        }
    }
}

pub fn format_select(allowed: &[OutputFormat]) -> Markup {
    html! {
        label {
            "Format"
            select name="format" {
                @for format in allowed {
                    option value=(format.as_str()) {
                        @if format.is_page() { "page" } @else { (format.as_str()) }
                    }
                }
            }
        }
    }
}

pub fn query_form(action: &str, errors: &FormErrors, fields: Markup) -> Markup {
    html! {
        (form_errors(errors))
        form method="get" action=(action) {
            (fields)
            button type="submit" { "Submit" }
        }
    }
}

pub fn no_data(kind: &str) -> Markup {
    layout(
        "No Data",
        html! {
            p.no-data { "No " (kind) " data has been collected yet." }
        },
    )
}

pub fn generic_message(title: &str, message: &str, nav: &[(&str, String)]) -> Markup {
    layout(
        title,
        html! {
            p { (message) }
            (links(nav))
        },
    )
}

pub fn invalid_request(errors: &FormErrors) -> Markup {
    layout(
        "Error",
        html! {
            p { "The request could not be processed." }
            (form_errors(errors))
        },
    )
}

pub fn server_error() -> Markup {
    layout(
        "Error",
        html! {
            p { "An unexpected error occurred while building this report." }
        },
    )
}
