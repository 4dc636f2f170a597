//! Query-string forms for every view.
//!
//! Each form collects all field errors before giving up, so the index page
//! can show every problem at once. Errors are values, never `Err` paths of
//! the handlers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use quinico_core::{OutputFormat, PagespeedMetric, Strategy, WebpagetestMetric};

use crate::context::QueryMap;

const REQUIRED: &str = "This field is required.";
const NOT_A_NUMBER: &str = "Enter a whole number.";
const NOT_A_DATE: &str = "Enter a valid date.";
const SIZE_PAIR: &str = "You must define a width and height";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors(BTreeMap<&'static str, Vec<String>>);

impl FormErrors {
    /// Errors for a format that reached a view its form does not allow.
    pub fn unsupported_format(format: OutputFormat) -> Self {
        let mut errors = Self::default();
        errors.add("format", format!("Improperly formatted format:{format}"));
        errors
    }

    fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        self.0
            .iter()
            .map(|(field, messages)| (*field, messages.as_slice()))
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

/// Optional chart sizing. Zero counts as not given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChartSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub step: Option<u32>,
}

struct Fields<'a> {
    query: &'a QueryMap,
    errors: FormErrors,
}

impl<'a> Fields<'a> {
    fn new(query: &'a QueryMap) -> Self {
        Self {
            query,
            errors: FormErrors::default(),
        }
    }

    fn raw(&self, name: &str) -> Option<&'a str> {
        self.query
            .get(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn required_str(&mut self, name: &'static str) -> Option<String> {
        match self.raw(name) {
            Some(value) => Some(value.to_owned()),
            None => {
                self.errors.add(name, REQUIRED);
                None
            }
        }
    }

    fn optional_u32(&mut self, name: &'static str) -> Option<u32> {
        let value = self.raw(name)?;
        match value.parse::<u32>() {
            Ok(number) => Some(number),
            Err(_) => {
                self.errors.add(name, NOT_A_NUMBER);
                None
            }
        }
    }

    fn required_id(&mut self, name: &'static str, min: Option<i64>) -> Option<i64> {
        let Some(value) = self.raw(name) else {
            self.errors.add(name, REQUIRED);
            return None;
        };
        let Ok(number) = value.parse::<i64>() else {
            self.errors.add(name, NOT_A_NUMBER);
            return None;
        };
        match min {
            Some(min) if number < min => {
                self.errors.add(
                    name,
                    format!("Ensure this value is greater than or equal to {min}."),
                );
                None
            }
            _ => Some(number),
        }
    }

    fn optional_date(&mut self, name: &'static str) -> Option<NaiveDate> {
        let value = self.raw(name)?;
        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.errors.add(name, NOT_A_DATE);
                None
            }
        }
    }

    /// Required value parsed by its own `FromStr`, whose error text is shown
    /// as-is.
    fn required_parsed<T>(&mut self, name: &'static str) -> Option<T>
    where
        T: FromStr<Err = String>,
    {
        let Some(value) = self.raw(name) else {
            self.errors.add(name, REQUIRED);
            return None;
        };
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(message) => {
                self.errors.add(name, message);
                None
            }
        }
    }

    fn strategy(&mut self) -> Option<Strategy> {
        match self.raw("strategy").unwrap_or_default().parse() {
            Ok(strategy) => Some(strategy),
            Err(message) => {
                self.errors.add("strategy", message);
                None
            }
        }
    }

    fn format(&mut self, allowed: &[OutputFormat]) -> OutputFormat {
        let raw = self.query.get("format").unwrap_or_default();
        match raw.parse::<OutputFormat>() {
            Ok(format) if allowed.contains(&format) => format,
            Ok(_) => {
                self.errors
                    .add("format", format!("Improperly formatted format:{raw}"));
                OutputFormat::Page
            }
            Err(message) => {
                self.errors.add("format", message);
                OutputFormat::Page
            }
        }
    }

    fn checkbox(&self, name: &str) -> bool {
        !matches!(
            self.raw(name).map(str::to_ascii_lowercase).as_deref(),
            None | Some("false" | "0")
        )
    }

    fn chart_size(&mut self, with_step: bool) -> ChartSize {
        let width = self.optional_u32("width").filter(|value| *value > 0);
        let height = self.optional_u32("height").filter(|value| *value > 0);
        let step = if with_step {
            self.optional_u32("step").filter(|value| *value > 0)
        } else {
            None
        };

        match (width, height) {
            (Some(_), None) => self.errors.add("height", SIZE_PAIR),
            (None, Some(_)) => self.errors.add("width", SIZE_PAIR),
            _ => {}
        }

        ChartSize {
            width,
            height,
            step,
        }
    }

    fn finish<T>(self, build: impl FnOnce() -> Option<T>) -> Result<T, FormErrors> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        build().ok_or(self.errors)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordDashboardForm {
    pub id: i64,
    pub format: OutputFormat,
    pub size: ChartSize,
}

impl KeywordDashboardForm {
    pub const FORMATS: &'static [OutputFormat] = &[
        OutputFormat::Page,
        OutputFormat::Db,
        OutputFormat::Db1,
        OutputFormat::Db2,
        OutputFormat::Json1,
        OutputFormat::Json2,
        OutputFormat::Csv,
    ];

    pub fn parse(query: &QueryMap) -> Result<Self, FormErrors> {
        let mut fields = Fields::new(query);
        let id = fields.required_id("id", None);
        let format = fields.format(Self::FORMATS);
        let size = fields.chart_size(true);
        fields.finish(|| {
            Some(Self {
                id: id?,
                format,
                size,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTrendForm {
    pub domain: String,
    pub keyword: String,
    pub gl: String,
    pub googlehost: String,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub format: OutputFormat,
    pub size: ChartSize,
}

impl KeywordTrendForm {
    pub const FORMATS: &'static [OutputFormat] = &[
        OutputFormat::Page,
        OutputFormat::Db,
        OutputFormat::Json,
        OutputFormat::Csv,
    ];

    pub fn parse(query: &QueryMap) -> Result<Self, FormErrors> {
        let mut fields = Fields::new(query);
        let domain = fields.required_str("domain");
        let keyword = fields.required_str("keyword");
        let gl = fields.required_str("gl");
        let googlehost = fields.required_str("googlehost");
        let date_from = fields.optional_date("date_from");
        let date_to = fields.optional_date("date_to");
        let format = fields.format(Self::FORMATS);
        let size = fields.chart_size(true);
        fields.finish(|| {
            Some(Self {
                domain: domain?,
                keyword: keyword?,
                gl: gl?,
                googlehost: googlehost?,
                date_from,
                date_to,
                format,
                size,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagespeedTrendForm {
    pub domain: String,
    pub url: String,
    pub metric: PagespeedMetric,
    pub strategy: Strategy,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub format: OutputFormat,
    pub size: ChartSize,
}

impl PagespeedTrendForm {
    pub const FORMATS: &'static [OutputFormat] = &[
        OutputFormat::Page,
        OutputFormat::Db,
        OutputFormat::Json,
        OutputFormat::Csv,
    ];

    pub fn parse(query: &QueryMap) -> Result<Self, FormErrors> {
        let mut fields = Fields::new(query);
        let domain = fields.required_str("domain");
        let url = fields.required_str("url");
        let metric = fields.required_parsed("metric");
        let strategy = fields.strategy();
        let date_from = fields.optional_date("date_from");
        let date_to = fields.optional_date("date_to");
        let format = fields.format(Self::FORMATS);
        let size = fields.chart_size(true);
        fields.finish(|| {
            Some(Self {
                domain: domain?,
                url: url?,
                metric: metric?,
                strategy: strategy?,
                date_from,
                date_to,
                format,
                size,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagespeedBreakdownForm {
    pub domain: String,
    pub url: String,
    pub strategy: Strategy,
    pub date: Option<NaiveDate>,
    pub format: OutputFormat,
    pub size: ChartSize,
}

impl PagespeedBreakdownForm {
    pub const FORMATS: &'static [OutputFormat] =
        &[OutputFormat::Page, OutputFormat::Db, OutputFormat::Json];

    pub fn parse(query: &QueryMap) -> Result<Self, FormErrors> {
        let mut fields = Fields::new(query);
        let domain = fields.required_str("domain");
        let url = fields.required_str("url");
        let strategy = fields.strategy();
        let date = fields.optional_date("date");
        let format = fields.format(Self::FORMATS);
        let size = fields.chart_size(false);
        fields.finish(|| {
            Some(Self {
                domain: domain?,
                url: url?,
                strategy: strategy?,
                date,
                format,
                size,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagespeedHistoryForm {
    pub domain: String,
    pub url: String,
    pub strategy: Strategy,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub format: OutputFormat,
}

impl PagespeedHistoryForm {
    pub const FORMATS: &'static [OutputFormat] = &[OutputFormat::Page, OutputFormat::Csv];

    pub fn parse(query: &QueryMap) -> Result<Self, FormErrors> {
        let mut fields = Fields::new(query);
        let domain = fields.required_str("domain");
        let url = fields.required_str("url");
        let strategy = fields.strategy();
        let date_from = fields.optional_date("date_from");
        let date_to = fields.optional_date("date_to");
        let format = fields.format(Self::FORMATS);
        fields.finish(|| {
            Some(Self {
                domain: domain?,
                url: url?,
                strategy: strategy?,
                date_from,
                date_to,
                format,
            })
        })
    }
}

/// Addresses one stored run by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportForm {
    pub id: i64,
}

impl ReportForm {
    pub fn parse(query: &QueryMap) -> Result<Self, FormErrors> {
        let mut fields = Fields::new(query);
        let id = fields.required_id("id", Some(1));
        fields.finish(|| Some(Self { id: id? }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebpagetestTrendForm {
    pub test_id: i64,
    pub metric: WebpagetestMetric,
    pub include_failed: bool,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub format: OutputFormat,
    pub size: ChartSize,
}

impl WebpagetestTrendForm {
    pub const FORMATS: &'static [OutputFormat] = &[
        OutputFormat::Page,
        OutputFormat::Db,
        OutputFormat::Json,
        OutputFormat::Csv,
        OutputFormat::Graph,
    ];

    pub fn parse(query: &QueryMap) -> Result<Self, FormErrors> {
        let mut fields = Fields::new(query);
        let test_id = fields.required_id("test_id", None);
        let metric = fields.required_parsed("metric");
        let include_failed = fields.checkbox("include_failed");
        let date_from = fields.optional_date("date_from");
        let date_to = fields.optional_date("date_to");
        let format = fields.format(Self::FORMATS);
        let size = fields.chart_size(false);
        fields.finish(|| {
            Some(Self {
                test_id: test_id?,
                metric: metric?,
                include_failed,
                date_from,
                date_to,
                format,
                size,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebpagetestHistoryForm {
    pub test_id: i64,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub format: OutputFormat,
}

impl WebpagetestHistoryForm {
    pub const FORMATS: &'static [OutputFormat] = &[OutputFormat::Page, OutputFormat::Csv];

    pub fn parse(query: &QueryMap) -> Result<Self, FormErrors> {
        let mut fields = Fields::new(query);
        let test_id = fields.required_id("test_id", None);
        let date_from = fields.optional_date("date_from");
        let date_to = fields.optional_date("date_to");
        let format = fields.format(Self::FORMATS);
        fields.finish(|| {
            Some(Self {
                test_id: test_id?,
                date_from,
                date_to,
                format,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: &str) -> QueryMap {
        QueryMap::parse(raw)
    }

    #[test]
    fn keyword_dashboard_accepts_only_its_formats() {
        let form = KeywordDashboardForm::parse(&query("id=4&format=json2")).expect("valid form");
        assert_eq!(form.id, 4);
        assert_eq!(form.format, OutputFormat::Json2);

        let errors = KeywordDashboardForm::parse(&query("id=4&format=json")).expect_err("json");
        assert_eq!(errors.field("format"), ["Improperly formatted format:json"]);

        let errors = KeywordDashboardForm::parse(&query("id=4&format=xml")).expect_err("xml");
        assert_eq!(errors.field("format"), ["Improperly formatted format:xml"]);
    }

    #[test]
    fn every_error_is_reported_at_once() {
        let errors = KeywordDashboardForm::parse(&query("id=abc&format=pdf&width=300"))
            .expect_err("invalid form");
        assert_eq!(errors.field("id"), [NOT_A_NUMBER]);
        assert_eq!(errors.field("format").len(), 1);
        assert_eq!(errors.field("height"), [SIZE_PAIR]);
        assert!(errors.to_string().contains("height: You must define a width and height"));
    }

    #[test]
    fn width_and_height_travel_together_and_zero_is_absent() {
        let errors = KeywordTrendForm::parse(&query(
            "domain=d&keyword=k&gl=us&googlehost=google.com&height=200",
        ))
        .expect_err("height only");
        assert_eq!(errors.field("width"), [SIZE_PAIR]);

        let form = KeywordTrendForm::parse(&query(
            "domain=d&keyword=k&gl=us&googlehost=google.com&width=0&height=0&step=5",
        ))
        .expect("zero sizes");
        assert_eq!(
            form.size,
            ChartSize {
                width: None,
                height: None,
                step: Some(5)
            }
        );
    }

    #[test]
    fn dates_must_be_iso_formatted() {
        let errors = KeywordTrendForm::parse(&query(
            "domain=d&keyword=k&gl=us&googlehost=g&date_from=06/01/2026",
        ))
        .expect_err("bad date");
        assert_eq!(errors.field("date_from"), [NOT_A_DATE]);

        let form = KeywordTrendForm::parse(&query(
            "domain=d&keyword=k&gl=us&googlehost=g&date_from=2026-06-01",
        ))
        .expect("one date");
        assert!(form.date_from.is_some());
        assert_eq!(form.date_to, None);
    }

    #[test]
    fn strategy_and_metric_report_their_own_messages() {
        let errors =
            PagespeedTrendForm::parse(&query("domain=d&url=u&metric=speed")).expect_err("invalid");
        assert_eq!(errors.field("strategy"), ["No strategy selected"]);
        assert_eq!(errors.field("metric"), ["Improperly formatted metric:speed"]);

        let errors = PagespeedBreakdownForm::parse(&query("domain=d&url=u&strategy=tablet"))
            .expect_err("bad strategy");
        assert_eq!(errors.field("strategy"), ["Improperly formatted strategy:tablet"]);

        let form = PagespeedTrendForm::parse(&query(
            "domain=d&url=%2Fshop&metric=numberHosts&strategy=mobile&format=csv",
        ))
        .expect("valid");
        assert_eq!(form.url, "/shop");
        assert_eq!(form.metric, PagespeedMetric::NumberHosts);
        assert_eq!(form.strategy, Strategy::Mobile);
    }

    #[test]
    fn report_ids_start_at_one() {
        assert_eq!(ReportForm::parse(&query("id=7")), Ok(ReportForm { id: 7 }));
        let errors = ReportForm::parse(&query("id=0")).expect_err("zero id");
        assert_eq!(
            errors.field("id"),
            ["Ensure this value is greater than or equal to 1."]
        );
        assert_eq!(
            ReportForm::parse(&query("")).expect_err("missing").field("id"),
            [REQUIRED]
        );
    }

    #[test]
    fn include_failed_is_a_checkbox() {
        let base = "test_id=1&metric=loadTime";
        let unchecked = WebpagetestTrendForm::parse(&query(base)).expect("unchecked");
        assert!(!unchecked.include_failed);

        let checked = WebpagetestTrendForm::parse(&query(&format!("{base}&include_failed=on")))
            .expect("checked");
        assert!(checked.include_failed);

        let off = WebpagetestTrendForm::parse(&query(&format!("{base}&include_failed=false")))
            .expect("false");
        assert!(!off.include_failed);

        let zero = WebpagetestTrendForm::parse(&query(&format!("{base}&include_failed=0")))
            .expect("zero");
        assert!(!zero.include_failed);

        let blank = WebpagetestTrendForm::parse(&query(&format!("{base}&include_failed=")))
            .expect("blank");
        assert!(!blank.include_failed);

        // Any other value counts as checked, "off" included.
        let off_text = WebpagetestTrendForm::parse(&query(&format!("{base}&include_failed=off")))
            .expect("off");
        assert!(off_text.include_failed);

        let graph = WebpagetestTrendForm::parse(&query(&format!("{base}&format=graph")))
            .expect("graph");
        assert_eq!(graph.format, OutputFormat::Graph);
    }

    #[test]
    fn history_forms_allow_only_page_and_csv() {
        let errors = PagespeedHistoryForm::parse(&query(
            "domain=d&url=u&strategy=desktop&format=json",
        ))
        .expect_err("json");
        assert_eq!(errors.field("format"), ["Improperly formatted format:json"]);

        let form =
            WebpagetestHistoryForm::parse(&query("test_id=2&format=csv")).expect("csv history");
        assert_eq!(form.format, OutputFormat::Csv);
    }
}
