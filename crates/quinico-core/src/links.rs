use url::form_urlencoded;

use crate::{
    DateRange, GraphKind, OutputFormat, PagespeedMetric, Strategy, WebpagetestMetric, format_date,
};

/// Builds the dashboard, download and embedding links shown on report pages.
/// Parameter values are form-urlencoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    host: String,
}

impl LinkBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn absolute(&self, path: &str, params: &[(&str, &str)]) -> String {
        format!("http://{}{}", self.host, relative(path, params))
    }

    pub fn keyword_dashboard(&self, domain_id: i64, format: OutputFormat) -> String {
        let id = domain_id.to_string();
        let mut params = vec![("id", id.as_str())];
        push_format(&mut params, format);
        self.absolute("/keyword_rank/dashboard", &params)
    }

    pub fn keyword_trends(
        &self,
        target: &KeywordTarget<'_>,
        range: Option<DateRange>,
        format: OutputFormat,
    ) -> String {
        let (from, to) = range_strings(range);
        let mut params = vec![
            ("domain", target.domain),
            ("keyword", target.keyword),
            ("gl", target.gl),
            ("googlehost", target.googlehost),
        ];
        push_range(&mut params, &from, &to);
        push_format(&mut params, format);
        self.absolute("/keyword_rank/trends", &params)
    }

    pub fn pagespeed_trends(
        &self,
        target: &PagespeedTarget<'_>,
        metric: PagespeedMetric,
        range: Option<DateRange>,
        format: OutputFormat,
    ) -> String {
        let (from, to) = range_strings(range);
        let mut params = vec![
            ("domain", target.domain),
            ("url", target.url),
            ("metric", metric.as_str()),
            ("strategy", target.strategy.as_str()),
        ];
        push_range(&mut params, &from, &to);
        push_format(&mut params, format);
        self.absolute("/pagespeed/trends", &params)
    }

    pub fn pagespeed_breakdown(
        &self,
        target: &PagespeedTarget<'_>,
        date: Option<chrono::NaiveDate>,
        format: OutputFormat,
    ) -> String {
        self.absolute(
            "/pagespeed/breakdown",
            &breakdown_params(target, date.map(format_date).as_deref(), format),
        )
    }

    pub fn pagespeed_history(
        &self,
        target: &PagespeedTarget<'_>,
        range: Option<DateRange>,
        format: OutputFormat,
    ) -> String {
        let (from, to) = range_strings(range);
        let mut params = vec![
            ("domain", target.domain),
            ("url", target.url),
            ("strategy", target.strategy.as_str()),
        ];
        push_range(&mut params, &from, &to);
        push_format(&mut params, format);
        self.absolute("/pagespeed/history", &params)
    }

    pub fn webpagetest_trends(
        &self,
        test_id: i64,
        metric: WebpagetestMetric,
        range: Option<DateRange>,
        format: OutputFormat,
    ) -> String {
        let (from, to) = range_strings(range);
        let test_id = test_id.to_string();
        let mut params = vec![("test_id", test_id.as_str()), ("metric", metric.as_str())];
        push_range(&mut params, &from, &to);
        push_format(&mut params, format);
        self.absolute("/webpagetest/trends", &params)
    }

    pub fn webpagetest_history(
        &self,
        test_id: i64,
        range: Option<DateRange>,
        format: OutputFormat,
    ) -> String {
        let (from, to) = range_strings(range);
        let test_id = test_id.to_string();
        let mut params = vec![("test_id", test_id.as_str())];
        push_range(&mut params, &from, &to);
        push_format(&mut params, format);
        self.absolute("/webpagetest/history", &params)
    }

    pub fn seomoz_trends(&self, url: &str, metric: &str) -> String {
        self.absolute(
            "/seomoz/trends",
            &[("url", url), ("metric", metric), ("format", "db")],
        )
    }

    pub fn webmaster_total(&self, domain: &str) -> String {
        self.absolute("/webmaster/total", &[("domain", domain), ("format", "db")])
    }

    pub fn webmaster_messages(&self) -> String {
        self.absolute("/webmaster/messages", &[("format", "db")])
    }
}

/// Host-relative link, used for in-page navigation.
pub fn relative(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_owned();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{path}?{query}")
}

pub fn pagespeed_breakdown_relative(
    target: &PagespeedTarget<'_>,
    date: chrono::NaiveDate,
) -> String {
    let date = format_date(date);
    relative(
        "/pagespeed/breakdown",
        &breakdown_params(target, Some(&date), OutputFormat::Page),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordTarget<'a> {
    pub domain: &'a str,
    pub keyword: &'a str,
    pub gl: &'a str,
    pub googlehost: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagespeedTarget<'a> {
    pub domain: &'a str,
    pub url: &'a str,
    pub strategy: Strategy,
}

/// A graph the composite dashboard can embed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GraphLink {
    pub url: String,
    pub kind: GraphKind,
}

fn breakdown_params<'a>(
    target: &PagespeedTarget<'a>,
    date: Option<&'a str>,
    format: OutputFormat,
) -> Vec<(&'a str, &'a str)> {
    let mut params = vec![
        ("domain", target.domain),
        ("url", target.url),
        ("strategy", target.strategy.as_str()),
    ];
    if let Some(date) = date {
        params.push(("date", date));
    }
    push_format(&mut params, format);
    params
}

fn range_strings(range: Option<DateRange>) -> (Option<String>, Option<String>) {
    match range {
        Some(range) => (Some(format_date(range.from)), Some(format_date(range.to))),
        None => (None, None),
    }
}

fn push_range<'a>(
    params: &mut Vec<(&'a str, &'a str)>,
    from: &'a Option<String>,
    to: &'a Option<String>,
) {
    if let (Some(from), Some(to)) = (from, to) {
        params.push(("date_from", from.as_str()));
        params.push(("date_to", to.as_str()));
    }
}

fn push_format(params: &mut Vec<(&str, &str)>, format: OutputFormat) {
    if !format.is_page() {
        params.push(("format", format.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn keyword_dashboard_links_carry_id_and_format() {
        let links = LinkBuilder::new("reports.example.com:8080");
        assert_eq!(
            links.keyword_dashboard(7, OutputFormat::Db1),
            "http://reports.example.com:8080/keyword_rank/dashboard?id=7&format=db1"
        );
        assert_eq!(
            links.keyword_dashboard(7, OutputFormat::Page),
            "http://reports.example.com:8080/keyword_rank/dashboard?id=7"
        );
    }

    #[test]
    fn keyword_trend_links_percent_encode_the_keyword() {
        let links = LinkBuilder::new("localhost");
        let target = KeywordTarget {
            domain: "www.example.com",
            keyword: "baby names & more",
            gl: "us",
            googlehost: "google.com",
        };
        let range = DateRange {
            from: date("2026-01-01"),
            to: date("2026-01-31"),
        };

        assert_eq!(
            links.keyword_trends(&target, Some(range), OutputFormat::Csv),
            "http://localhost/keyword_rank/trends?domain=www.example.com&keyword=baby+names+%26+more\
             &gl=us&googlehost=google.com&date_from=2026-01-01&date_to=2026-01-31&format=csv"
        );
    }

    #[test]
    fn pagespeed_links_encode_url_and_strategy() {
        let links = LinkBuilder::new("localhost");
        let target = PagespeedTarget {
            domain: "www.example.com",
            url: "/shop?page=2",
            strategy: Strategy::Mobile,
        };

        assert_eq!(
            links.pagespeed_trends(&target, PagespeedMetric::Score, None, OutputFormat::Db),
            "http://localhost/pagespeed/trends?domain=www.example.com&url=%2Fshop%3Fpage%3D2\
             &metric=score&strategy=mobile&format=db"
        );
        assert_eq!(
            pagespeed_breakdown_relative(&target, date("2026-02-03")),
            "/pagespeed/breakdown?domain=www.example.com&url=%2Fshop%3Fpage%3D2\
             &strategy=mobile&date=2026-02-03"
        );
    }

    #[test]
    fn relative_without_params_is_the_bare_path() {
        assert_eq!(relative("/dashboard", &[]), "/dashboard");
    }
}
