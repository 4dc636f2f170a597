//! Flattening of stored pagespeed JSON reports into displayable rules.

use serde::Serialize;
use serde_json::Value;

/// One optimisation rule from a pagespeed report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRule {
    pub name: String,
    pub localized_name: String,
    pub score: f64,
    pub impact: f64,
    pub url_blocks: Vec<UrlBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlBlock {
    pub header: String,
    pub urls: Vec<String>,
}

/// Rules under `formattedResults.ruleResults`, ordered by rule name.
/// Missing sections yield no rules rather than an error.
pub fn flatten_report(report: &Value) -> Vec<ReportRule> {
    let Some(rules) = report
        .get("formattedResults")
        .and_then(|results| results.get("ruleResults"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    rules
        .iter()
        .map(|(name, rule)| ReportRule {
            name: name.clone(),
            localized_name: string_field(rule, "localizedRuleName"),
            score: number_field(rule, "ruleScore"),
            impact: number_field(rule, "ruleImpact"),
            url_blocks: rule
                .get("urlBlocks")
                .and_then(Value::as_array)
                .map(|blocks| blocks.iter().map(flatten_block).collect())
                .unwrap_or_default(),
        })
        .collect()
}

fn flatten_block(block: &Value) -> UrlBlock {
    let header = block.get("header").map(interpolate).unwrap_or_default();
    let urls = block
        .get("urls")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(|url| url.get("result"))
                .map(interpolate)
                .collect()
        })
        .unwrap_or_default();
    UrlBlock { header, urls }
}

/// Fills `$1..$n` in `format` with the values of `args`, in order.
fn interpolate(message: &Value) -> String {
    let mut text = string_field(message, "format");
    if let Some(args) = message.get("args").and_then(Value::as_array) {
        for (index, arg) in args.iter().enumerate() {
            let value = match arg.get("value") {
                Some(Value::String(value)) => value.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            text = text.replace(&format!("${}", index + 1), &value);
        }
    }
    text
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn number_field(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rules_are_flattened_with_interpolated_headers_and_urls() {
        let report = json!({
            "formattedResults": {
                "ruleResults": {
                    "MinifyCss": {
                        "localizedRuleName": "Minify CSS",
                        "ruleScore": 96,
                        "ruleImpact": 0.5
                    },
                    "AvoidCssImport": {
                        "localizedRuleName": "Avoid CSS @import",
                        "ruleScore": 100,
                        "ruleImpact": 0.1,
                        "urlBlocks": [{
                            "header": {
                                "format": "The following stylesheets were included in $1 using $2.",
                                "args": [
                                    {"type": "URL", "value": "http://www.foo.bar/"},
                                    {"type": "LITERAL", "value": "@import"}
                                ]
                            },
                            "urls": [
                                {"result": {"format": "$1 imports $2", "args": [
                                    {"value": "a.css"}, {"value": "b.css"}
                                ]}},
                                {"result": {"format": "plain.css"}}
                            ]
                        }]
                    }
                }
            }
        });

        let rules = flatten_report(&report);
        assert_eq!(rules.len(), 2);

        let import = &rules[0];
        assert_eq!(import.name, "AvoidCssImport");
        assert_eq!(import.localized_name, "Avoid CSS @import");
        assert_eq!(import.score, 100.0);
        assert_eq!(
            import.url_blocks,
            vec![UrlBlock {
                header: "The following stylesheets were included in http://www.foo.bar/ using @import."
                    .to_owned(),
                urls: vec!["a.css imports b.css".to_owned(), "plain.css".to_owned()],
            }]
        );

        let minify = &rules[1];
        assert_eq!(minify.name, "MinifyCss");
        assert_eq!(minify.impact, 0.5);
        assert!(minify.url_blocks.is_empty());
    }

    #[test]
    fn reports_without_rule_results_have_no_rules() {
        assert!(flatten_report(&json!({"kind": "pagespeedonline#result"})).is_empty());
    }

    #[test]
    fn non_string_arguments_are_rendered_as_json() {
        let message = json!({"format": "Saves $1 requests", "args": [{"value": 3}]});
        assert_eq!(interpolate(&message), "Saves 3 requests");
    }
}
