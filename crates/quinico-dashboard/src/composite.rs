use axum::extract::State;
use maud::html;
use quinico_config::SeomozAccountType;
use quinico_core::{
    GraphKind, GraphLink, KeywordTarget, LinkBuilder, OutputFormat, PagespeedMetric,
    PagespeedTarget, SEOMOZ_FREE_METRICS, SEOMOZ_PAID_METRICS, Strategy, WebpagetestMetric,
};
use quinico_store::{SqliteStore, StoreError};

use crate::context::RequestContext;
use crate::error::DashboardError;
use crate::templates;
use crate::{AppState, View, link_builder, run_view};

pub(crate) async fn dashboard(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, dashboard_view).await
}

pub(crate) async fn graphs(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<View, DashboardError> {
    run_view(state, ctx, graphs_view).await
}

/// Every graph the composite dashboard offers by default, in display order.
pub fn default_graphs(
    store: &SqliteStore,
    links: &LinkBuilder,
    seomoz_account: SeomozAccountType,
) -> Result<Vec<GraphLink>, StoreError> {
    let mut graphs = Vec::new();
    let mut push = |url: String, kind: GraphKind| graphs.push(GraphLink { url, kind });

    for test in store.keyword_tests()? {
        let target = KeywordTarget {
            domain: &test.domain.domain,
            keyword: &test.keyword,
            gl: &test.domain.gl,
            googlehost: &test.domain.googlehost,
        };
        push(
            links.keyword_trends(&target, None, OutputFormat::Db),
            GraphKind::Qgraph,
        );
    }

    for domain in store.keyword_domains()? {
        for format in [OutputFormat::Db, OutputFormat::Db1] {
            push(links.keyword_dashboard(domain.id, format), GraphKind::Qgraph);
        }
    }

    let pagespeed_tests = store.pagespeed_tests()?;
    for test in &pagespeed_tests {
        for strategy in Strategy::ALL {
            let target = PagespeedTarget {
                domain: &test.domain,
                url: &test.url,
                strategy,
            };
            for metric in PagespeedMetric::ALL {
                push(
                    links.pagespeed_trends(&target, metric, None, OutputFormat::Db),
                    GraphKind::Qgraph,
                );
            }
        }
    }
    for test in &pagespeed_tests {
        for strategy in Strategy::ALL {
            let target = PagespeedTarget {
                domain: &test.domain,
                url: &test.url,
                strategy,
            };
            push(
                links.pagespeed_breakdown(&target, None, OutputFormat::Db),
                GraphKind::Qpie,
            );
        }
    }

    for test in store.webpagetest_tests()? {
        for metric in WebpagetestMetric::ALL {
            push(
                links.webpagetest_trends(test.id, metric, None, OutputFormat::Db),
                GraphKind::Qgraph,
            );
        }
    }

    let seomoz_metrics: &[&str] = match seomoz_account {
        SeomozAccountType::Free => SEOMOZ_FREE_METRICS,
        SeomozAccountType::Paid => SEOMOZ_PAID_METRICS,
        SeomozAccountType::Unset => &[],
    };
    for url in store.seomoz_urls()? {
        for metric in seomoz_metrics {
            push(links.seomoz_trends(&url, metric), GraphKind::Qgraph);
        }
    }

    for domain in store.webmaster_domains()? {
        push(links.webmaster_total(&domain), GraphKind::Qgraph);
    }
    push(links.webmaster_messages(), GraphKind::Qgraph);

    Ok(graphs)
}

fn dashboard_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    let store = state.open_store()?;
    let graphs = default_graphs(
        &store,
        &link_builder(ctx),
        state.config().seomoz.account_type,
    )?;
    let settings = state.dash_settings(&store, ctx.user.as_deref())?;
    tracing::debug!(
        graphs = graphs.len(),
        user = ctx.user.as_deref().unwrap_or("-"),
        "assembled composite dashboard"
    );

    let body = html! {
        div.graphs {
            @for graph in &graphs {
                iframe class=(graph.kind.as_str())
                    src=(graph.url)
                    width=(settings.width)
                    height=(settings.height)
                    loading="lazy" {}
            }
        }
    };
    Ok(View::Page(templates::layout("Dashboard", body)))
}

fn graphs_view(state: &AppState, ctx: &RequestContext) -> Result<View, DashboardError> {
    let store = state.open_store()?;
    let graphs = default_graphs(
        &store,
        &link_builder(ctx),
        state.config().seomoz.account_type,
    )?;
    View::json(&graphs)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn seeded() -> (TempDir, SqliteStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path().join("quinico.sqlite")).expect("open store");
        let domain_id = store
            .upsert_keyword_domain("www.example.com", "us", "www.google.com")
            .expect("domain");
        store.add_keyword_test(domain_id, "red shoes").expect("test");
        store
            .upsert_pagespeed_test("www.example.com", "https://www.example.com/")
            .expect("pagespeed test");
        store
            .upsert_webpagetest_test("https://www.example.com/", "Dulles:Chrome")
            .expect("webpagetest test");
        store.add_seomoz_url("www.example.com").expect("seomoz");
        store.add_webmaster_domain("www.example.com").expect("webmaster");
        (temp, store)
    }

    #[test]
    fn default_graphs_cover_every_configured_source() {
        let (_temp, store) = seeded();
        let links = LinkBuilder::new("quinico.local");
        let graphs = default_graphs(&store, &links, SeomozAccountType::Free).expect("graphs");

        let expected = 1 // keyword trend
            + 2 // keyword db and db1
            + 2 * PagespeedMetric::ALL.len()
            + 2 // breakdowns
            + WebpagetestMetric::ALL.len()
            + SEOMOZ_FREE_METRICS.len()
            + 1 // webmaster total
            + 1; // webmaster messages
        assert_eq!(graphs.len(), expected);
        assert!(graphs.iter().all(|graph| graph.url.starts_with("http://quinico.local/")));

        let pies: Vec<&GraphLink> = graphs
            .iter()
            .filter(|graph| graph.kind == GraphKind::Qpie)
            .collect();
        assert_eq!(pies.len(), 2);
        assert!(pies.iter().all(|graph| graph.url.contains("/pagespeed/breakdown?")));
        assert_eq!(
            graphs.last().map(|graph| graph.url.as_str()),
            Some("http://quinico.local/webmaster/messages?format=db")
        );
    }

    #[test]
    fn seomoz_metrics_follow_the_account_type() {
        let (_temp, store) = seeded();
        let links = LinkBuilder::new("quinico.local");
        let count = |account| {
            default_graphs(&store, &links, account)
                .expect("graphs")
                .iter()
                .filter(|graph| graph.url.contains("/seomoz/"))
                .count()
        };

        assert_eq!(count(SeomozAccountType::Free), SEOMOZ_FREE_METRICS.len());
        assert_eq!(count(SeomozAccountType::Paid), SEOMOZ_PAID_METRICS.len());
        assert_eq!(count(SeomozAccountType::Unset), 0);
    }
}
