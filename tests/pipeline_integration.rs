//! End-to-end pipeline runs against a mock market data server

mod common;

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{chart_body, quote_summary_body, scratch_database, test_config, ticker};
use stock_metrics::api::YahooClient;
use stock_metrics::data_collector::DataCollector;
use stock_metrics::models::Exchange;

async fn mount_chart(server: &MockServer, symbol: &str, closes: &[f64]) {
    Mock::given(method("GET"))
        .and(path(format!("/v8/finance/chart/{}", symbol)))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(closes)))
        .mount(server)
        .await;
}

async fn mount_quote_summary(server: &MockServer, symbol: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v10/finance/quoteSummary/{}", symbol)))
        .respond_with(ResponseTemplate::new(200).set_body_json(quote_summary_body()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_run_completes_despite_one_ticker_exhausting_retries() {
    let server = MockServer::start().await;
    mount_chart(&server, "AAPL", &[10.0, 12.0, 11.0, 13.0, 14.0]).await;
    mount_chart(&server, "MSFT", &[20.0, 21.0, 22.0, 23.0, 24.0]).await;
    mount_quote_summary(&server, "AAPL").await;
    // MSFT has no fundamentals (404); BAD's chart always breaks
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/MSFT"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/BAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_dir, database) = scratch_database().await;
    let config = test_config(&server.uri(), "unused");
    let client = YahooClient::new(&config).unwrap();
    let collector = DataCollector::new(client, database.clone(), config);

    let tickers = vec![
        ticker("AAPL", Exchange::Sp500),
        ticker("BAD", Exchange::Sp500),
        ticker("MSFT", Exchange::Nasdaq),
    ];
    let summary = collector.run(&tickers).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].symbol, "BAD");

    let latest = database.get_latest_metrics(None).await.unwrap();
    let symbols: Vec<&str> = latest.iter().map(|m| m.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "MSFT"]);

    // AAPL had fundamentals: P/E = last close / EPS = 14 / 2
    let aapl = &latest[0].metric;
    assert!((aapl.pe_ratio.unwrap() - 7.0).abs() < 1e-9);
    assert!((aapl.ebitda_ev.unwrap() - 1.2e11 / 1.1e12).abs() < 1e-12);

    // MSFT degraded to momentum-only
    let msft = &latest[1].metric;
    assert_eq!(msft.pe_ratio, None);
    assert_eq!(msft.ebitda_ev, None);
    assert!(msft.ma.is_some());
}

#[tokio::test]
async fn test_running_the_pipeline_twice_does_not_duplicate_rows() {
    let server = MockServer::start().await;
    mount_chart(&server, "AAPL", &[10.0, 12.0, 11.0, 13.0, 14.0]).await;
    mount_quote_summary(&server, "AAPL").await;

    let (_dir, database) = scratch_database().await;
    let config = test_config(&server.uri(), "unused");
    let client = YahooClient::new(&config).unwrap();
    let collector = DataCollector::new(client, database.clone(), config);

    let tickers = vec![ticker("AAPL", Exchange::Sp500)];
    collector.run(&tickers).await.unwrap();
    let first = database.get_stats().await.unwrap();

    collector.run(&tickers).await.unwrap();
    let second = database.get_stats().await.unwrap();

    assert_eq!(first.total_tickers, second.total_tickers);
    assert_eq!(first.total_price_rows, second.total_price_rows);
    assert_eq!(first.total_metric_rows, second.total_metric_rows);
    assert_eq!(second.total_price_rows, 5);
    assert_eq!(second.total_metric_rows, 5);
}
