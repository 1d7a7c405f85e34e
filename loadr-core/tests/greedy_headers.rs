use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use loadr_core::config::{RunMode, RunnerConfig};
use loadr_core::headers::{HeaderChain, HeaderFactory};
use loadr_core::route::{EndpointSelector, ServiceRef};
use loadr_core::runner::{self, CancelFlag};
use loadr_testserver::TestServer;

#[tokio::test]
async fn greedy_run_attaches_the_full_header_chain() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let chain = HeaderChain::new(vec![
        HeaderFactory::RequestType {
            request_types: vec!["light".to_string()],
            probabilities: vec![1.0],
        },
        HeaderFactory::Aggregated {
            base_endpoint: "s0".to_string(),
            endpoints: vec!["s1".to_string()],
            probabilities: vec![1.0],
        },
        HeaderFactory::Static {
            headers: vec![("x-bench-run".to_string(), "greedy".to_string())],
        },
    ]);

    let mut services = BTreeMap::new();
    services.insert("light".to_string(), "s1".to_string());
    services.insert("heavy".to_string(), "s3".to_string());

    let config = RunnerConfig {
        gateway: server.base_url().to_string(),
        mode: RunMode::Greedy { events: 5 },
        pool_size: 4,
        result_file: "result".to_string(),
        output_path: PathBuf::from("."),
        header_chain: chain,
        selector: EndpointSelector::HeaderKeyed {
            header_key: "x-requesttype".to_string(),
        },
        ingress_target: ServiceRef::ByHeader(services),
    };

    let runs = runner::run(&config, Arc::new(CancelFlag::new())).await?;
    let run = &runs[0];

    assert_eq!(run.report.total_requests, 5);
    assert_eq!(run.report.completed_requests, 5);
    assert_eq!(run.report.error_requests, 0);

    // Every request resolved through the routing header to /s1.
    assert_eq!(server.stats().requests_total(), 5);
    assert_eq!(server.stats().saw_request_type(), 5);
    assert_eq!(server.stats().saw_base_endpoint(), 5);
    assert_eq!(server.stats().last_request_type(), Some("light".to_string()));

    // Each persisted line carries the complete header set.
    for line in &run.lines {
        let names: Vec<&str> = line.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&"x-requesttype"), "line missing request type");
        assert!(names.contains(&"x-baseendpoint"), "line missing base endpoint");
        assert!(
            names.contains(&"x-aggregatedendpoints"),
            "line missing aggregated endpoints"
        );
        assert!(names.contains(&"x-bench-run"), "line missing static header");
    }

    server.shutdown().await;
    Ok(())
}
