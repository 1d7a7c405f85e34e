use std::fmt::Write as _;

use loadr_core::runner::{ModeRun, RunReport};

/// Human-readable final summary, one block per run.
pub fn render(run: &ModeRun) -> String {
    let mut out = String::new();

    match &run.label {
        Some(label) => {
            writeln!(&mut out, "summary: workload {label}").ok();
        }
        None => out.push_str("summary\n"),
    }

    let report = &run.report;
    writeln!(
        &mut out,
        "  requests: {} (completed {}, errors {}, timing errors {})",
        report.total_requests,
        report.completed_requests,
        report.error_requests,
        report.timing_error_requests
    )
    .ok();

    writeln!(&mut out, "  avg latency: {}", format_latency(report)).ok();

    if let (Some(p50), Some(p99)) = (report.p50_latency_ms, report.p99_latency_ms) {
        writeln!(
            &mut out,
            "  latency = p50={p50}ms p99={p99}ms max={}ms",
            report.max_latency_ms
        )
        .ok();
    }

    writeln!(
        &mut out,
        "  duration: {}",
        humantime::format_duration(truncate_to_millis(report.run_duration))
    )
    .ok();
    writeln!(&mut out, "  throughput: {:.2} req/s", report.requests_per_sec).ok();

    out
}

fn format_latency(report: &RunReport) -> String {
    if report.completed_requests == 0 {
        "n/a".to_string()
    } else {
        format!("{:.2} ms", report.avg_latency_ms)
    }
}

fn truncate_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report() -> RunReport {
        RunReport {
            total_requests: 10,
            completed_requests: 9,
            error_requests: 1,
            timing_error_requests: 2,
            run_duration: Duration::from_millis(2_500),
            avg_latency_ms: 12.5,
            max_latency_ms: 40,
            p50_latency_ms: Some(11),
            p99_latency_ms: Some(39),
            requests_per_sec: 4.0,
        }
    }

    #[test]
    fn render_includes_counts_and_throughput() {
        let run = ModeRun {
            label: None,
            report: report(),
            lines: Vec::new(),
        };

        let text = render(&run);
        assert!(text.contains("requests: 10 (completed 9, errors 1, timing errors 2)"));
        assert!(text.contains("avg latency: 12.50 ms"));
        assert!(text.contains("throughput: 4.00 req/s"));
    }

    #[test]
    fn render_handles_the_zero_request_run() {
        let run = ModeRun {
            label: Some("empty".to_string()),
            report: RunReport {
                total_requests: 0,
                completed_requests: 0,
                error_requests: 0,
                timing_error_requests: 0,
                run_duration: Duration::ZERO,
                avg_latency_ms: 0.0,
                max_latency_ms: 0,
                p50_latency_ms: None,
                p99_latency_ms: None,
                requests_per_sec: 0.0,
            },
            lines: Vec::new(),
        };

        let text = render(&run);
        assert!(text.contains("summary: workload empty"));
        assert!(text.contains("avg latency: n/a"));
    }
}
