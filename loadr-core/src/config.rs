use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::time::Duration;

use serde::Deserialize;

use crate::headers::{HeaderChain, HeaderFactory};
use crate::route::{EndpointSelector, ServiceRef};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("`ms_access_gateway` must be a non-empty base URL")]
    MissingGateway,

    #[error("`thread_pool_size` must be a positive integer")]
    InvalidPoolSize,

    #[error("`workload_events` is required for {0} runs")]
    MissingWorkloadEvents(&'static str),

    #[error("`workload_events` must be a positive integer")]
    InvalidWorkloadEvents,

    #[error("`rate` must be positive")]
    InvalidRate,

    #[error("`workload_rounds` must be a positive integer")]
    InvalidRounds,

    #[error("`max_runner_time_in_minutes` is required for timely_greedy runs")]
    MissingTimeBudget,

    #[error("`max_runner_time_in_minutes` must be a positive integer")]
    InvalidTimeBudget,

    #[error("`workload_files_path_list` is required for file runs")]
    MissingWorkloadFiles,

    #[error("failed to list workload directory {path}: {source}")]
    WorkloadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no workload files found under {0}")]
    EmptyWorkloadDir(PathBuf),

    #[error(
        "unknown header factory type `{0}` (expected `static`, `aggregated`, or `request_type`)"
    )]
    UnknownHeaderFactory(String),

    #[error("invalid `{kind}` header factory parameters: {source}")]
    HeaderFactoryParams {
        kind: &'static str,
        source: serde_json::Error,
    },

    #[error("`endpoints` and `probabilities` must be the same length ({left} vs {right})")]
    MismatchedProbabilities { left: usize, right: usize },
}

/// Raw configuration document, as found on disk.
#[derive(Debug, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "RunnerParameters")]
    pub runner_parameters: RunnerParameters,

    #[serde(rename = "OutputPath", default)]
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct RunnerParameters {
    pub ms_access_gateway: String,

    #[serde(default)]
    pub workload_type: WorkloadType,

    #[serde(default)]
    pub workload_events: Option<u64>,

    /// Events per second for periodic runs.
    #[serde(default)]
    pub rate: Option<f64>,

    pub thread_pool_size: usize,

    #[serde(default)]
    pub workload_rounds: Option<u32>,

    pub result_file: String,

    #[serde(default)]
    pub ingress_service: Option<IngressServiceSpec>,

    #[serde(default)]
    pub max_runner_time_in_minutes: Option<u64>,

    #[serde(default)]
    pub workload_files_path_list: Option<Vec<PathBuf>>,

    #[serde(rename = "HeaderParameters", default)]
    pub header_parameters: Vec<HeaderParameterSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkloadType {
    #[default]
    File,
    Periodic,
    Greedy,
    TimelyGreedy,
}

/// `ingress_service` is either a plain endpoint or a header-keyed service
/// map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IngressServiceSpec {
    Named(String),
    HeaderKeyed {
        header_key: String,
        services: BTreeMap<String, String>,
    },
}

/// One `{type, parameters}` entry of the ordered `HeaderParameters` list.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderParameterSpec {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Config tag of a header link. The original document format used factory
/// class names; both spellings resolve to the same constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
enum HeaderFactoryKind {
    #[strum(serialize = "static", serialize = "StaticHeaderFactory")]
    Static,

    #[strum(serialize = "aggregated", serialize = "AggregatedHeaderFactory")]
    Aggregated,

    #[strum(serialize = "request_type", serialize = "RequestTypeHeaderFactory")]
    RequestType,
}

#[derive(Debug, Deserialize)]
struct AggregatedParams {
    base_endpoint: String,
    endpoints: Vec<String>,
    probabilities: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct RequestTypeParams {
    request_types: Vec<String>,
    probabilities: Vec<f64>,
}

/// Run shape after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    FileReplay { files: Vec<PathBuf>, rounds: u32 },
    Periodic { events: u64, rate: f64 },
    Greedy { events: u64 },
    TimelyGreedy { events: u64, budget: Duration },
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL with any trailing slash removed.
    pub gateway: String,
    pub mode: RunMode,
    pub pool_size: usize,
    pub result_file: String,
    pub output_path: PathBuf,
    pub header_chain: HeaderChain,
    pub selector: EndpointSelector,
    /// Target used for synthesized events (non-file modes).
    pub ingress_target: ServiceRef,
}

pub fn load(path: &Path) -> Result<RunnerConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let doc: ConfigDocument = serde_json::from_str(&raw).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    doc.validate()
}

impl ConfigDocument {
    pub fn validate(self) -> Result<RunnerConfig> {
        let params = self.runner_parameters;

        let gateway = params.ms_access_gateway.trim_end_matches('/').to_string();
        if gateway.is_empty() {
            return Err(Error::MissingGateway);
        }

        if params.thread_pool_size == 0 {
            return Err(Error::InvalidPoolSize);
        }

        let mode = validate_mode(&params)?;
        let header_chain = build_header_chain(&params.header_parameters)?;
        let (selector, ingress_target) = resolve_ingress(params.ingress_service);

        Ok(RunnerConfig {
            gateway,
            mode,
            pool_size: params.thread_pool_size,
            result_file: params.result_file,
            output_path: self.output_path.unwrap_or_else(|| PathBuf::from(".")),
            header_chain,
            selector,
            ingress_target,
        })
    }
}

fn validate_mode(params: &RunnerParameters) -> Result<RunMode> {
    let events_for = |mode: &'static str| -> Result<u64> {
        let events = params
            .workload_events
            .ok_or(Error::MissingWorkloadEvents(mode))?;
        if events == 0 {
            return Err(Error::InvalidWorkloadEvents);
        }
        Ok(events)
    };

    match params.workload_type {
        WorkloadType::File => {
            let listed = params
                .workload_files_path_list
                .as_deref()
                .filter(|files| !files.is_empty())
                .ok_or(Error::MissingWorkloadFiles)?;

            let rounds = params.workload_rounds.unwrap_or(1);
            if rounds == 0 {
                return Err(Error::InvalidRounds);
            }

            Ok(RunMode::FileReplay {
                files: expand_workload_files(listed)?,
                rounds,
            })
        }
        WorkloadType::Periodic => {
            let rate = params.rate.unwrap_or(1.0);
            if rate.is_nan() || rate <= 0.0 {
                return Err(Error::InvalidRate);
            }
            Ok(RunMode::Periodic {
                events: events_for("periodic")?,
                rate,
            })
        }
        WorkloadType::Greedy => Ok(RunMode::Greedy {
            events: events_for("greedy")?,
        }),
        WorkloadType::TimelyGreedy => {
            let minutes = params
                .max_runner_time_in_minutes
                .ok_or(Error::MissingTimeBudget)?;
            if minutes == 0 {
                return Err(Error::InvalidTimeBudget);
            }
            Ok(RunMode::TimelyGreedy {
                events: events_for("timely_greedy")?,
                budget: Duration::from_secs(minutes * 60),
            })
        }
    }
}

/// A single directory entry expands to the files inside it, sorted for a
/// stable replay order.
fn expand_workload_files(listed: &[PathBuf]) -> Result<Vec<PathBuf>> {
    match listed {
        [dir] if dir.is_dir() => {
            let entries = std::fs::read_dir(dir).map_err(|source| Error::WorkloadDir {
                path: dir.clone(),
                source,
            })?;

            let mut files = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|source| Error::WorkloadDir {
                    path: dir.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.is_file() {
                    files.push(path);
                }
            }

            if files.is_empty() {
                return Err(Error::EmptyWorkloadDir(dir.clone()));
            }

            files.sort();
            Ok(files)
        }
        _ => Ok(listed.to_vec()),
    }
}

fn resolve_ingress(spec: Option<IngressServiceSpec>) -> (EndpointSelector, ServiceRef) {
    match spec {
        None => (
            EndpointSelector::Literal,
            ServiceRef::Named("s0".to_string()),
        ),
        Some(IngressServiceSpec::Named(endpoint)) => {
            (EndpointSelector::Literal, ServiceRef::Named(endpoint))
        }
        Some(IngressServiceSpec::HeaderKeyed {
            header_key,
            services,
        }) => (
            EndpointSelector::HeaderKeyed { header_key },
            ServiceRef::ByHeader(services),
        ),
    }
}

/// Resolves each configured `{type, parameters}` entry to its constructor.
/// The first configured entry becomes the innermost chain link.
pub fn build_header_chain(entries: &[HeaderParameterSpec]) -> Result<HeaderChain> {
    let mut links = Vec::with_capacity(entries.len());

    for entry in entries {
        let kind = HeaderFactoryKind::from_str(&entry.kind)
            .map_err(|_| Error::UnknownHeaderFactory(entry.kind.clone()))?;

        let link = match kind {
            HeaderFactoryKind::Static => {
                let headers: BTreeMap<String, String> =
                    serde_json::from_value(entry.parameters.clone()).map_err(|source| {
                        Error::HeaderFactoryParams {
                            kind: "static",
                            source,
                        }
                    })?;
                HeaderFactory::Static {
                    headers: headers.into_iter().collect(),
                }
            }
            HeaderFactoryKind::Aggregated => {
                let params: AggregatedParams = serde_json::from_value(entry.parameters.clone())
                    .map_err(|source| Error::HeaderFactoryParams {
                        kind: "aggregated",
                        source,
                    })?;
                if params.endpoints.len() != params.probabilities.len() {
                    return Err(Error::MismatchedProbabilities {
                        left: params.endpoints.len(),
                        right: params.probabilities.len(),
                    });
                }
                HeaderFactory::Aggregated {
                    base_endpoint: params.base_endpoint,
                    endpoints: params.endpoints,
                    probabilities: params.probabilities,
                }
            }
            HeaderFactoryKind::RequestType => {
                let params: RequestTypeParams = serde_json::from_value(entry.parameters.clone())
                    .map_err(|source| Error::HeaderFactoryParams {
                        kind: "request_type",
                        source,
                    })?;
                if params.request_types.len() != params.probabilities.len() {
                    return Err(Error::MismatchedProbabilities {
                        left: params.request_types.len(),
                        right: params.probabilities.len(),
                    });
                }
                HeaderFactory::RequestType {
                    request_types: params.request_types,
                    probabilities: params.probabilities,
                }
            }
        };

        links.push(link);
    }

    Ok(HeaderChain::new(links))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(doc: &str) -> ConfigDocument {
        match serde_json::from_str(doc) {
            Ok(v) => v,
            Err(err) => panic!("document parse failed: {err}"),
        }
    }

    fn validate(doc: &str) -> Result<RunnerConfig> {
        parse(doc).validate()
    }

    #[test]
    fn minimal_greedy_config_validates() {
        let config = match validate(
            r#"{
                "RunnerParameters": {
                    "ms_access_gateway": "http://gw.local/",
                    "workload_type": "greedy",
                    "workload_events": 100,
                    "thread_pool_size": 4,
                    "result_file": "result"
                }
            }"#,
        ) {
            Ok(c) => c,
            Err(err) => panic!("validate failed: {err}"),
        };

        assert_eq!(config.gateway, "http://gw.local");
        assert_eq!(config.mode, RunMode::Greedy { events: 100 });
        assert_eq!(config.pool_size, 4);
        assert!(config.header_chain.is_empty());
        assert_eq!(config.selector, EndpointSelector::Literal);
        assert_eq!(config.ingress_target, ServiceRef::Named("s0".to_string()));
        assert_eq!(config.output_path, PathBuf::from("."));
    }

    #[test]
    fn timely_greedy_requires_a_time_budget() {
        let err = match validate(
            r#"{
                "RunnerParameters": {
                    "ms_access_gateway": "http://gw.local",
                    "workload_type": "timely_greedy",
                    "workload_events": 10,
                    "thread_pool_size": 2,
                    "result_file": "result"
                }
            }"#,
        ) {
            Ok(_) => panic!("missing budget must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::MissingTimeBudget));
    }

    #[test]
    fn timely_greedy_budget_converts_to_minutes() {
        let config = match validate(
            r#"{
                "RunnerParameters": {
                    "ms_access_gateway": "http://gw.local",
                    "workload_type": "timely_greedy",
                    "workload_events": 10,
                    "max_runner_time_in_minutes": 3,
                    "thread_pool_size": 2,
                    "result_file": "result"
                }
            }"#,
        ) {
            Ok(c) => c,
            Err(err) => panic!("validate failed: {err}"),
        };
        assert_eq!(
            config.mode,
            RunMode::TimelyGreedy {
                events: 10,
                budget: Duration::from_secs(180)
            }
        );
    }

    #[test]
    fn non_file_modes_require_workload_events() {
        let err = match validate(
            r#"{
                "RunnerParameters": {
                    "ms_access_gateway": "http://gw.local",
                    "workload_type": "periodic",
                    "thread_pool_size": 2,
                    "result_file": "result"
                }
            }"#,
        ) {
            Ok(_) => panic!("missing events must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::MissingWorkloadEvents("periodic")));
    }

    #[test]
    fn file_mode_requires_workload_files() {
        let err = match validate(
            r#"{
                "RunnerParameters": {
                    "ms_access_gateway": "http://gw.local",
                    "thread_pool_size": 2,
                    "result_file": "result"
                }
            }"#,
        ) {
            Ok(_) => panic!("missing files must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::MissingWorkloadFiles));
    }

    #[test]
    fn workload_directory_expands_to_sorted_files() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(err) => panic!("tempdir: {err}"),
        };
        for name in ["b.json", "a.json"] {
            if let Err(err) = std::fs::write(dir.path().join(name), "[]") {
                panic!("write: {err}");
            }
        }

        let doc = format!(
            r#"{{
                "RunnerParameters": {{
                    "ms_access_gateway": "http://gw.local",
                    "workload_files_path_list": [{path:?}],
                    "thread_pool_size": 2,
                    "result_file": "result"
                }}
            }}"#,
            path = dir.path()
        );

        let config = match validate(&doc) {
            Ok(c) => c,
            Err(err) => panic!("validate failed: {err}"),
        };
        match config.mode {
            RunMode::FileReplay { files, rounds } => {
                assert_eq!(rounds, 1);
                assert_eq!(files.len(), 2);
                assert!(files[0].ends_with("a.json"));
                assert!(files[1].ends_with("b.json"));
            }
            other => panic!("expected file replay, got {other:?}"),
        }
    }

    #[test]
    fn header_chain_registry_accepts_both_tag_spellings() {
        let specs: Vec<HeaderParameterSpec> = match serde_json::from_str(
            r#"[
                {"type": "request_type",
                 "parameters": {"request_types": ["light", "heavy"], "probabilities": [0.5, 0.5]}},
                {"type": "StaticHeaderFactory",
                 "parameters": {"x-tenant": "bench"}}
            ]"#,
        ) {
            Ok(v) => v,
            Err(err) => panic!("specs parse failed: {err}"),
        };

        let chain = match build_header_chain(&specs) {
            Ok(c) => c,
            Err(err) => panic!("chain build failed: {err}"),
        };
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn unknown_header_factory_is_rejected() {
        let specs = vec![HeaderParameterSpec {
            kind: "QueryStringFactory".to_string(),
            parameters: serde_json::Value::Null,
        }];
        assert!(matches!(
            build_header_chain(&specs),
            Err(Error::UnknownHeaderFactory(_))
        ));
    }

    #[test]
    fn mismatched_probability_vectors_are_rejected() {
        let specs = vec![HeaderParameterSpec {
            kind: "aggregated".to_string(),
            parameters: serde_json::json!({
                "base_endpoint": "s0",
                "endpoints": ["s1", "s2"],
                "probabilities": [0.5]
            }),
        }];
        assert!(matches!(
            build_header_chain(&specs),
            Err(Error::MismatchedProbabilities { left: 2, right: 1 })
        ));
    }

    #[test]
    fn header_keyed_ingress_resolves_selector_and_target() {
        let config = match validate(
            r#"{
                "RunnerParameters": {
                    "ms_access_gateway": "http://gw.local",
                    "workload_type": "greedy",
                    "workload_events": 1,
                    "thread_pool_size": 1,
                    "result_file": "result",
                    "ingress_service": {
                        "header_key": "x-requesttype",
                        "services": {"light": "s1", "heavy": "s3"}
                    }
                }
            }"#,
        ) {
            Ok(c) => c,
            Err(err) => panic!("validate failed: {err}"),
        };

        assert_eq!(
            config.selector,
            EndpointSelector::HeaderKeyed {
                header_key: "x-requesttype".to_string()
            }
        );
        assert!(matches!(config.ingress_target, ServiceRef::ByHeader(_)));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let err = match validate(
            r#"{
                "RunnerParameters": {
                    "ms_access_gateway": "http://gw.local",
                    "workload_type": "greedy",
                    "workload_events": 1,
                    "thread_pool_size": 0,
                    "result_file": "result"
                }
            }"#,
        ) {
            Ok(_) => panic!("zero pool must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::InvalidPoolSize));
    }

    #[test]
    fn negative_rate_is_rejected() {
        let err = match validate(
            r#"{
                "RunnerParameters": {
                    "ms_access_gateway": "http://gw.local",
                    "workload_type": "periodic",
                    "workload_events": 5,
                    "rate": -2.0,
                    "thread_pool_size": 2,
                    "result_file": "result"
                }
            }"#,
        ) {
            Ok(_) => panic!("negative rate must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::InvalidRate));
    }
}
