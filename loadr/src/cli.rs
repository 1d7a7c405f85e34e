use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "loadr",
    author,
    version,
    about = "Configuration-driven synthetic workload runner",
    long_about = "loadr drives synthetic load against a set of services behind an access gateway and records per-request timing and outcome data.\n\nA JSON configuration document selects the dispatch policy (trace replay, periodic rate, greedy saturation, or time-boxed greedy), the worker pool size, and the header decorator chain attached to every request.",
    after_help = "Examples:\n  loadr --config-file RunnerParameters.json\n  RUST_LOG=debug loadr -c bench/params.json\n\nDocs & examples: https://github.com/nogcio/loadr"
)]
pub struct Cli {
    /// Path to the runner configuration document (JSON)
    #[arg(short = 'c', long = "config-file", value_name = "PATH")]
    pub config_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_the_config_flag() {
        let parsed = Cli::try_parse_from(["loadr", "--config-file", "params.json"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        assert_eq!(cli.config_file, PathBuf::from("params.json"));
    }

    #[test]
    fn cli_accepts_the_short_flag() {
        let parsed = Cli::try_parse_from(["loadr", "-c", "p.json"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        assert_eq!(cli.config_file, PathBuf::from("p.json"));
    }

    #[test]
    fn cli_requires_the_config_flag() {
        assert!(Cli::try_parse_from(["loadr"]).is_err());
    }
}
