use std::path::{Path, PathBuf};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write result file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read result file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed result line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// One completed request. Appended in completion order; never mutated after
/// insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    /// The deadline the event was scheduled for, relative to run start.
    pub scheduled_offset: Duration,
    /// Unix timestamp (ms) taken when the request was issued.
    pub observed_unix_ms: u64,
    pub latency_ms: u64,
    pub status: u16,
    pub processed_at_completion: i64,
    pub pending_at_completion: i64,
    pub headers: Vec<(String, String)>,
}

impl RequestOutcome {
    #[must_use]
    pub fn to_line(&self) -> ResultLine {
        ResultLine {
            timestamp_ms: self.observed_unix_ms,
            latency_ms: self.latency_ms,
            status: self.status,
            processed: self.processed_at_completion,
            pending: self.pending_at_completion,
            headers: self.headers.clone(),
        }
    }
}

/// The portion of an outcome that is persisted to the result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLine {
    pub timestamp_ms: u64,
    pub latency_ms: u64,
    pub status: u16,
    pub processed: i64,
    pub pending: i64,
    pub headers: Vec<(String, String)>,
}

/// `timestamp \t latency \t status \t processed \t pending` followed by one
/// quoted `"name:value"` token per header.
pub fn format_line(line: &ResultLine) -> String {
    let mut fields = vec![
        line.timestamp_ms.to_string(),
        line.latency_ms.to_string(),
        line.status.to_string(),
        line.processed.to_string(),
        line.pending.to_string(),
    ];
    fields.extend(
        line.headers
            .iter()
            .map(|(name, value)| format!("\"{name}:{value}\"")),
    );
    fields.join("\t")
}

pub fn parse_line(raw: &str, line_no: usize) -> Result<ResultLine> {
    let malformed = |reason: &str| Error::Malformed {
        line: line_no,
        reason: reason.to_string(),
    };

    let mut fields = raw.split('\t').map(str::trim);

    let mut next_number = |name: &str| -> Result<String> {
        fields
            .next()
            .map(str::to_string)
            .ok_or_else(|| malformed(&format!("missing `{name}` field")))
    };

    let timestamp_ms = next_number("timestamp")?
        .parse()
        .map_err(|_| malformed("timestamp is not an integer"))?;
    let latency_ms = next_number("latency")?
        .parse()
        .map_err(|_| malformed("latency is not an integer"))?;
    let status = next_number("status")?
        .parse()
        .map_err(|_| malformed("status is not an integer"))?;
    let processed = next_number("processed")?
        .parse()
        .map_err(|_| malformed("processed is not an integer"))?;
    let pending = next_number("pending")?
        .parse()
        .map_err(|_| malformed("pending is not an integer"))?;

    let mut headers = Vec::new();
    for token in fields {
        let token = token
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .ok_or_else(|| malformed("header token is not quoted"))?;
        let (name, value) = token
            .split_once(':')
            .ok_or_else(|| malformed("header token has no `:` separator"))?;
        headers.push((name.to_string(), value.to_string()));
    }

    Ok(ResultLine {
        timestamp_ms,
        latency_ms,
        status,
        processed,
        pending,
        headers,
    })
}

pub fn write_result_file(path: &Path, lines: &[ResultLine]) -> Result<()> {
    let mut out = String::new();
    for line in lines {
        out.push_str(&format_line(line));
        out.push('\n');
    }

    std::fs::write(path, out).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_result_file(path: &Path) -> Result<Vec<ResultLine>> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_line(line, idx + 1))
        .collect()
}
