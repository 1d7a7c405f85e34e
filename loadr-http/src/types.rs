use std::time::Duration;

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: Bytes,
}

impl GatewayResponse {
    /// Status in the 2xx family.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl GatewayRequest {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn get_owned(url: String) -> Self {
        Self {
            url,
            headers: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}
