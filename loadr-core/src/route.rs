use std::collections::BTreeMap;

use serde::Deserialize;

use crate::headers::HeaderSet;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("routing header `{0}` is missing from the built header set")]
    MissingHeader(String),

    #[error("no endpoint mapped for routing value `{0}`")]
    UnmappedValue(String),

    #[error("header-keyed routing needs a service map target, got endpoint `{0}`")]
    ExpectedServiceMap(String),

    #[error("literal routing needs a plain endpoint target, got a service map")]
    ExpectedNamedService,
}

/// Target of one event: a concrete endpoint, or a map from a routing-header
/// value to the endpoint that should serve it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ServiceRef {
    Named(String),
    ByHeader(BTreeMap<String, String>),
}

/// Maps an event target plus the built header set to a route string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSelector {
    Literal,
    HeaderKeyed { header_key: String },
}

impl EndpointSelector {
    pub fn route(&self, target: &ServiceRef, headers: &HeaderSet) -> Result<String> {
        match self {
            Self::Literal => match target {
                ServiceRef::Named(endpoint) => Ok(endpoint.clone()),
                ServiceRef::ByHeader(_) => Err(Error::ExpectedNamedService),
            },
            Self::HeaderKeyed { header_key } => {
                let services = match target {
                    ServiceRef::ByHeader(services) => services,
                    ServiceRef::Named(endpoint) => {
                        return Err(Error::ExpectedServiceMap(endpoint.clone()));
                    }
                };

                let value = headers
                    .get(header_key)
                    .ok_or_else(|| Error::MissingHeader(header_key.clone()))?;

                services
                    .get(value)
                    .cloned()
                    .ok_or_else(|| Error::UnmappedValue(value.to_string()))
            }
        }
    }
}
