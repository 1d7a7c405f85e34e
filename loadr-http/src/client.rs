use bytes::Bytes;
use http_body_util::{BodyExt as _, Empty};
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use super::util::{has_header, host_header_value};
use super::{Error, GatewayRequest, GatewayResponse, Result};

/// Pooled HTTP/1.1 client for the access gateway. Cheap to clone; connections
/// are reused across requests to the same host.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    inner: Client<HttpConnector, Empty<Bytes>>,
}

impl Default for GatewayClient {
    fn default() -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);

        let inner = Client::builder(TokioExecutor::new()).build(connector);

        Self { inner }
    }
}

impl GatewayClient {
    pub async fn request(&self, req: GatewayRequest) -> Result<GatewayResponse> {
        let timeout = req.timeout;
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" {
            return Err(Error::OnlyHttpSupported(req.url));
        }

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.to_string()))?;

        let mut builder = Request::builder().method(http::Method::GET).uri(uri);

        // The Host header is implicit with hyper; make it explicit so the
        // backend sees the same header set we record in the result log.
        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }

        for (k, v) in req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(&v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Empty<Bytes>> = builder.body(Empty::new())?;

        let res: hyper::Response<Incoming> = if let Some(timeout) = timeout {
            match tokio::time::timeout(timeout, self.inner.request(req)).await {
                Ok(res) => res?,
                Err(_) => return Err(Error::Timeout(timeout)),
            }
        } else {
            self.inner.request(req).await?
        };

        let (parts, body) = res.into_parts();
        let status = parts.status.as_u16();
        let body = body.collect().await?.to_bytes();

        Ok(GatewayResponse { status, body })
    }

    pub async fn get(&self, url: &str) -> Result<GatewayResponse> {
        self.request(GatewayRequest::get(url)).await
    }
}
