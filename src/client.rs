use std::io;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::adapt::TypeDescriptor;
use crate::bridge::ItemReceiver;
use crate::config::PipelineConfig;
use crate::error::ClientError;
use crate::error::StreamError;
use crate::pipeline::ByteChunkStream;
use crate::server::{CodecAdapter, APPLICATION_JSON};

/// One streaming call: target, method, optional JSON body, and the set
/// of statuses the caller accepts.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: String,
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub expect_status: Vec<StatusCode>,
}

impl StreamRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            expect_status: vec![StatusCode::OK],
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replace the accepted status set.
    pub fn expect_status(mut self, statuses: &[u16]) -> Self {
        self.expect_status = statuses
            .iter()
            .filter_map(|s| StatusCode::from_u16(*s).ok())
            .collect();
        self
    }
}

/// Client-side consumer of streamed responses: issues the call, checks
/// the status contract, and runs the decode pipeline over the response
/// body as bytes arrive.
pub struct StreamingClient {
    http: Client,
    adapter: CodecAdapter,
}

impl StreamingClient {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            http: Client::new(),
            adapter: CodecAdapter::new(config),
        }
    }

    /// Reuse an existing reqwest client (connection pools, proxies).
    pub fn with_http(http: Client, config: PipelineConfig) -> Self {
        Self {
            http,
            adapter: CodecAdapter::new(config),
        }
    }

    /// Push contract: invoke `consumer` once per decoded element, in
    /// order. The consumer returning false cancels the rest of the
    /// response; the transport read loop stops within one chunk.
    #[instrument(target = "json_conduit::client", skip(self, request, consumer), fields(url = %request.url))]
    pub async fn fetch_items<T, F>(
        &self,
        request: StreamRequest,
        consumer: F,
    ) -> Result<(), ClientError>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(T) -> bool,
    {
        let rx = self
            .element_stream(&request, TypeDescriptor::push_queue::<T>())
            .await?;
        rx.for_each(consumer).await.map_err(ClientError::from)
    }

    /// Pull contract: a handle the caller drains at its own pace.
    #[instrument(target = "json_conduit::client", skip(self, request), fields(url = %request.url))]
    pub async fn open_stream<T>(&self, request: StreamRequest) -> Result<ItemReceiver<T>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.element_stream(&request, TypeDescriptor::pull_sequence::<T>())
            .await
    }

    /// Single-document target: the whole response is one value.
    #[instrument(target = "json_conduit::client", skip(self, request), fields(url = %request.url))]
    pub async fn fetch_document<T>(&self, request: StreamRequest) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let response = self.send(&request).await?;
        let content_type = response_content_type(&response);
        let body = self
            .adapter
            .deserialize::<T>(
                &content_type,
                &TypeDescriptor::document::<T>(),
                body_chunks(response),
            )
            .await?;
        Ok(body.into_document()?)
    }

    async fn element_stream<T>(
        &self,
        request: &StreamRequest,
        descriptor: TypeDescriptor,
    ) -> Result<ItemReceiver<T>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let response = self.send(request).await?;
        let content_type = response_content_type(&response);
        let body = self
            .adapter
            .deserialize::<T>(&content_type, &descriptor, body_chunks(response))
            .await?;
        Ok(body.into_stream()?)
    }

    async fn send(&self, request: &StreamRequest) -> Result<Response, ClientError> {
        debug!(target: "json_conduit::client",
               method = %request.method, url = %request.url, "sending request");

        let mut builder = self.http.request(request.method.clone(), &request.url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !request.expect_status.contains(&status) {
            let url = request.url.clone();
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            warn!(target: "json_conduit::client",
                  %status, url = %url, body_len = body.len(), "unexpected status");
            return Err(ClientError::UnexpectedStatus {
                url,
                status,
                headers,
                body,
            });
        }
        debug!(target: "json_conduit::client", %status, "response accepted");
        Ok(response)
    }
}

fn response_content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(APPLICATION_JSON)
        .to_string()
}

fn body_chunks(response: Response) -> ByteChunkStream {
    Box::pin(response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| StreamError::Io(io::Error::new(io::ErrorKind::Other, e)))
    }))
}
