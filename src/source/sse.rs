// ABOUTME: Pipeline server log client streaming step logs as server-sent events
//
// GET {base}/api/v1/stream/pipelines/{namespace}/logs?name=..&stepName=..&grep=..
// Each event carries `{"result": {"msg": "..."}}`; events without a message are skipped.

use super::{LogSource, LogStream, SourceError};
use crate::config::ServerConfig;
use crate::models::{LogLine, ParameterTuple};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

const USER_AGENT: &str = concat!("pipelog/", env!("CARGO_PKG_VERSION"));
/// Longest event line accepted before the stream is failed
const MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct PipelineLogClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl PipelineLogClient {
    /// Create a client for the configured pipeline server
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid server URL {}", config.base_url))?;

        // No overall request timeout: log streams stay open indefinitely
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    /// Streaming endpoint URL for a tuple
    pub fn logs_url(&self, tuple: &ParameterTuple) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                SourceError::Request(format!("{} cannot be used as a base URL", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["api", "v1", "stream", "pipelines", tuple.namespace(), "logs"]);
        }
        url.query_pairs_mut()
            .append_pair("name", tuple.pipeline_name())
            .append_pair("stepName", tuple.step_name())
            .append_pair("grep", tuple.filter_term())
            .append_pair("podLogOptions.container", tuple.container())
            .append_pair("podLogOptions.tailLines", &tuple.tail_lines().to_string())
            .append_pair("podLogOptions.follow", "true");
        Ok(url)
    }

    fn request(&self, tuple: &ParameterTuple) -> Result<RequestBuilder, SourceError> {
        let url = self.logs_url(tuple)?;
        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }
}

impl LogSource for PipelineLogClient {
    fn open_log_stream(&self, tuple: &ParameterTuple) -> LogStream {
        let request = self.request(tuple);
        let description = tuple.to_string();

        Box::pin(async_stream::stream! {
            let request = match request {
                Ok(request) => request,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            info!(tuple = %description, "Opening pipeline log stream");
            let response = match connect(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(tuple = %description, error = %e, "Pipeline log stream failed to open");
                    yield Err(e);
                    return;
                }
            };

            let mut body = response.bytes_stream();
            let mut decoder = EventDecoder::default();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(SourceError::Stream(e.to_string()));
                        return;
                    }
                };
                for item in decoder.push(&chunk) {
                    let failed = item.is_err();
                    yield item;
                    if failed {
                        return;
                    }
                }
            }
            for item in decoder.finish() {
                let failed = item.is_err();
                yield item;
                if failed {
                    return;
                }
            }
            debug!(tuple = %description, "Pipeline log stream ended");
        })
    }
}

async fn connect(request: RequestBuilder) -> Result<Response, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::Connect(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(SourceError::Status {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    result: Option<StreamEntry>,
    #[serde(default)]
    error: Option<StreamFailure>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamFailure {
    #[serde(default)]
    message: String,
}

/// Incremental server-sent events decoder. Bytes may be split anywhere,
/// including inside a UTF-8 sequence, so lines are assembled before decoding.
#[derive(Debug, Default)]
struct EventDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl EventDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<LogLine, SourceError>> {
        // Everything already pending is known to hold no newline
        let mut from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.pending[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            let line = String::from_utf8_lossy(&self.pending[line_start..end]).into_owned();
            self.feed_line(line.trim_end_matches('\r'), &mut out);
            line_start = end + 1;
            from = line_start;
        }
        self.pending.drain(..line_start);

        if self.pending.len() > MAX_LINE_BYTES {
            warn!(buffered = self.pending.len(), "Event line exceeds the size limit");
            self.pending.clear();
            self.data.clear();
            out.push(Err(SourceError::Stream(format!(
                "event line longer than {MAX_LINE_BYTES} bytes"
            ))));
        }
        out
    }

    /// Flush whatever is buffered when the body ends
    fn finish(&mut self) -> Vec<Result<LogLine, SourceError>> {
        let mut out = Vec::new();
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            self.feed_line(line.trim_end_matches('\r'), &mut out);
        }
        self.dispatch(&mut out);
        out
    }

    fn feed_line(&mut self, line: &str, out: &mut Vec<Result<LogLine, SourceError>>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        // Comment / heartbeat
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
    }

    fn dispatch(&mut self, out: &mut Vec<Result<LogLine, SourceError>>) {
        if self.data.is_empty() {
            return;
        }
        let payload = self.data.join("\n");
        self.data.clear();

        match serde_json::from_str::<StreamEnvelope>(&payload) {
            Ok(StreamEnvelope {
                error: Some(failure),
                ..
            }) => out.push(Err(SourceError::Stream(failure.message))),
            Ok(StreamEnvelope {
                result: Some(StreamEntry { msg: Some(msg) }),
                ..
            }) => out.push(Ok(LogLine::new(msg))),
            Ok(_) => debug!("Skipping log event without a message"),
            Err(e) => warn!(error = %e, "Failed to parse log event: {}", payload),
        }
    }
}
