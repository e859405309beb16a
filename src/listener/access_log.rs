use std::time::Instant;

use dashmap::DashMap;
use log::{debug, info};
use regex::Regex;

use crate::{
    config::AccessLog,
    core::{
        scope, BridgeError, BridgeResult, ContextId, LifecycleEvent, LifecycleListener,
        RequestDescriptor, ResponseEnvelope,
    },
};

pub const LISTENER_NAME: &str = "access-log";

/// `log` target access lines are written to.
pub const LOG_TARGET: &str = "access";

/// Writes one formatted line per finished request.
pub struct AccessLogListener {
    log_format: LogFormat,
    /// Start times per active context
    started: DashMap<ContextId, Instant>,
}

impl AccessLogListener {
    pub fn new(config: &AccessLog) -> BridgeResult<Self> {
        Ok(Self {
            log_format: LogFormat::parse(&config.format)?,
            started: DashMap::new(),
        })
    }

    /// Render the access line for a finished request.
    ///
    /// `$request_time` is only known while the request's context is current.
    pub fn render(&self, request: &RequestDescriptor, response: &ResponseEnvelope) -> String {
        let elapsed = scope::current()
            .and_then(|context| self.started.get(&context).map(|start| *start))
            .map(|start| start.elapsed().as_millis());
        self.log_format.render(request, response, elapsed)
    }
}

impl LifecycleListener for AccessLogListener {
    fn name(&self) -> &str {
        LISTENER_NAME
    }

    fn handle(&self, event: &LifecycleEvent<'_>) {
        match event {
            LifecycleEvent::Received { request } => match scope::current() {
                Some(context) => {
                    self.started.insert(context, Instant::now());
                }
                None => debug!("Request {} received outside a context", request.id()),
            },
            LifecycleEvent::Terminated { request, response } => {
                info!(target: LOG_TARGET, "{}", self.render(request, response));
                if let Some(context) = scope::current() {
                    self.started.remove(&context);
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Static(String),
    Variable(String),
}

#[derive(Debug)]
struct LogFormat {
    segments: Vec<Segment>,
}

impl LogFormat {
    fn parse(format: &str) -> BridgeResult<Self> {
        let re = Regex::new(r"\$[a-zA-Z0-9_]+")
            .map_err(|e| BridgeError::Configuration(format!("Failed to parse log format: {e}")))?;
        let mut segments = Vec::new();
        let mut last_pos = 0;

        for mat in re.find_iter(format) {
            if last_pos < mat.start() {
                segments.push(Segment::Static(format[last_pos..mat.start()].to_string()));
            }
            // strip the `$`
            segments.push(Segment::Variable(mat.as_str()[1..].to_string()));
            last_pos = mat.end();
        }

        if last_pos < format.len() {
            segments.push(Segment::Static(format[last_pos..].to_string()));
        }

        Ok(LogFormat { segments })
    }

    fn render(
        &self,
        request: &RequestDescriptor,
        response: &ResponseEnvelope,
        elapsed_ms: Option<u128>,
    ) -> String {
        let estimated_len = self.segments.iter().fold(0, |acc, seg| {
            acc + match seg {
                Segment::Static(s) => s.len(),
                Segment::Variable(var) => match var.as_str() {
                    "status" => 3,
                    "request_method" => 7,
                    "request_id" => 36,
                    "http_user_agent" => 128,
                    _ => 32,
                },
            }
        });

        let mut output = String::with_capacity(estimated_len);

        for segment in &self.segments {
            match segment {
                Segment::Static(text) => output.push_str(text),
                Segment::Variable(var) => {
                    let value = match var.as_str() {
                        "request_id" => request.id().to_string(),
                        "request_method" => request.method().to_string(),
                        "uri" => request.path().to_string(),
                        "query_string" => request.query_string(),
                        "http_host" => request.header("host").unwrap_or_default().to_string(),
                        "http_user_agent" => {
                            request.header("user-agent").unwrap_or_default().to_string()
                        }
                        "http_referer" => request.header("referer").unwrap_or_default().to_string(),
                        "status" => response.status_code.to_string(),
                        "body_bytes_sent" => response.body.len().to_string(),
                        "request_time" => elapsed_ms.map(|ms| ms.to_string()).unwrap_or_default(),
                        "context_id" => scope::current()
                            .map(|id| id.to_string())
                            .unwrap_or_default(),
                        _ => String::new(),
                    };
                    output.push_str(&value);
                }
            }
        }

        output
    }
}
