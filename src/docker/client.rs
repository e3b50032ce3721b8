use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{header, Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::fmt;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use super::{EventDecoder, SourceError};
use crate::error::ConfigError;
use crate::manifest::StepRegistry;
use crate::steps::Transition;

/// Container events from ten seconds back, so steps that started just before
/// the relay connected are still seen.
pub const EVENTS_PATH: &str = "/events?type=container&since=10";

/// Where the Docker daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    Unix(PathBuf),
    /// `host:port`
    Tcp(String),
}

impl DockerEndpoint {
    /// Parse a `DOCKER_HOST` value.
    pub fn parse(host: &str) -> Result<Self, ConfigError> {
        if let Some(path) = host.strip_prefix("unix://") {
            if !path.is_empty() {
                return Ok(DockerEndpoint::Unix(PathBuf::from(path)));
            }
        }
        for scheme in ["tcp://", "http://"] {
            if let Some(addr) = host.strip_prefix(scheme) {
                let addr = addr.trim_end_matches('/');
                if !addr.is_empty() {
                    return Ok(DockerEndpoint::Tcp(addr.to_string()));
                }
            }
        }
        Err(ConfigError::UnsupportedDockerHost(host.to_string()))
    }

    fn host_header(&self) -> &str {
        match self {
            DockerEndpoint::Unix(_) => "docker",
            DockerEndpoint::Tcp(addr) => addr,
        }
    }

    fn connect_error(&self, e: impl fmt::Display) -> SourceError {
        SourceError::Connect {
            host: self.to_string(),
            message: e.to_string(),
        }
    }
}

impl fmt::Display for DockerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerEndpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            DockerEndpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Reads the Docker event stream and forwards step transitions.
pub struct EventReader {
    endpoint: DockerEndpoint,
    registry: StepRegistry,
    updates: mpsc::Sender<Transition>,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl EventReader {
    pub fn new(
        endpoint: DockerEndpoint,
        registry: StepRegistry,
        updates: mpsc::Sender<Transition>,
    ) -> Self {
        Self {
            endpoint,
            registry,
            updates,
            shutdown_rx: None,
        }
    }

    /// Stop reading as soon as `rx` receives a message or its sender is
    /// dropped.
    pub fn with_shutdown(mut self, rx: mpsc::Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Stream events until the daemon closes the stream.
    ///
    /// Returns `Ok` on a clean end of stream. The reader keeps its transition
    /// sender until it is dropped, so callers can deliver the result before
    /// the relay sees the channel close.
    #[instrument(skip(self), fields(host = %self.endpoint))]
    pub async fn run(&mut self) -> Result<(), SourceError> {
        let (_sender, mut body) = tokio::select! {
            res = connect(&self.endpoint) => res?,
            () = shutdown(&mut self.shutdown_rx) => return Err(SourceError::Cancelled),
        };
        info!("Streaming docker events");

        let mut decoder = EventDecoder::new();
        loop {
            let frame = tokio::select! {
                frame = body.frame() => frame,
                () = shutdown(&mut self.shutdown_rx) => return Err(SourceError::Cancelled),
            };
            let Some(frame) = frame else {
                break;
            };
            let frame = frame.map_err(|e| SourceError::Read(e.to_string()))?;
            let Ok(data) = frame.into_data() else {
                continue;
            };

            for event in decoder.push(&data)? {
                let Some(transition) = Transition::from_event(&event, &self.registry) else {
                    continue;
                };
                tokio::select! {
                    res = self.updates.send(transition) => {
                        if res.is_err() {
                            return Err(SourceError::Cancelled);
                        }
                    }
                    () = shutdown(&mut self.shutdown_rx) => return Err(SourceError::Cancelled),
                }
            }
        }

        decoder.finish()?;
        debug!("Docker event stream ended");
        Ok(())
    }
}

async fn shutdown(rx: &mut Option<mpsc::Receiver<()>>) {
    if let Some(rx) = rx {
        rx.recv().await;
    } else {
        std::future::pending::<()>().await;
    }
}

/// Open the events request, returning the request handle (kept alive for the
/// life of the stream) and the response body.
async fn connect(
    endpoint: &DockerEndpoint,
) -> Result<(SendRequest<Empty<Bytes>>, Incoming), SourceError> {
    let mut sender = match endpoint {
        #[cfg(unix)]
        DockerEndpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(|e| endpoint.connect_error(e))?;
            handshake(stream, endpoint).await?
        }
        #[cfg(not(unix))]
        DockerEndpoint::Unix(_) => {
            return Err(endpoint.connect_error("unix sockets are not supported on this platform"))
        }
        DockerEndpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str())
                .await
                .map_err(|e| endpoint.connect_error(e))?;
            handshake(stream, endpoint).await?
        }
    };

    let request = Request::get(EVENTS_PATH)
        .header(header::HOST, endpoint.host_header())
        .body(Empty::<Bytes>::new())
        .map_err(|e| endpoint.connect_error(e))?;
    let response = sender
        .send_request(request)
        .await
        .map_err(|e| endpoint.connect_error(e))?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = match response.into_body().collect().await {
            Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            Err(_) => String::new(),
        };
        return Err(SourceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok((sender, response.into_body()))
}

async fn handshake<T>(
    io: T,
    endpoint: &DockerEndpoint,
) -> Result<SendRequest<Empty<Bytes>>, SourceError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| endpoint.connect_error(e))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "Docker connection closed");
        }
    });
    Ok(sender)
}
