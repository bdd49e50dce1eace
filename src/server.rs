//! Listener supervision and the plain/TLS accept loops.
//!
//! Every listener runs as its own task against the shared routing
//! tree. The failure policy is first-error-wins: whichever listener
//! fails first takes the whole process down; no isolation between
//! listeners is provided.

use crate::altsvc::{self, ResponseDecorator};
use crate::config::ListenerConfig;
use crate::router::{RequestContext, Router};
use crate::tls;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::Sleep;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

/// Per-operation I/O deadlines for one listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct IoTimeouts {
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl IoTimeouts {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Wraps a stream so that each read/write completes within its
/// configured deadline or fails with `TimedOut`.
pub struct DeadlineStream<S> {
    inner: S,
    timeouts: IoTimeouts,
    read_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> DeadlineStream<S> {
    pub fn new(inner: S, timeouts: IoTimeouts) -> Self {
        Self {
            inner,
            timeouts,
            read_deadline: None,
            write_deadline: None,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.read_deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                if let Some(timeout) = this.timeouts.read {
                    let deadline = this
                        .read_deadline
                        .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                    if deadline.as_mut().poll(cx).is_ready() {
                        this.read_deadline = None;
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "read timed out",
                        )));
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                this.write_deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                if let Some(timeout) = this.timeouts.write {
                    let deadline = this
                        .write_deadline
                        .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                    if deadline.as_mut().poll(cx).is_ready() {
                        this.write_deadline = None;
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "write timed out",
                        )));
                    }
                }
                Poll::Pending
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Build the task for one configured listener.
pub fn listener_task(
    config: ListenerConfig,
    router: Arc<Router>,
) -> BoxFuture<'static, anyhow::Result<()>> {
    match config {
        ListenerConfig::Plain { address } => Box::pin(run_plain_listener(address, router)),
        ListenerConfig::Tls {
            address,
            cert_file,
            key_file,
            read_timeout_ms,
            write_timeout_ms,
        } => {
            let timeouts = IoTimeouts {
                read: read_timeout_ms.map(Duration::from_millis),
                write: write_timeout_ms.map(Duration::from_millis),
            };
            Box::pin(run_tls_listener(
                address, cert_file, key_file, timeouts, router,
            ))
        }
        ListenerConfig::Quic {
            address,
            cert_file,
            key_file,
            alt_svc_port,
            alt_svc_rewrite,
        } => Box::pin(crate::http3::run_quic_listener(
            address,
            cert_file,
            key_file,
            alt_svc_port,
            alt_svc_rewrite,
            router,
        )),
    }
}

/// Run all listener tasks; resolves with the first failure.
///
/// Listener loops run for the process lifetime, so the first task to
/// finish has failed (a clean return is itself unexpected). The
/// remaining tasks are not torn down here; the caller exits the
/// process.
pub async fn supervise(tasks: Vec<BoxFuture<'static, anyhow::Result<()>>>) -> anyhow::Error {
    if tasks.is_empty() {
        return anyhow::anyhow!("no listeners configured");
    }

    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn(task);
    }

    match set.join_next().await {
        Some(Ok(Err(e))) => e,
        Some(Ok(Ok(()))) => anyhow::anyhow!("listener exited unexpectedly without an error"),
        Some(Err(e)) => anyhow::anyhow!("listener task panicked: {}", e),
        None => anyhow::anyhow!("no listeners configured"),
    }
}

pub async fn run_plain_listener(address: SocketAddr, router: Arc<Router>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", address, e))?;
    info!(addr = %address, protocol = "HTTP", "Listener started");

    serve_connections(listener, None, IoTimeouts::none(), router, Arc::new(Vec::new())).await
}

pub async fn run_tls_listener(
    address: SocketAddr,
    cert_file: String,
    key_file: String,
    timeouts: IoTimeouts,
    router: Arc<Router>,
) -> anyhow::Result<()> {
    let tls_config = tls::server_config(&cert_file, &key_file, &[b"h2" as &[u8], b"http/1.1"])?;
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));

    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", address, e))?;
    info!(addr = %address, protocol = "HTTPS", "Listener started");

    serve_connections(listener, Some(acceptor), timeouts, router, Arc::new(Vec::new())).await
}

/// Accept loop shared by the plain, TLS, and QUIC-companion listeners.
pub(crate) async fn serve_connections(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    timeouts: IoTimeouts,
    router: Arc<Router>,
    decorators: Arc<Vec<Arc<dyn ResponseDecorator>>>,
) -> anyhow::Result<()> {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // Transient accept failures (e.g. fd exhaustion) do not
                // take the listener down.
                error!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let router = Arc::clone(&router);
        let decorators = Arc::clone(&decorators);
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            let stream = DeadlineStream::new(stream, timeouts);
            if let Some(acceptor) = acceptor {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        if let Err(e) =
                            handle_connection(tls_stream, remote_addr, true, router, decorators)
                                .await
                        {
                            debug!(addr = %remote_addr, error = %e, "TLS connection error");
                        }
                    }
                    Err(e) => {
                        debug!(addr = %remote_addr, error = %e, "TLS handshake failed");
                    }
                }
            } else if let Err(e) =
                handle_connection(stream, remote_addr, false, router, decorators).await
            {
                debug!(addr = %remote_addr, error = %e, "Connection error");
            }
        });
    }
}

async fn handle_connection<S>(
    stream: S,
    remote_addr: SocketAddr,
    is_tls: bool,
    router: Arc<Router>,
    decorators: Arc<Vec<Arc<dyn ResponseDecorator>>>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);

    let service = service_fn(move |request: Request<Incoming>| {
        let router = Arc::clone(&router);
        let decorators = Arc::clone(&decorators);
        async move {
            let (parts, _body) = request.into_parts();
            let context = RequestContext {
                method: parts.method,
                uri: parts.uri,
                version: parts.version,
                headers: parts.headers,
                remote_addr,
                tls: is_tls,
            };

            let mut response = router.dispatch(context).await;
            altsvc::apply_all(&decorators, &mut response);
            Ok::<_, Infallible>(response.map(Full::new))
        }
    });

    // Serve both HTTP/1.1 and HTTP/2 on the same socket.
    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("connection error: {}", e))?;

    Ok(())
}
