//! The QUIC-backed HTTP/3 listener.
//!
//! Binds two sockets on the same address: a UDP socket carrying the
//! QUIC transport, and a TLS TCP companion whose responses advertise
//! the QUIC endpoint via Alt-Svc. Whichever sub-listener fails first
//! takes the listener down; the other's sockets are not cleanly closed
//! before the process exits.

use crate::altsvc::{AltSvcInjector, AltSvcRewriter, ResponseDecorator};
use crate::config::AltSvcRewriteConfig;
use crate::router::{RequestContext, Router};
use crate::server::{self, IoTimeouts};
use crate::tls;
use hyper::body::Bytes;
use hyper::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

pub async fn run_quic_listener(
    address: SocketAddr,
    cert_file: String,
    key_file: String,
    alt_svc_port: Option<u16>,
    alt_svc_rewrite: Option<AltSvcRewriteConfig>,
    router: Arc<Router>,
) -> anyhow::Result<()> {
    let advertised_port = alt_svc_port.unwrap_or_else(|| address.port());

    let mut decorators: Vec<Arc<dyn ResponseDecorator>> =
        vec![Arc::new(AltSvcInjector::new(advertised_port))];
    if let Some(rewrite) = alt_svc_rewrite {
        decorators.push(Arc::new(AltSvcRewriter::new(rewrite.from, rewrite.to)));
    }
    let decorators = Arc::new(decorators);

    // TLS TCP companion for protocol-upgrade discovery.
    let companion_tls = tls::server_config(&cert_file, &key_file, &[b"h2" as &[u8], b"http/1.1"])?;
    let acceptor = TlsAcceptor::from(Arc::new(companion_tls));
    let tcp_listener = TcpListener::bind(address)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", address, e))?;

    // QUIC transport on the same address.
    let mut quic_tls = tls::server_config(&cert_file, &key_file, &[b"h3" as &[u8]])?;
    quic_tls.max_early_data_size = u32::MAX;
    let quic_crypto = quinn::crypto::rustls::QuicServerConfig::try_from(quic_tls)
        .map_err(|e| anyhow::anyhow!("TLS configuration unusable for QUIC: {}", e))?;
    let quic_config = quinn::ServerConfig::with_crypto(Arc::new(quic_crypto));
    let endpoint = quinn::Endpoint::server(quic_config, address)
        .map_err(|e| anyhow::anyhow!("failed to bind UDP {}: {}", address, e))?;

    info!(
        addr = %address,
        protocol = "HTTP/3",
        alt_svc_port = advertised_port,
        "Listener started"
    );

    let companion = server::serve_connections(
        tcp_listener,
        Some(acceptor),
        IoTimeouts::none(),
        Arc::clone(&router),
        decorators,
    );
    let quic = serve_h3(endpoint, router);

    // First failure wins.
    tokio::select! {
        result = companion => result,
        result = quic => result,
    }
}

async fn serve_h3(endpoint: quinn::Endpoint, router: Arc<Router>) -> anyhow::Result<()> {
    while let Some(incoming) = endpoint.accept().await {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            match incoming.await {
                Ok(connection) => {
                    let remote_addr = connection.remote_address();
                    if let Err(e) = serve_h3_connection(connection, remote_addr, router).await {
                        debug!(addr = %remote_addr, error = %e, "HTTP/3 connection error");
                    }
                }
                Err(e) => {
                    debug!(error = %e, "QUIC handshake failed");
                }
            }
        });
    }

    Err(anyhow::anyhow!("QUIC endpoint closed"))
}

async fn serve_h3_connection(
    connection: quinn::Connection,
    remote_addr: SocketAddr,
    router: Arc<Router>,
) -> anyhow::Result<()> {
    let mut h3_connection: h3::server::Connection<h3_quinn::Connection, Bytes> =
        h3::server::Connection::new(h3_quinn::Connection::new(connection)).await?;

    loop {
        match h3_connection.accept().await {
            Ok(Some((request, stream))) => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    if let Err(e) = handle_h3_request(request, stream, remote_addr, router).await {
                        debug!(addr = %remote_addr, error = %e, "HTTP/3 request error");
                    }
                });
            }
            // Client closed the connection.
            Ok(None) => return Ok(()),
            Err(e) => {
                debug!(addr = %remote_addr, error = %e, "HTTP/3 accept ended");
                return Ok(());
            }
        }
    }
}

async fn handle_h3_request(
    request: hyper::Request<()>,
    mut stream: h3::server::RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>,
    remote_addr: SocketAddr,
    router: Arc<Router>,
) -> anyhow::Result<()> {
    let (parts, ()) = request.into_parts();
    let context = RequestContext {
        method: parts.method,
        uri: parts.uri,
        version: parts.version,
        headers: parts.headers,
        remote_addr,
        tls: true,
    };

    let response = router.dispatch(context).await;
    let (parts, body) = response.into_parts();

    stream.send_response(Response::from_parts(parts, ())).await?;
    if !body.is_empty() {
        stream.send_data(body).await?;
    }
    stream.finish().await?;
    Ok(())
}
