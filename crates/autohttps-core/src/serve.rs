// Serving configured routes on bound listeners
//
// Only static responses are served, which covers the synthesized redirects. Connections on
// TLS listeners that negotiate `acme-tls/1` are closed right after the handshake; the
// handshake itself answers the TLS-ALPN-01 challenge.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use http_body_util::Full;
use hyper::{
    Request, Response, StatusCode,
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::Notify,
};
use tokio_rustls::TlsAcceptor;
use tokio_rustls_acme::acme::ACME_TLS_ALPN_NAME;

use crate::{error::AutoHttpsError, http::Route};

/// Responds with the static response of the first matching route that has one, or 404
pub fn respond<B>(routes: &[Route], req: &Request<B>, secure: bool) -> Response<Full<Bytes>> {
    let response = routes
        .iter()
        .filter(|route| route.matches(req, secure))
        .find_map(Route::static_response);

    match response {
        Some(response) => response.render(req).unwrap_or_else(|e| {
            error!("Failed to render response for {}: {e}", req.uri());
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }),
        None => status_response(StatusCode::NOT_FOUND),
    }
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// A bound listener and the routes of the server it belongs to
pub struct Listener {
    pub server: String,
    pub listener: TcpListener,
    pub routes: Arc<[Route]>,

    /// Terminates TLS on this listener when set
    pub tls: Option<TlsAcceptor>,
}

impl Listener {
    /// Accepts connections until `shutdown` is notified
    pub async fn run(self, shutdown: Arc<Notify>) -> Result<(), AutoHttpsError> {
        let address = self.listener.local_addr()?;
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        info!("Serving '{}' on {scheme}://{address}", self.server);

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("Shutdown signal received, closing {address}");
                    return Ok(());
                }

                connection = self.listener.accept() => {
                    match connection {
                        Ok((stream, peer)) => {
                            tokio::spawn(handle_connection(
                                stream,
                                peer,
                                Arc::clone(&self.routes),
                                self.tls.clone(),
                            ));
                        }
                        Err(e) => warn!("Failed to accept connection on {address}: {e}"),
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    routes: Arc<[Route]>,
    tls: Option<TlsAcceptor>,
) {
    debug!("Accepted connection from {peer}");

    let result = match tls {
        None => serve_http(stream, routes, false).await,
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(stream) if stream.get_ref().1.alpn_protocol() == Some(ACME_TLS_ALPN_NAME) => {
                debug!("Answered TLS-ALPN-01 challenge from {peer}");
                Ok(())
            }
            Ok(stream) => serve_http(stream, routes, true).await,
            Err(e) => {
                debug!("TLS handshake with {peer} failed: {e}");
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        debug!("Connection from {peer} closed with an error: {e}");
    }
}

async fn serve_http<S>(stream: S, routes: Arc<[Route]>, secure: bool) -> Result<(), hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let response = respond(&routes, &req, secure);
        async move { Ok::<_, Infallible>(response) }
    });

    http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
}
