pub mod internal;
pub mod public;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tower::Service;
use tracing::warn;

/// Serve `app` on `address`, forever, with `max_header_bytes` as the h1
/// connection's read-buffer ceiling — the closest hyper equivalent to
/// `http.Server.MaxHeaderBytes`. `axum::serve` has no knob for this; it
/// always takes hyper's default (~400KB), so the façades that need a
/// tighter ceiling drop to hyper's own per-connection builder instead.
pub async fn serve_with_header_limit(
    address: &str,
    app: Router,
    max_header_bytes: usize,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;

    loop {
        let (stream, peer) = listener.accept().await?;
        let app = app.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = hyper::service::service_fn(move |request| app.clone().call(request));

            if let Err(e) = http1::Builder::new()
                .max_buf_size(max_header_bytes)
                .serve_connection(io, service)
                .await
            {
                warn!(?peer, error = %e, "connection error");
            }
        });
    }
}
