use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    header::{self, HeaderValue},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::{convert::Infallible, sync::Arc};
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, instrument};

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Serves readiness and metrics.
#[derive(Clone)]
pub struct Admin {
    ready: watch::Receiver<bool>,
    registry: Arc<Registry>,
}

// === impl Admin ===

impl Admin {
    pub fn new(ready: watch::Receiver<bool>, registry: Arc<Registry>) -> Self {
        Self { ready, registry }
    }

    #[instrument(skip_all)]
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "HTTP admin server listening");
        loop {
            let (io, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(error) => {
                    tracing::warn!(%error, "Failed to accept admin connection");
                    continue;
                }
            };
            let admin = self.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req| {
                    let rsp = admin.handle(&req);
                    async move { Ok::<_, Infallible>(rsp) }
                });
                if let Err(error) = http1::Builder::new()
                    .serve_connection(TokioIo::new(io), svc)
                    .await
                {
                    tracing::debug!(%peer, %error, "Admin connection failed");
                }
            });
        }
    }

    pub fn handle<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        match req.uri().path() {
            "/ready" => self.handle_ready(req.method()),
            "/metrics" => self.handle_metrics(req.method()),
            _ => respond(StatusCode::NOT_FOUND, None, Bytes::new()),
        }
    }

    fn handle_ready(&self, method: &Method) -> Response<Full<Bytes>> {
        if !matches!(*method, Method::GET | Method::HEAD) {
            return respond(StatusCode::METHOD_NOT_ALLOWED, None, Bytes::new());
        }
        if *self.ready.borrow() {
            respond(StatusCode::OK, Some("text/plain"), "ready\n".into())
        } else {
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some("text/plain"),
                "not ready\n".into(),
            )
        }
    }

    fn handle_metrics(&self, method: &Method) -> Response<Full<Bytes>> {
        if !matches!(*method, Method::GET | Method::HEAD) {
            return respond(StatusCode::METHOD_NOT_ALLOWED, None, Bytes::new());
        }
        let mut body = String::new();
        match encode(&mut body, &self.registry) {
            Ok(()) => respond(StatusCode::OK, Some(OPENMETRICS), body.into()),
            Err(error) => {
                tracing::warn!(%error, "Failed to encode metrics");
                respond(StatusCode::INTERNAL_SERVER_ERROR, None, Bytes::new())
            }
        }
    }
}

impl std::fmt::Debug for Admin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admin")
            .field("ready", &*self.ready.borrow())
            .finish_non_exhaustive()
    }
}

fn respond(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut rsp = Response::new(Full::new(body));
    *rsp.status_mut() = status;
    if let Some(content_type) = content_type {
        rsp.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    rsp
}
