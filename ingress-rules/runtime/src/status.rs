//! Reports the controller's attachments over HTTP.
//!
//! `GET /` returns a JSON object keyed by service name describing where each
//! attached service is routed.

use crate::index::SharedStore;
use anyhow::Result;
use hyper::{
    body::Incoming, header, server::conn::http1, service::service_fn, Method, Request, Response,
    StatusCode,
};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

type Body = http_body_util::Full<bytes::Bytes>;

/// Serves status requests until the runtime begins shutting down.
#[instrument(skip_all, fields(port = %addr.port()))]
pub async fn serve(addr: SocketAddr, store: SharedStore, drain: drain::Watch) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Status server listening");

    let shutdown = drain.signaled();
    tokio::pin!(shutdown);
    loop {
        let (stream, client) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
            _ = &mut shutdown => {
                debug!("Status server shutting down");
                return Ok(());
            }
        };

        let store = store.clone();
        let svc = service_fn(move |req: Request<Incoming>| {
            let rsp = respond(&store, req.method(), req.uri().path());
            async move { Ok::<_, Infallible>(rsp) }
        });
        tokio::spawn(
            async move {
                if let Err(error) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await
                {
                    debug!(%error, "Connection closed with an error");
                }
            }
            .instrument(info_span!("conn", %client)),
        );
    }
}

/// Renders the response to a status request.
pub fn respond(store: &SharedStore, method: &Method, path: &str) -> Response<Body> {
    if path != "/" {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::default())
            .expect("not found response must be valid");
    }

    if method != Method::GET && method != Method::HEAD {
        return Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(header::ALLOW, "GET, HEAD")
            .body(Body::default())
            .expect("method not allowed response must be valid");
    }

    let snapshot = store.read().snapshot();
    let json = match serde_json::to_vec_pretty(&snapshot) {
        Ok(json) => json,
        Err(error) => {
            warn!(%error, "Failed to encode attachments");
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::default())
                .expect("error response must be valid");
        }
    };

    let body = if method == Method::HEAD {
        Body::default()
    } else {
        Body::from(json)
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .expect("status response must be valid")
}
