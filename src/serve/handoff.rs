//! Local HTTP hand-off of one certificate to a device browser.
//!
//! Some platforms only install trust anchors from a browser download. The hand-off
//! walks the browser through `/start` → `/install` and then stops on `/shutdown`.
//! It cannot observe whether the user finished installing, so it never records an install.

use anyhow::{Context, Result};
use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::codec::ParsedCertificate;

pub const DEFAULT_PORT: u16 = 8080;

const CERT_CONTENT_TYPE: &str = "application/x-x509-ca-cert";

const INSTRUCTIONS: &str = "<div style='margin: 40px;'><h1>Additional instructions:</h1><ol>\
<li>Go to Settings on your device.</li>\
<li>General &rarr; Profile &rarr; Downloaded Profile &rarr; Install</li>\
<li>General &rarr; About &rarr; Certificate Trust Settings &rarr; \
Enable Full Trust for Root Certificates</li>\
</ol></div><script>fetch(\"/shutdown\")</script>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    /// Waiting for the browser to fetch the certificate.
    Ready,
    /// Certificate served once; further visits get instructions.
    Delivered,
    /// Shut down; every route is gone.
    Closed,
}

pub struct Handoff {
    pem: Bytes,
    name: String,
    state: Mutex<HandoffState>,
    closed: Notify,
}

impl Handoff {
    pub fn new(certificate: &ParsedCertificate, name: impl Into<String>) -> Self {
        Self {
            pem: Bytes::from(certificate.to_pem()),
            name: name.into(),
            state: Mutex::new(HandoffState::Ready),
            closed: Notify::new(),
        }
    }

    pub fn state(&self) -> HandoffState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Download file name, e.g. `Test_CA.crt`.
    pub fn file_name(&self) -> String {
        let stem: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        let stem = stem.trim_matches('_');
        if stem.is_empty() {
            "CA.crt".to_string()
        } else {
            format!("{stem}.crt")
        }
    }

    /// Route one request and advance the state machine.
    pub fn respond(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        if *method != Method::GET {
            return empty(StatusCode::METHOD_NOT_ALLOWED);
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match (path.trim_end_matches('/'), *state) {
            ("/start", HandoffState::Ready) => html(self.redirect_page()),
            ("/install", HandoffState::Ready) => {
                *state = HandoffState::Delivered;
                debug!(file = %self.file_name(), "certificate delivered");
                self.certificate_response()
            }
            ("/install", HandoffState::Delivered) => html(INSTRUCTIONS.to_string()),
            ("/shutdown", _) => {
                *state = HandoffState::Closed;
                self.closed.notify_one();
                debug!("hand-off closed");
                empty(StatusCode::OK)
            }
            _ => empty(StatusCode::NOT_FOUND),
        }
    }

    fn certificate_response(&self) -> Response<Full<Bytes>> {
        let mut resp = Response::new(Full::from(self.pem.clone()));
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CERT_CONTENT_TYPE));
        let disposition = format!("attachment; filename=\"{}\"", self.file_name());
        if let Ok(v) = HeaderValue::from_str(&disposition) {
            resp.headers_mut().insert(CONTENT_DISPOSITION, v);
        }
        resp
    }

    fn redirect_page(&self) -> String {
        format!(
            "<!doctype html><html><head><meta charset='utf-8'><title>{}</title>\
             <script>function load() {{ window.location.href='/install/'; }}\
             window.setInterval(load, 600);</script>\
             </head><body></body></html>",
            html_escape(&self.name)
        )
    }
}

fn html(body: String) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::from(body));
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    resp
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::from(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serve until `/shutdown` is requested.
pub async fn run_handoff(listener: TcpListener, handoff: Arc<Handoff>) -> Result<()> {
    loop {
        tokio::select! {
            _ = handoff.closed.notified() => break,
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("accept error: {e}");
                        continue;
                    }
                };
                debug!(%remote, "hand-off connection");
                let handoff = handoff.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let handoff = handoff.clone();
                        async move {
                            Ok::<_, Infallible>(handoff.respond(req.method(), req.uri().path()))
                        }
                    });
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("connection error: {e:#}");
                    }
                });
            }
        }
    }
    info!("hand-off server stopped");
    Ok(())
}

/// Bind `addr` and serve the hand-off.
pub async fn serve(addr: SocketAddr, handoff: Arc<Handoff>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    let local = listener.local_addr()?;
    info!("hand-off listening on http://{local}/start");
    run_handoff(listener, handoff).await
}
