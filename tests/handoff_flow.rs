//! Browser hand-off: /start -> /install -> /shutdown.

mod common;

use certnest::codec::{decode, Encoding, ParsedCertificate};
use certnest::serve::handoff::{run_handoff, Handoff, HandoffState};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn parsed(name: &str) -> ParsedCertificate {
    decode(&common::ca_cert(name).der, Encoding::Der).unwrap()
}

#[test]
fn file_name_is_sanitized() {
    let cert = parsed("Test CA");
    assert_eq!(Handoff::new(&cert, "Test CA").file_name(), "Test_CA.crt");
    assert_eq!(Handoff::new(&cert, "dev-ca.local").file_name(), "dev-ca.local.crt");
    assert_eq!(Handoff::new(&cert, "???").file_name(), "CA.crt");
}

#[test]
fn state_machine() {
    let handoff = Handoff::new(&parsed("Test CA"), "Test CA");
    assert_eq!(handoff.state(), HandoffState::Ready);

    let start = handoff.respond(&Method::GET, "/start");
    assert_eq!(start.status(), StatusCode::OK);
    assert_eq!(handoff.state(), HandoffState::Ready);

    let install = handoff.respond(&Method::GET, "/install/");
    assert_eq!(install.status(), StatusCode::OK);
    assert_eq!(
        install.headers()[CONTENT_TYPE],
        "application/x-x509-ca-cert"
    );
    assert_eq!(
        install.headers()[CONTENT_DISPOSITION],
        "attachment; filename=\"Test_CA.crt\""
    );
    assert_eq!(handoff.state(), HandoffState::Delivered);

    let again = handoff.respond(&Method::GET, "/install");
    assert!(again.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    assert_eq!(
        handoff.respond(&Method::GET, "/start").status(),
        StatusCode::NOT_FOUND
    );

    assert_eq!(
        handoff.respond(&Method::GET, "/shutdown").status(),
        StatusCode::OK
    );
    assert_eq!(handoff.state(), HandoffState::Closed);
    assert_eq!(
        handoff.respond(&Method::GET, "/install").status(),
        StatusCode::NOT_FOUND
    );
}

#[test]
fn rejects_other_methods_and_paths() {
    let handoff = Handoff::new(&parsed("Test CA"), "Test CA");
    assert_eq!(
        handoff.respond(&Method::POST, "/install").status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
    assert_eq!(
        handoff.respond(&Method::GET, "/").status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(handoff.state(), HandoffState::Ready);
}

#[tokio::test]
async fn serves_certificate_over_http() {
    let cert = parsed("Test CA");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handoff = Arc::new(Handoff::new(&cert, "Test CA"));
    let server = tokio::spawn(run_handoff(listener, handoff.clone()));

    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let get = |path: &str| {
        let uri: hyper::Uri = format!("http://{addr}{path}").parse().unwrap();
        client.get(uri)
    };

    let start = get("/start").await.unwrap();
    assert_eq!(start.status(), StatusCode::OK);
    let page = start.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&page).contains("/install/"));

    let install = get("/install/").await.unwrap();
    assert_eq!(install.status(), StatusCode::OK);
    let body = install.into_body().collect().await.unwrap().to_bytes();
    let served = decode(&body, Encoding::Pem).unwrap();
    assert_eq!(served.fingerprint, cert.fingerprint);

    let shutdown = get("/shutdown").await.unwrap();
    assert_eq!(shutdown.status(), StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops after /shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(handoff.state(), HandoffState::Closed);
}
