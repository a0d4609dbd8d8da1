//! End-to-end tests for the reqwest sender against mock caching proxies

use http::{HeaderMap, Method};
use proxy_invalidate::{
    DispatchOutcome, DispatchRequest, HttpSender, ProxyClient, ProxyFailure, ReqwestSender,
    TransportFailure, Varnish,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get(url: String) -> DispatchRequest {
    DispatchRequest {
        method: Method::GET,
        url,
        headers: HeaderMap::new(),
    }
}

#[tokio::test]
async fn test_outcomes_in_batch_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let sender = ReqwestSender::with_options(Duration::from_secs(5), 2).unwrap();
    let outcomes = sender
        .send(vec![
            get(format!("{}/missing", mock_server.uri())),
            get(format!("{}/ok", mock_server.uri())),
            get(format!("{}/broken", mock_server.uri())),
            get(format!("{}/ok", mock_server.uri())),
        ])
        .await;

    assert_eq!(outcomes.len(), 4);
    match &outcomes[0] {
        DispatchOutcome::Failure(TransportFailure {
            response: Some(response),
            ..
        }) => {
            assert_eq!(response.status, 404);
            assert_eq!(response.reason, "Not Found");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(outcomes[1].is_success());
    assert!(matches!(
        &outcomes[2],
        DispatchOutcome::Failure(TransportFailure { response: Some(r), .. }) if r.status == 500
    ));
    assert!(outcomes[3].is_success());
}

#[tokio::test]
async fn test_unreachable_server() {
    let sender = ReqwestSender::with_options(Duration::from_secs(2), 4).unwrap();
    let outcomes = sender
        .send(vec![get("http://127.0.0.1:1/".to_string())])
        .await;

    match &outcomes[0] {
        DispatchOutcome::Failure(failure) => {
            assert_eq!(failure.host, "127.0.0.1:1");
            assert!(failure.response.is_none());
            assert!(!failure.message.is_empty());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_refresh_through_client() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/app/fresh"))
        .and(header("cache-control", "no-cache"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ProxyClient::new(
        Varnish,
        &[mock_server.uri()],
        Some("fos.lo/app"),
        Arc::new(ReqwestSender::new().unwrap()),
    )
    .unwrap();

    client.refresh("/fresh", HeaderMap::new()).unwrap();
    assert_eq!(client.flush().await.unwrap(), 1);
}

#[tokio::test]
async fn test_mixed_servers_through_client() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ProxyClient::new(
        Varnish,
        &[mock_server.uri(), "127.0.0.1:1".to_string()],
        Some("fos.lo"),
        Arc::new(ReqwestSender::with_options(Duration::from_secs(2), 8).unwrap()),
    )
    .unwrap();

    client.refresh("/fresh", HeaderMap::new()).unwrap();
    let err = client.flush().await.unwrap_err();
    let failures = err.proxy_failures().unwrap();

    assert_eq!(failures.len(), 1);
    match failures.first() {
        Some(ProxyFailure::Unreachable(e)) => {
            assert_eq!(e.host, "127.0.0.1:1");
            assert_eq!(e.url, "http://127.0.0.1:1/fresh");
        }
        other => panic!("unexpected failure: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_through_client() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let client = ProxyClient::new(
        Varnish,
        &[mock_server.uri()],
        Some("fos.lo"),
        Arc::new(ReqwestSender::new().unwrap()),
    )
    .unwrap();

    client.refresh("/a", HeaderMap::new()).unwrap();
    let err = client.flush().await.unwrap_err();
    let failure = err.proxy_failures().unwrap().first().unwrap().to_string();
    assert!(failure.starts_with("403 error response \"Forbidden\" from caching proxy at 127.0.0.1:"));
}

/// Minimal proxy that redirects `PURGE /a` and answers 200 to anything else
///
/// Returns the proxy address and the request lines it has seen.
async fn redirecting_proxy() -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let request = String::from_utf8_lossy(&buf);
            let line = request.lines().next().unwrap_or("").to_string();

            let response = if line.starts_with("PURGE /a ") {
                "HTTP/1.1 301 Moved Permanently\r\nLocation: /landing\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            } else {
                "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            };
            log.lock().unwrap().push(line);
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (addr, seen)
}

#[tokio::test]
async fn test_redirect_is_a_response_error() {
    let (addr, seen) = redirecting_proxy().await;

    let client = ProxyClient::new(
        Varnish,
        &[addr.clone()],
        Some("fos.lo"),
        Arc::new(ReqwestSender::with_options(Duration::from_secs(5), 4).unwrap()),
    )
    .unwrap();

    client.purge("/a", HeaderMap::new()).unwrap();
    let err = client.flush().await.unwrap_err();
    let failures = err.proxy_failures().unwrap();

    assert_eq!(failures.len(), 1);
    match failures.first() {
        Some(ProxyFailure::Response(e)) => {
            assert_eq!(e.host, addr);
            assert_eq!(e.status, 301);
            assert_eq!(e.reason, "Moved Permanently");
        }
        other => panic!("unexpected failure: {:?}", other),
    }

    // The redirect target is never contacted
    assert_eq!(*seen.lock().unwrap(), vec!["PURGE /a HTTP/1.1".to_string()]);
}
