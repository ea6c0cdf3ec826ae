//! Agent controller scenarios over real localhost channels.

use serde_json::json;
use std::time::Duration;
use tm_tacs::protocol::{headers, read_frame, write_frame};
use tm_tacs::{status, Frame, Notification, Request, TacsClient, TacsConfig, TacsServer};

const T: Duration = Duration::from_secs(5);

async fn server() -> (TacsServer, tempfile::TempDir) {
    let docroot = tempfile::tempdir().unwrap();
    let config = TacsConfig {
        ia_address: "127.0.0.1:0".parse().unwrap(),
        xa_address: "127.0.0.1:0".parse().unwrap(),
        document_root: docroot.path().to_path_buf(),
        proxy_timeout: Duration::from_secs(2),
    };
    (TacsServer::bind(config).await.unwrap(), docroot)
}

async fn register_probe(server: &TacsServer) -> TacsClient {
    let agent = TacsClient::connect(server.xa_address()).await.unwrap();
    agent
        .request(
            Request::new("REGISTER", "agent:agent1")
                .with_header(headers::CONTACT, "127.0.0.1:40001")
                .with_header(headers::AGENT_SUPPORTED_PROBE_TYPES, "tcp")
                .with_header(headers::USER_AGENT, "testerman-agent/1.0"),
            T,
        )
        .await
        .unwrap();
    agent
        .request(
            Request::new("REGISTER", "probe:x@agent1")
                .with_header(headers::CONTACT, "127.0.0.1:40001")
                .with_header(headers::PROBE_NAME, "x")
                .with_header(headers::PROBE_TYPE, "tcp")
                .with_header(headers::AGENT_URI, "agent:agent1"),
            T,
        )
        .await
        .unwrap();
    agent
}

#[tokio::test]
async fn probe_lock_conflict_and_takeover() {
    let (server, _docroot) = server().await;
    let _agent = register_probe(&server).await;

    let watcher = TacsClient::connect(server.ia_address()).await.unwrap();
    watcher
        .request(Request::new("SUBSCRIBE", "system:probes"), T)
        .await
        .unwrap();

    let lock_request =
        || Request::new("LOCK", "system:tacs").with_header(headers::PROBE_URI, "probe:x@agent1");

    // client A locks the probe
    let mut a = TacsClient::connect(server.ia_address()).await.unwrap();
    assert_eq!(a.request(lock_request(), T).await.unwrap().status, status::OK);

    // client B is rejected with 403
    let b = TacsClient::connect(server.ia_address()).await.unwrap();
    assert_eq!(
        b.request(lock_request(), T).await.unwrap().status,
        status::FORBIDDEN
    );

    // A disconnects; B locks successfully
    a.close();
    let deadline = std::time::Instant::now() + T;
    loop {
        let response = b.request(lock_request(), T).await.unwrap();
        if response.status == status::OK {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "lock never released");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // the watcher saw: locked (A), unlocked (A's disconnect), locked (B)
    let mut reasons = Vec::new();
    while let Some(event) = watcher.next_notification(Duration::from_millis(500)).await {
        if event.method == "PROBE-EVENT" {
            reasons.push(event.header(headers::REASON).unwrap().to_string());
        }
    }
    let lock_flow: Vec<&str> = reasons
        .iter()
        .map(String::as_str)
        .filter(|r| r.starts_with("probe-lock") || r.starts_with("probe-unlock"))
        .collect();
    assert_eq!(lock_flow, vec!["probe-locked", "probe-unlocked", "probe-locked"]);
}

#[tokio::test]
async fn lock_implies_subscription_to_the_probe() {
    let (server, _docroot) = server().await;
    let agent = register_probe(&server).await;

    let client = TacsClient::connect(server.ia_address()).await.unwrap();
    client
        .request(
            Request::new("LOCK", "system:tacs").with_header(headers::PROBE_URI, "probe:x@agent1"),
            T,
        )
        .await
        .unwrap();

    // a probe notification now reaches the locker without an explicit
    // subscription
    agent
        .notify(Notification::new("LOG", "probe:x@agent1").with_body(json!({"msg": "hello"})))
        .unwrap();
    let received = client.next_notification(T).await.unwrap();
    assert_eq!(received.method, "LOG");

    // unlock implies unsubscription
    client
        .request(
            Request::new("UNLOCK", "system:tacs").with_header(headers::PROBE_URI, "probe:x@agent1"),
            T,
        )
        .await
        .unwrap();
    // drain the probe-unlocked event that may have been delivered before
    // the unsubscription took effect, then verify silence
    while client
        .next_notification(Duration::from_millis(300))
        .await
        .is_some()
    {}
    agent
        .notify(Notification::new("LOG", "probe:x@agent1").with_body(json!({"msg": "again"})))
        .unwrap();
    assert!(client
        .next_notification(Duration::from_millis(300))
        .await
        .is_none());
}

#[tokio::test]
async fn downstream_rejections_are_relayed_verbatim() {
    let (server, _docroot) = server().await;
    // the default client handler answers every probe request with 505;
    // the broker must hand exactly that back, not a 501 of its own
    let _agent = register_probe(&server).await;

    let client = TacsClient::connect(server.ia_address()).await.unwrap();
    let response = client
        .request(Request::new("TRI-SEND", "probe:x@agent1"), T)
        .await
        .unwrap();
    assert_eq!(response.status, status::NOT_SUPPORTED);
    assert_eq!(response.reason, "Not Supported");
}

#[tokio::test]
async fn proxied_request_times_out_as_an_internal_error() {
    let (server, _docroot) = server().await;

    // a hand-rolled agent channel that registers its probe and then goes
    // silent: a proxied request can only end by timeout
    let mut stream = tokio::net::TcpStream::connect(server.xa_address())
        .await
        .unwrap();
    let registrations = [
        Request::new("REGISTER", "agent:agent1")
            .with_header(headers::CONTACT, "c")
            .with_header(headers::AGENT_SUPPORTED_PROBE_TYPES, "tcp")
            .with_header(headers::USER_AGENT, "ua"),
        Request::new("REGISTER", "probe:x@agent1")
            .with_header(headers::CONTACT, "c")
            .with_header(headers::PROBE_NAME, "x")
            .with_header(headers::PROBE_TYPE, "tcp")
            .with_header(headers::AGENT_URI, "agent:agent1"),
    ];
    for (tid, request) in registrations.into_iter().enumerate() {
        write_frame(
            &mut stream,
            &Frame::Request {
                tid: tid as u64 + 1,
                request,
            },
        )
        .await
        .unwrap();
        match read_frame(&mut stream).await.unwrap() {
            Frame::Response { response, .. } => assert!(response.is_ok()),
            other => panic!("unexpected frame during registration: {other:?}"),
        }
    }

    let client = TacsClient::connect(server.ia_address()).await.unwrap();
    let response = client
        .request(Request::new("TRI-SEND", "probe:x@agent1"), T)
        .await
        .unwrap();
    assert_eq!(response.status, status::INTERNAL_ERROR);
    assert_eq!(response.reason, "Timeout");
    drop(stream);
}
