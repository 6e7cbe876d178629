// tests/integration/resp_client_test.rs

//! End-to-end tests of the RESP client against an in-process TCP server.

use super::fixtures::*;
use super::test_helpers::{TestServer, init_tracing, wait_for};
use spinel_link::{ConnectionManager, LinkError, LinkStatus, RespValue, SetOptions};
use std::time::Duration;
use tokio::net::TcpListener;

fn manager() -> ConnectionManager {
    init_tracing();
    ConnectionManager::resp()
}

#[tokio::test]
async fn test_structured_round_trip_over_tcp() {
    let server = TestServer::start().await;
    let manager = manager();

    manager.connect(server.options()).await.unwrap();
    let client = manager.get_client().unwrap();

    let reply = client
        .set_structured(USER_KEY, &alice_json(), &SetOptions::default())
        .await
        .unwrap();
    assert_eq!(reply.as_deref(), Some("OK"));

    let user: Option<User> = client.get_structured(USER_KEY).await.unwrap();
    assert_eq!(user, Some(alice()));

    let missing: Option<User> = client.get_structured(MISSING_KEY).await.unwrap();
    assert!(missing.is_none());

    manager.disconnect().await.unwrap();
    assert!(!client.is_open());
    assert!(server.commands().iter().any(|cmd| cmd[0] == "QUIT"));
}

#[tokio::test]
async fn test_default_database_skips_select() {
    let server = TestServer::start().await;
    let manager = manager();

    manager.connect(server.url(0)).await.unwrap();
    manager.get_client().unwrap().ping().await.unwrap();

    assert!(!server.commands().iter().any(|cmd| cmd[0] == "SELECT"));
}

#[tokio::test]
async fn test_url_database_is_selected() {
    let server = TestServer::start().await;
    let manager = manager();

    manager.connect(server.url(3)).await.unwrap();

    let commands = server.commands();
    assert_eq!(commands[0], vec!["SELECT".to_string(), "3".to_string()]);
}

#[tokio::test]
async fn test_client_name_is_announced() {
    let server = TestServer::start().await;
    let manager = manager();

    manager
        .connect(server.options().with_client_name("billing-worker"))
        .await
        .unwrap();

    assert!(server.commands().contains(&vec![
        "CLIENT".to_string(),
        "SETNAME".to_string(),
        "billing-worker".to_string(),
    ]));
}

#[tokio::test]
async fn test_password_authenticates() {
    let server = TestServer::start_with_password(Some("s3cret")).await;
    let manager = manager();

    manager
        .connect(server.options().with_password("s3cret"))
        .await
        .unwrap();
    let client = manager.get_client().unwrap();
    assert_eq!(client.ping().await.unwrap(), "PONG");
    assert_eq!(server.commands()[0][0], "AUTH");
}

#[tokio::test]
async fn test_wrong_password_fails_connect() {
    let server = TestServer::start_with_password(Some("s3cret")).await;
    let manager = manager();

    let err = manager
        .connect(server.options().with_password("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::ConnectFailure(_)), "got {err:?}");
    assert!(matches!(err.root_cause(), LinkError::Server(msg) if msg.contains("WRONGPASS")));

    let err = manager.get_client().unwrap_err();
    assert!(matches!(err, LinkError::Unavailable(_)), "got {err:?}");
    assert_eq!(manager.status(), LinkStatus::Failed);
}

#[tokio::test]
async fn test_connection_refused_fails_connect() {
    // Grab a free port, then close it again.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let manager = manager();
    let err = manager
        .connect(format!("redis://127.0.0.1:{port}"))
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), LinkError::Io(_)), "got {err:?}");
    assert!(matches!(manager.get_client(), Err(LinkError::Unavailable(_))));
}

#[tokio::test]
async fn test_unsupported_scheme_fails_connect() {
    let manager = manager();

    let err = manager.connect("http://127.0.0.1:6379").await.unwrap_err();
    assert!(matches!(err.root_cause(), LinkError::InvalidConfig(_)), "got {err:?}");

    let err = manager.connect("rediss://127.0.0.1:6379").await.unwrap_err();
    assert!(matches!(err.root_cause(), LinkError::InvalidConfig(_)), "got {err:?}");
}

#[tokio::test]
async fn test_server_shutdown_is_noticed() {
    let server = TestServer::start().await;
    let manager = manager();
    manager.connect(server.options()).await.unwrap();
    let client = manager.get_client().unwrap();
    // Make sure the server has accepted the socket before closing it.
    client.ping().await.unwrap();

    server.shutdown();

    let noticed = wait_for(Duration::from_secs(2), || manager.get_client().is_err()).await;
    assert!(noticed, "peer close should retire the handle");

    let err = manager.get_client().unwrap_err();
    assert!(matches!(err.root_cause(), LinkError::ConnectionClosed), "got {err:?}");
    assert!(matches!(client.ping().await, Err(LinkError::ClientClosed)));
}

#[tokio::test]
async fn test_raw_commands_and_error_replies() {
    let server = TestServer::start().await;
    server.seed("greeting", b"hello");
    let manager = manager();
    manager.connect(server.options()).await.unwrap();
    let client = manager.get_client().unwrap();

    let pong = client.command(["PING"]).await.unwrap();
    assert_eq!(pong, RespValue::SimpleString("PONG".into()));

    let value = client.command(["GET", "greeting"]).await.unwrap();
    assert_eq!(value.as_bytes(), Some(&b"hello"[..]));

    let err = client.command(["FROBNICATE"]).await.unwrap_err();
    assert!(matches!(err, LinkError::Server(ref msg) if msg.starts_with("ERR")), "got {err:?}");

    // An error reply does not break the connection.
    assert_eq!(client.ping().await.unwrap(), "PONG");
}

#[tokio::test]
async fn test_concurrent_commands_share_one_socket() {
    let server = TestServer::start().await;
    let manager = manager();
    manager.connect(server.options()).await.unwrap();
    let client = manager.get_client().unwrap();

    let writes = (0..32).map(|i| {
        let client = client.clone();
        async move {
            client
                .set_structured(&format!("n:{i}"), &i, &SetOptions::default())
                .await
        }
    });
    for result in futures::future::join_all(writes).await {
        assert_eq!(result.unwrap().as_deref(), Some("OK"));
    }

    for i in 0..32 {
        let n: Option<i32> = client.get_structured(format!("n:{i}")).await.unwrap();
        assert_eq!(n, Some(i));
    }
}

#[tokio::test]
async fn test_handle_after_disconnect_is_closed() {
    let server = TestServer::start().await;
    let manager = manager();
    manager.connect(server.options()).await.unwrap();
    let client = manager.get_client().unwrap();

    manager.disconnect().await.unwrap();

    assert!(matches!(client.ping().await, Err(LinkError::ClientClosed)));
    assert!(matches!(manager.get_client(), Err(LinkError::NotConnected)));
    assert_eq!(manager.status(), LinkStatus::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_while_quit_is_in_flight() {
    let server = TestServer::start().await;
    let manager = manager();
    manager.connect(server.options()).await.unwrap();
    let old = manager.get_client().unwrap();

    let quitting = manager.disconnect();
    manager.connect(server.options()).await.unwrap();
    quitting.await.unwrap();

    let live = manager.get_client().unwrap();
    assert!(!live.ptr_eq(&old));
    assert_eq!(live.ping().await.unwrap(), "PONG");
    assert!(matches!(old.ping().await, Err(LinkError::ClientClosed)));
}
