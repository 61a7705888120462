//! Bus integration tests
//!
//! Runs servers and clients against each other over in-process services and
//! loopback TCP.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;

use rb_bus::{
    BusContext, BusError, CallError, Client, ClientHandler, ConnectionError, Event, Reply,
    ReplyHandle, Selector, Server, ServerHandler, SessionId, StatusCode, SubscribeItem,
    MAX_PAYLOAD_SIZE,
};
use rb_core::config::EndpointConfig;

const PING: u32 = 1;
/// Handler drops the reply handle without answering
const SILENT: u32 = 2;
/// Handler keeps the reply handle and never answers
const HANG: u32 = 3;
const FAIL: u32 = 4;
/// Handler broadcasts `NOTIFY_EVENT` to the caller and releases the handle
const NOTIFY: u32 = 5;
const NOTIFY_EVENT: u32 = 100;

const WAIT: Duration = Duration::from_secs(2);

static SERVICE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Unique service name for this test
fn service_url() -> String {
    format!(
        "svc://test-{}",
        SERVICE_COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

#[derive(Debug, Clone, PartialEq)]
enum ServerEvent {
    Online(SessionId, bool),
    Offline(SessionId, bool),
    Invoke(u32, Bytes),
    Subscribed(SessionId, Vec<SubscribeItem>),
}

struct TestServer {
    events: mpsc::UnboundedSender<ServerEvent>,
    held: Mutex<Vec<ReplyHandle>>,
    /// Initial value sent to new subscribers when set
    initial: Option<(u32, Bytes)>,
}

#[async_trait]
impl ServerHandler for TestServer {
    async fn on_online(&self, session: SessionId, is_first: bool) {
        let _ = self.events.send(ServerEvent::Online(session, is_first));
    }

    async fn on_offline(&self, session: SessionId, is_last: bool) {
        let _ = self.events.send(ServerEvent::Offline(session, is_last));
    }

    async fn on_invoke(
        &self,
        _session: SessionId,
        code: u32,
        payload: Bytes,
        mut reply: ReplyHandle,
    ) {
        let _ = self.events.send(ServerEvent::Invoke(code, payload.clone()));
        match code {
            PING => reply.reply(Bytes::from_static(b"pong")).unwrap(),
            SILENT => {}
            HANG => self.held.lock().push(reply),
            FAIL => reply
                .fail(StatusCode::NOT_IMPLEMENTED, Some("nope".to_string()))
                .unwrap(),
            NOTIFY => {
                let _ = reply.broadcast(NOTIFY_EVENT, None, payload);
                let _ = reply.destroy();
            }
            _ => {
                if reply.expects_reply() {
                    reply.reply(payload).unwrap();
                }
            }
        }
    }

    async fn on_subscribe(
        &self,
        session: SessionId,
        items: Vec<SubscribeItem>,
        mut reply: ReplyHandle,
    ) {
        if let Some((code, payload)) = &self.initial {
            let topic = items.first().and_then(|item| item.topic.clone());
            let _ = reply.broadcast(*code, topic.as_deref(), payload.clone());
        }
        let _ = self.events.send(ServerEvent::Subscribed(session, items));
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ClientEvent {
    Online(SessionId),
    Offline(SessionId),
    Reply(Reply),
    GetEvent(Reply),
    Broadcast(Event),
}

struct TestClient {
    events: mpsc::UnboundedSender<ClientEvent>,
}

#[async_trait]
impl ClientHandler for TestClient {
    async fn on_online(&self, session: SessionId) {
        let _ = self.events.send(ClientEvent::Online(session));
    }

    async fn on_offline(&self, session: SessionId) {
        let _ = self.events.send(ClientEvent::Offline(session));
    }

    async fn on_reply(&self, _session: SessionId, reply: Reply) {
        let _ = self.events.send(ClientEvent::Reply(reply));
    }

    async fn on_get_event(&self, _session: SessionId, reply: Reply) {
        let _ = self.events.send(ClientEvent::GetEvent(reply));
    }

    async fn on_broadcast(&self, _session: SessionId, event: Event) {
        let _ = self.events.send(ClientEvent::Broadcast(event));
    }
}

fn server_with(
    ctx: &BusContext,
    config: EndpointConfig,
    initial: Option<(u32, Bytes)>,
) -> (Server, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = Arc::new(TestServer {
        events: tx,
        held: Mutex::new(Vec::new()),
        initial,
    });
    (Server::with_config(ctx, "test-server", handler, config), rx)
}

fn server(ctx: &BusContext) -> (Server, mpsc::UnboundedReceiver<ServerEvent>) {
    server_with(ctx, EndpointConfig::default(), None)
}

fn caching_server(ctx: &BusContext) -> (Server, mpsc::UnboundedReceiver<ServerEvent>) {
    let config = EndpointConfig {
        event_cache: true,
        ..Default::default()
    };
    server_with(ctx, config, None)
}

fn client(ctx: &BusContext) -> (Client, mpsc::UnboundedReceiver<ClientEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Client::new(ctx, "test-client", Arc::new(TestClient { events: tx })),
        rx,
    )
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("Timed out waiting for event")
        .expect("Event channel closed")
}

/// Next client event that is not a session change
async fn next_message(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    loop {
        match next(rx).await {
            ClientEvent::Online(_) | ClientEvent::Offline(_) => continue,
            other => return other,
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Condition not reached");
}

#[tokio::test]
async fn test_invoke_ping_pong_over_service() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&url).await.unwrap();
    assert!(client.is_online());

    let reply = client
        .invoke_sync(PING, Bytes::from_static(b"ping"), WAIT)
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.payload, Bytes::from_static(b"pong"));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_invoke_over_tcp() {
    let ctx = BusContext::start();
    let (server, _server_events) = server(&ctx);
    let address = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&address.to_string()).await.unwrap();

    let reply = client
        .invoke_sync(42, Bytes::from_static(b"echo me"), WAIT)
        .await
        .unwrap();
    assert_eq!(reply.into_result().unwrap(), Bytes::from_static(b"echo me"));
}

#[tokio::test]
async fn test_invoke_async_delivers_reply_with_token() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, mut events) = client(&ctx);
    client.connect(&url).await.unwrap();

    let call_id = client
        .invoke_async(PING, Bytes::new(), WAIT, Some(77))
        .unwrap();
    match next_message(&mut events).await {
        ClientEvent::Reply(reply) => {
            assert_eq!(reply.call_id, call_id);
            assert_eq!(reply.token, Some(77));
            assert_eq!(reply.payload, Bytes::from_static(b"pong"));
        }
        other => panic!("Unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_invoke_times_out() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&url).await.unwrap();

    let reply = client
        .invoke_sync(HANG, Bytes::new(), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::TIMEOUT);
    assert_eq!(reply.into_result(), Err(CallError::Timeout { code: HANG }));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_unanswered_invoke_auto_replies() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&url).await.unwrap();

    let reply = client.invoke_sync(SILENT, Bytes::new(), WAIT).await.unwrap();
    assert_eq!(reply.status, StatusCode::AUTO_REPLY_OK);
    assert!(reply.is_ok());
}

#[tokio::test]
async fn test_invoke_answered_only_by_broadcast_auto_replies() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, mut events) = client(&ctx);
    client.connect(&url).await.unwrap();

    // Not subscribed: the broadcast goes nowhere but the caller is answered
    let reply = timeout(
        WAIT,
        client.invoke_sync(NOTIFY, Bytes::from_static(b"x"), Duration::ZERO),
    )
    .await
    .expect("Caller was never answered")
    .unwrap();
    assert_eq!(reply.status, StatusCode::AUTO_REPLY_OK);

    client
        .subscribe_sync(&[SubscribeItem::event(NOTIFY_EVENT, None)], WAIT)
        .await
        .unwrap();
    let reply = client
        .invoke_sync(NOTIFY, Bytes::from_static(b"y"), WAIT)
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::AUTO_REPLY_OK);
    assert_eq!(
        next_message(&mut events).await,
        ClientEvent::Broadcast(Event::new(NOTIFY_EVENT, None, Bytes::from_static(b"y")))
    );
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_oversized_invoke_fails_only_that_call() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&url).await.unwrap();
    client.invoke_async(HANG, Bytes::new(), WAIT, None).unwrap();

    let huge = Bytes::from(vec![0u8; MAX_PAYLOAD_SIZE + 1]);
    let reply = client.invoke_sync(7, huge.clone(), WAIT).await.unwrap();
    assert_eq!(reply.status, StatusCode::BAD_PARAMETER);
    assert!(matches!(
        client.publish(NOTIFY_EVENT, None, huge.clone(), false),
        Err(BusError::Protocol(_))
    ));

    client
        .subscribe_sync(&[SubscribeItem::event(NOTIFY_EVENT, None)], WAIT)
        .await
        .unwrap();
    assert_eq!(server.broadcast(NOTIFY_EVENT, None, huge), 0);
    assert_eq!(server.broadcast(NOTIFY_EVENT, None, vec![1]), 1);

    assert!(client.is_online());
    assert_eq!(client.pending_calls(), 1);
    let reply = client
        .invoke_sync(PING, Bytes::new(), WAIT)
        .await
        .unwrap();
    assert_eq!(reply.payload, Bytes::from_static(b"pong"));
}

#[tokio::test]
async fn test_failed_invoke_carries_status() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&url).await.unwrap();

    let reply = client.invoke_sync(FAIL, Bytes::new(), WAIT).await.unwrap();
    assert_eq!(
        reply.into_result(),
        Err(CallError::Failed {
            code: FAIL,
            status: StatusCode::NOT_IMPLEMENTED,
            description: Some("nope".to_string()),
        })
    );
}

#[tokio::test]
async fn test_pending_call_fails_when_server_goes_away() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, mut server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, mut events) = client(&ctx);
    let session = client.connect(&url).await.unwrap();
    assert_eq!(next(&mut events).await, ClientEvent::Online(session));

    let call_id = client
        .invoke_async(HANG, Bytes::new(), Duration::ZERO, None)
        .unwrap();
    loop {
        if let ServerEvent::Invoke(HANG, _) = next(&mut server_events).await {
            break;
        }
    }

    server.unbind().await.unwrap();

    assert_eq!(next(&mut events).await, ClientEvent::Offline(session));
    match next(&mut events).await {
        ClientEvent::Reply(reply) => {
            assert_eq!(reply.call_id, call_id);
            assert_eq!(reply.status, StatusCode::PEER_VANISH);
        }
        other => panic!("Unexpected event {:?}", other),
    }
    assert!(!client.is_online());
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_one_way_send_reaches_handler() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, mut server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&url).await.unwrap();
    client.send(9, Bytes::from_static(b"fire")).unwrap();

    loop {
        if let ServerEvent::Invoke(code, payload) = next(&mut server_events).await {
            assert_eq!(code, 9);
            assert_eq!(payload, Bytes::from_static(b"fire"));
            break;
        }
    }
}

#[tokio::test]
async fn test_broadcast_reaches_matching_topic_only() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, mut events) = client(&ctx);
    client.connect(&url).await.unwrap();
    let ack = client
        .subscribe_sync(&[SubscribeItem::event(100, Some("t1"))], WAIT)
        .await
        .unwrap();
    assert_eq!(ack.status, StatusCode::SUBSCRIBE_OK);

    assert_eq!(server.broadcast(100, Some("t2"), vec![0xff]), 0);
    assert_eq!(server.broadcast(100, None, vec![0xff]), 0);
    assert_eq!(server.broadcast(100, Some("t1"), vec![0x01, 0x02]), 1);

    assert_eq!(
        next_message(&mut events).await,
        ClientEvent::Broadcast(Event::new(
            100,
            Some("t1".to_string()),
            Bytes::from_static(&[0x01, 0x02])
        ))
    );
}

#[tokio::test]
async fn test_group_subscription_matches_every_event_of_group() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, mut events) = client(&ctx);
    client.connect(&url).await.unwrap();
    client
        .subscribe_sync(&[SubscribeItem::group(3, None)], WAIT)
        .await
        .unwrap();

    let inside = Selector::make_event(3, 17);
    let outside = Selector::make_event(4, 17);
    assert_eq!(server.broadcast(outside, None, Bytes::new()), 0);
    assert_eq!(server.broadcast(inside, None, Bytes::from_static(b"x")), 1);

    match next_message(&mut events).await {
        ClientEvent::Broadcast(event) => assert_eq!(event.code, inside),
        other => panic!("Unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    let session = client.connect(&url).await.unwrap();
    let item = SubscribeItem::event(100, Some("t1"));
    client.subscribe_sync(&[item.clone()], WAIT).await.unwrap();
    assert!(server.subscriptions().is_subscribed(session, 100, Some("t1")));

    client.unsubscribe(&[item]).unwrap();
    wait_until(|| !server.subscriptions().is_subscribed(session, 100, Some("t1"))).await;
    assert_eq!(server.broadcast(100, Some("t1"), Bytes::new()), 0);
}

#[tokio::test]
async fn test_subscribe_handler_sends_initial_value() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, mut server_events) = server_with(
        &ctx,
        EndpointConfig::default(),
        Some((100, Bytes::from_static(b"init"))),
    );
    server.bind(&url).await.unwrap();

    let (client, mut events) = client(&ctx);
    let session = client.connect(&url).await.unwrap();
    let ack = client
        .subscribe_sync(&[SubscribeItem::event(100, Some("t1"))], WAIT)
        .await
        .unwrap();
    assert_eq!(ack.status, StatusCode::SUBSCRIBE_OK);

    assert_eq!(
        next_message(&mut events).await,
        ClientEvent::Broadcast(Event::new(
            100,
            Some("t1".to_string()),
            Bytes::from_static(b"init")
        ))
    );
    loop {
        if let ServerEvent::Subscribed(from, items) = next(&mut server_events).await {
            assert_eq!(from, session);
            assert_eq!(items, vec![SubscribeItem::event(100, Some("t1"))]);
            break;
        }
    }
}

#[tokio::test]
async fn test_cache_suppresses_unchanged_publish() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = caching_server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, mut events) = client(&ctx);
    client.connect(&url).await.unwrap();
    client
        .subscribe_sync(&[SubscribeItem::event(100, Some("t1"))], WAIT)
        .await
        .unwrap();

    client.publish(100, Some("t1"), vec![1], false).unwrap();
    client.publish(100, Some("t1"), vec![1], false).unwrap();
    client.publish(100, Some("t1"), vec![1], true).unwrap();
    client.publish(100, Some("t1"), vec![2], false).unwrap();

    let mut payloads = Vec::new();
    for _ in 0..3 {
        match next_message(&mut events).await {
            ClientEvent::Broadcast(event) => payloads.push(event.payload.to_vec()),
            other => panic!("Unexpected event {:?}", other),
        }
    }
    assert_eq!(payloads, vec![vec![1], vec![1], vec![2]]);
}

#[tokio::test]
async fn test_late_subscriber_receives_cached_value() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = caching_server(&ctx);
    server.bind(&url).await.unwrap();

    assert_eq!(server.broadcast(100, Some("t1"), vec![9]), 0);
    assert!(server.init_event_cache(101, None, vec![7], false));

    let (client, mut events) = client(&ctx);
    client.connect(&url).await.unwrap();
    client
        .subscribe_sync(
            &[
                SubscribeItem::event(100, Some("t1")),
                SubscribeItem::event(101, None),
            ],
            WAIT,
        )
        .await
        .unwrap();

    assert_eq!(
        next_message(&mut events).await,
        ClientEvent::Broadcast(Event::new(100, Some("t1".to_string()), Bytes::from_static(&[9])))
    );
    assert_eq!(
        next_message(&mut events).await,
        ClientEvent::Broadcast(Event::new(101, None, Bytes::from_static(&[7])))
    );
}

#[tokio::test]
async fn test_get_event_from_cache() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = caching_server(&ctx);
    server.bind(&url).await.unwrap();
    server.broadcast(100, Some("t1"), vec![5, 6]);

    let (client, mut events) = client(&ctx);
    client.connect(&url).await.unwrap();

    let reply = client.get_sync(100, Some("t1"), WAIT).await.unwrap();
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.topic.as_deref(), Some("t1"));
    assert_eq!(reply.payload, Bytes::from_static(&[5, 6]));

    let missing = client.get_sync(101, None, WAIT).await.unwrap();
    assert_eq!(missing.status, StatusCode::NON_EXIST);

    client.get_async(100, Some("t1"), WAIT, Some(3)).unwrap();
    match next_message(&mut events).await {
        ClientEvent::GetEvent(reply) => {
            assert_eq!(reply.token, Some(3));
            assert_eq!(reply.payload, Bytes::from_static(&[5, 6]));
        }
        other => panic!("Unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_first_and_last_session_flags() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, mut server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (first, _first_events) = client(&ctx);
    let (second, _second_events) = client(&ctx);
    first.connect(&url).await.unwrap();
    let first_id = match next(&mut server_events).await {
        ServerEvent::Online(id, is_first) => {
            assert!(is_first);
            id
        }
        other => panic!("Unexpected event {:?}", other),
    };
    second.connect(&url).await.unwrap();
    let second_id = match next(&mut server_events).await {
        ServerEvent::Online(id, is_first) => {
            assert!(!is_first);
            id
        }
        other => panic!("Unexpected event {:?}", other),
    };
    assert_ne!(first_id, second_id);

    first.disconnect().await.unwrap();
    assert_eq!(
        next(&mut server_events).await,
        ServerEvent::Offline(first_id, false)
    );
    second.disconnect().await.unwrap();
    assert_eq!(
        next(&mut server_events).await,
        ServerEvent::Offline(second_id, true)
    );
    wait_until(|| server.sessions().is_empty()).await;
}

#[tokio::test]
async fn test_disconnect_drops_server_subscriptions() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&url).await.unwrap();
    client
        .subscribe_sync(&[SubscribeItem::group(1, None)], WAIT)
        .await
        .unwrap();
    assert_eq!(server.subscriptions().session_count(), 1);

    client.disconnect().await.unwrap();
    wait_until(|| server.subscriptions().is_empty()).await;
    assert!(matches!(
        client.disconnect().await,
        Err(BusError::Connection(ConnectionError::NotConnected))
    ));
}

#[tokio::test]
async fn test_session_limit_refuses_extra_client() {
    let ctx = BusContext::start();
    let url = service_url();
    let config = EndpointConfig {
        max_sessions: Some(1),
        ..Default::default()
    };
    let (server, _server_events) = server_with(&ctx, config, None);
    server.bind(&url).await.unwrap();

    let (first, _first_events) = client(&ctx);
    first.connect(&url).await.unwrap();

    let (second, _second_events) = client(&ctx);
    let result = second.connect(&url).await;
    assert!(matches!(
        result,
        Err(BusError::Connection(ConnectionError::Refused(_)))
    ));
    assert!(second.session_id().is_none());
}

#[tokio::test]
async fn test_bind_errors() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    assert!(matches!(
        server.bind(&service_url()).await,
        Err(BusError::Connection(ConnectionError::AlreadyBound))
    ));

    let (other, _other_events) = crate::server(&ctx);
    assert!(matches!(
        other.bind(&url).await,
        Err(BusError::Connection(ConnectionError::AddressInUse(_)))
    ));

    server.unbind().await.unwrap();
    other.bind(&url).await.unwrap();
    assert!(matches!(
        server.unbind().await,
        Err(BusError::Connection(ConnectionError::NotBound))
    ));
}

#[tokio::test]
async fn test_connect_errors() {
    let ctx = BusContext::start();
    let (client, _events) = client(&ctx);

    assert!(matches!(
        client.connect("svc://nobody").await,
        Err(BusError::Connection(ConnectionError::ServiceNotFound(_)))
    ));
    assert!(matches!(
        client.connect("udp://nowhere").await,
        Err(BusError::Connection(ConnectionError::InvalidAddress(_)))
    ));
    assert!(matches!(
        client.invoke_sync(PING, Bytes::new(), WAIT).await,
        Err(BusError::Connection(ConnectionError::NotConnected))
    ));

    ctx.shutdown();
    assert!(matches!(
        client.connect(&service_url()).await,
        Err(BusError::Connection(ConnectionError::ContextStopped))
    ));
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let ctx = BusContext::start();
    let url = service_url();
    let (server, _server_events) = server(&ctx);
    server.bind(&url).await.unwrap();

    let (client, _events) = client(&ctx);
    client.connect(&url).await.unwrap();
    assert!(matches!(
        client.connect(&url).await,
        Err(BusError::Connection(ConnectionError::AlreadyConnected))
    ));
}
