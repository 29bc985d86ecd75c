//! End-to-end flows against a scripted in-process server: handshake, bind,
//! message acks, timeouts, kick and reconnect.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use session::{
    MessageObserver, P2pMessage, P2tMessage, SessionConfig, StaticPeer, StatusObserver,
    TokenProvider, UserSession, UserStatus,
};
use wire::control::{BindRequest, BindResp, ConnRequest, ConnResp, ERROR_TOKEN_EXPIRE};
use wire::secmsg::{
    CompoundPayload, P2pPayload, PacketAckPayload, PacketKind, SecPacket, SequenceAckPayload,
};
use wire::{keys, FrameCmd, V6Frame, V6_CRC_LENGTH, V6_HEAD_LENGTH};

const SECURITY_KEY: &str = "sec-key";
const CHALLENGE: &str = "X";

fn server_body_key() -> [u8; keys::KEY_LENGTH] {
    keys::body_key(CHALLENGE, SECURITY_KEY)
}

fn token_bundle(token: &str) -> String {
    format!(
        r#"{{"code":200,"data":{{"appPackage":"com.example.app","miChid":9.0,"miUserId":"4711","miUserSecurityKey":"{}","token":"{}"}}}}"#,
        SECURITY_KEY, token
    )
}

// ---- scripted delegates --------------------------------------------------

struct ScriptedTokens {
    bundles: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedTokens {
    fn new(bundles: Vec<String>) -> Arc<ScriptedTokens> {
        Arc::new(ScriptedTokens {
            bundles: Mutex::new(bundles.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for ScriptedTokens {
    async fn fetch_token(&self) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bundles.lock().unwrap().pop_front()
    }
}

struct ChannelStatus {
    tx: mpsc::UnboundedSender<(bool, String)>,
}

#[async_trait]
impl StatusObserver for ChannelStatus {
    async fn handle_change(&self, online: bool, error_type: &str, _reason: &str, _desc: &str) {
        let _ = self.tx.send((online, error_type.to_string()));
    }
}

struct ChannelMessages {
    acks: mpsc::UnboundedSender<(String, i64, i64)>,
    p2p: mpsc::UnboundedSender<Vec<P2pMessage>>,
    p2t: mpsc::UnboundedSender<Vec<P2tMessage>>,
    p2p_timeouts: mpsc::UnboundedSender<P2pMessage>,
    p2t_timeouts: mpsc::UnboundedSender<P2tMessage>,
}

#[async_trait]
impl MessageObserver for ChannelMessages {
    async fn handle_server_ack(&self, packet_id: &str, sequence: i64, timestamp: i64) {
        let _ = self.acks.send((packet_id.to_string(), sequence, timestamp));
    }

    async fn handle_message(&self, messages: Vec<P2pMessage>) {
        let _ = self.p2p.send(messages);
    }

    async fn handle_group_message(&self, messages: Vec<P2tMessage>) {
        let _ = self.p2t.send(messages);
    }

    async fn handle_send_message_timeout(&self, message: P2pMessage) {
        let _ = self.p2p_timeouts.send(message);
    }

    async fn handle_send_group_message_timeout(&self, message: P2tMessage) {
        let _ = self.p2t_timeouts.send(message);
    }
}

struct MessageChannels {
    acks: mpsc::UnboundedReceiver<(String, i64, i64)>,
    p2p: mpsc::UnboundedReceiver<Vec<P2pMessage>>,
    #[allow(dead_code)]
    p2t: mpsc::UnboundedReceiver<Vec<P2tMessage>>,
    p2p_timeouts: mpsc::UnboundedReceiver<P2pMessage>,
    #[allow(dead_code)]
    p2t_timeouts: mpsc::UnboundedReceiver<P2tMessage>,
}

fn message_observer() -> (Arc<ChannelMessages>, MessageChannels) {
    let (acks_tx, acks_rx) = mpsc::unbounded_channel();
    let (p2p_tx, p2p_rx) = mpsc::unbounded_channel();
    let (p2t_tx, p2t_rx) = mpsc::unbounded_channel();
    let (p2p_to_tx, p2p_to_rx) = mpsc::unbounded_channel();
    let (p2t_to_tx, p2t_to_rx) = mpsc::unbounded_channel();

    let observer = Arc::new(ChannelMessages {
        acks: acks_tx,
        p2p: p2p_tx,
        p2t: p2t_tx,
        p2p_timeouts: p2p_to_tx,
        p2t_timeouts: p2t_to_tx,
    });
    let channels = MessageChannels {
        acks: acks_rx,
        p2p: p2p_rx,
        p2t: p2t_rx,
        p2p_timeouts: p2p_to_rx,
        p2t_timeouts: p2t_to_rx,
    };
    (observer, channels)
}

// ---- scripted server side ------------------------------------------------

async fn read_client_frame(stream: &mut TcpStream, body_key: Option<&[u8; keys::KEY_LENGTH]>) -> V6Frame {
    let mut head = [0u8; V6_HEAD_LENGTH];
    stream.read_exact(&mut head).await.unwrap();
    let body_len = V6Frame::parse_head(&head).unwrap();
    let mut body = vec![0u8; body_len];
    if body_len > 0 {
        stream.read_exact(&mut body).await.unwrap();
    }
    let mut crc = [0u8; V6_CRC_LENGTH];
    stream.read_exact(&mut crc).await.unwrap();
    V6Frame::decode(&head, &body, &crc, body_key, SECURITY_KEY).unwrap()
}

async fn send_server_frame(stream: &mut TcpStream, frame: &V6Frame, body_key: Option<&[u8; keys::KEY_LENGTH]>) {
    let bytes = frame.encode(body_key, SECURITY_KEY);
    stream.write_all(&bytes).await.unwrap();
}

/// Answers the CONN frame with the fixed challenge; returns the client's
/// handshake request (which carries its resource).
async fn serve_handshake(stream: &mut TcpStream) -> ConnRequest {
    let frame = read_client_frame(stream, None).await;
    assert_eq!(frame.cmd, FrameCmd::Conn);
    let request = ConnRequest::deser(&mut &frame.payload[..]).unwrap();

    let mut buf = BytesMut::new();
    ConnResp {
        challenge: CHALLENGE.to_string(),
    }
    .ser(&mut buf);
    send_server_frame(stream, &V6Frame::new(FrameCmd::Conn, 9000, buf.freeze()), None).await;
    request
}

async fn read_bind_request(stream: &mut TcpStream) -> BindRequest {
    let frame = read_client_frame(stream, Some(&server_body_key())).await;
    assert_eq!(frame.cmd, FrameCmd::Bind);
    BindRequest::deser(&mut &frame.payload[..]).unwrap()
}

async fn send_bind_resp(stream: &mut TcpStream, resp: BindResp) {
    let mut buf = BytesMut::new();
    resp.ser(&mut buf);
    send_server_frame(
        stream,
        &V6Frame::new(FrameCmd::Bind, 9001, buf.freeze()),
        Some(&server_body_key()),
    )
    .await;
}

async fn serve_login(listener: &TcpListener) -> (TcpStream, ConnRequest, BindRequest) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let conn_request = serve_handshake(&mut stream).await;
    let bind_request = read_bind_request(&mut stream).await;
    send_bind_resp(&mut stream, BindResp::ok()).await;
    (stream, conn_request, bind_request)
}

fn sec_packet(kind: PacketKind, packet_id: &str, sequence: i64, payload: Bytes) -> SecPacket {
    SecPacket {
        packet_id: packet_id.to_string(),
        kind,
        sequence,
        timestamp: 1_700_000_000_000,
        payload,
    }
}

async fn send_sec_packet(stream: &mut TcpStream, packet: &SecPacket) {
    send_server_frame(
        stream,
        &V6Frame::new(FrameCmd::SecMsg, 9100, packet.to_bytes()),
        Some(&server_body_key()),
    )
    .await;
}

// ---- harness -------------------------------------------------------------

struct Harness {
    session: UserSession,
    listener: TcpListener,
    tokens: Arc<ScriptedTokens>,
    status: mpsc::UnboundedReceiver<(bool, String)>,
    messages: MessageChannels,
}

async fn start_session(bundles: Vec<String>, adjust: impl FnOnce(&mut SessionConfig)) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("session-flows-{}", Uuid::new_v4().simple()));
    let mut config = SessionConfig {
        connect_retry_interval: 50,
        login_retry_interval: 50,
        ping_interval: 60_000,
        response_timeout: 10_000,
        ack_timeout: 10_000,
        resource_dir: Some(PathBuf::from(dir)),
    };
    adjust(&mut config);

    let session = UserSession::new(7, "alice", Arc::new(StaticPeer::new(addr)), config).unwrap();

    let tokens = ScriptedTokens::new(bundles);
    session.register_token_provider(tokens.clone());

    let (status_tx, status_rx) = mpsc::unbounded_channel();
    session.register_status_observer(Arc::new(ChannelStatus { tx: status_tx }));

    let (message_observer, message_channels) = message_observer();
    session.register_message_observer(message_observer);

    assert!(session.login().await);
    session.start();

    Harness {
        session,
        listener,
        tokens,
        status: status_rx,
        messages: message_channels,
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("channel closed")
}

async fn assert_no_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) {
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
}

async fn wait_for_status(session: &UserSession, expected: UserStatus) {
    timeout(Duration::from_secs(5), async {
        while session.status() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never reached the expected status");
}

// ---- scenarios -----------------------------------------------------------

#[tokio::test]
async fn test_happy_path_login() {
    let mut h = start_session(vec![token_bundle("tok-1")], |_| {}).await;

    let (_stream, conn_request, bind_request) = serve_login(&h.listener).await;

    assert_eq!(conn_request.app_id, 7);
    assert_eq!(conn_request.resource, h.session.resource());
    assert_eq!(bind_request.uuid, 4711);
    assert_eq!(bind_request.token, "tok-1");

    assert_eq!(recv(&mut h.status).await, (true, String::new()));
    assert_eq!(h.session.status(), UserStatus::Online);

    // exactly one status change
    assert_no_event(&mut h.status).await;
}

#[tokio::test]
async fn test_token_expiry_triggers_relogin() {
    let mut h = start_session(vec![token_bundle("tok-old"), token_bundle("tok-new")], |_| {}).await;

    let (mut stream, _) = h.listener.accept().await.unwrap();
    serve_handshake(&mut stream).await;

    let bind_request = read_bind_request(&mut stream).await;
    assert_eq!(bind_request.token, "tok-old");
    send_bind_resp(&mut stream, BindResp::failure(ERROR_TOKEN_EXPIRE, "expired", "")).await;

    // the failure is surfaced, and the token is refetched
    assert_eq!(recv(&mut h.status).await, (false, ERROR_TOKEN_EXPIRE.to_string()));

    // the session rebinds with the fresh token on the same connection
    let second_bind = read_bind_request(&mut stream).await;
    assert_eq!(second_bind.token, "tok-new");
    send_bind_resp(&mut stream, BindResp::ok()).await;

    assert_eq!(recv(&mut h.status).await, (true, String::new()));
    assert_eq!(h.tokens.call_count(), 2);
    assert_eq!(h.session.status(), UserStatus::Online);
}

#[tokio::test]
async fn test_p2p_send_and_server_ack() {
    let mut h = start_session(vec![token_bundle("tok-1")], |_| {}).await;
    let (mut stream, _, _) = serve_login(&h.listener).await;
    recv(&mut h.status).await;

    let packet_id = h.session.send_message("bob", &[0x01, 0x02]);
    assert!(h.session.is_awaiting_ack(&packet_id));

    let frame = read_client_frame(&mut stream, Some(&server_body_key())).await;
    assert_eq!(frame.cmd, FrameCmd::SecMsg);
    let packet = SecPacket::deser(&mut &frame.payload[..]).unwrap();
    assert_eq!(packet.kind, PacketKind::P2p);
    assert_eq!(packet.packet_id, packet_id);
    let p2p = P2pPayload::deser(&mut &packet.payload[..]).unwrap();
    assert_eq!(p2p.to_account, "bob");
    assert_eq!(p2p.body.as_ref(), &[0x01, 0x02]);

    let mut buf = BytesMut::new();
    PacketAckPayload {
        packet_id: packet_id.clone(),
        sequence: 11,
        timestamp: 22,
    }
    .ser(&mut buf);
    send_sec_packet(&mut stream, &sec_packet(PacketKind::PacketAck, &packet_id, 11, buf.freeze())).await;

    assert_eq!(recv(&mut h.messages.acks).await, (packet_id.clone(), 11, 22));
    assert!(!h.session.is_awaiting_ack(&packet_id));
    assert_eq!(h.session.pending_ack_count(), 0);
}

#[tokio::test]
async fn test_send_timeout_with_silent_server() {
    let mut h = start_session(vec![token_bundle("tok-1")], |config| {
        config.ack_timeout = 300;
    })
    .await;
    let (mut stream, _, _) = serve_login(&h.listener).await;
    recv(&mut h.status).await;

    let packet_id = h.session.send_message("bob", b"no answer");

    // the server reads the message but never acks it
    let frame = read_client_frame(&mut stream, Some(&server_body_key())).await;
    assert_eq!(frame.cmd, FrameCmd::SecMsg);

    let timed_out = recv(&mut h.messages.p2p_timeouts).await;
    assert_eq!(timed_out.packet_id, packet_id);
    assert_eq!(timed_out.from_account, "alice");
    assert!(!h.session.is_awaiting_ack(&packet_id));
}

#[tokio::test]
async fn test_kick_forces_offline() {
    let mut h = start_session(vec![token_bundle("tok-1")], |_| {}).await;
    let (mut stream, _, _) = serve_login(&h.listener).await;
    recv(&mut h.status).await;

    send_server_frame(
        &mut stream,
        &V6Frame::new(FrameCmd::Kick, 9200, Bytes::new()),
        Some(&server_body_key()),
    )
    .await;

    assert_eq!(recv(&mut h.status).await, (false, "kick".to_string()));
    assert_eq!(h.session.status(), UserStatus::Offline);
}

#[tokio::test]
async fn test_reconnect_after_connection_loss() {
    let mut h = start_session(vec![token_bundle("tok-1")], |_| {}).await;
    let (stream, _, _) = serve_login(&h.listener).await;
    recv(&mut h.status).await;

    // the connection dies; once the session notices, messages stay queued
    drop(stream);
    wait_for_status(&h.session, UserStatus::Offline).await;
    let first = h.session.send_message("bob", b"first");
    let second = h.session.send_message("bob", b"second");

    // a full reconnect: handshake, rebind, then the queue drains in order
    let (mut stream, _, _) = serve_login(&h.listener).await;
    assert_eq!(recv(&mut h.status).await, (true, String::new()));

    let frame = read_client_frame(&mut stream, Some(&server_body_key())).await;
    let packet = SecPacket::deser(&mut &frame.payload[..]).unwrap();
    assert_eq!(packet.packet_id, first);

    let frame = read_client_frame(&mut stream, Some(&server_body_key())).await;
    let packet = SecPacket::deser(&mut &frame.payload[..]).unwrap();
    assert_eq!(packet.packet_id, second);
}

#[tokio::test]
async fn test_compound_delivery_and_resource_mismatch() {
    let mut h = start_session(vec![token_bundle("tok-1")], |_| {}).await;
    let (mut stream, conn_request, _) = serve_login(&h.listener).await;
    recv(&mut h.status).await;

    let p2p_inner = |id: &str, body: &[u8]| {
        let mut buf = BytesMut::new();
        P2pPayload {
            from_account: "bob".to_string(),
            from_resource: "bobresource".to_string(),
            to_account: "alice".to_string(),
            body: Bytes::copy_from_slice(body),
        }
        .ser(&mut buf);
        sec_packet(PacketKind::P2p, id, 1, buf.freeze())
    };

    // wrong resource: silently discarded, no observer call, no ack
    let mut buf = BytesMut::new();
    CompoundPayload {
        resource: "someoneelse".to_string(),
        max_sequence: 5,
        packets: vec![p2p_inner("in-0", b"not for us")],
    }
    .ser(&mut buf);
    send_sec_packet(&mut stream, &sec_packet(PacketKind::Compound, "batch-0", 5, buf.freeze())).await;
    assert_no_event(&mut h.messages.p2p).await;

    // right resource: messages are delivered and the batch is acked
    let mut buf = BytesMut::new();
    CompoundPayload {
        resource: conn_request.resource.clone(),
        max_sequence: 7,
        packets: vec![p2p_inner("in-1", b"hello"), p2p_inner("in-2", b"again")],
    }
    .ser(&mut buf);
    send_sec_packet(&mut stream, &sec_packet(PacketKind::Compound, "batch-1", 7, buf.freeze())).await;

    let delivered = recv(&mut h.messages.p2p).await;
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].packet_id, "in-1");
    assert_eq!(delivered[0].from_account, "bob");
    assert_eq!(delivered[1].body.as_ref(), b"again");

    let ack_frame = read_client_frame(&mut stream, Some(&server_body_key())).await;
    assert_eq!(ack_frame.cmd, FrameCmd::SecMsg);
    let ack_packet = SecPacket::deser(&mut &ack_frame.payload[..]).unwrap();
    assert_eq!(ack_packet.kind, PacketKind::SequenceAck);
    let ack = SequenceAckPayload::deser(&mut &ack_packet.payload[..]).unwrap();
    assert_eq!(ack.sequence, 7);
    assert_eq!(ack.resource, conn_request.resource);
}
