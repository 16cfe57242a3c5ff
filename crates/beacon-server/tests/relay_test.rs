//! Integration tests driving real WebSocket clients and the control plane.

use beacon_protocol::{codec, Frame};
use beacon_server::Config;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

struct TestServer {
    addr: SocketAddr,
    control_addr: SocketAddr,
    http: reqwest::Client,
}

impl TestServer {
    fn ws_url(&self, format: Option<&str>) -> String {
        match format {
            Some(f) => format!("ws://{}/ws?format={}", self.addr, f),
            None => format!("ws://{}/ws", self.addr),
        }
    }

    async fn connect(&self, format: Option<&str>) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(self.ws_url(format))
            .await
            .expect("WebSocket connect failed");
        ws
    }

    async fn control_get(&self, query: &[(&str, &str)]) -> String {
        self.http
            .get(format!("http://{}/", self.control_addr))
            .query(query)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    }

    async fn control_multipart(&self, path: &str, fields: &[(&str, &str)]) -> String {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }
        self.http
            .post(format!("http://{}{}", self.control_addr, path))
            .multipart(form)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    }

    async fn control_post(&self, form: &[(&str, &str)]) -> String {
        self.http
            .post(format!("http://{}/", self.control_addr))
            .form(form)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    }
}

/// Start the server on random ports.
async fn start_test_server() -> TestServer {
    let mut config = Config::default();
    config.metrics.enabled = false;
    config.presence.tick_interval_ms = 50;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let control_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let control_addr = control_listener.local_addr().unwrap();

    tokio::spawn(async move {
        beacon_server::serve(config, listener, control_listener)
            .await
            .unwrap();
    });

    TestServer {
        addr,
        control_addr,
        http: reqwest::Client::new(),
    }
}

fn decode(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(codec::decode_json(&text).unwrap()),
        Message::Binary(data) => Some(codec::decode(&data).unwrap()),
        _ => None,
    }
}

/// Read frames until one with the given event arrives.
async fn next_event(ws: &mut Client, event: &str) -> Frame {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {}", event))
            .expect("stream ended")
            .expect("WebSocket error");
        if let Some(frame) = decode(msg) {
            if frame.event() == event {
                return frame;
            }
        }
    }
}

/// Assert no frame with the given event arrives within a short window.
async fn assert_no_event(ws: &mut Client, event: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    while let Ok(Some(Ok(msg))) = tokio::time::timeout_at(deadline, ws.next()).await {
        if let Some(frame) = decode(msg) {
            assert_ne!(frame.event(), event, "unexpected {:?}", frame);
        }
    }
}

async fn send_json(ws: &mut Client, frame: &Frame) {
    let text = codec::encode_json(frame).unwrap();
    ws.send(Message::Text(text)).await.unwrap();
}

async fn login(ws: &mut Client, uid: &str) {
    send_json(ws, &Frame::login(uid)).await;
    next_event(ws, "update_online_count").await;
}

#[tokio::test]
async fn test_connected_frame_on_connect() {
    let server = start_test_server().await;
    let mut ws = server.connect(Some("json")).await;

    match next_event(&mut ws, "connected").await {
        Frame::Connected {
            connection_id,
            version,
        } => {
            assert!(connection_id.starts_with("conn_"));
            assert_eq!(version, beacon_protocol::PROTOCOL_VERSION);
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn test_presence_counts_follow_logins() {
    let server = start_test_server().await;

    let mut a = server.connect(Some("json")).await;
    login(&mut a, "7").await;

    let mut b = server.connect(Some("json")).await;
    login(&mut b, "7").await;

    // One user, two pages.
    let expected = Frame::update_online_count("当前<b>1</b>人在线，共打开<b>2</b>个页面");
    loop {
        if next_event(&mut a, "update_online_count").await == expected {
            break;
        }
    }

    b.close(None).await.unwrap();
    let expected = Frame::update_online_count("当前<b>1</b>人在线，共打开<b>1</b>个页面");
    loop {
        if next_event(&mut a, "update_online_count").await == expected {
            break;
        }
    }
}

#[tokio::test]
async fn test_publish_to_group_is_escaped() {
    let server = start_test_server().await;
    let mut a = server.connect(Some("json")).await;
    let mut other = server.connect(Some("json")).await;
    login(&mut a, "7").await;
    login(&mut other, "8").await;

    let response = server
        .control_post(&[("type", "publish"), ("to", "7"), ("content", "<b>hi</b> & 'bye'")])
        .await;
    assert_eq!(response, "send_ok");

    assert_eq!(
        next_event(&mut a, "new_msg").await,
        Frame::new_msg("&lt;b&gt;hi&lt;/b&gt; &amp; &#039;bye&#039;")
    );
    assert_no_event(&mut other, "new_msg").await;
}

#[tokio::test]
async fn test_publish_without_target_broadcasts() {
    let server = start_test_server().await;
    let mut bound = server.connect(Some("json")).await;
    let mut unbound = server.connect(Some("json")).await;
    login(&mut bound, "7").await;
    next_event(&mut unbound, "connected").await;

    let response = server
        .control_get(&[("type", "publish"), ("content", "hello")])
        .await;
    assert_eq!(response, "send_ok");

    assert_eq!(next_event(&mut bound, "new_msg").await, Frame::new_msg("hello"));
    assert_eq!(next_event(&mut unbound, "new_msg").await, Frame::new_msg("hello"));
}

#[tokio::test]
async fn test_publish_with_multipart_body() {
    let server = start_test_server().await;
    let mut a = server.connect(Some("json")).await;
    login(&mut a, "7").await;

    let response = server
        .control_multipart("/", &[("type", "publish"), ("to", "7"), ("content", "hi")])
        .await;
    assert_eq!(response, "send_ok");
    assert_eq!(next_event(&mut a, "new_msg").await, Frame::new_msg("hi"));

    let offline = server
        .control_multipart("/", &[("type", "publish"), ("to", "42"), ("content", "hi")])
        .await;
    assert_eq!(offline, "you_are_offline");
}

#[tokio::test]
async fn test_control_answers_on_any_path() {
    let server = start_test_server().await;
    let mut a = server.connect(Some("json")).await;
    login(&mut a, "7").await;

    let response = server
        .control_multipart(
            "/push",
            &[("type", "qrcode_auth_success"), ("to", "7"), ("content", "ok")],
        )
        .await;
    assert_eq!(response, "send_ok");
    assert_eq!(
        next_event(&mut a, "qrcode_auth_success").await,
        Frame::qrcode_auth_success("ok")
    );

    let text = server
        .http
        .get(format!("http://{}/api/send", server.control_addr))
        .query(&[("type", "publish"), ("to", "42")])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "you_are_offline");
}

#[tokio::test]
async fn test_control_responses() {
    let server = start_test_server().await;

    let offline = server
        .control_get(&[("type", "publish"), ("to", "42"), ("content", "x")])
        .await;
    assert_eq!(offline, "you_are_offline");

    let missing_target = server
        .control_get(&[("type", "qrcode_auth_success"), ("content", "x")])
        .await;
    assert_eq!(missing_target, "params_error");

    let empty_target = server
        .control_post(&[("type", "qrcode_auth_success"), ("to", ""), ("content", "x")])
        .await;
    assert_eq!(empty_target, "params_error");

    let unknown = server.control_get(&[("type", "delete_all")]).await;
    assert_eq!(unknown, "send_fail");

    let nothing = server.control_get(&[]).await;
    assert_eq!(nothing, "send_fail");
}

#[tokio::test]
async fn test_qrcode_auth_success_reaches_group() {
    let server = start_test_server().await;
    let mut a = server.connect(Some("json")).await;
    login(&mut a, "0").await;

    let response = server
        .control_post(&[("type", "qrcode_auth_success"), ("to", "0"), ("content", "token")])
        .await;
    assert_eq!(response, "send_ok");
    assert_eq!(
        next_event(&mut a, "qrcode_auth_success").await,
        Frame::qrcode_auth_success("token")
    );
}

#[tokio::test]
async fn test_target_offline_after_disconnect() {
    let server = start_test_server().await;
    let mut a = server.connect(Some("json")).await;
    login(&mut a, "7").await;

    let online = server
        .control_get(&[("type", "publish"), ("to", "7"), ("content", "x")])
        .await;
    assert_eq!(online, "send_ok");

    a.close(None).await.unwrap();
    drop(a);

    let mut response = String::new();
    for _ in 0..50 {
        response = server
            .control_get(&[("type", "publish"), ("to", "7"), ("content", "x")])
            .await;
        if response == "you_are_offline" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(response, "you_are_offline");
}

#[tokio::test]
async fn test_get_ip_prefers_forwarded_header() {
    let server = start_test_server().await;

    let mut direct = server.connect(Some("json")).await;
    send_json(&mut direct, &Frame::GetIp).await;
    assert_eq!(
        next_event(&mut direct, "get_ip_from_server").await,
        Frame::GetIpFromServer("127.0.0.1".into())
    );

    let mut request = server.ws_url(Some("json")).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.5".parse().unwrap());
    let (mut proxied, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    send_json(&mut proxied, &Frame::GetIp).await;
    assert_eq!(
        next_event(&mut proxied, "get_ip_from_server").await,
        Frame::GetIpFromServer("203.0.113.5".into())
    );
}

#[tokio::test]
async fn test_qr_code_over_messagepack() {
    let server = start_test_server().await;
    let mut ws = server.connect(None).await;

    let request = codec::encode(&Frame::QrCodeGenerator("https://example.com".into())).unwrap();
    ws.send(Message::Binary(request.to_vec())).await.unwrap();

    match next_event(&mut ws, "qr_code_generator_from_server").await {
        Frame::QrCodeGeneratorFromServer(png) => assert_eq!(&png[..8], &PNG_MAGIC),
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn test_health_reports_presence() {
    let server = start_test_server().await;
    let mut ws = server.connect(Some("json")).await;
    login(&mut ws, "7").await;

    let mut body = serde_json::Value::Null;
    for _ in 0..50 {
        let text = server
            .http
            .get(format!("http://{}/health", server.addr))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        body = serde_json::from_str(&text).unwrap();
        if body["presence"]["users"] == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(body["status"], "ok");
    assert_eq!(body["presence"]["users"], 1);
    assert_eq!(body["presence"]["connections"], 1);
    assert_eq!(body["hub"]["connections"], 1);
    assert_eq!(body["hub"]["bound_connections"], 1);
    assert_eq!(body["hub"]["users"], 1);
}
