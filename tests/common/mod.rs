#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hyper::{Body, Client, Method, Request, Response, Uri};
use serial_tether::{
    config::Config,
    mock::{AlwaysUp, MockRestart, MockSerial, MockSerialHandle, PinEvent, RecordingPin},
    serial::SerialCommand,
    server::{App, Ports},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// A full server running against fabricated hardware.
pub struct Rig {
    pub ports: Ports,
    pub wire: MockSerialHandle,
    pub reset_pin: mpsc::UnboundedReceiver<PinEvent>,
    pub shutdown_pin: mpsc::UnboundedReceiver<PinEvent>,
    pub restart: Arc<MockRestart>,
}

pub async fn start_server() -> Rig {
    let (serial, wire) = MockSerial::start();
    let (reset, reset_pin) = RecordingPin::new();
    let (shutdown, shutdown_pin) = RecordingPin::new();
    let restart = Arc::new(MockRestart::default());

    let app = App::with_parts(
        Config::default(),
        serial,
        Box::new(reset),
        Box::new(shutdown),
        restart.clone(),
        Arc::new(AlwaysUp),
    );

    let (ports_sender, ports_receiver) = oneshot::channel();
    tokio::spawn(async move { app.run_any_port(ports_sender).await });

    let ports = ports_receiver
        .await
        .expect("Server should reply with allocated ports");

    Rig {
        ports,
        wire,
        reset_pin,
        shutdown_pin,
        restart,
    }
}

pub async fn connect_bridge(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("Bridge port should accept")
}

/// Give spawned tasks (accept, registration) a moment to catch up.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub async fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buffer = vec![0_u8; n];

    timeout(Duration::from_secs(5), stream.read_exact(&mut buffer))
        .await
        .expect("Read should not time out")
        .expect("Read should succeed");

    buffer
}

/// Assert that nothing arrives on the stream for a little while.
pub async fn expect_silence(stream: &mut TcpStream) {
    let mut buffer = [0_u8; 1];

    let read = timeout(Duration::from_millis(200), stream.read(&mut buffer)).await;

    assert!(read.is_err(), "Expected no bytes, got some");
}

pub async fn send(stream: &mut TcpStream, bytes: &[u8]) {
    stream
        .write_all(bytes)
        .await
        .expect("Write should succeed");
}

pub async fn next_command(wire: &mut MockSerialHandle) -> SerialCommand {
    timeout(Duration::from_secs(5), wire.commands.recv())
        .await
        .expect("A command should arrive")
        .expect("Mock wire should stay open")
}

pub async fn next_pin_event(pin: &mut mpsc::UnboundedReceiver<PinEvent>) -> PinEvent {
    timeout(Duration::from_secs(5), pin.recv())
        .await
        .expect("A pin transition should arrive")
        .expect("Pin should stay recorded")
}

pub async fn http_request(port: u16, method: Method, path: &str) -> Response<Body> {
    let uri: Uri = format!("http://127.0.0.1:{port}{path}").parse().unwrap();
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    timeout(Duration::from_secs(5), Client::new().request(request))
        .await
        .expect("HTTP request should not time out")
        .expect("HTTP request should succeed")
}

pub async fn http_get(port: u16, path: &str) -> Response<Body> {
    http_request(port, Method::GET, path).await
}
