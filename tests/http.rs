use std::time::Duration;

use common::{http_get, http_request, next_pin_event, start_server};
use hyper::{header, Method, StatusCode};
use pretty_assertions::assert_eq;
use serial_tether::gpio::{Level, HOLD};
use tokio::time::timeout;

mod common;

#[tokio::test]
async fn reset_pulses_the_reset_pin() {
    let mut rig = start_server().await;

    let response = http_get(rig.ports.http, "/reset").await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get(header::CONNECTION).unwrap(),
        "close"
    );

    let low = next_pin_event(&mut rig.reset_pin).await;
    let high = next_pin_event(&mut rig.reset_pin).await;

    assert_eq!(low.level, Level::Low);
    assert_eq!(high.level, Level::High);
    assert!(high.at - low.at >= HOLD);
}

#[tokio::test]
async fn pulse_endpoints_accept_post_as_well() {
    let mut rig = start_server().await;

    let response = http_request(rig.ports.http, Method::POST, "/reset").await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(next_pin_event(&mut rig.reset_pin).await.level, Level::Low);
    assert_eq!(next_pin_event(&mut rig.reset_pin).await.level, Level::High);
}

#[tokio::test]
async fn shutdown_and_wake_up_share_the_shutdown_pin() {
    let mut rig = start_server().await;

    let response = http_get(rig.ports.http, "/shutdown").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        next_pin_event(&mut rig.shutdown_pin).await.level,
        Level::Low
    );
    assert_eq!(
        next_pin_event(&mut rig.shutdown_pin).await.level,
        Level::High
    );

    let response = http_get(rig.ports.http, "/wake-up").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        next_pin_event(&mut rig.shutdown_pin).await.level,
        Level::Low
    );
    assert_eq!(
        next_pin_event(&mut rig.shutdown_pin).await.level,
        Level::High
    );

    // The reset pin never moved.
    assert!(rig.reset_pin.try_recv().is_err());
}

#[tokio::test]
async fn repeated_shutdown_calls_each_pulse_once() {
    let mut rig = start_server().await;

    for _ in 0..2 {
        http_get(rig.ports.http, "/shutdown").await;

        let low = next_pin_event(&mut rig.shutdown_pin).await;
        let high = next_pin_event(&mut rig.shutdown_pin).await;

        assert_eq!(low.level, Level::Low);
        assert_eq!(high.level, Level::High);
        assert!(high.at - low.at >= HOLD);
    }

    // Exactly one cycle per call; nothing queued up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rig.shutdown_pin.try_recv().is_err());
}

#[tokio::test]
async fn reboot_endpoint_invokes_the_restart() {
    let rig = start_server().await;

    http_get(rig.ports.http, "/reset-esp32").await;

    timeout(Duration::from_secs(5), rig.restart.wait())
        .await
        .expect("Restart should have been requested");

    assert_eq!(rig.restart.restarts(), 1);
}

#[tokio::test]
async fn there_is_no_document_root() {
    let rig = start_server().await;

    let response = http_get(rig.ports.http, "/").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
