use common::{
    connect_bridge, expect_silence, next_command, read_exact, send, settle, start_server,
};
use pretty_assertions::assert_eq;
use serial_tether::serial::SerialCommand;

mod common;

#[tokio::test]
async fn client_bytes_echo_back_and_reach_the_wire() {
    let mut rig = start_server().await;

    let mut client = connect_bridge(rig.ports.bridge).await;
    send(&mut client, b"AT\r\n").await;

    // The echo-back is part of the bridge's contract.
    assert_eq!(read_exact(&mut client, 4).await, b"AT\r\n");

    // And the same bytes went on the wire, flushed immediately.
    assert_eq!(
        next_command(&mut rig.wire).await,
        SerialCommand::Write(b"AT\r\n".to_vec())
    );
    assert_eq!(next_command(&mut rig.wire).await, SerialCommand::Flush);
}

#[tokio::test]
async fn wire_bytes_broadcast_to_all_clients() {
    let rig = start_server().await;

    let mut first = connect_bridge(rig.ports.bridge).await;
    let mut second = connect_bridge(rig.ports.bridge).await;
    settle().await;

    rig.wire.inject(b"OK\r\n");

    assert_eq!(read_exact(&mut first, 4).await, b"OK\r\n");
    assert_eq!(read_exact(&mut second, 4).await, b"OK\r\n");
}

#[tokio::test]
async fn wire_chunks_arrive_concatenated_in_order() {
    let rig = start_server().await;

    let mut client = connect_bridge(rig.ports.bridge).await;
    settle().await;

    rig.wire.inject(b"one");
    rig.wire.inject(b"two");
    rig.wire.inject(b"three");

    assert_eq!(read_exact(&mut client, 11).await, b"onetwothree");
}

#[tokio::test]
async fn wire_bytes_before_any_client_are_dropped() {
    let rig = start_server().await;

    rig.wire.inject(b"early");
    settle().await;

    let mut client = connect_bridge(rig.ports.bridge).await;
    settle().await;

    rig.wire.inject(b"later");

    assert_eq!(read_exact(&mut client, 5).await, b"later");
    expect_silence(&mut client).await;
}

#[tokio::test]
async fn echo_stays_private_to_the_sending_client() {
    let mut rig = start_server().await;

    let mut talker = connect_bridge(rig.ports.bridge).await;
    let mut bystander = connect_bridge(rig.ports.bridge).await;
    settle().await;

    send(&mut talker, b"AT\r\n").await;

    assert_eq!(read_exact(&mut talker, 4).await, b"AT\r\n");
    expect_silence(&mut bystander).await;

    // The wire still saw the bytes.
    assert_eq!(
        next_command(&mut rig.wire).await,
        SerialCommand::Write(b"AT\r\n".to_vec())
    );
}

#[tokio::test]
async fn disconnected_client_does_not_stop_the_broadcast() {
    let rig = start_server().await;

    let leaver = connect_bridge(rig.ports.bridge).await;
    let mut stayer = connect_bridge(rig.ports.bridge).await;
    settle().await;

    drop(leaver);
    settle().await;

    rig.wire.inject(b"still here\r\n");

    assert_eq!(read_exact(&mut stayer, 12).await, b"still here\r\n");
}
