use beatclockrs::config::OscSettings;
use beatclockrs::event_loop::{Command, TransportAction};
use beatclockrs::remote::{OscNotifier, RemoteGateway};
use beatclockrs::transport::StatusNotifier;
use beatclockrs::{ShutdownFlag, TransportStatus};
use crossbeam::channel;
use rosc::{OscMessage, OscPacket, OscType};
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

fn loopback_settings() -> OscSettings {
    OscSettings {
        enabled: true,
        listen_ip: "127.0.0.1".to_string(),
        listen_port: 0,
        send_ip: "127.0.0.1".to_string(),
        send_port: 9000,
        address_prefix: "/beatclock".to_string(),
    }
}

fn notifier_settings(port: u16, prefix: &str) -> OscSettings {
    OscSettings {
        send_port: port,
        address_prefix: prefix.to_string(),
        ..loopback_settings()
    }
}

fn spawn_gateway(
    settings: &OscSettings,
) -> (
    std::net::SocketAddr,
    channel::Receiver<Command>,
    ShutdownFlag,
    thread::JoinHandle<()>,
) {
    let gateway = RemoteGateway::bind(settings).unwrap();
    let addr = gateway.local_addr().unwrap();
    let (tx, rx) = channel::unbounded();
    let shutdown = ShutdownFlag::new();
    let flag = shutdown.clone();
    let handle = thread::spawn(move || gateway.run(tx, flag));
    (addr, rx, shutdown, handle)
}

fn encode(addr: &str, args: Vec<OscType>) -> Vec<u8> {
    rosc::encoder::encode(&OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    }))
    .unwrap()
}

#[test]
fn test_gateway_forwards_commands() {
    let (addr, rx, shutdown, handle) = spawn_gateway(&loopback_settings());

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender
        .send_to(&encode("/beatclock/bpm/set", vec![OscType::String("x".into())]), addr)
        .unwrap();
    sender
        .send_to(&encode("/beatclock/play", vec![]), addr)
        .unwrap();
    sender
        .send_to(&encode("/beatclock/bpm/set", vec![OscType::Float(98.0)]), addr)
        .unwrap();
    sender.send_to(b"not osc", addr).unwrap();

    let timeout = Duration::from_secs(1);
    assert_eq!(
        rx.recv_timeout(timeout).unwrap(),
        Command::Transport(TransportAction::Play)
    );
    assert_eq!(rx.recv_timeout(timeout).unwrap(), Command::SetTempo(98.0));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    shutdown.trigger();
    handle.join().expect("listener thread panicked");
}

#[test]
fn test_notifier_sends_status_and_tempo() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(1)))
        .unwrap();
    let port = receiver.local_addr().unwrap().port();

    let notifier = OscNotifier::new(&notifier_settings(port, "/beatclock")).unwrap();
    notifier.status_changed(TransportStatus::Paused);
    notifier.tempo_changed(133.0);

    let mut buf = [0u8; 1024];
    let mut next = || {
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        match rosc::decoder::decode_udp(&buf[..len]).unwrap().1 {
            OscPacket::Message(msg) => msg,
            other => panic!("unexpected packet {:?}", other),
        }
    };

    let status = next();
    assert_eq!(status.addr, "/beatclock/status");
    assert_eq!(status.args, vec![OscType::String("PAUSED".to_string())]);

    let tempo = next();
    assert_eq!(tempo.addr, "/beatclock/bpm/current");
    assert_eq!(tempo.args, vec![OscType::Float(133.0)]);
}

#[test]
fn test_notifier_without_listener_does_not_fail() {
    // Nothing listens on this port; sends are dropped silently.
    let notifier = OscNotifier::new(&notifier_settings(9, "/beatclock")).unwrap();
    notifier.status_changed(TransportStatus::Stopped);
    notifier.tempo_changed(120.0);
}

#[test]
fn test_configured_prefix_is_used_both_ways() {
    let settings = OscSettings {
        address_prefix: "/midimaster".to_string(),
        ..loopback_settings()
    };
    let (addr, rx, shutdown, handle) = spawn_gateway(&settings);

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender
        .send_to(&encode("/beatclock/play", vec![]), addr)
        .unwrap();
    sender
        .send_to(&encode("/midimaster/stop", vec![]), addr)
        .unwrap();

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        Command::Transport(TransportAction::Stop)
    );
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    shutdown.trigger();
    handle.join().expect("listener thread panicked");

    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(1)))
        .unwrap();
    let port = receiver.local_addr().unwrap().port();
    let notifier = OscNotifier::new(&notifier_settings(port, "/midimaster")).unwrap();
    notifier.tempo_changed(101.0);

    let mut buf = [0u8; 1024];
    let (len, _) = receiver.recv_from(&mut buf).unwrap();
    match rosc::decoder::decode_udp(&buf[..len]).unwrap().1 {
        OscPacket::Message(msg) => assert_eq!(msg.addr, "/midimaster/bpm/current"),
        other => panic!("unexpected packet {:?}", other),
    }
}
