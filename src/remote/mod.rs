//! OSC remote control over UDP
//!
//! Inbound packets become [`Command`]s on the shared command channel;
//! committed status and tempo changes are mirrored back to a configurable
//! destination by [`OscNotifier`].

use crate::config::OscSettings;
use crate::event_loop::{Command, TransportAction};
use crate::scheduler::ShutdownFlag;
use crate::state::TransportStatus;
use crate::transport::StatusNotifier;
use crossbeam::channel::Sender;
use log::{debug, info, trace, warn};
use rosc::{OscMessage, OscPacket, OscType};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADDRESS_PREFIX: &str = "/beatclock";

/// How often the listener checks for shutdown while idle.
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_PACKET: usize = 1536;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("cannot resolve OSC address '{0}'")]
    InvalidAddress(String),
    #[error("cannot bind OSC socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("OSC socket error: {0}")]
    Io(#[from] io::Error),
}

fn resolve(ip: &str, port: u16) -> Result<SocketAddr, RemoteError> {
    (ip, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| RemoteError::InvalidAddress(format!("{}:{}", ip, port)))
}

fn numeric_arg(arg: &OscType) -> Option<f64> {
    match *arg {
        OscType::Int(v) => Some(f64::from(v)),
        OscType::Long(v) => Some(v as f64),
        OscType::Float(v) => Some(f64::from(v)),
        OscType::Double(v) => Some(v),
        _ => None,
    }
}

/// The OSC address space under one prefix, e.g. `/beatclock/play` or
/// `/midimaster/play`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscAddresses {
    pub play: String,
    pub stop: String,
    pub pause: String,
    pub bpm_set: String,
    pub status: String,
    pub bpm_current: String,
}

impl OscAddresses {
    /// A missing leading slash is added and trailing slashes are dropped.
    pub fn new(prefix: &str) -> Self {
        let prefix = format!("/{}", prefix.trim().trim_matches('/'));
        let prefix = prefix.trim_end_matches('/');
        let at = |path: &str| format!("{}/{}", prefix, path);
        Self {
            play: at("play"),
            stop: at("stop"),
            pause: at("pause"),
            bpm_set: at("bpm/set"),
            status: at("status"),
            bpm_current: at("bpm/current"),
        }
    }

    /// The command for one OSC message, if it is one we understand.
    pub fn translate_message(&self, msg: &OscMessage) -> Option<Command> {
        let addr = msg.addr.as_str();
        if addr == self.play {
            Some(Command::Transport(TransportAction::Play))
        } else if addr == self.stop {
            Some(Command::Transport(TransportAction::Stop))
        } else if addr == self.pause {
            Some(Command::Transport(TransportAction::Pause))
        } else if addr == self.bpm_set {
            msg.args.first().and_then(numeric_arg).map(Command::SetTempo)
        } else {
            None
        }
    }

    /// Commands carried by a packet, unpacking bundles recursively.
    pub fn translate_packet(&self, packet: &OscPacket) -> Vec<Command> {
        let mut commands = Vec::new();
        self.collect_commands(packet, &mut commands);
        commands
    }

    fn collect_commands(&self, packet: &OscPacket, out: &mut Vec<Command>) {
        match packet {
            OscPacket::Message(msg) => match self.translate_message(msg) {
                Some(command) => out.push(command),
                None => trace!("Ignoring OSC message {} {:?}", msg.addr, msg.args),
            },
            OscPacket::Bundle(bundle) => {
                for inner in &bundle.content {
                    self.collect_commands(inner, out);
                }
            }
        }
    }
}

impl Default for OscAddresses {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS_PREFIX)
    }
}

/// Inbound OSC listener.
pub struct RemoteGateway {
    socket: UdpSocket,
    addresses: OscAddresses,
}

impl RemoteGateway {
    pub fn bind(settings: &OscSettings) -> Result<Self, RemoteError> {
        let addr = resolve(&settings.listen_ip, settings.listen_port)?;
        let socket = UdpSocket::bind(addr).map_err(|source| RemoteError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let addresses = OscAddresses::new(&settings.address_prefix);
        info!("OSC listener bound to {} under {}", addr, settings.address_prefix);
        Ok(Self { socket, addresses })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RemoteError> {
        Ok(self.socket.local_addr()?)
    }

    /// Forwards decoded commands until shutdown is requested or the command
    /// channel closes.
    pub fn run(self, commands: Sender<Command>, shutdown: ShutdownFlag) {
        let mut buf = [0u8; MAX_PACKET];
        while !shutdown.is_set() {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(e) => {
                    warn!("OSC receive failed: {}", e);
                    continue;
                }
            };

            let packet = match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => packet,
                Err(e) => {
                    debug!("Undecodable OSC packet from {}: {:?}", from, e);
                    continue;
                }
            };

            for command in self.addresses.translate_packet(&packet) {
                debug!("OSC {} -> {:?}", from, command);
                if commands.send(command).is_err() {
                    info!("Command channel closed, OSC listener exiting");
                    return;
                }
            }
        }
        info!("OSC listener stopped");
    }
}

/// Sends status and tempo updates to the configured OSC destination.
pub struct OscNotifier {
    socket: UdpSocket,
    target: SocketAddr,
    addresses: OscAddresses,
}

impl OscNotifier {
    pub fn new(settings: &OscSettings) -> Result<Self, RemoteError> {
        let target = resolve(&settings.send_ip, settings.send_port)?;
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).map_err(|source| RemoteError::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;
        socket.set_nonblocking(true)?;
        debug!("OSC notifier sending to {}", target);
        Ok(Self {
            socket,
            target,
            addresses: OscAddresses::new(&settings.address_prefix),
        })
    }

    fn send(&self, addr: &str, arg: OscType) {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args: vec![arg],
        });
        match rosc::encoder::encode(&packet) {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, self.target) {
                    debug!("OSC send of {} to {} failed: {}", addr, self.target, e);
                }
            }
            Err(e) => debug!("OSC encode of {} failed: {:?}", addr, e),
        }
    }
}

impl StatusNotifier for OscNotifier {
    fn status_changed(&self, status: TransportStatus) {
        self.send(
            &self.addresses.status,
            OscType::String(status.as_str().to_string()),
        );
    }

    fn tempo_changed(&self, bpm: f64) {
        self.send(&self.addresses.bpm_current, OscType::Float(bpm as f32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscTime};

    fn message(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn test_transport_addresses() {
        let addresses = OscAddresses::default();
        assert_eq!(
            addresses.translate_message(&message("/beatclock/play", vec![])),
            Some(Command::Transport(TransportAction::Play))
        );
        assert_eq!(
            addresses.translate_message(&message("/beatclock/pause", vec![OscType::Int(1)])),
            Some(Command::Transport(TransportAction::Pause))
        );
        assert_eq!(
            addresses.translate_message(&message("/other/play", vec![])),
            None
        );
    }

    #[test]
    fn test_prefix_selects_namespace() {
        let addresses = OscAddresses::new("/midimaster");
        assert_eq!(addresses.status, "/midimaster/status");
        assert_eq!(addresses.bpm_current, "/midimaster/bpm/current");
        assert_eq!(
            addresses.translate_message(&message("/midimaster/stop", vec![])),
            Some(Command::Transport(TransportAction::Stop))
        );
        assert_eq!(
            addresses.translate_message(&message("/beatclock/stop", vec![])),
            None
        );

        assert_eq!(OscAddresses::new("midimaster/"), addresses);
        assert_eq!(OscAddresses::new("/").play, "/play");
    }

    #[test]
    fn test_set_tempo_accepts_any_numeric_type() {
        for arg in [
            OscType::Int(130),
            OscType::Long(130),
            OscType::Float(130.0),
            OscType::Double(130.0),
        ] {
            assert_eq!(
                OscAddresses::default().translate_message(&message("/beatclock/bpm/set", vec![arg])),
                Some(Command::SetTempo(130.0))
            );
        }
    }

    #[test]
    fn test_set_tempo_without_numeric_argument_is_ignored() {
        let addresses = OscAddresses::default();
        assert_eq!(
            addresses.translate_message(&message("/beatclock/bpm/set", vec![])),
            None
        );
        assert_eq!(
            addresses.translate_message(&message(
                "/beatclock/bpm/set",
                vec![OscType::String("fast".to_string())]
            )),
            None
        );
    }

    #[test]
    fn test_bundles_are_unpacked() {
        let nested = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![OscPacket::Message(message("/beatclock/stop", vec![]))],
        });
        let packet = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![
                OscPacket::Message(message("/beatclock/play", vec![])),
                OscPacket::Message(message("/unknown", vec![])),
                nested,
            ],
        });
        assert_eq!(
            OscAddresses::default().translate_packet(&packet),
            vec![
                Command::Transport(TransportAction::Play),
                Command::Transport(TransportAction::Stop),
            ]
        );
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let settings = OscSettings {
            enabled: true,
            listen_ip: "not an address".to_string(),
            listen_port: 8000,
            send_ip: "127.0.0.1".to_string(),
            send_port: 9000,
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_string(),
        };
        assert!(RemoteGateway::bind(&settings).is_err());
    }
}
