//! ICMP echo prober.
//!
//! Prefers unprivileged datagram ICMP sockets (Linux `ping_group_range`,
//! macOS) and falls back to raw sockets. Each probe opens its own socket
//! connected to the target, so the kernel only hands it traffic from that
//! host. Datagram sockets additionally rewrite the identifier and demux
//! replies by it, so only the sequence number is checked there.

use std::io::{self, ErrorKind, Read};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use async_trait::async_trait;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes, checksum};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::{MutablePacket, Packet};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::task;
use tracing::{debug, warn};

use super::{ProbeReply, Prober};

/// ICMP header size (fixed)
const ICMP_HEADER_SIZE: usize = 8;
/// Identifier, sequence and timestamp, padded out to a standard ping.
const PAYLOAD_SIZE: usize = 56;
const RECV_BUFFER_SIZE: usize = 1500;
// ENFILE and EMFILE share these values on Linux and the BSDs.
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Unprivileged `SOCK_DGRAM` ICMP socket; replies carry no IP header.
    Dgram,
    /// `SOCK_RAW` ICMP socket; replies include the IPv4 header.
    Raw,
}

pub struct IcmpProber {
    kind: SocketKind,
    identifier: u16,
    sequence: AtomicU16,
    /// Set once descriptor exhaustion has been reported.
    out_of_descriptors: AtomicBool,
}

impl IcmpProber {
    /// Picks the socket type this process is allowed to open.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_kind(check_permissions()?))
    }

    pub fn with_kind(kind: SocketKind) -> Self {
        Self {
            kind,
            identifier: rand::random(),
            sequence: AtomicU16::new(0),
            out_of_descriptors: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Logs a failed echo. Running out of file descriptors makes hosts look
    /// unreachable, so the first occurrence is a warning. Returns whether
    /// this call emitted it.
    fn report_failure(&self, addr: Ipv4Addr, e: &io::Error) -> bool {
        if is_descriptor_exhaustion(e) && !self.out_of_descriptors.swap(true, Ordering::Relaxed) {
            warn!(
                "Out of file descriptors probing {addr} ({e}); results are unreliable. \
                 Lower --workers or raise the open file limit (ulimit -n)"
            );
            return true;
        }
        debug!("echo request to {addr} failed: {e}");
        false
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, addr: Ipv4Addr, timeout: Duration) -> ProbeReply {
        let kind = self.kind;
        let identifier = self.identifier;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let echo = task::spawn_blocking(move || echo(kind, addr, identifier, sequence, timeout));
        match echo.await {
            Ok(Ok(Some(rtt))) => ProbeReply::reachable(rtt),
            Ok(Ok(None)) => ProbeReply::unreachable(),
            Ok(Err(e)) => {
                self.report_failure(addr, &e);
                ProbeReply::unreachable()
            }
            Err(e) => {
                debug!("echo task for {addr} did not complete: {e}");
                ProbeReply::unreachable()
            }
        }
    }
}

/// Returns the socket type to use, or explains how to grant access.
pub fn check_permissions() -> anyhow::Result<SocketKind> {
    if open_socket(SocketKind::Dgram).is_ok() {
        return Ok(SocketKind::Dgram);
    }
    if open_socket(SocketKind::Raw).is_ok() {
        return Ok(SocketKind::Raw);
    }

    let binary_path = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "sweepr".to_string());

    Err(anyhow!(
        "Insufficient permissions for ICMP sockets.\n\n\
         Fix options:\n\
         \u{2022} Run with sudo: sudo sweepr\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep {}\n\
         \u{2022} Enable unprivileged ICMP: sudo sysctl -w net.ipv4.ping_group_range='0 65534'",
        binary_path
    ))
}

fn is_descriptor_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(EMFILE | ENFILE))
}

fn open_socket(kind: SocketKind) -> io::Result<Socket> {
    let ty = match kind {
        SocketKind::Dgram => Type::DGRAM,
        SocketKind::Raw => Type::RAW,
    };
    Socket::new(Domain::IPV4, ty, Some(Protocol::ICMPV4))
}

/// Sends one echo request and blocks until the matching reply or the
/// deadline. `Ok(None)` means no reply in time.
fn echo(
    kind: SocketKind,
    addr: Ipv4Addr,
    identifier: u16,
    sequence: u16,
    timeout: Duration,
) -> io::Result<Option<Duration>> {
    let socket = open_socket(kind)?;
    socket.connect(&SockAddr::from(SocketAddrV4::new(addr, 0)))?;

    let request = build_echo_request(identifier, sequence)?;
    let sent_at = Instant::now();
    socket.send(&request)?;

    let deadline = sent_at + timeout;
    let mut buffer = [0u8; RECV_BUFFER_SIZE];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        socket.set_read_timeout(Some(remaining))?;

        let len = match (&socket).read(&mut buffer) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if is_matching_reply(&buffer[..len], kind, identifier, sequence) {
            return Ok(Some(sent_at.elapsed()));
        }
    }
}

/// Builds an ICMP Echo Request.
///
/// Payload layout:
/// - Bytes 0-1: identifier
/// - Bytes 2-3: sequence
/// - Bytes 4-7: timestamp (lower 32 bits of microseconds)
/// - Bytes 8+: pattern fill
fn build_echo_request(identifier: u16, sequence: u16) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + PAYLOAD_SIZE];
    let mut packet = MutableEchoRequestPacket::new(&mut buffer)
        .ok_or_else(|| io::Error::other("echo request buffer too small"))?;

    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(identifier);
    packet.set_sequence_number(sequence);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u32)
        .unwrap_or_default();

    let payload = packet.payload_mut();
    payload[0..2].copy_from_slice(&identifier.to_be_bytes());
    payload[2..4].copy_from_slice(&sequence.to_be_bytes());
    payload[4..8].copy_from_slice(&timestamp.to_be_bytes());
    for (i, byte) in payload[8..].iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }

    let cksum = IcmpPacket::new(packet.packet())
        .map(|icmp| checksum(&icmp))
        .ok_or_else(|| io::Error::other("echo request too short to checksum"))?;
    packet.set_checksum(cksum);

    Ok(buffer)
}

fn is_matching_reply(data: &[u8], kind: SocketKind, identifier: u16, sequence: u16) -> bool {
    let icmp_data = match kind {
        SocketKind::Dgram => data,
        SocketKind::Raw => {
            let Some(ip_packet) = Ipv4Packet::new(data) else {
                return false;
            };
            let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
            match data.get(ip_header_len..) {
                Some(rest) => rest,
                None => return false,
            }
        }
    };

    let Some(reply) = EchoReplyPacket::new(icmp_data) else {
        return false;
    };

    reply.get_icmp_type() == IcmpTypes::EchoReply
        && reply.get_sequence_number() == sequence
        && (kind == SocketKind::Dgram || reply.get_identifier() == identifier)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
