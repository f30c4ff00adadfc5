//! # Address Space Model
//!
//! Defines the total order in which the IPv4 space is swept and the rules
//! for which addresses are worth probing at all.
//!
//! A [`ScanRange`] is half-open: the sweep starts at `start` and stops as soon
//! as the next address *equals* `end`. By convention `255.255.255.255` is used
//! as the "top of the space" sentinel, so that address itself is never probed.
//!
//! Ranges can be parsed from the command line in two forms:
//! * **Range**: "Start-End" (e.g., "10.0.0.0-10.0.1.0", or abbreviated "10.0.0.0-1.0").
//! * **CIDR**: "Network/Prefix" (e.g., "10.0.0.0/24").

use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// The address a sweep starts from when nothing has been logged yet.
pub const UNSPECIFIED: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// The conventional exclusive end of a full sweep.
pub const TOP_OF_SPACE: Ipv4Addr = Ipv4Addr::BROADCAST;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range start {start} is past its end {end}")]
    Inverted { start: Ipv4Addr, end: Ipv4Addr },
    #[error("invalid address '{input}'")]
    BadAddress { input: String },
    #[error("invalid CIDR prefix '{input}'")]
    BadPrefix { input: String },
    #[error("end of range '{input}' {reason}")]
    BadEnd { input: String, reason: &'static str },
}

/// Returns the next address in dotted-quad order, carrying into higher octets.
///
/// `255.255.255.255` has no successor.
pub fn successor(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    u32::from(addr).checked_add(1).map(Ipv4Addr::from)
}

/// Whether an address may be probed: `0.0.0.0/8` (which includes the
/// unspecified address) is never a valid destination.
pub fn is_probeable(addr: Ipv4Addr) -> bool {
    !addr.is_unspecified() && addr.octets()[0] != 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

impl ScanRange {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, RangeError> {
        if u32::from(start) > u32::from(end) {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// The whole space, `0.0.0.0` up to (but excluding) `255.255.255.255`.
    pub fn full() -> Self {
        Self {
            start: UNSPECIFIED,
            end: TOP_OF_SPACE,
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr);
        addr >= u32::from(self.start) && addr < u32::from(self.end)
    }

    /// Number of addresses the sweep walks over, valid or not.
    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.end)) - u64::from(u32::from(self.start))
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Walks the range starting from `from` instead of `start`.
    pub fn sweep_from(&self, from: Ipv4Addr) -> Sweep {
        Sweep {
            next: Some(from),
            end: self.end,
        }
    }

    pub fn sweep(&self) -> Sweep {
        self.sweep_from(self.start)
    }
}

impl Default for ScanRange {
    fn default() -> Self {
        Self::full()
    }
}

impl FromStr for ScanRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((start, end)) = s.split_once('-') {
            let start = parse_addr(start)?;
            let end = parse_range_end_addr(end, &start)?;
            return ScanRange::new(start, end);
        }
        if let Some((ip, prefix)) = s.split_once('/') {
            return cidr_range(parse_addr(ip)?, prefix);
        }
        Err(RangeError::BadAddress { input: s.into() })
    }
}

/// Iterator over `[from, end)` in successor order.
///
/// Stops on equality with `end`, or when the top of the space is reached
/// without ever meeting `end`.
#[derive(Debug, Clone)]
pub struct Sweep {
    next: Option<Ipv4Addr>,
    end: Ipv4Addr,
}

impl Iterator for Sweep {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if current == self.end {
            self.next = None;
            return None;
        }
        self.next = successor(current);
        Some(current)
    }
}

fn parse_addr(s: &str) -> Result<Ipv4Addr, RangeError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| RangeError::BadAddress { input: s.into() })
}

/// Handles abbreviated forms like "10.0.0.0-1.0" (implies 10.0.1.0)
/// and full forms like "10.0.0.0-10.0.1.0".
fn parse_range_end_addr(end_str: &str, start_addr: &Ipv4Addr) -> Result<Ipv4Addr, RangeError> {
    let end_str = end_str.trim();
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    let bad_end = |reason| RangeError::BadEnd {
        input: end_str.into(),
        reason,
    };

    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet| octet.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| bad_end("is not a list of octets"))?;

    if partial_octets.len() > 4 {
        return Err(bad_end("has too many octets"));
    }

    let mut end_octets = start_addr.octets();
    end_octets[4 - partial_octets.len()..].copy_from_slice(&partial_octets);
    Ok(Ipv4Addr::from(end_octets))
}

/// A CIDR block as a half-open range: the end is one past the broadcast
/// address, clamped to the top-of-space sentinel.
fn cidr_range(ip: Ipv4Addr, prefix_str: &str) -> Result<ScanRange, RangeError> {
    let prefix = prefix_str
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| RangeError::BadPrefix {
            input: prefix_str.into(),
        })?;

    let mask: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let network = u32::from(ip) & mask;
    let broadcast = network | !mask;

    let start = Ipv4Addr::from(network);
    let end = successor(Ipv4Addr::from(broadcast)).unwrap_or(TOP_OF_SPACE);
    ScanRange::new(start, end)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
