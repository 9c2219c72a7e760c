//! Peer directory
//!
//! Candidate peers come from the operating system's neighbor (ARP) table: the
//! hosts this machine recently exchanged traffic with on the local segment.
//! The table is re-read on every broadcast and never cached.
//!
//! Three row layouts are understood:
//!
//! - `arp -an` on Linux and the BSDs: `? (192.168.1.7) at 3c:22:fb:10:aa:01 [ether] on eth0`
//! - `/proc/net/arp`: `192.168.1.7  0x1  0x2  3c:22:fb:10:aa:01  *  eth0`
//! - `arp -a` on Windows: `192.168.1.7  3c-22-fb-10-aa-01  dynamic`
//!
//! Rows without a resolved hardware address or a valid IPv4 address are
//! skipped silently.

use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, trace};

use crate::errors::DirectoryError;

/// Fewest whitespace separated fields a table row can have
pub const MIN_ROW_FIELDS: usize = 3;

// ----------------------------------------------------------------------------
// Peer Address
// ----------------------------------------------------------------------------

/// Network endpoint of a peer: host plus the well-known port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress(SocketAddrV4);

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        self.0
    }

    /// URL of the peer's receiving endpoint, without query
    pub fn receive_url(&self, path: &str) -> String {
        format!("http://{}{}", self.0, path)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddrV4> for PeerAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self(addr)
    }
}

// ----------------------------------------------------------------------------
// Directory Trait
// ----------------------------------------------------------------------------

/// Source of candidate peers
///
/// Implementations are synchronous and may block briefly; the broadcaster
/// calls them off the async executor.
pub trait PeerDirectory: Send + Sync {
    /// Current set of peers, without duplicates or local addresses
    fn discover_peers(&self) -> Result<Vec<PeerAddress>, DirectoryError>;
}

/// Fixed list of peers
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    peers: Vec<PeerAddress>,
}

impl StaticDirectory {
    pub fn new(peers: impl IntoIterator<Item = PeerAddress>) -> Self {
        let mut seen = HashSet::new();
        let peers = peers.into_iter().filter(|p| seen.insert(*p)).collect();
        Self { peers }
    }

    pub fn from_ips(ips: impl IntoIterator<Item = Ipv4Addr>, port: u16) -> Self {
        Self::new(ips.into_iter().map(|ip| PeerAddress::new(ip, port)))
    }
}

impl PeerDirectory for StaticDirectory {
    fn discover_peers(&self) -> Result<Vec<PeerAddress>, DirectoryError> {
        Ok(self.peers.clone())
    }
}

// ----------------------------------------------------------------------------
// ARP Table Directory
// ----------------------------------------------------------------------------

/// Where the neighbor table is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpSource {
    /// Run a utility and parse its standard output
    Command(Vec<String>),
    /// Read a table file such as `/proc/net/arp`
    File(PathBuf),
}

/// Directory backed by the operating system's neighbor table
#[derive(Debug, Clone)]
pub struct ArpTableDirectory {
    source: ArpSource,
    port: u16,
    excluded: HashSet<Ipv4Addr>,
}

impl ArpTableDirectory {
    /// Create a directory that excludes this machine's detected address
    pub fn new(source: ArpSource, port: u16) -> Self {
        Self {
            source,
            port,
            excluded: local_ipv4_addresses(),
        }
    }

    /// Exclude additional addresses, e.g. secondary interfaces
    pub fn with_excluded(mut self, addrs: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        self.excluded.extend(addrs);
        self
    }

    fn read_table(&self) -> Result<String, DirectoryError> {
        match &self.source {
            ArpSource::File(path) => Ok(std::fs::read_to_string(path)?),
            ArpSource::Command(argv) => {
                let (program, args) = argv.split_first().ok_or(DirectoryError::EmptyCommand)?;
                let output = Command::new(program).args(args).output().map_err(|e| {
                    DirectoryError::CommandFailed {
                        command: argv.join(" "),
                        reason: e.to_string(),
                    }
                })?;

                if !output.status.success() {
                    return Err(DirectoryError::CommandFailed {
                        command: argv.join(" "),
                        reason: format!(
                            "{}: {}",
                            output.status,
                            String::from_utf8_lossy(&output.stderr).trim()
                        ),
                    });
                }

                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
        }
    }
}

impl PeerDirectory for ArpTableDirectory {
    fn discover_peers(&self) -> Result<Vec<PeerAddress>, DirectoryError> {
        let table = self.read_table()?;
        let peers = select_peers(parse_arp_table(&table), &self.excluded, self.port);
        debug!(count = peers.len(), "Read neighbor table");
        Ok(peers)
    }
}

// ----------------------------------------------------------------------------
// Parsing
// ----------------------------------------------------------------------------

/// Extract the IPv4 address of every well-formed row, in table order
///
/// Duplicates are preserved here; [`select_peers`] removes them.
pub fn parse_arp_table(table: &str) -> Vec<Ipv4Addr> {
    table.lines().filter_map(parse_row).collect()
}

fn parse_row(line: &str) -> Option<Ipv4Addr> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_ROW_FIELDS {
        trace!(line, "Skipping short neighbor row");
        return None;
    }

    // `? (ip) at hwaddr ...`
    if let Some(pos) = fields
        .iter()
        .position(|f| f.starts_with('(') && f.ends_with(')'))
    {
        let ip = fields[pos].trim_start_matches('(').trim_end_matches(')');
        let resolved = fields.get(pos + 1) == Some(&"at")
            && fields.get(pos + 2).is_some_and(|hw| is_hardware_address(hw));
        return if resolved { ip.parse().ok() } else { None };
    }

    // Tabular layouts: address first, hardware address in a later column
    let ip: Ipv4Addr = fields[0].parse().ok()?;
    fields[1..]
        .iter()
        .any(|f| is_hardware_address(f))
        .then_some(ip)
}

/// Six one- or two-digit hex groups separated by ':' or '-', naming one host
///
/// All-zero is an unresolved entry and all-ones is the subnet broadcast.
fn is_hardware_address(field: &str) -> bool {
    let groups: Vec<&str> = field.split([':', '-']).collect();
    groups.len() == 6
        && groups
            .iter()
            .all(|g| (1..=2).contains(&g.len()) && g.chars().all(|c| c.is_ascii_hexdigit()))
        && groups.iter().any(|g| g.chars().any(|c| c != '0'))
        && !groups.iter().all(|g| g.eq_ignore_ascii_case("ff"))
}

/// Turn parsed addresses into peers: drop non-unicast, excluded and repeated
/// entries, keep first-seen order
pub fn select_peers(
    addrs: impl IntoIterator<Item = Ipv4Addr>,
    excluded: &HashSet<Ipv4Addr>,
    port: u16,
) -> Vec<PeerAddress> {
    let mut seen = HashSet::new();
    addrs
        .into_iter()
        .filter(|ip| {
            !(ip.is_loopback() || ip.is_unspecified() || ip.is_broadcast() || ip.is_multicast())
        })
        .filter(|ip| !excluded.contains(ip))
        .filter(|ip| seen.insert(*ip))
        .map(|ip| PeerAddress::new(ip, port))
        .collect()
}

/// Addresses this machine answers on, as far as can be told without extra
/// system queries: the source address of the default route
pub fn local_ipv4_addresses() -> HashSet<Ipv4Addr> {
    let mut local = HashSet::new();
    // UDP connect only selects a route; nothing is sent.
    let routed = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
            socket.local_addr()
        });
    match routed {
        Ok(std::net::SocketAddr::V4(addr)) if !addr.ip().is_unspecified() => {
            local.insert(*addr.ip());
        }
        Ok(_) => {}
        Err(e) => debug!("Could not determine local address: {}", e),
    }
    local
}
