//! This module provides the networking functionality.
//!
//! The module establishes pair-wise TCP connections between all three
//! parties. Channels are unauthenticated by design; running the parties over
//! untrusted networks requires an external transport layer.
use serde::Deserialize;
use std::borrow::Borrow;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
use std::path::Path;
use std::time::{Duration, Instant};
use std::{fs, thread};

mod non_blocking;
mod receiver;
pub mod task;

pub use receiver::{NetSliceReceiver, NetVectorReceiver, SliceReceiver, VecReceiver};

/// Fixed-size wire encoding of the element types that cross the network.
pub trait NetSerializable: Sized {
    /// Returns the size in byte of a serialization of `n_elements` many elements.
    fn serialized_size(n_elements: usize) -> usize;

    /// Serializes the elements.
    fn as_byte_vec(it: impl IntoIterator<Item = impl Borrow<Self>>, len: usize) -> Vec<u8>;

    /// Serializes the elements of a slice.
    fn as_byte_vec_slice(elements: &[Self]) -> Vec<u8>;

    /// Deserializes elements from a byte vector.
    fn from_byte_vec(v: Vec<u8>, len: usize) -> Vec<Self>;

    /// Deserializes elements from a byte vector into a slice.
    fn from_byte_slice(v: Vec<u8>, dest: &mut [Self]);
}

/// The network configuration of a party.
#[derive(Clone)]
pub struct Config {
    player_addr: Vec<Ipv4Addr>,
    player_ports: Vec<u16>,
}

impl Config {
    /// Creates a new network configuration from the addresses and ports of
    /// all three parties.
    pub fn new(player_addr: Vec<Ipv4Addr>, player_ports: Vec<u16>) -> Self {
        Self {
            player_addr,
            player_ports,
        }
    }

    /// Loads the [Config]uration from a TOML file and returns the index of
    /// the local party.
    pub fn from_file(path: &Path) -> Result<(usize, Self), io::Error> {
        let file_content = fs::read_to_string(path)?;
        let parsed_config: SerializedConfig = toml::from_str(&file_content)
            .map_err(|ser| io::Error::new(io::ErrorKind::InvalidData, format!("{}", ser)))?;
        // check party index is valid 1 <= party_index <= 3
        if parsed_config.party_index < 1 || parsed_config.party_index > 3 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Invalid party_index: {}; must be 1 <= party_index <= 3",
                    parsed_config.party_index
                ),
            ));
        }
        let player_addr = vec![
            parsed_config.p1.address,
            parsed_config.p2.address,
            parsed_config.p3.address,
        ];
        let player_ports = vec![
            parsed_config.p1.port,
            parsed_config.p2.port,
            parsed_config.p3.port,
        ];
        Ok((
            parsed_config.party_index - 1,
            Self::new(player_addr, player_ports),
        ))
    }
}

/// The serialized network information for one party.
#[derive(Deserialize)]
struct SerializedPartyConfig {
    pub address: Ipv4Addr,
    pub port: u16,
}

/// The serialized network configuration.
#[derive(Deserialize)]
struct SerializedConfig {
    pub party_index: usize,
    pub p1: SerializedPartyConfig,
    pub p2: SerializedPartyConfig,
    pub p3: SerializedPartyConfig,
}

/// A communication channel between the local party and another party.
pub struct CommChannel {
    /// Defines the party on the other end.
    ///
    /// Permissible are `0,1,2`
    pub to: usize,
    stream: Option<TcpStream>,
    bytes_sent: u64,
    bytes_received: u64,
    rounds: usize,
}

/// The communication interface of a party.
pub struct ConnectedParty {
    /// The party's index `i`.
    pub i: usize,
    /// The network configuration.
    pub config: Config,
    /// Channel to party `i+1`.
    pub comm_next: CommChannel,
    /// Channel to party `i-1`.
    pub comm_prev: CommChannel,
}

impl ConnectedParty {
    /// Establishes the basic network interface and connects to the other
    /// parties.
    pub fn bind_and_connect(i: usize, config: Config, timeout: Option<Duration>) -> io::Result<Self> {
        let party = CreatedParty::bind(
            i,
            IpAddr::V4(config.player_addr[i]),
            config.player_ports[i],
        )?;
        CreatedParty::connect(party, config, timeout)
    }
}

/// The basic network interface of a party.
pub struct CreatedParty {
    i: usize,
    server_socket: TcpListener,
}

impl CreatedParty {
    /// Binds the interface of the party to the given address and port.
    ///
    /// This function also defines the index of the party.
    pub fn bind(i: usize, addr: IpAddr, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((addr, port))?;
        Ok(Self {
            i,
            server_socket: listener,
        })
    }

    /// Returns the port of the [CreatedParty].
    pub fn port(&self) -> io::Result<u16> {
        self.server_socket
            .local_addr()
            .map(|socket_addr| socket_addr.port())
    }

    /// Establishes a connection with the other parties.
    ///
    /// Party `i` acts as server for party `i-1`. The connection order
    /// (P2 dials P1, P1 dials P3, P3 dials P2) keeps the dance deadlock-free.
    pub fn connect(self, config: Config, timeout: Option<Duration>) -> io::Result<ConnectedParty> {
        let (next, prev) = match self.i {
            0 => {
                let server01 = CommChannel::new_server(self.server_socket, 1)?;
                let client02 = CommChannel::new_client(&config, 2, timeout)?;
                (server01, client02)
            }
            1 => {
                let client01 = CommChannel::new_client(&config, 0, timeout)?;
                let server12 = CommChannel::new_server(self.server_socket, 2)?;
                (server12, client01)
            }
            2 => {
                let server02 = CommChannel::new_server(self.server_socket, 0)?;
                let client12 = CommChannel::new_client(&config, 1, timeout)?;
                (server02, client12)
            }
            _ => unreachable!(),
        };

        Ok(ConnectedParty {
            i: self.i,
            config,
            comm_next: next,
            comm_prev: prev,
        })
    }
}

impl CommChannel {
    fn new(to: usize, stream: TcpStream) -> Self {
        Self {
            to,
            stream: Some(stream),
            bytes_sent: 0,
            bytes_received: 0,
            rounds: 0,
        }
    }

    /// Establishes a new communication channel where the local party acts as
    /// server.
    pub fn new_server(server_socket: TcpListener, to: usize) -> io::Result<Self> {
        let (sock, _) = server_socket.accept()?;
        sock.set_nodelay(true)?;
        Ok(Self::new(to, sock))
    }

    /// Establishes a new communication channel where the local party acts as
    /// client.
    pub fn new_client(config: &Config, to: usize, timeout: Option<Duration>) -> io::Result<Self> {
        let addr = config.player_addr[to];
        let port = config.player_ports[to];
        // try to connect in a loop until timeout is reached (if timeout is None, try forever)
        let start_time = Instant::now();
        let sock = {
            loop {
                match TcpStream::connect((addr, port)) {
                    Ok(sock) => break Ok(sock),
                    Err(io_err) => {
                        if io_err.kind() == io::ErrorKind::ConnectionRefused {
                            // try again
                        } else {
                            break Err(io_err);
                        }
                    }
                }
                if let Some(timeout) = timeout {
                    if start_time.elapsed() >= timeout {
                        break Err(io::Error::new(
                            io::ErrorKind::NotConnected,
                            format!(
                                "Cannot connect to {}:{} after {}s",
                                addr,
                                port,
                                timeout.as_secs_f32()
                            ),
                        ));
                    }
                }
                thread::sleep(Duration::from_millis(100));
            }
        }?;
        sock.set_nodelay(true)?;
        Ok(Self::new(to, sock))
    }

    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.bytes_sent += bytes.len() as u64;
        self.rounds += 1;
        self.stream
            .as_mut()
            .expect("Cannot write anymore. Connection was closed")
            .write_all(bytes)
    }

    pub fn read(&mut self, buffer: &mut [u8]) -> io::Result<()> {
        self.bytes_received += buffer.len() as u64;
        self.rounds += 1;
        self.stream
            .as_mut()
            .expect("Cannot read anymore. Connection was closed")
            .read_exact(buffer)
    }

    pub fn get_bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn get_bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn get_rounds(&self) -> usize {
        self.rounds
    }

    /// Closes the communication channel properly. This may block if data
    /// needs to be written.
    pub fn teardown(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => stream.shutdown(std::net::Shutdown::Both),
            None => Ok(()),
        }
    }
}
