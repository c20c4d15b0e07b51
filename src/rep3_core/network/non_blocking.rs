use std::io::{self, Read, Write};
use std::net::TcpStream;

use super::CommChannel;

/// A [CommChannel] whose stream is switched to non-blocking mode so the I/O
/// task threads can multiplex reads and writes.
pub struct NonBlockingCommChannel {
    /// to which player (0,1,2)
    pub to: usize,
    pub stream: TcpStream,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rounds: usize,
}

impl NonBlockingCommChannel {
    pub fn from_channel(channel: CommChannel) -> io::Result<Self> {
        let stream = channel.stream.expect("Stream already closed");
        stream.set_nonblocking(true)?;
        Ok(Self {
            to: channel.to,
            stream,
            bytes_sent: channel.bytes_sent,
            bytes_received: channel.bytes_received,
            rounds: channel.rounds,
        })
    }

    pub fn into_channel(self) -> io::Result<CommChannel> {
        self.stream.set_nonblocking(false)?;
        Ok(CommChannel {
            to: self.to,
            stream: Some(self.stream),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            rounds: self.rounds,
        })
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }
}
