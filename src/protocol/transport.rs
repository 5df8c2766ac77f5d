use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info, trace, warn};

use super::{ProtocolError, ProtocolResult};

/// Port LW3 devices listen on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 6107;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on the bytes returned by one [`Connection::read_chunk`] call.
pub const CHUNK_SIZE: usize = 1024;

/// Byte stream a [`Connection`] can own.
///
/// `shutdown` must close both directions; it is called exactly once per
/// connection, either from [`Connection::close`] or on drop.
pub trait DeviceStream: Read + Write {
    fn shutdown(&self) -> io::Result<()>;
}

impl DeviceStream for TcpStream {
    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Exclusive owner of one device session.
pub struct Connection<S: DeviceStream = TcpStream> {
    stream: S,
    peer: String,
    timeout: Duration,
    chunk_size: usize,
    closed: bool,
}

impl Connection<TcpStream> {
    /// Connect to `host:port`, applying `timeout` to the connect and to every
    /// later read and write.
    pub fn open(host: &str, port: u16, timeout: Duration) -> ProtocolResult<Self> {
        let addr = format!("{host}:{port}");
        let candidates = (host, port)
            .to_socket_addrs()
            .map_err(|source| ProtocolError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let mut timed_out = false;
        let mut last_error = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "host resolved to no addresses",
        );

        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    info!("connected to {addr} ({candidate})");
                    return Ok(Self::new(stream, addr, timeout));
                }
                Err(e) => {
                    debug!("connect to {candidate} failed: {e}");
                    timed_out = is_timeout(&e);
                    last_error = e;
                }
            }
        }

        if timed_out {
            Err(ProtocolError::Timeout { after: timeout })
        } else {
            Err(ProtocolError::Connect {
                addr,
                source: last_error,
            })
        }
    }
}

impl<S: DeviceStream> Connection<S> {
    /// Wrap an already established stream. `timeout` is only reported in
    /// errors; deadlines are the stream's own business.
    pub fn new(stream: S, peer: impl Into<String>, timeout: Duration) -> Self {
        Self {
            stream,
            peer: peer.into(),
            timeout,
            chunk_size: CHUNK_SIZE,
            closed: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one complete command.
    pub fn write(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        self.stream
            .write_all(bytes)
            .and_then(|_| self.stream.flush())
            .map_err(|e| self.map_io(e))
    }

    /// Block for at most the read deadline and return whatever arrived.
    ///
    /// An empty chunk means the peer closed the connection.
    pub fn read_chunk(&mut self) -> ProtocolResult<Vec<u8>> {
        let mut buf = vec![0; self.chunk_size];
        loop {
            match self.stream.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    trace!("{} <- {n} bytes", self.peer);
                    return Ok(buf);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.map_io(e)),
            }
        }
    }

    /// Shut the stream down in both directions. Calling it again is a no-op.
    pub fn close(&mut self) -> ProtocolResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.stream.shutdown() {
            Ok(()) => {
                info!("closed connection to {}", self.peer);
                Ok(())
            }
            // peer hung up first
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn map_io(&self, e: io::Error) -> ProtocolError {
        if is_timeout(&e) {
            ProtocolError::Timeout {
                after: self.timeout,
            }
        } else {
            ProtocolError::Io(e)
        }
    }
}

impl<S: DeviceStream> Drop for Connection<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to shut down connection to {}: {e}", self.peer);
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
