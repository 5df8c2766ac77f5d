use std::{net::TcpStream, time::Duration};

use log::debug;

use super::{
    Connection, DeviceStream, NodeList, Parsed, PropertyMap, ProtocolError, ProtocolResult,
    Request, Signature,
    reader::{MAX_READS, RawResponse, StreamReader, Terminator, Termination},
    response::{parse_nodes, parse_properties, parse_value},
    transport::{CHUNK_SIZE, DEFAULT_TIMEOUT},
};

/// Per-session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Connect and read deadline.
    pub timeout: Duration,
    /// Reads allowed per response.
    pub max_reads: usize,
    pub chunk_size: usize,
    pub termination: Termination,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_reads: MAX_READS,
            chunk_size: CHUNK_SIZE,
            termination: Termination::default(),
        }
    }
}

/// Sequential LW3 query session: one command in flight at a time.
pub struct Lw3Client<S: DeviceStream = TcpStream> {
    conn: Connection<S>,
    config: ClientConfig,
}

impl Lw3Client<TcpStream> {
    pub fn connect(host: &str, port: u16, config: ClientConfig) -> ProtocolResult<Self> {
        let conn = Connection::open(host, port, config.timeout)?;
        Ok(Self::new(conn, config))
    }
}

impl<S: DeviceStream> Lw3Client<S> {
    pub fn new(conn: Connection<S>, config: ClientConfig) -> Self {
        Self {
            conn: conn.with_chunk_size(config.chunk_size),
            config,
        }
    }

    pub fn peer(&self) -> &str {
        self.conn.peer()
    }

    /// Value of one property, e.g. `/MEDIA/XP/VIDEO.DestinationConnectionStatus`.
    pub fn get(&mut self, path: &str) -> ProtocolResult<String> {
        let response = self.exchange(&Request::get(path))?;
        parse_value(&response.text(), path)
    }

    /// Child nodes of `path`, in device order.
    pub fn get_nodes(&mut self, path: &str) -> ProtocolResult<Parsed<NodeList>> {
        let response = self.exchange(&Request::get(path))?;
        parse_nodes(&response.text(), path)
    }

    /// Every property of the node at `path`.
    pub fn get_properties(&mut self, path: &str) -> ProtocolResult<Parsed<PropertyMap>> {
        let signature = Signature::random();
        let response = self.exchange(&Request::GetAll {
            path: path.to_string(),
            signature,
        })?;
        parse_properties(&response.text(), path, signature)
    }

    /// End the session, reporting a failed shutdown. Dropping the client
    /// also closes it.
    pub fn close(mut self) -> ProtocolResult<()> {
        self.conn.close()
    }

    /// Send `request` and frame its reply. A device that hangs up without
    /// sending anything fails with [`ProtocolError::PeerClosed`].
    fn exchange(&mut self, request: &Request) -> ProtocolResult<RawResponse> {
        debug!("{} -> {request}", self.conn.peer());
        self.conn.write(&request.encode())?;

        let reader = StreamReader::new(
            Terminator::for_request(request),
            self.config.termination,
            self.config.max_reads,
        );
        let response = reader.read_from(&mut self.conn)?;
        if response.closed_by_peer() && response.as_bytes().is_empty() {
            return Err(ProtocolError::PeerClosed {
                path: request.path().to_string(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread::{self, JoinHandle},
    };

    use crate::protocol::{LineFault, testing::ScriptedStream};

    use super::*;

    fn scripted(stream: ScriptedStream) -> Lw3Client<ScriptedStream> {
        Lw3Client::new(
            Connection::new(stream, "scripted", DEFAULT_TIMEOUT),
            ClientConfig::default(),
        )
    }

    /// Answers each received command line with `reply(command)` and returns
    /// the commands it saw once the client hangs up.
    fn fake_device<F>(reply: F) -> (u16, JoinHandle<Vec<String>>)
    where
        F: Fn(&str) -> String + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut seen = Vec::new();

            for line in BufReader::new(stream).split(b'\n') {
                let line = String::from_utf8(line.unwrap()).unwrap();
                let command = line.trim_end_matches('\r').to_string();
                writer.write_all(reply(&command).as_bytes()).unwrap();
                seen.push(command);
            }
            seen
        });

        (port, handle)
    }

    #[test]
    fn round_trip_against_fake_device() {
        let (port, device) = fake_device(|command| {
            if let Some((sig, rest)) = command.split_once("#GET ") {
                let path = rest.trim_end_matches(".*");
                [
                    format!("{sig}#{{"),
                    format!("pr {path}.ProductSerialNumber=A1B2C3"),
                    format!("pr {path}.FirmwareVersion=1.6.0"),
                    format!("pr {path}.Label="),
                    "}\r\n".to_string(),
                ]
                .join("\r\n")
            } else if command == "GET /MEDIA/PORTS/VIDEO" {
                ["I1", "I2", "O1"]
                    .map(|port| format!("n- /MEDIA/PORTS/VIDEO/{port}\r\n"))
                    .concat()
            } else {
                let path = command.trim_start_matches("GET ");
                format!("pr {path}=I2;0;\r\n")
            }
        });

        let mut client = Lw3Client::connect("127.0.0.1", port, ClientConfig::default()).unwrap();

        let props = client.get_properties("/MANAGEMENT/UID").unwrap();
        assert!(props.is_complete());
        assert_eq!(props.value.value("ProductSerialNumber"), Some("A1B2C3"));
        assert_eq!(props.value.value("FirmwareVersion"), Some("1.6.0"));
        assert_eq!(props.value.get("Label"), Some(None));

        let nodes = client.get_nodes("/MEDIA/PORTS/VIDEO").unwrap();
        assert_eq!(nodes.value, vec!["I1", "I2", "O1"]);

        let value = client
            .get("/MEDIA/XP/VIDEO.DestinationConnectionStatus")
            .unwrap();
        assert_eq!(value, "I2;0;");

        client.close().unwrap();

        let seen = device.join().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].ends_with("#GET /MANAGEMENT/UID.*"));
        assert_eq!(seen[0].split('#').next().unwrap().len(), 4);
        assert_eq!(seen[1], "GET /MEDIA/PORTS/VIDEO");
        assert_eq!(seen[2], "GET /MEDIA/XP/VIDEO.DestinationConnectionStatus");
    }

    #[test]
    fn silent_device_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let device = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            // hold the socket open until the client gives up
            reader.read_to_end(&mut Vec::new()).unwrap();
            line
        });

        let config = ClientConfig {
            timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        };
        let mut client = Lw3Client::connect("127.0.0.1", port, config).unwrap();

        match client.get("/SYS.Uptime") {
            Err(ProtocolError::Timeout { after }) => assert_eq!(after, Duration::from_millis(200)),
            other => panic!("expected timeout, got {other:?}"),
        }
        drop(client);

        assert_eq!(device.join().unwrap(), "GET /SYS.Uptime\r\n");
    }

    #[test]
    fn client_sends_exact_command() {
        let stream = ScriptedStream::new(&[b"pr /SYS.Uptime=1234\r\n"]);
        let written = stream.written();
        let mut client = scripted(stream);

        assert_eq!(client.get("/SYS.Uptime").unwrap(), "1234");
        assert_eq!(written.borrow().as_slice(), b"GET /SYS.Uptime\r\n");
    }

    #[test]
    fn fragmented_block_is_framing_error() {
        let mut stream = ScriptedStream::new(&[]);
        for _ in 0..MAX_READS {
            stream = stream.then_send(b"pr /SYS.A=1\r\n}\r").then_send(b"\n");
        }
        let mut client = scripted(stream);

        assert!(matches!(
            client.get_properties("/SYS"),
            Err(ProtocolError::Framing { reads: MAX_READS, .. })
        ));
    }

    #[test]
    fn buffer_tail_recovers_fragmented_block() {
        let signature = Signature::from_bytes([0xbe, 0xef]);
        let request = Request::GetAll {
            path: "/SYS".to_string(),
            signature,
        };
        let stream = ScriptedStream::new(&[b"beef#{\r\npr /SYS.A=1\r\n}\r", b"\n"]);
        let mut client = Lw3Client::new(
            Connection::new(stream, "scripted", DEFAULT_TIMEOUT),
            ClientConfig {
                termination: Termination::BufferTail,
                ..ClientConfig::default()
            },
        );

        let response = client.exchange(&request).unwrap();
        let parsed = parse_properties(&response.text(), "/SYS", signature).unwrap();
        assert_eq!(parsed.value.value("A"), Some("1"));
    }

    #[test]
    fn node_listing_cut_off_by_hangup() {
        let stream = ScriptedStream::new(&[b"n- /MEDIA/PORTS/VIDEO/I1\r\nn- /MEDIA/PORTS/VIDEO/O"]);
        let mut client = scripted(stream);

        let nodes = client.get_nodes("/MEDIA/PORTS/VIDEO").unwrap();
        assert_eq!(nodes.value, vec!["I1"]);
        assert_eq!(nodes.skipped_count(), 1);
        assert_eq!(nodes.skipped[0].fault, LineFault::Truncated);
    }

    #[test]
    fn hangup_before_any_reply() {
        let mut client = scripted(ScriptedStream::new(&[]));

        match client.get_nodes("/MEDIA/PORTS/VIDEO") {
            Err(ProtocolError::PeerClosed { path }) => assert_eq!(path, "/MEDIA/PORTS/VIDEO"),
            other => panic!("expected peer closed, got {other:?}"),
        }
        assert!(matches!(
            client.get("/SYS.Uptime"),
            Err(ProtocolError::PeerClosed { .. })
        ));
    }

    #[test]
    fn drop_closes_connection() {
        let stream = ScriptedStream::new(&[]);
        let shutdowns = stream.shutdowns();

        drop(scripted(stream));
        assert_eq!(shutdowns.get(), 1);
    }

    #[test]
    fn parser_error_still_closes_connection() {
        let stream = ScriptedStream::new(&[b"pE /SYS.Nope %E001:Not exists\r\n"]);
        let shutdowns = stream.shutdowns();

        let result = {
            let mut client = scripted(stream);
            client.get("/SYS.Nope")
        };

        assert!(matches!(result, Err(ProtocolError::Device { .. })));
        assert_eq!(shutdowns.get(), 1);
    }
}
