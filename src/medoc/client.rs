use crate::error::PathwayError;
use crate::medoc::protocol;
use crate::types::{Command, Response, WatchField};
use chrono::Utc;
use log::{debug, info, trace, warn};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

/// Sentinel the polling loop compares against when a STATUS reply cannot be
/// decoded. Never equal to any real field value, so the loop stays alive
/// instead of crashing on a garbled frame.
pub const RESPONSE_FORMAT_ERROR: &str = "RESPONSE_FORMAT_ERROR";

/// Total attempts a single `call` makes before giving up on a persistently
/// malformed response stream.
pub const MAX_CALL_ATTEMPTS: usize = 3;

/// Connection configuration for the Pathway TCP client.
///
/// All knobs have defaults matching the device's expectations; they only
/// need touching for unusual network conditions (or fast stub devices in
/// tests).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing each per-call TCP connection
    pub connect_timeout: Duration,
    /// Timeout for reading the response
    pub read_timeout: Duration,
    /// Timeout for writing the command frame
    pub write_timeout: Duration,
    /// Receive buffer size; each call performs one read of at most this many bytes
    pub buffer_size: usize,
    /// Settling time between write and read. The device needs this long
    /// before it has a response ready.
    pub settle_delay: Duration,
    /// Socket reuse across calls. The device processes one command per
    /// connection; requesting reuse makes every call fail.
    pub reuse_socket: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            buffer_size: 1024,
            settle_delay: Duration::from_millis(500),
            reuse_socket: false,
        }
    }
}

/// Builder for constructing [`PathwayClient`] instances.
///
/// `build()` probes the device with a STATUS command and only returns a
/// client once that probe decoded cleanly - this is the one place
/// connectivity is hard-verified.
///
/// # Examples
///
/// ```no_run
/// use rusty_pathway::PathwayClient;
///
/// let client = PathwayClient::builder()
///     .address("192.168.0.114")
///     .port(20121)
///     .verbose(true)
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct PathwayClientBuilder {
    address: Option<String>,
    port: Option<u16>,
    config: ConnectionConfig,
    verbose: bool,
}

impl PathwayClientBuilder {
    pub fn address(mut self, addr: &str) -> Self {
        self.address = Some(addr.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Default verbosity for responses; individual calls can override it
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the full connection configuration
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Build the client and verify the device is reachable
    pub fn build(self) -> Result<PathwayClient, PathwayError> {
        let address = self.address.ok_or_else(|| {
            PathwayError::InvalidArgument("address must be specified".to_string())
        })?;
        let port = self
            .port
            .ok_or_else(|| PathwayError::InvalidArgument("port must be specified".to_string()))?;

        if self.config.reuse_socket {
            return Err(PathwayError::InvalidArgument(
                "socket reuse across calls is not supported".to_string(),
            ));
        }

        let socket_addr: SocketAddr = format!("{address}:{port}")
            .parse()
            .map_err(|_| PathwayError::InvalidAddress(address.clone()))?;

        let client = PathwayClient {
            socket_addr,
            config: self.config,
            verbose: self.verbose,
        };

        debug!("probing Pathway at {socket_addr}");
        match client.call_with(Command::Status, None, Some(false)) {
            Ok(_) => {
                info!("connection to Pathway at {socket_addr} successful");
                Ok(client)
            }
            Err(err) => Err(PathwayError::Connect {
                address: socket_addr.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

/// Client for the Medoc Pathway thermal stimulator.
///
/// The device processes one command per connection and shares a single
/// internal state machine, so the client holds no live socket: every call
/// opens its own scoped connection and drops it before returning. No
/// concurrent command issuance is supported.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use rusty_pathway::{PathwayClient, WatchField};
///
/// let client = PathwayClient::new("192.168.0.114", 20121)?;
///
/// // Load test program 100, wait out the device's pre-test phase, trigger.
/// client.program(100)?;
/// let running = client.poll_for_change(
///     WatchField::TestState,
///     "RUNNING",
///     Duration::from_millis(500),
///     -1,
///     false,
///     Duration::from_secs(1),
/// )?;
/// if running {
///     client.trigger()?;
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct PathwayClient {
    socket_addr: SocketAddr,
    config: ConnectionConfig,
    verbose: bool,
}

impl PathwayClient {
    /// Create a client with default configuration and probe the device.
    ///
    /// # Errors
    /// Returns [`PathwayError::Connect`] when the device is unreachable or
    /// the probe response does not decode.
    pub fn new(addr: &str, port: u16) -> Result<Self, PathwayError> {
        Self::builder().address(addr).port(port).build()
    }

    /// Create a builder for flexible configuration.
    pub fn builder() -> PathwayClientBuilder {
        PathwayClientBuilder::default()
    }

    /// Change the session-default verbosity
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Current connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Issue a command and decode the device's reply.
    ///
    /// `protocol_number` is required for [`Command::TestProgram`] and ignored
    /// for every other command. A malformed reply is reissued on a fresh
    /// connection up to [`MAX_CALL_ATTEMPTS`] times in total before the last
    /// decode failure propagates.
    pub fn call(
        &self,
        command: Command,
        protocol_number: Option<u32>,
    ) -> Result<Response, PathwayError> {
        self.call_with(command, protocol_number, None)
    }

    /// Like [`call`](Self::call) with a per-call verbosity override.
    pub fn call_with(
        &self,
        command: Command,
        protocol_number: Option<u32>,
        verbose: Option<bool>,
    ) -> Result<Response, PathwayError> {
        if self.config.reuse_socket {
            return Err(PathwayError::InvalidArgument(
                "socket reuse across calls is not supported".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.exchange(command, protocol_number) {
                Ok(response) => {
                    if verbose.unwrap_or(self.verbose) {
                        info!("{command} -> {response:?}");
                    } else {
                        debug!("{command} -> {response:?}");
                    }
                    return Ok(response);
                }
                Err(PathwayError::Decode(err)) if attempt < MAX_CALL_ATTEMPTS => {
                    warn!(
                        "attempt {attempt}/{MAX_CALL_ATTEMPTS}: malformed response to {command}, reissuing: {err}"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One command/response exchange over its own connection. The stream is
    /// dropped on every exit path, including the retry path in `call_with`.
    fn exchange(
        &self,
        command: Command,
        protocol_number: Option<u32>,
    ) -> Result<Response, PathwayError> {
        // Encoding precedes the connect, so argument errors never touch the
        // network.
        let timestamp = Utc::now().timestamp() as u32;
        let frame = protocol::encode_command(command, protocol_number, timestamp)?;

        let mut stream = TcpStream::connect_timeout(&self.socket_addr, self.config.connect_timeout)
            .map_err(|e| {
                warn!("failed to connect to {}: {e}", self.socket_addr);
                if e.kind() == std::io::ErrorKind::TimedOut {
                    PathwayError::Timeout
                } else {
                    PathwayError::Io(e)
                }
            })?;
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_write_timeout(Some(self.config.write_timeout))?;

        trace!(
            "sending {} bytes to {}: {frame:02x?}",
            frame.len(),
            self.socket_addr
        );
        stream.write_all(&frame)?;
        stream.flush()?;

        // The device needs settling time before it has a response ready.
        thread::sleep(self.config.settle_delay);

        let mut data = vec![0u8; self.config.buffer_size];
        let received = stream.read(&mut data)?;
        data.truncate(received);
        trace!("received {received} bytes: {data:02x?}");

        Ok(protocol::decode_response(&data)?)
    }

    /// Poll STATUS until `to_watch` equals `desired_value`.
    ///
    /// The device enters a pre-test phase of unknowable duration during
    /// which triggers are silently dropped; polling is the only way to know
    /// when a transition has actually happened. A STATUS reply that cannot
    /// be decoded counts as [`RESPONSE_FORMAT_ERROR`] and keeps the loop
    /// alive; transport failures propagate.
    ///
    /// Sleeps `poll_interval` between attempts. `poll_max <= 0` polls
    /// forever. On a match the call sleeps `server_lag` before returning
    /// `true`, so a command issued right after the transition became visible
    /// is not missed by the device. Exhausting `poll_max` returns `false`
    /// without applying the lag.
    pub fn poll_for_change(
        &self,
        to_watch: WatchField,
        desired_value: &str,
        poll_interval: Duration,
        poll_max: i32,
        verbose: bool,
        server_lag: Duration,
    ) -> Result<bool, PathwayError> {
        let mut count = 0i32;
        loop {
            count += 1;
            if verbose {
                info!("poll {count}: watching {to_watch} for {desired_value}");
            }
            let value = match self.call_with(Command::Status, None, Some(false)) {
                Ok(response) => response.field_value(to_watch),
                Err(PathwayError::Decode(err)) => {
                    warn!("poll {count}: no usable response: {err}");
                    RESPONSE_FORMAT_ERROR
                }
                Err(err) => return Err(err),
            };
            if verbose {
                info!("poll {count}: current value {value}");
            }
            if value == desired_value {
                thread::sleep(server_lag);
                return Ok(true);
            }
            if poll_max > 0 && count >= poll_max {
                warn!("polling limit of {poll_max} exceeded while watching {to_watch}");
                return Ok(false);
            }
            thread::sleep(poll_interval);
        }
    }

    // Convenience wrappers around call

    /// Query device status.
    pub fn status(&self) -> Result<Response, PathwayError> {
        self.call(Command::Status, None)
    }

    /// Load the test program with the given protocol number.
    pub fn program(&self, protocol_number: u32) -> Result<Response, PathwayError> {
        self.call(Command::TestProgram, Some(protocol_number))
    }

    /// Start the loaded test program.
    pub fn start(&self) -> Result<Response, PathwayError> {
        self.call(Command::Start, None)
    }

    /// Pause the running test.
    pub fn pause(&self) -> Result<Response, PathwayError> {
        self.call(Command::Pause, None)
    }

    /// Trigger the stimulation.
    pub fn trigger(&self) -> Result<Response, PathwayError> {
        self.call(Command::Trigger, None)
    }

    /// Stop the running test.
    pub fn stop(&self) -> Result<Response, PathwayError> {
        self.call(Command::Stop, None)
    }

    /// Abort the running test.
    pub fn abort(&self) -> Result<Response, PathwayError> {
        self.call(Command::Abort, None)
    }

    /// Answer a device prompt with yes.
    pub fn yes(&self) -> Result<Response, PathwayError> {
        self.call(Command::Yes, None)
    }

    /// Answer a device prompt with no.
    pub fn no(&self) -> Result<Response, PathwayError> {
        self.call(Command::No, None)
    }
}
