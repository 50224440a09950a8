//! TCP control channel
//!
//! A single remote peer toggles the device between off air and on air by
//! sending raw command bytes. One connection is served at a time and only
//! while the device is idle. Nothing is ever sent back.

use crate::state_machine::{DevicePhase, InvalidTransition, StatusRegister};
use embedded_io_async::Read;
use log::{debug, error, info, warn};

/// Receive buffer size for one read
const RX_BUFFER_SIZE: usize = 128;

/// Command byte switching to off air
pub const OFF_AIR_COMMAND: u8 = 0x00;

/// Command byte switching to on air
pub const ON_AIR_COMMAND: u8 = 0x01;

/// A recognized command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OffAir,
    OnAir,
}

impl Command {
    /// Decode one wire byte, `None` for anything unrecognized
    pub fn parse(byte: u8) -> Option<Self> {
        match byte {
            OFF_AIR_COMMAND => Some(Command::OffAir),
            ON_AIR_COMMAND => Some(Command::OnAir),
            _ => None,
        }
    }

    /// Phase the command asks for
    pub fn target(self) -> DevicePhase {
        match self {
            Command::OffAir => DevicePhase::OffAir,
            Command::OnAir => DevicePhase::OnAir,
        }
    }
}

/// Why a session stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer closed the stream
    Closed,
    /// Receiving failed
    ReadFailed,
    /// Another task moved the device out of the broadcasting phases
    Detached,
}

/// One accepted control connection, from accept to disconnect
pub struct ControlSession<'a> {
    status: &'a StatusRegister,
    detached: bool,
}

impl<'a> ControlSession<'a> {
    /// Start a session: the device goes from `Idle` to `OffAir`
    pub fn open(status: &'a StatusRegister) -> Result<Self, InvalidTransition> {
        status.transition_from(DevicePhase::Idle, DevicePhase::OffAir)?;

        Ok(Self {
            status,
            detached: false,
        })
    }

    /// Whether the device left `OffAir`/`OnAir` under this session.
    /// A detached session never changes the phase again.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Apply received bytes in order
    pub fn handle_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            info!("[CTRL] Got message {}", byte);
            match Command::parse(byte) {
                Some(command) => self.apply(command),
                None => warn!("[CTRL] Unknown message 0x{:02x} ignored", byte),
            }
        }
    }

    fn apply(&mut self, command: Command) {
        if self.detached {
            debug!("[CTRL] Detached session, {:?} ignored", command);
            return;
        }

        let target = command.target();
        match self.status.read() {
            current if current == target => debug!("[CTRL] Already {:?}", target),
            current @ (DevicePhase::OffAir | DevicePhase::OnAir) => {
                // Only fails if another task got in between; the next command sees it
                let _ = self.status.transition_from(current, target);
            }
            other => {
                warn!("[CTRL] Device went {:?}, session detached", other);
                self.detached = true;
            }
        }
    }

    /// Read and apply commands until the peer goes away
    pub async fn serve<R: Read>(&mut self, reader: &mut R) -> SessionEnd {
        let mut rx_buffer = [0u8; RX_BUFFER_SIZE];

        loop {
            match reader.read(&mut rx_buffer).await {
                Ok(0) => {
                    info!("[CTRL] Connection closed");
                    return SessionEnd::Closed;
                }
                Ok(len) => {
                    self.handle_bytes(&rx_buffer[..len]);
                    if self.detached {
                        return SessionEnd::Detached;
                    }
                }
                Err(e) => {
                    error!("[CTRL] Error occurred during receiving: {:?}", e);
                    return SessionEnd::ReadFailed;
                }
            }
        }
    }

    /// End the session: the device returns to `Idle`
    ///
    /// If the phase moved elsewhere meanwhile (link loss, failure) it is left
    /// untouched.
    pub fn close(self) {
        if self.detached {
            return;
        }
        match self.status.read() {
            phase @ (DevicePhase::OffAir | DevicePhase::OnAir) => {
                let _ = self.status.transition_from(phase, DevicePhase::Idle);
            }
            other => debug!("[CTRL] Session ended while {:?}", other),
        }
    }
}

#[cfg(target_os = "none")]
pub use listener::ControlServer;

#[cfg(target_os = "none")]
mod listener {
    use super::{ControlSession, SessionEnd};
    use crate::config;
    use crate::state_machine::{DevicePhase, StatusRegister};
    use embassy_net::{Stack, tcp::TcpSocket};
    use embassy_time::{Duration, Timer};
    use log::{error, info, warn};

    /// Socket buffer sizes
    const RX_SOCKET_BUFFER: usize = 512;
    const TX_SOCKET_BUFFER: usize = 64;

    /// Polling interval while waiting for the device to become idle
    const IDLE_POLL: Duration = Duration::from_millis(100);

    /// Single-connection TCP listener for the control channel
    pub struct ControlServer<'a> {
        stack: Stack<'a>,
        port: u16,
        status: &'a StatusRegister,
    }

    impl<'a> ControlServer<'a> {
        pub fn new(stack: Stack<'a>, port: u16, status: &'a StatusRegister) -> Self {
            Self {
                stack,
                port,
                status,
            }
        }

        /// Accept and serve control sessions forever
        pub async fn run(&mut self) -> ! {
            let mut rx_buffer = [0u8; RX_SOCKET_BUFFER];
            let mut tx_buffer = [0u8; TX_SOCKET_BUFFER];

            loop {
                self.wait_for_idle().await;

                let mut socket = TcpSocket::new(self.stack, &mut rx_buffer, &mut tx_buffer);
                socket.set_keep_alive(Some(Duration::from_secs(config::KEEPALIVE_INTERVAL_SECS)));
                socket.set_timeout(Some(Duration::from_secs(
                    config::KEEPALIVE_IDLE_SECS
                        + config::KEEPALIVE_INTERVAL_SECS * config::KEEPALIVE_COUNT,
                )));

                info!("[CTRL] Socket listening on port {}", self.port);
                if let Err(e) = socket.accept(self.port).await {
                    error!("[CTRL] Unable to accept connection: {:?}", e);
                    continue;
                }

                info!("[CTRL] Socket accepted from {:?}", socket.remote_endpoint());

                match ControlSession::open(self.status) {
                    Ok(mut session) => {
                        match session.serve(&mut socket).await {
                            SessionEnd::Closed => {}
                            end => warn!("[CTRL] Session ended: {:?}", end),
                        }
                        socket.close();
                        session.close();
                    }
                    Err(e) => {
                        warn!("[CTRL] Connection refused, {}", e);
                        socket.abort();
                    }
                }

                // Let the FIN or RST reach the peer before the socket is reused
                let _ = socket.flush().await;
            }
        }

        async fn wait_for_idle(&self) {
            while self.status.read() != DevicePhase::Idle {
                Timer::after(IDLE_POLL).await;
            }
        }
    }
}
