//! # Credits RCON
//!
//! Remote-console adapter that delivers purchased goods by running
//! commands on game servers. A connection pool keyed by destination
//! keeps authenticated sessions alive across orders and reconnects
//! transparently when a server drops the link.

pub mod protocol;

mod pool;

pub use pool::RconPool;

use std::time::Duration;

use tokio::net::TcpStream;

use protocol::{AUTH_FAILED_ID, Packet, ProtocolError, read_packet, write_packet};

/// Error type for console operations.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Authentication rejected by server")]
    AuthFailed,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// One authenticated console session.
pub struct RconClient {
    stream: TcpStream,
    timeout: Duration,
    next_id: i32,
}

impl RconClient {
    /// Connects and authenticates within the given timeout.
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, RconError> {
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| RconError::Timeout(timeout))?
            .map_err(|e| RconError::Connect(e.to_string()))?;

        let mut client = Self {
            stream,
            timeout,
            next_id: 1,
        };
        client.authenticate(password).await?;
        Ok(client)
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        let id = self.take_id();
        let request = Packet::auth(id, password);

        let response = self.round_trip(&request).await?;
        if response.id == AUTH_FAILED_ID || response.id != id {
            return Err(RconError::AuthFailed);
        }
        Ok(())
    }

    /// Runs one command and returns the server's textual response.
    pub async fn exec(&mut self, command: &str) -> Result<String, RconError> {
        let id = self.take_id();
        let request = Packet::exec(id, command);
        let response = self.round_trip(&request).await?;
        Ok(response.body)
    }

    async fn round_trip(&mut self, request: &Packet) -> Result<Packet, RconError> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, async {
            write_packet(&mut self.stream, request).await?;
            let response = read_packet(&mut self.stream).await?;
            Ok::<_, RconError>(response)
        })
        .await
        .map_err(|_| RconError::Timeout(timeout))?
    }

    fn take_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }
}
