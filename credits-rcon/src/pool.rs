//! Connection pool keyed by destination.
//!
//! One authenticated session per destination, shared by every order
//! dispatched there. Sessions are created lazily and dropped on the
//! first transport failure; the next command reconnects.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

use credits_types::{CommandOutcome, Destination, DestinationId, Fulfillment};

use crate::{RconClient, RconError};

/// Pooled [`Fulfillment`] implementation.
pub struct RconPool {
    connections: DashMap<DestinationId, Arc<Mutex<RconClient>>>,
    timeout: Duration,
}

impl RconPool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            timeout,
        }
    }

    /// Returns the session for a destination, dialing if absent.
    ///
    /// The map entry is cloned out before any await so no shard lock is
    /// held across IO.
    async fn session(
        &self,
        destination: &Destination,
    ) -> Result<Arc<Mutex<RconClient>>, RconError> {
        if let Some(existing) = self.connections.get(&destination.id) {
            return Ok(existing.clone());
        }

        let client = RconClient::connect(
            &destination.host,
            destination.port,
            &destination.password,
            self.timeout,
        )
        .await?;
        tracing::info!(destination = %destination.name, "Console session established");

        let client = Arc::new(Mutex::new(client));
        self.connections.insert(destination.id, client.clone());
        Ok(client)
    }

    fn evict(&self, id: DestinationId) {
        self.connections.remove(&id);
    }

    async fn try_once(&self, destination: &Destination, command: &str) -> Result<String, RconError> {
        let session = self.session(destination).await?;
        let mut client = session.lock().await;
        client.exec(command).await
    }
}

#[async_trait::async_trait]
impl Fulfillment for RconPool {
    async fn execute(&self, destination: &Destination, command: &str) -> CommandOutcome {
        match self.try_once(destination, command).await {
            Ok(response) => CommandOutcome::ok(response),
            Err(first) => {
                // Stale sessions surface here after a server restart.
                // Drop the connection and retry once on a fresh one.
                tracing::warn!(
                    destination = %destination.name,
                    error = %first,
                    "Console command failed, reconnecting"
                );
                self.evict(destination.id);

                match self.try_once(destination, command).await {
                    Ok(response) => CommandOutcome::ok(response),
                    Err(second) => {
                        self.evict(destination.id);
                        tracing::error!(
                            destination = %destination.name,
                            error = %second,
                            "Console command failed after reconnect"
                        );
                        CommandOutcome::failed(second.to_string())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        AUTH_FAILED_ID, Packet, TYPE_AUTH, TYPE_AUTH_RESPONSE, TYPE_EXEC, TYPE_RESPONSE_VALUE,
        read_packet, write_packet,
    };
    use tokio::net::TcpListener;

    async fn spawn_server(password: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    loop {
                        let request = match read_packet(&mut stream).await {
                            Ok(p) => p,
                            Err(_) => return,
                        };
                        let response = match request.packet_type {
                            TYPE_AUTH => Packet {
                                id: if request.body == password {
                                    request.id
                                } else {
                                    AUTH_FAILED_ID
                                },
                                packet_type: TYPE_AUTH_RESPONSE,
                                body: String::new(),
                            },
                            TYPE_EXEC => Packet {
                                id: request.id,
                                packet_type: TYPE_RESPONSE_VALUE,
                                body: format!("ok:{}", request.body),
                            },
                            _ => return,
                        };
                        if write_packet(&mut stream, &response).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        port
    }

    fn destination(port: u16, password: &str) -> Destination {
        Destination {
            id: DestinationId(1),
            name: "test-server".into(),
            host: "127.0.0.1".into(),
            port,
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_execute_success() {
        let port = spawn_server("secret").await;
        let pool = RconPool::new(Duration::from_secs(2));

        let outcome = pool.execute(&destination(port, "secret"), "status").await;
        assert!(outcome.success);
        assert_eq!(outcome.response, "ok:status");
    }

    #[tokio::test]
    async fn test_session_is_reused() {
        let port = spawn_server("secret").await;
        let pool = RconPool::new(Duration::from_secs(2));
        let dest = destination(port, "secret");

        pool.execute(&dest, "first").await;
        pool.execute(&dest, "second").await;
        assert_eq!(pool.connections.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_server_folds_to_failure() {
        let pool = RconPool::new(Duration::from_millis(500));
        let outcome = pool.execute(&destination(1, "x"), "status").await;

        assert!(!outcome.success);
        assert!(outcome.error.is_some());
        assert_eq!(pool.connections.len(), 0);
    }

    #[tokio::test]
    async fn test_bad_password_folds_to_failure() {
        let port = spawn_server("secret").await;
        let pool = RconPool::new(Duration::from_secs(2));

        let outcome = pool.execute(&destination(port, "wrong"), "status").await;
        assert!(!outcome.success);
    }
}
