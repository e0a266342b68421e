//! The client engine: drives one transaction over a UDP socket.
//!
//! The engine owns the socket, the clock, and the retransmission loop; the
//! protocol decisions live in [`Transaction`]. One `get_lease` call runs one
//! exchange to completion and returns either a fully populated [`Lease`] or
//! exactly one error.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::time::{self, Instant};

use crate::config::ClientConfig;
use crate::error::{LeasewireError, Result};
use crate::network::{self, SocketError};
use crate::v4::lease::Lease;
use crate::v4::message::Message;
use crate::v4::transaction::{Action, Transaction};

pub struct DhcpClient {
    config: ClientConfig,
    socket: UdpSocket,
}

impl DhcpClient {
    /// Binds the client socket. Bind failures are fatal and surface
    /// immediately; nothing here is retried.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let socket = network::new_tokio_socket(
            config.bind_address,
            config.client_port,
            config.interface.as_deref(),
        )?;
        Ok(Self { config, socket })
    }

    fn destination(&self) -> SocketAddr {
        let server = self.config.server.unwrap_or(Ipv4Addr::BROADCAST);
        SocketAddr::from((server, self.config.server_port))
    }

    /// Runs one DISCOVER/OFFER/REQUEST/ACK exchange and returns the lease.
    ///
    /// The call blocks (awaits) for the duration of the exchange: at most
    /// two sends plus retransmissions under the configured backoff policy,
    /// bounded by the optional overall deadline.
    pub async fn get_lease(&mut self) -> Result<Lease> {
        let xid: u32 = rand::random();
        let mut tx = Transaction::new(
            xid,
            self.config.hardware_address.clone(),
            self.config.server.is_none(),
            self.config.server,
            self.config.options.clone(),
            self.config.retry,
        );
        let deadline = self.config.overall_deadline.map(|d| Instant::now() + d);
        let dest = self.destination();

        tracing::debug!("starting lease acquisition, xid {xid:08x}, server {dest}");

        let mut action = tx.start()?;
        loop {
            match action {
                Action::Send(payload) => match self.socket.send_to(&payload, dest).await {
                    Ok(len) => {
                        tracing::debug!(bytes = len, %dest, state = tx.state_name(), "sent");
                        action = self.wait_for_reply(&mut tx, deadline).await?;
                    }
                    Err(source) => {
                        // A failed send consumes the same budget as a
                        // missing response; once it runs out the socket
                        // error surfaces, not Timeout.
                        tracing::warn!(error = %source, "send failed, consuming one retry");
                        match tx.handle_timeout() {
                            Action::Send(retry_payload) => {
                                self.back_off(tx.window(), deadline).await?;
                                action = Action::Send(retry_payload);
                            }
                            _ => return Err(SocketError::Send(source).into()),
                        }
                    }
                },
                Action::Complete(lease) => {
                    tracing::info!(%lease, "bound");
                    return Ok(lease);
                }
                Action::Fail(err) => return Err(err),
                // The receive loop swallows Ignore; nothing to do here.
                Action::Ignore => continue,
            }
        }
    }

    /// Waits out the transaction's current receive window, feeding every
    /// datagram to the state machine. Non-matching datagrams do not extend
    /// the window.
    async fn wait_for_reply(
        &self,
        tx: &mut Transaction,
        deadline: Option<Instant>,
    ) -> Result<Action> {
        let mut buf = [0u8; 1500];
        let window_end = Instant::now() + tx.window();

        loop {
            let recv_deadline = match deadline {
                Some(overall) => window_end.min(overall),
                None => window_end,
            };

            match time::timeout_at(recv_deadline, self.socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => {
                    tracing::trace!(bytes = len, %from, "received datagram");
                    let msg = Message::decode(&buf[..len])?;
                    match tx.handle_message(&msg)? {
                        Action::Ignore => continue,
                        other => return Ok(other),
                    }
                }
                Ok(Err(source)) => return Err(SocketError::Receive(source).into()),
                Err(_) => {
                    if let Some(overall) = deadline {
                        if Instant::now() >= overall {
                            tracing::debug!("overall deadline reached");
                            return Ok(Action::Fail(LeasewireError::Timeout));
                        }
                    }
                    return Ok(tx.handle_timeout());
                }
            }
        }
    }

    /// Sleeps before a post-send-failure retry, honoring the overall
    /// deadline.
    async fn back_off(&self, window: time::Duration, deadline: Option<Instant>) -> Result<()> {
        let wake = Instant::now() + window;
        let wake = match deadline {
            Some(overall) => wake.min(overall),
            None => wake,
        };
        time::sleep_until(wake).await;
        if let Some(overall) = deadline {
            if Instant::now() >= overall {
                return Err(LeasewireError::Timeout);
            }
        }
        Ok(())
    }
}
