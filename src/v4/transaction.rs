//! One DISCOVER → OFFER → REQUEST → ACK/NAK exchange.
//!
//! The transaction is a pure state machine: it owns the transaction ID, the
//! retry budget and the current receive window, and turns inbound messages
//! and timeouts into [`Action`]s. All socket I/O and clock handling lives in
//! the engine ([`DhcpClient`](crate::DhcpClient)), which is the only mutator
//! of a transaction.

use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{LeasewireError, Result};
use crate::v4::lease::Lease;
use crate::v4::message::{build_discover, build_request, Message, BOOT_REPLY};
use crate::v4::options::{DhcpOption, MessageType};

/// Timeout and retransmission policy for a single transaction.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Receive window for the first attempt of each stage.
    pub base_timeout: Duration,
    /// Upper bound on the doubled window.
    pub max_timeout: Duration,
    /// Retransmissions allowed per stage, so a stage sends at most
    /// `max_retries + 1` datagrams.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(4),
            max_timeout: Duration::from_secs(64),
            max_retries: 3,
        }
    }
}

/// Transaction lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Init,
    DiscoverSent,
    OfferReceived,
    RequestSent,
    /// Success terminal: a lease was extracted from the ACK.
    Bound,
    /// Failure terminal: the server authoritatively rejected the REQUEST.
    NakReceived,
    /// Failure terminal: the retry budget ran out.
    TimedOut,
}

/// The next step the engine must take.
#[derive(Debug)]
pub enum Action {
    /// Transmit the payload, then wait for the current receive window.
    Send(Vec<u8>),
    /// The inbound message was not for us; keep waiting in the same window.
    Ignore,
    /// Terminal success.
    Complete(Lease),
    /// Terminal failure (`LeaseDenied` or `Timeout`).
    Fail(LeasewireError),
}

pub struct Transaction {
    xid: u32,
    state: TxState,
    policy: RetryPolicy,
    /// Retransmissions performed at the current stage.
    retries: u32,
    /// Receive window for the attempt in flight.
    window: Duration,
    chaddr: Bytes,
    broadcast: bool,
    /// When set, only OFFERs from this server are accepted.
    target_server: Option<Ipv4Addr>,
    /// Identifier of the server whose OFFER was accepted.
    selected_server: Option<Ipv4Addr>,
    offered_ip: Option<Ipv4Addr>,
    extra_options: Vec<DhcpOption>,
    /// Exact bytes of the message in flight, retransmitted verbatim.
    last_payload: Vec<u8>,
}

impl Transaction {
    pub fn new(
        xid: u32,
        chaddr: Bytes,
        broadcast: bool,
        target_server: Option<Ipv4Addr>,
        extra_options: Vec<DhcpOption>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            xid,
            state: TxState::Init,
            policy,
            retries: 0,
            window: policy.base_timeout,
            chaddr,
            broadcast,
            target_server,
            selected_server: None,
            offered_ip: None,
            extra_options,
            last_payload: Vec::new(),
        }
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn state_name(&self) -> &'static str {
        match self.state {
            TxState::Init => "Init",
            TxState::DiscoverSent => "DiscoverSent",
            TxState::OfferReceived => "OfferReceived",
            TxState::RequestSent => "RequestSent",
            TxState::Bound => "Bound",
            TxState::NakReceived => "NakReceived",
            TxState::TimedOut => "TimedOut",
        }
    }

    /// The receive window for the attempt currently in flight.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The identifier of the server whose OFFER was accepted, if any.
    pub fn selected_server(&self) -> Option<Ipv4Addr> {
        self.selected_server
    }

    /// The address offered by the selected server, if any.
    pub fn offered_ip(&self) -> Option<Ipv4Addr> {
        self.offered_ip
    }

    /// Kicks off the exchange: emits the DISCOVER and enters `DiscoverSent`.
    pub fn start(&mut self) -> Result<Action> {
        let discover = build_discover(self.xid, &self.chaddr, self.broadcast, &self.extra_options);
        self.last_payload = discover.encode()?;
        self.transition(TxState::DiscoverSent);
        Ok(Action::Send(self.last_payload.clone()))
    }

    /// Feeds a decoded inbound message to the state machine.
    ///
    /// Messages that do not match the transaction (wrong xid, wrong opcode,
    /// unexpected type, wrong server) yield [`Action::Ignore`]; they are
    /// never errors.
    pub fn handle_message(&mut self, msg: &Message) -> Result<Action> {
        if msg.op != BOOT_REPLY || msg.xid != self.xid {
            tracing::debug!(
                "ignoring message with xid {:08x}, ours is {:08x}",
                msg.xid,
                self.xid
            );
            return Ok(Action::Ignore);
        }

        match self.state {
            TxState::DiscoverSent => self.handle_offer(msg),
            TxState::RequestSent => self.handle_request_reply(msg),
            // Terminal or transient states never consume messages; a late
            // OFFER after one was accepted lands here and is dropped.
            _ => Ok(Action::Ignore),
        }
    }

    fn handle_offer(&mut self, msg: &Message) -> Result<Action> {
        if msg.message_type() != Some(MessageType::Offer) {
            return Ok(Action::Ignore);
        }

        // Structural validity: an OFFER we cannot turn into a REQUEST is
        // ignored, not fatal.
        let Some(server_id) = msg.server_identifier() else {
            tracing::debug!("ignoring OFFER without a server identifier");
            return Ok(Action::Ignore);
        };
        if msg.yiaddr.is_unspecified() {
            tracing::debug!("ignoring OFFER without an offered address");
            return Ok(Action::Ignore);
        }
        if let Some(target) = self.target_server {
            if server_id != target {
                tracing::debug!(%server_id, "ignoring OFFER from a non-selected server");
                return Ok(Action::Ignore);
            }
        }

        tracing::debug!(offered_ip = %msg.yiaddr, %server_id, "accepted OFFER");
        self.selected_server = Some(server_id);
        self.offered_ip = Some(msg.yiaddr);
        self.transition(TxState::OfferReceived);

        let request = build_request(
            self.xid,
            &self.chaddr,
            msg.yiaddr,
            server_id,
            self.broadcast,
            &self.extra_options,
        );
        self.last_payload = request.encode()?;
        self.transition(TxState::RequestSent);
        Ok(Action::Send(self.last_payload.clone()))
    }

    fn handle_request_reply(&mut self, msg: &Message) -> Result<Action> {
        match msg.message_type() {
            Some(MessageType::Ack) => {
                let lease = Lease::from_ack(msg);
                self.transition(TxState::Bound);
                Ok(Action::Complete(lease))
            }
            Some(MessageType::Nak) => {
                // A NAK is an authoritative rejection; there is nothing to
                // retry.
                self.transition(TxState::NakReceived);
                Ok(Action::Fail(LeasewireError::LeaseDenied(
                    msg.server_message().map(str::to_string),
                )))
            }
            _ => Ok(Action::Ignore),
        }
    }

    /// Called by the engine when the current receive window expires (or a
    /// send failed): retransmits the stage's message until the budget runs
    /// out, doubling the window each time.
    pub fn handle_timeout(&mut self) -> Action {
        debug_assert!(matches!(
            self.state,
            TxState::DiscoverSent | TxState::RequestSent
        ));

        if self.retries >= self.policy.max_retries {
            self.transition(TxState::TimedOut);
            return Action::Fail(LeasewireError::Timeout);
        }

        self.retries += 1;
        self.window = (self.window * 2).min(self.policy.max_timeout);
        tracing::debug!(
            retry = self.retries,
            window_ms = self.window.as_millis() as u64,
            "retransmitting {}",
            self.state_name()
        );
        Action::Send(self.last_payload.clone())
    }

    fn transition(&mut self, next: TxState) {
        tracing::debug!(
            "xid {:08x}: state {} -> {next:?}",
            self.xid,
            self.state_name()
        );
        self.state = next;
        // Advancing a stage resets the retry budget and the backoff window.
        if matches!(next, TxState::DiscoverSent | TxState::RequestSent) {
            self.retries = 0;
            self.window = self.policy.base_timeout;
        }
    }
}
