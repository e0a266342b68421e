use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::Bytes;

use crate::error::LeasewireError;
use crate::v4::message::{build_discover, Message, BOOT_REPLY};
use crate::v4::options::{DhcpOption, MessageType, OptionCode};
use crate::v4::transaction::{Action, RetryPolicy, Transaction, TxState};

fn mac() -> Bytes {
    Bytes::from_static(&[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4])
}

fn reply(xid: u32, msg_type: MessageType, yiaddr: Ipv4Addr, server: Ipv4Addr) -> Message {
    let mut msg = Message::new_request(xid, mac());
    msg.op = BOOT_REPLY;
    msg.yiaddr = yiaddr;
    msg.insert_option(DhcpOption::MessageType(msg_type));
    msg.insert_option(DhcpOption::ServerIdentifier(server));
    msg
}

fn started_transaction(policy: RetryPolicy) -> Transaction {
    let mut tx = Transaction::new(0x1234_5678, mac(), true, None, Vec::new(), policy);
    let action = tx.start().unwrap();
    assert!(matches!(action, Action::Send(_)));
    assert_eq!(tx.state(), TxState::DiscoverSent);
    tx
}

const SERVER: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const OFFERED: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 50);

#[test]
fn discover_carries_caller_client_identifier_once() {
    let caller_id = DhcpOption::ClientIdentifier {
        hardware_type: 1,
        hardware_addr: vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x01],
    };
    let discover = build_discover(1, &mac(), true, std::slice::from_ref(&caller_id));

    let client_ids: Vec<_> = discover
        .options
        .iter()
        .filter(|o| o.code() == OptionCode::ClientIdentifier as u8)
        .collect();
    assert_eq!(client_ids, vec![&caller_id]);

    let type_count = discover
        .options
        .iter()
        .filter(|o| o.code() == OptionCode::MessageType as u8)
        .count();
    assert_eq!(type_count, 1);
    assert_eq!(discover.message_type(), Some(MessageType::Discover));
}

#[test]
fn discover_drops_engine_controlled_caller_options() {
    let extra = vec![
        DhcpOption::MessageType(MessageType::Ack),
        DhcpOption::RequestedIpAddress(Ipv4Addr::new(10, 0, 0, 9)),
        DhcpOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 1)),
        DhcpOption::Hostname("client".to_string()),
    ];
    let discover = build_discover(1, &mac(), false, &extra);

    assert_eq!(discover.message_type(), Some(MessageType::Discover));
    assert!(discover.option(OptionCode::RequestedIpAddress).is_none());
    assert!(discover.option(OptionCode::ServerIdentifier).is_none());
    assert!(matches!(
        discover.option(OptionCode::Hostname),
        Some(DhcpOption::Hostname(name)) if name == "client"
    ));
}

#[test]
fn offer_with_wrong_xid_is_ignored() {
    let mut tx = started_transaction(RetryPolicy::default());

    let offer = reply(0xffff_ffff, MessageType::Offer, OFFERED, SERVER);
    let action = tx.handle_message(&offer).unwrap();

    assert!(matches!(action, Action::Ignore));
    assert_eq!(tx.state(), TxState::DiscoverSent);
}

#[test]
fn offer_from_non_selected_server_is_ignored() {
    let target = Ipv4Addr::new(10, 9, 9, 9);
    let mut tx = Transaction::new(
        7,
        mac(),
        false,
        Some(target),
        Vec::new(),
        RetryPolicy::default(),
    );
    tx.start().unwrap();

    let offer = reply(7, MessageType::Offer, OFFERED, SERVER);
    assert!(matches!(tx.handle_message(&offer).unwrap(), Action::Ignore));
    assert_eq!(tx.state(), TxState::DiscoverSent);

    let offer = reply(7, MessageType::Offer, OFFERED, target);
    assert!(matches!(tx.handle_message(&offer).unwrap(), Action::Send(_)));
    assert_eq!(tx.state(), TxState::RequestSent);
}

#[test]
fn accepted_offer_produces_matching_request() {
    let mut tx = started_transaction(RetryPolicy::default());

    let offer = reply(tx.xid(), MessageType::Offer, OFFERED, SERVER);
    let Action::Send(payload) = tx.handle_message(&offer).unwrap() else {
        panic!("expected a REQUEST to be sent");
    };
    assert_eq!(tx.state(), TxState::RequestSent);
    assert_eq!(tx.selected_server(), Some(SERVER));
    assert_eq!(tx.offered_ip(), Some(OFFERED));

    let request = Message::decode(&payload).unwrap();
    assert_eq!(request.xid, tx.xid());
    assert_eq!(request.message_type(), Some(MessageType::Request));
    assert!(matches!(
        request.option(OptionCode::RequestedIpAddress),
        Some(DhcpOption::RequestedIpAddress(ip)) if *ip == OFFERED
    ));
    assert_eq!(request.server_identifier(), Some(SERVER));
}

#[test]
fn later_offers_are_ignored_after_acceptance() {
    let mut tx = started_transaction(RetryPolicy::default());

    let offer = reply(tx.xid(), MessageType::Offer, OFFERED, SERVER);
    tx.handle_message(&offer).unwrap();

    let rival = reply(
        tx.xid(),
        MessageType::Offer,
        Ipv4Addr::new(192, 0, 2, 99),
        Ipv4Addr::new(192, 0, 2, 2),
    );
    assert!(matches!(tx.handle_message(&rival).unwrap(), Action::Ignore));
    assert_eq!(tx.selected_server(), Some(SERVER));
    assert_eq!(tx.state(), TxState::RequestSent);
}

#[test]
fn offer_without_server_identifier_is_ignored() {
    let mut tx = started_transaction(RetryPolicy::default());

    let mut offer = Message::new_request(tx.xid(), mac());
    offer.op = BOOT_REPLY;
    offer.yiaddr = OFFERED;
    offer.insert_option(DhcpOption::MessageType(MessageType::Offer));

    assert!(matches!(tx.handle_message(&offer).unwrap(), Action::Ignore));
    assert_eq!(tx.state(), TxState::DiscoverSent);
}

#[test]
fn ack_completes_with_lease() {
    let mut tx = started_transaction(RetryPolicy::default());
    let offer = reply(tx.xid(), MessageType::Offer, OFFERED, SERVER);
    tx.handle_message(&offer).unwrap();

    let mut ack = reply(tx.xid(), MessageType::Ack, OFFERED, SERVER);
    ack.insert_option(DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)));
    ack.insert_option(DhcpOption::LeaseTime(3600));

    let Action::Complete(lease) = tx.handle_message(&ack).unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(tx.state(), TxState::Bound);
    assert_eq!(lease.client_ip, OFFERED);
    assert_eq!(lease.subnet_mask, Some(Ipv4Addr::new(255, 255, 255, 0)));
    assert_eq!(lease.lease_duration, Some(Duration::from_secs(3600)));
}

#[test]
fn nak_is_terminal_with_no_retransmission() {
    let mut tx = started_transaction(RetryPolicy::default());
    let offer = reply(tx.xid(), MessageType::Offer, OFFERED, SERVER);
    tx.handle_message(&offer).unwrap();

    let mut nak = reply(tx.xid(), MessageType::Nak, Ipv4Addr::UNSPECIFIED, SERVER);
    nak.insert_option(DhcpOption::Message("address in use".to_string()));

    let action = tx.handle_message(&nak).unwrap();
    assert!(matches!(
        action,
        Action::Fail(LeasewireError::LeaseDenied(Some(ref reason))) if reason == "address in use"
    ));
    assert_eq!(tx.state(), TxState::NakReceived);
}

#[test]
fn lease_denied_display_carries_server_reason() {
    let with_reason = LeasewireError::LeaseDenied(Some("address in use".to_string()));
    assert_eq!(
        with_reason.to_string(),
        "Lease denied by server: address in use"
    );

    let without_reason = LeasewireError::LeaseDenied(None);
    assert_eq!(without_reason.to_string(), "Lease denied by server");
}

#[test]
fn timeout_doubles_window_then_exhausts() {
    let policy = RetryPolicy {
        base_timeout: Duration::from_millis(100),
        max_timeout: Duration::from_secs(64),
        max_retries: 1,
    };
    let mut tx = started_transaction(policy);
    assert_eq!(tx.window(), Duration::from_millis(100));

    assert!(matches!(tx.handle_timeout(), Action::Send(_)));
    assert_eq!(tx.window(), Duration::from_millis(200));

    assert!(matches!(
        tx.handle_timeout(),
        Action::Fail(LeasewireError::Timeout)
    ));
    assert_eq!(tx.state(), TxState::TimedOut);
}

#[test]
fn backoff_window_is_capped() {
    let policy = RetryPolicy {
        base_timeout: Duration::from_millis(80),
        max_timeout: Duration::from_millis(150),
        max_retries: 3,
    };
    let mut tx = started_transaction(policy);

    tx.handle_timeout();
    assert_eq!(tx.window(), Duration::from_millis(150));
    tx.handle_timeout();
    assert_eq!(tx.window(), Duration::from_millis(150));
}

#[test]
fn stage_advance_resets_backoff() {
    let policy = RetryPolicy {
        base_timeout: Duration::from_millis(100),
        max_timeout: Duration::from_secs(64),
        max_retries: 3,
    };
    let mut tx = started_transaction(policy);
    tx.handle_timeout();
    assert_eq!(tx.window(), Duration::from_millis(200));

    let offer = reply(tx.xid(), MessageType::Offer, OFFERED, SERVER);
    tx.handle_message(&offer).unwrap();
    assert_eq!(tx.state(), TxState::RequestSent);
    assert_eq!(tx.window(), Duration::from_millis(100));
}
