use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use leasewire::v4::message::{Message, BOOT_REPLY};
use leasewire::v4::options::{DhcpOption, MessageType, OptionCode};
use leasewire::v4::transaction::RetryPolicy;
use leasewire::{ClientConfig, DhcpClient, LeasewireError};

const SERVER_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
const OFFERED_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 50);
const SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

fn mac() -> Bytes {
    Bytes::from_static(&[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4])
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_timeout: Duration::from_millis(100),
        max_timeout: Duration::from_secs(2),
        max_retries: 1,
    }
}

fn reply_to(msg: &Message, msg_type: MessageType) -> Message {
    let mut reply = Message::new_request(msg.xid, msg.chaddr.clone());
    reply.op = BOOT_REPLY;
    reply.insert_option(DhcpOption::MessageType(msg_type));
    reply.insert_option(DhcpOption::ServerIdentifier(SERVER_IP));
    reply
}

/// Starts a minimal loopback DHCP server: OFFERs a fixed address for every
/// DISCOVER and answers each REQUEST with an ACK (or a NAK when `nak` is
/// set). Received REQUESTs are counted; every decoded inbound message is
/// forwarded to the test body. The socket is bound before this returns so
/// the client's first datagram cannot race the server startup.
async fn start_test_server(
    server_port: u16,
    client_port: u16,
    nak: bool,
    request_count: Arc<AtomicUsize>,
    seen: mpsc::UnboundedSender<Message>,
) {
    let socket = UdpSocket::bind((SERVER_IP, server_port)).await.unwrap();
    tokio::spawn(serve(socket, client_port, nak, request_count, seen));
}

async fn serve(
    socket: UdpSocket,
    client_port: u16,
    nak: bool,
    request_count: Arc<AtomicUsize>,
    seen: mpsc::UnboundedSender<Message>,
) {
    let mut buf = [0u8; 1500];

    loop {
        let (len, _from) = socket.recv_from(&mut buf).await.unwrap();
        let msg = Message::decode(&buf[..len]).unwrap();
        let _ = seen.send(msg.clone());

        let reply = match msg.message_type() {
            Some(MessageType::Discover) => {
                let mut offer = reply_to(&msg, MessageType::Offer);
                offer.yiaddr = OFFERED_IP;
                offer.insert_option(DhcpOption::SubnetMask(SUBNET_MASK));
                offer.insert_option(DhcpOption::LeaseTime(3600));
                offer
            }
            Some(MessageType::Request) => {
                request_count.fetch_add(1, Ordering::SeqCst);
                if nak {
                    let mut reply = reply_to(&msg, MessageType::Nak);
                    reply.insert_option(DhcpOption::Message(
                        "requested address not available".to_string(),
                    ));
                    reply
                } else {
                    let mut ack = reply_to(&msg, MessageType::Ack);
                    ack.yiaddr = OFFERED_IP;
                    ack.insert_option(DhcpOption::SubnetMask(SUBNET_MASK));
                    ack.insert_option(DhcpOption::LeaseTime(3600));
                    ack.insert_option(DhcpOption::RenewalTime(1800));
                    ack.insert_option(DhcpOption::RebindingTime(3150));
                    ack
                }
            }
            _ => continue,
        };

        socket
            .send_to(&reply.encode().unwrap(), (SERVER_IP, client_port))
            .await
            .unwrap();
    }
}

fn client_config(client_port: u16, server_port: u16) -> ClientConfig {
    ClientConfig::new(mac())
        .with_server(SERVER_IP)
        .with_ports(client_port, server_port)
        .with_retry_policy(fast_retry())
}

#[tokio::test]
async fn obtains_lease_from_loopback_server() {
    let requests = Arc::new(AtomicUsize::new(0));
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    start_test_server(50010, 50011, false, requests.clone(), seen_tx).await;

    let mut client = DhcpClient::new(client_config(50011, 50010)).await.unwrap();
    let lease = client.get_lease().await.unwrap();

    assert_eq!(lease.client_ip, OFFERED_IP);
    assert_eq!(lease.subnet_mask, Some(SUBNET_MASK));
    assert_eq!(lease.server, Some(SERVER_IP));
    assert_eq!(lease.lease_duration, Some(Duration::from_secs(3600)));
    assert_eq!(lease.renewal_time, Some(Duration::from_secs(1800)));
    assert_eq!(lease.rebinding_time, Some(Duration::from_secs(3150)));
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn silent_server_times_out_within_bounds() {
    // Nothing listens on this port pair; with max_retries = 1 and a 100 ms
    // base the exchange is bounded by roughly 100 + 200 ms.
    let mut client = DhcpClient::new(client_config(50021, 50020)).await.unwrap();

    let started = Instant::now();
    let result = client.get_lease().await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(LeasewireError::Timeout)));
    assert!(elapsed >= Duration::from_millis(250), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "did not stay bounded: {elapsed:?}");
}

#[tokio::test]
async fn nak_surfaces_lease_denied_without_retransmission() {
    let requests = Arc::new(AtomicUsize::new(0));
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    start_test_server(50030, 50031, true, requests.clone(), seen_tx).await;

    let mut client = DhcpClient::new(client_config(50031, 50030)).await.unwrap();
    let result = client.get_lease().await;

    assert!(matches!(
        result,
        Err(LeasewireError::LeaseDenied(Some(ref reason)))
            if reason == "requested address not available"
    ));

    // The NAK is terminal; give any stray retransmission time to arrive.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn caller_client_identifier_is_merged_once_into_discover() {
    let requests = Arc::new(AtomicUsize::new(0));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    start_test_server(50040, 50041, false, requests.clone(), seen_tx).await;

    let caller_id = DhcpOption::client_identifier(1, "de:ad:be:ef:00:01").unwrap();
    let config = client_config(50041, 50040).with_options(vec![caller_id.clone()]);
    let mut client = DhcpClient::new(config).await.unwrap();
    client.get_lease().await.unwrap();

    let discover = seen_rx.recv().await.unwrap();
    assert_eq!(discover.message_type(), Some(MessageType::Discover));

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
}

#[tokio::test]
async fn overall_deadline_cuts_retries_short() {
    let policy = RetryPolicy {
        base_timeout: Duration::from_millis(200),
        max_timeout: Duration::from_secs(2),
        max_retries: 10,
    };
    let config = ClientConfig::new(mac())
        .with_server(SERVER_IP)
        .with_ports(50051, 50050)
        .with_retry_policy(policy)
        .with_deadline(Duration::from_millis(300));
    let mut client = DhcpClient::new(config).await.unwrap();

    let started = Instant::now();
    let result = client.get_lease().await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(LeasewireError::Timeout)));
    assert!(elapsed < Duration::from_secs(1), "deadline ignored: {elapsed:?}");
}
