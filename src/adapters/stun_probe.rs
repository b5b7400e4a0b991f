//! ICE-style local address gathering over STUN.
//!
//! For every configured STUN server a UDP socket is pointed at the server.
//! The socket's own local address is the *host* candidate (the interface the
//! OS routes LAN traffic through) and the `XOR-MAPPED-ADDRESS` in the Binding
//! Response is the *server-reflexive* candidate. Only the RFC 5389 Binding
//! Request/Response exchange is implemented.
use std::{
    collections::BTreeSet,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::future::join_all;
use rand::Rng;
use thiserror::Error;
use tokio::{net::UdpSocket, time::Instant};

use crate::{
    core::address::is_usable_candidate_ip, ports::local_address_probe::LocalAddressProbe,
    utils::race::or_after,
};

const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS_RESPONSE: u16 = 0x0101;
const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const HEADER_LEN: usize = 20;
const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// Errors decoding a STUN message
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StunError {
    #[error("Message too short: {0} bytes")]
    Truncated(usize),

    #[error("Not a STUN message (bad magic cookie)")]
    BadMagicCookie,

    #[error("Unexpected message type 0x{0:04x}")]
    UnexpectedType(u16),

    #[error("Transaction ID mismatch")]
    TransactionMismatch,

    #[error("Response carries no mapped address")]
    NoMappedAddress,
}

/// Encode a Binding Request with the given transaction ID
pub fn encode_binding_request(transaction_id: &[u8; 12]) -> [u8; HEADER_LEN] {
    let mut message = [0u8; HEADER_LEN];
    message[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    // message[2..4] is the attribute length, zero
    message[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    message[8..20].copy_from_slice(transaction_id);
    message
}

/// Decode a Binding Success Response and return the mapped address.
///
/// `XOR-MAPPED-ADDRESS` is preferred; the legacy `MAPPED-ADDRESS` is accepted
/// from servers that only send that.
pub fn decode_binding_response(
    message: &[u8],
    transaction_id: &[u8; 12],
) -> Result<SocketAddr, StunError> {
    if message.len() < HEADER_LEN {
        return Err(StunError::Truncated(message.len()));
    }

    let message_type = u16::from_be_bytes([message[0], message[1]]);
    let length = u16::from_be_bytes([message[2], message[3]]) as usize;
    let cookie = u32::from_be_bytes([message[4], message[5], message[6], message[7]]);

    if cookie != MAGIC_COOKIE {
        return Err(StunError::BadMagicCookie);
    }
    if message_type != BINDING_SUCCESS_RESPONSE {
        return Err(StunError::UnexpectedType(message_type));
    }
    if &message[8..20] != transaction_id {
        return Err(StunError::TransactionMismatch);
    }
    if message.len() < HEADER_LEN + length {
        return Err(StunError::Truncated(message.len()));
    }

    let mut mapped = None;
    let mut offset = HEADER_LEN;
    let end = HEADER_LEN + length;

    while offset + 4 <= end {
        let attr_type = u16::from_be_bytes([message[offset], message[offset + 1]]);
        let attr_len = u16::from_be_bytes([message[offset + 2], message[offset + 3]]) as usize;
        let value_start = offset + 4;
        let value_end = value_start + attr_len;
        if value_end > end {
            return Err(StunError::Truncated(message.len()));
        }
        let value = &message[value_start..value_end];

        match attr_type {
            ATTR_XOR_MAPPED_ADDRESS => {
                if let Some(addr) = parse_address(value, Some(transaction_id)) {
                    return Ok(addr);
                }
            }
            ATTR_MAPPED_ADDRESS => {
                if mapped.is_none() {
                    mapped = parse_address(value, None);
                }
            }
            _ => {}
        }

        // Attributes are padded to a multiple of four bytes
        offset = value_start + attr_len.div_ceil(4) * 4;
    }

    mapped.ok_or(StunError::NoMappedAddress)
}

fn parse_address(value: &[u8], xor_with: Option<&[u8; 12]>) -> Option<SocketAddr> {
    if value.len() < 4 {
        return None;
    }
    let family = value[1];
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    let cookie = MAGIC_COOKIE.to_be_bytes();

    if xor_with.is_some() {
        port ^= (MAGIC_COOKIE >> 16) as u16;
    }

    match family {
        FAMILY_IPV4 if value.len() >= 8 => {
            let mut octets = [value[4], value[5], value[6], value[7]];
            if xor_with.is_some() {
                for (octet, key) in octets.iter_mut().zip(cookie.iter()) {
                    *octet ^= key;
                }
            }
            Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        FAMILY_IPV6 if value.len() >= 20 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[4..20]);
            if let Some(transaction_id) = xor_with {
                let key: Vec<u8> = cookie.iter().chain(transaction_id.iter()).copied().collect();
                for (octet, key) in octets.iter_mut().zip(key.iter()) {
                    *octet ^= key;
                }
            }
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => None,
    }
}

/// Local address probe gathering host and server-reflexive candidates via STUN
pub struct StunLocalAddressProbe {
    servers: Vec<String>,
}

impl StunLocalAddressProbe {
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }

    /// Query one server; returns whatever candidates were learned before failing.
    ///
    /// Only the wait for the response is bounded by `timeout`, so a silent
    /// server still yields the host candidate.
    async fn query_server(server: &str, timeout: Duration) -> Vec<IpAddr> {
        let deadline = Instant::now() + timeout;
        let mut found = Vec::new();

        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::debug!("STUN probe could not bind UDP socket: {}", e);
                return found;
            }
        };

        if let Err(e) = socket.connect(server).await {
            tracing::debug!("STUN probe could not reach {}: {}", server, e);
            return found;
        }

        // Host candidate: the interface address chosen to route toward the server
        if let Ok(local) = socket.local_addr() {
            found.push(local.ip());
        }

        let transaction_id: [u8; 12] = rand::rng().random();
        let request = encode_binding_request(&transaction_id);
        if let Err(e) = socket.send(&request).await {
            tracing::debug!("STUN request to {} failed: {}", server, e);
            return found;
        }

        let mut buf = [0u8; 576];
        let remaining = deadline.saturating_duration_since(Instant::now());
        match or_after(async { Some(socket.recv(&mut buf).await) }, remaining, None).await {
            Some(Ok(len)) => match decode_binding_response(&buf[..len], &transaction_id) {
                Ok(mapped) => {
                    tracing::debug!("STUN server {} reports reflexive address {}", server, mapped);
                    found.push(mapped.ip());
                }
                Err(e) => tracing::debug!("Ignoring STUN response from {}: {}", server, e),
            },
            Some(Err(e)) => tracing::debug!("STUN receive from {} failed: {}", server, e),
            None => tracing::debug!("STUN server {} did not answer within {:?}", server, timeout),
        }

        found
    }
}

#[async_trait]
impl LocalAddressProbe for StunLocalAddressProbe {
    async fn gather(&self, timeout: Duration) -> BTreeSet<IpAddr> {
        // Each server gets the full budget
        let queries = self
            .servers
            .iter()
            .map(|server| Self::query_server(server, timeout));

        join_all(queries)
            .await
            .into_iter()
            .flatten()
            .filter(is_usable_candidate_ip)
            .collect()
    }

    fn name(&self) -> &'static str {
        "stun"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    fn response_with(attrs: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (attr_type, value) in attrs {
            body.extend_from_slice(&attr_type.to_be_bytes());
            body.extend_from_slice(&(value.len() as u16).to_be_bytes());
            body.extend_from_slice(value);
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }
        let mut message = Vec::new();
        message.extend_from_slice(&BINDING_SUCCESS_RESPONSE.to_be_bytes());
        message.extend_from_slice(&(body.len() as u16).to_be_bytes());
        message.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        message.extend_from_slice(&TXID);
        message.extend_from_slice(&body);
        message
    }

    fn xor_v4_value(ip: Ipv4Addr, port: u16) -> Vec<u8> {
        let cookie = MAGIC_COOKIE.to_be_bytes();
        let mut value = vec![0, FAMILY_IPV4];
        value.extend_from_slice(&(port ^ (MAGIC_COOKIE >> 16) as u16).to_be_bytes());
        for (octet, key) in ip.octets().iter().zip(cookie.iter()) {
            value.push(octet ^ key);
        }
        value
    }

    #[test]
    fn test_encode_binding_request() {
        let request = encode_binding_request(&TXID);
        assert_eq!(&request[0..2], &[0x00, 0x01]);
        assert_eq!(&request[2..4], &[0x00, 0x00]);
        assert_eq!(&request[4..8], &[0x21, 0x12, 0xA4, 0x42]);
        assert_eq!(&request[8..20], &TXID);
    }

    #[test]
    fn test_decode_xor_mapped_address() {
        let message = response_with(&[(
            ATTR_XOR_MAPPED_ADDRESS,
            xor_v4_value(Ipv4Addr::new(203, 0, 113, 7), 54321),
        )]);
        let addr = decode_binding_response(&message, &TXID).unwrap();
        assert_eq!(addr, "203.0.113.7:54321".parse().unwrap());
    }

    #[test]
    fn test_decode_prefers_xor_over_legacy_mapped_address() {
        let legacy = vec![0, FAMILY_IPV4, 0x1f, 0x90, 198, 51, 100, 1];
        let message = response_with(&[
            (ATTR_MAPPED_ADDRESS, legacy),
            (
                ATTR_XOR_MAPPED_ADDRESS,
                xor_v4_value(Ipv4Addr::new(203, 0, 113, 7), 54321),
            ),
        ]);
        let addr = decode_binding_response(&message, &TXID).unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)));
    }

    #[test]
    fn test_decode_legacy_mapped_address_only() {
        let legacy = vec![0, FAMILY_IPV4, 0x1f, 0x90, 198, 51, 100, 1];
        let message = response_with(&[(0x8022, b"srv".to_vec()), (ATTR_MAPPED_ADDRESS, legacy)]);
        let addr = decode_binding_response(&message, &TXID).unwrap();
        assert_eq!(addr, "198.51.100.1:8080".parse().unwrap());
    }

    #[test]
    fn test_decode_rejects_bad_messages() {
        assert_eq!(
            decode_binding_response(&[0u8; 4], &TXID),
            Err(StunError::Truncated(4))
        );

        let mut message = response_with(&[]);
        assert_eq!(
            decode_binding_response(&message, &TXID),
            Err(StunError::NoMappedAddress)
        );

        let other_txid = [0u8; 12];
        assert_eq!(
            decode_binding_response(&message, &other_txid),
            Err(StunError::TransactionMismatch)
        );

        message[4] = 0;
        assert_eq!(
            decode_binding_response(&message, &TXID),
            Err(StunError::BadMagicCookie)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gather_with_no_servers_is_empty() {
        let probe = StunLocalAddressProbe::new(Vec::new());
        assert!(probe.gather(Duration::from_millis(3_000)).await.is_empty());
    }

    #[tokio::test]
    async fn test_silent_server_still_yields_host_candidate() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = silent.local_addr().unwrap();

        let found =
            StunLocalAddressProbe::query_server(&silent_addr.to_string(), Duration::from_millis(200))
                .await;

        assert_eq!(found, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        drop(silent);
    }

    #[tokio::test]
    async fn test_gather_against_local_stun_responder() {
        // Minimal responder answering with a fixed reflexive address
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 576];
            if let Ok((len, peer)) = server.recv_from(&mut buf).await {
                let mut txid = [0u8; 12];
                txid.copy_from_slice(&buf[8..20.min(len)]);
                let value = xor_v4_value(Ipv4Addr::new(203, 0, 113, 7), 40000);
                let mut reply = Vec::new();
                reply.extend_from_slice(&BINDING_SUCCESS_RESPONSE.to_be_bytes());
                reply.extend_from_slice(&((4 + value.len()) as u16).to_be_bytes());
                reply.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
                reply.extend_from_slice(&txid);
                reply.extend_from_slice(&ATTR_XOR_MAPPED_ADDRESS.to_be_bytes());
                reply.extend_from_slice(&(value.len() as u16).to_be_bytes());
                reply.extend_from_slice(&value);
                let _ = server.send_to(&reply, peer).await;
            }
        });

        let probe = StunLocalAddressProbe::new(vec![server_addr.to_string()]);
        let found = probe.gather(Duration::from_secs(2)).await;

        // The host candidate is loopback here and must be filtered out
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec![IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))]
        );
    }
}
