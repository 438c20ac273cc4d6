//! SRV lookup for `_minecraft._tcp.<host>` using raw UDP DNS packets.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

use super::QueryError;

/// Service label prepended to the endpoint host.
const SRV_SERVICE: &str = "_minecraft._tcp";

const QTYPE_SRV: u16 = 33;
const QCLASS_IN: u16 = 1;
const RCODE_NXDOMAIN: u8 = 3;

/// Location advertised by an SRV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub host: String,
    pub port: u16,
}

/// First usable `nameserver` from `/etc/resolv.conf`.
pub fn system_nameserver() -> Option<SocketAddr> {
    let content = std::fs::read_to_string("/etc/resolv.conf").ok()?;
    parse_resolv_conf(&content)
}

fn parse_resolv_conf(content: &str) -> Option<SocketAddr> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| line.strip_prefix("nameserver"))
        .filter_map(|rest| rest.trim().parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, 53))
        .next()
}

/// Ask `resolver` for the Minecraft SRV record of `host`.
///
/// Returns `Ok(None)` when the name has no usable record.
pub async fn lookup_srv(
    resolver: SocketAddr,
    host: &str,
    timeout: Duration,
) -> Result<Option<SrvTarget>, QueryError> {
    let tx_id: u16 = rand::random();
    let packet = build_srv_query(tx_id, &format!("{}.{}", SRV_SERVICE, host))?;

    let bind_addr = if resolver.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(resolver).await?;
    socket.send(&packet).await?;

    let mut response = [0u8; 512];
    let n = match tokio::time::timeout(timeout, socket.recv(&mut response)).await {
        Ok(result) => result?,
        Err(_) => return Err(QueryError::Timeout(timeout)),
    };

    parse_srv_response(&response[..n], tx_id)
}

/// Encode a domain name as length-prefixed labels.
fn encode_name(name: &str) -> Result<Vec<u8>, QueryError> {
    let mut out = Vec::with_capacity(name.len() + 2);
    let trimmed = name.trim_end_matches('.');

    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() || label.len() > 63 {
                return Err(QueryError::InvalidAddress(name.to_string()));
            }
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
    }
    out.push(0);

    Ok(out)
}

/// Build a recursive query for the SRV record of `name`.
fn build_srv_query(tx_id: u16, name: &str) -> Result<Vec<u8>, QueryError> {
    let flags: u16 = 0x0100; // Standard query, recursion desired

    let mut packet = Vec::with_capacity(64);
    packet.extend_from_slice(&tx_id.to_be_bytes());
    packet.extend_from_slice(&flags.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // AN/NS/AR counts
    packet.extend_from_slice(&encode_name(name)?);
    packet.extend_from_slice(&QTYPE_SRV.to_be_bytes());
    packet.extend_from_slice(&QCLASS_IN.to_be_bytes());

    Ok(packet)
}

fn truncated() -> QueryError {
    QueryError::Protocol("DNS response truncated".to_string())
}

fn read_u16(msg: &[u8], pos: usize) -> Result<u16, QueryError> {
    msg.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(truncated)
}

/// Read a possibly compressed name at `pos`; returns it and the offset after it.
fn read_name(msg: &[u8], mut pos: usize) -> Result<(String, usize), QueryError> {
    let mut labels: Vec<String> = Vec::new();
    let mut end = None;
    let mut jumps = 0;

    loop {
        let len = *msg.get(pos).ok_or_else(truncated)? as usize;
        match len & 0xC0 {
            0xC0 => {
                let low = *msg.get(pos + 1).ok_or_else(truncated)? as usize;
                end.get_or_insert(pos + 2);
                jumps += 1;
                if jumps > 16 {
                    return Err(QueryError::Protocol("DNS name pointer loop".to_string()));
                }
                pos = ((len & 0x3F) << 8) | low;
            }
            0x00 if len == 0 => {
                let end = end.unwrap_or(pos + 1);
                return Ok((labels.join("."), end));
            }
            0x00 => {
                let label = msg.get(pos + 1..pos + 1 + len).ok_or_else(truncated)?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                pos += 1 + len;
            }
            _ => return Err(QueryError::Protocol(format!("bad DNS label byte {:#04x}", len))),
        }
    }
}

/// Pick the preferred SRV answer: lowest priority, then highest weight.
fn parse_srv_response(msg: &[u8], tx_id: u16) -> Result<Option<SrvTarget>, QueryError> {
    if msg.len() < 12 {
        return Err(QueryError::Protocol(format!("DNS response too short: {} bytes", msg.len())));
    }

    let resp_tx_id = read_u16(msg, 0)?;
    if resp_tx_id != tx_id {
        return Err(QueryError::Protocol(format!(
            "transaction ID mismatch: got {}, expected {}",
            resp_tx_id, tx_id
        )));
    }
    if msg[2] & 0x80 == 0 {
        return Err(QueryError::Protocol("DNS message is not a response".to_string()));
    }

    // RCODE (lower 4 bits of byte 3)
    match msg[3] & 0x0F {
        0 => {}
        RCODE_NXDOMAIN => return Ok(None),
        rcode => return Err(QueryError::Protocol(format!("DNS error RCODE: {}", rcode))),
    }

    let qd_count = read_u16(msg, 4)?;
    let an_count = read_u16(msg, 6)?;

    let mut pos = 12;
    for _ in 0..qd_count {
        let (_, next) = read_name(msg, pos)?;
        pos = next + 4;
    }

    // (priority, weight, target)
    let mut best: Option<(u16, u16, SrvTarget)> = None;
    for _ in 0..an_count {
        let (_, next) = read_name(msg, pos)?;
        let rtype = read_u16(msg, next)?;
        let rdlen = read_u16(msg, next + 8)? as usize;
        let rdata = next + 10;
        if msg.len() < rdata + rdlen {
            return Err(truncated());
        }

        if rtype == QTYPE_SRV && rdlen >= 7 {
            let priority = read_u16(msg, rdata)?;
            let weight = read_u16(msg, rdata + 2)?;
            let port = read_u16(msg, rdata + 4)?;
            let (host, _) = read_name(msg, rdata + 6)?;

            let better = match &best {
                None => true,
                Some((p, w, _)) => priority < *p || (priority == *p && weight > *w),
            };
            if better {
                best = Some((priority, weight, SrvTarget { host, port }));
            }
        }

        pos = rdata + rdlen;
    }

    // A root target means the service is explicitly not offered
    Ok(best
        .map(|(_, _, target)| target)
        .filter(|t| !t.host.is_empty() && t.port != 0))
}

/// Build a response to `query` carrying `answers` as `(priority, weight, port, target)`.
#[cfg(test)]
pub(crate) fn build_srv_response(query: &[u8], rcode: u8, answers: &[(u16, u16, u16, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&query[0..2]);
    out.extend_from_slice(&[0x81, 0x80 | rcode]);
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&(answers.len() as u16).to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&query[12..]);

    for (priority, weight, port, target) in answers {
        let target = encode_name(target).unwrap();
        out.extend_from_slice(&[0xC0, 0x0C]); // pointer to the question name
        out.extend_from_slice(&QTYPE_SRV.to_be_bytes());
        out.extend_from_slice(&QCLASS_IN.to_be_bytes());
        out.extend_from_slice(&300u32.to_be_bytes());
        out.extend_from_slice(&((6 + target.len()) as u16).to_be_bytes());
        out.extend_from_slice(&priority.to_be_bytes());
        out.extend_from_slice(&weight.to_be_bytes());
        out.extend_from_slice(&port.to_be_bytes());
        out.extend_from_slice(&target);
    }

    out
}

/// Spawn a UDP resolver that answers a single query.
#[cfg(test)]
pub(crate) async fn fake_resolver(rcode: u8, answers: Vec<(u16, u16, u16, &'static str)>) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        let (n, peer) = socket.recv_from(&mut buf).await.unwrap();
        let reply = build_srv_response(&buf[..n], rcode, &answers);
        socket.send_to(&reply, peer).await.unwrap();
    });

    addr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_srv_query() {
        let packet = build_srv_query(0xbeef, "_minecraft._tcp.mc.example").unwrap();
        assert_eq!(&packet[0..2], &[0xbe, 0xef]);
        assert_eq!(&packet[4..6], &[0, 1]);
        assert_eq!(packet[12], 10);
        assert_eq!(&packet[13..23], b"_minecraft");
        assert_eq!(&packet[packet.len() - 4..], &[0, 33, 0, 1]);
    }

    #[test]
    fn test_encode_name_rejects_empty_labels() {
        assert!(encode_name("a..example").is_err());
        assert!(encode_name(&"x".repeat(64)).is_err());
        assert_eq!(encode_name(".").unwrap(), vec![0]);
    }

    #[test]
    fn test_parse_srv_answer_prefers_lowest_priority() {
        let query = build_srv_query(7, "_minecraft._tcp.mc.example").unwrap();
        let response = build_srv_response(
            &query,
            0,
            &[(10, 50, 25590, "backup.mc.example"), (0, 5, 25577, "play.mc.example.")],
        );

        let target = parse_srv_response(&response, 7).unwrap().unwrap();
        assert_eq!(
            target,
            SrvTarget {
                host: "play.mc.example".to_string(),
                port: 25577
            }
        );
    }

    #[test]
    fn test_parse_srv_equal_priority_prefers_weight() {
        let query = build_srv_query(7, "_minecraft._tcp.mc.example").unwrap();
        let response = build_srv_response(&query, 0, &[(1, 5, 1, "light.example"), (1, 60, 2, "heavy.example")]);
        assert_eq!(parse_srv_response(&response, 7).unwrap().unwrap().host, "heavy.example");
    }

    #[test]
    fn test_parse_srv_without_record() {
        let query = build_srv_query(9, "_minecraft._tcp.mc.example").unwrap();

        let nxdomain = build_srv_response(&query, RCODE_NXDOMAIN, &[]);
        assert_eq!(parse_srv_response(&nxdomain, 9).unwrap(), None);

        let empty = build_srv_response(&query, 0, &[]);
        assert_eq!(parse_srv_response(&empty, 9).unwrap(), None);

        let root = build_srv_response(&query, 0, &[(0, 0, 25565, ".")]);
        assert_eq!(parse_srv_response(&root, 9).unwrap(), None);
    }

    #[test]
    fn test_parse_srv_rejects_bad_responses() {
        let query = build_srv_query(9, "_minecraft._tcp.mc.example").unwrap();
        let response = build_srv_response(&query, 0, &[(0, 0, 25565, "a.example")]);

        assert!(parse_srv_response(&response, 10).is_err());
        assert!(parse_srv_response(&response[..response.len() - 3], 9).is_err());
        assert!(parse_srv_response(&query, 9).is_err());
        let servfail = build_srv_response(&query, 2, &[]);
        assert!(parse_srv_response(&servfail, 9).is_err());
    }

    #[test]
    fn test_parse_resolv_conf() {
        let conf = "# generated\nsearch lan\nnameserver fe80::1%eth0\nnameserver 10.0.0.53\nnameserver 1.1.1.1\n";
        assert_eq!(parse_resolv_conf(conf), Some("10.0.0.53:53".parse().unwrap()));
        assert_eq!(parse_resolv_conf("search lan\n"), None);
    }

    #[tokio::test]
    async fn test_lookup_srv_against_fake_resolver() {
        let resolver = fake_resolver(0, vec![(0, 5, 25577, "play.mc.example")]).await;
        let target = lookup_srv(resolver, "mc.example", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(target.map(|t| (t.host, t.port)), Some(("play.mc.example".to_string(), 25577)));
    }

    #[tokio::test]
    async fn test_lookup_srv_silent_resolver_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let resolver = silent.local_addr().unwrap();

        let result = lookup_srv(resolver, "mc.example", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(QueryError::Timeout(_))));
    }
}
