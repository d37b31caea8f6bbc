// Scan-target network helpers
//
// A scan target is a hostname, a literal IPv4 address or an IPv4 CIDR
// block. The service only accepts a flat list of hosts/addresses, so CIDR
// blocks are expanded before anything is sent.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

static CIDR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}/\d{1,2}$")
        .expect("CIDR_REGEX should compile - this is a bug")
});

/// Whether `target` is written in dotted-quad CIDR notation.
pub fn is_cidr(target: &str) -> bool {
    CIDR_REGEX.is_match(target)
}

/// Every usable address in an IPv4 CIDR block, in ascending order.
///
/// Network and broadcast addresses are skipped for prefixes shorter than
/// /31; /31 and /32 blocks yield all of their addresses. Host bits in the
/// input are ignored (`127.0.0.255/30` is the `127.0.0.252/30` block).
/// Any prefix from /0 to /32 is accepted.
pub fn expand_cidr(cidr: &str) -> Result<Vec<String>, Error> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| Error::InvalidTarget(format!("Invalid CIDR: {cidr}")))?;

    let ip: Ipv4Addr = addr
        .parse()
        .map_err(|_| Error::InvalidTarget(format!("Invalid IP in CIDR: {cidr}")))?;

    let prefix: u32 = prefix
        .parse()
        .map_err(|_| Error::InvalidTarget(format!("Invalid prefix in CIDR: {cidr}")))?;

    if prefix > 32 {
        return Err(Error::InvalidTarget(format!(
            "Invalid prefix length /{prefix} in {cidr}"
        )));
    }

    // A /0 mask shifts every bit out.
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    let network = u32::from(ip) & mask;
    let broadcast = network | !mask;

    let (start, end) = if prefix < 31 {
        (network + 1, broadcast - 1)
    } else {
        (network, broadcast)
    };

    Ok((start..=end)
        .map(|n| Ipv4Addr::from(n).to_string())
        .collect())
}

/// Flatten targets into individual hosts and addresses.
///
/// Inputs are trimmed. Plain targets keep their relative order and come
/// first, followed by the expansion of every CIDR block in input order.
pub fn expand_targets<I, S>(targets: I) -> Result<Vec<String>, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut plain = Vec::new();
    let mut expanded = Vec::new();

    for target in targets {
        let target = target.as_ref().trim();
        if is_cidr(target) {
            expanded.extend(expand_cidr(target)?);
        } else {
            plain.push(target.to_owned());
        }
    }

    plain.append(&mut expanded);
    Ok(plain)
}

/// Whether `target` is a literal RFC 1918 address.
///
/// Hostnames are never resolved and are reported as not private.
pub fn is_rfc1918(target: &str) -> bool {
    target
        .parse::<Ipv4Addr>()
        .is_ok_and(|ip| ip.is_private())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn detects_cidr_notation() {
        assert!(is_cidr("10.0.0.0/8"));
        assert!(is_cidr("192.168.0.255/27"));
        assert!(!is_cidr("10.0.0.1"));
        assert!(!is_cidr("example.com"));
        assert!(!is_cidr("10.0.0.0/8 "));
        assert!(!is_cidr("2001:db8::/32"));
    }

    #[test]
    fn expands_usable_addresses() {
        assert_eq!(expand_cidr("172.16.0.0/28").unwrap().len(), 14);
        assert_eq!(expand_cidr("192.168.0.255/27").unwrap().len(), 30);

        let hosts = expand_cidr("10.1.2.0/29").unwrap();
        assert_eq!(hosts.first().map(String::as_str), Some("10.1.2.1"));
        assert_eq!(hosts.last().map(String::as_str), Some("10.1.2.6"));
    }

    #[test]
    fn normalizes_host_bits() {
        assert_eq!(
            expand_cidr("127.0.0.255/30").unwrap(),
            vec!["127.0.0.253".to_owned(), "127.0.0.254".to_owned()]
        );
    }

    #[test]
    fn point_to_point_blocks_keep_every_address() {
        assert_eq!(
            expand_cidr("10.0.0.4/31").unwrap(),
            vec!["10.0.0.4".to_owned(), "10.0.0.5".to_owned()]
        );
        assert_eq!(expand_cidr("10.0.0.9/32").unwrap(), vec!["10.0.0.9".to_owned()]);
    }

    #[test]
    fn rejects_malformed_blocks() {
        assert!(matches!(expand_cidr("10.0.0.0/33"), Err(Error::InvalidTarget(_))));
        assert!(matches!(expand_cidr("300.0.0.0/24"), Err(Error::InvalidTarget(_))));
        assert!(matches!(expand_cidr("10.0.0.0"), Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn expands_wide_blocks() {
        let hosts = expand_cidr("10.0.0.0/15").unwrap();
        assert_eq!(hosts.len(), 131_070);
        assert_eq!(hosts.first().map(String::as_str), Some("10.0.0.1"));
        assert_eq!(hosts.last().map(String::as_str), Some("10.1.255.254"));
    }

    #[test]
    fn plain_targets_come_first() {
        let flat = expand_targets([" 10.9.9.0/30 ", "example.com", "10.0.0.1"]).unwrap();
        assert_eq!(
            flat,
            vec![
                "example.com".to_owned(),
                "10.0.0.1".to_owned(),
                "10.9.9.1".to_owned(),
                "10.9.9.2".to_owned(),
            ]
        );
    }

    #[test]
    fn private_addresses() {
        assert!(is_rfc1918("10.1.1.1"));
        assert!(is_rfc1918("172.31.255.254"));
        assert!(is_rfc1918("192.168.0.1"));
        assert!(!is_rfc1918("172.32.0.1"));
        assert!(!is_rfc1918("8.8.8.8"));
        assert!(!is_rfc1918("intranet.local"));
    }
}
