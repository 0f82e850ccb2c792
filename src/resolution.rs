use std::net::{IpAddr, SocketAddr};

use hickory_resolver::TokioAsyncResolver;
use log::{trace, warn};

/// Where a connection should actually go after DNS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// An address we resolved ourselves.
    Resolved(SocketAddr),
    /// Resolution failed; the transport gets the literal host name and port.
    Literal(String, u16),
}

/// Resolves `host` to an IPv4 socket address.
///
/// IP literals skip DNS entirely. When `srv_lookup` is set, a
/// `_minecraft._tcp.<host>` SRV record replaces the host and port before the
/// A-record lookup. Any resolution failure yields [`ConnectTarget::Literal`]
/// rather than an error, so the connect step gets to decide.
pub async fn resolve_minecraft_target(host: &str, port: u16, srv_lookup: bool) -> ConnectTarget {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return ConnectTarget::Resolved(SocketAddr::new(ip, port));
    }

    let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
        Ok(resolver) => resolver,
        Err(e) => {
            warn!("could not load system resolver config: {e}");
            return ConnectTarget::Literal(host.to_owned(), port);
        }
    };

    let (lookup_host, lookup_port) = if srv_lookup {
        srv_target(&resolver, host)
            .await
            .unwrap_or_else(|| (host.to_owned(), port))
    } else {
        (host.to_owned(), port)
    };

    match resolver.lookup_ip(lookup_host.as_str()).await {
        Ok(lookup) => match lookup.iter().find(IpAddr::is_ipv4) {
            Some(ip) => {
                trace!("{host} resolved to {ip}:{lookup_port}");
                ConnectTarget::Resolved(SocketAddr::new(ip, lookup_port))
            }
            None => {
                warn!("no A record for {lookup_host}, falling back to the literal host name");
                ConnectTarget::Literal(lookup_host, lookup_port)
            }
        },
        Err(e) => {
            warn!("A lookup for {lookup_host} failed, falling back to the literal host name: {e}");
            ConnectTarget::Literal(lookup_host, lookup_port)
        }
    }
}

async fn srv_target(resolver: &TokioAsyncResolver, host: &str) -> Option<(String, u16)> {
    let srv = resolver
        .srv_lookup(format!("_minecraft._tcp.{host}"))
        .await
        .ok()?;
    let record = srv.iter().next()?;
    let target = record.target().to_utf8();
    let target = target.trim_end_matches('.').to_owned();
    trace!("SRV for {host} points at {target}:{}", record.port());
    Some((target, record.port()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ip_literals_skip_dns() {
        assert_eq!(
            resolve_minecraft_target("127.0.0.1", 25565, true).await,
            ConnectTarget::Resolved("127.0.0.1:25565".parse().unwrap())
        );
        assert_eq!(
            resolve_minecraft_target("[::1]", 25566, true).await,
            ConnectTarget::Resolved("[::1]:25566".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn unresolvable_hosts_fall_back_to_the_literal_name() {
        // .invalid is reserved and never resolves
        assert_eq!(
            resolve_minecraft_target("no-such-host.invalid", 25565, false).await,
            ConnectTarget::Literal("no-such-host.invalid".to_owned(), 25565)
        );
    }
}
