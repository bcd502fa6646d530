//! Target name resolution
//!
//! A target may be an IPv4 literal, an IPv6 literal or a host name. Whatever
//! it is, the other facts (the second address family and the canonical name)
//! are looked up best-effort so the connection can report all three.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use crate::error::{HostError, HostResult};

/// Address family filter for forward lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// IPv4
    V4,
    /// IPv6
    V6,
}

/// Name service used while connecting
pub trait Resolver: Send + Sync {
    /// First address of `family` for `host`, `None` when there is none
    fn lookup(&self, host: &str, family: Family) -> Option<IpAddr>;

    /// Canonical name for `ip`, `None` when the reverse lookup fails
    fn reverse(&self, ip: IpAddr) -> Option<String>;
}

/// The operating system's resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn lookup(&self, host: &str, family: Family) -> Option<IpAddr> {
        let addrs = match (host, 0).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                tracing::debug!(host, %err, "Forward lookup failed");
                return None;
            }
        };
        addrs.map(|addr| addr.ip()).find(|ip| match family {
            Family::V4 => ip.is_ipv4(),
            Family::V6 => ip.is_ipv6(),
        })
    }

    fn reverse(&self, ip: IpAddr) -> Option<String> {
        match dns_lookup::lookup_addr(&ip) {
            Ok(name) => Some(name),
            Err(err) => {
                tracing::debug!(%ip, %err, "Reverse lookup failed");
                None
            }
        }
    }
}

/// Everything known about a target after resolution
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolved {
    /// IPv4 address, if any
    pub ipv4: Option<Ipv4Addr>,
    /// IPv6 address, if any
    pub ipv6: Option<Ipv6Addr>,
    /// Canonical name, if any
    pub fqdn: Option<String>,
}

impl Resolved {
    /// Resolves `target` with `resolver`
    ///
    /// # Errors
    ///
    /// Returns `HostError::Connection` when neither address family resolves.
    pub fn resolve(target: &str, resolver: &dyn Resolver) -> HostResult<Self> {
        let literal = target.trim_start_matches('[').trim_end_matches(']');
        let mut resolved = Self::default();

        match literal.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => {
                resolved.ipv4 = Some(ip);
                resolved.fqdn = resolver.reverse(IpAddr::V4(ip));
                if let Some(name) = &resolved.fqdn {
                    resolved.ipv6 = v6(resolver.lookup(name, Family::V6));
                }
            }
            Ok(IpAddr::V6(ip)) => {
                resolved.ipv6 = Some(ip);
                resolved.fqdn = resolver.reverse(IpAddr::V6(ip));
                if let Some(name) = &resolved.fqdn {
                    resolved.ipv4 = v4(resolver.lookup(name, Family::V4));
                }
            }
            Err(_) => {
                resolved.ipv4 = v4(resolver.lookup(target, Family::V4));
                resolved.ipv6 = v6(resolver.lookup(target, Family::V6));
                let primary = resolved
                    .ipv4
                    .map(IpAddr::V4)
                    .or_else(|| resolved.ipv6.map(IpAddr::V6));
                resolved.fqdn = primary
                    .and_then(|ip| resolver.reverse(ip))
                    .or_else(|| Some(target.to_string()));
            }
        }

        if resolved.ipv4.is_none() && resolved.ipv6.is_none() {
            return Err(HostError::Connection(format!(
                "unable to get an IPv4 or an IPv6 address for '{target}'"
            )));
        }
        Ok(resolved)
    }

    /// Address to connect to
    ///
    /// IPv6 only when both families resolved and `prefer_ipv6` is set, or
    /// when it is the only one.
    pub fn choose(&self, prefer_ipv6: bool) -> Option<IpAddr> {
        match (self.ipv4, self.ipv6) {
            (Some(_), Some(v6)) if prefer_ipv6 => Some(IpAddr::V6(v6)),
            (Some(v4), _) => Some(IpAddr::V4(v4)),
            (None, Some(v6)) => Some(IpAddr::V6(v6)),
            (None, None) => None,
        }
    }
}

fn v4(ip: Option<IpAddr>) -> Option<Ipv4Addr> {
    match ip {
        Some(IpAddr::V4(ip)) => Some(ip),
        _ => None,
    }
}

fn v6(ip: Option<IpAddr>) -> Option<Ipv6Addr> {
    match ip {
        Some(IpAddr::V6(ip)) => Some(ip),
        _ => None,
    }
}
