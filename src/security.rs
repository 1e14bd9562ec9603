//! Egress hardening for `isolated` requests: HTTPS enforcement and a public-IP-only gate.
//!
//! # Threat Model
//! `isolated` requests are assumed to originate from untrusted, user-supplied endpoints (watch and
//! trigger URLs configured by tenants). The gate defends the host running this service against
//! SSRF into its own private network by refusing to open a socket to anything that resolves to a
//! non-public address, independent of what reqwest's own DNS hook would see (which is never
//! consulted for literal-IP hosts).

// std
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
// crates.io
use hickory_resolver::{
	TokioAsyncResolver,
	config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
};
use url::Url;
// self
use crate::_prelude::*;

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::EgressForbidden {
			host: url.host_str().unwrap_or_default().to_string(),
			reason: "endpoint must use HTTPS".into(),
		})
	}
}

const RESERVED_IPV4: &[(Ipv4Addr, u32)] = &[
	(Ipv4Addr::new(0, 0, 0, 0), 8),
	(Ipv4Addr::new(10, 0, 0, 0), 8),
	(Ipv4Addr::new(100, 64, 0, 0), 10),
	(Ipv4Addr::new(127, 0, 0, 0), 8),
	(Ipv4Addr::new(169, 254, 0, 0), 16),
	(Ipv4Addr::new(172, 16, 0, 0), 12),
	(Ipv4Addr::new(192, 0, 0, 0), 24),
	(Ipv4Addr::new(192, 0, 2, 0), 24),
	(Ipv4Addr::new(192, 88, 99, 0), 24),
	(Ipv4Addr::new(192, 168, 0, 0), 16),
	(Ipv4Addr::new(198, 18, 0, 0), 15),
	(Ipv4Addr::new(198, 51, 100, 0), 24),
	(Ipv4Addr::new(203, 0, 113, 0), 24),
	(Ipv4Addr::new(224, 0, 0, 0), 4),
	(Ipv4Addr::new(240, 0, 0, 0), 4),
];

/// Whether `addr` falls outside every reserved/private/special-use IPv4 block listed in the
/// egress-filter table (RFC1918, loopback, link-local, CGNAT, multicast, reserved, documentation,
/// and benchmarking ranges).
pub fn is_public_ipv4(addr: Ipv4Addr) -> bool {
	let bits = u32::from(addr);

	!RESERVED_IPV4.iter().any(|(base, prefix)| {
		let mask = if *prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };

		bits & mask == u32::from(*base) & mask
	})
}

/// Whether `addr` falls in the IPv6 global-unicast block `2000::/3`.
pub fn is_public_ipv6(addr: Ipv6Addr) -> bool {
	(addr.segments()[0] & 0xe000) == 0x2000
}

fn is_public_ip(addr: IpAddr) -> bool {
	match addr {
		IpAddr::V4(v4) => is_public_ipv4(v4),
		IpAddr::V6(v6) => is_public_ipv6(v6),
	}
}

/// Resolves hosts and refuses egress to anything that isn't a public IP on port 80/443.
///
/// Built once per process and shared; construct via [`GuardedResolver::system`] or
/// [`GuardedResolver::external`] depending on `use_external_dns_for_checker`.
#[derive(Clone)]
pub struct GuardedResolver {
	inner: Arc<TokioAsyncResolver>,
}
impl GuardedResolver {
	/// Resolve using the host's system resolver configuration.
	pub fn system() -> Self {
		let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

		Self { inner: Arc::new(resolver) }
	}

	/// Resolve using a dedicated external resolver at `address` (`host:port`) over UDP.
	pub fn external(address: &str) -> Result<Self> {
		let socket: SocketAddr = address.parse()?;
		let group = NameServerConfigGroup::from_ips_clear(&[socket.ip()], socket.port(), true);
		let config = ResolverConfig::from_parts(None, Vec::new(), group);
		let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());

		Ok(Self { inner: Arc::new(resolver) })
	}

	/// Resolve `host` into every candidate address, refusing if any candidate is non-public, or if
	/// `host` is itself a non-public IP literal.
	pub async fn guard(&self, host: &str, port: u16) -> Result<()> {
		if !matches!(port, 80 | 443) {
			return Err(Error::EgressForbidden {
				host: host.to_string(),
				reason: format!("port {port} is not 80 or 443"),
			});
		}

		if let Ok(literal) = host.parse::<IpAddr>() {
			return self.check(host, literal);
		}

		let response = self.inner.lookup_ip(host).await.map_err(|_| Error::EgressForbidden {
			host: host.to_string(),
			reason: "failed to resolve host".into(),
		})?;

		for candidate in response.iter() {
			self.check(host, candidate)?;
		}

		Ok(())
	}

	fn check(&self, host: &str, addr: IpAddr) -> Result<()> {
		if is_public_ip(addr) {
			Ok(())
		} else {
			Err(Error::EgressForbidden {
				host: host.to_string(),
				reason: format!("{addr} is not a public address"),
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_reserved_ipv4_blocks() {
		for host in [
			"0.1.2.3",
			"10.0.0.1",
			"100.64.0.1",
			"127.0.0.1",
			"169.254.1.1",
			"172.16.0.1",
			"192.0.0.1",
			"192.0.2.1",
			"192.88.99.1",
			"192.168.1.1",
			"198.18.0.1",
			"198.51.100.1",
			"203.0.113.1",
			"224.0.0.1",
			"240.0.0.1",
		] {
			let addr: Ipv4Addr = host.parse().unwrap();
			assert!(!is_public_ipv4(addr), "{host} should be reserved");
		}
	}

	#[test]
	fn accepts_public_ipv4() {
		assert!(is_public_ipv4("93.184.216.34".parse().unwrap()));
	}

	#[test]
	fn accepts_global_unicast_ipv6_only() {
		assert!(is_public_ipv6("2606:2800:220:1:248:1893:25c8:1946".parse().unwrap()));
		assert!(!is_public_ipv6("fe80::1".parse().unwrap()));
		assert!(!is_public_ipv6("::1".parse().unwrap()));
	}

	#[tokio::test]
	async fn guard_refuses_loopback_literal() {
		let resolver = GuardedResolver::system();
		let err = resolver.guard("127.0.0.1", 80).await.unwrap_err();
		assert!(matches!(err, Error::EgressForbidden { .. }));
	}

	#[tokio::test]
	async fn guard_refuses_non_standard_port() {
		let resolver = GuardedResolver::system();
		let err = resolver.guard("example.com", 8080).await.unwrap_err();
		assert!(matches!(err, Error::EgressForbidden { .. }));
	}
}
