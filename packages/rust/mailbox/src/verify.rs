//! Domain reachability checks for recipient addresses.

use std::collections::HashSet;
use std::net::ToSocketAddrs;

use tracing::debug;

use mailsift_shared::{MailsiftError, Result};

/// Port checked when resolving a mail domain.
const SMTP_PORT: u16 = 25;

/// Decides whether a recipient domain can receive mail.
pub trait DomainVerifier: Send + Sync {
    /// Tool name shown in progress events.
    fn name(&self) -> &str;

    /// `Ok(false)` for an unreachable domain; `Err` only when the check
    /// itself could not be performed.
    fn verify(&self, domain: &str) -> Result<bool>;
}

/// Resolves the domain through the system resolver.
#[derive(Debug, Clone, Default)]
pub struct DnsVerifier;

impl DomainVerifier for DnsVerifier {
    fn name(&self) -> &str {
        "DNS"
    }

    fn verify(&self, domain: &str) -> Result<bool> {
        if domain.is_empty() {
            return Err(MailsiftError::Verification("empty domain".into()));
        }
        let reachable = match (domain, SMTP_PORT).to_socket_addrs() {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!(domain, error = %e, "domain did not resolve");
                false
            }
        };
        Ok(reachable)
    }
}

/// Accepts exactly the configured domains (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct StaticVerifier {
    reachable: HashSet<String>,
}

impl StaticVerifier {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            reachable: domains
                .into_iter()
                .map(|d| d.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl DomainVerifier for StaticVerifier {
    fn name(&self) -> &str {
        "Static Verifier"
    }

    fn verify(&self, domain: &str) -> Result<bool> {
        Ok(self.reachable.contains(&domain.to_lowercase()))
    }
}

/// Domain part of an address (after the last `@`).
pub fn domain_of(address: &str) -> &str {
    address.rsplit_once('@').map_or("", |(_, domain)| domain)
}
