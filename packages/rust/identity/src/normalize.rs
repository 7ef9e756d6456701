//! Address normalization and the scalar feature used for clustering.

use sha2::{Digest, Sha256};

use crate::IdentityPolicy;

/// Separator between local part and domain.
const DOMAIN_SEPARATOR: char = '@';

/// Characters common providers ignore inside a local part.
const INSIGNIFICANT: [char; 2] = ['.', '_'];

/// Reduce an address to the part that identifies a person.
///
/// `John.Doe@x.com` and `johndoe@y.org` both become `johndoe`: the domain is
/// discarded, so equal local parts on different domains count as one
/// identity. Input without a domain separator is only lower-cased.
pub fn normalize(address: &str) -> String {
    let Some((local, _domain)) = address.split_once(DOMAIN_SEPARATOR) else {
        return address.to_lowercase();
    };

    local
        .to_lowercase()
        .chars()
        .filter(|c| !INSIGNIFICANT.contains(c))
        .collect()
}

/// Map a normalized name to a bounded scalar.
///
/// Hashes the first `stem_len` characters with SHA-256 and reduces the
/// leading 8 bytes modulo `feature_range`. Distinct stems may collide or land
/// close together; such pairs merge.
pub fn feature(normalized: &str, policy: &IdentityPolicy) -> u64 {
    let stem: String = normalized.chars().take(policy.stem_len).collect();
    let digest = Sha256::digest(stem.as_bytes());

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % policy.feature_range.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_dots_underscores_and_domain() {
        assert_eq!(normalize("John.Doe@x.com"), "johndoe");
        assert_eq!(normalize("johndoe@y.org"), "johndoe");
        assert_eq!(normalize("john_doe@startup.io"), "johndoe");
    }

    #[test]
    fn no_separator_is_only_lowercased() {
        assert_eq!(normalize("Team.Lead"), "team.lead");
    }

    #[test]
    fn splits_at_first_separator() {
        assert_eq!(normalize("a.b@c@d.com"), "ab");
    }

    #[test]
    fn feature_is_stable_and_bounded() {
        let policy = IdentityPolicy::default();
        // Fixed values: the feature must not depend on process or platform.
        assert_eq!(feature("alice", &policy), 3923);
        assert_eq!(feature("bob", &policy), 8650);
        assert!(feature("zed", &policy) < policy.feature_range);
    }

    #[test]
    fn feature_only_sees_the_stem() {
        let policy = IdentityPolicy::default();
        assert_eq!(feature("alice", &policy), feature("alicesmith", &policy));
        assert_ne!(feature("alice", &policy), feature("bob", &policy));
    }
}
