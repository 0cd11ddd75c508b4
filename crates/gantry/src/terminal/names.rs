//! Workload name derivation.
//!
//! Caller identities are arbitrary strings (emails, SSO subjects, node
//! names); workload names must be DNS labels. Sanitization is deterministic,
//! the trailing suffix is random so concurrent sessions for the same
//! identity get distinct names.

use rand::Rng;

/// Prefix for cluster terminal workloads.
const TERMINAL_POD_PREFIX: &str = "gantry-terminal";

/// Prefix for node shell workloads.
const NODE_SHELL_POD_PREFIX: &str = "gantry-node-shell";

const MAX_NAME_LEN: usize = 63;
const SUFFIX_LEN: usize = 5;
// Suffix plus the two separating hyphens.
const NAME_OVERHEAD: usize = SUFFIX_LEN + 2;

/// Derive the workload name for a cluster terminal session.
pub fn terminal_pod_name(identity: &str) -> String {
    prefixed_name(TERMINAL_POD_PREFIX, identity)
}

/// Derive the workload name for a node shell session.
pub fn node_shell_pod_name(node_name: &str) -> String {
    prefixed_name(NODE_SHELL_POD_PREFIX, node_name)
}

fn prefixed_name(prefix: &str, identity: &str) -> String {
    let mut sanitized = sanitize(identity);

    if prefix.len() + sanitized.len() + NAME_OVERHEAD > MAX_NAME_LEN {
        let max_len = MAX_NAME_LEN - prefix.len() - NAME_OVERHEAD;
        sanitized.truncate(max_len);
        sanitized = sanitized.trim_end_matches(['-', '.']).to_string();
    }

    format!("{}-{}-{}", prefix, sanitized, random_suffix(SUFFIX_LEN))
}

/// Map an arbitrary identity onto the DNS-label alphabet. Never fails.
fn sanitize(identity: &str) -> String {
    let mapped: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else if c.is_ascii_uppercase() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    let trimmed = mapped.trim_matches(['-', '.']);
    if trimmed.is_empty() {
        "user".to_string()
    } else {
        trimmed.to_string()
    }
}

fn random_suffix(len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// DNS label grammar: lowercase alphanumeric and hyphens, no
    /// leading/trailing hyphen or dot.
    fn assert_valid_label(name: &str) {
        assert!(!name.is_empty(), "empty name");
        assert!(name.len() <= MAX_NAME_LEN, "{name:?} exceeds {MAX_NAME_LEN} chars");
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            "{name:?} contains invalid characters"
        );
        assert!(!name.starts_with('-') && !name.ends_with('-'), "{name:?} edge hyphen");
    }

    #[test]
    fn sanitize_folds_and_replaces() {
        assert_eq!(sanitize("Alice.Admin@example"), "alice-admin-example");
        assert_eq!(sanitize("bob"), "bob");
        assert_eq!(sanitize("user with spaces"), "user-with-spaces");
        assert_eq!(sanitize("--trimmed--"), "trimmed");
    }

    #[test]
    fn sanitize_falls_back_for_empty_results() {
        assert_eq!(sanitize(""), "user");
        assert_eq!(sanitize("@@@"), "user");
        assert_eq!(sanitize("..."), "user");
    }

    #[test]
    fn generated_names_satisfy_grammar() {
        let identities = [
            "alice@example.com",
            "Alice.Admin@example",
            "ADMIN",
            "",
            "日本語ユーザー",
            "a-very-long-identity-that-exceeds-the-maximum-length-allowed-for-cluster-names",
            "ip-10-0-10-10.ch-west-2.compute.internal",
        ];

        for identity in identities {
            assert_valid_label(&terminal_pod_name(identity));
            assert_valid_label(&node_shell_pod_name(identity));
        }
    }

    #[test]
    fn names_carry_prefix_and_sanitized_identity() {
        let name = terminal_pod_name("Alice.Admin@example");
        assert!(
            name.starts_with("gantry-terminal-alice-admin-example-"),
            "unexpected name {name:?}"
        );
        assert_eq!(name.len(), "gantry-terminal-alice-admin-example-".len() + SUFFIX_LEN);
    }

    #[test]
    fn concurrent_names_for_same_identity_differ() {
        let a = terminal_pod_name("alice@example.com");
        let b = terminal_pod_name("alice@example.com");
        assert_ne!(a, b);

        // Deterministic apart from the suffix.
        let strip = |s: &str| s[..s.len() - SUFFIX_LEN].to_string();
        assert_eq!(strip(&a), strip(&b));
    }
}
