//! Property-based tests for path manipulation functions.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{encode_url_path, link_cache_key};
    use proptest::prelude::*;

    // ============================================================================
    // encode_url_path property tests
    // ============================================================================

    proptest! {
        /// Property: encode_url_path never produces filesystem-unsafe characters
        #[test]
        fn encode_url_path_never_produces_unsafe_chars(input in ".*") {
            let result = encode_url_path(&input);
            // These characters are problematic on various filesystems
            let unsafe_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
            for ch in unsafe_chars {
                prop_assert!(
                    !result.contains(ch),
                    "encode_url_path produced unsafe character '{}' from input '{}'",
                    ch,
                    input
                );
            }
        }

        /// Property: encode_url_path is deterministic (same input = same output)
        #[test]
        fn encode_url_path_is_deterministic(input in ".*") {
            let result1 = encode_url_path(&input);
            let result2 = encode_url_path(&input);
            prop_assert_eq!(result1, result2);
        }

        /// Property: encode_url_path preserves alphanumeric characters
        #[test]
        fn encode_url_path_preserves_alphanumeric(input in "[a-zA-Z0-9]+") {
            let result = encode_url_path(&input);
            prop_assert_eq!(result, input);
        }

        /// Property: encode_url_path of ASCII-only input preserves byte length
        #[test]
        fn encode_url_path_preserves_ascii_length(input in "[[:ascii:]]+") {
            let result = encode_url_path(&input);
            prop_assert_eq!(result.len(), input.len());
        }
    }

    // ============================================================================
    // link_cache_key property tests
    // ============================================================================

    proptest! {
        /// Property: the key is a single path component
        #[test]
        fn link_cache_key_is_single_component(
            host in "[a-z]{1,10}\\.[a-z]{2,3}",
            path in "[a-zA-Z0-9_/-]{1,30}",
            target in "[a-zA-Z0-9_./-]{1,20}",
        ) {
            let key = link_cache_key(&format!("https://{}/{}", host, path), &target);
            prop_assert!(!key.contains('/'));
            prop_assert!(!key.contains(':'));
            prop_assert!(key.contains('~'));
        }

        /// Property: scheme and credentials never change the key
        #[test]
        fn link_cache_key_ignores_scheme_and_credentials(
            repo in "[a-z]{1,12}",
            user in "[a-z]{1,8}",
            target in "[a-zA-Z0-9.]{1,10}",
        ) {
            let plain = link_cache_key(&format!("https://host.org/org/{}.git", repo), &target);
            let with_user =
                link_cache_key(&format!("https://{}@host.org/org/{}", user, repo), &target);
            let ssh = link_cache_key(&format!("ssh://git@host.org/org/{}.git", repo), &target);
            prop_assert_eq!(&plain, &with_user);
            prop_assert_eq!(&plain, &ssh);
        }
    }
}
