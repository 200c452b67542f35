//! Configuration fingerprints
//!
//! A fingerprint is a SHA-256 digest over a canonical form of a
//! configuration payload. Dependent resources carry it as an annotation so a
//! workload rolls when its configuration changes, even though none of the
//! workload's own fields did. Fingerprints are change-detection tokens only;
//! nothing ever decodes them.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use aws_lc_rs::digest::{digest, SHA256};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use warden_common::kube_utils::set_annotation;
use warden_common::ReconcileConfig;

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Hex-encode a SHA-256 digest of `bytes`
fn sha256_hex(bytes: &[u8]) -> String {
    let hash = digest(&SHA256, bytes);
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(FINGERPRINT_LEN), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Fingerprint a free-form text payload
///
/// Leading and trailing whitespace is trimmed before hashing.
pub fn fingerprint_text(text: &str) -> String {
    sha256_hex(text.trim().as_bytes())
}

/// Fingerprint a key/value payload
///
/// Entries are sorted by key and each contributes `trim(key)=trim(value);`,
/// so the result does not depend on the map's iteration order.
pub fn fingerprint_map<'a, I, K, V>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a K, &'a V)>,
    K: AsRef<str> + 'a + ?Sized,
    V: AsRef<str> + 'a + ?Sized,
{
    let mut pairs: Vec<(&str, &str)> = entries
        .into_iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();
    pairs.sort_unstable();

    let mut canonical = String::new();
    for (k, v) in pairs {
        canonical.push_str(k.trim());
        canonical.push('=');
        canonical.push_str(v.trim());
        canonical.push(';');
    }
    sha256_hex(canonical.as_bytes())
}

/// Payloads that can be fingerprinted
pub trait Fingerprint {
    /// Deterministic digest of the payload's content
    fn fingerprint(&self) -> String;
}

impl Fingerprint for str {
    fn fingerprint(&self) -> String {
        fingerprint_text(self)
    }
}

impl Fingerprint for String {
    fn fingerprint(&self) -> String {
        fingerprint_text(self)
    }
}

impl Fingerprint for BTreeMap<String, String> {
    fn fingerprint(&self) -> String {
        fingerprint_map(self)
    }
}

impl<S: std::hash::BuildHasher> Fingerprint for HashMap<String, String, S> {
    fn fingerprint(&self) -> String {
        fingerprint_map(self)
    }
}

/// Stamp a fingerprint onto a pod template under the configured
/// config-hash annotation
///
/// The same configuration lists that annotation as special, so a comparator
/// built from it rolls the workload when the digest changes.
pub fn stamp_pod_template(
    template: &mut PodTemplateSpec,
    config: &ReconcileConfig,
    fingerprint: &str,
) {
    let meta = template.metadata.get_or_insert_with(Default::default);
    set_annotation(meta, &config.config_hash_annotation, fingerprint);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Comparator;
    use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
    use warden_common::kube_utils::annotation;

    /// Story: an agent ConfigMap re-rendered with different whitespace does
    /// not restart every agent pod
    #[test]
    fn story_whitespace_does_not_change_text_fingerprint() {
        let rendered = "server {\n  trust_domain = \"example.org\"\n}";
        let reformatted = format!("\n\n  {rendered}\t\n");
        assert_eq!(fingerprint_text(rendered), fingerprint_text(&reformatted));
        assert_eq!(fingerprint_text(rendered).len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_text_content_change_changes_fingerprint() {
        assert_ne!(
            fingerprint_text("trust_domain = \"a.org\""),
            fingerprint_text("trust_domain = \"b.org\"")
        );
    }

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        assert_eq!(
            fingerprint_text("  abc "),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    /// Story: the same key/value config yields the same digest no matter how
    /// it was assembled
    #[test]
    fn story_map_fingerprint_is_order_independent() {
        let mut a: HashMap<String, String> = HashMap::new();
        a.insert("log_level".into(), "info".into());
        a.insert("trust_domain".into(), "example.org".into());
        a.insert("cluster".into(), "east".into());

        let mut b: HashMap<String, String> = HashMap::new();
        b.insert("cluster".into(), "east".into());
        b.insert("trust_domain".into(), "example.org".into());
        b.insert("log_level".into(), "info".into());

        let sorted: BTreeMap<String, String> =
            a.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), sorted.fingerprint());
        assert_eq!(a.fingerprint(), a.fingerprint());
    }

    #[test]
    fn test_map_entries_are_trimmed() {
        let mut a = BTreeMap::new();
        a.insert("key".to_string(), "value".to_string());
        let mut b = BTreeMap::new();
        b.insert(" key ".to_string(), "\tvalue\n".to_string());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_map_value_change_changes_fingerprint() {
        let mut a = BTreeMap::new();
        a.insert("trust_domain".to_string(), "a.org".to_string());
        let mut b = a.clone();
        b.insert("trust_domain".to_string(), "b.org".to_string());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_empty_map_is_hash_of_empty_input() {
        let empty: BTreeMap<String, String> = BTreeMap::new();
        assert_eq!(empty.fingerprint(), fingerprint_text(""));
    }

    #[test]
    fn test_stamp_pod_template() {
        let mut template = PodTemplateSpec::default();
        let digest = fingerprint_text("config");
        stamp_pod_template(&mut template, &ReconcileConfig::default(), &digest);
        let meta = template.metadata.as_ref().unwrap();
        assert_eq!(
            annotation(meta, "warden.spiffe.io/config-hash"),
            Some(digest.as_str())
        );
    }

    /// Story: an operator renames the config-hash annotation; stamping uses
    /// the new key and a comparator from the same config rolls on change
    #[test]
    fn story_renamed_hash_annotation_is_stamped_and_compared() {
        let config = ReconcileConfig {
            config_hash_annotation: "example.com/hash".to_string(),
            special_annotations: vec!["example.com/hash".to_string()],
            ..Default::default()
        };

        let daemonset = |digest: &str| {
            let mut template = PodTemplateSpec::default();
            stamp_pod_template(&mut template, &config, digest);
            DaemonSet {
                spec: Some(DaemonSetSpec {
                    template,
                    ..Default::default()
                }),
                ..Default::default()
            }
        };

        let observed = daemonset(&fingerprint_text("a"));
        let meta = observed.spec.as_ref().unwrap().template.metadata.as_ref().unwrap();
        assert!(annotation(meta, "example.com/hash").is_some());
        assert!(annotation(meta, "warden.spiffe.io/config-hash").is_none());

        let comparator = Comparator::new(&config);
        assert!(!comparator.needs_update(&observed, &daemonset(&fingerprint_text("a"))));
        let drift = comparator
            .drift(&observed, &daemonset(&fingerprint_text("b")))
            .unwrap();
        assert_eq!(
            drift.field(),
            "spec.template.metadata.annotations[example.com/hash]"
        );
    }
}
