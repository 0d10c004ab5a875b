//! Page hash manifests and the canonical signing payload
//!
//! A manifest is the ordered list of per-page content hashes that a
//! certificate attests to. Its string form is what gets signed, so the
//! formatting here is part of the certificate format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between manifest entries in the string form
pub const ENTRY_SEPARATOR: char = ',';

/// Separator between payload components
pub const PAYLOAD_SEPARATOR: char = '|';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Malformed manifest entry: {0}")]
    MalformedEntry(String),

    #[error("Page numbers out of order at entry {0}")]
    OutOfOrder(usize),
}

/// Hash of a single page, rendered as `P<n>:<sha256-hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageHash {
    /// 1-based page number
    pub page: u32,
    /// Lowercase hex SHA-256 digest
    pub digest: String,
}

impl PageHash {
    pub fn new(page: u32, digest: impl Into<String>) -> Self {
        Self {
            page,
            digest: digest.into(),
        }
    }
}

impl fmt::Display for PageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}:{}", self.page, self.digest)
    }
}

impl FromStr for PageHash {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ManifestError::MalformedEntry(s.to_string());

        let rest = s.strip_prefix('P').ok_or_else(malformed)?;
        let (page, digest) = rest.split_once(':').ok_or_else(malformed)?;
        let page: u32 = page.parse().map_err(|_| malformed())?;

        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed());
        }

        Ok(Self {
            page,
            digest: digest.to_ascii_lowercase(),
        })
    }
}

/// Ordered list of page hashes, one per page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHashManifest {
    entries: Vec<PageHash>,
}

impl PageHashManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PageHash>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: PageHash) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PageHash] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compare against an expected manifest, page by page.
    ///
    /// The result has one slot per page present in either manifest. A slot is
    /// `true` only when both sides have the page and the digests agree, so a
    /// page-count difference always shows up as at least one `false`.
    pub fn page_matches(&self, expected: &PageHashManifest) -> Vec<bool> {
        let len = self.len().max(expected.len());
        (0..len)
            .map(|i| match (self.entries.get(i), expected.entries.get(i)) {
                (Some(actual), Some(wanted)) => actual == wanted,
                _ => false,
            })
            .collect()
    }
}

impl fmt::Display for PageHashManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", ENTRY_SEPARATOR)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

impl FromStr for PageHashManifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        for part in s.split(ENTRY_SEPARATOR) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let entry: PageHash = part.parse()?;
            if entry.page as usize != entries.len() + 1 {
                return Err(ManifestError::OutOfOrder(entries.len()));
            }
            entries.push(entry);
        }
        Ok(Self { entries })
    }
}

/// The exact string that gets signed: `<manifest>|<timestampMillis>|<signerId>`
///
/// Signing and verification must both go through [`SignaturePayload::canonical`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePayload {
    pub manifest: String,
    pub timestamp_ms: i64,
    pub signer_id: String,
}

impl SignaturePayload {
    pub fn new(manifest: &PageHashManifest, timestamp_ms: i64, signer_id: &str) -> Self {
        Self {
            manifest: manifest.to_string(),
            timestamp_ms,
            signer_id: signer_id.to_string(),
        }
    }

    /// Build a payload from a manifest string exactly as it was recorded
    pub fn from_recorded(manifest: &str, timestamp_ms: i64, signer_id: &str) -> Self {
        Self {
            manifest: manifest.to_string(),
            timestamp_ms,
            signer_id: signer_id.to_string(),
        }
    }

    pub fn canonical(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.manifest,
            self.timestamp_ms,
            self.signer_id,
            sep = PAYLOAD_SEPARATOR
        )
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        self.canonical().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn digest(c: char) -> String {
        std::iter::repeat(c).take(64).collect()
    }

    #[test]
    fn test_page_hash_display() {
        let entry = PageHash::new(1, digest('a'));
        assert_eq!(entry.to_string(), format!("P1:{}", digest('a')));
    }

    #[test]
    fn test_manifest_string_form() {
        let manifest = PageHashManifest::from_entries(vec![
            PageHash::new(1, digest('a')),
            PageHash::new(2, digest('b')),
        ]);
        assert_eq!(
            manifest.to_string(),
            format!("P1:{},P2:{}", digest('a'), digest('b'))
        );
    }

    #[test]
    fn test_manifest_parse_roundtrip() {
        let text = format!("P1:{},P2:{}", digest('0'), digest('f'));
        let manifest: PageHashManifest = text.parse().unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.to_string(), text);
    }

    #[test]
    fn test_manifest_parse_rejects_garbage() {
        assert!("P1:nothex".parse::<PageHashManifest>().is_err());
        assert!("Q1:abc".parse::<PageHashManifest>().is_err());
        assert!(format!("P2:{}", digest('a'))
            .parse::<PageHashManifest>()
            .is_err());
    }

    #[test]
    fn test_empty_manifest_parses() {
        let manifest: PageHashManifest = "".parse().unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_page_matches_flags_changed_page() {
        let expected = PageHashManifest::from_entries(vec![
            PageHash::new(1, digest('a')),
            PageHash::new(2, digest('b')),
        ]);
        let actual = PageHashManifest::from_entries(vec![
            PageHash::new(1, digest('a')),
            PageHash::new(2, digest('c')),
        ]);
        assert_eq!(actual.page_matches(&expected), vec![true, false]);
    }

    #[test]
    fn test_page_matches_length_mismatch() {
        let expected = PageHashManifest::from_entries(vec![PageHash::new(1, digest('a'))]);
        let actual = PageHashManifest::from_entries(vec![
            PageHash::new(1, digest('a')),
            PageHash::new(2, digest('b')),
        ]);
        assert_eq!(actual.page_matches(&expected), vec![true, false]);
    }

    #[test]
    fn test_canonical_payload() {
        let manifest = PageHashManifest::from_entries(vec![PageHash::new(1, digest('a'))]);
        let payload = SignaturePayload::new(&manifest, 1_700_000_000_000, "U1");
        assert_eq!(
            payload.canonical(),
            format!("P1:{}|1700000000000|U1", digest('a'))
        );
    }
}
