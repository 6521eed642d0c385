// # Ownership payload codec
//
// Ownership TXT records carry a label set in a flat text payload:
//
// ```text
// "heritage=external-dns,external-dns/owner=<owner id>,external-dns/resource=<resource>"
// ```
//
// The owner label comes first, the rest follow in key order. Values are
// stored verbatim and may contain commas, `=` and whitespace; only the
// `,<heritage>/` separator is structural, so values containing it are
// rejected by `check_value`.

use crate::endpoint::{Labels, OWNER_LABEL_KEY};
use crate::error::{Error, Result};

/// Heritage used when none is configured
pub const DEFAULT_HERITAGE: &str = "external-dns";

/// Encoder/decoder for ownership payloads under one heritage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipFormat {
    heritage: String,
}

impl OwnershipFormat {
    pub fn new(heritage: impl Into<String>) -> Self {
        Self {
            heritage: heritage.into(),
        }
    }

    pub fn heritage(&self) -> &str {
        &self.heritage
    }

    fn separator(&self) -> String {
        format!(",{}/", self.heritage)
    }

    /// Reject values that would be split apart on decode
    pub fn check_value(&self, value: &str) -> Result<()> {
        let sep = self.separator();
        if value.contains(sep.as_str()) {
            return Err(Error::config(format!(
                "'{}' contains the reserved ownership separator '{}'",
                value, sep
            )));
        }
        Ok(())
    }

    /// Unquoted payload for `labels`
    pub fn encode(&self, labels: &Labels) -> String {
        let mut out = format!("heritage={}", self.heritage);
        let sep = self.separator();
        if let Some(owner) = labels.owner() {
            out.push_str(&sep);
            out.push_str(OWNER_LABEL_KEY);
            out.push('=');
            out.push_str(owner);
        }
        for (key, value) in labels.iter().filter(|(k, _)| k.as_str() != OWNER_LABEL_KEY) {
            out.push_str(&sep);
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    /// Quoted payload, the form stored as record text
    pub fn encode_quoted(&self, labels: &Labels) -> String {
        quote(&self.encode(labels))
    }

    /// Parse a payload, quoted or not
    ///
    /// Returns `None` when the text is not an ownership payload of this
    /// heritage; such TXT records are ordinary data.
    pub fn decode(&self, text: &str) -> Option<Labels> {
        let payload = unquote(text);
        let rest = payload.strip_prefix("heritage=")?;
        let rest = rest.strip_prefix(self.heritage.as_str())?;

        let mut labels = Labels::new();
        if rest.is_empty() {
            return Some(labels);
        }

        let sep = self.separator();
        let rest = rest.strip_prefix(sep.as_str())?;
        for piece in rest.split(sep.as_str()) {
            let (key, value) = piece.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            labels.insert(key, value);
        }
        Some(labels)
    }
}

impl Default for OwnershipFormat {
    fn default() -> Self {
        Self::new(DEFAULT_HERITAGE)
    }
}

/// Wrap record text in double quotes
pub fn quote(text: &str) -> String {
    format!("\"{}\"", text)
}

/// Strip one pair of surrounding double quotes, if present
pub fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::RESOURCE_LABEL_KEY;

    fn owner_labels(owner: &str) -> Labels {
        let mut labels = Labels::new();
        labels.set_owner(owner);
        labels
    }

    #[test]
    fn encodes_the_well_known_payload() {
        let format = OwnershipFormat::default();
        assert_eq!(
            format.encode_quoted(&owner_labels("default")),
            "\"heritage=external-dns,external-dns/owner=default\""
        );
    }

    #[test]
    fn owner_comes_first() {
        let format = OwnershipFormat::default();
        let mut labels = owner_labels("me");
        labels.insert(RESOURCE_LABEL_KEY, "ingress/default/web");
        labels.insert("aaa", "first-by-key");
        assert_eq!(
            format.encode(&labels),
            "heritage=external-dns,external-dns/owner=me,external-dns/aaa=first-by-key,\
             external-dns/resource=ingress/default/web"
        );
    }

    #[test]
    fn owner_ids_round_trip_exactly() {
        let format = OwnershipFormat::default();
        let owners = [
            "default",
            "a,b",
            "key=value",
            "white space",
            " padded ",
            "x=1, y=2",
            "team,external-dns",
            "external-dns/x=1",
            "",
        ];
        for owner in owners {
            assert!(format.check_value(owner).is_ok(), "owner {:?}", owner);
            let decoded = format.decode(&format.encode_quoted(&owner_labels(owner))).unwrap();
            assert_eq!(decoded.owner(), Some(owner), "owner {:?}", owner);
        }
    }

    #[test]
    fn separator_in_owner_id_is_rejected() {
        let format = OwnershipFormat::default();
        assert!(format.check_value("team,external-dns/x=1").is_err());
        // Only the configured heritage is structural
        assert!(OwnershipFormat::new("other").check_value("team,external-dns/x=1").is_ok());
    }

    #[test]
    fn decodes_unquoted_and_bare_heritage() {
        let format = OwnershipFormat::default();
        let labels = format
            .decode("heritage=external-dns,external-dns/owner=default")
            .unwrap();
        assert_eq!(labels.owner(), Some("default"));
        assert!(format.decode("\"heritage=external-dns\"").unwrap().is_empty());
    }

    #[test]
    fn foreign_text_is_not_ownership() {
        let format = OwnershipFormat::default();
        assert!(format.decode("\"v=spf1 include:example.com ~all\"").is_none());
        assert!(format.decode("heritage=other-tool,other-tool/owner=x").is_none());
        assert!(format.decode("heritage=external-dnsx").is_none());
        assert!(format.decode("heritage=external-dns,external-dns/novalue").is_none());
    }

    #[test]
    fn custom_heritage() {
        let format = OwnershipFormat::new("dnsreconcile");
        let payload = format.encode_quoted(&owner_labels("blue"));
        assert_eq!(payload, "\"heritage=dnsreconcile,dnsreconcile/owner=blue\"");
        assert!(OwnershipFormat::default().decode(&payload).is_none());
    }

    #[test]
    fn quoting() {
        assert_eq!(unquote(&quote("abc")), "abc");
        assert_eq!(unquote("abc"), "abc");
        assert_eq!(unquote("\"abc"), "\"abc");
    }
}
