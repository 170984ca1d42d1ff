//! Cache keys for generated artifacts.

use std::fmt;

use folio_render_types::{GenerationOptions, GenerationTarget};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Content fingerprint of a target and the options it was generated with.
///
/// Formatted as `<mode>:<template>:<sha256>` so keys stay readable in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey(String);

#[derive(Serialize)]
struct Fingerprint<'a> {
    target: &'a GenerationTarget,
    options: &'a GenerationOptions,
}

impl ArtifactKey {
    pub fn fingerprint(
        target: &GenerationTarget,
        options: &GenerationOptions,
    ) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_vec(&Fingerprint { target, options })?;
        let digest = hex::encode(Sha256::digest(&encoded));
        Ok(Self(format!(
            "{}:{}:{digest}",
            target.mode.trim().to_ascii_lowercase(),
            target.template.trim()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use folio_render_types::PortfolioDocument;

    use super::*;

    fn target(name: &str) -> GenerationTarget {
        GenerationTarget::new(
            "Site",
            "classic",
            PortfolioDocument {
                name: name.to_string(),
                ..PortfolioDocument::default()
            },
        )
    }

    #[test]
    fn identical_inputs_share_a_key() {
        let options = GenerationOptions::default();
        let a = ArtifactKey::fingerprint(&target("Ada"), &options).expect("key");
        let b = ArtifactKey::fingerprint(&target("Ada"), &options).expect("key");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("site:classic:"));
    }

    #[test]
    fn document_and_options_change_the_key() {
        let options = GenerationOptions::default();
        let base = ArtifactKey::fingerprint(&target("Ada"), &options).expect("key");
        let renamed = ArtifactKey::fingerprint(&target("Grace"), &options).expect("key");
        let fast = ArtifactKey::fingerprint(
            &target("Ada"),
            &GenerationOptions {
                fast_mode: true,
                ..GenerationOptions::default()
            },
        )
        .expect("key");

        assert_ne!(base, renamed);
        assert_ne!(base, fast);
    }
}
