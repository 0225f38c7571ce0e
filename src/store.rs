//! The I/O seam between the synchronizer and the menu document store.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::error::TransportError;

/// A REST resource server holding the menu collections as JSON documents.
///
/// `path` includes the leading slash, e.g. `/dishes/12`. Implementations do
/// not retry; a failed request surfaces as a [`TransportError`].
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
}

/// Collection paths exposed by the store.
pub mod paths {
    pub const BRANDING: &str = "/branding";
    pub const BRANCHES: &str = "/branches";
    pub const CATEGORIES: &str = "/categories";
    pub const DISHES: &str = "/dishes";

    pub fn item(collection: &str, id: &str) -> String {
        format!("{collection}/{}", encode_segment(id))
    }

    /// Percent-encode an id for use as a single path segment.
    pub fn encode_segment(input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        for b in input.bytes() {
            match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(b as char)
                }
                _ => out.push_str(&format!("%{b:02X}")),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::paths;

    #[test]
    fn item_paths_encode_ids() {
        assert_eq!(paths::item(paths::DISHES, "12"), "/dishes/12");
        assert_eq!(paths::item(paths::BRANCHES, "a b/c"), "/branches/a%20b%2Fc");
    }
}
