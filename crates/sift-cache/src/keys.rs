//! Cache key construction
//!
//! All namespaces used by the store. Components hold keys only, never
//! entries.

/// Namespace prefix for query results
pub const QUERY_NS: &str = "query";

/// Namespace prefix for embeddings
pub const EMBEDDING_NS: &str = "embedding";

/// Namespace prefix for processed content
pub const CONTENT_NS: &str = "content";

/// Namespace prefix for content text hashes
pub const CONTENT_HASH_NS: &str = "content_hash";

/// Namespace prefix for change markers
pub const CONTENT_CHANGE_NS: &str = "content_change";

/// Namespace prefix for indexed-content markers
pub const INDEXED_CONTENT_NS: &str = "indexed_content";

/// `query:<fingerprint>`
pub fn query(fingerprint: &str) -> String {
    format!("{QUERY_NS}:{fingerprint}")
}

/// `embedding:<text_hash>`
pub fn embedding(text_hash: &str) -> String {
    format!("{EMBEDDING_NS}:{text_hash}")
}

/// `content:<content_id>`
pub fn content(content_id: &str) -> String {
    format!("{CONTENT_NS}:{content_id}")
}

/// `content_hash:<content_id>`
pub fn content_hash(content_id: &str) -> String {
    format!("{CONTENT_HASH_NS}:{content_id}")
}

/// `content_change:<content_id>:<timestamp_ms>`
pub fn content_change(content_id: &str, timestamp_ms: i64) -> String {
    format!("{CONTENT_CHANGE_NS}:{content_id}:{timestamp_ms}")
}

/// `indexed_content:<content_id>`
pub fn indexed_content(content_id: &str) -> String {
    format!("{INDEXED_CONTENT_NS}:{content_id}")
}

/// The `:meta` sibling of any data key
pub fn meta(data_key: &str) -> String {
    format!("{data_key}:meta")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(query("abc"), "query:abc");
        assert_eq!(embedding("1f"), "embedding:1f");
        assert_eq!(content("doc-1"), "content:doc-1");
        assert_eq!(content_hash("doc-1"), "content_hash:doc-1");
        assert_eq!(content_change("doc-1", 42), "content_change:doc-1:42");
        assert_eq!(indexed_content("doc-1"), "indexed_content:doc-1");
        assert_eq!(meta("query:abc"), "query:abc:meta");
    }
}
