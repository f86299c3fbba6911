pub mod content_encoding;
pub mod manifest_rewriter;
