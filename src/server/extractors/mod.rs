mod proxy_origin_extractor;

pub use proxy_origin_extractor::*;
