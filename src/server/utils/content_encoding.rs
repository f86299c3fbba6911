use std::io::{self, Read, Write};

use axum::http::{HeaderMap, HeaderValue, header};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};

/// how a manifest body is encoded on the wire, either coming from the cdn or going to a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Zstd,
    Identity,
}

impl ContentEncoding {
    /// choose what to send a player from its Accept-Encoding.
    ///
    /// gzip is preferred whenever it's acceptable because that is all AVPlayer and hls.js over
    /// older browsers understand. a coding listed with `q=0` counts as refused.
    pub fn negotiate(request_headers: &HeaderMap) -> Self {
        let Some(accept) = request_headers
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
        else {
            return Self::Identity;
        };

        let accepted: Vec<String> = accept
            .split(',')
            .filter_map(|item| {
                let mut parts = item.split(';');
                let coding = parts.next()?.trim().to_ascii_lowercase();
                let refused = parts.any(|param| {
                    param
                        .trim()
                        .strip_prefix("q=")
                        .and_then(|q| q.trim().parse::<f32>().ok())
                        .is_some_and(|q| q <= 0.0)
                });
                (!coding.is_empty() && !refused).then_some(coding)
            })
            .collect();

        if accepted.iter().any(|c| c == "gzip" || c == "x-gzip") {
            Self::Gzip
        } else if accepted.iter().any(|c| c == "zstd") {
            Self::Zstd
        } else {
            Self::Identity
        }
    }

    /// what the cdn says it sent. unknown codings are read as identity and left to the utf-8
    /// check to reject
    pub fn of_upstream(response_headers: &HeaderMap) -> Self {
        match response_headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("gzip") | Some("x-gzip") => Self::Gzip,
            Some("zstd") => Self::Zstd,
            _ => Self::Identity,
        }
    }

    pub fn header_value(self) -> Option<HeaderValue> {
        match self {
            Self::Gzip => Some(HeaderValue::from_static("gzip")),
            Self::Zstd => Some(HeaderValue::from_static("zstd")),
            Self::Identity => None,
        }
    }

    pub fn encode(self, body: Vec<u8>) -> io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::fast());
                encoder.write_all(&body)?;
                encoder.finish()
            }
            Self::Zstd => zstd::encode_all(body.as_slice(), 3),
            Self::Identity => Ok(body),
        }
    }

    pub fn decode(self, body: Vec<u8>) -> io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut decoded = Vec::with_capacity(body.len() * 4);
                GzDecoder::new(body.as_slice()).read_to_end(&mut decoded)?;
                Ok(decoded)
            }
            Self::Zstd => zstd::decode_all(body.as_slice()),
            Self::Identity => Ok(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepting(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn prefers_gzip_over_zstd() {
        assert_eq!(
            ContentEncoding::negotiate(&accepting("zstd, gzip;q=0.5")),
            ContentEncoding::Gzip
        );
        assert_eq!(ContentEncoding::negotiate(&accepting("br, zstd")), ContentEncoding::Zstd);
    }

    #[test]
    fn honours_refused_codings() {
        assert_eq!(
            ContentEncoding::negotiate(&accepting("gzip;q=0, identity")),
            ContentEncoding::Identity
        );
        assert_eq!(ContentEncoding::negotiate(&HeaderMap::new()), ContentEncoding::Identity);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let manifest = b"#EXTM3U\n#EXTINF:6.0,\nseg1.ts\n".to_vec();

        for encoding in [ContentEncoding::Gzip, ContentEncoding::Zstd, ContentEncoding::Identity] {
            let encoded = encoding.encode(manifest.clone()).unwrap();
            assert_eq!(encoding.decode(encoded).unwrap(), manifest);
        }
    }
}
