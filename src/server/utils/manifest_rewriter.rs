// line oriented hls rewriting. this is not a playlist parser on purpose, a line is a reference
// if it's not blank and doesn't start with '#', and tags only get their URI="..." touched
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

static URI_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"URI="([^"]*)""#).expect("Static regex should compile"));

/// scheme and host the relay is reachable on, as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyOrigin {
    pub scheme: String,
    pub host: String,
}

impl ProxyOrigin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
        }
    }

    /// wrap an absolute upstream url so the player comes back through /proxy for it
    pub fn wrap(&self, absolute_url: &str) -> String {
        format!(
            "{}://{}/proxy?url={}",
            self.scheme,
            self.host,
            urlencoding::encode(absolute_url)
        )
    }
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("unresolvable reference {reference:?} on line {line}: {source}")]
    UnresolvableReference {
        reference: String,
        line: usize,
        #[source]
        source: url::ParseError,
    },
}

/// directory of the manifest, relative references are resolved against this. query and
/// fragment are dropped so a '/' inside a token can't move the directory
pub fn base_url(target_url: &Url) -> Url {
    let mut base = target_url.clone();
    base.set_query(None);
    base.set_fragment(None);

    let directory = {
        let path = base.path();
        path[..path.rfind('/').map_or(0, |i| i + 1)].to_string()
    };
    base.set_path(&directory);

    base
}

/// rewrite every reference in `manifest` to go through the relay at `origin`.
///
/// line count, line endings and any text that isn't a reference come out byte for byte. if any
/// reference can't be resolved nothing is returned, a partially rewritten playlist would let
/// the player talk to the origin directly.
pub fn rewrite(manifest: &str, base: &Url, origin: &ProxyOrigin) -> Result<String, RewriteError> {
    // a byte order mark would hide #EXTM3U and get the header wrapped like a segment
    let manifest = manifest.strip_prefix('\u{FEFF}').unwrap_or(manifest);
    let mut rewritten = String::with_capacity(manifest.len() * 2);

    for (index, raw_line) in manifest.split('\n').enumerate() {
        if index > 0 {
            rewritten.push('\n');
        }

        let (line, carriage_return) = match raw_line.strip_suffix('\r') {
            Some(line) => (line, "\r"),
            None => (raw_line, ""),
        };
        let trimmed = line.trim();
        let line_number = index + 1;

        if trimmed.is_empty() {
            rewritten.push_str(line);
        } else if trimmed.starts_with('#') {
            rewrite_uri_attributes(line, base, origin, line_number, &mut rewritten)?;
        } else {
            let absolute = resolve(trimmed, base, line_number)?;
            rewritten.push_str(&origin.wrap(&absolute));
        }

        rewritten.push_str(carriage_return);
    }

    Ok(rewritten)
}

// EXT-X-KEY, EXT-X-MAP, EXT-X-MEDIA and friends. everything outside the quotes is copied as is
fn rewrite_uri_attributes(
    line: &str,
    base: &Url,
    origin: &ProxyOrigin,
    line_number: usize,
    out: &mut String,
) -> Result<(), RewriteError> {
    let mut copied_up_to = 0;

    for captures in URI_ATTRIBUTE.captures_iter(line) {
        let Some(value) = captures.get(1) else {
            continue;
        };
        if value.as_str().is_empty() {
            continue;
        }

        let absolute = resolve(value.as_str(), base, line_number)?;
        out.push_str(&line[copied_up_to..value.start()]);
        out.push_str(&origin.wrap(&absolute));
        copied_up_to = value.end();
    }

    out.push_str(&line[copied_up_to..]);
    Ok(())
}

// absolute references are kept verbatim so the upstream sees exactly what the playlist said
fn resolve(reference: &str, base: &Url, line: usize) -> Result<String, RewriteError> {
    let unresolvable = |source| RewriteError::UnresolvableReference {
        reference: reference.to_string(),
        line,
        source,
    };

    match Url::parse(reference) {
        Ok(_) => Ok(reference.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .join(reference)
            .map(|resolved| resolved.to_string())
            .map_err(unresolvable),
        Err(source) => Err(unresolvable(source)),
    }
}
