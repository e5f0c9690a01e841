//! Stylesheet rewriting: point `url(...)` references at fingerprinted CDN keys.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::bytes::Regex;
use tempfile::{NamedTempFile, TempPath};

use assethost_core::Variant;

use crate::error::{io_err, SyncError};
use crate::keys::KeyDeriver;

/// Produces a copy of a stylesheet with asset references rewritten.
pub trait CssRewriter {
    /// Rewrite `path` into a new temporary file, removed when the returned
    /// [`TempPath`] is dropped.
    fn rewrite(&self, path: &Path) -> Result<TempPath, SyncError>;
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // quote, path, optional ?query/#fragment, closing quote
        Regex::new(r#"(?i)url\(\s*(['"]?)([^'"()?#\s]+)([?#][^'"()\s]*)?['"]?\s*\)"#)
            .unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

/// Rewrites local references to `url(<asset_host>/<plain key>)`.
///
/// External (`http:`, `https:`, `//`) and `data:` URLs are left alone, as
/// are references to files that do not exist under the public root.
#[derive(Debug, Clone)]
pub struct FingerprintCssRewriter {
    keys: KeyDeriver,
    asset_host: String,
}

impl FingerprintCssRewriter {
    pub fn new(keys: KeyDeriver, asset_host: &str) -> Self {
        Self {
            keys,
            asset_host: asset_host.trim_end_matches('/').to_owned(),
        }
    }

    /// Rewrite stylesheet `contents` located at `stylesheet`.
    ///
    /// Works on raw bytes: stylesheets in legacy encodings pass through
    /// unchanged outside the rewritten references.
    pub fn rewrite_contents(&self, stylesheet: &Path, contents: &[u8]) -> Result<Vec<u8>, SyncError> {
        let base = stylesheet.parent().unwrap_or(self.keys.root());
        let mut out = Vec::with_capacity(contents.len());
        let mut last = 0;

        for caps in url_pattern().captures_iter(contents) {
            let (Some(whole), Some(reference)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            let quote = caps.get(1).map_or(&b""[..], |m| m.as_bytes());
            let suffix = caps.get(3).map_or(&b""[..], |m| m.as_bytes());

            out.extend_from_slice(&contents[last..whole.start()]);
            last = whole.end();

            let url = match std::str::from_utf8(reference.as_bytes()) {
                Ok(reference) => self.resolve(base, reference)?,
                Err(_) => None,
            };
            match url {
                Some(url) => {
                    out.extend_from_slice(b"url(");
                    out.extend_from_slice(quote);
                    out.extend_from_slice(url.as_bytes());
                    out.extend_from_slice(suffix);
                    out.extend_from_slice(quote);
                    out.push(b')');
                }
                None => out.extend_from_slice(whole.as_bytes()),
            }
        }
        out.extend_from_slice(&contents[last..]);
        Ok(out)
    }

    /// CDN URL for `reference`, or `None` when it should stay untouched.
    fn resolve(&self, base: &Path, reference: &str) -> Result<Option<String>, SyncError> {
        let lower = reference.to_ascii_lowercase();
        if lower.starts_with("http:")
            || lower.starts_with("https:")
            || lower.starts_with("data:")
            || reference.starts_with("//")
        {
            return Ok(None);
        }

        let candidate: PathBuf = match reference.strip_prefix('/') {
            Some(absolute) => self.keys.root().join(absolute),
            None => base.join(reference),
        };
        let target = match candidate.canonicalize() {
            Ok(target) if target.is_file() => target,
            _ => {
                tracing::warn!(
                    "css reference not found, left as is: {} ({})",
                    reference,
                    candidate.display()
                );
                return Ok(None);
            }
        };
        let asset = match self.keys.asset(&target) {
            Ok(asset) => asset,
            Err(SyncError::OutsideRoot { .. }) => {
                tracing::warn!("css reference outside public root, left as is: {reference}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let key = self.keys.key_for(&asset, Variant::Plain)?;
        Ok(Some(format!("{}/{}", self.asset_host, key)))
    }
}

impl CssRewriter for FingerprintCssRewriter {
    fn rewrite(&self, path: &Path) -> Result<TempPath, SyncError> {
        let contents = std::fs::read(path).map_err(|e| io_err(path, e))?;
        let rewritten = self.rewrite_contents(path, &contents)?;

        let mut tmp = NamedTempFile::with_prefix("assethost-css").map_err(|e| io_err(path, e))?;
        let tmp_file = tmp.path().to_path_buf();
        tmp.write_all(&rewritten)
            .map_err(|e| io_err(&tmp_file, e))?;
        tmp.flush().map_err(|e| io_err(&tmp_file, e))?;

        tracing::debug!("rewrote {}", path.display());
        Ok(tmp.into_temp_path())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        _dir: TempDir,
        keys: KeyDeriver,
        rewriter: FingerprintCssRewriter,
        stylesheet: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let p = dir.path();
        fs::create_dir_all(p.join("images/icons")).unwrap();
        fs::create_dir_all(p.join("stylesheets")).unwrap();
        fs::write(p.join("images/logo.png"), b"logo").unwrap();
        fs::write(p.join("images/icons/star.gif"), b"star").unwrap();
        let keys = KeyDeriver::new(p, None, "gz");
        let stylesheet = keys.root().join("stylesheets/app.css");
        fs::write(&stylesheet, "").unwrap();
        let rewriter = FingerprintCssRewriter::new(keys.clone(), "https://cdn.example.com/");
        Fixture {
            _dir: dir,
            keys,
            rewriter,
            stylesheet,
        }
    }

    fn cdn_url(f: &Fixture, relative: &str) -> String {
        let asset = f.keys.asset(&f.keys.root().join(relative)).unwrap();
        let key = f.keys.key_for(&asset, Variant::Plain).unwrap();
        format!("https://cdn.example.com/{key}")
    }

    #[test]
    fn rewrites_absolute_and_relative_references() {
        let f = fixture();
        let css = "a{background:url(/images/logo.png)}\nb{background:url('../images/icons/star.gif')}";
        let out = f.rewriter.rewrite_contents(&f.stylesheet, css.as_bytes()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!(
                "a{{background:url({})}}\nb{{background:url('{}')}}",
                cdn_url(&f, "images/logo.png"),
                cdn_url(&f, "images/icons/star.gif")
            )
        );
    }

    #[test]
    fn keeps_query_and_fragment() {
        let f = fixture();
        let out = f
            .rewriter
            .rewrite_contents(&f.stylesheet, br#"x{src:url("/images/logo.png?v=2#top")}"#)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!(r#"x{{src:url("{}?v=2#top")}}"#, cdn_url(&f, "images/logo.png"))
        );
    }

    #[test]
    fn leaves_external_data_and_missing_references() {
        let f = fixture();
        let css = "a{b:url(http://x.org/a.png)}c{d:url(//x.org/b.png)}\
                   e{f:url(data:image/png;base64,AAAA)}g{h:url(/images/missing.png)}";
        let out = f.rewriter.rewrite_contents(&f.stylesheet, css.as_bytes()).unwrap();
        assert_eq!(out, css.as_bytes());
    }

    #[test]
    fn latin1_stylesheet_is_rewritten_byte_for_byte() {
        let f = fixture();
        fs::write(&f.stylesheet, b"/* caf\xe9 */ a{b:url(/images/logo.png)}").unwrap();
        let tmp = f.rewriter.rewrite(&f.stylesheet).unwrap();
        let out = fs::read(&tmp).unwrap();

        let mut expected = b"/* caf\xe9 */ a{b:url(".to_vec();
        expected.extend_from_slice(cdn_url(&f, "images/logo.png").as_bytes());
        expected.extend_from_slice(b")}");
        assert_eq!(out, expected);
    }

    #[test]
    fn rewrite_writes_temp_file() {
        let f = fixture();
        fs::write(&f.stylesheet, "a{b:url(/images/logo.png)}").unwrap();
        let tmp = f.rewriter.rewrite(&f.stylesheet).unwrap();
        let out = fs::read_to_string(&tmp).unwrap();
        assert!(out.contains(&cdn_url(&f, "images/logo.png")));
        let path = tmp.to_path_buf();
        drop(tmp);
        assert!(!path.exists());
    }
}
