use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;

const BUFFER_SIZE: usize = 64 * 1024;

/// Schemes `download_to_dir` can fetch.
pub const SUPPORTED_SCHEMES: [&str; 2] = ["http", "https"];

/// True when `s` looks like `scheme://host/...` rather than a local path.
///
/// Any scheme counts, so that e.g. `ftp://` input is reported as an
/// unsupported download instead of a missing local file.
pub fn is_url(s: &str) -> bool {
    let Some((scheme, rest)) = s.split_once("://") else {
        return false;
    };
    let scheme_ok = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    let host = rest.split(|c| matches!(c, '/' | '?' | '#')).next().unwrap_or("");

    scheme_ok && !host.is_empty()
}

/// Extract the filename from a URL's last path segment.
pub fn filename_from_url(url: &str) -> Result<String> {
    let path = url
        .split('?')
        .next()
        .unwrap_or(url)
        .split('#')
        .next()
        .unwrap_or(url);

    let filename = path.rsplit('/').next().unwrap_or("");

    if filename.is_empty() || filename.contains("://") {
        bail!("cannot extract filename from URL: '{url}'");
    }

    if filename.contains('\\') || filename == ".." || filename == "." {
        bail!("unsafe filename extracted from URL: '{filename}'");
    }

    Ok(filename.to_string())
}

/// Download `url` into `dir`, keeping the remote filename. Returns the local path.
///
/// Only http and https are fetched; other schemes fail before any request is made.
pub fn download_to_dir(url: &str, dir: &Path) -> Result<PathBuf> {
    let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
    if !SUPPORTED_SCHEMES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(scheme))
    {
        bail!(
            "unsupported URL scheme '{scheme}' in {url}: only http and https downloads are supported"
        );
    }

    let dest = dir.join(filename_from_url(url)?);

    let mut response = ureq::get(url)
        .call()
        .with_context(|| format!("HTTP request failed for {url}"))?;

    let file =
        File::create(&dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let mut writer = BufWriter::new(file);
    let mut reader = response.body_mut().as_reader();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = reader
            .read(&mut buffer)
            .with_context(|| format!("failed reading response body from {url}"))?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n])?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("failed to flush {}", dest.display()))?;
    file.sync_all()?;

    info!("Downloaded {} to {}", url, dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_urls() {
        assert!(is_url("https://example.org/gencode.v46.annotation.gtf.gz"));
        assert!(is_url("ftp://ftp.ensembl.org/pub/release-112/gtf/x.gtf"));
        assert!(!is_url("/data/genes.gtf"));
        assert!(!is_url("genes.gtf"));
        assert!(!is_url("file:///data/genes.gtf"));
        assert!(!is_url("://host/x"));
        assert!(!is_url("C:\\data\\genes.gtf"));
    }

    #[test]
    fn filename_is_last_segment_without_query() {
        assert_eq!(
            filename_from_url("https://example.org/a/b/genes.gtf.gz?token=1#frag").unwrap(),
            "genes.gtf.gz"
        );
        assert!(filename_from_url("https://example.org/a/").is_err());
        assert!(filename_from_url("https://example.org/..").is_err());
    }

    #[test]
    fn ftp_is_rejected_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let url = "ftp://ftp.ebi.ac.uk/pub/databases/gencode/genes.gtf";
        assert!(is_url(url));

        let err = download_to_dir(url, dir.path()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("unsupported URL scheme 'ftp'"), "{msg}");
        assert!(!dir.path().join("genes.gtf").exists());
    }
}
