use crate::extract::{ExtractError, ExtractRequest, StreamExtractor};
use crate::media::RawMedia;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads local `.m3u`/`.pls` manifests and yields their first stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaylistFileExtractor;

impl PlaylistFileExtractor {
    fn local_path(locator: &str) -> Option<PathBuf> {
        if let Some(path) = locator.strip_prefix("file://") {
            return Some(PathBuf::from(path));
        }
        locator.starts_with('/').then(|| PathBuf::from(locator))
    }
}

impl StreamExtractor for PlaylistFileExtractor {
    fn extract(&self, locator: &str, _request: &ExtractRequest) -> Result<RawMedia, ExtractError> {
        let path = Self::local_path(locator).ok_or_else(|| ExtractError::Unsupported {
            locator: locator.to_string(),
        })?;
        let contents = fs::read_to_string(&path).map_err(|e| ExtractError::Backend {
            message: format!("failed to read {}: {e}", path.display()),
        })?;

        let first = if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pls")) {
            parse_pls(&contents)
        } else {
            parse_m3u(&contents)
        };
        let (stream, title) = first.ok_or_else(|| ExtractError::NoStream {
            locator: locator.to_string(),
        })?;

        let mut meta = RawMedia::new();
        meta.insert("uri".into(), json!(absolutize(&stream, &path)));
        if let Some(title) = title {
            meta.insert("title".into(), json!(title));
        }
        Ok(meta)
    }
}

fn parse_m3u(contents: &str) -> Option<(String, Option<String>)> {
    let mut title = None;
    for line in contents.lines().map(str::trim) {
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            title = info
                .split_once(',')
                .map(|(_, t)| t.trim().to_string())
                .filter(|t| !t.is_empty());
        } else if !line.is_empty() && !line.starts_with('#') {
            return Some((line.to_string(), title));
        }
    }
    None
}

fn parse_pls(contents: &str) -> Option<(String, Option<String>)> {
    let mut stream = None;
    let mut title = None;
    for line in contents.lines().map(str::trim) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "file1" => stream = Some(value.trim().to_string()),
            "title1" => title = Some(value.trim().to_string()),
            _ => {}
        }
    }
    stream.map(|s| (s, title))
}

fn absolutize(stream: &str, manifest: &Path) -> String {
    if stream.contains("://") || stream.starts_with('/') {
        return stream.to_string();
    }
    match manifest.parent() {
        Some(dir) => dir.join(stream).display().to_string(),
        None => stream.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn manifest(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn m3u_yields_first_entry_with_title() {
        let file = manifest(
            ".m3u",
            "#EXTM3U\n#EXTINF:-1,Relax FM\nhttp://radio.example/relax\nhttp://radio.example/other\n",
        );
        let meta = PlaylistFileExtractor
            .extract(&file.path().display().to_string(), &ExtractRequest::default())
            .unwrap();
        assert_eq!(meta.get("uri"), Some(&json!("http://radio.example/relax")));
        assert_eq!(meta.get("title"), Some(&json!("Relax FM")));
    }

    #[test]
    fn pls_yields_file1() {
        let file = manifest(
            ".pls",
            "[playlist]\nNumberOfEntries=1\nFile1=http://radio.example/jazz\nTitle1=Jazz\n",
        );
        let locator = format!("file://{}", file.path().display());
        let meta = PlaylistFileExtractor
            .extract(&locator, &ExtractRequest::default())
            .unwrap();
        assert_eq!(meta.get("uri"), Some(&json!("http://radio.example/jazz")));
    }

    #[test]
    fn relative_entries_resolve_next_to_manifest() {
        let file = manifest(".m3u", "song.mp3\n");
        let meta = PlaylistFileExtractor
            .extract(&file.path().display().to_string(), &ExtractRequest::default())
            .unwrap();
        let expected = file.path().parent().unwrap().join("song.mp3");
        assert_eq!(meta.get("uri"), Some(&json!(expected.display().to_string())));
    }

    #[test]
    fn remote_manifests_are_unsupported() {
        let result = PlaylistFileExtractor.extract("http://radio.example/a.pls", &ExtractRequest::default());
        assert!(matches!(result, Err(ExtractError::Unsupported { .. })));
    }

    #[test]
    fn empty_manifest_has_no_stream() {
        let file = manifest(".m3u", "#EXTM3U\n");
        let result = PlaylistFileExtractor
            .extract(&file.path().display().to_string(), &ExtractRequest::default());
        assert!(matches!(result, Err(ExtractError::NoStream { .. })));
    }
}
