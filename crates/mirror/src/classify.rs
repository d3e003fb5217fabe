//! Line-oriented manifest classification.
//!
//! Every non-blank line is tested independently against three rules, so one
//! line may land in more than one list: a line containing both the segment
//! and the manifest marker is reported as both.

use std::sync::LazyLock;

use regex::Regex;

static KEY_URI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"URI="([^"]+)""#).unwrap());

/// References found in one manifest, each list in source line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestRefs {
    pub segments: Vec<String>,
    pub manifests: Vec<String>,
    pub keys: Vec<String>,
}

/// Splits manifest text into segment, child-manifest and key references.
#[derive(Debug, Clone)]
pub struct ManifestClassifier {
    segment_marker: String,
    manifest_marker: String,
}

impl ManifestClassifier {
    pub fn new(segment_marker: impl Into<String>, manifest_marker: impl Into<String>) -> Self {
        Self {
            segment_marker: segment_marker.into(),
            manifest_marker: manifest_marker.into(),
        }
    }

    pub fn classify(&self, text: &str) -> ManifestRefs {
        let mut refs = ManifestRefs::default();

        for line in text.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
            if line.contains(self.segment_marker.as_str()) {
                refs.segments.push(line.to_string());
            }
            if line.contains(self.manifest_marker.as_str()) {
                refs.manifests.push(line.to_string());
            }
            if let Some(uri) = extract_key_uri(line) {
                refs.keys.push(uri.to_string());
            }
        }

        refs
    }
}

impl Default for ManifestClassifier {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_SEGMENT_MARKER,
            crate::config::DEFAULT_MANIFEST_MARKER,
        )
    }
}

/// Value of the first `URI="..."` attribute on the line, if any.
pub fn extract_key_uri(line: &str) -> Option<&str> {
    KEY_URI_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA_PLAYLIST: &str = "#EXTM3U\n\
        #EXT-X-VERSION:3\n\
        #EXT-X-TARGETDURATION:10\n\
        #EXT-X-KEY:METHOD=AES-128,URI=\"key1.key\",IV=0x01\n\
        #EXTINF:10.0,\n\
        seg001.ts?token=abc\n\
        #EXTINF:10.0,\n\
        seg002.ts\n\
        #EXT-X-KEY:METHOD=AES-128,URI=\"keys/key2.key?t=1\"\n\
        #EXTINF:9.5,\n\
        seg003.ts\n\
        #EXT-X-ENDLIST\n";

    const MASTER_PLAYLIST: &str = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
        360p/index.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2400000,RESOLUTION=1280x720\n\
        720p/index.m3u8?sig=xyz\n";

    #[test]
    fn classifies_media_playlist_in_line_order() {
        let refs = ManifestClassifier::default().classify(MEDIA_PLAYLIST);

        assert_eq!(refs.segments, vec!["seg001.ts?token=abc", "seg002.ts", "seg003.ts"]);
        assert_eq!(refs.keys, vec!["key1.key", "keys/key2.key?t=1"]);
        assert!(refs.manifests.is_empty());
    }

    #[test]
    fn classifies_master_playlist() {
        let refs = ManifestClassifier::default().classify(MASTER_PLAYLIST);

        assert_eq!(refs.manifests, vec!["360p/index.m3u8", "720p/index.m3u8?sig=xyz"]);
        assert!(refs.segments.is_empty());
        assert!(refs.keys.is_empty());
    }

    #[test]
    fn line_matching_both_markers_is_reported_twice() {
        let refs = ManifestClassifier::default().classify("clip.ts.m3u8\nplain.ts\n");

        assert_eq!(refs.segments, vec!["clip.ts.m3u8", "plain.ts"]);
        assert_eq!(refs.manifests, vec!["clip.ts.m3u8"]);
    }

    #[test]
    fn crlf_and_blank_lines_are_tolerated() {
        let refs = ManifestClassifier::default().classify("#EXTM3U\r\n\r\nseg1.ts\r\nseg2.ts\r\n");
        assert_eq!(refs.segments, vec!["seg1.ts", "seg2.ts"]);
    }

    #[test]
    fn custom_markers() {
        let classifier = ManifestClassifier::new(".m4s", ".m3u8");
        let refs = classifier.classify("init.mp4\nchunk1.m4s\nchunk2.ts\n");

        assert_eq!(refs.segments, vec!["chunk1.m4s"]);
        assert!(refs.manifests.is_empty());
    }

    #[test]
    fn key_uri_requires_quoted_value() {
        assert_eq!(
            extract_key_uri(r#"#EXT-X-KEY:METHOD=AES-128,URI="k.bin""#),
            Some("k.bin")
        );
        assert_eq!(extract_key_uri("#EXT-X-KEY:METHOD=AES-128,URI=k.bin"), None);
        assert_eq!(extract_key_uri(r#"#EXT-X-KEY:URI="""#), None);
    }

    #[test]
    fn counts_match_marker_occurrences() {
        let text = (0..5)
            .map(|i| format!("#EXTINF:2,\nseg{i}.ts\n"))
            .chain((0..3).map(|i| format!("v{i}/index.m3u8\n")))
            .chain((0..2).map(|i| format!("#EXT-X-KEY:METHOD=AES-128,URI=\"k{i}\"\n")))
            .collect::<String>();

        let refs = ManifestClassifier::default().classify(&text);
        assert_eq!(refs.segments.len(), 5);
        assert_eq!(refs.manifests.len(), 3);
        assert_eq!(refs.keys.len(), 2);
    }
}
