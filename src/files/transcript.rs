//! SRT transcript cleanup.

use async_trait::async_trait;

use super::TextSource;
use crate::error::Result;

/// Strip cue numbers, timing lines and blank lines; join the spoken text
/// with single spaces.
pub fn clean_srt(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.chars().all(|c| c.is_ascii_digit()) && !line.contains("-->")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads `.srt` files named by their source key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SrtTranscripts;

#[async_trait]
impl TextSource for SrtTranscripts {
    async fn extract(&self, source_key: &str) -> Result<String> {
        let bytes = tokio::fs::read(source_key).await?;
        Ok(clean_srt(&String::from_utf8_lossy(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\u{feff}1\n00:00:01,000 --> 00:00:03,500\nWelcome back.\n\n2\n00:00:03,600 --> 00:00:06,000\nToday: 3 patterns\nfor retries.\n";

    #[test]
    fn cleanup_keeps_only_spoken_text() {
        assert_eq!(clean_srt(SAMPLE), "Welcome back. Today: 3 patterns for retries.");
    }

    #[test]
    fn cleanup_of_timing_only_file_is_empty() {
        assert_eq!(clean_srt("1\n00:00:01,000 --> 00:00:02,000\n\n"), "");
    }

    #[tokio::test]
    async fn extract_reads_from_disk_and_fails_for_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.srt");
        std::fs::write(&path, SAMPLE).unwrap();

        let text = SrtTranscripts
            .extract(path.to_str().unwrap())
            .await
            .unwrap();
        assert!(text.starts_with("Welcome back."));

        let missing = dir.path().join("missing.srt");
        assert!(SrtTranscripts.extract(missing.to_str().unwrap()).await.is_err());
    }
}
