//! Wire messages of the `download.DownloadService` gRPC service
//!
//! Generated from `proto/download.proto` at build time, plus conversions from
//! the crate's own types.
#![allow(missing_docs)]

use crate::types::{Metadata as MediaMetadata, Progress};
use bytes::Bytes;

tonic::include_proto!("download");

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl From<MediaMetadata> for Metadata {
    fn from(metadata: MediaMetadata) -> Self {
        Self {
            title: metadata.title,
            duration: i32::try_from(metadata.duration_seconds).unwrap_or(i32::MAX),
            thumbnail_url: metadata.thumbnail_url,
            total_bytes: metadata.total_bytes.map(saturating_i64).unwrap_or(0),
        }
    }
}

impl From<Progress> for ProgressUpdate {
    fn from(progress: Progress) -> Self {
        Self {
            bytes_downloaded: saturating_i64(progress.bytes_downloaded),
            total_bytes: progress.total_bytes.map(saturating_i64).unwrap_or(0),
        }
    }
}

impl DownloadChunk {
    /// A chunk carrying progress
    pub fn progress(progress: Progress) -> Self {
        Self {
            payload: Some(download_chunk::Payload::Progress(progress.into())),
        }
    }

    /// A chunk carrying file bytes
    pub fn data(bytes: Bytes) -> Self {
        Self {
            payload: Some(download_chunk::Payload::Data(bytes)),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn metadata_maps_unknown_size_to_zero() {
        let wire = Metadata::from(MediaMetadata {
            title: "Clip".into(),
            duration_seconds: 12,
            thumbnail_url: String::new(),
            total_bytes: None,
        });
        assert_eq!(wire.duration, 12);
        assert_eq!(wire.total_bytes, 0);
    }

    #[test]
    fn progress_maps_unknown_total_to_zero() {
        let update = ProgressUpdate::from(Progress {
            bytes_downloaded: 10,
            total_bytes: None,
        });
        assert_eq!(update.bytes_downloaded, 10);
        assert_eq!(update.total_bytes, 0);
    }

    #[test]
    fn data_chunk_uses_field_two() {
        // field 2, wire type 2 (length-delimited) => tag byte 0x12
        let encoded = DownloadChunk::data(Bytes::from_static(b"abc")).encode_to_vec();
        assert_eq!(encoded, vec![0x12, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn progress_chunk_uses_field_one() {
        let encoded = DownloadChunk::progress(Progress {
            bytes_downloaded: 1,
            total_bytes: Some(2),
        })
        .encode_to_vec();
        // field 1 (message) containing field 1 = 1 and field 2 = 2
        assert_eq!(encoded, vec![0x0a, 4, 0x08, 1, 0x10, 2]);
    }
}
