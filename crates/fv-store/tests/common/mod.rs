//! Shared harness for store integration tests.
//!
//! [`TestStore`] wraps a [`MediaStore`] backed by a fresh SQLite file in a
//! temporary directory, removed when the harness is dropped.

#![allow(dead_code)]

use std::ops::Deref;
use std::time::Duration;

use bytes::Bytes;
use fv_core::config::{PoolConfig, TtlConfig};
use fv_core::media::{CodecParameters, Format, Frame, MediaType, Packet, PacketFlags, Stream};
use fv_core::{MediaUrl, Rational};
use fv_store::{KeySpace, KvManager, MediaStore, Pool, Pooled};
use tempfile::TempDir;

pub const URL: &str = "file:///media/sample.mkv";

pub struct TestStore {
    pub store: MediaStore,
    _dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        Self::with_ttl(TtlConfig::default())
    }

    pub fn with_ttl(ttl: TtlConfig) -> Self {
        Self::build(ttl, PoolConfig::default())
    }

    pub fn with_pool(pool: PoolConfig) -> Self {
        Self::build(TtlConfig::default(), pool)
    }

    fn build(ttl: TtlConfig, pool: PoolConfig) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let manager = KvManager::new(dir.path().join("store.db"), Duration::from_secs(5));
        let store = MediaStore::new(Pool::new(manager, pool), KeySpace::new("test"), ttl);
        Self { store, _dir: dir }
    }

    /// A raw connection for poking at keys directly.
    pub async fn raw(&self) -> Pooled<KvManager> {
        self.store.pool().acquire().await.expect("failed to acquire")
    }
}

impl Deref for TestStore {
    type Target = MediaStore;

    fn deref(&self) -> &MediaStore {
        &self.store
    }
}

pub fn video_stream(index: u32) -> Stream {
    Stream {
        index,
        time_base: Some(Rational::new(1, 1000)),
        start_time: Some(0),
        avg_frame_rate: Some(Rational::new(25, 1)),
        codecpar: CodecParameters {
            codec_type: MediaType::Video,
            name: "h264".into(),
            width: 1920,
            height: 1080,
            profile: 100,
            ..CodecParameters::default()
        },
        ..Stream::default()
    }
}

pub fn audio_stream(index: u32) -> Stream {
    Stream {
        index,
        time_base: Some(Rational::new(1, 48_000)),
        metadata: [("language".to_string(), "eng".to_string())].into(),
        codecpar: CodecParameters {
            codec_type: MediaType::Audio,
            name: "aac".into(),
            sample_rate: 48_000,
            channels: 2,
            channel_layout: "stereo".into(),
            ..CodecParameters::default()
        },
        ..Stream::default()
    }
}

pub fn sample_format() -> Format {
    Format {
        url: Some(MediaUrl::from(URL)),
        name: "matroska,webm".into(),
        duration: Some(10_000_000),
        metadata: [("title".to_string(), "Sample".to_string())].into(),
        streams: vec![video_stream(0), audio_stream(1)],
        ..Format::default()
    }
}

pub fn packet(stream: u32, pts: i64, data: &'static [u8]) -> Packet {
    Packet {
        pts: Some(pts),
        dts: Some(pts),
        duration: 40,
        size: data.len() as i64,
        stream_index: stream,
        flags: if pts == 0 { PacketFlags::KEY } else { PacketFlags::empty() },
        data: Bytes::from_static(data),
        ..Packet::default()
    }
}

pub fn frame(pts: i64, planes: &[&'static [u8]]) -> Frame {
    Frame {
        pts: Some(pts),
        pkt_size: planes.iter().map(|p| p.len() as i64).sum(),
        width: 2,
        height: 2,
        format: "yuv420p".into(),
        key_frame: pts == 0,
        linesize: planes.iter().map(|p| p.len() as i32).collect(),
        data: planes.iter().map(|&p| Bytes::from_static(p)).collect(),
        ..Frame::default()
    }
}

/// Store one packet per `pts` on `stream`.
pub async fn store_packets(store: &MediaStore, stream: u32, pts: &[i64]) {
    for &p in pts {
        store
            .store_packet(URL, &packet(stream, p, b"payload"))
            .await
            .expect("store_packet failed");
    }
}

pub fn pts_of(media: &[fv_core::Media]) -> Vec<i64> {
    media.iter().filter_map(|m| m.pts()).collect()
}
