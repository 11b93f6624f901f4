use bytes::Bytes;
use fv_core::media::{Frame, Media, Packet};
use fv_core::{Error, Result};
use fv_spec::SpecFlags;
use futures::future::{join_all, FutureExt};

use super::query::{seconds_to_pts, select, MediaQuery};
use super::{fan_out, KeyWrite, MediaStore, Task};
use crate::keys::{KeySpace, MediaKind};
use crate::kv::{KvConnection, ScoredMember};
use crate::mapping::{frame_from_fields, frame_to_fields, packet_from_fields, packet_to_fields};

impl MediaStore {
    /// Store a packet's metadata and payload and index it by pts.
    ///
    /// A packet stored again at the same pts replaces the previous one,
    /// payload included.
    pub async fn store_packet(&self, url: &str, packet: &Packet) -> Result<Vec<KeyWrite>> {
        let pts = packet
            .pts
            .ok_or_else(|| Error::Validation("packet has no pts".into()))?;
        let stream = packet.stream_index;
        let key = self.keys.packet(url, stream, pts);
        let data_key = KeySpace::payload_of(&key);

        self.conn().await?.del(std::slice::from_ref(&data_key)).await?;

        let mut tasks: Vec<(String, Task<'_, KeyWrite>)> = vec![(
            key.clone(),
            self.write_hash(key.clone(), packet_to_fields(packet), self.ttl.metadata())
                .boxed(),
        )];
        if !packet.data.is_empty() {
            tasks.push((
                data_key.clone(),
                self.write_payload(data_key, packet.data.clone(), self.ttl.payload())
                    .boxed(),
            ));
        }
        let mut writes = fan_out("store_packet", tasks).await?;
        writes.push(
            self.index_entry(self.keys.index(url, stream), pts as f64, &key)
                .await?,
        );

        tracing::debug!(url, stream, pts, bytes = packet.data.len(), "stored packet");
        Ok(writes)
    }

    /// Store a frame's metadata and each of its payload planes and index it
    /// by pts.
    ///
    /// The stream comes from `stream_index` or, failing that, from the frame.
    pub async fn store_frame(
        &self,
        url: &str,
        frame: &Frame,
        stream_index: Option<u32>,
    ) -> Result<Vec<KeyWrite>> {
        let stream = stream_index.or(frame.stream_index).ok_or_else(|| {
            Error::Validation("frame has no stream index and none was given".into())
        })?;
        let pts = frame
            .pts
            .ok_or_else(|| Error::Validation("frame has no pts".into()))?;
        let key = self.keys.frame(url, stream, pts);

        let mut fields = frame_to_fields(frame)?;
        fields.insert("stream_index".into(), Bytes::from(stream.to_string()));

        {
            let conn = self.conn().await?;
            let stale = conn.scan_prefix(&KeySpace::planes_prefix(&key)).await?;
            if !stale.is_empty() {
                conn.del(&stale).await?;
            }
        }

        let mut tasks: Vec<(String, Task<'_, KeyWrite>)> = vec![(
            key.clone(),
            self.write_hash(key.clone(), fields, self.ttl.metadata())
                .boxed(),
        )];
        for (plane, data) in frame.data.iter().enumerate() {
            let plane_key = KeySpace::plane_of(&key, plane);
            tasks.push((
                plane_key.clone(),
                self.write_payload(plane_key, data.clone(), self.ttl.payload())
                    .boxed(),
            ));
        }
        let mut writes = fan_out("store_frame", tasks).await?;
        writes.push(
            self.index_entry(self.keys.index(url, stream), pts as f64, &key)
                .await?,
        );

        tracing::debug!(url, stream, pts, planes = frame.data.len(), "stored frame");
        Ok(writes)
    }

    /// Store a packet or a frame.
    pub async fn store_media(
        &self,
        url: &str,
        media: &Media,
        stream_index: Option<u32>,
    ) -> Result<Vec<KeyWrite>> {
        tracing::trace!(url, kind = media.kind(), "storing media");
        match media {
            Media::Packet(packet) => {
                if stream_index.is_some_and(|s| s != packet.stream_index) {
                    return Err(Error::Validation(format!(
                        "packet belongs to stream {}, not {}",
                        packet.stream_index,
                        stream_index.unwrap_or_default()
                    )));
                }
                self.store_packet(url, packet).await
            }
            Media::Frame(frame) => self.store_frame(url, frame, stream_index).await,
        }
    }

    /// Fetch the elements of a stream selected by `query`, in pts order.
    ///
    /// Index entries whose metadata has expired are skipped and removed from
    /// the index. A missing payload yields an element with an empty payload
    /// and a size of zero.
    pub async fn retrieve_media(
        &self,
        url: &str,
        stream: u32,
        query: &MediaQuery,
    ) -> Result<Vec<Media>> {
        let (start, end) = if query.flags.contains(SpecFlags::REALTIME) {
            let record = self.retrieve_stream(url, stream).await?;
            (
                seconds_to_pts(&record, query.start.as_f64())?,
                seconds_to_pts(&record, query.end.as_f64())?,
            )
        } else {
            (query.start.as_i64(), query.end.as_i64())
        };

        let index = self.keys.index(url, stream);
        let entries = {
            let conn = self.conn().await?;
            select(&conn, &index, query, start, end).await?
        };
        tracing::debug!(
            url,
            stream,
            flags = %query.flags,
            start,
            end,
            matched = entries.len(),
            "resolved media range"
        );

        let tasks = entries
            .into_iter()
            .map(|entry| {
                let member = entry.member.clone();
                (member, self.fetch_media(&index, entry, query.metadata_only).boxed())
            })
            .collect();
        let found = fan_out("retrieve_media", tasks).await?;
        Ok(found.into_iter().flatten().collect())
    }

    async fn fetch_media(
        &self,
        index: &str,
        entry: ScoredMember,
        metadata_only: bool,
    ) -> Result<Option<Media>> {
        let conn = self.conn().await?;
        let key = entry.member;
        let Some(kind) = KeySpace::media_kind(&key) else {
            tracing::warn!(index, member = %key, "index entry names no media element");
            return Ok(None);
        };

        let fields = conn.hgetall(&key).await?;
        if fields.is_empty() {
            tracing::warn!(index, member = %key, "dropping stale index entry");
            conn.zrem(index, &key).await?;
            return Ok(None);
        }

        let media = match kind {
            MediaKind::Packet => {
                let mut packet = packet_from_fields(&fields);
                if !metadata_only {
                    match conn.get(&KeySpace::payload_of(&key)).await? {
                        Some(data) => packet.data = data,
                        None => packet.size = 0,
                    }
                }
                Media::Packet(packet)
            }
            MediaKind::Frame => {
                let mut frame = frame_from_fields(&fields);
                if !metadata_only {
                    let expected = frame.linesize.len().max(frame.buf_sizes.len());
                    frame.data = planes(&conn, &key, expected).await?;
                    if frame.data.is_empty() {
                        frame.pkt_size = 0;
                    }
                }
                Media::Frame(frame)
            }
        };
        Ok(Some(media))
    }

    /// Remove the packet or frame stored at `pts`, its payloads and its index
    /// entry. Returns the number of keys and index entries removed.
    pub async fn delete_media(&self, url: &str, stream: u32, pts: i64) -> Result<usize> {
        let packet = self.keys.packet(url, stream, pts);
        let frame = self.keys.frame(url, stream, pts);
        let index = self.keys.index(url, stream);

        let conn = self.conn().await?;
        let mut keys = vec![
            packet.clone(),
            KeySpace::payload_of(&packet),
            frame.clone(),
        ];
        keys.extend(conn.scan_prefix(&KeySpace::planes_prefix(&frame)).await?);
        let mut removed = conn.del(&keys).await?;
        for member in [&packet, &frame] {
            if conn.zrem(&index, member).await? {
                removed += 1;
            }
        }

        if removed == 0 {
            return Err(Error::not_found(
                "media",
                format!("{url} stream {stream} pts {pts}"),
            ));
        }
        tracing::debug!(url, stream, pts, removed, "deleted media");
        Ok(removed)
    }
}

/// Payload planes of the frame at `key`, indexed by plane number.
///
/// The result covers every stored plane and at least `expected` positions.
/// A plane that is missing or has expired is left empty in its position.
/// Returns no planes at all when none of them could be read.
async fn planes(conn: &KvConnection, key: &str, expected: usize) -> Result<Vec<Bytes>> {
    let plane_keys: Vec<(usize, String)> = conn
        .scan_prefix(&KeySpace::planes_prefix(key))
        .await?
        .into_iter()
        .filter_map(|k| KeySpace::plane_number(&k).map(|n| (n, k)))
        .collect();
    let Some(highest) = plane_keys.iter().map(|(n, _)| *n).max() else {
        return Ok(Vec::new());
    };

    let fetched = join_all(plane_keys.iter().map(|(_, k)| conn.get(k))).await;
    let mut data = vec![Bytes::new(); expected.max(highest + 1)];
    let mut found = 0;
    for ((n, _), plane) in plane_keys.iter().zip(fetched) {
        // A plane can expire between the scan and the read.
        if let Some(bytes) = plane? {
            data[*n] = bytes;
            found += 1;
        }
    }
    if found == 0 {
        data.clear();
    }
    Ok(data)
}
