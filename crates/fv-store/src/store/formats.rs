use fv_core::media::{Format, Stream};
use fv_core::{Error, MediaUrl, Result};
use futures::future::FutureExt;

use super::{fan_out, KeyWrite, MediaStore, Task};
use crate::mapping::{format_from_fields, format_to_fields, stream_from_fields, stream_to_fields};

impl MediaStore {
    /// Store a format record and one record per stream.
    ///
    /// A format without a URL gets a generated `urn:uuid:` one, assigned back
    /// to `format`. With `overwrite` false an existing record is a
    /// [`Error::Conflict`] and nothing is written. Stream records left over
    /// from a previous version with more streams are removed.
    pub async fn store_format(&self, format: &mut Format, overwrite: bool) -> Result<Vec<KeyWrite>> {
        for (position, stream) in format.streams.iter().enumerate() {
            if stream.index as usize != position {
                return Err(Error::Validation(format!(
                    "stream at position {position} has index {}",
                    stream.index
                )));
            }
        }

        let url = format.ensure_url().to_string();
        let key = self.keys.format(&url);
        {
            let conn = self.conn().await?;
            let existing = conn.hgetall(&key).await?;
            if !existing.is_empty() && !overwrite {
                return Err(Error::Conflict(format!("format already stored: {url}")));
            }
            let (_, previous_streams) = format_from_fields(&existing);
            let stale: Vec<String> = (format.streams.len()..previous_streams)
                .map(|i| self.keys.stream(&url, i as u32))
                .collect();
            if !stale.is_empty() {
                conn.del(&stale).await?;
                tracing::debug!(url = %url, removed = stale.len(), "removed stale stream records");
            }
        }

        let mut tasks: Vec<(String, Task<'_, KeyWrite>)> = Vec::new();
        tasks.push((
            key.clone(),
            self.write_hash(key, format_to_fields(format)?, None).boxed(),
        ));
        for stream in &format.streams {
            let stream_key = self.keys.stream(&url, stream.index);
            let fields = stream_to_fields(stream)?;
            tasks.push((
                stream_key.clone(),
                self.write_hash(stream_key, fields, None).boxed(),
            ));
        }
        let mut writes = fan_out("store_format", tasks).await?;

        let stored_at = chrono::Utc::now().timestamp_millis() as f64;
        writes.push(
            self.index_entry(self.keys.content_index(), stored_at, &url)
                .await?,
        );

        tracing::info!(url = %url, streams = format.streams.len(), "stored format");
        Ok(writes)
    }

    /// Fetch a format and all of its declared streams.
    pub async fn retrieve_format(&self, url: &str) -> Result<Format> {
        let key = self.keys.format(url);
        let fields = self.conn().await?.hgetall(&key).await?;
        if fields.is_empty() {
            return Err(Error::not_found("format", key));
        }

        let (mut format, stream_count) = format_from_fields(&fields);
        format.url.get_or_insert_with(|| MediaUrl::from(url));

        let tasks = (0..stream_count)
            .map(|i| {
                let stream_key = self.keys.stream(url, i as u32);
                (stream_key.clone(), self.fetch_stream(stream_key).boxed())
            })
            .collect();
        format.streams = fan_out("retrieve_format", tasks).await?;
        Ok(format)
    }

    pub async fn retrieve_stream(&self, url: &str, index: u32) -> Result<Stream> {
        self.fetch_stream(self.keys.stream(url, index)).await
    }

    async fn fetch_stream(&self, key: String) -> Result<Stream> {
        let fields = self.conn().await?.hgetall(&key).await?;
        if fields.is_empty() {
            return Err(Error::not_found("stream", key));
        }
        Ok(stream_from_fields(&fields))
    }
}
