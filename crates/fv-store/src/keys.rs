//! Layout of the key space.
//!
//! ```text
//! <prefix>:<url>                                  format hash
//! <prefix>:<url>:stream_<n>                       stream hash
//! <prefix>:<url>:stream_<n>:index                 sorted set, score = pts
//! <prefix>:<url>:stream_<n>:packet_<pts>          packet hash
//! <prefix>:<url>:stream_<n>:packet_<pts>:data     packet payload
//! <prefix>:<url>:stream_<n>:frame_<pts>           frame hash
//! <prefix>:<url>:stream_<n>:frame_<pts>:data_<i>  frame payload plane i
//! <prefix>:index                                  sorted set of format URLs
//! <prefix>:blob:<id>                              ephemeral blob
//! ```

/// Kind of a stored media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Packet,
    Frame,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Packet => "packet",
            MediaKind::Frame => "frame",
        }
    }
}

/// Builds every key under one namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn format(&self, url: &str) -> String {
        format!("{}:{url}", self.prefix)
    }

    pub fn stream(&self, url: &str, stream: u32) -> String {
        format!("{}:{url}:stream_{stream}", self.prefix)
    }

    pub fn index(&self, url: &str, stream: u32) -> String {
        format!("{}:index", self.stream(url, stream))
    }

    pub fn media(&self, url: &str, stream: u32, kind: MediaKind, pts: i64) -> String {
        format!("{}:{}_{pts}", self.stream(url, stream), kind.as_str())
    }

    pub fn packet(&self, url: &str, stream: u32, pts: i64) -> String {
        self.media(url, stream, MediaKind::Packet, pts)
    }

    pub fn packet_data(&self, url: &str, stream: u32, pts: i64) -> String {
        Self::payload_of(&self.packet(url, stream, pts))
    }

    pub fn frame(&self, url: &str, stream: u32, pts: i64) -> String {
        self.media(url, stream, MediaKind::Frame, pts)
    }

    pub fn frame_data(&self, url: &str, stream: u32, pts: i64, plane: usize) -> String {
        Self::plane_of(&self.frame(url, stream, pts), plane)
    }

    pub fn content_index(&self) -> String {
        format!("{}:index", self.prefix)
    }

    pub fn blob(&self, id: &str) -> String {
        format!("{}:blob:{id}", self.prefix)
    }

    /// Payload key of the packet stored at `packet_key`.
    pub fn payload_of(packet_key: &str) -> String {
        format!("{packet_key}:data")
    }

    /// Key of payload plane `plane` of the frame stored at `frame_key`.
    pub fn plane_of(frame_key: &str, plane: usize) -> String {
        format!("{frame_key}:data_{plane}")
    }

    /// Common prefix of every payload plane of the frame at `frame_key`.
    pub fn planes_prefix(frame_key: &str) -> String {
        format!("{frame_key}:data_")
    }

    /// Plane number of a key produced by [`KeySpace::plane_of`].
    pub fn plane_number(plane_key: &str) -> Option<usize> {
        plane_key.rsplit_once(":data_")?.1.parse().ok()
    }

    /// Kind of the media element an index member points at.
    pub fn media_kind(member: &str) -> Option<MediaKind> {
        let last = member.rsplit(':').next()?;
        if last.starts_with("packet_") {
            Some(MediaKind::Packet)
        } else if last.starts_with("frame_") {
            Some(MediaKind::Frame)
        } else {
            None
        }
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("framevault")
    }
}
