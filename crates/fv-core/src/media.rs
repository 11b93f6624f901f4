//! Media records: formats, streams, codec parameters, packets and frames.
//!
//! Records are plain data. Fields whose absence differs from zero (timestamps,
//! rationals) are `Option`; everything else defaults to zero, empty, or an
//! explicit sentinel. Enumerations render as lowercase text via `Display` and
//! parse back with `FromStr`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use crate::ids::MediaUrl;

/// Sentinel for an unset codec profile. Zero is a legitimate profile.
pub const PROFILE_UNKNOWN: i32 = -99;
/// Sentinel for an unset codec level. Zero is a legitimate level.
pub const LEVEL_UNKNOWN: i32 = -99;

// ---------------------------------------------------------------------------
// Rational / IntOrString
// ---------------------------------------------------------------------------

/// A rational number such as a time base or aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Value as a float, or `None` for a zero denominator.
    pub fn to_f64(self) -> Option<f64> {
        (self.den != 0).then(|| f64::from(self.num) / f64::from(self.den))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A field that holds either a number or free text (e.g. a codec tag that may
/// be a numeric tag or a fourcc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    Int(i64),
    Text(String),
}

impl fmt::Display for IntOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Text enums
// ---------------------------------------------------------------------------

/// Error returned when a stored enumeration name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Declare an enum whose first variant is the sentinel default, with
/// `Display`/`FromStr` over the given names.
macro_rules! text_enum {
    (
        $(#[doc = $doc:expr])*
        $name:ident { $default:ident => $default_text:literal $(, $variant:ident => $text:literal)* $(,)? }
    ) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub enum $name {
            #[default]
            #[serde(rename = $default_text)]
            $default,
            $(
                #[serde(rename = $text)]
                $variant,
            )*
        }

        impl $name {
            /// Whether this is the "unset" sentinel.
            pub fn is_default(&self) -> bool {
                matches!(self, Self::$default)
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    Self::$default => $default_text,
                    $(Self::$variant => $text,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $default_text => Ok(Self::$default),
                    $($text => Ok(Self::$variant),)*
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

text_enum! {
    /// Kind of elementary stream.
    MediaType {
        Unknown => "unknown",
        Video => "video",
        Audio => "audio",
        Data => "data",
        Subtitle => "subtitle",
        Attachment => "attachment",
    }
}

text_enum! {
    /// Field order of interlaced video.
    FieldOrder {
        Unknown => "unknown",
        Progressive => "progressive",
        TopTop => "tt",
        BottomBottom => "bb",
        TopBottom => "tb",
        BottomTop => "bt",
    }
}

text_enum! {
    /// Nominal signal range.
    ColorRange {
        Unspecified => "unknown",
        Tv => "tv",
        Pc => "pc",
    }
}

text_enum! {
    /// Chromaticity coordinates of the source primaries.
    ColorPrimaries {
        Unspecified => "unknown",
        Bt709 => "bt709",
        Bt470m => "bt470m",
        Bt470bg => "bt470bg",
        Smpte170m => "smpte170m",
        Smpte240m => "smpte240m",
        Film => "film",
        Bt2020 => "bt2020",
        Smpte428 => "smpte428",
        Smpte431 => "smpte431",
        Smpte432 => "smpte432",
        JedecP22 => "jedec-p22",
    }
}

text_enum! {
    /// Transfer characteristic.
    ColorTrc {
        Unspecified => "unknown",
        Bt709 => "bt709",
        Gamma22 => "gamma22",
        Gamma28 => "gamma28",
        Smpte170m => "smpte170m",
        Smpte240m => "smpte240m",
        Linear => "linear",
        Iec61966_2_1 => "iec61966-2-1",
        Bt2020_10 => "bt2020-10",
        Bt2020_12 => "bt2020-12",
        Smpte2084 => "smpte2084",
        AribStdB67 => "arib-std-b67",
    }
}

text_enum! {
    /// YUV colour space.
    ColorSpace {
        Unspecified => "unknown",
        Rgb => "gbr",
        Bt709 => "bt709",
        Fcc => "fcc",
        Bt470bg => "bt470bg",
        Smpte170m => "smpte170m",
        Smpte240m => "smpte240m",
        Ycgco => "ycgco",
        Bt2020Ncl => "bt2020nc",
        Bt2020Cl => "bt2020c",
        Ictcp => "ictcp",
    }
}

text_enum! {
    /// Location of chroma samples.
    ChromaLocation {
        Unspecified => "unspecified",
        Left => "left",
        Center => "center",
        TopLeft => "topleft",
        Top => "top",
        BottomLeft => "bottomleft",
        Bottom => "bottom",
    }
}

text_enum! {
    /// Which packets of a stream a demuxer may drop.
    Discard {
        Default => "default",
        None => "none",
        NonRef => "nonref",
        Bidir => "bidir",
        NonIntra => "nonintra",
        NonKey => "nonkey",
        All => "all",
    }
}

text_enum! {
    /// Picture type of a decoded video frame.
    PictureType {
        None => "none",
        I => "I",
        P => "P",
        B => "B",
        S => "S",
        Si => "SI",
        Sp => "SP",
        Bi => "BI",
    }
}

// ---------------------------------------------------------------------------
// PacketFlags
// ---------------------------------------------------------------------------

/// Bitset of packet properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketFlags(u32);

impl PacketFlags {
    pub const KEY: Self = Self(0x0001);
    pub const CORRUPT: Self = Self(0x0002);
    pub const DISCARD: Self = Self(0x0004);
    pub const TRUSTED: Self = Self(0x0008);
    pub const DISPOSABLE: Self = Self(0x0010);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Codec parameters / Stream / Format
// ---------------------------------------------------------------------------

fn profile_unknown() -> i32 {
    PROFILE_UNKNOWN
}

fn level_unknown() -> i32 {
    LEVEL_UNKNOWN
}

/// Properties of the encoded data in a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecParameters {
    pub codec_type: MediaType,
    pub codec_id: u32,
    pub name: String,
    pub codec_tag: Option<IntOrString>,
    pub extradata: Bytes,
    /// Pixel format for video, sample format for audio.
    pub format: String,
    pub bit_rate: i64,
    pub bits_per_coded_sample: i32,
    pub bits_per_raw_sample: i32,
    #[serde(default = "profile_unknown")]
    pub profile: i32,
    #[serde(default = "level_unknown")]
    pub level: i32,
    pub width: i32,
    pub height: i32,
    pub sample_aspect_ratio: Option<Rational>,
    pub field_order: FieldOrder,
    pub color_range: ColorRange,
    pub color_primaries: ColorPrimaries,
    pub color_trc: ColorTrc,
    pub color_space: ColorSpace,
    pub chroma_location: ChromaLocation,
    pub video_delay: i32,
    pub channel_layout: String,
    pub channels: i32,
    pub sample_rate: i32,
    pub block_align: i32,
    pub frame_size: i32,
    pub initial_padding: i32,
    pub trailing_padding: i32,
    pub seek_preroll: i32,
}

impl Default for CodecParameters {
    fn default() -> Self {
        Self {
            codec_type: MediaType::default(),
            codec_id: 0,
            name: String::new(),
            codec_tag: None,
            extradata: Bytes::new(),
            format: String::new(),
            bit_rate: 0,
            bits_per_coded_sample: 0,
            bits_per_raw_sample: 0,
            profile: PROFILE_UNKNOWN,
            level: LEVEL_UNKNOWN,
            width: 0,
            height: 0,
            sample_aspect_ratio: None,
            field_order: FieldOrder::default(),
            color_range: ColorRange::default(),
            color_primaries: ColorPrimaries::default(),
            color_trc: ColorTrc::default(),
            color_space: ColorSpace::default(),
            chroma_location: ChromaLocation::default(),
            video_delay: 0,
            channel_layout: String::new(),
            channels: 0,
            sample_rate: 0,
            block_align: 0,
            frame_size: 0,
            initial_padding: 0,
            trailing_padding: 0,
            seek_preroll: 0,
        }
    }
}

/// One elementary stream within a format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stream {
    pub index: u32,
    pub id: i32,
    pub time_base: Option<Rational>,
    pub start_time: Option<i64>,
    pub duration: Option<i64>,
    pub nb_frames: i64,
    pub discard: Discard,
    /// Names of the disposition flags that are set (e.g. "default").
    pub disposition: Vec<String>,
    pub sample_aspect_ratio: Option<Rational>,
    pub avg_frame_rate: Option<Rational>,
    pub r_frame_rate: Option<Rational>,
    pub metadata: BTreeMap<String, String>,
    pub codecpar: CodecParameters,
}

/// A demultiplexed container and its streams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Format {
    pub url: Option<MediaUrl>,
    pub name: String,
    pub long_name: String,
    pub mime_type: String,
    pub extensions: String,
    /// Names of the container flags that are set.
    pub flags: Vec<String>,
    pub start_time: Option<i64>,
    pub duration: Option<i64>,
    pub bit_rate: i64,
    pub packet_size: u32,
    pub max_delay: i32,
    pub metadata: BTreeMap<String, String>,
    /// Private demuxer options.
    pub priv_data: BTreeMap<String, serde_json::Value>,
    pub streams: Vec<Stream>,
}

impl Format {
    /// Return the URL, generating and assigning a URN first if there is none.
    pub fn ensure_url(&mut self) -> &MediaUrl {
        self.url.get_or_insert_with(MediaUrl::generate)
    }
}

// ---------------------------------------------------------------------------
// Packet / Frame
// ---------------------------------------------------------------------------

/// A unit of compressed media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Packet {
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub pos: Option<i64>,
    pub size: i64,
    pub stream_index: u32,
    pub flags: PacketFlags,
    pub side_data: BTreeMap<String, Bytes>,
    #[serde(skip)]
    pub data: Bytes,
}

/// A unit of decoded media, possibly spread over several planes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub pts: Option<i64>,
    pub pkt_dts: Option<i64>,
    pub best_effort_timestamp: Option<i64>,
    pub pkt_duration: i64,
    pub pkt_pos: Option<i64>,
    pub pkt_size: i64,
    pub stream_index: Option<u32>,
    pub width: i32,
    pub height: i32,
    /// Pixel format for video, sample format for audio.
    pub format: String,
    pub key_frame: bool,
    pub pict_type: PictureType,
    pub sample_aspect_ratio: Option<Rational>,
    pub nb_samples: i32,
    pub sample_rate: i32,
    pub channels: i32,
    pub channel_layout: String,
    pub coded_picture_number: i32,
    pub display_picture_number: i32,
    pub repeat_pict: i32,
    pub interlaced_frame: bool,
    pub top_field_first: bool,
    pub color_range: ColorRange,
    pub color_primaries: ColorPrimaries,
    pub color_trc: ColorTrc,
    pub colorspace: ColorSpace,
    pub chroma_location: ChromaLocation,
    pub linesize: Vec<i32>,
    pub buf_sizes: Vec<usize>,
    pub metadata: BTreeMap<String, String>,
    pub side_data: BTreeMap<String, Bytes>,
    #[serde(skip)]
    pub data: Vec<Bytes>,
}

/// Either kind of stored media element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Media {
    Packet(Packet),
    Frame(Frame),
}

impl Media {
    pub fn pts(&self) -> Option<i64> {
        match self {
            Media::Packet(p) => p.pts,
            Media::Frame(f) => f.pts,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Media::Packet(_) => "packet",
            Media::Frame(_) => "frame",
        }
    }

    /// Total payload length across all planes.
    pub fn payload_len(&self) -> usize {
        match self {
            Media::Packet(p) => p.data.len(),
            Media::Frame(f) => f.data.iter().map(Bytes::len).sum(),
        }
    }
}

impl From<Packet> for Media {
    fn from(p: Packet) -> Self {
        Media::Packet(p)
    }
}

impl From<Frame> for Media {
    fn from(f: Frame) -> Self {
        Media::Frame(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip_through_strings() {
        assert_eq!(MediaType::Video.to_string(), "video");
        assert_eq!("audio".parse::<MediaType>().unwrap(), MediaType::Audio);
        assert_eq!("tt".parse::<FieldOrder>().unwrap(), FieldOrder::TopTop);
        assert_eq!(PictureType::I.as_str(), "I");
        assert!("sideways".parse::<FieldOrder>().is_err());
    }

    #[test]
    fn text_enum_defaults_are_sentinels() {
        assert!(ColorRange::default().is_default());
        assert!(Discard::default().is_default());
        assert!(!Discard::All.is_default());
    }

    #[test]
    fn codec_parameters_default_to_unknown_profile_and_level() {
        let cp = CodecParameters::default();
        assert_eq!(cp.profile, PROFILE_UNKNOWN);
        assert_eq!(cp.level, LEVEL_UNKNOWN);

        let parsed: CodecParameters = serde_json::from_str(r#"{"name":"h264"}"#).unwrap();
        assert_eq!(parsed.profile, PROFILE_UNKNOWN);
        assert_eq!(parsed.name, "h264");
    }

    #[test]
    fn packet_flags_combine() {
        let flags = PacketFlags::KEY | PacketFlags::TRUSTED;
        assert!(flags.contains(PacketFlags::KEY));
        assert!(!flags.contains(PacketFlags::CORRUPT));
        assert_eq!(flags.bits(), 0x0009);
    }

    #[test]
    fn ensure_url_generates_once() {
        let mut format = Format::default();
        let first = format.ensure_url().clone();
        let second = format.ensure_url().clone();
        assert_eq!(first, second);
        assert!(first.is_generated());
    }

    #[test]
    fn rational_to_f64() {
        assert_eq!(Rational::new(1, 4).to_f64(), Some(0.25));
        assert_eq!(Rational::new(1, 0).to_f64(), None);
    }

    #[test]
    fn media_reports_payload_length() {
        let frame = Frame {
            data: vec![Bytes::from_static(b"abc"), Bytes::from_static(b"de")],
            ..Frame::default()
        };
        assert_eq!(Media::from(frame).payload_len(), 5);
    }
}
