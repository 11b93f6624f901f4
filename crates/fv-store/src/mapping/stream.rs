use fv_core::media::{CodecParameters, Stream, LEVEL_UNKNOWN, PROFILE_UNKNOWN};
use fv_core::{IntOrString, Result};

use super::{int_or_string, FieldMap, FieldReader, FieldWriter};

/// Prefix of the codec parameter fields inside a stream record.
pub const CODECPAR_PREFIX: &str = "codecpar_";

pub fn codecpar_to_fields(cp: &CodecParameters) -> FieldMap {
    let mut w = FieldWriter::new();
    w.variant("codec_type", &cp.codec_type);
    w.num("codec_id", cp.codec_id);
    w.text("name", &cp.name);
    if let Some(tag) = &cp.codec_tag {
        w.text("codec_tag", &tag.to_string());
    }
    w.bytes("extradata", &cp.extradata);
    w.text("format", &cp.format);
    w.num("bit_rate", cp.bit_rate);
    w.num("bits_per_coded_sample", cp.bits_per_coded_sample);
    w.num("bits_per_raw_sample", cp.bits_per_raw_sample);
    w.sentinel_num("profile", cp.profile, PROFILE_UNKNOWN);
    w.sentinel_num("level", cp.level, LEVEL_UNKNOWN);
    w.num("width", cp.width);
    w.num("height", cp.height);
    w.rational("sample_aspect_ratio", cp.sample_aspect_ratio);
    w.variant("field_order", &cp.field_order);
    w.variant("color_range", &cp.color_range);
    w.variant("color_primaries", &cp.color_primaries);
    w.variant("color_trc", &cp.color_trc);
    w.variant("color_space", &cp.color_space);
    w.variant("chroma_location", &cp.chroma_location);
    w.num("video_delay", cp.video_delay);
    w.text("channel_layout", &cp.channel_layout);
    w.num("channels", cp.channels);
    w.num("sample_rate", cp.sample_rate);
    w.num("block_align", cp.block_align);
    w.num("frame_size", cp.frame_size);
    w.num("initial_padding", cp.initial_padding);
    w.num("trailing_padding", cp.trailing_padding);
    w.num("seek_preroll", cp.seek_preroll);
    w.finish()
}

pub fn codecpar_from_fields(fields: &FieldMap) -> CodecParameters {
    let r = FieldReader::new(fields);
    CodecParameters {
        codec_type: r.variant("codec_type"),
        codec_id: r.num("codec_id"),
        name: r.text("name"),
        codec_tag: r
            .raw("codec_tag")
            .map(|tag| int_or_string(Some(tag), IntOrString::Int(0))),
        extradata: r.bytes("extradata"),
        format: r.text("format"),
        bit_rate: r.num("bit_rate"),
        bits_per_coded_sample: r.num("bits_per_coded_sample"),
        bits_per_raw_sample: r.num("bits_per_raw_sample"),
        profile: r.num_or("profile", PROFILE_UNKNOWN),
        level: r.num_or("level", LEVEL_UNKNOWN),
        width: r.num("width"),
        height: r.num("height"),
        sample_aspect_ratio: r.rational("sample_aspect_ratio"),
        field_order: r.variant("field_order"),
        color_range: r.variant("color_range"),
        color_primaries: r.variant("color_primaries"),
        color_trc: r.variant("color_trc"),
        color_space: r.variant("color_space"),
        chroma_location: r.variant("chroma_location"),
        video_delay: r.num("video_delay"),
        channel_layout: r.text("channel_layout"),
        channels: r.num("channels"),
        sample_rate: r.num("sample_rate"),
        block_align: r.num("block_align"),
        frame_size: r.num("frame_size"),
        initial_padding: r.num("initial_padding"),
        trailing_padding: r.num("trailing_padding"),
        seek_preroll: r.num("seek_preroll"),
    }
}

/// Flatten a stream, embedding its codec parameters under `codecpar_`.
pub fn stream_to_fields(stream: &Stream) -> Result<FieldMap> {
    let mut w = FieldWriter::new();
    // The index is the stream's identity, so zero is written too.
    w.always("index", stream.index);
    w.num("id", stream.id);
    w.rational("time_base", stream.time_base);
    w.opt_num("start_time", stream.start_time);
    w.opt_num("duration", stream.duration);
    w.num("nb_frames", stream.nb_frames);
    w.variant("discard", &stream.discard);
    w.json(
        "disposition",
        &stream.disposition,
        stream.disposition.is_empty(),
    )?;
    w.rational("sample_aspect_ratio", stream.sample_aspect_ratio);
    w.rational("avg_frame_rate", stream.avg_frame_rate);
    w.rational("r_frame_rate", stream.r_frame_rate);
    w.json("metadata", &stream.metadata, stream.metadata.is_empty())?;
    w.nest(CODECPAR_PREFIX, codecpar_to_fields(&stream.codecpar));
    Ok(w.finish())
}

pub fn stream_from_fields(fields: &FieldMap) -> Stream {
    let r = FieldReader::new(fields);
    Stream {
        index: r.num("index"),
        id: r.num("id"),
        time_base: r.rational("time_base"),
        start_time: r.opt_num("start_time"),
        duration: r.opt_num("duration"),
        nb_frames: r.num("nb_frames"),
        discard: r.variant("discard"),
        disposition: r.json("disposition"),
        sample_aspect_ratio: r.rational("sample_aspect_ratio"),
        avg_frame_rate: r.rational("avg_frame_rate"),
        r_frame_rate: r.rational("r_frame_rate"),
        metadata: r.json("metadata"),
        codecpar: codecpar_from_fields(&r.nested(CODECPAR_PREFIX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fv_core::media::{ColorRange, Discard, FieldOrder, MediaType};
    use fv_core::Rational;

    fn video_stream() -> Stream {
        Stream {
            index: 0,
            id: 0x100,
            time_base: Some(Rational::new(1, 90_000)),
            start_time: Some(0),
            duration: Some(5_400_000),
            nb_frames: 1500,
            discard: Discard::default(),
            disposition: vec!["default".into()],
            avg_frame_rate: Some(Rational::new(25, 1)),
            r_frame_rate: Some(Rational::new(25, 1)),
            metadata: [("language".to_string(), "eng".to_string())].into(),
            codecpar: CodecParameters {
                codec_type: MediaType::Video,
                codec_id: 27,
                name: "h264".into(),
                codec_tag: Some(IntOrString::Text("avc1".into())),
                extradata: Bytes::from_static(&[0x01, 0x64, 0x00, 0x1f]),
                format: "yuv420p".into(),
                profile: 100,
                level: 31,
                width: 1280,
                height: 720,
                sample_aspect_ratio: Some(Rational::new(1, 1)),
                field_order: FieldOrder::Progressive,
                color_range: ColorRange::Tv,
                ..CodecParameters::default()
            },
            ..Stream::default()
        }
    }

    #[test]
    fn stream_round_trip() {
        let stream = video_stream();
        let fields = stream_to_fields(&stream).unwrap();
        assert_eq!(stream_from_fields(&fields), stream);
    }

    #[test]
    fn stream_fields_are_flat() {
        let fields = stream_to_fields(&video_stream()).unwrap();
        assert_eq!(fields["index"], Bytes::from_static(b"0"));
        assert_eq!(fields["time_base_num"], Bytes::from_static(b"1"));
        assert_eq!(fields["time_base_den"], Bytes::from_static(b"90000"));
        assert_eq!(fields["codecpar_width"], Bytes::from_static(b"1280"));
        assert_eq!(fields["codecpar_codec_tag"], Bytes::from_static(b"avc1"));
        assert_eq!(
            fields["codecpar_extradata"],
            Bytes::from_static(&[0x01, 0x64, 0x00, 0x1f])
        );
        assert_eq!(fields["disposition"], Bytes::from_static(br#"["default"]"#));
        assert!(!fields.contains_key("discard"));
        assert!(!fields.contains_key("codecpar_sample_rate"));
    }

    #[test]
    fn unset_profile_and_level_are_omitted() {
        let cp = CodecParameters::default();
        let fields = codecpar_to_fields(&cp);
        assert!(fields.is_empty());
        assert_eq!(codecpar_from_fields(&fields), cp);
    }

    #[test]
    fn zero_profile_survives() {
        let cp = CodecParameters {
            profile: 0,
            level: 0,
            ..CodecParameters::default()
        };
        let fields = codecpar_to_fields(&cp);
        assert_eq!(fields.len(), 2);
        assert_eq!(codecpar_from_fields(&fields), cp);
    }

    #[test]
    fn numeric_codec_tags_decode_as_integers() {
        let cp = CodecParameters {
            codec_tag: Some(IntOrString::Int(0x3163_7661)),
            ..CodecParameters::default()
        };
        let decoded = codecpar_from_fields(&codecpar_to_fields(&cp));
        assert_eq!(decoded.codec_tag, Some(IntOrString::Int(0x3163_7661)));
    }

    #[test]
    fn decoding_is_idempotent() {
        let fields = stream_to_fields(&video_stream()).unwrap();
        assert_eq!(stream_from_fields(&fields), stream_from_fields(&fields));
    }
}
