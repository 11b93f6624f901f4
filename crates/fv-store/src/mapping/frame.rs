use fv_core::media::Frame;
use fv_core::Result;

use super::{FieldMap, FieldReader, FieldWriter};

/// Flatten frame metadata. Payload planes are stored under their own keys.
pub fn frame_to_fields(frame: &Frame) -> Result<FieldMap> {
    let mut w = FieldWriter::new();
    w.opt_num("pts", frame.pts);
    w.opt_num("pkt_dts", frame.pkt_dts);
    w.opt_num("best_effort_timestamp", frame.best_effort_timestamp);
    w.num("pkt_duration", frame.pkt_duration);
    w.opt_num("pkt_pos", frame.pkt_pos);
    w.num("pkt_size", frame.pkt_size);
    w.opt_num("stream_index", frame.stream_index);
    w.num("width", frame.width);
    w.num("height", frame.height);
    w.text("format", &frame.format);
    w.flag("key_frame", frame.key_frame);
    w.variant("pict_type", &frame.pict_type);
    w.rational("sample_aspect_ratio", frame.sample_aspect_ratio);
    w.num("nb_samples", frame.nb_samples);
    w.num("sample_rate", frame.sample_rate);
    w.num("channels", frame.channels);
    w.text("channel_layout", &frame.channel_layout);
    w.num("coded_picture_number", frame.coded_picture_number);
    w.num("display_picture_number", frame.display_picture_number);
    w.num("repeat_pict", frame.repeat_pict);
    w.flag("interlaced_frame", frame.interlaced_frame);
    w.flag("top_field_first", frame.top_field_first);
    w.variant("color_range", &frame.color_range);
    w.variant("color_primaries", &frame.color_primaries);
    w.variant("color_trc", &frame.color_trc);
    w.variant("colorspace", &frame.colorspace);
    w.variant("chroma_location", &frame.chroma_location);
    w.json("linesize", &frame.linesize, frame.linesize.is_empty())?;
    w.json("buf_sizes", &frame.buf_sizes, frame.buf_sizes.is_empty())?;
    w.json("metadata", &frame.metadata, frame.metadata.is_empty())?;
    w.side_data(&frame.side_data);
    Ok(w.finish())
}

/// Rebuild frame metadata; `data` is left empty.
pub fn frame_from_fields(fields: &FieldMap) -> Frame {
    let r = FieldReader::new(fields);
    Frame {
        pts: r.opt_num("pts"),
        pkt_dts: r.opt_num("pkt_dts"),
        best_effort_timestamp: r.opt_num("best_effort_timestamp"),
        pkt_duration: r.num("pkt_duration"),
        pkt_pos: r.opt_num("pkt_pos"),
        pkt_size: r.num("pkt_size"),
        stream_index: r.opt_num("stream_index"),
        width: r.num("width"),
        height: r.num("height"),
        format: r.text("format"),
        key_frame: r.flag("key_frame"),
        pict_type: r.variant("pict_type"),
        sample_aspect_ratio: r.rational("sample_aspect_ratio"),
        nb_samples: r.num("nb_samples"),
        sample_rate: r.num("sample_rate"),
        channels: r.num("channels"),
        channel_layout: r.text("channel_layout"),
        coded_picture_number: r.num("coded_picture_number"),
        display_picture_number: r.num("display_picture_number"),
        repeat_pict: r.num("repeat_pict"),
        interlaced_frame: r.flag("interlaced_frame"),
        top_field_first: r.flag("top_field_first"),
        color_range: r.variant("color_range"),
        color_primaries: r.variant("color_primaries"),
        color_trc: r.variant("color_trc"),
        colorspace: r.variant("colorspace"),
        chroma_location: r.variant("chroma_location"),
        linesize: r.json("linesize"),
        buf_sizes: r.json("buf_sizes"),
        metadata: r.json("metadata"),
        side_data: r.side_data(),
        data: Vec::new(),
    }
}
