use fv_core::media::Format;
use fv_core::{MediaUrl, Result};

use super::{FieldMap, FieldReader, FieldWriter};

/// Field recording how many stream records belong to a format.
pub const NUMBER_OF_STREAMS: &str = "number_of_streams";

/// Flatten a format record. Streams are stored separately; only their count
/// is kept here.
pub fn format_to_fields(format: &Format) -> Result<FieldMap> {
    let mut w = FieldWriter::new();
    if let Some(url) = &format.url {
        w.text("url", url.as_str());
    }
    w.text("name", &format.name);
    w.text("long_name", &format.long_name);
    w.text("mime_type", &format.mime_type);
    w.text("extensions", &format.extensions);
    w.json("flags", &format.flags, format.flags.is_empty())?;
    w.opt_num("start_time", format.start_time);
    w.opt_num("duration", format.duration);
    w.num("bit_rate", format.bit_rate);
    w.num("packet_size", format.packet_size);
    w.num("max_delay", format.max_delay);
    w.json("metadata", &format.metadata, format.metadata.is_empty())?;
    w.json("priv_data", &format.priv_data, format.priv_data.is_empty())?;
    w.num(NUMBER_OF_STREAMS, format.streams.len());
    Ok(w.finish())
}

/// Rebuild a format record without its streams, returning the declared
/// stream count alongside it.
pub fn format_from_fields(fields: &FieldMap) -> (Format, usize) {
    let r = FieldReader::new(fields);
    let url = r.text("url");
    let format = Format {
        url: (!url.is_empty()).then(|| MediaUrl::from(url)),
        name: r.text("name"),
        long_name: r.text("long_name"),
        mime_type: r.text("mime_type"),
        extensions: r.text("extensions"),
        flags: r.json("flags"),
        start_time: r.opt_num("start_time"),
        duration: r.opt_num("duration"),
        bit_rate: r.num("bit_rate"),
        packet_size: r.num("packet_size"),
        max_delay: r.num("max_delay"),
        metadata: r.json("metadata"),
        priv_data: r.json("priv_data"),
        streams: Vec::new(),
    };
    (format, r.num(NUMBER_OF_STREAMS))
}
