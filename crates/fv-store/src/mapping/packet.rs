use fv_core::media::{Packet, PacketFlags};

use super::{FieldMap, FieldReader, FieldWriter};

/// Flatten packet metadata. The payload is stored under its own key.
pub fn packet_to_fields(packet: &Packet) -> FieldMap {
    let mut w = FieldWriter::new();
    w.opt_num("pts", packet.pts);
    w.opt_num("dts", packet.dts);
    w.num("duration", packet.duration);
    w.opt_num("pos", packet.pos);
    w.num("size", packet.size);
    w.always("stream_index", packet.stream_index);
    w.num("flags", packet.flags.bits());
    w.side_data(&packet.side_data);
    w.finish()
}

/// Rebuild packet metadata; `data` is left empty.
pub fn packet_from_fields(fields: &FieldMap) -> Packet {
    let r = FieldReader::new(fields);
    Packet {
        pts: r.opt_num("pts"),
        dts: r.opt_num("dts"),
        duration: r.num("duration"),
        pos: r.opt_num("pos"),
        size: r.num("size"),
        stream_index: r.num("stream_index"),
        flags: PacketFlags::from_bits(r.num("flags")),
        side_data: r.side_data(),
        data: Default::default(),
    }
}
