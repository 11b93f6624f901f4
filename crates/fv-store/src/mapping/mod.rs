//! Conversion between media records and flat field maps.
//!
//! Storage rules shared by every record kind:
//!
//! - absent, zero and empty values are left out of the map;
//! - fields with an explicit "unset" sentinel (profile, level and the text
//!   enums) are left out only when they hold that sentinel;
//! - rationals are split into `<name>_num` / `<name>_den` and rebuilt only
//!   when both halves are present;
//! - numbers are decimal text, binary data is raw bytes, maps and arrays are
//!   JSON text.
//!
//! Decoding never fails: fields that are missing or do not parse are left at
//! their defaults.

mod format;
mod frame;
mod packet;
mod stream;

pub use format::{format_from_fields, format_to_fields, NUMBER_OF_STREAMS};
pub use frame::{frame_from_fields, frame_to_fields};
pub use packet::{packet_from_fields, packet_to_fields};
pub use stream::{codecpar_from_fields, codecpar_to_fields, stream_from_fields, stream_to_fields};

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use bytes::Bytes;
use fv_core::media::{
    ChromaLocation, ColorPrimaries, ColorRange, ColorSpace, ColorTrc, Discard, FieldOrder,
    MediaType, PictureType,
};
use fv_core::{IntOrString, Rational, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A flat record as stored in a hash: field name to raw value.
pub type FieldMap = BTreeMap<String, Bytes>;

/// Prefix of fields holding named side-data blobs.
pub const SIDE_DATA_PREFIX: &str = "side_data_";

/// Read an ambiguous field as an integer when the whole text is one, as text
/// otherwise, or `default` when the field is missing or empty.
pub fn int_or_string(value: Option<&[u8]>, default: IntOrString) -> IntOrString {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return default;
    };
    let text = String::from_utf8_lossy(value);
    match text.parse::<i64>() {
        Ok(n) => IntOrString::Int(n),
        Err(_) => IntOrString::Text(text.into_owned()),
    }
}

/// Enumerations stored by name, omitted when at their sentinel.
pub(crate) trait Sentinel: Display + FromStr {
    fn is_sentinel(&self) -> bool;
}

macro_rules! sentinel_enums {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Sentinel for $ty {
                fn is_sentinel(&self) -> bool {
                    self.is_default()
                }
            }
        )*
    };
}

sentinel_enums!(
    MediaType,
    FieldOrder,
    ColorRange,
    ColorPrimaries,
    ColorTrc,
    ColorSpace,
    ChromaLocation,
    Discard,
    PictureType,
);

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Builds a [`FieldMap`] while applying the omission rules.
#[derive(Default)]
pub(crate) struct FieldWriter {
    fields: FieldMap,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> FieldMap {
        self.fields
    }

    fn put(&mut self, name: &str, value: impl Into<Bytes>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Write a number unconditionally.
    pub fn always<T: Display>(&mut self, name: &str, value: T) {
        self.put(name, value.to_string());
    }

    /// Write a number unless it is zero.
    pub fn num<T: Display + Default + PartialEq>(&mut self, name: &str, value: T) {
        if value != T::default() {
            self.always(name, value);
        }
    }

    pub fn opt_num<T: Display>(&mut self, name: &str, value: Option<T>) {
        if let Some(value) = value {
            self.always(name, value);
        }
    }

    pub fn sentinel_num(&mut self, name: &str, value: i32, sentinel: i32) {
        if value != sentinel {
            self.always(name, value);
        }
    }

    pub fn text(&mut self, name: &str, value: &str) {
        if !value.is_empty() {
            self.put(name, value.to_string());
        }
    }

    pub fn flag(&mut self, name: &str, value: bool) {
        if value {
            self.put(name, Bytes::from_static(b"1"));
        }
    }

    pub fn variant<E: Sentinel>(&mut self, name: &str, value: &E) {
        if !value.is_sentinel() {
            self.put(name, value.to_string());
        }
    }

    pub fn rational(&mut self, name: &str, value: Option<Rational>) {
        if let Some(r) = value {
            self.always(&format!("{name}_num"), r.num);
            self.always(&format!("{name}_den"), r.den);
        }
    }

    pub fn bytes(&mut self, name: &str, value: &Bytes) {
        if !value.is_empty() {
            self.put(name, value.clone());
        }
    }

    /// Write a map or array as JSON unless it is empty.
    pub fn json<T: Serialize>(&mut self, name: &str, value: &T, is_empty: bool) -> Result<()> {
        if !is_empty {
            self.put(name, serde_json::to_vec(value)?);
        }
        Ok(())
    }

    /// Copy every entry of `nested` under `prefix`.
    pub fn nest(&mut self, prefix: &str, nested: FieldMap) {
        for (name, value) in nested {
            self.fields.insert(format!("{prefix}{name}"), value);
        }
    }

    pub fn side_data(&mut self, side_data: &BTreeMap<String, Bytes>) {
        for (name, blob) in side_data {
            self.put(&format!("{SIDE_DATA_PREFIX}{name}"), blob.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Tolerant accessors over a stored [`FieldMap`].
pub(crate) struct FieldReader<'a> {
    fields: &'a FieldMap,
}

impl<'a> FieldReader<'a> {
    pub fn new(fields: &'a FieldMap) -> Self {
        Self { fields }
    }

    pub fn raw(&self, name: &str) -> Option<&'a Bytes> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> String {
        self.raw(name)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default()
    }

    /// Parse a number, or `None` when missing or malformed.
    pub fn opt_num<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.raw(name)?;
        let parsed = std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok());
        if parsed.is_none() {
            tracing::debug!(field = name, "skipping unparseable numeric field");
        }
        parsed
    }

    pub fn num<T: FromStr + Default>(&self, name: &str) -> T {
        self.opt_num(name).unwrap_or_default()
    }

    pub fn num_or<T: FromStr>(&self, name: &str, default: T) -> T {
        self.opt_num(name).unwrap_or(default)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.opt_num::<i64>(name).is_some_and(|v| v != 0)
    }

    pub fn variant<E: Sentinel + Default>(&self, name: &str) -> E {
        self.raw(name)
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn rational(&self, name: &str) -> Option<Rational> {
        let num = self.opt_num(&format!("{name}_num"))?;
        let den = self.opt_num(&format!("{name}_den"))?;
        Some(Rational::new(num, den))
    }

    pub fn bytes(&self, name: &str) -> Bytes {
        self.raw(name).cloned().unwrap_or_default()
    }

    pub fn json<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        self.raw(name)
            .and_then(|v| serde_json::from_slice(v).ok())
            .unwrap_or_default()
    }

    /// Entries under `prefix`, with the prefix removed.
    pub fn nested(&self, prefix: &str) -> FieldMap {
        self.fields
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(prefix)
                    .map(|rest| (rest.to_string(), value.clone()))
            })
            .collect()
    }

    pub fn side_data(&self) -> BTreeMap<String, Bytes> {
        self.nested(SIDE_DATA_PREFIX)
    }
}
