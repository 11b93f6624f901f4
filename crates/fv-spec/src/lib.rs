//! fv-spec: parser for media range specifications.
//!
//! A media spec names one element or a range of elements within a stream.
//! Four grammars are recognised, tried in this order:
//!
//! | form        | examples                        | flags                |
//! |-------------|---------------------------------|----------------------|
//! | timestamp   | `42`, `42f`, `-10-10`           | `DEFAULT` / `FUZZY`  |
//! | index       | `2nd`, `2nd-3rd`, `first-last`  | `INDEX`              |
//! | real time   | `1.5s`, `-42.42s-24.24s`        | `REALTIME`           |
//! | duration    | `42+10d`, `42f-3d`              | `DURATION` (+`FUZZY`)|
//!
//! # Quick start
//!
//! ```
//! use fv_spec::{parse, MediaSpec, SpecFlags};
//!
//! assert_eq!(parse("2nd-3rd"), Some(MediaSpec::new(1, 2, SpecFlags::INDEX)));
//! assert_eq!(parse("100th-last"), Some(MediaSpec::new(99, -1, SpecFlags::INDEX)));
//! assert_eq!(parse("0th"), None);
//! ```

mod parser;
pub mod types;

pub use types::{MediaSpec, SpecFlags, SpecValue};

/// Parse a media spec into a normalized range.
///
/// Returns `None` for anything that is not a well-formed spec, including
/// forms that are syntactically close but meaningless (`0th`, `last-last`,
/// `42-43s`). Index bounds are zero-based with `-1` meaning the last
/// element; resolving that against a real element count is left to the
/// caller.
///
/// # Examples
///
/// ```
/// use fv_spec::{parse, MediaSpec, SpecFlags};
///
/// let spec = parse("-42.42s-24.24s").unwrap();
/// assert_eq!(spec, MediaSpec::new(-42.42, 24.24, SpecFlags::REALTIME));
/// assert_eq!(parse("last-last"), None);
/// ```
pub fn parse(spec: &str) -> Option<MediaSpec> {
    parser::parse(spec)
}
