//! Framevault - key-value persistence and range queries for demultiplexed media
//!
//! This library crate exposes the binary's configuration loading for
//! integration testing. Storage lives in `fv-store`, range specs in `fv-spec`.

pub mod config;
