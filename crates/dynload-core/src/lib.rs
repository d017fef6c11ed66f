//! # dynload-core
//!
//! Safe, platform-independent building blocks for the `dynload` loader.
//!
//! Everything here works on plain strings and byte slices: composing library
//! filenames, matching demangled names against a requested symbol, and
//! reading symbol names out of ELF, Mach-O and PE images with the `object`
//! crate. No `unsafe` code is permitted at the crate level; the native loader
//! calls live in `dynload`.

#![deny(unsafe_code)]

pub mod config;
pub mod decorate;
pub mod image;
pub mod matching;

pub use config::{OffsetMode, offset_mode, set_offset_mode};
pub use decorate::{FILENAME_COMPONENTS, FilenameComponents, compose_path};
pub use image::{ImageError, ImageResult, symbol_names};
pub use matching::{MatchOutcome, matches_demangled};
