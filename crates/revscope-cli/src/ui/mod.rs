//! # CLI UI Module
//!
//! Styling and formatting for the human-readable side of the CLI.
//!
//! JSON on stdout is the primary interface; everything here is used only
//! for `--json`-less maintenance output (`debug list`, `config show`,
//! `session list`) and for error messages on stderr.
//!
//! ## Module Structure
//!
//! - `color`: color mode selection and terminal width
//! - `style`: message prefixes and styled fragments
//! - `format`: bytes, relative time, truncation
//! - `table`: comfy-table renderers

pub mod color;
pub mod format;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use style::{MessageType, Style};
