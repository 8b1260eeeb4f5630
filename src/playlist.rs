//! Extended M3U reading and writing

pub mod parse;
pub mod write;

pub use parse::parse_playlist;
pub use write::{RenderOptions, render_playlist, write_atomically};

pub const HEADER: &str = "#EXTM3U";
pub const EXTINF_PREFIX: &str = "#EXTINF:";
pub const EXTVLCOPT_PREFIX: &str = "#EXTVLCOPT:";
