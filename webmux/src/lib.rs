//! webmux: on-demand, cache-aside audio remuxing for a MediaWiki media
//! store.
//!
//! The proxy sits in front of an S3-compatible bucket holding a wiki's
//! media library and materializes browser-playable WebM variants of Ogg
//! audio the first time they are requested:
//!
//! ```text
//! GET /wiki/transcoded/4/40/abc.oga/abc.oga.webm
//!     derivative stored?  -- yes -->  stream it back
//!     source stored?      -- no  -->  404
//!     build (shared by concurrent requests):
//!         download source -> ffmpeg -c copy -f webm -> upload derivative
//!     stream the fresh derivative
//! ```
//!
//! The modules map onto that pipeline: [`path`] translates derivative
//! paths to source keys, [`proxy`] is the HTTP surface, [`remux`] runs
//! single-flight builds, and [`store`] abstracts the object store.

pub mod config;
pub mod logging;
pub mod path;
pub mod proxy;
pub mod remux;
pub mod store;

/// Version of the webmux library and server.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
