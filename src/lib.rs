//! proflow core library: builds a local program and drives external profilers
//! to produce a flamegraph or a ranked list of hot source lines.

mod annotate;
mod builder;
mod config;
mod error;
mod fsutil;
mod instrument;
mod pipeline;
mod process;
mod profile_cmd;
mod sampling;

pub use annotate::*;
pub use builder::*;
pub use config::*;
pub use error::*;
pub use fsutil::*;
pub use instrument::*;
pub use pipeline::*;
pub use process::*;
pub use profile_cmd::*;
pub use sampling::*;
