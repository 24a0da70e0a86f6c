pub mod androidmk;
pub mod ccflags;
pub mod config;
pub mod emit;
pub mod error;
pub mod escape;
pub mod fileutils;
pub mod late_template;
pub mod module;
pub mod namemap;
pub mod template;
pub mod toolchain;
pub mod utils;

pub use error::{Error, Result};
