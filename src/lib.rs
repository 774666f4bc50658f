pub mod app;
pub mod config;
pub mod convert;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod harness;
pub mod layout;
pub mod output;
pub mod probe;
pub mod zenodo;

pub use app::rat_fetch;
pub use convert::have_dcm2niix;
pub use error::RatError;
