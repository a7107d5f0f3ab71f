//! rowscope: browse delimited text files of any size.
//!
//! The core never holds the whole file. [`index::FileIndex`] records where
//! every row starts, [`reader::read_rows`] decodes ranges on demand, and
//! [`dispatch::Dispatcher`] keeps a small [`window::WindowBuffer`] around the
//! viewport filled from a background worker.

pub mod config;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod index;
pub mod parse;
pub mod perf;
pub mod reader;
pub mod scroll;
pub mod viewer;
pub mod window;
