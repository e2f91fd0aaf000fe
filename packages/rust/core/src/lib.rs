//! Conversation transformation pipeline for chatsplit.
//!
//! Segments normalized Markdown into turns, groups them by range expression,
//! assembles linked pages with a header index, tags them by keyword, and
//! publishes the result to disk.

pub mod assembler;
pub mod index;
pub mod pipeline;
pub mod ranges;
pub mod segment;
pub mod tags;
pub mod writer;

pub use pipeline::{
    ConversionRequest, ConversionResult, OutputFile, ProgressReporter, SilentProgress, convert,
    convert_markdown,
};
