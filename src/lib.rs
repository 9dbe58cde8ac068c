#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod aggregator;
mod basic;
mod context;
mod error;
mod io;
mod matcher;
mod message;
mod state;
#[cfg(test)]
mod testing;
mod workspace;

pub use crate::aggregator::{AggregateInput, AggregateOutput, AggregatorContext, InputProcessor};
pub use crate::basic::BasicContext;
pub use crate::context::{BuildContext, Output, Resource, ResourceMetadata};
pub use crate::error::ContextError;
pub use crate::io::FilesystemWorkspace;
pub use crate::matcher::FileMatcher;
pub use crate::message::{Message, MessageMap, MessageSink, Severity};
pub use crate::state::{AttrValue, FileState, ResourceHolder};
pub use crate::workspace::{Mode, OutputStream, ResourceStatus, WalkEntry, Workspace};
