//! The minimal build context for all-or-nothing builders.
//!
//! A [`BasicContext`] tracks outputs without per-input bookkeeping: register
//! what you read, ask whether anything changed, and if so regenerate every
//! output. Outputs are presumed good once produced, so commit carries them
//! over unconditionally.

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::context::{BuildContext, CarryOver, Output, ResourceMetadata};
use crate::error::ContextError;
use crate::message::MessageSink;
use crate::state::AttrValue;
use crate::workspace::{OutputStream, Workspace};

pub struct BasicContext {
    context: BuildContext,
}

impl BasicContext {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        state_file: Option<Utf8PathBuf>,
        configuration: BTreeMap<String, AttrValue>,
    ) -> Self {
        Self {
            context: BuildContext::with_carry_over(
                workspace,
                state_file,
                configuration,
                CarryOver::Always,
            ),
        }
    }

    /// Register a single input. The file must exist.
    pub fn register_input(&mut self, path: &Utf8Path) -> Result<ResourceMetadata, ContextError> {
        self.context.register_input(path)
    }

    /// Whether anything changed since the previous build. Callers regenerate
    /// all of their outputs when this is true and skip the build otherwise.
    pub fn is_processing_required(&self) -> bool {
        self.context.is_processing_required()
    }

    pub fn process_output(&mut self, path: &Utf8Path) -> Result<Output, ContextError> {
        self.context.process_output(path)
    }

    pub fn output_stream(&self, output: &Output) -> Result<Box<dyn OutputStream>, ContextError> {
        self.context.output_stream(output)
    }

    pub fn is_escalated(&self) -> bool {
        self.context.is_escalated()
    }

    pub fn mark_skip_execution(&mut self) -> Result<(), ContextError> {
        self.context.mark_skip_execution()
    }

    /// See [`BuildContext::commit`].
    pub fn commit(&mut self, sink: Option<&mut dyn MessageSink>) -> Result<(), ContextError> {
        self.context.commit(sink)
    }
}
