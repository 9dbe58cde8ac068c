//! Many-inputs-to-one-output aggregation.
//!
//! An [`AggregatorContext`] serves builders that fold whole directory trees
//! into single artifacts (an index, a bundle, a merged catalog) under one
//! uniform contract: declare the output, associate the inputs that feed it,
//! then ask [`AggregatorContext::create_if_necessary`] to regenerate it only
//! when something actually changed. Aggregates are never carried over blindly
//! — an output nobody asserted this build is deleted at commit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::context::{normalize, BuildContext, CarryOver, ContextId, Output, Resource};
use crate::error::ContextError;
use crate::message::MessageSink;
use crate::state::AttrValue;
use crate::workspace::{OutputStream, ResourceStatus, Workspace};

/// Callback applied to every changed input as it is registered. May attach
/// attributes or messages through the engine.
pub type InputProcessor<'a> =
    &'a mut dyn FnMut(&mut BuildContext, &Resource) -> anyhow::Result<()>;

/// Handle to a declared aggregate output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutput {
    context: ContextId,
    path: Utf8PathBuf,
}

impl AggregateOutput {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// One input feeding an aggregate output, bound to the base directory it was
/// registered under. Creators use the pair to compute the input's relative
/// location inside the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateInput {
    context: ContextId,
    basedir: Utf8PathBuf,
    path: Utf8PathBuf,
}

impl AggregateInput {
    pub fn basedir(&self) -> &Utf8Path {
        &self.basedir
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The input's path relative to the base directory it was registered
    /// under, when it lies beneath it.
    pub fn relative_path(&self) -> Option<&Utf8Path> {
        self.path.strip_prefix(&self.basedir).ok()
    }
}

/// Build context folding N inputs into one output.
pub struct AggregatorContext {
    context: BuildContext,
    /// Base directory each input was registered under.
    input_basedir: HashMap<Utf8PathBuf, Utf8PathBuf>,
    /// Inputs declared to feed each output during this build, in declaration
    /// order.
    output_inputs: HashMap<Utf8PathBuf, Vec<Utf8PathBuf>>,
}

impl AggregatorContext {
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
                CarryOver::Never,
            ),
            input_basedir: HashMap::new(),
            output_inputs: HashMap::new(),
        }
    }

    /// Declare an aggregate output. No inputs are associated yet.
    pub fn register_output(&mut self, path: &Utf8Path) -> Result<AggregateOutput, ContextError> {
        self.context.assert_open()?;
        let path = normalize(path);
        self.context.declare_output(&path);
        Ok(AggregateOutput {
            context: self.context.context_id(),
            path,
        })
    }

    /// Register every file under `basedir` matching the include/exclude set
    /// as an input of `output`.
    ///
    /// Changed inputs are processed on the spot and handed to the supplied
    /// processors in order; unchanged ones are merely declared, keeping them
    /// part of the staleness computation.
    pub fn associate_inputs(
        &mut self,
        output: &AggregateOutput,
        basedir: &Utf8Path,
        includes: &[&str],
        excludes: &[&str],
        processors: &mut [InputProcessor<'_>],
    ) -> Result<(), ContextError> {
        self.context.assert_owned(output.context, &output.path)?;
        let basedir = normalize(basedir);

        for metadata in self.context.register_inputs(&basedir, includes, excludes)? {
            self.input_basedir
                .insert(metadata.path().to_owned(), basedir.clone());

            if self.context.status(&metadata)? != ResourceStatus::Unmodified {
                let resource = self.context.process(&metadata)?;
                for processor in processors.iter_mut() {
                    processor(&mut self.context, &resource).map_err(ContextError::Callback)?;
                }
            }

            let inputs = self.output_inputs.entry(output.path.clone()).or_default();
            if !inputs.iter().any(|input| input == metadata.path()) {
                inputs.push(metadata.path().to_owned());
            }
        }
        Ok(())
    }

    /// Regenerate `output` when it or its input set changed; returns whether
    /// the creator ran.
    ///
    /// Regeneration is required when the output itself is not unmodified,
    /// when any declared input changed, or when the declared input set
    /// differs from the set the previous build recorded (a vanished file
    /// leaves no status to inspect, but it leaves a dangling association).
    /// An output found up to date is preserved by carry-over as-is.
    pub fn create_if_necessary<F>(
        &mut self,
        output: &AggregateOutput,
        creator: F,
    ) -> Result<bool, ContextError>
    where
        F: FnOnce(&mut BuildContext, &Output, &[AggregateInput]) -> anyhow::Result<()>,
    {
        self.context.assert_owned(output.context, &output.path)?;
        let declared = self
            .output_inputs
            .get(&output.path)
            .cloned()
            .unwrap_or_default();

        let mut required =
            self.context.resource_status(&output.path) != ResourceStatus::Unmodified;
        if !required {
            required = declared
                .iter()
                .any(|input| self.context.resource_status(input) != ResourceStatus::Unmodified);
        }
        if !required {
            let previous = self.context.previously_associated_inputs(&output.path);
            let current: BTreeSet<Utf8PathBuf> = declared.iter().cloned().collect();
            required = previous != current;
        }

        if !required {
            self.context.mark_uptodate_output(&output.path);
            return Ok(false);
        }

        let handle = self.context.process_output(&output.path)?;
        let mut inputs = Vec::with_capacity(declared.len());
        for input in &declared {
            if !self.context.is_processed(input) {
                self.context.process_registered(input);
            }
            self.context.record_association(input, &output.path);
            inputs.push(AggregateInput {
                context: self.context.context_id(),
                basedir: self
                    .input_basedir
                    .get(input)
                    .cloned()
                    .unwrap_or_default(),
                path: input.clone(),
            });
        }

        creator(&mut self.context, &handle, &inputs).map_err(ContextError::Callback)?;
        Ok(true)
    }

    pub fn is_escalated(&self) -> bool {
        self.context.is_escalated()
    }

    pub fn is_processing_required(&self) -> bool {
        self.context.is_processing_required()
    }

    pub fn output_stream(&self, output: &Output) -> Result<Box<dyn OutputStream>, ContextError> {
        self.context.output_stream(output)
    }

    pub fn mark_skip_execution(&mut self) -> Result<(), ContextError> {
        self.context.mark_skip_execution()
    }

    /// See [`BuildContext::commit`].
    pub fn commit(&mut self, sink: Option<&mut dyn MessageSink>) -> Result<(), ContextError> {
        self.context.commit(sink)
    }
}
