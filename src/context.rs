//! The build context engine.
//!
//! A [`BuildContext`] coordinates exactly one build execution: callers
//! register the inputs they read, declare the outputs they produce, attach
//! attributes and diagnostics, and commit. Commit reconciles the current
//! build against the previous one — everything neither processed nor deleted
//! is carried over, stale outputs are removed from disk, and the resulting
//! snapshot is persisted for the next run.
//!
//! Handles ([`ResourceMetadata`], [`Resource`], [`Output`]) are plain values
//! carrying the id of the context that minted them and the state snapshot
//! they read through; operations validate the id on entry, so a handle can
//! never mutate a context it does not belong to.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::error::ContextError;
use crate::matcher::FileMatcher;
use crate::message::{log_message, render, Message, MessageSink, Severity};
use crate::state::{AttrValue, BuildState, ResourceHolder};
use crate::workspace::{Mode, OutputStream, ResourceStatus, Workspace};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies the context a handle was minted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which state snapshot a handle reads through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateTag {
    Old,
    New,
}

/// A registered resource that has not been selected for processing.
///
/// Metadata handles read through the *previous* build's snapshot, so a
/// builder can inspect the attributes and associations it recorded last time
/// before deciding whether to process the resource again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub(crate) context: ContextId,
    pub(crate) tag: StateTag,
    pub(crate) path: Utf8PathBuf,
}

impl ResourceMetadata {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// A resource selected for processing during this build. Attributes and
/// messages attached through it land in the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub(crate) context: ContextId,
    pub(crate) path: Utf8PathBuf,
}

impl Resource {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// An output declared and processed by this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub(crate) context: ContextId,
    pub(crate) path: Utf8PathBuf,
}

impl Output {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// What commit does with an old output nothing touched this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CarryOver {
    /// Keep it while its holder still classifies unmodified, delete otherwise.
    IfUptodate,
    /// Keep it unconditionally.
    Always,
    /// Delete it. An aggregate nobody asserted this build has no reason to
    /// remain.
    Never,
}

/// The engine coordinating one build execution.
///
/// Owns the current and the previous state snapshot plus the workspace that
/// does the actual I/O. Not thread-safe by design: one context belongs to one
/// execution, and the natural call order is register → process → associate →
/// commit.
pub struct BuildContext {
    id: ContextId,
    workspace: Arc<dyn Workspace>,
    state_file: Option<Utf8PathBuf>,
    state: BuildState,
    old_state: BuildState,
    /// Previous state is missing, unreadable, or the configuration changed.
    /// Every known resource then classifies as modified.
    escalated: bool,
    closed: bool,
    carry_over: CarryOver,
    /// Resources reported removed by the workspace or deleted through this
    /// context.
    deleted: BTreeSet<Utf8PathBuf>,
    /// Resources selected for processing, including declared and deleted
    /// outputs.
    processed: BTreeSet<Utf8PathBuf>,
}

impl BuildContext {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        state_file: Option<Utf8PathBuf>,
        configuration: BTreeMap<String, AttrValue>,
    ) -> Self {
        Self::with_carry_over(workspace, state_file, configuration, CarryOver::IfUptodate)
    }

    pub(crate) fn with_carry_over(
        workspace: Arc<dyn Workspace>,
        state_file: Option<Utf8PathBuf>,
        configuration: BTreeMap<String, AttrValue>,
        carry_over: CarryOver,
    ) -> Self {
        let state = BuildState::with_configuration(configuration);
        let old_state = state_file
            .as_deref()
            .and_then(|path| {
                let bytes = workspace.read_file(path).ok()?;
                BuildState::from_slice(path, &bytes)
            })
            .unwrap_or_default();

        let changed = configuration_changed(&state.configuration, &old_state.configuration);
        let (escalated, workspace) = match workspace.mode() {
            Mode::Escalated => (true, workspace),
            Mode::Suppressed => (false, workspace),
            Mode::Normal | Mode::Delta if changed => (true, workspace.escalate()),
            Mode::Normal | Mode::Delta => (false, workspace),
        };

        if escalated {
            if !changed {
                info!("workspace requested escalation, performing full build");
            } else if old_state.configuration.is_empty() {
                info!("previous build state is missing or unreadable, performing full build");
            } else {
                info!("build configuration change detected, performing full build");
            }
        } else {
            info!("performing incremental build");
        }

        BuildContext {
            id: ContextId::next(),
            workspace,
            state_file,
            state,
            old_state,
            escalated,
            closed: false,
            carry_over,
            deleted: BTreeSet::new(),
            processed: BTreeSet::new(),
        }
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    /// Register every file under `basedir` matching the include/exclude set
    /// as this build's input.
    ///
    /// Files the walk reports as removed land in the deleted set instead. In
    /// DELTA mode the walk only visits changed files, so every input
    /// remembered by the previous build that still matches is re-registered
    /// from its remembered `(mtime, length)` — all historically known inputs
    /// stay available for status queries.
    pub fn register_inputs(
        &mut self,
        basedir: &Utf8Path,
        includes: &[&str],
        excludes: &[&str],
    ) -> Result<Vec<ResourceMetadata>, ContextError> {
        self.assert_open()?;
        let basedir = normalize(basedir);
        let matcher = FileMatcher::new(&basedir, includes, excludes)?;

        let mut entries = Vec::new();
        self.workspace.walk(&basedir, &mut |entry| {
            if matcher.matches(entry.path) {
                entries.push((
                    entry.path.to_owned(),
                    entry.last_modified,
                    entry.length,
                    entry.status,
                ));
            }
        })?;

        let mut result = Vec::new();
        for (path, last_modified, length, status) in entries {
            match status {
                ResourceStatus::New | ResourceStatus::Modified => {
                    result.push(self.register_file(path, last_modified, length)?);
                }
                ResourceStatus::Removed => {
                    self.deleted.insert(path);
                }
                ResourceStatus::Unmodified => {
                    // the walk contract reports NEW (normal) or changes only
                    // (delta); an unmodified entry is covered by the back-fill
                    debug!("walk reported unmodified entry {path}, skipping");
                }
            }
        }

        // the walk cannot report files it no longer sees, and a delta walk
        // also omits unchanged ones; reconcile against the previous build
        let remembered: Vec<_> = self
            .old_state
            .resources
            .values()
            .map(|holder| match holder {
                ResourceHolder::File(file) => file.clone(),
            })
            .collect();
        let delta = self.workspace.mode() == Mode::Delta;
        for file in remembered {
            if self.state.resources.contains_key(&file.path)
                || self.deleted.contains(&file.path)
                || !matcher.matches(&file.path)
            {
                continue;
            }
            if !self.workspace.is_present(&file.path) {
                self.deleted.insert(file.path);
            } else if delta {
                result.push(self.register_file(file.path, file.last_modified, file.length)?);
            }
        }

        Ok(result)
    }

    /// Register a single input. The file must exist.
    pub fn register_input(&mut self, path: &Utf8Path) -> Result<ResourceMetadata, ContextError> {
        self.assert_open()?;
        let path = normalize(path);
        let Some((last_modified, length)) = self.workspace.stat(&path) else {
            return Err(ContextError::ResourceNotFound(path));
        };
        self.register_file(path, last_modified, length)
    }

    fn register_file(
        &mut self,
        path: Utf8PathBuf,
        last_modified: i64,
        length: u64,
    ) -> Result<ResourceMetadata, ContextError> {
        let holder = ResourceHolder::file(path.clone(), last_modified, length);
        match self.state.resources.get(&path) {
            None => {
                if holder.status(self.workspace.as_ref()) == ResourceStatus::Removed {
                    return Err(ContextError::ResourceNotFound(path));
                }
                // a file recreated after its removal was observed is no
                // longer deleted
                self.deleted.remove(&path);
                self.state.resources.insert(path.clone(), holder);
            }
            Some(existing) if *existing != holder => {
                // inputs are not replace-permitted
                return Err(ContextError::InconsistentResource(path));
            }
            Some(_) => {}
        }
        Ok(ResourceMetadata {
            context: self.id,
            tag: StateTag::Old,
            path,
        })
    }

    /// Status of a resource compared to the previous build.
    pub fn resource_status(&self, path: &Utf8Path) -> ResourceStatus {
        if self.deleted.contains(path) {
            return ResourceStatus::Removed;
        }
        let Some(holder) = self.old_state.resources.get(path) else {
            return ResourceStatus::New;
        };
        if self.escalated {
            return ResourceStatus::Modified;
        }
        holder.status(self.workspace.as_ref())
    }

    /// Handle-validated form of [`Self::resource_status`].
    pub fn status(&self, metadata: &ResourceMetadata) -> Result<ResourceStatus, ContextError> {
        self.assert_owned(metadata.context, &metadata.path)?;
        Ok(self.resource_status(&metadata.path))
    }

    /// Select a registered resource for processing.
    ///
    /// Clears every attribute, message and association already recorded for
    /// the id in the current state: the record of a processed resource
    /// reflects only what this build produced.
    pub fn process(&mut self, metadata: &ResourceMetadata) -> Result<Resource, ContextError> {
        self.assert_open()?;
        self.assert_owned(metadata.context, &metadata.path)?;
        if !self.state.resources.contains_key(&metadata.path) {
            return Err(ContextError::UnknownResource(metadata.path.clone()));
        }
        self.process_path(&metadata.path);
        Ok(Resource {
            context: self.id,
            path: metadata.path.clone(),
        })
    }

    fn process_path(&mut self, path: &Utf8Path) {
        self.processed.insert(path.to_owned());
        self.state.resource_attributes.remove(path);
        self.state.resource_messages.remove(path);
        self.state.resource_outputs.remove(path);
    }

    pub fn is_processed(&self, path: &Utf8Path) -> bool {
        self.processed.contains(path)
    }

    /// Whether anything observable changed since the previous build:
    /// escalation, a changed or removed resource, or an old output that is
    /// no longer up to date on disk.
    pub fn is_processing_required(&self) -> bool {
        self.escalated
            || self.deleted.iter().any(|path| !self.processed.contains(path))
            || self
                .state
                .resources
                .keys()
                .any(|path| self.resource_status(path) != ResourceStatus::Unmodified)
            || self
                .old_state
                .outputs
                .iter()
                .any(|path| !self.output_uptodate(path))
    }

    fn output_uptodate(&self, path: &Utf8Path) -> bool {
        match self.old_state.resources.get(path) {
            Some(holder) => holder.status(self.workspace.as_ref()) == ResourceStatus::Unmodified,
            None => false,
        }
    }

    /// Set an attribute in the current state and return the value the same
    /// key held in the previous build, if any.
    pub fn set_attribute(
        &mut self,
        resource: &Resource,
        key: &str,
        value: impl Into<AttrValue>,
    ) -> Result<Option<AttrValue>, ContextError> {
        self.assert_open()?;
        self.assert_owned(resource.context, &resource.path)?;
        self.state
            .resource_attributes
            .entry(resource.path.clone())
            .or_default()
            .insert(key.to_owned(), value.into());
        Ok(self
            .old_state
            .resource_attributes
            .get(&resource.path)
            .and_then(|attributes| attributes.get(key))
            .cloned())
    }

    /// Attribute recorded against the handle's state snapshot — the previous
    /// build for metadata handles.
    pub fn attribute(
        &self,
        metadata: &ResourceMetadata,
        key: &str,
    ) -> Result<Option<&AttrValue>, ContextError> {
        self.assert_owned(metadata.context, &metadata.path)?;
        Ok(self.attribute_in(metadata.tag, &metadata.path, key))
    }

    /// Attribute recorded against a processed resource during this build.
    pub fn resource_attribute(
        &self,
        resource: &Resource,
        key: &str,
    ) -> Result<Option<&AttrValue>, ContextError> {
        self.assert_owned(resource.context, &resource.path)?;
        Ok(self.attribute_in(StateTag::New, &resource.path, key))
    }

    fn attribute_in(&self, tag: StateTag, path: &Utf8Path, key: &str) -> Option<&AttrValue> {
        let state = match tag {
            StateTag::Old => &self.old_state,
            StateTag::New => &self.state,
        };
        state.resource_attributes.get(path)?.get(key)
    }

    /// Attach a diagnostic message. It is logged right away and persists with
    /// the resource until the next time the resource is processed.
    pub fn add_message(
        &mut self,
        resource: &Resource,
        line: u32,
        column: u32,
        text: impl Into<String>,
        severity: Severity,
        cause: Option<String>,
    ) -> Result<(), ContextError> {
        self.assert_open()?;
        self.assert_owned(resource.context, &resource.path)?;
        let message = Message {
            line,
            column,
            text: text.into(),
            severity,
            cause,
        };
        log_message(&resource.path, &message);
        self.state
            .resource_messages
            .entry(resource.path.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    /// Declare an output of this build.
    ///
    /// Outputs may be redeclared freely; the holder is replaced outright.
    /// The returned handle is the only way to open the output for writing.
    pub fn process_output(&mut self, path: &Utf8Path) -> Result<Output, ContextError> {
        self.assert_open()?;
        let path = normalize(path);
        let (last_modified, length) = self.workspace.stat(&path).unwrap_or((0, 0));
        // redeclaring a previously deleted output revives it
        self.deleted.remove(&path);
        self.state
            .resources
            .insert(path.clone(), ResourceHolder::file(path.clone(), last_modified, length));
        self.process_path(&path);
        self.state.outputs.insert(path.clone());
        Ok(Output {
            context: self.id,
            path,
        })
    }

    /// Open the output for writing. Parent directories are the workspace's
    /// concern.
    pub fn output_stream(&self, output: &Output) -> Result<Box<dyn OutputStream>, ContextError> {
        self.assert_owned(output.context, &output.path)?;
        Ok(self.workspace.open_output(&output.path)?)
    }

    /// Record that `output` was derived from `resource`.
    pub fn associate(&mut self, resource: &Resource, output: &Output) -> Result<(), ContextError> {
        self.assert_open()?;
        self.assert_owned(resource.context, &resource.path)?;
        self.assert_owned(output.context, &output.path)?;
        self.state
            .resource_outputs
            .entry(resource.path.clone())
            .or_default()
            .insert(output.path.clone());
        Ok(())
    }

    /// Outputs recorded against the resource in the handle's state snapshot.
    pub fn associated_outputs(
        &self,
        metadata: &ResourceMetadata,
    ) -> Result<Vec<ResourceMetadata>, ContextError> {
        self.assert_owned(metadata.context, &metadata.path)?;
        let state = match metadata.tag {
            StateTag::Old => &self.old_state,
            StateTag::New => &self.state,
        };
        Ok(state
            .resource_outputs
            .get(&metadata.path)
            .map(|outputs| {
                outputs
                    .iter()
                    .map(|path| ResourceMetadata {
                        context: self.id,
                        tag: metadata.tag,
                        path: path.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Delete an output file and purge it from the current state. The path
    /// must be an output known to this or the previous build.
    pub fn delete_output(&mut self, path: &Utf8Path) -> Result<(), ContextError> {
        self.assert_open()?;
        let path = normalize(path);
        self.delete_output_inner(&path)
    }

    fn delete_output_inner(&mut self, path: &Utf8Path) -> Result<(), ContextError> {
        if !self.old_state.outputs.contains(path) && !self.state.outputs.contains(path) {
            return Err(ContextError::NotAnOutput(path.to_owned()));
        }

        self.workspace.delete_file(path)?;

        self.deleted.insert(path.to_owned());
        self.processed.insert(path.to_owned());

        self.state.resources.remove(path);
        self.state.outputs.remove(path);
        self.state.resource_attributes.remove(path);
        self.state.resource_messages.remove(path);
        self.state.resource_outputs.remove(path);
        Ok(())
    }

    /// Mark this execution skipped. Legal only before anything was processed;
    /// the previous state file stays untouched and the following commit is a
    /// no-op, so the next build sees the previous build's state verbatim.
    pub fn mark_skip_execution(&mut self) -> Result<(), ContextError> {
        if !self.processed.is_empty() {
            return Err(ContextError::SkipAfterProcessing);
        }
        self.closed = true;
        Ok(())
    }

    /// Reconcile this build against the previous one and persist the result.
    ///
    /// Untouched resources are carried over with their metadata; untouched
    /// old outputs are kept or deleted per the carry-over policy; messages
    /// carried from previous builds are replayed through the log; the sink
    /// receives a `clear` per processed resource and one `record` with the
    /// full and build-new message maps.
    ///
    /// Idempotent: committing a closed context is a no-op.
    pub fn commit(&mut self, sink: Option<&mut dyn MessageSink>) -> Result<(), ContextError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let new_messages = self.state.resource_messages.clone();

        // processed outputs were registered before their contents were
        // written; refresh the holders so the persisted state matches disk
        let written: Vec<Utf8PathBuf> = self
            .state
            .outputs
            .iter()
            .filter(|path| self.processed.contains(*path))
            .cloned()
            .collect();
        for path in written {
            if let Some((last_modified, length)) = self.workspace.stat(&path) {
                self.state
                    .resources
                    .insert(path.clone(), ResourceHolder::file(path, last_modified, length));
            }
        }

        // deleted resources never reach the persisted snapshot
        for path in &self.deleted {
            self.state.resources.remove(path);
            self.state.outputs.remove(path);
            self.state.resource_attributes.remove(path);
            self.state.resource_messages.remove(path);
            self.state.resource_outputs.remove(path);
        }

        // carry over everything this build neither processed nor deleted
        let old_resources = self.old_state.resources.clone();
        for (path, old_holder) in old_resources {
            if self.processed.contains(&path) || self.deleted.contains(&path) {
                continue;
            }

            let registered = self.state.resources.get(&path).cloned();
            let holder = match registered {
                Some(holder) => holder,
                None if self.old_state.outputs.contains(&path) => {
                    let keep = match self.carry_over {
                        CarryOver::Always => true,
                        CarryOver::Never => false,
                        CarryOver::IfUptodate => self.output_uptodate(&path),
                    };
                    if !keep {
                        self.delete_output_inner(&path)?;
                        continue;
                    }
                    old_holder
                }
                // an old input this build never re-registered is gone from
                // its view; nothing to carry
                None => continue,
            };

            self.state.resources.insert(path.clone(), holder);
            if self.old_state.outputs.contains(&path) {
                self.state.outputs.insert(path.clone());
            }
            if let Some(messages) = self.old_state.resource_messages.get(&path) {
                if !messages.is_empty() {
                    self.state
                        .resource_messages
                        .insert(path.clone(), messages.clone());
                }
            }
            if let Some(attributes) = self.old_state.resource_attributes.get(&path) {
                if !attributes.is_empty() {
                    self.state
                        .resource_attributes
                        .insert(path.clone(), attributes.clone());
                }
            }
            if let Some(outputs) = self.old_state.resource_outputs.get(&path) {
                if !outputs.is_empty() {
                    self.state
                        .resource_outputs
                        .insert(path.clone(), outputs.clone());
                }
            }
        }

        // an output declared but never produced has no holder to remember
        let BuildState {
            outputs, resources, ..
        } = &mut self.state;
        outputs.retain(|path| resources.contains_key(path));

        if let Some(state_file) = self.state_file.clone() {
            let start = Instant::now();
            let mut stream = self.workspace.open_output(&state_file)?;
            self.state.store(&mut stream)?;
            stream.close()?;
            debug!("stored build state {state_file} in {:?}", start.elapsed());
        }

        // new messages were logged as they were reported; replay the carried
        // ones so the user still sees them
        let all_messages = self.state.resource_messages.clone();
        if all_messages.keys().ne(new_messages.keys()) {
            info!("replaying messages recorded by previous builds");
            for (path, messages) in &all_messages {
                if !new_messages.contains_key(path) {
                    for message in messages {
                        log_message(path, message);
                    }
                }
            }
        }

        match sink {
            Some(sink) => {
                for path in &self.processed {
                    sink.clear(path);
                }
                sink.record(&all_messages, &new_messages);
            }
            None => {
                let mut count = 0;
                let mut summary = String::new();
                for (path, messages) in &all_messages {
                    for message in messages {
                        if message.severity == Severity::Error {
                            count += 1;
                            summary.push_str(&render(path, message));
                            summary.push('\n');
                        }
                    }
                }
                if count > 0 {
                    return Err(ContextError::BuildFailure { count, summary });
                }
            }
        }

        Ok(())
    }

    /// Paths of every resource registered with the current build.
    pub fn registered_resources(&self) -> impl Iterator<Item = &Utf8Path> {
        self.state.resources.keys().map(Utf8PathBuf::as_path)
    }

    /// Paths of every output declared by the current build.
    pub fn registered_outputs(&self) -> impl Iterator<Item = &Utf8Path> {
        self.state.outputs.iter().map(Utf8PathBuf::as_path)
    }

    pub(crate) fn context_id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn assert_open(&self) -> Result<(), ContextError> {
        if self.closed {
            return Err(ContextError::Closed);
        }
        Ok(())
    }

    pub(crate) fn assert_owned(
        &self,
        context: ContextId,
        path: &Utf8Path,
    ) -> Result<(), ContextError> {
        if context != self.id {
            return Err(ContextError::ForeignHandle(path.to_owned()));
        }
        Ok(())
    }

    /// Declare an output id without processing it yet.
    pub(crate) fn declare_output(&mut self, path: &Utf8Path) {
        self.state.outputs.insert(path.to_owned());
    }

    /// Re-register an old output as-is so carry-over preserves it even under
    /// [`CarryOver::Never`].
    pub(crate) fn mark_uptodate_output(&mut self, path: &Utf8Path) {
        if let Some(holder) = self.old_state.resources.get(path) {
            self.state.resources.insert(path.to_owned(), holder.clone());
            self.state.outputs.insert(path.to_owned());
        }
    }

    /// Mark an already-registered resource processed without a handle.
    pub(crate) fn process_registered(&mut self, path: &Utf8Path) {
        self.process_path(path);
    }

    /// Record an input→output association by id.
    pub(crate) fn record_association(&mut self, resource: &Utf8Path, output: &Utf8Path) {
        self.state
            .resource_outputs
            .entry(resource.to_owned())
            .or_default()
            .insert(output.to_owned());
    }

    /// Inputs the previous build recorded as feeding `output`.
    pub(crate) fn previously_associated_inputs(&self, output: &Utf8Path) -> BTreeSet<Utf8PathBuf> {
        self.old_state
            .resource_outputs
            .iter()
            .filter(|(_, outputs)| outputs.contains(output))
            .map(|(input, _)| input.clone())
            .collect()
    }
}

/// Canonicalize, falling back to the plain absolute path when the file (or a
/// link along the way) cannot be resolved.
pub(crate) fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    if let Ok(canonical) = path.canonicalize_utf8() {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_owned();
    }
    match std::env::current_dir() {
        Ok(cwd) => match Utf8PathBuf::from_path_buf(cwd.join(path.as_std_path())) {
            Ok(absolute) => absolute,
            Err(_) => path.to_owned(),
        },
        Err(_) => path.to_owned(),
    }
}

fn configuration_changed(
    configuration: &BTreeMap<String, AttrValue>,
    old_configuration: &BTreeMap<String, AttrValue>,
) -> bool {
    if old_configuration.is_empty() {
        // no previous state
        return true;
    }

    let keys: BTreeSet<&String> = configuration
        .keys()
        .chain(old_configuration.keys())
        .collect();

    let mut changed = false;
    for key in keys {
        let value = configuration.get(key);
        let old_value = old_configuration.get(key);
        if value != old_value {
            changed = true;
            let kind = match (old_value, value) {
                (None, Some(_)) => "ADDED",
                (Some(_), None) => "REMOVED",
                _ => "CHANGED",
            };
            debug!("build configuration key {kind}: {key}");
        }
    }
    changed
}
