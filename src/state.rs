//! The persisted snapshot of one build.
//!
//! Everything the engine remembers between invocations lives in a single
//! [`BuildState`] record: the configuration fingerprint, the resources seen,
//! which of them were outputs, and the attributes, messages and associations
//! recorded against them. The record is stored as versioned JSON; anything
//! that fails to read back — missing file, parse error, version mismatch —
//! degrades to "no previous state" and the next build runs in full.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::Message;
use crate::workspace::{ResourceStatus, Workspace};

/// Bumped whenever the serialized layout changes incompatibly.
const STATE_VERSION: u32 = 1;

/// Attribute values builders may attach to resources.
///
/// The grammar is deliberately closed: strings, integers, booleans, byte
/// strings, and lists and maps thereof. Anything else is unrepresentable, so
/// every attribute that can be set can also be persisted and read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Bytes(Vec<u8>),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttrValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttrValue::Bytes(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Integer(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Boolean(value)
    }
}

/// Remembered file information: change detection compares these two numbers
/// against a fresh stat, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub path: Utf8PathBuf,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub length: u64,
}

/// Everything the engine remembers about a single resource.
///
/// Tagged by kind so resources that are not plain files (registry entries,
/// URLs) can be added later without touching the persisted layout of the
/// existing variant. Two holders are equal iff all their fields are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceHolder {
    File(FileState),
}

impl ResourceHolder {
    pub fn file(path: Utf8PathBuf, last_modified: i64, length: u64) -> Self {
        ResourceHolder::File(FileState {
            path,
            last_modified,
            length,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        match self {
            ResourceHolder::File(file) => &file.path,
        }
    }

    /// Classify the remembered resource against the workspace's current view.
    pub(crate) fn status(&self, workspace: &dyn Workspace) -> ResourceStatus {
        match self {
            ResourceHolder::File(file) => {
                workspace.resource_status(&file.path, file.last_modified, file.length)
            }
        }
    }
}

/// The persisted snapshot of one build. The current and the previous build
/// share this shape; only commit ever writes it out.
///
/// Collections are ordered so the serialized form is deterministic: a no-op
/// rebuild rewrites the state file byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildState {
    version: u32,
    pub(crate) configuration: BTreeMap<String, AttrValue>,
    pub(crate) resources: BTreeMap<Utf8PathBuf, ResourceHolder>,
    pub(crate) outputs: BTreeSet<Utf8PathBuf>,
    pub(crate) resource_attributes: BTreeMap<Utf8PathBuf, BTreeMap<String, AttrValue>>,
    pub(crate) resource_messages: BTreeMap<Utf8PathBuf, Vec<Message>>,
    pub(crate) resource_outputs: BTreeMap<Utf8PathBuf, BTreeSet<Utf8PathBuf>>,
}

impl BuildState {
    pub(crate) fn with_configuration(configuration: BTreeMap<String, AttrValue>) -> Self {
        BuildState {
            version: STATE_VERSION,
            configuration,
            ..Default::default()
        }
    }

    /// Recover a previous snapshot from its serialized form. Any failure
    /// degrades to `None`, which the engine treats as "no previous state".
    pub(crate) fn from_slice(path: &Utf8Path, bytes: &[u8]) -> Option<BuildState> {
        match serde_json::from_slice::<BuildState>(bytes) {
            Ok(state) if state.version == STATE_VERSION => Some(state),
            Ok(state) => {
                debug!(
                    "ignoring build state {path} with incompatible version {}",
                    state.version
                );
                None
            }
            Err(err) => {
                debug!("ignoring unreadable build state {path}: {err}");
                None
            }
        }
    }

    pub(crate) fn store<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_value_round_trip() {
        let value = AttrValue::Map(BTreeMap::from([
            ("name".to_string(), AttrValue::from("ab")),
            ("count".to_string(), AttrValue::from(42_i64)),
            ("fresh".to_string(), AttrValue::from(true)),
            ("digest".to_string(), AttrValue::Bytes(vec![0xde, 0xad])),
            (
                "parts".to_string(),
                AttrValue::List(vec![AttrValue::from("a"), AttrValue::from("b")]),
            ),
        ]));

        let json = serde_json::to_string(&value).unwrap();
        let back: AttrValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_holder_equality_is_field_wise() {
        let a = ResourceHolder::file("/p/src/a.txt".into(), 100, 3);
        let b = ResourceHolder::file("/p/src/a.txt".into(), 100, 3);
        let c = ResourceHolder::file("/p/src/a.txt".into(), 150, 3);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_state_round_trip() {
        let mut state = BuildState::with_configuration(BTreeMap::from([(
            "v".to_string(),
            AttrValue::from("1"),
        )]));
        state
            .resources
            .insert("/p/src/a.txt".into(), ResourceHolder::file("/p/src/a.txt".into(), 100, 3));
        state.outputs.insert("/p/out/ab.bin".into());
        state.resource_outputs.insert(
            "/p/src/a.txt".into(),
            BTreeSet::from(["/p/out/ab.bin".into()]),
        );

        let mut buffer = Vec::new();
        state.store(&mut buffer).unwrap();
        let back = BuildState::from_slice(Utf8Path::new("build.state"), &buffer).unwrap();

        assert_eq!(back, state);
    }

    #[test]
    fn test_version_mismatch_discards_state() {
        let state = BuildState::with_configuration(BTreeMap::new());
        let mut value = serde_json::to_value(&state).unwrap();
        value["version"] = serde_json::json!(999);
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(BuildState::from_slice(Utf8Path::new("build.state"), &bytes).is_none());
    }

    #[test]
    fn test_garbage_discards_state() {
        assert!(BuildState::from_slice(Utf8Path::new("build.state"), b"not json").is_none());
    }

    #[test]
    fn test_deterministic_serialization() {
        let mut state = BuildState::with_configuration(BTreeMap::new());
        state
            .resources
            .insert("/p/src/b.txt".into(), ResourceHolder::file("/p/src/b.txt".into(), 200, 5));
        state
            .resources
            .insert("/p/src/a.txt".into(), ResourceHolder::file("/p/src/a.txt".into(), 100, 3));

        let mut first = Vec::new();
        let mut second = Vec::new();
        state.store(&mut first).unwrap();
        state.clone().store(&mut second).unwrap();

        assert_eq!(first, second);
    }
}
