use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::VBoxParseError;

pub const SHARED_FOLDER_PREFIX: &str = "SharedFolder";

static RE_SHARED_FOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SharedFolder(Name|Path)(Machine|Transient)Mapping([0-9]+)$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedFolder {
    pub name: String,
    /// path on the host machine
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FolderScope {
    Machine,
    Transient,
}

/// scope plus the mapping digits exactly as printed; `Mapping01` and `Mapping1` differ
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FolderId {
    scope: FolderScope,
    index: String,
}

#[derive(Debug, Clone, Default)]
struct PartialFolder {
    name: Option<String>,
    path: Option<String>,
}

/// Shared folders of one machine, assembled from `SharedFolder...Mapping<N>` lines.
///
/// Name and path of a folder arrive on separate lines in any order. Records are
/// only handed out by [`SharedFolderTable::list`] once both are known.
#[derive(Debug, Clone, Default)]
pub struct SharedFolderTable {
    folders: HashMap<FolderId, PartialFolder>,
}

impl SharedFolderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one property. Keys without the `SharedFolder` prefix are ignored.
    pub fn accept(&mut self, key: &str, value: &str) -> Result<(), VBoxParseError> {
        if !key.starts_with(SHARED_FOLDER_PREFIX) {
            return Ok(());
        }

        let caps = RE_SHARED_FOLDER
            .captures(key)
            .ok_or_else(|| VBoxParseError::malformed(key, value, "unknown shared folder property"))?;

        let scope = match &caps[2] {
            "Machine" => FolderScope::Machine,
            _ => FolderScope::Transient,
        };
        let index = caps[3].to_string();

        let folder = self.folders.entry(FolderId { scope, index }).or_default();
        match &caps[1] {
            "Name" => folder.name = Some(value.to_string()),
            _ => folder.path = Some(value.to_string()),
        }
        Ok(())
    }

    /// All complete folders, in no particular order.
    pub fn list(&self) -> Vec<SharedFolder> {
        self.folders
            .iter()
            .filter_map(|(id, folder)| match (&folder.name, &folder.path) {
                (Some(name), Some(path)) => Some(SharedFolder {
                    name: name.clone(),
                    path: path.clone(),
                }),
                _ => {
                    tracing::warn!(
                        "Skipping incomplete shared folder {:?} mapping {}",
                        id.scope,
                        id.index
                    );
                    None
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}
