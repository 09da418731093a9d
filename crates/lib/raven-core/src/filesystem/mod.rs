use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use lazy_static::lazy_static;
use parking_lot::Mutex;

/// Folders the engine writes into, relative to the project root unless mounted elsewhere.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProjectFolder {
    Root,
    Log,
}

impl ProjectFolder {
    fn default_relative_path(&self) -> &'static str {
        match self {
            ProjectFolder::Root => "",
            ProjectFolder::Log => "log",
        }
    }
}

#[derive(Default)]
struct MountTable {
    root: Option<PathBuf>,
    custom: HashMap<ProjectFolder, PathBuf>,
}

lazy_static! {
    static ref MOUNT_TABLE: Mutex<MountTable> = Mutex::new(MountTable::default());
}

/// Get the root path of the project.
/// Falls back to the working directory until a root is mounted.
pub fn root_path() -> anyhow::Result<PathBuf> {
    match MOUNT_TABLE.lock().root.clone() {
        Some(root) => Ok(root),
        None => Ok(std::env::current_dir()?),
    }
}

/// Set the root path of the project.
pub fn set_root_path(p: impl Into<PathBuf>) -> anyhow::Result<()> {
    let p = p.into();
    if !p.is_dir() {
        bail!("{} is not a root path!", p.display())
    }

    glog::trace!("project root mounted at {}", p.display());
    MOUNT_TABLE.lock().root = Some(p);
    Ok(())
}

/// Set the root path to the folder the executable lives in.
pub fn set_default_root_path() -> anyhow::Result<()> {
    let exe_path = std::env::current_exe()?;
    let root_path = exe_path
        .parent()
        .ok_or_else(|| anyhow!("Executable path {} has no parent folder!", exe_path.display()))?;

    set_root_path(root_path)
}

/// Redirect a project folder somewhere else than under the root path.
pub fn set_custom_mount_point(pf: ProjectFolder, path: impl Into<PathBuf>) -> anyhow::Result<()> {
    if pf == ProjectFolder::Root {
        bail!("Cannot mount the root here, call set_root_path() instead!");
    }

    MOUNT_TABLE.lock().custom.insert(pf, path.into());
    Ok(())
}

/// Get the absolute path of ProjectFolder pf.
pub fn project_folder_path(pf: &ProjectFolder) -> anyhow::Result<PathBuf> {
    if let Some(path) = MOUNT_TABLE.lock().custom.get(pf) {
        return Ok(path.clone());
    }

    let root = root_path()?;
    Ok(resolve(&root, *pf))
}

fn resolve(root: &Path, pf: ProjectFolder) -> PathBuf {
    match pf {
        ProjectFolder::Root => root.to_owned(),
        _ => root.join(pf.default_relative_path()),
    }
}

/// Check if ProjectFolder pf exists, if not, create a empty folder.
pub fn exist_or_create(pf: &ProjectFolder) -> anyhow::Result<()> {
    let folder_path = project_folder_path(pf)?;
    if !folder_path.exists() {
        std::fs::create_dir_all(folder_path)?;
    }

    Ok(())
}
