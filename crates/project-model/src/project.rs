//! Project file and the in-memory project context.
//!
//! A project holds the loaded sequences and the export recipe. It is the
//! single explicit context passed to discovery, validation and export; there
//! is no process-wide "current project".

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::export_spec::ExportSpec;
use crate::sequence::SequenceSpec;

/// Project file format version written by this build.
pub const PROJECT_FORMAT_VERSION: &str = "1.0";

/// Top-level project (`*.seqmix.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Unique project identifier.
    pub id: String,

    /// Creation timestamp (RFC 3339).
    pub created_at: String,

    /// Last modified timestamp (RFC 3339).
    pub modified_at: String,

    /// Loaded input sequences, in load order.
    #[serde(default)]
    pub sequences: Vec<SequenceSpec>,

    /// Output recipe and export settings.
    #[serde(default)]
    pub export: ExportSpec,
}

/// A project together with the file it lives in.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    /// Path of the project file.
    pub path: PathBuf,

    pub project: Project,
}

impl Project {
    /// Create an empty project.
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: PROJECT_FORMAT_VERSION.to_string(),
            name: name.into(),
            id: project_id(),
            created_at: now.clone(),
            modified_at: now,
            sequences: Vec::new(),
            export: ExportSpec::default(),
        }
    }

    pub fn sequence(&self, id: &str) -> Option<&SequenceSpec> {
        self.sequences.iter().find(|s| s.id == id)
    }

    pub fn sequence_mut(&mut self, id: &str) -> Option<&mut SequenceSpec> {
        self.sequences.iter_mut().find(|s| s.id == id)
    }

    /// Bump `modified_at`.
    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }
}

impl LoadedProject {
    /// Load a project file. Probes are not stored and must be refreshed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref().to_path_buf();

        let json = std::fs::read_to_string(&path).map_err(|e| ProjectError::IoError {
            path: path.clone(),
            source: e,
        })?;

        let project: Project =
            serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
                path: path.clone(),
                source: e,
            })?;

        if project.version != PROJECT_FORMAT_VERSION {
            return Err(ProjectError::UnsupportedVersion {
                path,
                version: project.version,
            });
        }

        Ok(Self { path, project })
    }

    /// Write the project file, creating its directory if needed.
    pub fn save(&self) -> Result<(), ProjectError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json =
            serde_json::to_string_pretty(&self.project).map_err(|e| ProjectError::ParseError {
                path: self.path.clone(),
                source: e,
            })?;
        std::fs::write(&self.path, json).map_err(|e| ProjectError::IoError {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Create and save a new, empty project.
    pub fn create(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self, ProjectError> {
        let loaded = Self {
            path: path.as_ref().to_path_buf(),
            project: Project::new(name),
        };
        loaded.save()?;
        Ok(loaded)
    }
}

/// Errors that can occur when reading or writing project files.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unsupported project version '{version}' in {path}")]
    UnsupportedVersion { path: PathBuf, version: String },
}

/// Random-looking identifier from the clock; uniqueness only matters per user.
fn project_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let pid = std::process::id() as u128;
    let mixed = nanos ^ (pid << 64) ^ (nanos >> 17).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    format!(
        "{:08x}-{:04x}-{:04x}-{:012x}",
        (mixed & 0xFFFF_FFFF) as u32,
        ((mixed >> 32) & 0xFFFF) as u16,
        ((mixed >> 48) & 0xFFFF) as u16,
        (mixed >> 64) & 0xFFFF_FFFF_FFFF,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeSpec;
    use crate::channel::{ChannelSourceRef, OutputChannel};
    use crate::export_spec::{FrameRange, FrameRangePolicy};
    use crate::pattern::SequencePathPattern;

    fn sample_project() -> Project {
        let mut project = Project::new("Shot 010");
        project.sequences.push(SequenceSpec::new(
            "beauty",
            SequencePathPattern::parse("beauty.%04d.exr").unwrap(),
            "/renders/beauty",
            vec![1, 2, 3],
        ));
        project.export.output_channels.push(OutputChannel::new(
            "R",
            ChannelSourceRef::new("beauty", "R"),
        ));
        project
            .export
            .output_attributes
            .insert(AttributeSpec::string("owner", "comp"))
            .unwrap();
        project.export.frame_policy = Some(FrameRangePolicy::HoldLast);
        project.export.compression = Some("piz".to_string());
        project.export.frame_range = Some(FrameRange::new(2, 3));
        project
    }

    #[test]
    fn test_project_creation() {
        let project = Project::new("Test");
        assert_eq!(project.version, PROJECT_FORMAT_VERSION);
        assert!(project.sequences.is_empty());
        assert!(project.export.frame_policy.is_none());
        assert!(!project.id.is_empty());
    }

    #[test]
    fn test_loaded_project_create_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("010.seqmix.json");

        let mut created = LoadedProject::create(&path, "Shot 010").unwrap();
        created.project = Project {
            id: created.project.id.clone(),
            ..sample_project()
        };
        created.save().unwrap();

        let loaded = LoadedProject::load(&path).unwrap();
        assert_eq!(loaded.project, created.project);
        assert_eq!(loaded.project.sequence("beauty").unwrap().frames(), &[1, 2, 3]);
        assert_eq!(loaded.project.export.compression.as_deref(), Some("piz"));
    }

    #[test]
    fn test_load_rejects_other_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.seqmix.json");
        let mut project = Project::new("Old");
        project.version = "0.3".to_string();
        std::fs::write(&path, serde_json::to_string(&project).unwrap()).unwrap();

        let err = LoadedProject::load(&path).unwrap_err();
        assert!(matches!(err, ProjectError::UnsupportedVersion { version, .. } if version == "0.3"));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LoadedProject::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ProjectError::IoError { .. }));
    }
}
