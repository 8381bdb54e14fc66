//! Edits of the output recipe.
//!
//! All operations mutate only the project's recipe. Source sequences and
//! their probes are read, never changed, and removing a sequence leaves any
//! reference to it dangling for validation to report.

use crate::attribute::{
    AttributeConflict, AttributeEditError, AttributeResolution, AttributeSpec, AttributeValue,
};
use crate::channel::{ChannelFormat, ChannelSourceRef, OutputChannel};
use crate::project::Project;
use crate::sequence::SequenceSpec;

/// Errors from recipe edits. No edit is applied when one is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecipeError {
    #[error("output channel '{name}' already exists")]
    DuplicateName { name: String },

    #[error("output channel '{name}' not found")]
    UnknownChannel { name: String },

    #[error("sequence '{id}' is already loaded")]
    DuplicateSequence { id: String },

    #[error("sequence '{id}' not found")]
    UnknownSequence { id: String },

    #[error("sequence '{id}' has not been probed")]
    NotProbed { id: String },

    #[error("sequence '{id}' has no subimage {index}")]
    UnknownSubimage { id: String, index: usize },

    #[error("sequence '{id}' has no attribute '{name}'")]
    AttributeNotFound { id: String, name: String },

    #[error("attribute '{name}' cannot be kept twice: names are unique")]
    AttributeNameConflict { name: String },

    #[error("position {position} is out of range for {len} output channels")]
    PositionOutOfRange { position: usize, len: usize },

    #[error(transparent)]
    AttributeEdit(#[from] AttributeEditError),
}

/// Result of [`Project::import_attributes`].
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// Every attribute was added or already present with the same value.
    Imported {
        added: Vec<String>,
        unchanged: Vec<String>,
    },
    /// Nothing was changed; each conflict needs an explicit resolution.
    Conflicts(Vec<AttributeConflict>),
}

impl Project {
    /// Add a loaded sequence. Ids are unique.
    pub fn add_sequence(&mut self, sequence: SequenceSpec) -> Result<(), RecipeError> {
        if self.sequence(&sequence.id).is_some() {
            return Err(RecipeError::DuplicateSequence { id: sequence.id });
        }
        self.sequences.push(sequence);
        self.touch();
        Ok(())
    }

    /// Unload a sequence. Output channels that referenced it are kept.
    pub fn remove_sequence(&mut self, id: &str) -> Result<SequenceSpec, RecipeError> {
        let index = self
            .sequences
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| RecipeError::UnknownSequence { id: id.to_string() })?;
        let removed = self.sequences.remove(index);
        self.touch();
        Ok(removed)
    }

    /// Append an output channel. The source is not checked here.
    pub fn add_output_channel(
        &mut self,
        source: ChannelSourceRef,
        name: impl Into<String>,
    ) -> Result<(), RecipeError> {
        let name = name.into();
        if self.export.output_channel(&name).is_some() {
            return Err(RecipeError::DuplicateName { name });
        }
        self.export
            .output_channels
            .push(OutputChannel::new(name, source));
        self.touch();
        Ok(())
    }

    pub fn rename_output_channel(&mut self, from: &str, to: &str) -> Result<(), RecipeError> {
        if self.export.output_channel(from).is_none() {
            return Err(RecipeError::UnknownChannel {
                name: from.to_string(),
            });
        }
        if from == to {
            return Ok(());
        }
        if self.export.output_channel(to).is_some() {
            return Err(RecipeError::DuplicateName {
                name: to.to_string(),
            });
        }
        if let Some(channel) = self.export.output_channel_mut(from) {
            channel.output_name = to.to_string();
        }
        self.touch();
        Ok(())
    }

    pub fn remove_output_channel(&mut self, name: &str) -> Result<OutputChannel, RecipeError> {
        let index = self.output_channel_index(name)?;
        let removed = self.export.output_channels.remove(index);
        self.touch();
        Ok(removed)
    }

    /// Move an output channel to `position` in file order.
    pub fn move_output_channel(&mut self, name: &str, position: usize) -> Result<(), RecipeError> {
        let len = self.export.output_channels.len();
        let index = self.output_channel_index(name)?;
        if position >= len {
            return Err(RecipeError::PositionOutOfRange { position, len });
        }
        let channel = self.export.output_channels.remove(index);
        self.export.output_channels.insert(position, channel);
        self.touch();
        Ok(())
    }

    /// Set or clear the explicit output format of a channel.
    pub fn set_format_override(
        &mut self,
        name: &str,
        format: Option<ChannelFormat>,
    ) -> Result<(), RecipeError> {
        let channel =
            self.export
                .output_channel_mut(name)
                .ok_or_else(|| RecipeError::UnknownChannel {
                    name: name.to_string(),
                })?;
        channel.override_format = format;
        self.touch();
        Ok(())
    }

    /// Copy attributes of a probed sequence into the output set.
    ///
    /// `names` empty means every attribute of the subimage. Values are
    /// copied. If any selected name already exists with a different value
    /// nothing is imported and the conflicts are returned.
    pub fn import_attributes(
        &mut self,
        sequence_id: &str,
        subimage_index: usize,
        names: &[&str],
    ) -> Result<ImportOutcome, RecipeError> {
        let sequence = self
            .sequence(sequence_id)
            .ok_or_else(|| RecipeError::UnknownSequence {
                id: sequence_id.to_string(),
            })?;
        let probe = sequence
            .probe
            .as_ref()
            .ok_or_else(|| RecipeError::NotProbed {
                id: sequence_id.to_string(),
            })?;
        let subimage = probe
            .subimage(subimage_index)
            .ok_or_else(|| RecipeError::UnknownSubimage {
                id: sequence_id.to_string(),
                index: subimage_index,
            })?;

        let incoming: Vec<AttributeSpec> = if names.is_empty() {
            subimage.attributes.iter().map(|a| a.imported_copy()).collect()
        } else {
            names
                .iter()
                .map(|name| {
                    subimage
                        .attributes
                        .get(name)
                        .map(|a| a.imported_copy())
                        .ok_or_else(|| RecipeError::AttributeNotFound {
                            id: sequence_id.to_string(),
                            name: name.to_string(),
                        })
                })
                .collect::<Result<_, _>>()?
        };

        let conflicts = self.export.output_attributes.conflicts_with(&incoming);
        if !conflicts.is_empty() {
            return Ok(ImportOutcome::Conflicts(conflicts));
        }

        let mut added = Vec::new();
        let mut unchanged = Vec::new();
        for attr in incoming {
            if self.export.output_attributes.contains(&attr.name) {
                unchanged.push(attr.name);
            } else {
                added.push(attr.name.clone());
                self.export.output_attributes.insert(attr)?;
            }
        }
        if !added.is_empty() {
            self.touch();
        }
        Ok(ImportOutcome::Imported { added, unchanged })
    }

    /// Apply the caller's choice for one import conflict.
    pub fn resolve_attribute_conflict(
        &mut self,
        conflict: &AttributeConflict,
        resolution: AttributeResolution,
    ) -> Result<(), RecipeError> {
        match resolution {
            AttributeResolution::KeepExisting => Ok(()),
            AttributeResolution::Replace => {
                self.export
                    .output_attributes
                    .replace(conflict.incoming.clone());
                self.touch();
                Ok(())
            }
            AttributeResolution::KeepBoth => Err(RecipeError::AttributeNameConflict {
                name: conflict.name.clone(),
            }),
        }
    }

    pub fn add_output_attribute(&mut self, attr: AttributeSpec) -> Result<(), RecipeError> {
        self.export.output_attributes.insert(attr)?;
        self.touch();
        Ok(())
    }

    pub fn set_output_attribute_value(
        &mut self,
        name: &str,
        value: AttributeValue,
    ) -> Result<(), RecipeError> {
        self.export.output_attributes.set_value(name, value)?;
        self.touch();
        Ok(())
    }

    pub fn remove_output_attribute(&mut self, name: &str) -> Result<AttributeSpec, RecipeError> {
        let removed = self
            .export
            .output_attributes
            .remove(name)
            .ok_or_else(|| AttributeEditError::NotFound {
                name: name.to_string(),
            })?;
        self.touch();
        Ok(removed)
    }

    fn output_channel_index(&self, name: &str) -> Result<usize, RecipeError> {
        self.export
            .output_channels
            .iter()
            .position(|c| c.output_name == name)
            .ok_or_else(|| RecipeError::UnknownChannel {
                name: name.to_string(),
            })
    }
}
