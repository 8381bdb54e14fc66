//! Export validation.
//!
//! [`validate`] is a pure function of the project and the store's reported
//! capabilities. It returns issues in a fixed order: output channels,
//! geometry and format, frame policy, attributes, then export target. Any
//! ERROR blocks the export.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::Serialize;

use seqmix_project_model::{
    ChannelSpec, ImageGeometry, OutputChannel, PatternError, Project, SequencePathPattern,
    SequenceSpec,
};

use crate::alignment::{determine_mode, resolve_alignment, AlignmentInput, AlignmentPlan};

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
}

/// Stable issue codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    NoOutputChannels,
    InvalidOutputName,
    DuplicateOutputName,
    DanglingSource,
    ResolutionMismatch,
    ImplicitConversionBlocked,
    UnsupportedFormatOverride,
    MissingFramePolicy,
    AlignmentFallback,
    SequenceLengthMismatch,
    FramesDropped,
    NoFramesToExport,
    InvalidAttributeName,
    TypeMismatch,
    UnsafeAttributeEdit,
    BadOutputDir,
    MissingFrameToken,
    InvalidFilenamePattern,
    UnsupportedCompression,
}

/// One finding. Produced fresh on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

/// Inputs to [`validate`].
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub project: &'a Project,
    /// Compression selectors the store accepts. `None` skips that check.
    pub compression_modes: Option<&'a BTreeSet<String>>,
    /// Formats the store can convert to. `None` skips that check.
    pub conversion_formats: Option<&'a BTreeSet<String>>,
}

/// An output channel whose source resolved against a probed sequence.
struct ResolvedChannel<'a> {
    output: &'a OutputChannel,
    sequence: &'a SequenceSpec,
    source: &'a ChannelSpec,
    geometry: ImageGeometry,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::NoOutputChannels => "no_output_channels",
            IssueCode::InvalidOutputName => "invalid_output_name",
            IssueCode::DuplicateOutputName => "duplicate_output_name",
            IssueCode::DanglingSource => "dangling_source",
            IssueCode::ResolutionMismatch => "resolution_mismatch",
            IssueCode::ImplicitConversionBlocked => "implicit_conversion_blocked",
            IssueCode::UnsupportedFormatOverride => "unsupported_format_override",
            IssueCode::MissingFramePolicy => "missing_frame_policy",
            IssueCode::AlignmentFallback => "alignment_fallback",
            IssueCode::SequenceLengthMismatch => "sequence_length_mismatch",
            IssueCode::FramesDropped => "frames_dropped",
            IssueCode::NoFramesToExport => "no_frames_to_export",
            IssueCode::InvalidAttributeName => "invalid_attribute_name",
            IssueCode::TypeMismatch => "type_mismatch",
            IssueCode::UnsafeAttributeEdit => "unsafe_attribute_edit",
            IssueCode::BadOutputDir => "bad_output_dir",
            IssueCode::MissingFrameToken => "missing_frame_token",
            IssueCode::InvalidFilenamePattern => "invalid_filename_pattern",
            IssueCode::UnsupportedCompression => "unsupported_compression",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("ERROR"),
            Severity::Warning => f.write_str("WARNING"),
        }
    }
}

impl ValidationIssue {
    fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)
    }
}

impl<'a> ValidationContext<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self {
            project,
            compression_modes: None,
            conversion_formats: None,
        }
    }

    pub fn with_compression_modes(mut self, modes: &'a BTreeSet<String>) -> Self {
        self.compression_modes = Some(modes);
        self
    }

    pub fn with_conversion_formats(mut self, formats: &'a BTreeSet<String>) -> Self {
        self.conversion_formats = Some(formats);
        self
    }
}

/// True when no issue is an ERROR.
pub fn export_permitted(issues: &[ValidationIssue]) -> bool {
    !issues.iter().any(ValidationIssue::is_error)
}

/// Alignment inputs for the sequences the recipe references, in order of
/// first reference. Unknown sequences are skipped.
pub fn recipe_alignment_inputs(project: &Project) -> Vec<AlignmentInput> {
    let mut seen = BTreeSet::new();
    project
        .export
        .output_channels
        .iter()
        .filter_map(|c| project.sequence(&c.source.sequence_id))
        .filter(|s| seen.insert(s.id.clone()))
        .map(AlignmentInput::from_sequence)
        .collect()
}

/// Check the recipe of `ctx.project` for anything that would make an
/// export unsafe.
pub fn validate(ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
    let project = ctx.project;
    let mut issues = Vec::new();

    let resolved = check_output_channels(project, &mut issues);

    let inputs = recipe_alignment_inputs(project);
    let plan = project.export.frame_policy.map(|policy| {
        resolve_alignment(
            &inputs,
            policy,
            project.export.alignment,
            project.export.frame_range,
        )
    });

    check_geometry_and_formats(&resolved, plan.as_ref(), ctx.conversion_formats, &mut issues);
    check_policy(project, &inputs, plan.as_ref(), !resolved.is_empty(), &mut issues);
    check_attributes(project, &mut issues);
    check_export_target(ctx, &mut issues);

    tracing::debug!(
        issues = issues.len(),
        errors = issues.iter().filter(|i| i.is_error()).count(),
        "Validated recipe"
    );
    issues
}

fn check_output_channels<'a>(
    project: &'a Project,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<ResolvedChannel<'a>> {
    let channels = &project.export.output_channels;
    if channels.is_empty() {
        issues.push(ValidationIssue::error(
            IssueCode::NoOutputChannels,
            "the recipe has no output channels",
        ));
        return Vec::new();
    }

    for (index, channel) in channels.iter().enumerate() {
        if channel.output_name.trim().is_empty() {
            issues.push(
                ValidationIssue::error(
                    IssueCode::InvalidOutputName,
                    format!("output channel {index} has an empty name"),
                )
                .with("index", index),
            );
        }
    }

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for channel in channels {
        match counts
            .iter_mut()
            .find(|(name, _)| *name == channel.output_name)
        {
            Some((_, count)) => *count += 1,
            None => counts.push((channel.output_name.as_str(), 1)),
        }
    }
    for (name, count) in counts.into_iter().filter(|(_, c)| *c > 1) {
        issues.push(
            ValidationIssue::error(
                IssueCode::DuplicateOutputName,
                format!("output channel name '{name}' is used {count} times"),
            )
            .with("output_name", name)
            .with("count", count),
        );
    }

    let mut resolved = Vec::new();
    for channel in channels {
        match resolve_source(project, channel) {
            Ok(r) => resolved.push(r),
            Err(reason) => issues.push(
                ValidationIssue::error(
                    IssueCode::DanglingSource,
                    format!(
                        "output channel '{}' refers to {}: {reason}",
                        channel.output_name, channel.source
                    ),
                )
                .with("output_name", &channel.output_name)
                .with("sequence_id", &channel.source.sequence_id)
                .with("channel", &channel.source.channel_name)
                .with("subimage", channel.source.subimage_index)
                .with("reason", reason),
            ),
        }
    }
    resolved
}

fn resolve_source<'a>(
    project: &'a Project,
    channel: &'a OutputChannel,
) -> Result<ResolvedChannel<'a>, String> {
    let source = &channel.source;
    let sequence = project
        .sequence(&source.sequence_id)
        .ok_or_else(|| "sequence is not loaded".to_string())?;
    let probe = sequence
        .probe
        .as_ref()
        .ok_or_else(|| "sequence has not been probed".to_string())?;
    let subimage = probe
        .subimage(source.subimage_index)
        .ok_or_else(|| format!("no subimage {}", source.subimage_index))?;
    let spec = subimage
        .channels
        .iter()
        .find(|c| c.name == source.channel_name)
        .ok_or_else(|| "channel not found".to_string())?;

    Ok(ResolvedChannel {
        output: channel,
        sequence,
        source: spec,
        geometry: subimage.geometry,
    })
}

/// Pairs of sequences that appear together in at least one output frame.
/// Without a plan every pair is assumed to co-occur.
fn co_occurring(plan: Option<&AlignmentPlan>) -> Option<BTreeSet<(String, String)>> {
    let plan = plan?;
    let mut pairs = BTreeSet::new();
    for frame in &plan.frames {
        let present: Vec<&String> = frame
            .sources
            .iter()
            .filter(|(_, s)| s.is_available())
            .map(|(id, _)| id)
            .collect();
        for a in &present {
            for b in &present {
                pairs.insert(((*a).clone(), (*b).clone()));
            }
        }
    }
    Some(pairs)
}

fn check_geometry_and_formats(
    resolved: &[ResolvedChannel<'_>],
    plan: Option<&AlignmentPlan>,
    conversion_formats: Option<&BTreeSet<String>>,
    issues: &mut Vec<ValidationIssue>,
) {
    let pairs = co_occurring(plan);
    let together = |a: &ResolvedChannel<'_>, b: &ResolvedChannel<'_>| match &pairs {
        Some(pairs) => pairs.contains(&(a.sequence.id.clone(), b.sequence.id.clone())),
        None => true,
    };

    let mut reported = BTreeSet::new();
    for (i, a) in resolved.iter().enumerate() {
        for b in &resolved[i + 1..] {
            if a.geometry == b.geometry || !together(a, b) {
                continue;
            }
            let key = (
                (a.sequence.id.clone(), a.source.subimage_index),
                (b.sequence.id.clone(), b.source.subimage_index),
            );
            if !reported.insert(key) {
                continue;
            }
            issues.push(
                ValidationIssue::error(
                    IssueCode::ResolutionMismatch,
                    format!(
                        "'{}' is {} but '{}' is {}; sources must match in size",
                        a.sequence.id, a.geometry, b.sequence.id, b.geometry
                    ),
                )
                .with("sequence_a", &a.sequence.id)
                .with("size_a", a.geometry)
                .with("sequence_b", &b.sequence.id)
                .with("size_b", b.geometry),
            );
        }
    }

    if let Some(formats) = conversion_formats {
        for channel in resolved {
            let Some(target) = &channel.output.override_format else {
                continue;
            };
            if formats.contains(target.as_str()) {
                continue;
            }
            let known = formats.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
            issues.push(
                ValidationIssue::error(
                    IssueCode::UnsupportedFormatOverride,
                    format!(
                        "output channel '{}' overrides its format to '{target}', which the image store cannot convert to ({known})",
                        channel.output.output_name
                    ),
                )
                .with("output_name", &channel.output.output_name)
                .with("format", target)
                .with("supported", known),
            );
        }
    }

    for channel in resolved {
        if channel.output.override_format.is_some() {
            continue;
        }
        let source_format = &channel.source.format;
        let conflict = resolved.iter().find(|other| {
            !std::ptr::eq(*other, channel)
                && together(channel, *other)
                && other.output.effective_format(&other.source.format) != source_format
        });
        if let Some(other) = conflict {
            let other_format = other.output.effective_format(&other.source.format);
            issues.push(
                ValidationIssue::error(
                    IssueCode::ImplicitConversionBlocked,
                    format!(
                        "output channel '{}' is {} but '{}' is written as {}; set an explicit format override",
                        channel.output.output_name, source_format, other.output.output_name, other_format
                    ),
                )
                .with("output_name", &channel.output.output_name)
                .with("source_format", source_format)
                .with("other_channel", &other.output.output_name)
                .with("other_format", other_format),
            );
        }
    }
}

fn check_policy(
    project: &Project,
    inputs: &[AlignmentInput],
    plan: Option<&AlignmentPlan>,
    has_sources: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    if project.export.frame_policy.is_none() {
        issues.push(ValidationIssue::error(
            IssueCode::MissingFramePolicy,
            "no frame range policy selected",
        ));
    }

    let decision = determine_mode(inputs, project.export.alignment);
    if let Some(reason) = decision.fallback_reason {
        issues.push(
            ValidationIssue::warning(IssueCode::AlignmentFallback, reason)
                .with("mode", decision.mode),
        );
    }

    let lengths: BTreeSet<usize> = inputs.iter().map(|i| i.frames.len()).collect();
    if lengths.len() > 1 {
        let detail = inputs
            .iter()
            .map(|i| format!("{}={}", i.sequence_id, i.frames.len()))
            .collect::<Vec<_>>()
            .join(", ");
        issues.push(
            ValidationIssue::warning(
                IssueCode::SequenceLengthMismatch,
                format!("sequences have different frame counts ({detail})"),
            )
            .with("lengths", detail),
        );
    }

    if let Some(plan) = plan {
        if !plan.dropped.is_empty() {
            let frames = plan
                .dropped
                .iter()
                .map(|d| d.output_frame.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            issues.push(
                ValidationIssue::warning(
                    IssueCode::FramesDropped,
                    format!(
                        "{} frame(s) lack a source under {} and will not be written ({frames})",
                        plan.dropped.len(),
                        plan.policy
                    ),
                )
                .with("policy", plan.policy)
                .with("frames", frames),
            );
        }
        if has_sources && plan.is_empty() {
            let mut issue = ValidationIssue::error(
                IssueCode::NoFramesToExport,
                format!("no output frames resolve under {}", plan.policy),
            )
            .with("policy", plan.policy)
            .with("dropped", plan.dropped.len());
            if let Some(range) = project.export.frame_range {
                issue = issue.with("frame_range", format!("{}-{}", range.start, range.end));
            }
            issues.push(issue);
        }
    }
}

fn check_attributes(project: &Project, issues: &mut Vec<ValidationIssue>) {
    for attr in project.export.output_attributes.iter() {
        if attr.name.trim().is_empty() {
            issues.push(ValidationIssue::error(
                IssueCode::InvalidAttributeName,
                "an output attribute has an empty name",
            ));
        }
        if !attr.is_type_consistent() {
            issues.push(
                ValidationIssue::error(
                    IssueCode::TypeMismatch,
                    format!(
                        "attribute '{}' holds {} but is declared {}",
                        attr.name, attr.value, attr.type_tag
                    ),
                )
                .with("attribute", &attr.name)
                .with("type", &attr.type_tag),
            );
        }
        if !attr.editable && attr.is_modified_since_import() {
            issues.push(
                ValidationIssue::error(
                    IssueCode::UnsafeAttributeEdit,
                    format!("read-only attribute '{}' was changed after import", attr.name),
                )
                .with("attribute", &attr.name),
            );
        }
    }
}

fn check_export_target(ctx: &ValidationContext<'_>, issues: &mut Vec<ValidationIssue>) {
    let export = &ctx.project.export;

    if let Err(reason) = output_dir_usable(&export.output_dir) {
        issues.push(
            ValidationIssue::error(
                IssueCode::BadOutputDir,
                format!("output directory '{}' {reason}", export.output_dir.display()),
            )
            .with("output_dir", export.output_dir.display())
            .with("reason", reason),
        );
    }

    let pattern = &export.filename_pattern;
    if pattern.contains('/') || pattern.contains(std::path::MAIN_SEPARATOR) {
        issues.push(
            ValidationIssue::error(
                IssueCode::InvalidFilenamePattern,
                format!("filename pattern '{pattern}' must be a bare filename"),
            )
            .with("pattern", pattern),
        );
    } else {
        match SequencePathPattern::parse(pattern) {
            Ok(_) => {}
            Err(PatternError::MissingFrameToken { .. }) => issues.push(
                ValidationIssue::error(
                    IssueCode::MissingFrameToken,
                    format!("filename pattern '{pattern}' has no frame placeholder"),
                )
                .with("pattern", pattern),
            ),
            Err(err) => issues.push(
                ValidationIssue::error(IssueCode::InvalidFilenamePattern, err.to_string())
                    .with("pattern", pattern),
            ),
        }
    }

    if let (Some(mode), Some(supported)) = (&export.compression, ctx.compression_modes) {
        if !supported.contains(mode) {
            let listed = supported.iter().cloned().collect::<Vec<_>>().join(", ");
            issues.push(
                ValidationIssue::error(
                    IssueCode::UnsupportedCompression,
                    format!("compression '{mode}' is not supported (supported: {listed})"),
                )
                .with("compression", mode)
                .with("supported", listed),
            );
        }
    }
}

/// The directory exists and is writable, or can be created under its
/// nearest existing ancestor.
fn output_dir_usable(dir: &Path) -> Result<(), &'static str> {
    if dir.as_os_str().is_empty() {
        return Err("is not set");
    }

    let existing = dir
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .ok_or("has no existing parent")?;
    let metadata = std::fs::metadata(existing).map_err(|_| "cannot be inspected")?;

    if !metadata.is_dir() {
        return Err(if existing == dir {
            "is not a directory"
        } else {
            "is below a file"
        });
    }
    if metadata.permissions().readonly() {
        return Err("is not writable");
    }
    Ok(())
}
