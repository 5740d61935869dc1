//! Validation System - structural contract checks
//!
//! Checks run in a fixed order and stop at the first fatal outcome: once a
//! structural assumption is broken (e.g. the pixel-mask shape) later checks
//! can no longer be interpreted. Warnings accumulate and never stop a run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::container::{first_negative, Container, ContainerError, ScalarValue};
use crate::contract::{
    self, classify_entry_name, entry_path, scalar_rule, Axis, FieldRule, Presence, DATA_GROUP,
    MASK_DEFECT_BITS, MASK_GAP_BIT, PIXEL_MASK, PIXEL_MASK_TYPE, REQUIRED_GROUPS,
};
use crate::print::shape_tuple;
use crate::superblock::{Superblock, SuperblockError};
use crate::TOOL_VERSION;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warn,
    Fail,
}

impl Severity {
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Ok => "[ OK ]",
            Severity::Warn => "[WARN]",
            Severity::Fail => "[FAIL]",
        }
    }
}

/// One check outcome.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Named path the outcome refers to, when there is one.
    pub path: Option<String>,
    pub message: String,
    /// Continuation lines (remediation, reader behaviour).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn new(severity: Severity, path: Option<&str>, message: String) -> Self {
        Self {
            severity,
            path: path.map(str::to_string),
            message,
            notes: vec![],
        }
    }

    pub fn ok(path: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Ok, path, message.into())
    }

    pub fn warn(path: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, path, message.into())
    }

    pub fn fail(path: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Fail, path, message.into())
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Fatal diagnostic for a path that could not be read.
    fn access(path: &str, err: &ContainerError) -> Self {
        match err {
            ContainerError::NotFound(_) => Self::fail(Some(path), format!("'{path}' not found")),
            other => Self::fail(Some(path), format!("error accessing '{path}': {other}")),
        }
    }
}

/// A failed check carries the fatal diagnostic in its error arm.
pub type CheckResult<T> = Result<T, Diagnostic>;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub source: String,
    pub tool_version: String,
    pub checked_at: DateTime<Utc>,
    pub valid: bool,
    pub superblock_version: Option<u8>,
    pub pixel_mask_shape: Option<[usize; 2]>,
    pub image_entries: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warn)
    }
}

/// Values captured on the way through the checks.
#[derive(Debug, Default)]
struct Findings {
    superblock_version: Option<u8>,
    pixel_mask_shape: Option<[usize; 2]>,
    image_entries: Vec<String>,
}

/// Runs the contract checks against one opened container.
pub struct Validator<'c, C: Container + ?Sized> {
    container: &'c C,
    diagnostics: Vec<Diagnostic>,
}

impl<'c, C: Container + ?Sized> Validator<'c, C> {
    pub fn new(container: &'c C) -> Self {
        Self {
            container,
            diagnostics: vec![],
        }
    }

    /// Non-fatal outcomes recorded so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(severity = ?diagnostic.severity, message = %diagnostic.message, "check");
        self.diagnostics.push(diagnostic);
    }

    pub fn check_signature(&mut self) -> CheckResult<u8> {
        let reader = self
            .container
            .raw_reader()
            .map_err(|e| Diagnostic::fail(None, format!("error reading file header: {e}")))?;
        match Superblock::read(reader) {
            Ok(sb) => {
                self.record(Diagnostic::ok(None, format!("superblock version {}", sb.version)));
                Ok(sb.version)
            }
            Err(e @ SuperblockError::Io(_)) => {
                Err(Diagnostic::fail(None, format!("error reading file header: {e}")))
            }
            Err(e) => Err(Diagnostic::fail(None, e.to_string())),
        }
    }

    pub fn check_required_groups(&mut self) -> CheckResult<()> {
        for path in REQUIRED_GROUPS {
            self.container
                .group_members(path)
                .map_err(|e| Diagnostic::access(path, &e))?;
            tracing::debug!(path, "group resolved");
        }
        Ok(())
    }

    /// Check one scalar field against its contract rule.
    ///
    /// Returns `None` when an optional field is absent.
    pub fn check_scalar_field(&mut self, rule: &FieldRule) -> CheckResult<Option<ScalarValue>> {
        let path = rule.path;
        let info = match self.container.dataset(path) {
            Ok(info) => info,
            Err(ContainerError::NotFound(_)) => match rule.presence {
                Presence::Optional { fallback } => {
                    self.record(Diagnostic::warn(
                        Some(path),
                        format!("'{path}' not found, {fallback}"),
                    ));
                    return Ok(None);
                }
                Presence::Required => {
                    return Err(Diagnostic::fail(Some(path), format!("'{path}' not found")))
                }
            },
            Err(e) => return Err(Diagnostic::access(path, &e)),
        };

        if !rule.accepts(info.element_type) {
            return Err(Diagnostic::fail(
                Some(path),
                format!(
                    "'{path}' must be {} [dtype: {}]",
                    rule.accepted_description(),
                    info.element_type
                ),
            ));
        }

        let value = self
            .container
            .read_scalar(path)
            .map_err(|e| Diagnostic::access(path, &e))?;
        if rule.positive && !value.is_positive() {
            return Err(Diagnostic::fail(
                Some(path),
                format!("'{path}' must be a positive non-zero integer [value: {value}]"),
            ));
        }

        self.record(Diagnostic::ok(
            Some(path),
            format!("'{path}' found [value: {value}, dtype: {}]", info.element_type),
        ));
        Ok(Some(value))
    }

    fn check_rule(&mut self, path: &str) -> CheckResult<Option<ScalarValue>> {
        let rule = scalar_rule(path)
            .ok_or_else(|| Diagnostic::fail(Some(path), format!("no contract rule for '{path}'")))?;
        self.check_scalar_field(rule)
    }

    pub fn check_pixel_size(&mut self, axis: Axis) -> CheckResult<Option<ScalarValue>> {
        self.check_rule(axis.pixel_size_path())
    }

    pub fn check_trigger_count(&mut self) -> CheckResult<Option<ScalarValue>> {
        self.check_rule(contract::NTRIGGER)
    }

    pub fn check_image_count(&mut self) -> CheckResult<ScalarValue> {
        self.check_rule(contract::NIMAGES)?.ok_or_else(|| {
            Diagnostic::fail(Some(contract::NIMAGES), format!("'{}' not found", contract::NIMAGES))
        })
    }

    /// Check the pixel mask and return its `(rows, cols)`.
    pub fn check_pixel_mask(&mut self) -> CheckResult<(usize, usize)> {
        let info = self
            .container
            .dataset(PIXEL_MASK)
            .map_err(|e| Diagnostic::access(PIXEL_MASK, &e))?;

        if let Some(chunks) = &info.chunks {
            return Err(Diagnostic::fail(
                Some(PIXEL_MASK),
                format!(
                    "'{PIXEL_MASK}' 2D data may not be chunked [chunks: {}]",
                    shape_tuple(chunks)
                ),
            )
            .with_note("save the pixel mask with chunking disabled")
            .with_note("(h5py: pass chunks=None to create_dataset)"));
        }

        let (rows, cols) = match info.shape.as_slice() {
            &[rows, cols] => (rows, cols),
            shape => {
                return Err(Diagnostic::fail(
                    Some(PIXEL_MASK),
                    format!("'{PIXEL_MASK}' must be 2-dimensional [shape: {}]", shape_tuple(shape)),
                ))
            }
        };

        let found = format!(
            "'{PIXEL_MASK}' found [dtype: {}, shape: {}]",
            info.element_type,
            shape_tuple(&info.shape)
        );
        if info.element_type == PIXEL_MASK_TYPE {
            self.record(Diagnostic::ok(Some(PIXEL_MASK), found));
            return Ok((rows, cols));
        }

        self.record(
            Diagnostic::warn(Some(PIXEL_MASK), found)
                .with_note(format!("dtype of pixel_mask not {PIXEL_MASK_TYPE}. wrong format?"))
                .with_note("the reader applies the pixel mask and sets data to")
                .with_note(format!("      -1 for pixel_mask & {MASK_GAP_BIT:#07b}"))
                .with_note(format!("      -2 for pixel_mask & {MASK_DEFECT_BITS:#07b}"))
                .with_note("      -1 if the data value exceeds the signed int32 maximum")
                .with_note(format!(
                    "the reader converts the mask to {PIXEL_MASK_TYPE} and rejects negative values"
                )),
        );

        if info.element_type.is_signed() {
            let raw = self
                .container
                .read_raw(PIXEL_MASK)
                .map_err(|e| Diagnostic::access(PIXEL_MASK, &e))?;
            if let Some(index) = first_negative(info.element_type, &raw) {
                return Err(Diagnostic::fail(
                    Some(PIXEL_MASK),
                    format!(
                        "there are negative values in '{PIXEL_MASK}' [first at flat index {index}]"
                    ),
                ));
            }
        }
        Ok((rows, cols))
    }

    /// Check every member of the data group and return the accepted names.
    pub fn check_image_entries(&mut self, mask_shape: (usize, usize)) -> CheckResult<Vec<String>> {
        let (rows, cols) = mask_shape;
        let members = self
            .container
            .group_members(DATA_GROUP)
            .map_err(|e| Diagnostic::access(DATA_GROUP, &e))?;

        let mut accepted = vec![];
        for name in members {
            let path = entry_path(&name);
            if !classify_entry_name(&name).is_accepted() {
                self.record(
                    Diagnostic::warn(
                        Some(path.as_str()),
                        format!("path '{path}' wrong format to contain images"),
                    )
                    .with_note("(must be 'data_NNNNNN' or 'data' for single file).")
                    .with_note("the reader will ignore this entry."),
                );
                continue;
            }

            let info = self
                .container
                .dataset(&path)
                .map_err(|e| Diagnostic::access(&path, &e))?;
            let Some(chunks) = &info.chunks else {
                return Err(Diagnostic::fail(
                    Some(path.as_str()),
                    format!("image data in '{path}' must be chunked"),
                ));
            };
            let &[frames, data_rows, data_cols] = info.shape.as_slice() else {
                return Err(Diagnostic::fail(
                    Some(path.as_str()),
                    format!(
                        "expected 3-dimensional data for '{path}' [shape: {}]",
                        shape_tuple(&info.shape)
                    ),
                ));
            };
            if (data_rows, data_cols) != (rows, cols) {
                return Err(Diagnostic::fail(
                    Some(path.as_str()),
                    format!(
                        "expected image data shape (any, {rows}, {cols}) but got {}",
                        shape_tuple(&info.shape)
                    ),
                )
                .with_note("this shape is deduced from the shape of the pixel mask (perhaps transposed?)"));
            }
            let expected_chunks = [1, data_rows, data_cols];
            if chunks.as_slice() != expected_chunks.as_slice() {
                return Err(Diagnostic::fail(
                    Some(path.as_str()),
                    format!(
                        "expected chunks {} but got {} for '{path}'",
                        shape_tuple(&expected_chunks),
                        shape_tuple(chunks)
                    ),
                ));
            }
            tracing::debug!(path = %path, frames, "image entry accepted");
            accepted.push(name);
        }

        match accepted.len() {
            0 => Err(Diagnostic::fail(
                Some(DATA_GROUP),
                format!("no entries with correct format found in '{DATA_GROUP}'"),
            )),
            n => {
                let noun = if n == 1 { "entry" } else { "entries" };
                self.record(Diagnostic::ok(
                    Some(DATA_GROUP),
                    format!("found {n} {noun} for image data in '{DATA_GROUP}'"),
                ));
                Ok(accepted)
            }
        }
    }

    fn run_checks(&mut self, findings: &mut Findings) -> CheckResult<()> {
        findings.superblock_version = Some(self.check_signature()?);
        self.check_required_groups()?;
        self.check_pixel_size(Axis::X)?;
        self.check_pixel_size(Axis::Y)?;
        self.check_trigger_count()?;
        self.check_image_count()?;
        let (rows, cols) = self.check_pixel_mask()?;
        findings.pixel_mask_shape = Some([rows, cols]);
        findings.image_entries = self.check_image_entries((rows, cols))?;
        Ok(())
    }

    /// Run every check in order and build the report.
    pub fn run(mut self) -> ValidationReport {
        let source = self.container.source().to_string();
        tracing::info!(source = %source, "validating");

        let mut findings = Findings::default();
        let valid = match self.run_checks(&mut findings) {
            Ok(()) => true,
            Err(fatal) => {
                tracing::debug!(message = %fatal.message, "fatal outcome, stopping");
                self.diagnostics.push(fatal);
                false
            }
        };
        tracing::info!(source = %source, valid, "validation finished");

        ValidationReport {
            source,
            tool_version: TOOL_VERSION.to_string(),
            checked_at: Utc::now(),
            valid,
            superblock_version: findings.superblock_version,
            pixel_mask_shape: findings.pixel_mask_shape,
            image_entries: findings.image_entries,
            diagnostics: self.diagnostics,
        }
    }
}

/// Validate one container end to end.
pub fn validate<C: Container + ?Sized>(container: &C) -> ValidationReport {
    Validator::new(container).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ElementType, MemoryContainer};
    use crate::contract::{NIMAGES, NTRIGGER, X_PIXEL_SIZE};

    fn detector() -> MemoryContainer {
        let mut c = MemoryContainer::new("unit.h5", 2);
        c.add_group(DATA_GROUP);
        c.add_group(contract::DETECTOR_SPECIFIC_GROUP);
        c
    }

    #[test]
    fn test_optional_field_absent_warns() {
        let c = detector();
        let mut v = Validator::new(&c);
        assert_eq!(v.check_trigger_count().unwrap(), None);
        let warning = &v.diagnostics()[0];
        assert_eq!(warning.severity, Severity::Warn);
        assert!(warning.message.contains("ntrigger = 1"));
    }

    #[test]
    fn test_required_field_absent_fails() {
        let c = detector();
        let fatal = Validator::new(&c).check_image_count().unwrap_err();
        assert_eq!(fatal.severity, Severity::Fail);
        assert_eq!(fatal.path.as_deref(), Some(NIMAGES));
    }

    #[test]
    fn test_integer_field_rejects_float() {
        let mut c = detector();
        c.add_scalar_f64(NTRIGGER, 2.0);
        let fatal = Validator::new(&c).check_trigger_count().unwrap_err();
        assert!(fatal.message.contains("must be an integer [dtype: float64]"));
    }

    #[test]
    fn test_zero_and_negative_counts_fail() {
        let mut c = detector();
        c.add_scalar_i64(NIMAGES, 0);
        assert!(Validator::new(&c).check_image_count().is_err());
        c.add_scalar_i64(NIMAGES, -3);
        let fatal = Validator::new(&c).check_image_count().unwrap_err();
        assert!(fatal.message.contains("[value: -3]"));
    }

    #[test]
    fn test_pixel_size_accepts_both_float_widths() {
        let mut c = detector();
        c.add_scalar_f32(X_PIXEL_SIZE, 7.5e-5);
        c.add_scalar_f64(contract::Y_PIXEL_SIZE, 7.5e-5);
        let mut v = Validator::new(&c);
        assert!(v.check_pixel_size(Axis::X).unwrap().is_some());
        assert!(v.check_pixel_size(Axis::Y).unwrap().is_some());
        assert!(v.diagnostics()[0].message.contains("[value: 7.5e-5, dtype: float32]"));
    }

    #[test]
    fn test_pixel_size_rejects_integer() {
        let mut c = detector();
        c.add_scalar_u32(X_PIXEL_SIZE, 75);
        let fatal = Validator::new(&c).check_pixel_size(Axis::X).unwrap_err();
        assert!(fatal.message.contains("either float32 or float64"));
    }

    #[test]
    fn test_non_scalar_field_is_access_error() {
        let mut c = detector();
        c.add_zeroed(NIMAGES, ElementType::UInt32, &[2], None);
        let fatal = Validator::new(&c).check_image_count().unwrap_err();
        assert!(fatal.message.starts_with("error accessing"));
    }

    #[test]
    fn test_three_dimensional_mask_fails() {
        let mut c = detector();
        c.add_zeroed(PIXEL_MASK, ElementType::UInt32, &[1, 4, 4], None);
        let fatal = Validator::new(&c).check_pixel_mask().unwrap_err();
        assert!(fatal.message.contains("2-dimensional [shape: (1, 4, 4)]"));
    }
}
