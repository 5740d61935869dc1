//! Contract Invariant Tests
//!
//! These tests pin the reader-facing guarantees: first fatal wins, optional
//! fields only warn, and digests are stable and order dependent.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use h5contract_core::{
    contract::{
        DATA_GROUP, DETECTOR_GROUP, DETECTOR_SPECIFIC_GROUP, FLATFIELD, NIMAGES, NTRIGGER,
        PIXEL_MASK, X_PIXELS_IN_DETECTOR, X_PIXEL_SIZE, Y_PIXEL_SIZE,
    },
    describe, lookup3, rolling_lookup3, validate, BatchPipeline, BatchPolicy, Container,
    ContainerError, DescribeError, ElementType, FileOutcome, MemoryContainer, PipelineError,
    Severity, SuperblockError, ValidationReport,
};

const ROWS: usize = 4;
const COLS: usize = 6;

fn pattern(len: usize, salt: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + salt) % 251) as u8).collect()
}

/// A master file that satisfies every check, with one `data` entry.
fn create_master() -> MemoryContainer {
    let mut c = MemoryContainer::new("master.h5", 0);
    c.add_scalar_f32(X_PIXEL_SIZE, 7.5e-5)
        .add_scalar_f32(Y_PIXEL_SIZE, 7.5e-5)
        .add_scalar_u32(X_PIXELS_IN_DETECTOR, COLS as u32)
        .add_scalar_u64(NTRIGGER, 1)
        .add_scalar_u32(NIMAGES, 3)
        .add_dataset(
            PIXEL_MASK,
            ElementType::UInt32,
            &[ROWS, COLS],
            None,
            pattern(ROWS * COLS * 4, 1),
        )
        .add_dataset(
            FLATFIELD,
            ElementType::Float32,
            &[ROWS, COLS],
            None,
            pattern(ROWS * COLS * 4, 2),
        )
        .add_dataset(
            "/entry/data/data",
            ElementType::UInt16,
            &[3, ROWS, COLS],
            Some(&[1, ROWS, COLS]),
            pattern(3 * ROWS * COLS * 2, 3),
        );
    c
}

fn fatal(report: &ValidationReport) -> &h5contract_core::Diagnostic {
    assert!(!report.valid, "expected a failed report: {:#?}", report.diagnostics);
    let last = report.diagnostics.last().unwrap();
    assert_eq!(last.severity, Severity::Fail);
    last
}

#[test]
fn invariant_valid_master_passes() {
    let report = validate(&create_master());

    assert!(report.valid);
    assert!(!report.has_errors());
    assert_eq!(report.superblock_version, Some(0));
    assert_eq!(report.pixel_mask_shape, Some([ROWS, COLS]));
    assert_eq!(report.image_entries, vec!["data"]);
    assert_eq!(report.warnings().count(), 0);

    let last = report.diagnostics.last().unwrap();
    assert_eq!(last.message, "found 1 entry for image data in '/entry/data'");
}

#[test]
fn invariant_single_byte_magic_corruption_fails() {
    for i in 0..8 {
        let mut c = create_master();
        c.header_mut()[i] ^= 0x01;
        let report = validate(&c);
        let last = fatal(&report);
        assert!(last.message.starts_with("not a HDF5 file"), "byte {i}: {}", last.message);
        // Nothing else was looked at.
        assert_eq!(report.diagnostics.len(), 1);
    }
}

#[test]
fn invariant_truncated_header_fails() {
    let c = create_master().with_header(b"\x89HD".to_vec());
    let report = validate(&c);
    assert!(fatal(&report).message.starts_with("not a HDF5 file"));
}

#[test]
fn invariant_unsupported_version_fails() {
    let mut c = create_master();
    c.header_mut()[8] = 1;
    let report = validate(&c);
    assert_eq!(fatal(&report).message, "superblock version 1 not supported");
    assert_eq!(report.superblock_version, None);

    for version in [2u8, 3] {
        let mut c = create_master();
        c.header_mut()[8] = version;
        assert!(validate(&c).valid);
    }
}

#[test]
fn invariant_first_fatal_stops_checks() {
    let mut c = create_master();
    c.remove(DETECTOR_GROUP);
    let report = validate(&c);

    let last = fatal(&report);
    assert_eq!(last.path.as_deref(), Some(DETECTOR_GROUP));
    // Only the signature line precedes the failure.
    assert_eq!(report.diagnostics.len(), 2);
    assert!(report
        .diagnostics
        .iter()
        .all(|d| d.path.as_deref() != Some(X_PIXEL_SIZE)));
}

#[test]
fn invariant_missing_group_names_its_path() {
    for group in [DATA_GROUP, DETECTOR_SPECIFIC_GROUP] {
        let mut c = create_master();
        c.remove(group);
        let report = validate(&c);
        let last = fatal(&report);
        assert_eq!(last.path.as_deref(), Some(group));
        assert_eq!(last.message, format!("'{group}' not found"));
    }
}

#[test]
fn invariant_optional_fields_only_warn() {
    let mut c = create_master();
    c.remove(X_PIXEL_SIZE).remove(Y_PIXEL_SIZE).remove(NTRIGGER);
    let report = validate(&c);

    assert!(report.valid);
    let warnings: Vec<_> = report.warnings().map(|d| d.message.as_str()).collect();
    assert_eq!(warnings.len(), 3);
    assert!(warnings[0].contains("0.0 for qx"));
    assert!(warnings[1].contains("0.0 for qy"));
    assert!(warnings[2].contains("ntrigger = 1"));
}

#[test]
fn invariant_unreadable_optional_field_is_fatal() {
    // Present but not a dataset.
    let mut c = create_master();
    c.remove(X_PIXEL_SIZE).add_group(X_PIXEL_SIZE);
    let report = validate(&c);
    let last = fatal(&report);
    assert_eq!(last.path.as_deref(), Some(X_PIXEL_SIZE));
    assert!(last.message.starts_with("error accessing"), "{}", last.message);
    assert_eq!(report.warnings().count(), 0);

    // Present with a payload that cannot be decoded.
    let mut c = create_master();
    c.add_dataset(NTRIGGER, ElementType::UInt64, &[], None, vec![1, 0]);
    let report = validate(&c);
    let last = fatal(&report);
    assert_eq!(last.path.as_deref(), Some(NTRIGGER));
    assert!(last.message.starts_with("error accessing"), "{}", last.message);
}

#[test]
fn invariant_trigger_count_must_be_positive() {
    for value in [0i64, -1] {
        let mut c = create_master();
        c.add_scalar_i64(NTRIGGER, value);
        let report = validate(&c);
        let last = fatal(&report);
        assert_eq!(last.path.as_deref(), Some(NTRIGGER));
        assert!(last
            .message
            .contains(&format!("must be a positive non-zero integer [value: {value}]")));
    }
}

#[test]
fn invariant_pixel_size_reported_at_stored_width() {
    let report = validate(&create_master());
    let line = report
        .diagnostics
        .iter()
        .find(|d| d.path.as_deref() == Some(X_PIXEL_SIZE))
        .unwrap();
    assert_eq!(line.message, format!("'{X_PIXEL_SIZE}' found [value: 7.5e-5, dtype: float32]"));
}

#[test]
fn invariant_image_count_is_required() {
    let mut c = create_master();
    c.remove(NIMAGES);
    let report = validate(&c);
    assert_eq!(fatal(&report).path.as_deref(), Some(NIMAGES));
}

#[test]
fn invariant_chunked_mask_fails_for_any_type() {
    for element_type in [ElementType::UInt32, ElementType::Int32, ElementType::Float64] {
        let mut c = create_master();
        c.add_zeroed(PIXEL_MASK, element_type, &[ROWS, COLS], Some(&[ROWS, COLS]));
        let report = validate(&c);
        let last = fatal(&report);
        assert!(last.message.contains("may not be chunked"), "{element_type}");
    }
}

#[test]
fn invariant_mask_type_mismatch_warns_unless_negative() {
    let mut c = create_master();
    c.add_zeroed(PIXEL_MASK, ElementType::Int32, &[ROWS, COLS], None);
    let report = validate(&c);
    assert!(report.valid);
    let warning = report.warnings().next().unwrap();
    assert_eq!(warning.path.as_deref(), Some(PIXEL_MASK));
    assert!(warning.notes.iter().any(|n| n.contains("-2 for pixel_mask & 0b11110")));

    let mut values = vec![0i32; ROWS * COLS];
    values[5] = -1;
    let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    c.add_dataset(PIXEL_MASK, ElementType::Int32, &[ROWS, COLS], None, bytes);
    let report = validate(&c);
    assert!(fatal(&report).message.contains("negative values"));
}

#[test]
fn invariant_negative_float_mask_fails() {
    let mut values = vec![0.0f32; ROWS * COLS];
    values[7] = -0.5;
    let mut c = create_master();
    c.add_dataset(
        PIXEL_MASK,
        ElementType::Float32,
        &[ROWS, COLS],
        None,
        values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    );
    let report = validate(&c);

    assert_eq!(report.warnings().next().unwrap().path.as_deref(), Some(PIXEL_MASK));
    assert_eq!(
        fatal(&report).message,
        format!("there are negative values in '{PIXEL_MASK}' [first at flat index 7]")
    );
}

#[test]
fn invariant_image_one_chunk_per_frame() {
    let mut c = create_master();
    c.add_zeroed(PIXEL_MASK, ElementType::UInt32, &[512, 1024], None);
    c.add_zeroed("/entry/data/data", ElementType::UInt16, &[10, 512, 1024], Some(&[1, 512, 1024]));
    assert!(validate(&c).valid);

    c.add_zeroed("/entry/data/data", ElementType::UInt16, &[10, 512, 1024], Some(&[10, 512, 1024]));
    let report = validate(&c);
    assert!(fatal(&report)
        .message
        .contains("expected chunks (1, 512, 1024) but got (10, 512, 1024)"));
}

#[test]
fn invariant_transposed_images_report_both_shapes() {
    let mut c = create_master();
    c.add_zeroed("/entry/data/data", ElementType::UInt16, &[3, COLS, ROWS], Some(&[1, COLS, ROWS]));
    let report = validate(&c);
    let last = fatal(&report);
    assert_eq!(last.message, "expected image data shape (any, 4, 6) but got (3, 6, 4)");
    assert!(last.notes[0].contains("transposed"));
}

#[test]
fn invariant_contiguous_or_flat_images_fail() {
    let mut c = create_master();
    c.add_zeroed("/entry/data/data", ElementType::UInt16, &[3, ROWS, COLS], None);
    assert!(fatal(&validate(&c)).message.contains("must be chunked"));

    let mut c = create_master();
    c.add_zeroed("/entry/data/data", ElementType::UInt16, &[ROWS, COLS], Some(&[ROWS, COLS]));
    assert!(fatal(&validate(&c)).message.contains("expected 3-dimensional data"));
}

#[test]
fn invariant_unrecognized_entries_are_ignored() {
    let mut c = create_master();
    c.add_zeroed("/entry/data/data_000001", ElementType::UInt16, &[2, ROWS, COLS], Some(&[1, ROWS, COLS]));
    c.add_zeroed("/entry/data/data_1", ElementType::UInt16, &[2, 9, 9], None);
    let report = validate(&c);

    assert!(report.valid);
    assert_eq!(report.image_entries, vec!["data", "data_000001"]);
    let warning = report.warnings().next().unwrap();
    assert_eq!(warning.path.as_deref(), Some("/entry/data/data_1"));
    assert_eq!(
        report.diagnostics.last().unwrap().message,
        "found 2 entries for image data in '/entry/data'"
    );
}

#[test]
fn invariant_no_accepted_entries_fails() {
    let mut c = create_master();
    c.remove("/entry/data/data");
    c.add_zeroed("/entry/data/images", ElementType::UInt16, &[1, ROWS, COLS], Some(&[1, ROWS, COLS]));
    let report = validate(&c);
    assert_eq!(
        fatal(&report).message,
        "no entries with correct format found in '/entry/data'"
    );
}

#[test]
fn invariant_missing_flatfield_validates_but_describe_aborts() {
    let mut c = create_master();
    c.remove(FLATFIELD);

    assert!(validate(&c).valid);
    match describe(&c) {
        Err(DescribeError::MissingField(path)) => assert_eq!(path, FLATFIELD),
        other => panic!("expected missing flatfield, got {other:?}"),
    }
}

#[test]
fn invariant_describe_digests_match_engine() {
    let c = create_master();
    let descriptor = describe(&c).unwrap();

    assert_eq!(descriptor.superblock_version, 0);
    assert_eq!((descriptor.height, descriptor.width), (ROWS, COLS));
    assert_eq!(descriptor.float_type.c_type(), "float");
    assert_eq!(descriptor.int_type.c_type(), "uint32_t");
    assert_eq!(descriptor.pixel_type.c_type(), "uint16_t");
    assert_eq!(descriptor.x_pixel_size, 7.5e-5f32 as f64);

    assert_eq!(descriptor.pixel_mask_checksum, lookup3(&pattern(ROWS * COLS * 4, 1), 0));
    assert_eq!(descriptor.flatfield_checksum, lookup3(&pattern(ROWS * COLS * 4, 2), 0));

    let data = pattern(3 * ROWS * COLS * 2, 3);
    let frames: Vec<_> = data.chunks(ROWS * COLS * 2).collect();
    assert_eq!(descriptor.datasets.len(), 1);
    assert_eq!(descriptor.datasets[0].shape, [3, ROWS, COLS]);
    assert_eq!(descriptor.datasets[0].checksum, rolling_lookup3(frames.iter(), 0));

    let reversed = rolling_lookup3(frames.iter().rev(), 0);
    assert_ne!(descriptor.datasets[0].checksum, reversed);

    // Same bytes, same literal.
    assert_eq!(descriptor.render_literal(), describe(&c).unwrap().render_literal());
}

#[test]
fn invariant_describe_rejects_unmapped_types() {
    let mut c = create_master();
    c.add_dataset(X_PIXELS_IN_DETECTOR, ElementType::UInt16, &[], None, vec![6, 0]);
    assert!(matches!(
        describe(&c),
        Err(DescribeError::UnsupportedType { found: ElementType::UInt16, .. })
    ));

    let mut c = create_master();
    c.add_zeroed("/entry/data/data", ElementType::Int32, &[1, ROWS, COLS], Some(&[1, ROWS, COLS]));
    assert!(matches!(describe(&c), Err(DescribeError::UnsupportedType { .. })));
}

fn batch_files() -> HashMap<String, MemoryContainer> {
    let mut broken = create_master();
    broken.remove(NIMAGES);
    HashMap::from([
        ("good.h5".to_string(), create_master()),
        ("broken.h5".to_string(), broken),
    ])
}

fn opener(
    files: &HashMap<String, MemoryContainer>,
) -> impl FnMut(&Path) -> Result<MemoryContainer, String> + '_ {
    move |path: &Path| {
        let key = path.display().to_string();
        files.get(&key).cloned().ok_or_else(|| format!("no such file '{key}'"))
    }
}

#[test]
fn invariant_batch_continues_after_failure() {
    let files = batch_files();
    let mut pipeline = BatchPipeline::new(opener(&files), BatchPolicy::ContinueOnFailure);
    let mut seen = vec![];
    let summary = pipeline.run(&["broken.h5", "missing.h5", "good.h5"], |o| {
        seen.push(o.source().to_string())
    });

    assert_eq!(seen, vec!["broken.h5", "missing.h5", "good.h5"]);
    assert_eq!(summary.failed(), 2);
    assert!(summary.had_open_errors());
    assert!(summary.outcomes[2].is_valid());
    assert!(matches!(summary.outcomes[1], FileOutcome::OpenFailed { .. }));
    assert!(!summary.all_valid());
}

#[test]
fn invariant_batch_stop_on_failure_skips_rest() {
    let files = batch_files();
    let mut pipeline = BatchPipeline::new(opener(&files), BatchPolicy::StopOnFailure);
    let summary = pipeline.run(&["good.h5", "broken.h5", "good.h5"], |_| {});

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.skipped, vec!["good.h5"]);
    assert!(!summary.all_valid());
}

#[test]
fn invariant_describe_file_reports_open_errors() {
    let files = batch_files();
    let mut pipeline = BatchPipeline::new(opener(&files), BatchPolicy::StopOnFailure);
    assert!(matches!(
        pipeline.describe_file(Path::new("missing.h5")),
        Err(PipelineError::Open { .. })
    ));
    assert!(pipeline.describe_file(Path::new("good.h5")).is_ok());
}

#[test]
fn invariant_describe_read_errors_are_not_contract_failures() {
    let io_failure = PipelineError::Describe {
        path: "master.h5".to_string(),
        source: DescribeError::Container(ContainerError::Io(io::Error::new(
            io::ErrorKind::Other,
            "device gone",
        ))),
    };
    assert!(!io_failure.is_contract_failure());

    let header_failure = PipelineError::Describe {
        path: "master.h5".to_string(),
        source: DescribeError::Superblock(SuperblockError::Io(io::Error::new(
            io::ErrorKind::Other,
            "device gone",
        ))),
    };
    assert!(!header_failure.is_contract_failure());

    let files = batch_files();
    let mut pipeline = BatchPipeline::new(opener(&files), BatchPolicy::StopOnFailure);
    assert!(!pipeline
        .describe_file(Path::new("missing.h5"))
        .unwrap_err()
        .is_contract_failure());
    // Readable file, missing field.
    let mut broken = create_master();
    broken.remove(FLATFIELD);
    let mut pipeline = BatchPipeline::new(
        move |_: &Path| Ok::<_, String>(broken.clone()),
        BatchPolicy::StopOnFailure,
    );
    assert!(pipeline
        .describe_file(Path::new("broken.h5"))
        .unwrap_err()
        .is_contract_failure());
}

#[test]
fn invariant_report_serializes_severities() {
    let mut c = create_master();
    c.remove(NTRIGGER);
    let json = serde_json::to_value(validate(&c)).unwrap();

    assert_eq!(json["valid"], true);
    assert_eq!(json["source"], c.source());
    let severities: Vec<_> = json["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["severity"].as_str().unwrap().to_string())
        .collect();
    assert!(severities.contains(&"warn".to_string()));
    assert!(severities.iter().all(|s| s == "ok" || s == "warn"));
}
