//! Property-based tests for run identifiers, exit decoding and argument merging.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used)]

use std::path::Path;

use proptest::prelude::*;

use guestrun_cli::domain::exit_status::{GuestStatus, decode_exit_status};
use guestrun_cli::domain::guest_log::{
    PAYLOAD_END_MARKER, PAYLOAD_START_MARKER, extract_payload_output,
};
use guestrun_cli::domain::vm_profile::merge_emulator_args;
use guestrun_cli::domain::workspace::{RunId, WorkspacePaths};

// ============================================================================
// RunId / WorkspacePaths
// ============================================================================

proptest! {
    /// Any `run-` + 16 hex id parses and derives paths that embed its suffix.
    #[test]
    fn prop_run_id_paths_embed_suffix(hex in "[0-9a-f]{16}") {
        let id = RunId::parse(&format!("run-{hex}")).expect("valid id");
        let paths = WorkspacePaths::derive(Path::new("/tmp"), &id);
        for path in paths.all() {
            let name = path.file_name().expect("name").to_string_lossy().into_owned();
            prop_assert!(name.contains(&hex), "{name} lacks {hex}");
        }
    }

    /// Distinct ids never map to overlapping paths.
    #[test]
    fn prop_distinct_ids_never_alias(a in "[0-9a-f]{16}", b in "[0-9a-f]{16}") {
        prop_assume!(a != b);
        let root = Path::new("/var/tmp");
        let pa = WorkspacePaths::derive(root, &RunId::parse(&format!("run-{a}")).expect("a"));
        let pb = WorkspacePaths::derive(root, &RunId::parse(&format!("run-{b}")).expect("b"));
        for x in pa.all() {
            for y in pb.all() {
                prop_assert_ne!(x, y);
            }
        }
    }

    /// Ids with the wrong length or alphabet are rejected.
    #[test]
    fn prop_malformed_ids_rejected(hex in "[0-9a-z]{1,15}") {
        let id = format!("run-{hex}");
        prop_assert!(RunId::parse(&id).is_err());
    }
}

#[test]
fn test_generated_ids_are_unique() {
    let ids: std::collections::HashSet<_> = (0..100)
        .map(|_| RunId::generate().as_str().to_string())
        .collect();
    assert_eq!(ids.len(), 100, "duplicate run ids generated");
}

#[test]
fn test_generated_ids_round_trip_through_parse() {
    let id = RunId::generate();
    assert_eq!(RunId::parse(id.as_str()).expect("parse"), id);
}

// ============================================================================
// Exit status decoding
// ============================================================================

proptest! {
    /// The debug-exit encoding `(code << 1) | 1` always decodes back to `code`.
    #[test]
    fn prop_debug_exit_round_trips(code in 0i32..=255) {
        prop_assert_eq!(decode_exit_status(Some((code << 1) | 1)), GuestStatus::Exited(code));
    }

    /// Decoded codes never exceed the raw status.
    #[test]
    fn prop_decoded_code_is_bounded(raw in 0i32..=255) {
        let status = decode_exit_status(Some(raw));
        prop_assert!(status.code() <= raw);
        prop_assert!(status.code() >= 0);
    }
}

#[test]
fn test_signal_death_is_indeterminate() {
    let status = decode_exit_status(None);
    assert_eq!(status, GuestStatus::Indeterminate);
    assert_eq!(status.code(), GuestStatus::SENTINEL);
    assert_eq!(status.process_exit_code(), 125);
}

// ============================================================================
// Emulator argument merging
// ============================================================================

fn defaults() -> Vec<String> {
    ["-m", "2048", "-smp", "4", "-nographic", "-drive", "file=x,format=raw"]
        .map(String::from)
        .to_vec()
}

proptest! {
    /// Without overrides the defaults pass through untouched.
    #[test]
    fn prop_empty_overrides_are_identity(extra in proptest::collection::vec("[a-z]{1,8}", 0..4)) {
        let mut base = defaults();
        base.extend(extra);
        prop_assert_eq!(merge_emulator_args(&base, &[]), base);
    }

    /// An overridden flag appears exactly once, with the operator's value.
    #[test]
    fn prop_override_replaces_default(mem in 1u32..65536) {
        let overrides = vec!["-m".to_string(), mem.to_string()];
        let merged = merge_emulator_args(&defaults(), &overrides);
        let positions: Vec<_> = merged.iter().enumerate().filter(|(_, a)| *a == "-m").collect();
        prop_assert_eq!(positions.len(), 1);
        let (i, _) = positions[0];
        prop_assert_eq!(&merged[i + 1], &mem.to_string());
        prop_assert!(merged.ends_with(&overrides));
    }
}

// ============================================================================
// Payload output extraction
// ============================================================================

proptest! {
    /// Text between the markers is recovered regardless of surrounding noise.
    #[test]
    fn prop_bracketed_output_is_recovered(
        before in "[a-z ]{0,20}\n",
        body in "([a-z0-9 ]{0,20}\n){0,5}",
        after in "[a-z ]{0,20}",
    ) {
        let log = format!("{before}{PAYLOAD_START_MARKER}\n{body}{PAYLOAD_END_MARKER}\n{after}");
        prop_assert_eq!(extract_payload_output(&log), body);
    }
}
