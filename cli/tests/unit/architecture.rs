//! Structural tests for layer boundary enforcement.
//!
//! These tests scan source files to verify that domain stays pure, that
//! application services only see ports, and that infra never reaches up
//! into the presentation layer.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-comment lines outside `#[cfg(test)]` blocks, with 1-based line numbers.
fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut tracker = CfgTestTracker::new();
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            let skip = in_test || trimmed.starts_with("//") || trimmed.starts_with('*');
            (!skip).then(|| (i + 1, line.to_string()))
        })
        .collect()
}

fn src_dir(parts: &[&str]) -> PathBuf {
    parts
        .iter()
        .fold(Path::new(env!("CARGO_MANIFEST_DIR")).join("src"), |p, part| {
            p.join(part)
        })
}

/// Every production line under `dir` containing one of `forbidden`.
fn find_violations(dir: &Path, forbidden: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();
        for (lineno, line) in production_lines(&file) {
            for pattern in forbidden {
                if line.contains(pattern) {
                    violations.push(format!("{rel}:{lineno}: `{pattern}`: {}", line.trim()));
                }
            }
        }
    }
    violations
}

#[test]
fn domain_is_free_of_io_and_outer_layers() {
    let violations = find_violations(
        &src_dir(&["domain"]),
        &[
            "crate::application",
            "crate::infra",
            "crate::commands",
            "crate::output",
            "crate::app::",
            "tokio",
            "std::fs",
            "std::process",
            "println!",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay pure:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_depends_only_on_domain_and_ports() {
    let violations = find_violations(
        &src_dir(&["application"]),
        &[
            "crate::infra",
            "crate::commands",
            "crate::output",
            "crate::app::",
            "println!",
            "eprintln!",
        ],
    );
    assert!(
        violations.is_empty(),
        "application/ must only use domain and ports:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = find_violations(
        &src_dir(&["infra"]),
        &["crate::commands", "crate::output", "crate::app::", "println!", "eprintln!"],
    );
    assert!(
        violations.is_empty(),
        "infra/ must not reach into commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn command_runner_is_only_built_by_commands() {
    let mut violations = find_violations(&src_dir(&["application"]), &["TokioCommandRunner"]);
    violations.extend(find_violations(&src_dir(&["domain"]), &["TokioCommandRunner"]));
    assert!(
        violations.is_empty(),
        "services must receive a CommandRunner, not build one:\n{}",
        violations.join("\n")
    );
}
