//! Project type detection.
//!
//! Inspects only the top-level file names of a source tree (no recursive
//! scan) and classifies it by fixed priority: node, python, java-maven,
//! java-gradle, go. No side effects.

use std::path::Path;

use crate::engine::models::StackType;
use crate::errors::EngineError;

/// Classify the project at `path` into a supported stack type.
///
/// Priority order is fixed: a Node manifest wins over everything else, a
/// Python manifest requires a recognized entry file (`app.py` or `main.py`)
/// to count as python at all.
pub fn detect(path: &Path) -> Result<StackType, EngineError> {
    let names = top_level_names(path)?;
    classify(&names).ok_or_else(|| EngineError::UnsupportedProject {
        reason: unsupported_reason(&names, path),
    })
}

fn top_level_names(path: &Path) -> Result<Vec<String>, EngineError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Pure classification over a set of top-level file names. Returns `None`
/// when no stack matches.
fn classify(names: &[String]) -> Option<StackType> {
    let has = |n: &str| names.iter().any(|f| f == n);

    if has("package.json") {
        return Some(StackType::Node);
    }
    if has("requirements.txt") {
        if has("app.py") || has("main.py") {
            return Some(StackType::Python);
        }
        return None;
    }
    if has("pom.xml") {
        return Some(StackType::JavaMaven);
    }
    if has("build.gradle") || has("build.gradle.kts") {
        return Some(StackType::JavaGradle);
    }
    if has("go.mod") {
        return Some(StackType::Go);
    }
    None
}

fn unsupported_reason(names: &[String], path: &Path) -> String {
    if names.iter().any(|f| f == "requirements.txt") {
        format!(
            "requirements.txt without a recognized entry file (app.py or main.py) in {}",
            path.display()
        )
    } else {
        format!("no recognized project manifest in {}", path.display())
    }
}
