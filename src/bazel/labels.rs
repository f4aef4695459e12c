// src/bazel/labels.rs

//! Mapping query labels to filesystem paths.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

/// `@repo//pkg:file` and the canonical `@@repo//pkg:file` form.
static EXTERNAL_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^@@?([^/]*)//(.*)$").ok());

pub const OVERRIDE_REPOSITORY_FLAG: &str = "--override_repository=";

/// Turn the package-relative part of a label (`pkg:sub/file`, `:file`)
/// into a relative path.
fn label_to_relative(rest: &str) -> PathBuf {
    rest.trim_start_matches("//")
        .replacen(':', "/", 1)
        .split('/')
        .filter(|part| !part.is_empty())
        .collect()
}

/// Split an external label into repository name and the part after `//`.
pub fn parse_external(label: &str) -> Option<(&str, &str)> {
    let caps = EXTERNAL_LABEL.as_ref()?.captures(label)?;
    let repo = caps.get(1)?.as_str();
    let rest = caps.get(2)?.as_str();
    Some((repo, rest))
}

/// Resolve a source-file label to an absolute path.
///
/// Returns `None` for `//external...` pseudo-labels and for external
/// repositories that are not locally available.
pub fn label_to_path(
    label: &str,
    workspace: &Path,
    local_repos: &HashMap<String, PathBuf>,
) -> Option<PathBuf> {
    if label.starts_with("//external") {
        return None;
    }

    if label.starts_with('@') {
        let (repo, rest) = parse_external(label)?;
        if repo.is_empty() {
            // `@//pkg:file` is the main repository.
            return Some(workspace.join(label_to_relative(rest)));
        }
        let root = local_repos
            .get(repo)
            .or_else(|| local_repos.get(&format!("{repo}+")))?;
        return Some(root.join(label_to_relative(rest)));
    }

    if label.starts_with("//") {
        return Some(workspace.join(label_to_relative(label)));
    }

    debug!(label, "skipping label with unknown form");
    None
}

/// Repositories whose sources live on the local disk and should be watched.
///
/// These are the symlinks under `<output_base>/external` that do not point
/// into the tool's install base, plus any `--override_repository=name=path`
/// in `bazel_args` (which win).
pub fn local_repository_paths(
    info: &HashMap<String, String>,
    bazel_args: &[String],
) -> HashMap<String, PathBuf> {
    let mut repos = HashMap::new();

    if let Some(output_base) = info.get("output_base") {
        let install_base = info.get("install_base").map(String::as_str).unwrap_or("");
        let external = Path::new(output_base).join("external");
        match fs::read_dir(&external) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let is_link = entry
                        .file_type()
                        .map(|t| t.is_symlink())
                        .unwrap_or(false);
                    if !is_link {
                        continue;
                    }
                    let Ok(target) = fs::read_link(entry.path()) else {
                        continue;
                    };
                    if !install_base.is_empty() && target.starts_with(install_base) {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    repos.insert(name, target);
                }
            }
            Err(err) => debug!(
                dir = %external.display(),
                error = %err,
                "no external repository directory"
            ),
        }
    }

    for arg in bazel_args {
        let Some(spec) = arg.strip_prefix(OVERRIDE_REPOSITORY_FLAG) else {
            continue;
        };
        match spec.split_once('=') {
            Some((name, path)) if !name.is_empty() && !path.is_empty() => {
                repos.insert(name.to_string(), PathBuf::from(path));
            }
            _ => warn!(arg = %arg, "ignoring malformed repository override"),
        }
    }

    repos
}
