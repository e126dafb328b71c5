//! Layer boundary lint for the sync service.
//!
//! The pipelines in `backend/src/domain` see Kaspi, amoCRM, Telegram, and
//! PostgreSQL only through ports. This lint parses every file under the
//! `domain`, `inbound`, and `outbound` trees and reports each path that
//! reaches across a boundary the [`RULES`] table forbids: sibling layers,
//! the `app` and `settings` composition modules, adapter crates, and (for
//! the domain) process-level std modules such as `std::env`.
//!
//! Run it with `cargo run -p architecture-lint`.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use syn::visit::Visit;
use thiserror::Error;

/// Library name of the linted crate, as written in absolute paths.
const CRATE_NAME: &str = "kaspi_amo_sync";

/// Top-level directories under `backend/src` that are linted.
const LAYER_DIRS: [&str; 3] = ["domain", "inbound", "outbound"];

/// One layer and what it may not reach.
#[derive(Debug, Clone, Copy)]
pub struct LayerRule {
    /// Directory under `backend/src` the rule applies to.
    pub layer: &'static str,
    /// Sibling modules of the crate root.
    pub modules: &'static [&'static str],
    /// External crates.
    pub crates: &'static [&'static str],
    /// `std` paths, matched by prefix (`["env"]` covers `std::env::var`).
    pub std_paths: &'static [&'static [&'static str]],
}

/// Boundary rules, one per linted layer.
pub static RULES: [LayerRule; 3] = [
    LayerRule {
        layer: "domain",
        modules: &["app", "inbound", "outbound", "settings"],
        crates: &[
            "actix_rt",
            "actix_web",
            "clap",
            "diesel",
            "diesel_async",
            "diesel_migrations",
            "ortho_config",
            "reqwest",
            "url",
        ],
        std_paths: &[&["env"], &["fs"], &["net"]],
    },
    LayerRule {
        layer: "inbound",
        modules: &["app", "outbound", "settings"],
        crates: &["diesel", "diesel_async", "diesel_migrations", "reqwest"],
        std_paths: &[],
    },
    LayerRule {
        layer: "outbound",
        modules: &["app", "inbound", "settings"],
        crates: &["actix_rt", "actix_web", "clap", "ortho_config"],
        std_paths: &[],
    },
];

/// A boundary crossing found in one file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    /// File path relative to `backend/src`.
    pub file: PathBuf,
    /// Which rule the path breaks.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

/// Why a lint run did not pass.
#[derive(Debug, Error)]
pub enum LintError {
    /// The source tree could not be read.
    #[error("reading sources failed: {0}")]
    Io(#[from] io::Error),
    /// A file is not valid Rust.
    #[error("{} could not be parsed: {message}", .file.display())]
    Parse {
        /// File path relative to `backend/src`.
        file: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// A source was handed in under a path no rule covers.
    #[error("{} is outside the linted layers", .0.display())]
    OutsideLayers(PathBuf),
    /// Every crossing found, sorted by file.
    #[error("{}", render_violations(.0))]
    Violations(Vec<Violation>),
}

fn render_violations(violations: &[Violation]) -> String {
    let mut text = format!("{} layer boundary violation(s):", violations.len());
    for violation in violations {
        text.push_str("\n- ");
        text.push_str(&violation.to_string());
    }
    text
}

/// A Rust source file and its path relative to `backend/src`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintSource {
    /// Path relative to `backend/src`, e.g. `domain/health.rs`.
    pub file: PathBuf,
    /// Rust source text.
    pub contents: String,
}

impl LintSource {
    /// Pair a relative path with its source text.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            contents: contents.into(),
        }
    }
}

/// Lint `backend_dir/src`.
///
/// # Errors
///
/// I/O and parse failures, or [`LintError::Violations`] listing every
/// crossing found.
pub fn lint_backend(backend_dir: &Path) -> Result<(), LintError> {
    let sources = read_layer_sources(&backend_dir.join("src"))?;
    lint_sources(&sources)
}

/// Lint in-memory sources.
///
/// # Errors
///
/// As [`lint_backend`], plus [`LintError::OutsideLayers`] for a path that
/// does not start with a linted layer directory.
pub fn lint_sources(sources: &[LintSource]) -> Result<(), LintError> {
    let mut violations = BTreeSet::new();
    for source in sources {
        let rule = rule_for(&source.file)
            .ok_or_else(|| LintError::OutsideLayers(source.file.clone()))?;
        let parsed = syn::parse_file(&source.contents).map_err(|err| LintError::Parse {
            file: source.file.clone(),
            message: err.to_string(),
        })?;
        let mut paths = PathCollector::default();
        paths.visit_file(&parsed);
        for message in paths.iter().filter_map(|path| crossing(rule, path)) {
            violations.insert(Violation {
                file: source.file.clone(),
                message,
            });
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(LintError::Violations(violations.into_iter().collect()))
    }
}

fn rule_for(file: &Path) -> Option<&'static LayerRule> {
    let first = file.components().next()?.as_os_str().to_str()?;
    RULES.iter().find(|rule| rule.layer == first)
}

/// Describe how `path` breaks `rule`, if it does.
fn crossing(rule: &LayerRule, path: &[String]) -> Option<String> {
    let (head, rest) = path.split_first()?;
    match head.as_str() {
        "crate" | "self" | "super" | CRATE_NAME => {
            let module = rest
                .iter()
                .find(|segment| !matches!(segment.as_str(), "self" | "super"))?;
            rule.modules
                .contains(&module.as_str())
                .then(|| format!("{} must not depend on crate::{module}", rule.layer))
        }
        "std" | "core" => rule
            .std_paths
            .iter()
            .find(|prefix| starts_with(rest, prefix))
            .map(|prefix| format!("{} must not use std::{}", rule.layer, prefix.join("::"))),
        // A lone segment is a local binding, not a crate path.
        _ if rest.is_empty() => None,
        name => rule
            .crates
            .contains(&name)
            .then(|| format!("{} must not depend on the `{name}` crate", rule.layer)),
    }
}

fn starts_with(path: &[String], prefix: &[&str]) -> bool {
    path.len() >= prefix.len() && path.iter().zip(prefix).all(|(a, b)| a == b)
}

/// Every path written in a file, with `use` trees flattened.
#[derive(Default)]
struct PathCollector(BTreeSet<Vec<String>>);

impl PathCollector {
    fn iter(&self) -> impl Iterator<Item = &[String]> {
        self.0.iter().map(Vec::as_slice)
    }

    fn flatten_use(&mut self, root: &syn::UseTree) {
        let mut pending = vec![(root, Vec::<String>::new())];
        while let Some((tree, mut prefix)) = pending.pop() {
            match tree {
                syn::UseTree::Path(path) => {
                    prefix.push(path.ident.to_string());
                    pending.push((&path.tree, prefix));
                }
                syn::UseTree::Name(name) => {
                    prefix.push(name.ident.to_string());
                    self.0.insert(prefix);
                }
                syn::UseTree::Rename(rename) => {
                    prefix.push(rename.ident.to_string());
                    self.0.insert(prefix);
                }
                syn::UseTree::Glob(_) => {
                    self.0.insert(prefix);
                }
                syn::UseTree::Group(group) => {
                    pending.extend(group.items.iter().map(|item| (item, prefix.clone())));
                }
            }
        }
    }
}

impl<'ast> Visit<'ast> for PathCollector {
    fn visit_path(&mut self, node: &'ast syn::Path) {
        let segments: Vec<String> = node
            .segments
            .iter()
            .map(|segment| segment.ident.to_string())
            .collect();
        if !segments.is_empty() {
            self.0.insert(segments);
        }
        syn::visit::visit_path(self, node);
    }

    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        self.flatten_use(&node.tree);
    }
}

fn read_layer_sources(src_dir: &Path) -> Result<Vec<LintSource>, LintError> {
    let mut pending: Vec<PathBuf> = LAYER_DIRS
        .iter()
        .map(|layer| src_dir.join(layer))
        .filter(|dir| dir.is_dir())
        .collect();
    let mut sources = Vec::new();
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                let relative = path
                    .strip_prefix(src_dir)
                    .map_or_else(|_| path.clone(), Path::to_path_buf);
                sources.push(LintSource::new(relative, fs::read_to_string(&path)?));
            }
        }
    }
    sources.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(sources)
}

#[cfg(test)]
mod tests;
