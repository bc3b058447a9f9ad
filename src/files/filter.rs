//! Relevance filter for raw filesystem notifications.
//!
//! Three stages, in order:
//! 1. ignore list over path segments (dependency dirs, build output, VCS and
//!    IDE metadata, lock files) plus caller-supplied patterns
//! 2. allow-list of source/config/doc extensions and convention file names
//! 3. privacy tagging: `sensitive` never rejects, it only marks the file

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Built-in ignore patterns, always active.
pub const DEFAULT_IGNORE: &[&str] = &[
    // dependencies
    "node_modules",
    "bower_components",
    "vendor",
    "Pods",
    ".venv",
    "venv",
    "__pycache__",
    // build output
    "target",
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    ".svelte-kit",
    ".turbo",
    ".parcel-cache",
    ".cache",
    "coverage",
    "DerivedData",
    ".gradle",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    // vcs
    ".git",
    ".hg",
    ".svn",
    // lock files
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Cargo.lock",
    "Gemfile.lock",
    "poetry.lock",
    "composer.lock",
    // ide / os metadata
    ".idea",
    ".vscode",
    ".DS_Store",
    "Thumbs.db",
];

const ALLOWED_EXTENSIONS: &[&str] = &[
    // source
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rb", "go", "java", "kt", "kts", "swift",
    "c", "h", "cc", "cpp", "hpp", "cs", "fs", "php", "scala", "lua", "dart", "ex", "exs", "erl",
    "hs", "ml", "clj", "zig", "nim", "r", "jl", "sol", "vue", "svelte", "astro", "elm",
    // shell / query / schema
    "sh", "bash", "zsh", "fish", "ps1", "sql", "graphql", "gql", "proto",
    // web
    "html", "htm", "css", "scss", "sass", "less",
    // config
    "json", "jsonc", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml", "env", "tf", "hcl",
    "nix", "gradle", "cmake", "lock",
    // docs
    "md", "mdx", "txt", "rst", "adoc",
    // keys and certificates (reported, always sensitive)
    "pem", "key", "crt", "cer", "p12", "pfx",
];

/// Extensionless (or oddly-suffixed) files that matter anyway. Matched on the
/// part of the name before the first `.`, so `Dockerfile.dev` counts too.
const CONVENTION_FILES: &[&str] = &[
    "Makefile",
    "makefile",
    "GNUmakefile",
    "Dockerfile",
    "Containerfile",
    "Justfile",
    "justfile",
    "Rakefile",
    "Gemfile",
    "Procfile",
    "Vagrantfile",
    "Jenkinsfile",
    "Brewfile",
    "Podfile",
    "LICENSE",
    "README",
    "CODEOWNERS",
];

/// Dotfiles that are configuration rather than noise.
const DOTFILE_CONFIGS: &[&str] = &[
    ".gitignore",
    ".gitattributes",
    ".dockerignore",
    ".editorconfig",
    ".npmrc",
    ".nvmrc",
    ".prettierrc",
    ".eslintrc",
    ".babelrc",
    ".tool-versions",
];

const SENSITIVE_EXTENSIONS: &[&str] = &["pem", "key", "crt", "cer", "p12", "pfx", "jks", "keystore", "gpg", "asc"];

const SENSITIVE_DIRS: &[&str] = &["secrets", "secret", "credentials", "private", ".ssh", ".aws", ".gnupg"];

const SENSITIVE_NAME_PARTS: &[&str] = &["secret", "credential", "password", "passwd", "id_rsa", "id_dsa", "id_ecdsa", "id_ed25519"];

/// Env templates are meant to be committed.
const ENV_TEMPLATES: &[&str] = &[".env.example", ".env.sample", ".env.template", ".env.dist"];

/// How a file changed within one debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Renamed,
    Deleted,
}

impl ChangeType {
    /// Fold a later notification for the same path into the pending one.
    ///
    /// `None` means the changes cancel out (created then deleted in one window).
    pub fn merge(self, next: ChangeType) -> Option<ChangeType> {
        use ChangeType::*;
        match (self, next) {
            (Created, Deleted) => None,
            (Created, _) => Some(Created),
            // Delete + create is how many editors save.
            (Deleted, Created) => Some(Modified),
            (Renamed, Modified) => Some(Renamed),
            (_, next) => Some(next),
        }
    }
}

/// What the filter knows about a relevant path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub extension: String,
    pub sensitive: bool,
}

/// Ignore list (built-in plus custom) and the relevance pipeline.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    custom: Vec<String>,
}

impl PathFilter {
    pub fn new(custom: Vec<String>) -> Self {
        let mut filter = Self::default();
        filter.set_custom(custom);
        filter
    }

    /// Replace the custom patterns. Blank entries are dropped, trailing `/` is stripped.
    pub fn set_custom(&mut self, patterns: Vec<String>) {
        self.custom = patterns
            .into_iter()
            .map(|p| p.trim().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }

    pub fn custom_patterns(&self) -> &[String] {
        &self.custom
    }

    fn patterns(&self) -> impl Iterator<Item = &str> {
        DEFAULT_IGNORE
            .iter()
            .copied()
            .chain(self.custom.iter().map(String::as_str))
    }

    /// Whether any segment of `relative` hits the ignore list.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let segments = segments(relative);
        let last = segments.len().saturating_sub(1);
        segments.iter().enumerate().any(|(i, segment)| {
            let is_dir = i < last;
            self.patterns()
                .any(|pattern| segment_matches(segment, pattern, is_dir))
        })
    }

    /// Run the whole pipeline. `None` when the path is not relevant.
    pub fn classify(&self, relative: &Path) -> Option<Classification> {
        let name = relative.file_name()?.to_string_lossy();
        if self.is_ignored(relative) || !is_allowed(&name) {
            return None;
        }
        Some(Classification {
            extension: extension_of(&name),
            sensitive: is_sensitive(relative),
        })
    }
}

fn segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Exact match for any segment. Directory segments also match a pattern
/// followed by `-`, `_` or `.` (`build` matches `build-cache/` but not
/// `builder/`). A trailing `*` makes the pattern a plain prefix everywhere.
fn segment_matches(segment: &str, pattern: &str, is_dir: bool) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        return !prefix.is_empty() && segment.starts_with(prefix);
    }
    if segment == pattern {
        return true;
    }
    is_dir
        && segment
            .strip_prefix(pattern)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| matches!(c, '-' | '_' | '.'))
}

/// Extension allow-list plus convention and config dotfiles.
pub fn is_allowed(name: &str) -> bool {
    if is_env_file(name) || DOTFILE_CONFIGS.contains(&name) {
        return true;
    }
    let stem = name.split('.').next().unwrap_or(name);
    if CONVENTION_FILES.contains(&stem) {
        return true;
    }
    let extension = extension_of(name);
    !extension.is_empty() && ALLOWED_EXTENSIONS.contains(&extension.as_str())
}

/// Lowercase extension without the dot. Env files report `env`.
pub fn extension_of(name: &str) -> String {
    if is_env_file(name) {
        return "env".to_string();
    }
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_env_file(name: &str) -> bool {
    name == ".env" || name.starts_with(".env.")
}

/// Whether a file's content must stay out of anything generated downstream.
pub fn is_sensitive(relative: &Path) -> bool {
    let segments = segments(relative);
    let Some((name, dirs)) = segments.split_last() else {
        return false;
    };

    if dirs
        .iter()
        .any(|d| SENSITIVE_DIRS.contains(&d.to_lowercase().as_str()))
    {
        return true;
    }

    if is_env_file(name) {
        return !ENV_TEMPLATES.contains(&name.as_str());
    }

    let extension = extension_of(name);
    if SENSITIVE_EXTENSIONS.contains(&extension.as_str()) {
        return true;
    }

    let lower = name.to_lowercase();
    SENSITIVE_NAME_PARTS.iter().any(|part| lower.contains(part))
}

/// `"5 files changed (3 .rs, 1 .md, +1 more)"`.
///
/// Categories are extensions ordered by count, ties alphabetical; at most
/// `max_categories` are named.
pub fn summarize<'a>(extensions: impl IntoIterator<Item = &'a str>, max_categories: usize) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut total = 0;
    for ext in extensions {
        *counts.entry(ext).or_default() += 1;
        total += 1;
    }

    // BTreeMap iteration is alphabetical; a stable sort keeps that for ties.
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let mut parts: Vec<String> = ranked
        .iter()
        .take(max_categories)
        .map(|(ext, count)| {
            if ext.is_empty() {
                format!("{} other", count)
            } else {
                format!("{} .{}", count, ext)
            }
        })
        .collect();
    if ranked.len() > max_categories {
        parts.push(format!("+{} more", ranked.len() - max_categories));
    }

    let noun = if total == 1 { "file" } else { "files" };
    format!("{} {} changed ({})", total, noun, parts.join(", "))
}
