//! Thin async wrapper over the `git` binary.
//!
//! Every query shells out through `tokio::process::Command` with the
//! repository root as working directory, so nothing here blocks the runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// Appended to a diff that was cut short.
pub const TRUNCATION_MARKER: &str = "\n\n... [diff truncated]";

// ASCII unit separator between fields of `git show --format`.
const FIELD_SEP: char = '\u{1f}';

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Directory does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("git {command} failed: {stderr}")]
    CommandFailed {
        command: String,
        /// Exit code, `None` when git was killed by a signal or never ran
        status: Option<i32>,
        stderr: String,
    },

    #[error("Failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Not watching a repository")]
    NotWatching,
}

/// A validated repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepoInfo {
    /// Canonical work-tree root, not necessarily the directory that was selected
    pub root: PathBuf,
    pub branch: String,
}

/// Commit metadata as reported by git.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    /// Author date, strict ISO-8601
    pub date: String,
    /// Subject line
    pub message: String,
}

// Exit code git uses for fatal errors such as "not a git repository".
const FATAL_EXIT: i32 = 128;

/// `git <args>` in `dir`, with messages forced to the C locale.
fn git_command(dir: &Path, args: &[&str]) -> Command {
    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("LANGUAGE", "C")
        .kill_on_drop(true);
    command
}

/// Run `git <args>` in `dir` and return trimmed stdout.
pub async fn run_git(dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = git_command(dir, args)
        .output()
        .await
        .map_err(GitError::Spawn)?;

    if !output.status.success() {
        return Err(GitError::CommandFailed {
            command: args.join(" "),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

/// Confirm `dir` lies inside a work tree and resolve its root and branch.
pub async fn validate(dir: &Path) -> Result<RepoInfo, GitError> {
    if !dir.is_dir() {
        return Err(GitError::NotFound(dir.to_path_buf()));
    }

    match run_git(dir, &["rev-parse", "--is-inside-work-tree"]).await {
        Ok(out) if out.trim() == "true" => {}
        Ok(_) => return Err(GitError::NotARepository(dir.to_path_buf())),
        Err(GitError::CommandFailed { status, stderr, .. })
            if is_not_a_repository(status, &stderr) =>
        {
            return Err(GitError::NotARepository(dir.to_path_buf()))
        }
        Err(e) => return Err(e),
    }

    let toplevel = run_git(dir, &["rev-parse", "--show-toplevel"]).await?;
    let root = std::fs::canonicalize(toplevel.trim()).unwrap_or_else(|_| PathBuf::from(toplevel.trim()));
    let branch = current_branch(&root).await?;

    Ok(RepoInfo { root, branch })
}

// Inside an existing directory, `rev-parse` only dies fatally when no
// repository is found; the message check covers older gits with other codes.
fn is_not_a_repository(status: Option<i32>, stderr: &str) -> bool {
    status == Some(FATAL_EXIT) || stderr.contains("not a git repository")
}

/// Current branch name, `HEAD` when detached.
pub async fn current_branch(root: &Path) -> Result<String, GitError> {
    // `rev-parse --abbrev-ref` fails on an unborn branch; symbolic-ref still works there.
    match run_git(root, &["rev-parse", "--abbrev-ref", "HEAD"]).await {
        Ok(branch) => Ok(branch.trim().to_string()),
        Err(GitError::CommandFailed { .. }) => {
            let branch = run_git(root, &["symbolic-ref", "--short", "HEAD"]).await?;
            Ok(branch.trim().to_string())
        }
        Err(e) => Err(e),
    }
}

/// Hash of HEAD, `None` for a repository without commits.
pub async fn head_hash(root: &Path) -> Result<Option<String>, GitError> {
    match run_git(root, &["rev-parse", "--verify", "--quiet", "HEAD"]).await {
        Ok(hash) => Ok(Some(hash.trim().to_string())),
        Err(GitError::CommandFailed { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether `hash` still names a commit in the repository.
pub async fn commit_exists(root: &Path, hash: &str) -> Result<bool, GitError> {
    let spec = format!("{}^{{commit}}", hash);
    match run_git(root, &["cat-file", "-e", &spec]).await {
        Ok(_) => Ok(true),
        Err(GitError::CommandFailed { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Commits reachable from `head` but not from `since`, oldest first.
///
/// With no `since`, every commit reachable from `head`.
pub async fn commits_between(
    root: &Path,
    since: Option<&str>,
    head: &str,
) -> Result<Vec<String>, GitError> {
    let range = match since {
        Some(since) => format!("{}..{}", since, head),
        None => head.to_string(),
    };
    let out = run_git(root, &["rev-list", "--reverse", &range]).await?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

pub async fn commit_info(root: &Path, hash: &str) -> Result<CommitInfo, GitError> {
    let format = format!("--format=%H{0}%an{0}%aI{0}%s", FIELD_SEP);
    let out = run_git(root, &["show", "-s", &format, hash]).await?;
    parse_commit_line(&out).ok_or_else(|| GitError::CommandFailed {
        command: format!("show -s {}", hash),
        status: None,
        stderr: "unexpected output format".to_string(),
    })
}

/// Diff of `hash` against its first parent, or a stat of the root diff
/// for a commit without parents. Truncated to `max_chars`.
pub async fn commit_diff(root: &Path, hash: &str, max_chars: usize) -> Result<String, GitError> {
    let parent = format!("{}^", hash);
    let diff = if commit_exists(root, &parent).await? {
        run_git(root, &["diff", &parent, hash]).await?
    } else {
        run_git(root, &["show", "--stat", "--format=", "--root", hash]).await?
    };
    Ok(truncate_diff(diff, max_chars))
}

/// The `limit` most recent commits on HEAD, newest first.
pub async fn recent_commits(root: &Path, limit: usize) -> Result<Vec<CommitInfo>, GitError> {
    if head_hash(root).await?.is_none() {
        return Ok(Vec::new());
    }

    let format = format!("--format=%H{0}%an{0}%aI{0}%s", FIELD_SEP);
    let count = format!("-n{}", limit);
    let out = run_git(root, &["log", &count, &format]).await?;
    Ok(out.lines().filter_map(parse_commit_line).collect())
}

fn parse_commit_line(line: &str) -> Option<CommitInfo> {
    let mut fields = line.trim_end_matches('\n').splitn(4, FIELD_SEP);
    Some(CommitInfo {
        hash: fields.next()?.trim().to_string(),
        author: fields.next()?.to_string(),
        date: fields.next()?.to_string(),
        message: fields.next()?.to_string(),
    })
}

/// Cut `diff` to at most `max_chars` characters and append the marker.
pub fn truncate_diff(diff: String, max_chars: usize) -> String {
    match diff.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut truncated = diff[..cut].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => diff,
    }
}
