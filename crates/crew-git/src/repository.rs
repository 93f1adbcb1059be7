//! Bare clones and per-branch worktrees for dispatched tasks.
//!
//! Layout under the work directory:
//!
//! ```text
//! <workdir>/repositories/<hash8>            bare clone of the remote
//! <workdir>/worktrees/<hash8>/<branch>      checkout used by the agent
//! ```
//!
//! `hash8` is the first eight hex digits of the SHA-256 of the trimmed URL,
//! so the same remote always maps to the same directories.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::command::GitCli;
use crate::error::GitError;

const ORIGIN_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Resolves a working directory for a repository branch.
pub trait WorktreeProvider: Send + Sync {
    fn worktree_path(&self, repo_url: &str, branch: &str) -> Result<PathBuf, GitError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryManager {
    git: GitCli,
    repos_dir: PathBuf,
    worktrees_dir: PathBuf,
}

pub fn repository_hash(url: &str) -> String {
    let digest = Sha256::digest(url.trim().as_bytes());
    let mut out = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

impl RepositoryManager {
    pub fn new(git: GitCli, workdir: impl AsRef<Path>) -> Self {
        let workdir = workdir.as_ref();
        Self {
            git,
            repos_dir: workdir.join("repositories"),
            worktrees_dir: workdir.join("worktrees"),
        }
    }

    pub fn repository_path(&self, url: &str) -> PathBuf {
        self.repos_dir.join(repository_hash(url))
    }

    /// Clone on first use, make sure remote-tracking refs are fetched, then
    /// fetch with pruning. Returns the bare repository path.
    pub fn sync_repository(&self, url: &str) -> Result<PathBuf, GitError> {
        let repo_path = self.repository_path(url);
        if !repo_path.exists() {
            create_dir(&self.repos_dir)?;
            tracing::info!(url = url.trim(), path = %repo_path.display(), "cloning bare repository");
            self.git.run(
                &self.repos_dir,
                [
                    OsStr::new("clone"),
                    OsStr::new("--bare"),
                    OsStr::new(url.trim()),
                    repo_path.as_os_str(),
                ],
            )?;
        }

        self.ensure_fetch_refspec(&repo_path)?;
        self.git.run(&repo_path, ["fetch", "--prune", "origin"])?;
        Ok(repo_path)
    }

    fn ensure_fetch_refspec(&self, repo_path: &Path) -> Result<(), GitError> {
        let configured = self
            .git
            .probe(repo_path, ["config", "--get-all", "remote.origin.fetch"])?;
        if !configured {
            self.git.run(
                repo_path,
                ["config", "--add", "remote.origin.fetch", ORIGIN_REFSPEC],
            )?;
        }
        Ok(())
    }

    /// Remote-tracking branch names without the `origin/` prefix.
    fn remote_branches(&self, repo_path: &Path) -> Result<Vec<String>, GitError> {
        let refs = self.git.lines(
            repo_path,
            [
                "for-each-ref",
                "--format=%(refname)",
                "refs/remotes/origin",
            ],
        )?;
        Ok(refs
            .iter()
            .filter_map(|line| line.strip_prefix("refs/remotes/origin/"))
            .filter(|name| *name != "HEAD")
            .map(str::to_string)
            .collect())
    }

    fn origin_default_branch(
        &self,
        repo_path: &Path,
        remote: &[String],
    ) -> Result<Option<String>, GitError> {
        match self
            .git
            .run(repo_path, ["symbolic-ref", "refs/remotes/origin/HEAD"])
        {
            Ok(stdout) => {
                if let Some(name) = stdout.trim().strip_prefix("refs/remotes/origin/") {
                    return Ok(Some(name.to_string()));
                }
            }
            Err(err) if err.is_exit_failure() => {}
            Err(err) => return Err(err),
        }

        Ok(["main", "master"]
            .into_iter()
            .find(|candidate| remote.iter().any(|name| name == *candidate))
            .map(str::to_string))
    }

    fn ensure_local_branch(&self, repo_path: &Path, branch: &str) -> Result<(), GitError> {
        let local_ref = format!("refs/heads/{branch}");
        if self
            .git
            .probe(repo_path, ["show-ref", "--verify", "--quiet", local_ref.as_str()])?
        {
            return Ok(());
        }

        let remote = self.remote_branches(repo_path)?;
        let start = if remote.iter().any(|name| name == branch) {
            branch.to_string()
        } else if let Some(default) = self.origin_default_branch(repo_path, &remote)? {
            default
        } else if let Some(first) = remote.first() {
            first.clone()
        } else {
            return Err(GitError::NoRemoteBranches {
                path: repo_path.to_path_buf(),
                branch: branch.to_string(),
            });
        };

        let start_ref = format!("origin/{start}");
        tracing::info!(branch, start = %start_ref, "creating local branch");
        self.git.run(
            repo_path,
            ["branch", "--track", branch, start_ref.as_str()],
        )?;
        Ok(())
    }
}

impl WorktreeProvider for RepositoryManager {
    fn worktree_path(&self, repo_url: &str, branch: &str) -> Result<PathBuf, GitError> {
        let branch = branch.trim();
        if branch.is_empty()
            || !self.git.probe(
                &std::env::temp_dir(),
                ["check-ref-format", "--branch", branch],
            )?
        {
            return Err(GitError::InvalidBranch {
                branch: branch.to_string(),
            });
        }

        let repo_path = self.sync_repository(repo_url)?;
        self.ensure_local_branch(&repo_path, branch)?;

        let hash = repository_hash(repo_url);
        let worktree = self.worktrees_dir.join(&hash).join(branch);
        if worktree.exists() {
            return Ok(worktree);
        }

        if let Some(parent) = worktree.parent() {
            create_dir(parent)?;
        }
        tracing::info!(branch, path = %worktree.display(), "adding worktree");
        self.git.run(
            &repo_path,
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                worktree.as_os_str(),
                OsStr::new(branch),
            ],
        )?;
        Ok(worktree)
    }
}

fn create_dir(path: &Path) -> Result<(), GitError> {
    fs::create_dir_all(path).map_err(|source| GitError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::process::Command;

    use super::{repository_hash, RepositoryManager, WorktreeProvider};
    use crate::command::GitCli;
    use crate::error::GitError;

    fn run_git<I, S>(cwd: &Path, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new("git")
            .args(["-c", "user.name=crew", "-c", "user.email=crew@example.com"])
            .args(args)
            .current_dir(cwd)
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn init_origin(root: &Path) -> PathBuf {
        let origin = root.join("origin");
        fs::create_dir_all(&origin).expect("create origin");
        run_git(&origin, ["init"]);
        run_git(&origin, ["symbolic-ref", "HEAD", "refs/heads/main"]);
        fs::write(origin.join("README.md"), "hello\n").expect("write readme");
        run_git(&origin, ["add", "README.md"]);
        run_git(&origin, ["commit", "-m", "initial"]);
        origin
    }

    #[test]
    fn repository_hash_is_eight_hex_digits_and_ignores_surrounding_whitespace() {
        let hash = repository_hash("https://github.com/acme/web.git");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, repository_hash("  https://github.com/acme/web.git\n"));
        assert_ne!(hash, repository_hash("https://github.com/acme/api.git"));
    }

    #[test]
    fn worktree_path_clones_and_checks_out_existing_branch() {
        let root = tempfile::tempdir().expect("tempdir");
        let origin = init_origin(root.path());
        let url = origin.to_string_lossy().into_owned();
        let manager = RepositoryManager::new(GitCli::default(), root.path().join("work"));

        let path = manager.worktree_path(&url, "main").expect("worktree");

        assert_eq!(
            path,
            root.path()
                .join("work/worktrees")
                .join(repository_hash(&url))
                .join("main")
        );
        assert_eq!(
            fs::read_to_string(path.join("README.md")).expect("read"),
            "hello\n"
        );
        assert!(manager.repository_path(&url).join("HEAD").exists());

        let again = manager.worktree_path(&url, "main").expect("second call");
        assert_eq!(again, path);
    }

    #[test]
    fn unknown_branch_starts_from_default_branch() {
        let root = tempfile::tempdir().expect("tempdir");
        let origin = init_origin(root.path());
        let url = origin.to_string_lossy().into_owned();
        let manager = RepositoryManager::new(GitCli::default(), root.path().join("work"));

        let path = manager
            .worktree_path(&url, "crew/1a2b3c4d")
            .expect("worktree");

        assert!(path.ends_with("crew/1a2b3c4d"));
        assert!(path.join("README.md").exists());
    }

    #[test]
    fn invalid_branch_name_is_rejected_before_cloning() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = RepositoryManager::new(GitCli::default(), root.path().join("work"));

        let err = manager
            .worktree_path("https://example.invalid/repo.git", "bad..name")
            .expect_err("invalid branch");
        assert!(matches!(err, GitError::InvalidBranch { .. }));
        assert!(!root.path().join("work/repositories").exists());
    }

    #[test]
    fn unreachable_remote_fails_with_command_error() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = RepositoryManager::new(GitCli::default(), root.path().join("work"));

        let missing = root.path().join("no-such-origin");
        let err = manager
            .worktree_path(&missing.to_string_lossy(), "main")
            .expect_err("clone should fail");
        assert!(matches!(err, GitError::Failed { .. }));
    }
}
