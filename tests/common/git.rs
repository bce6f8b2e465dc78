//! Git testing utilities

use anyhow::Result;
use std::path::Path;
use std::process::Command;

/// Sets up a git repository with user config
pub fn setup_git_repo(path: &Path) -> Result<()> {
    let init_result = Command::new("git")
        .args(["init", "--quiet"])
        .current_dir(path)
        .output()?;

    if !init_result.status.success() {
        anyhow::bail!("Git not available - skipping test");
    }

    for (key, value) in [
        ("user.name", "Test User"),
        ("user.email", "test@example.com"),
        ("commit.gpgsign", "false"),
    ] {
        Command::new("git")
            .args(["config", key, value])
            .current_dir(path)
            .output()?;
    }

    Ok(())
}

/// Creates a test commit in the repository
pub fn create_test_commit(path: &Path, file_name: &str, content: &str, message: &str) -> Result<()> {
    std::fs::write(path.join(file_name), content)?;

    Command::new("git")
        .args(["add", file_name])
        .current_dir(path)
        .output()?;

    let commit_result = Command::new("git")
        .args(["commit", "--quiet", "-m", message])
        .current_dir(path)
        .output()?;

    if !commit_result.status.success() {
        anyhow::bail!(
            "Failed to create commit: {}",
            String::from_utf8_lossy(&commit_result.stderr)
        );
    }

    Ok(())
}

/// Creates one upstream repository per name under `parent_dir`, each with an
/// initial commit, so `{parent_dir}/{repo}` works as a clone URL
pub fn create_upstreams(parent_dir: &Path, names: &[&str]) -> Result<()> {
    for name in names {
        let repo_path = parent_dir.join(name);
        std::fs::create_dir_all(&repo_path)?;
        setup_git_repo(&repo_path)?;
        create_test_commit(&repo_path, "README.md", &format!("# {name}"), "Initial commit")?;
    }
    Ok(())
}

/// Commit message of HEAD in `path`
pub fn head_message(path: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["log", "-1", "--format=%s"])
        .current_dir(path)
        .output()?;
    if !output.status.success() {
        anyhow::bail!("git log failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Checks if git is available in the system
pub fn is_git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
