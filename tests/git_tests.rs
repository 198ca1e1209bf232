use ksu_forge::kernel::git::{GitError, GitManager};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Create a local repository with one commit; returns its branch name.
fn init_source(path: &Path) -> String {
    let repo = git2::Repository::init(path).expect("Failed to init source repo");
    fs::write(path.join("Makefile"), "VERSION = 5\nPATCHLEVEL = 10\nSUBLEVEL = 200\n")
        .expect("Failed to write Makefile");

    let mut index = repo.index().expect("Failed to get index");
    index.add_path(Path::new("Makefile")).expect("Failed to add file");
    index.write().expect("Failed to write index");
    let tree_id = index.write_tree().expect("Failed to write tree");
    let tree = repo.find_tree(tree_id).expect("Failed to find tree");
    let sig = git2::Signature::now("Test User", "test@example.com").expect("Failed to create signature");
    repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
        .expect("Failed to commit");

    let head = repo.head().expect("Failed to read HEAD");
    head.shorthand().expect("HEAD has no name").to_string()
}

#[test]
fn test_clone_branch_from_local_repo() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("source");
    let clone = temp.path().join("clone");
    let branch = init_source(&source);

    let manager = GitManager::clone_branch(source.to_str().unwrap(), &branch, &clone)
        .expect("Failed to clone repository");

    assert!(clone.join(".git").exists());
    assert!(clone.join("Makefile").is_file());
    assert_eq!(manager.repo_path(), clone);
    assert_eq!(manager.head_commit().unwrap().len(), 40);
}

#[test]
fn test_clone_missing_branch_fails() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("source");
    init_source(&source);

    let result = GitManager::clone_branch(source.to_str().unwrap(), "android99-9.99", temp.path().join("clone"));
    assert!(matches!(result, Err(GitError::Clone(_))));
}

#[test]
fn test_clone_missing_remote_fails() {
    let temp = tempdir().unwrap();
    let missing = temp.path().join("does-not-exist");

    let result = GitManager::clone_branch(missing.to_str().unwrap(), "main", temp.path().join("clone"));
    assert!(result.is_err());
}

#[test]
fn test_open_non_repository() {
    let temp = tempdir().unwrap();
    assert!(matches!(GitManager::open(temp.path()), Err(GitError::Repository(_))));
}
