//! Noise filtering for live-side scans.
//!
//! The reference side is never filtered: the extracted snapshot is taken as
//! authoritative, and filtering only the live side keeps local VCS metadata
//! and scratch files out of the diff.

/// Version-control metadata directories pruned together with everything
/// under them.
const VCS_DIRS: &[&str] = &[".git", ".svn", ".hg"];

/// Returns true when a directory (and its whole subtree) should be excluded
/// from a filtered scan.
pub fn is_garbage_dir(name: &str) -> bool {
    if VCS_DIRS.contains(&name) || name == "__pycache__" {
        return true;
    }
    name.to_ascii_lowercase().ends_with(".tmp")
}

/// Returns true when a file should be excluded from a filtered scan.
pub fn is_garbage_file(name: &str) -> bool {
    if name == ".gitignore" {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".tmp") || lower.ends_with(".log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vcs_dirs_are_garbage() {
        assert!(is_garbage_dir(".git"));
        assert!(is_garbage_dir(".svn"));
        assert!(is_garbage_dir(".hg"));
        assert!(is_garbage_dir("__pycache__"));
        assert!(!is_garbage_dir("src"));
    }

    #[test]
    fn tmp_suffix_is_case_insensitive() {
        assert!(is_garbage_dir("scratch.TMP"));
        assert!(is_garbage_file("upload.TMP"));
        assert!(is_garbage_file("debug.Log"));
    }

    #[test]
    fn regular_files_pass() {
        assert!(!is_garbage_file("readme.md"));
        assert!(!is_garbage_file("mod.dll"));
        assert!(is_garbage_file(".gitignore"));
    }
}
