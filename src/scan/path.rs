//! Relative-path normalization for map keys.

use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Build the canonical map key for a node: the path relative to the scan
/// root, with forward slashes on every platform and Unicode normalized to
/// NFC so that the same name always produces the same key.
pub fn rel_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut key = String::new();
    for component in rel.components() {
        if !key.is_empty() {
            key.push('/');
        }
        let name: String = component.as_os_str().to_string_lossy().nfc().collect();
        key.push_str(&name);
    }
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Canonicalize a scan root, resolving symlinks and `..` without the
/// Windows `\\?\` prefix noise.
pub fn canonical_root(root: &Path) -> std::io::Result<std::path::PathBuf> {
    dunce::canonicalize(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rel_key_uses_forward_slashes() {
        let root = PathBuf::from("/base");
        let path = root.join("sub").join("file.txt");
        assert_eq!(rel_key(&root, &path).unwrap(), "sub/file.txt");
    }

    #[test]
    fn root_itself_has_no_key() {
        let root = PathBuf::from("/base");
        assert_eq!(rel_key(&root, &root), None);
    }

    #[test]
    fn unicode_is_nfc_normalized() {
        let root = PathBuf::from("/base");
        let composed = root.join("caf\u{e9}.txt");
        let decomposed = root.join("cafe\u{301}.txt");
        assert_eq!(
            rel_key(&root, &composed).unwrap(),
            rel_key(&root, &decomposed).unwrap()
        );
    }

    #[test]
    fn outside_root_has_no_key() {
        let root = PathBuf::from("/base");
        assert_eq!(rel_key(&root, &PathBuf::from("/other/f")), None);
    }
}
