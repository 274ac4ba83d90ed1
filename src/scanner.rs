//! Input image discovery

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Supported image extensions
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Check if a path is a supported image file
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Images under `dir` whose path relative to `dir` matches `pattern`,
/// sorted by path.
///
/// Pattern syntax: `*` and `?` match within one path component, a `**`
/// component matches any number of directories (including none).
pub fn collect_images(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::Config(format!("{} is not a directory", dir.display())));
    }

    let pattern: Vec<&str> = pattern.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
    let max_depth = if pattern.contains(&"**") { usize::MAX } else { pattern.len() };

    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_image(e.path()))
        .filter(|e| {
            let Ok(rel) = e.path().strip_prefix(dir) else { return false };
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
            match_path(&pattern, &parts)
        })
        .map(|e| e.into_path())
        .collect();

    images.sort();
    Ok(images)
}

fn match_path(pattern: &[&str], parts: &[&str]) -> bool {
    match pattern.split_first() {
        None => parts.is_empty(),
        Some((&"**", rest)) => (0..=parts.len()).any(|skip| match_path(rest, &parts[skip..])),
        Some((first, rest)) => match parts.split_first() {
            Some((part, tail)) => match_component(first.as_bytes(), part.as_bytes()) && match_path(rest, tail),
            None => false,
        },
    }
}

/// `*` / `?` wildcard match of one path component.
fn match_component(pattern: &[u8], name: &[u8]) -> bool {
    match (pattern.split_first(), name.split_first()) {
        (None, None) => true,
        (Some((b'*', rest)), _) => {
            match_component(rest, name) || (!name.is_empty() && match_component(pattern, &name[1..]))
        }
        (Some((b'?', rest)), Some((_, tail))) => match_component(rest, tail),
        (Some((p, rest)), Some((n, tail))) => p == n && match_component(rest, tail),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_supported_image() {
        assert!(is_supported_image(Path::new("test.jpg")));
        assert!(is_supported_image(Path::new("test.JPEG")));
        assert!(is_supported_image(Path::new("test.webp")));
        assert!(!is_supported_image(Path::new("test.gif")));
        assert!(!is_supported_image(Path::new("test")));
    }

    #[test]
    fn test_match_component() {
        assert!(match_component(b"*.*", b"a.jpg"));
        assert!(!match_component(b"*.*", b"noext"));
        assert!(match_component(b"car_??.JPG", b"car_01.JPG"));
        assert!(!match_component(b"car_??.JPG", b"car_1.JPG"));
        assert!(match_component(b"*", b""));
    }

    #[test]
    fn test_match_path() {
        assert!(match_path(&["**", "*.*"], &["a.jpg"]));
        assert!(match_path(&["**", "*.*"], &["x", "y", "a.jpg"]));
        assert!(!match_path(&["*.jpg"], &["x", "a.jpg"]));
        assert!(match_path(&["x", "**", "*.jpg"], &["x", "a.jpg"]));
    }

    #[test]
    fn test_collect_images() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        for name in ["b.jpg", "a.PNG", "notes.txt", "sub/c.jpeg"] {
            fs::write(root.join(name), b"").unwrap();
        }

        let all = collect_images(root, "**/*.*").unwrap();
        let names: Vec<PathBuf> = all.iter().map(|p| p.strip_prefix(root).unwrap().to_path_buf()).collect();
        assert_eq!(
            names,
            vec![PathBuf::from("a.PNG"), PathBuf::from("b.jpg"), PathBuf::from("sub/c.jpeg")]
        );

        let top = collect_images(root, "*.jpg").unwrap();
        assert_eq!(top, vec![root.join("b.jpg")]);

        assert!(collect_images(&root.join("missing"), "*").is_err());
    }
}
