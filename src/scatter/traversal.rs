//! Directory traversal used by producers
//!
//! Producers only need "walk a tree, skip what cannot be read, tell me the
//! files in each directory". [`LocalTraversal`] provides that on top of
//! `walkdir`; other backends (an NFS client, an object store listing) can
//! implement [`Traversal`] instead.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

/// Files found directly inside one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// The directory
    pub dir: PathBuf,

    /// Names of the non-directory entries in `dir`, as the filesystem
    /// reports them
    pub files: Vec<OsString>,
}

impl DirListing {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: Vec::new(),
        }
    }

    /// Full paths of the files in this listing
    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.files.iter().map(|name| self.dir.join(name))
    }
}

/// Walks a directory tree, one listing per directory
pub trait Traversal: Send + Sync {
    /// Walk `root`. Unreadable subtrees are skipped silently.
    fn walk<'a>(&'a self, root: &'a Path) -> Box<dyn Iterator<Item = DirListing> + 'a>;
}

/// Local filesystem traversal
#[derive(Debug, Clone, Default)]
pub struct LocalTraversal {
    follow_links: bool,
    max_depth: Option<usize>,
}

impl LocalTraversal {
    /// Traversal that does not follow symlinks and has no depth limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend into symlinked directories
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Only collect files from directories at most `depth` levels below the root
    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }
}

impl Traversal for LocalTraversal {
    fn walk<'a>(&'a self, root: &'a Path) -> Box<dyn Iterator<Item = DirListing> + 'a> {
        let mut walker = WalkDir::new(root)
            .follow_links(self.follow_links)
            // Files before subdirectories, so a directory's files arrive
            // contiguously right after the directory itself.
            .sort_by_key(|entry| entry.file_type().is_dir());

        if let Some(depth) = self.max_depth {
            // Files of a directory at `depth` sit at `depth + 1`
            walker = walker.max_depth(depth.saturating_add(1));
        }

        Box::new(Listings {
            inner: walker.into_iter(),
            pending: None,
            max_dir_depth: self.max_depth,
        })
    }
}

/// Groups walkdir's entry stream into per-directory listings
struct Listings {
    inner: walkdir::IntoIter,
    pending: Option<DirListing>,
    max_dir_depth: Option<usize>,
}

impl Iterator for Listings {
    type Item = DirListing;

    fn next(&mut self) -> Option<DirListing> {
        loop {
            let entry = match self.inner.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    trace!(error = %e, "Skipping unreadable entry");
                    continue;
                }
                None => return self.pending.take(),
            };

            if entry.file_type().is_dir() {
                // Subdirectories one level past the cap are never listed
                if self.max_dir_depth.is_some_and(|max| entry.depth() > max) {
                    continue;
                }
                if let Some(done) = self.pending.replace(DirListing::new(entry.into_path())) {
                    return Some(done);
                }
            } else if let Some(listing) = self.pending.as_mut() {
                listing.files.push(entry.file_name().to_os_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn collect(root: &Path, traversal: &LocalTraversal) -> Vec<DirListing> {
        let mut listings: Vec<DirListing> = traversal.walk(root).collect();
        for l in &mut listings {
            l.files.sort();
        }
        listings.sort_by(|a, b| a.dir.cmp(&b.dir));
        listings
    }

    #[test]
    fn test_walk_groups_files_by_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("sub/b.h5"), b"b").unwrap();
        fs::write(root.join("sub/c.h5"), b"c").unwrap();
        fs::write(root.join("sub/deeper/d.h5"), b"d").unwrap();
        fs::write(root.join("z.txt"), b"z").unwrap();

        let listings = collect(root, &LocalTraversal::new());

        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].dir, root);
        assert_eq!(listings[0].files, vec!["a.txt", "z.txt"]);
        assert_eq!(listings[1].dir, root.join("sub"));
        assert_eq!(listings[1].files, vec!["b.h5", "c.h5"]);
        assert_eq!(listings[2].dir, root.join("sub/deeper"));
        assert_eq!(listings[2].files, vec!["d.h5"]);

        let paths: Vec<PathBuf> = listings[1].paths().collect();
        assert_eq!(paths, vec![root.join("sub/b.h5"), root.join("sub/c.h5")]);
    }

    #[test]
    fn test_max_depth() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("one/two")).unwrap();
        fs::write(root.join("top.txt"), b"").unwrap();
        fs::write(root.join("one/mid.txt"), b"").unwrap();
        fs::write(root.join("one/two/low.txt"), b"").unwrap();

        let listings = collect(root, &LocalTraversal::new().max_depth(Some(1)));
        let files: Vec<&OsString> = listings.iter().flat_map(|l| l.files.iter()).collect();
        assert_eq!(files, vec!["top.txt", "mid.txt"]);

        // `one/two` is past the cap and gets no listing of its own
        let dirs: Vec<&Path> = listings.iter().map(|l| l.dir.as_path()).collect();
        assert_eq!(dirs, vec![root, root.join("one").as_path()]);
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert_eq!(LocalTraversal::new().walk(&missing).count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_listed_as_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("real")).unwrap();
        fs::write(root.join("real/f.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let listings = collect(root, &LocalTraversal::new());
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].files, vec!["link"]);
    }

    #[test]
    fn test_max_depth_zero_lists_root_only() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir(root.join("c")).unwrap();
        fs::write(root.join("top.txt"), b"").unwrap();

        let listings = collect(root, &LocalTraversal::new().max_depth(Some(0)));
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].dir, root);
        assert_eq!(listings[0].files, vec!["top.txt"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_kept_intact() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let name = std::ffi::OsStr::from_bytes(b"bad\xff.h5");
        fs::write(dir.path().join(name), b"x").unwrap();

        let listings = collect(dir.path(), &LocalTraversal::new());
        assert_eq!(listings[0].files, vec![name.to_os_string()]);
        assert!(listings[0].paths().all(|p| p.exists()));
    }
}
