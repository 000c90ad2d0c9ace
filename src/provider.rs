//! Resolves a request URL against the configured document root.
//!
//! Grounded on the teacher's `DataProvider` (`src/http_provider.rs`), whose
//! `sanitize_path` + `starts_with` guard is the right idea but checks an
//! *uncanonicalised* joined path, which a `..` segment can still defeat
//! through symlinks or simple lexical tricks depending on platform. This
//! version canonicalises both the root (once, at construction) and the
//! resolved candidate before comparing, which is the only way `starts_with`
//! is a real containment check.

use std::fs::{self, File};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// Escapes the document root, or is otherwise not well-formed.
    BadRequest,
    NotFound,
    Forbidden,
    Internal,
}

pub struct Resolved {
    pub file: File,
    pub len: u64,
}

pub struct Provider {
    root: PathBuf,
}

impl Provider {
    /// `root` must already exist and be a directory; the CLI layer checks
    /// this before construction (§10.1) as a fast-fail convenience, but the
    /// canonicalisation here is load-bearing, not just a nicety.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        Ok(Provider { root })
    }

    /// `url_path` is the origin-form path from the request line, already
    /// stripped of any absolute-URI scheme/authority by the parser. Always
    /// begins with `/`.
    pub fn resolve(&self, url_path: &str) -> Result<Resolved, ResolveError> {
        let relative = url_path.trim_start_matches('/');
        let candidate = self.root.join(relative);

        let canonical = match candidate.canonicalize() {
            Ok(p) => p,
            Err(_) => return Err(ResolveError::NotFound),
        };

        if !canonical.starts_with(&self.root) {
            return Err(ResolveError::BadRequest);
        }

        let metadata = match fs::metadata(&canonical) {
            Ok(m) => m,
            Err(_) => return Err(ResolveError::NotFound),
        };

        if metadata.is_dir() {
            return Err(ResolveError::BadRequest);
        }

        if metadata.mode() & 0o004 == 0 {
            return Err(ResolveError::Forbidden);
        }

        let file = File::open(&canonical).map_err(|_| ResolveError::Internal)?;
        Ok(Resolved { file, len: metadata.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::Permissions;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn make_root() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn serves_world_readable_file() {
        let dir = make_root();
        let path = dir.path().join("index.html");
        std::fs::write(&path, b"hi").unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o644)).unwrap();

        let provider = Provider::new(dir.path()).unwrap();
        let resolved = provider.resolve("/index.html").unwrap();
        assert_eq!(resolved.len, 2);
    }

    #[test]
    fn root_request_is_bad_request_not_index_html() {
        let dir = make_root();
        let path = dir.path().join("index.html");
        std::fs::write(&path, b"hi").unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o644)).unwrap();

        let provider = Provider::new(dir.path()).unwrap();
        assert_eq!(provider.resolve("/").unwrap_err(), ResolveError::BadRequest);
    }

    #[test]
    fn traversal_outside_root_is_bad_request() {
        let dir = make_root();
        let outside = tempfile::NamedTempFile::new().unwrap();
        writeln!(outside.as_file(), "secret").unwrap();
        std::fs::set_permissions(outside.path(), Permissions::from_mode(0o644)).unwrap();

        let provider = Provider::new(dir.path()).unwrap();
        // Even if the target exists and is readable, a path that canonicalises
        // outside the root must be rejected.
        let escaped = format!("/../{}", outside.path().file_name().unwrap().to_str().unwrap());
        assert_eq!(provider.resolve(&escaped).unwrap_err(), ResolveError::BadRequest);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = make_root();
        let provider = Provider::new(dir.path()).unwrap();
        assert_eq!(provider.resolve("/nope.html").unwrap_err(), ResolveError::NotFound);
    }

    #[test]
    fn unreadable_file_is_forbidden() {
        let dir = make_root();
        let path = dir.path().join("secret.html");
        std::fs::write(&path, b"shh").unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o600)).unwrap();

        let provider = Provider::new(dir.path()).unwrap();
        assert_eq!(provider.resolve("/secret.html").unwrap_err(), ResolveError::Forbidden);
    }

    #[test]
    fn directory_is_bad_request() {
        let dir = make_root();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let provider = Provider::new(dir.path()).unwrap();
        assert_eq!(provider.resolve("/sub").unwrap_err(), ResolveError::BadRequest);
    }
}
