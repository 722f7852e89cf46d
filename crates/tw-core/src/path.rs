//! Path normalization.
//!
//! The watcher keys its registry by path, so every path is turned into one
//! absolute, lexically normalized form before it is compared or registered.
//! Normalization is purely lexical: symlinks are not resolved and the path
//! does not need to exist (a deleted path must still map to its old key).

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use path_absolutize::Absolutize;

/// Resolves `path` against the current directory, removing `.` segments and
/// folding `..` segments into their parent.
///
/// `..` directly under the root is dropped.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use tw_core::absolutize;
///
/// assert_eq!(absolutize(Utf8Path::new("/a/./b/../c")).unwrap(), "/a/c");
/// assert_eq!(absolutize(Utf8Path::new("/../a")).unwrap(), "/a");
/// ```
///
/// # Errors
///
/// Fails if the path is empty, the current directory cannot be read, or the
/// result is not valid UTF-8.
pub fn absolutize(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    if path.as_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot resolve an empty path",
        ));
    }

    let resolved = path.as_std_path().absolutize()?.into_owned();
    Utf8PathBuf::from_path_buf(resolved).map_err(|p| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("resolved path is not valid UTF-8: {}", p.display()),
        )
    })
}
