// Local filesystem adapter - File system operations on the host

use std::io;
use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::{CompressionError, ErrorKind};
use crate::ports::FsPort;

/// Filesystem adapter backed by the local disk
#[derive(Debug, Clone, Default)]
pub struct LocalFsAdapter;

impl LocalFsAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Nearest existing ancestor, so space can be queried before a directory exists
    fn existing_ancestor(path: &Path) -> &Path {
        path.ancestors()
            .find(|candidate| !candidate.as_os_str().is_empty() && candidate.exists())
            .unwrap_or_else(|| Path::new("."))
    }
}

#[async_trait]
impl FsPort for LocalFsAdapter {
    async fn file_exists(&self, path: &Path) -> Result<bool, CompressionError> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CompressionError::from_io(&err, path, ErrorKind::InvalidInput)),
        }
    }

    async fn check_readable(&self, path: &Path) -> Result<(), CompressionError> {
        tokio::fs::File::open(path)
            .await
            .map(|_| ())
            .map_err(|err| CompressionError::from_io(&err, path, ErrorKind::InvalidInput))
    }

    async fn get_file_size(&self, path: &Path) -> Result<u64, CompressionError> {
        tokio::fs::metadata(path)
            .await
            .map(|metadata| metadata.len())
            .map_err(|err| CompressionError::from_io(&err, path, ErrorKind::Unknown))
    }

    async fn create_directory(&self, path: &Path) -> Result<(), CompressionError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|err| CompressionError::from_io(&err, path, ErrorKind::OutputPathError))
    }

    async fn get_available_space(&self, path: &Path) -> Result<u64, CompressionError> {
        let target = Self::existing_ancestor(path).to_path_buf();
        tokio::task::spawn_blocking(move || {
            available_space(&target)
                .map_err(|err| CompressionError::from_io(&err, &target, ErrorKind::Unknown))
        })
        .await
        .map_err(|err| CompressionError::with_detail(ErrorKind::Unknown, err.to_string()))?
    }
}

#[cfg(unix)]
fn available_space(path: &Path) -> io::Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
    #[allow(clippy::unnecessary_cast)]
    let bytes = stat.blocks_available() as u64 * stat.fragment_size() as u64;
    Ok(bytes)
}

#[cfg(windows)]
fn available_space(path: &Path) -> io::Result<u64> {
    use std::os::windows::ffi::OsStrExt;
    use winapi::shared::ntdef::ULARGE_INTEGER;
    use winapi::um::fileapi::GetDiskFreeSpaceExW;

    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    // SAFETY: `wide` is NUL-terminated and outlives the call; ULARGE_INTEGER is plain data.
    unsafe {
        let mut free: ULARGE_INTEGER = std::mem::zeroed();
        let ok = GetDiskFreeSpaceExW(
            wide.as_ptr(),
            &mut free,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(*free.QuadPart())
    }
}

#[cfg(not(any(unix, windows)))]
fn available_space(_path: &Path) -> io::Result<u64> {
    Ok(u64::MAX)
}
