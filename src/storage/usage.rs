//! Folder sizes and filesystem statistics

use std::collections::HashMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;
use crate::types::ModelType;

use super::StorageLayout;

/// Snapshot of disk usage for the layout tree
#[derive(Clone, Debug, Default)]
pub struct StorageUsage {
    /// Capacity of the filesystem containing the layout root, in bytes
    pub total_bytes: u64,
    /// Free space available to this process, in bytes
    pub free_bytes: u64,
    /// Bytes used per category directory, keyed by directory name.
    ///
    /// LORA and LoCon share the `loras` directory and TextualInversion maps
    /// to `embeddings`, so the per-type aggregation happens in the routing
    /// itself.
    pub per_category_bytes: HashMap<String, u64>,
}

/// Recursive byte sum of everything under `path`.
///
/// A missing path counts as zero; unreadable entries are skipped.
pub fn folder_size(path: &Path) -> u64 {
    if path.is_file() {
        return std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    }
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

impl StorageLayout {
    /// Recursive byte sum of a path inside the tree.
    pub fn folder_size(&self, path: &Path) -> u64 {
        folder_size(path)
    }

    /// Filesystem totals plus per-category byte counts.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the filesystem statistics call fails
    /// (e.g. the root does not exist).
    pub fn usage(&self) -> Result<StorageUsage> {
        let (total_bytes, free_bytes) = filesystem_stats(self.root())?;

        let mut per_category_bytes = HashMap::new();
        for dir_name in ModelType::all_dirs() {
            let category = self.root().join(dir_name);
            if category.is_dir() {
                per_category_bytes.insert((*dir_name).to_string(), folder_size(&category));
            }
        }

        Ok(StorageUsage {
            total_bytes,
            free_bytes,
            per_category_bytes,
        })
    }

    /// Free space available on the filesystem holding the layout root.
    pub fn available_space(&self) -> Result<u64> {
        let (_, free) = filesystem_stats(self.root())?;
        Ok(free)
    }
}

/// Query `(total, available)` bytes for the filesystem containing `path`,
/// via statvfs(3).
#[cfg(unix)]
fn filesystem_stats(path: &Path) -> std::io::Result<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let mut stat = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: `c_path` is NUL-terminated and outlives the call, and
    // `stat.as_mut_ptr()` points at writable storage of the exact struct the
    // libc binding declares. statvfs either fills the whole struct and
    // returns 0, or returns -1 with errno set.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: rc == 0, so every field was written by the kernel.
    let stat = unsafe { stat.assume_init() };

    // Both counts scale by the fragment size. f_blocks spans the whole
    // filesystem; f_bavail is the share an unprivileged writer gets, which
    // is the number the pre-flight disk check needs.
    let fragment = stat.f_frsize as u64;
    Ok((
        (stat.f_blocks as u64).saturating_mul(fragment),
        (stat.f_bavail as u64).saturating_mul(fragment),
    ))
}

/// Query `(total, available)` bytes for the filesystem containing `path`,
/// via GetDiskFreeSpaceExW.
#[cfg(windows)]
fn filesystem_stats(path: &Path) -> std::io::Result<(u64, u64)> {
    use std::os::windows::ffi::OsStrExt;
    use winapi::um::fileapi::GetDiskFreeSpaceExW;

    let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    wide.push(0);

    // The API yields three counters; quota-blind total-free is received but
    // not part of this function's contract.
    let mut caller_available: u64 = 0;
    let mut total: u64 = 0;
    let mut total_free: u64 = 0;
    // SAFETY: `wide` carries its NUL terminator and stays alive across the
    // call; each out-pointer targets a distinct, aligned local u64. On a
    // zero (failure) return none of the outputs are read.
    let ok = unsafe {
        GetDiskFreeSpaceExW(
            wide.as_ptr(),
            &mut caller_available as *mut u64 as *mut _,
            &mut total as *mut u64 as *mut _,
            &mut total_free as *mut u64 as *mut _,
        )
    };
    if ok == 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok((total, caller_available))
}

#[cfg(not(any(unix, windows)))]
fn filesystem_stats(_path: &Path) -> std::io::Result<(u64, u64)> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no filesystem statistics source on this platform",
    ))
}
