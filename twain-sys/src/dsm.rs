//! Runtime loading of the data source manager library.

use crate::DSMENTRYPROC;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::PathBuf;
use windows_sys::Win32::Foundation::FreeLibrary;
use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows_sys::Win32::System::SystemInformation::GetSystemDirectoryW;

/// File name of the extended (2.x) manager.
pub const EXTENDED_DSM: &str = "twaindsm.dll";
/// File name of the legacy (1.x) manager.
pub const LEGACY_DSM: &str = "twain_32.dll";

/// A loaded manager library and its resolved `DSM_Entry`.
pub struct DsmLibrary {
    module: isize,
    entry: DSMENTRYPROC,
    extended: bool,
}

impl DsmLibrary {
    /// Load the manager. The extended library is used when the process is not
    /// 32-bit, `prefer_extended` is set and the library exists in the system
    /// directory; the legacy library otherwise.
    pub fn load(prefer_extended: bool) -> Result<Self, String> {
        let extended = prefer_extended
            && std::mem::size_of::<usize>() != 4
            && system_directory()
                .map(|dir| dir.join(EXTENDED_DSM).exists())
                .unwrap_or(false);
        let name = if extended { EXTENDED_DSM } else { LEGACY_DSM };

        let wide: Vec<u16> = OsStr::new(name)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: `wide` is a NUL-terminated UTF-16 string that outlives the call.
        let module = unsafe { LoadLibraryW(wide.as_ptr()) } as isize;
        if module == 0 {
            return Err(format!("failed to load {}", name));
        }

        // SAFETY: the symbol name is NUL-terminated and `module` is a live handle.
        let proc = unsafe { GetProcAddress(module as _, b"DSM_Entry\0".as_ptr()) };
        let Some(proc) = proc else {
            // SAFETY: `module` was returned by LoadLibraryW above.
            unsafe { FreeLibrary(module as _) };
            return Err(format!("{} does not export DSM_Entry", name));
        };

        // SAFETY: DSM_Entry has the DSMENTRYPROC signature on every manager.
        let entry: DSMENTRYPROC = unsafe { std::mem::transmute(proc) };

        Ok(Self {
            module,
            entry,
            extended,
        })
    }

    /// The resolved entry point.
    pub fn entry(&self) -> DSMENTRYPROC {
        self.entry
    }

    /// Whether the extended manager was loaded.
    pub fn is_extended(&self) -> bool {
        self.extended
    }
}

impl Drop for DsmLibrary {
    fn drop(&mut self) {
        // SAFETY: the handle came from LoadLibraryW and is released once.
        unsafe {
            FreeLibrary(self.module as _);
        }
    }
}

fn system_directory() -> Option<PathBuf> {
    let mut buffer = [0u16; 260];
    // SAFETY: the buffer length passed matches the buffer.
    let len = unsafe { GetSystemDirectoryW(buffer.as_mut_ptr(), buffer.len() as u32) } as usize;
    if len == 0 || len > buffer.len() {
        return None;
    }
    Some(PathBuf::from(String::from_utf16_lossy(&buffer[..len])))
}
