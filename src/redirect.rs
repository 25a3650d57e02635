//! Descriptor primitives behind [`FileDescriptors`](crate::CaptureKind::FileDescriptors)
//! capture: duplicate, redirect, close.

use std::fs::File;
use std::io;

use crate::Descriptor;

#[cfg(all(unix, feature = "libc_on_unix"))]
mod platform {
    use super::*;
    use std::os::fd::AsRawFd;

    /// An owned descriptor referring to the same open file as `file`.
    pub fn descriptor_of(file: &File) -> io::Result<SavedDescriptor> {
        duplicate(file.as_raw_fd())
    }

    pub fn sync_std_handle(_slot: Descriptor) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(all(windows, feature = "libc_on_windows", feature = "windows-sys"))]
mod platform {
    use super::*;
    use libc::{get_osfhandle, open_osfhandle};
    use std::os::windows::io::{FromRawHandle, IntoRawHandle, OwnedHandle};
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::System::Console::{SetStdHandle, STD_ERROR_HANDLE, STD_OUTPUT_HANDLE};

    const STDOUT: Descriptor = 1;
    const STDERR: Descriptor = 2;

    /// A CRT descriptor owning a duplicate of `file`'s handle.
    pub fn descriptor_of(file: &File) -> io::Result<SavedDescriptor> {
        let handle = file.try_clone()?.into_raw_handle();
        let fd = unsafe { open_osfhandle(handle as isize, 0) };
        if fd < 0 {
            let error = io::Error::last_os_error();
            drop(unsafe { OwnedHandle::from_raw_handle(handle) });
            return Err(error);
        }
        Ok(SavedDescriptor { fd })
    }

    /// Rust's stdout/stderr write to the process standard handles, not to CRT
    /// descriptors, so keep those in step with fds 1 and 2.
    pub fn sync_std_handle(slot: Descriptor) -> io::Result<()> {
        let std_handle = match slot {
            STDOUT => STD_OUTPUT_HANDLE,
            STDERR => STD_ERROR_HANDLE,
            _ => return Ok(()),
        };
        let handle = unsafe { get_osfhandle(slot) };
        if handle == -1 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { SetStdHandle(std_handle, handle as HANDLE) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(any(all(unix, feature = "libc_on_unix"), all(windows, feature = "libc_on_windows", feature = "windows-sys")))]
mod common {
    use super::*;
    use libc::{close, dup, dup2};

    /// A descriptor this crate owns and closes on drop.
    #[derive(Debug)]
    pub struct SavedDescriptor {
        pub(super) fd: Descriptor,
    }

    impl SavedDescriptor {
        pub fn as_raw(&self) -> Descriptor {
            self.fd
        }

        /// Refers to nothing; redirecting onto it fails.
        #[cfg(test)]
        pub(crate) fn invalid() -> Self {
            SavedDescriptor { fd: -1 }
        }
    }

    impl Drop for SavedDescriptor {
        fn drop(&mut self) {
            unsafe {
                close(self.fd);
            }
        }
    }

    pub fn duplicate(fd: Descriptor) -> io::Result<SavedDescriptor> {
        let result = unsafe { dup(fd) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(SavedDescriptor { fd: result })
    }

    /// Make `src` refer to whatever `dst` refers to.
    pub fn redirect_fd_to_fd(src: Descriptor, dst: Descriptor) -> io::Result<()> {
        let result = unsafe { dup2(dst, src) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        crate::redirect::platform::sync_std_handle(src)
    }

    /// Push out anything the C runtime is still buffering.
    pub fn flush_c_streams() -> io::Result<()> {
        let result = unsafe { libc::fflush(std::ptr::null_mut()) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(not(any(all(unix, feature = "libc_on_unix"), all(windows, feature = "libc_on_windows", feature = "windows-sys"))))]
mod common {
    use super::*;

    #[derive(Debug)]
    pub struct SavedDescriptor {
        fd: Descriptor,
    }

    impl SavedDescriptor {
        pub fn as_raw(&self) -> Descriptor {
            self.fd
        }
    }

    fn unsupported() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "descriptor redirection is not supported in this build")
    }

    pub fn duplicate(_fd: Descriptor) -> io::Result<SavedDescriptor> {
        Err(unsupported())
    }

    pub fn descriptor_of(_file: &File) -> io::Result<SavedDescriptor> {
        Err(unsupported())
    }

    pub fn redirect_fd_to_fd(_src: Descriptor, _dst: Descriptor) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn flush_c_streams() -> io::Result<()> {
        Ok(())
    }
}

/// Whether this build can redirect descriptors at all.
pub const AVAILABLE: bool = cfg!(any(all(unix, feature = "libc_on_unix"), all(windows, feature = "libc_on_windows", feature = "windows-sys")));

pub use common::*;
#[cfg(any(all(unix, feature = "libc_on_unix"), all(windows, feature = "libc_on_windows", feature = "windows-sys")))]
pub use platform::*;

#[cfg(all(test, all(unix, feature = "libc_on_unix")))]
mod tests {
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::mem::ManuallyDrop;
    use std::os::fd::{AsRawFd, FromRawFd};

    use super::*;

    fn write_to_descriptor(fd: Descriptor, bytes: &[u8]) {
        let mut file = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
        file.write_all(bytes).unwrap();
    }

    fn read_all(file: &mut File) -> String {
        let mut text = String::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn redirects_and_restores() {
        // Arrange
        let mut channel = tempfile::tempfile().unwrap();
        let mut target = tempfile::tempfile().unwrap();
        let slot = channel.as_raw_fd();
        let saved = duplicate(slot).unwrap();
        let target_fd = descriptor_of(&target).unwrap();

        // Act
        redirect_fd_to_fd(slot, target_fd.as_raw()).unwrap();
        write_to_descriptor(slot, b"Hello,");
        redirect_fd_to_fd(slot, saved.as_raw()).unwrap();
        write_to_descriptor(slot, b" World!");

        // Assert
        assert_eq!(read_all(&mut target), "Hello,");
        assert_eq!(read_all(&mut channel), " World!");
    }

    #[test]
    fn duplicate_rejects_closed_descriptor() {
        assert!(duplicate(-1).is_err());
    }

    #[test]
    fn flushing_c_streams_succeeds() {
        flush_c_streams().unwrap();
    }
}
