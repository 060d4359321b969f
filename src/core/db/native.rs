/// Native Engine Binding
///
/// Declares the handful of engine entry points this crate calls and adapts
/// between Rust strings/pointers and the engine's NUL-terminated UTF-8 and
/// out-pointer conventions. Nothing above this module touches a raw pointer
/// except the row trampoline in `query`.
///
/// The entry points are grouped in a table tagged with the pointer width they
/// were linked for. Every call goes through the table resolved once per
/// process by [`NativeLibrary::ensure_loaded`], so call sites never branch on
/// the architecture themselves.
use crate::core::db::query::{collect_row, RowCollector, RowCallback};
use crate::core::error::{LitecallError, NativeFailure, Result};
use once_cell::sync::OnceCell;
use rusqlite::ffi;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::{self, NonNull};
use tracing::{debug, info, warn};

/// Status returned by every successful engine call.
pub const SQLITE_OK: c_int = 0;

/// Raw connection handle owned by the engine.
pub type RawHandle = NonNull<ffi::sqlite3>;

type OpenFn = unsafe extern "C" fn(*const c_char, *mut *mut ffi::sqlite3) -> c_int;
type CloseFn = unsafe extern "C" fn(*mut ffi::sqlite3) -> c_int;
type ExecFn = unsafe extern "C" fn(
    *mut ffi::sqlite3,
    *const c_char,
    Option<RowCallback>,
    *mut c_void,
    *mut *mut c_char,
) -> c_int;
type FreeFn = unsafe extern "C" fn(*mut c_void);
type ErrmsgFn = unsafe extern "C" fn(*mut ffi::sqlite3) -> *const c_char;
type VersionFn = unsafe extern "C" fn() -> *const c_char;

/// Pointer width of the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordWidth {
    Bits32,
    Bits64,
}

impl WordWidth {
    /// Detects the width from the size of a pointer in this process.
    pub fn current() -> Result<Self> {
        Self::from_pointer_size(std::mem::size_of::<*const c_void>())
    }

    fn from_pointer_size(bytes: usize) -> Result<Self> {
        match bytes {
            4 => Ok(WordWidth::Bits32),
            8 => Ok(WordWidth::Bits64),
            other => Err(LitecallError::NativeLoad(format!(
                "unsupported pointer size of {other} bytes"
            ))),
        }
    }

    /// Width the bundled engine was linked for.
    pub const fn linked() -> Self {
        if cfg!(target_pointer_width = "64") {
            WordWidth::Bits64
        } else {
            WordWidth::Bits32
        }
    }
}

/// Function table for one physical build of the engine.
#[derive(Clone, Copy)]
pub struct EntryPoints {
    width: WordWidth,
    open: OpenFn,
    close: CloseFn,
    exec: ExecFn,
    free: FreeFn,
    errmsg: ErrmsgFn,
    libversion: VersionFn,
}

static BUNDLED: EntryPoints = EntryPoints {
    width: WordWidth::linked(),
    open: ffi::sqlite3_open,
    close: ffi::sqlite3_close_v2,
    exec: ffi::sqlite3_exec,
    free: ffi::sqlite3_free,
    errmsg: ffi::sqlite3_errmsg,
    libversion: ffi::sqlite3_libversion,
};

impl EntryPoints {
    /// Returns the table linked for `width`, if this build carries one.
    pub fn for_width(width: WordWidth) -> Option<&'static EntryPoints> {
        [&BUNDLED].into_iter().find(|table| table.width == width)
    }

    pub fn width(&self) -> WordWidth {
        self.width
    }
}

impl std::fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoints")
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

static LIBRARY: OnceCell<NativeLibrary> = OnceCell::new();

/// The resolved engine for this process.
#[derive(Debug)]
pub struct NativeLibrary {
    entry: &'static EntryPoints,
    version: String,
}

impl NativeLibrary {
    /// Guarantees the engine matching the process word width is available
    /// before the first foreign call. Resolution happens once per process;
    /// later calls return the cached library.
    ///
    /// # Errors
    ///
    /// Returns `LitecallError::NativeLoad` if no engine build matches the
    /// running process.
    pub fn ensure_loaded() -> Result<&'static NativeLibrary> {
        LIBRARY.get_or_try_init(|| Self::resolve(WordWidth::current()?))
    }

    fn resolve(width: WordWidth) -> Result<NativeLibrary> {
        let entry = EntryPoints::for_width(width).ok_or_else(|| {
            LitecallError::NativeLoad(format!(
                "no engine build for {width:?} (linked for {:?})",
                WordWidth::linked()
            ))
        })?;

        // SAFETY: libversion returns a pointer to a static NUL-terminated string.
        let version = unsafe { copy_c_str((entry.libversion)()) };
        info!(?width, %version, "native engine loaded");

        Ok(NativeLibrary { entry, version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn width(&self) -> WordWidth {
        self.entry.width
    }

    /// Opens or creates the database file at `path`.
    ///
    /// A handle the engine allocated for a failed open is released before the
    /// failure is returned.
    pub fn open(&self, path: &str) -> Result<RawHandle> {
        let c_path = to_c_string(path, "database path")?;
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();

        // SAFETY: c_path outlives the call and db is a valid out-pointer.
        let code = unsafe { (self.entry.open)(c_path.as_ptr(), &mut db) };
        if code != SQLITE_OK {
            let message = if db.is_null() {
                String::new()
            } else {
                // SAFETY: db is a handle returned by open; errmsg is engine-owned.
                let message = unsafe { copy_c_str((self.entry.errmsg)(db)) };
                self.close_raw(db);
                message
            };
            return Err(NativeFailure::new(code, message).into());
        }

        debug!(path, "native handle opened");
        NonNull::new(db)
            .ok_or_else(|| NativeFailure::new(code, "engine returned a null handle").into())
    }

    /// Releases `handle`. Failures are logged, never returned.
    pub fn close(&self, handle: RawHandle) {
        self.close_raw(handle.as_ptr());
    }

    fn close_raw(&self, db: *mut ffi::sqlite3) {
        // SAFETY: db came from open and is not used after this call.
        let code = unsafe { (self.entry.close)(db) };
        if code != SQLITE_OK {
            warn!(code, "closing native handle failed");
        }
    }

    /// Runs one or more `;`-separated statements. When `collector` is given
    /// the engine calls back into it once per row before this returns.
    pub fn exec(
        &self,
        handle: RawHandle,
        sql: &str,
        collector: Option<&mut RowCollector>,
    ) -> std::result::Result<(), NativeFailure> {
        let c_sql = CString::new(sql)
            .map_err(|_| NativeFailure::new(ffi::SQLITE_MISUSE, "SQL contains a NUL byte"))?;

        let (callback, user_data): (Option<RowCallback>, *mut c_void) = match collector {
            Some(collector) => (
                Some(collect_row as RowCallback),
                collector as *mut RowCollector as *mut c_void,
            ),
            None => (None, ptr::null_mut()),
        };

        let mut errmsg: *mut c_char = ptr::null_mut();
        // SAFETY: handle is open, c_sql outlives the call and user_data, when
        // set, points at a collector exclusively borrowed for this call.
        let code = unsafe {
            (self.entry.exec)(handle.as_ptr(), c_sql.as_ptr(), callback, user_data, &mut errmsg)
        };

        // SAFETY: errmsg is either null or a buffer allocated by the engine.
        let message = unsafe { self.take_message(errmsg) };
        if code == SQLITE_OK {
            Ok(())
        } else {
            Err(NativeFailure::new(code, message))
        }
    }

    /// Copies the message out of an engine-allocated buffer and frees it.
    unsafe fn take_message(&self, errmsg: *mut c_char) -> String {
        if errmsg.is_null() {
            return String::new();
        }
        let message = copy_c_str(errmsg);
        (self.entry.free)(errmsg.cast());
        message
    }
}

/// Decodes a NUL-terminated UTF-8 string. Null reads as empty.
///
/// # Safety
///
/// `ptr` must be null or point at a valid NUL-terminated string.
pub(crate) unsafe fn copy_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

fn to_c_string(text: &str, what: &str) -> Result<CString> {
    CString::new(text)
        .map_err(|_| LitecallError::InvalidArgument(format!("{what} contains a NUL byte")))
}

/// Engine version of the loaded library, e.g. `3.41.2`.
pub fn library_version() -> Result<&'static str> {
    Ok(NativeLibrary::ensure_loaded()?.version())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_width_detection() {
        let width = WordWidth::current().unwrap();
        assert_eq!(width, WordWidth::linked());
        assert!(matches!(
            WordWidth::from_pointer_size(2),
            Err(LitecallError::NativeLoad(_))
        ));
    }

    #[test]
    fn test_entry_points_dispatch_on_width() {
        let linked = WordWidth::linked();
        let other = match linked {
            WordWidth::Bits32 => WordWidth::Bits64,
            WordWidth::Bits64 => WordWidth::Bits32,
        };
        assert_eq!(EntryPoints::for_width(linked).unwrap().width(), linked);
        assert!(EntryPoints::for_width(other).is_none());
        assert!(matches!(
            NativeLibrary::resolve(other),
            Err(LitecallError::NativeLoad(_))
        ));
    }

    #[test]
    fn test_ensure_loaded_is_cached() {
        let first = NativeLibrary::ensure_loaded().unwrap();
        let second = NativeLibrary::ensure_loaded().unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(first.version().starts_with('3'));
        assert_eq!(library_version().unwrap(), first.version());
    }

    #[test]
    fn test_exec_decodes_error_message() {
        let lib = NativeLibrary::ensure_loaded().unwrap();
        let handle = lib.open(":memory:").unwrap();

        let failure = lib.exec(handle, "SELEC 1", None).unwrap_err();
        assert_eq!(failure.code, ffi::SQLITE_ERROR);
        assert!(failure.message.contains("syntax error"));

        assert!(lib.exec(handle, "CREATE TABLE t (x); INSERT INTO t VALUES (1);", None).is_ok());
        lib.close(handle);
    }

    #[test]
    fn test_exec_rejects_interior_nul() {
        let lib = NativeLibrary::ensure_loaded().unwrap();
        let handle = lib.open(":memory:").unwrap();
        let failure = lib.exec(handle, "SELECT 1;\0SELECT 2", None).unwrap_err();
        assert_eq!(failure.code, ffi::SQLITE_MISUSE);
        lib.close(handle);
    }

    #[test]
    fn test_open_failure_reports_engine_message() {
        let lib = NativeLibrary::ensure_loaded().unwrap();
        let err = lib.open("/nonexistent/dir/for/litecall/test.db").unwrap_err();
        match err {
            LitecallError::Native(failure) => {
                assert_eq!(failure.code, ffi::SQLITE_CANTOPEN);
                assert!(!failure.message.is_empty());
            }
            other => panic!("Expected native failure, got {other:?}"),
        }

        assert!(matches!(
            lib.open("bad\0path"),
            Err(LitecallError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_copy_c_str_handles_null() {
        assert_eq!(unsafe { copy_c_str(ptr::null()) }, "");
        let text = CString::new("héllo").unwrap();
        assert_eq!(unsafe { copy_c_str(text.as_ptr()) }, "héllo");
    }
}
