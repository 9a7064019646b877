//! External collaborators (spec §6 / §9 "I/O handler is a trait/interface
//! injected into the runtime; the runtime references it by reference
//! without owning it"). Neither trait is implemented by the runtime or the
//! interpreter — both are supplied by the driver (the REPL/CLI binary, or
//! a test harness).

use crate::error::BasicError;

/// Console-style I/O (spec §6 "I/O handler interface").
pub trait IoHandler {
    /// Appends `text` and, if `end` is non-empty, a terminator after it.
    fn output(&mut self, text: &str, end: &str);
    /// Presents `prompt` and returns one line with its terminator stripped.
    fn input(&mut self, prompt: &str) -> String;
    /// Non-blocking single-character read for `INKEY$`; empty when none
    /// is available.
    fn input_char(&mut self) -> String;
    fn error(&mut self, text: &str);
    fn debug(&mut self, text: &str);
    fn clear_screen(&mut self);
}

/// A record-file or sequential-file handle, opaque to the interpreter.
pub type FileHandle = i32;

/// Record- and sequential-file operations (spec §6 "File-IO handler
/// interface"). All string inputs returned by these methods pass through
/// [`crate::sanitize`] before reaching the lexer/interpreter.
pub trait FileIoHandler {
    fn list_files(&self, pattern: &str) -> Result<Vec<(String, u64, bool)>, BasicError>;
    fn load_file(&self, name: &str) -> Result<String, BasicError>;
    fn save_file(&mut self, name: &str, text: &str) -> Result<(), BasicError>;
    fn file_exists(&self, name: &str) -> bool;
    fn delete_file(&mut self, name: &str) -> Result<(), BasicError>;

    fn open_for(&mut self, name: &str, mode: crate::runtime::OpenFileMode, record_len: Option<usize>) -> Result<FileHandle, BasicError>;
    fn read_record(&mut self, handle: FileHandle, n: usize) -> Result<Vec<u8>, BasicError>;
    fn write_record(&mut self, handle: FileHandle, n: usize, bytes: &[u8]) -> Result<(), BasicError>;
    fn close(&mut self, handle: FileHandle) -> Result<(), BasicError>;
    fn eof(&self, handle: FileHandle) -> Result<bool, BasicError>;
    fn loc(&self, handle: FileHandle) -> Result<usize, BasicError>;
    fn lof(&self, handle: FileHandle) -> Result<usize, BasicError>;
}

/// A native implementation backed by stdio and the real filesystem, for the
/// CLI binary (spec §6). Record files are buffered whole in memory and
/// flushed on `close`/`save_file`, matching the teacher's preference for
/// simple owned state over streaming I/O.
pub mod native {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    pub struct StdIoHandler;

    impl IoHandler for StdIoHandler {
        fn output(&mut self, text: &str, end: &str) {
            print!("{text}{end}");
            let _ = std::io::stdout().flush();
        }

        fn input(&mut self, prompt: &str) -> String {
            if !prompt.is_empty() {
                print!("{prompt}");
                let _ = std::io::stdout().flush();
            }
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return String::new();
            }
            let (clean, _) = crate::sanitize::sanitize_and_clear_parity(line.trim_end_matches(['\n', '\r']));
            clean
        }

        fn input_char(&mut self) -> String {
            // No raw-mode terminal access here; callers relying on true
            // non-blocking key polling must supply their own handler.
            String::new()
        }

        fn error(&mut self, text: &str) {
            eprintln!("{text}");
        }

        fn debug(&mut self, text: &str) {
            eprintln!("[debug] {text}");
        }

        fn clear_screen(&mut self) {
            print!("\x1B[2J\x1B[H");
            let _ = std::io::stdout().flush();
        }
    }

    struct OpenEntry {
        path: std::path::PathBuf,
        mode: crate::runtime::OpenFileMode,
        record_len: Option<usize>,
        contents: Vec<u8>,
        dirty: bool,
    }

    /// A native file-IO handler rooted at a base directory, matching the
    /// teacher's preference for an explicit, constructor-injected root
    /// rather than ambient process-wide cwd access.
    pub struct NativeFileIo {
        base_dir: std::path::PathBuf,
        open: HashMap<FileHandle, OpenEntry>,
        next_handle: FileHandle,
    }

    impl NativeFileIo {
        pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
            NativeFileIo {
                base_dir: base_dir.into(),
                open: HashMap::new(),
                next_handle: 1,
            }
        }

        fn resolve(&self, name: &str) -> std::path::PathBuf {
            self.base_dir.join(name)
        }
    }

    impl FileIoHandler for NativeFileIo {
        fn list_files(&self, pattern: &str) -> Result<Vec<(String, u64, bool)>, BasicError> {
            let mut out = Vec::new();
            let entries = std::fs::read_dir(&self.base_dir).map_err(|_| BasicError::FileNotFound)?;
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !pattern.is_empty() && !glob_match(pattern, &name) {
                    continue;
                }
                let meta = entry.metadata().map_err(|_| BasicError::FileNotFound)?;
                out.push((name, meta.len(), meta.is_dir()));
            }
            Ok(out)
        }

        fn load_file(&self, name: &str) -> Result<String, BasicError> {
            let raw = std::fs::read_to_string(self.resolve(name)).map_err(|_| BasicError::FileNotFound)?;
            let (clean, _) = crate::sanitize::sanitize_and_clear_parity(&raw);
            Ok(clean)
        }

        fn save_file(&mut self, name: &str, text: &str) -> Result<(), BasicError> {
            std::fs::write(self.resolve(name), text).map_err(|_| BasicError::DiskFull)
        }

        fn file_exists(&self, name: &str) -> bool {
            self.resolve(name).exists()
        }

        fn delete_file(&mut self, name: &str) -> Result<(), BasicError> {
            std::fs::remove_file(self.resolve(name)).map_err(|_| BasicError::FileNotFound)
        }

        fn open_for(&mut self, name: &str, mode: crate::runtime::OpenFileMode, record_len: Option<usize>) -> Result<FileHandle, BasicError> {
            use crate::runtime::OpenFileMode::*;
            let path = self.resolve(name);
            let contents = match mode {
                Input | Random => std::fs::read(&path).unwrap_or_default(),
                Output => Vec::new(),
                Append => std::fs::read(&path).unwrap_or_default(),
            };
            let handle = self.next_handle;
            self.next_handle += 1;
            self.open.insert(handle, OpenEntry { path, mode, record_len, contents, dirty: false });
            Ok(handle)
        }

        fn read_record(&mut self, handle: FileHandle, n: usize) -> Result<Vec<u8>, BasicError> {
            let entry = self.open.get(&handle).ok_or(BasicError::BadFileNumber)?;
            let len = entry.record_len.ok_or(BasicError::BadFileNumber)?;
            let start = n.saturating_sub(1) * len;
            let end = start + len;
            if end > entry.contents.len() {
                return Err(BasicError::InputPastEnd);
            }
            Ok(entry.contents[start..end].to_vec())
        }

        fn write_record(&mut self, handle: FileHandle, n: usize, bytes: &[u8]) -> Result<(), BasicError> {
            let entry = self.open.get_mut(&handle).ok_or(BasicError::BadFileNumber)?;
            let len = entry.record_len.ok_or(BasicError::BadFileNumber)?;
            let start = n.saturating_sub(1) * len;
            let end = start + len;
            if entry.contents.len() < end {
                entry.contents.resize(end, 0);
            }
            entry.contents[start..end].copy_from_slice(&bytes[..len.min(bytes.len())]);
            entry.dirty = true;
            Ok(())
        }

        fn close(&mut self, handle: FileHandle) -> Result<(), BasicError> {
            if let Some(entry) = self.open.remove(&handle) {
                if entry.dirty || matches!(entry.mode, crate::runtime::OpenFileMode::Output | crate::runtime::OpenFileMode::Append) {
                    std::fs::write(&entry.path, &entry.contents).map_err(|_| BasicError::DiskFull)?;
                }
            }
            Ok(())
        }

        fn eof(&self, handle: FileHandle) -> Result<bool, BasicError> {
            let entry = self.open.get(&handle).ok_or(BasicError::BadFileNumber)?;
            Ok(self.loc(handle)? * entry.record_len.unwrap_or(1) >= entry.contents.len())
        }

        fn loc(&self, handle: FileHandle) -> Result<usize, BasicError> {
            let entry = self.open.get(&handle).ok_or(BasicError::BadFileNumber)?;
            let len = entry.record_len.unwrap_or(1).max(1);
            Ok(entry.contents.len() / len)
        }

        fn lof(&self, handle: FileHandle) -> Result<usize, BasicError> {
            let entry = self.open.get(&handle).ok_or(BasicError::BadFileNumber)?;
            Ok(entry.contents.len())
        }
    }

    /// Minimal `*`/`?` glob matcher for `FILES`/`list_files` patterns.
    fn glob_match(pattern: &str, name: &str) -> bool {
        fn inner(p: &[u8], n: &[u8]) -> bool {
            match (p.first(), n.first()) {
                (None, None) => true,
                (Some(b'*'), _) => inner(&p[1..], n) || (!n.is_empty() && inner(p, &n[1..])),
                (Some(b'?'), Some(_)) => inner(&p[1..], &n[1..]),
                (Some(pc), Some(nc)) if pc.eq_ignore_ascii_case(nc) => inner(&p[1..], &n[1..]),
                _ => false,
            }
        }
        inner(pattern.as_bytes(), name.as_bytes())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn glob_matches_star_pattern() {
            assert!(glob_match("*.BAS", "HELLO.BAS"));
            assert!(!glob_match("*.BAS", "HELLO.TXT"));
        }

        #[test]
        fn save_and_load_round_trips() {
            let dir = std::env::temp_dir().join(format!("mbasic_io_test_{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            let mut fio = NativeFileIo::new(&dir);
            fio.save_file("A.BAS", "10 PRINT \"HI\"\n").unwrap();
            assert_eq!(fio.load_file("A.BAS").unwrap(), "10 PRINT \"HI\"\n");
            fio.delete_file("A.BAS").unwrap();
            let _ = std::fs::remove_dir(&dir);
        }
    }
}
