//! File directory.
//!
//! Maps a path to a loaded byte buffer plus a stable filename string. The
//! cache is append-only: entries are never moved or dropped while a driver is
//! alive, so `Rc` handles stay valid across translation units and the
//! diagnostic renderer can fetch source lines long after the preprocessor
//! moved on.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;

use crate::Error;

pub struct FileEntry {
    /// Stable name, used on marks and in diagnostics.
    pub filename: Rc<str>,
    /// Whole file contents.
    pub buf: Rc<str>,
}

#[derive(Default)]
pub struct FileDir {
    entries: RefCell<HashMap<Rc<str>, Rc<FileEntry>>>,
}

impl FileDir {
    pub fn new() -> FileDir {
        FileDir::default()
    }

    /// Load `path` from disk, or return the cached entry.
    pub fn insert(&self, path: &str) -> Result<Rc<FileEntry>, Error> {
        if let Some(entry) = self.lookup(path) {
            return Ok(entry);
        }
        let bytes = fs::read(path).map_err(|e| Error::Io(path.to_string(), e))?;
        let text = String::from_utf8(bytes)?;
        Ok(self.insert_virtual(path, &text))
    }

    /// Register an in-memory buffer under a name, as if it had been read from
    /// disk. Used for built-in text and by tests.
    pub fn insert_virtual(&self, name: &str, contents: &str) -> Rc<FileEntry> {
        let filename: Rc<str> = name.into();
        let entry = Rc::new(FileEntry {
            filename: Rc::clone(&filename),
            buf: contents.into(),
        });
        self.entries
            .borrow_mut()
            .insert(filename, Rc::clone(&entry));
        entry
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<FileEntry>> {
        self.entries.borrow().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_entry_roundtrip() {
        let fdir = FileDir::new();
        fdir.insert_virtual("t.c", "int x;\n");
        let entry = fdir.lookup("t.c").unwrap();
        assert_eq!(&*entry.buf, "int x;\n");
        assert_eq!(&*entry.filename, "t.c");
    }

    #[test]
    fn missing_file_is_io_error() {
        let fdir = FileDir::new();
        assert!(fdir.insert("/nonexistent/___ccr").is_err());
    }
}
