//! A source file table that assigns an opaque ID to each processed source
//! file. This keeps source locations lean and allows for simple querying of
//! line and column information.
//!
//! Unlike a process-wide singleton, the manager here is an explicit object
//! that is shared between the lexers, preprocessor, and compilation via `Rc`.
//! All syntax trees that end up in one compilation must have been produced
//! through the same manager.

use crate::name::RcStr;
use std::cell::RefCell;
use std::cmp::{max, min};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const INVALID_SOURCE: Source = Source(0);
pub const INVALID_LOCATION: Location = Location {
    source: INVALID_SOURCE,
    offset: 0,
};
pub const INVALID_SPAN: Span = Span {
    source: INVALID_SOURCE,
    begin: 0,
    end: 0,
};

/// An opaque id for a source buffer registered with a manager.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Source(pub u32);

impl Source {
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0 > 0 {
            write!(f, "Source({})", self.0)
        } else {
            write!(f, "Source(INVALID)")
        }
    }
}

/// A manager for source files and their assigned IDs.
pub struct SourceManager {
    map: RefCell<HashMap<RcStr, Source>>,
    vect: RefCell<Vec<SourceFile>>,
    include_dirs: RefCell<Vec<PathBuf>>,
}

struct SourceFile {
    path: RcStr,
    content: Rc<String>,
}

impl SourceManager {
    pub fn new() -> SourceManager {
        SourceManager {
            map: RefCell::new(HashMap::new()),
            vect: RefCell::new(Vec::new()),
            include_dirs: RefCell::new(Vec::new()),
        }
    }

    /// Add a directory that `open_include` searches for include files.
    pub fn add_include_dir<P: Into<PathBuf>>(&self, dir: P) {
        self.include_dirs.borrow_mut().push(dir.into());
    }

    /// Create a virtual file from the contents of a string and add it to the
    /// manager. Future calls to `open()` with the given filename will yield
    /// the provided contents.
    pub fn add(&self, filename: &str, content: &str) -> Source {
        let mut map = self.map.borrow_mut();
        assert!(
            !map.contains_key(filename),
            "add failed: source \"{}\" already exists",
            filename
        );
        let mut vect = self.vect.borrow_mut();
        let new_id = Source(vect.len() as u32 + 1);
        let v = RcStr::new(filename);
        map.insert(v.clone(), new_id);
        vect.push(SourceFile {
            path: v,
            content: Rc::new(content.to_string()),
        });
        new_id
    }

    /// Create a virtual file from the contents of a string. The file can only
    /// be used with the returned `Source`, since there is no name associated
    /// with it by which it could be referred to.
    pub fn add_anonymous<S: Into<String>>(&self, content: S) -> Source {
        let mut vect = self.vect.borrow_mut();
        let new_id = Source(vect.len() as u32 + 1);
        vect.push(SourceFile {
            path: RcStr::new("<anonymous>"),
            content: Rc::new(content.into()),
        });
        new_id
    }

    /// Open a file on disk, or return its existing id if it has been opened
    /// before.
    pub fn open(&self, filename: &str) -> Option<Source> {
        if let Some(&id) = self.map.borrow().get(filename) {
            return Some(id);
        }
        let content = fs::read_to_string(filename).ok()?;
        let mut map = self.map.borrow_mut();
        let mut vect = self.vect.borrow_mut();
        let new_id = Source(vect.len() as u32 + 1);
        let v = RcStr::new(filename);
        map.insert(v.clone(), new_id);
        vect.push(SourceFile {
            path: v,
            content: Rc::new(content),
        });
        Some(new_id)
    }

    /// Resolve an include file name. Quoted includes search relative to the
    /// including file first; bracketed (system) includes search only the
    /// configured include directories.
    pub fn open_include(&self, name: &str, included_from: Source, system: bool) -> Option<Source> {
        if !system {
            let base = self.get_path(included_from);
            let dir = Path::new(&*base).parent().map(|p| p.to_path_buf());
            if let Some(dir) = dir {
                let cand = dir.join(name);
                if let Some(src) = cand.to_str().and_then(|p| self.open(p)) {
                    return Some(src);
                }
            }
            // Also try the name as given, which covers virtual files added
            // directly to the manager under their include name.
            if let Some(&id) = self.map.borrow().get(name) {
                return Some(id);
            }
        }
        for dir in self.include_dirs.borrow().iter() {
            let cand = dir.join(name);
            if let Some(src) = cand.to_str().and_then(|p| self.open(p)) {
                return Some(src);
            }
        }
        if system {
            None
        } else {
            self.open(name)
        }
    }

    /// Obtain the contents of a source file.
    pub fn get_content(&self, id: Source) -> Rc<String> {
        let vect = self.vect.borrow();
        assert!(id.0 > 0, "invalid source");
        assert!(
            (id.0 as usize - 1) < vect.len(),
            "unknown source file: Source({}) >= {}",
            id.0,
            vect.len()
        );
        vect[id.0 as usize - 1].content.clone()
    }

    /// Obtain the path of a source file.
    pub fn get_path(&self, id: Source) -> RcStr {
        let vect = self.vect.borrow();
        assert!(id.0 > 0, "invalid source");
        vect[id.0 as usize - 1].path.clone()
    }

    /// Copy a range of the source content into an owned string.
    pub fn extract(&self, span: Span) -> String {
        let content = self.get_content(span.source);
        content[span.begin..span.end].to_string()
    }

    /// Determine the line and column at a location, both 1-based.
    pub fn human(&self, loc: Location) -> (usize, usize) {
        let content = self.get_content(loc.source);
        let mut line = 1;
        let mut col = 1;
        for (i, c) in content.char_indices() {
            if i >= loc.offset {
                break;
            }
            match c {
                '\n' => {
                    line += 1;
                    col = 1;
                }
                '\r' => (),
                _ => col += 1,
            }
        }
        (line, col)
    }
}

impl Default for SourceManager {
    fn default() -> SourceManager {
        SourceManager::new()
    }
}

/// A single location within a source file, expressed as a byte offset.
#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Location {
    pub source: Source,
    pub offset: usize,
}

impl Location {
    pub fn new(source: Source, offset: usize) -> Location {
        Location {
            source: source,
            offset: offset,
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}:{}", self.source, self.offset)
    }
}

impl Into<Span> for Location {
    fn into(self) -> Span {
        Span::new(self.source, self.offset, self.offset)
    }
}

/// A span of locations within a source file, expressed as a half-open
/// interval of bytes `[begin,end)`.
#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Span {
    pub source: Source,
    pub begin: usize,
    pub end: usize,
}

impl Span {
    /// Create a new span from two byte offsets.
    pub fn new(source: Source, begin: usize, end: usize) -> Span {
        Span {
            source: source,
            begin: begin,
            end: end,
        }
    }

    /// Create a new span that covers two spans, i.e. represents the smallest
    /// possible span that fully contains both input spans `a` and `b`.
    pub fn union<S: Into<Span>>(a: S, b: S) -> Span {
        let sa = a.into();
        let sb = b.into();
        if sa.source != sb.source {
            return sa;
        }
        Span {
            source: sa.source,
            begin: min(sa.begin, sb.begin),
            end: max(sa.end, sb.end),
        }
    }

    /// Modify this range to also cover the entirety of the `other` range.
    pub fn expand<S: Into<Span>>(&mut self, other: S) -> &mut Self {
        let o = other.into();
        if self.source == o.source {
            self.begin = min(self.begin, o.begin);
            self.end = max(self.end, o.end);
        }
        self
    }

    /// Return the location just before the first character in this span.
    pub fn begin(&self) -> Location {
        Location::new(self.source, self.begin)
    }

    /// Return the location just after the last character in this span.
    pub fn end(&self) -> Location {
        Location::new(self.source, self.end)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}:{}-{}", self.source, self.begin, self.end)
    }
}

/// A wrapper that associates a span with a value.
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Wrap a given value together with the span it covers.
    pub fn new(value: T, span: Span) -> Spanned<T> {
        Spanned {
            value: value,
            span: span,
        }
    }

    /// Map the spanned value, preserving the span.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Spanned<U> {
        Spanned::new(f(self.value), self.span)
    }
}

impl<T: fmt::Debug> fmt::Debug for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_file() {
        let sm = SourceManager::new();
        let id = sm.add("flabberghasted.txt", "Hello\nWorld\n");
        let again = sm.open("flabberghasted.txt").expect("file should exist");
        assert_eq!(id, again);
        assert_eq!(&*sm.get_content(id), "Hello\nWorld\n");
    }

    #[test]
    fn inexistent_file() {
        let sm = SourceManager::new();
        assert_eq!(sm.open("/this/path/points/nowhere"), None);
    }

    #[test]
    fn human_lines() {
        let sm = SourceManager::new();
        let id = sm.add("test.txt", "abc\ndef\r\nghi");
        assert_eq!(sm.human(Location::new(id, 0)), (1, 1));
        assert_eq!(sm.human(Location::new(id, 5)), (2, 2));
        assert_eq!(sm.human(Location::new(id, 9)), (3, 1));
    }

    #[test]
    fn span_union() {
        let s = Source(1);
        let sp = Span::union(Span::new(s, 4, 8), Span::new(s, 2, 5));
        assert_eq!(sp, Span::new(s, 2, 8));
    }
}
