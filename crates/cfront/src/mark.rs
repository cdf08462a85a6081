//! Source marks.
//!
//! Every token and AST node carries a `Mark` naming the file, line and column
//! it came from. Text produced by a macro expansion carries a mark whose
//! `parent` chain leads back to the invocation site, one link per nesting
//! level. The links are `Rc`-shared: all tokens of one expansion point at the
//! same chain tail.

use std::fmt;
use std::rc::Rc;

pub const BUILT_IN_FILENAME: &str = "<built-in>";
pub const COMMAND_LINE_FILENAME: &str = "<command-line>";

#[derive(Clone)]
pub struct Mark {
    /// File the marked text appears in.
    pub file: Rc<str>,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
    /// Byte offset of the start of `line` in the file buffer. Used to render
    /// the offending source line under a diagnostic.
    pub line_start: usize,
    /// Macro-expansion history, innermost invocation first.
    pub parent: Option<Rc<MarkLink>>,
}

/// One level of expansion history, shared by every mark the expansion
/// produced.
pub struct MarkLink {
    /// Name of the macro that was expanded.
    pub macro_name: Rc<str>,
    /// Where the macro was invoked.
    pub site: Mark,
}

impl Mark {
    pub fn new(file: Rc<str>) -> Mark {
        Mark {
            file,
            line: 1,
            col: 1,
            line_start: 0,
            parent: None,
        }
    }

    pub fn built_in() -> Mark {
        Mark::new(BUILT_IN_FILENAME.into())
    }

    /// A copy of this mark re-rooted under a new expansion link.
    pub fn with_parent(&self, link: Rc<MarkLink>) -> Mark {
        let mut mark = self.clone();
        mark.parent = Some(link);
        mark
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

impl fmt::Debug for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mark({})", self)?;
        if self.parent.is_some() {
            write!(f, "*")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_shared_not_copied() {
        let site = Mark::new("a.c".into());
        let link = Rc::new(MarkLink {
            macro_name: "FOO".into(),
            site,
        });
        let m1 = Mark::built_in().with_parent(Rc::clone(&link));
        let m2 = Mark::built_in().with_parent(Rc::clone(&link));
        assert!(Rc::ptr_eq(
            m1.parent.as_ref().unwrap(),
            m2.parent.as_ref().unwrap()
        ));
    }

    #[test]
    fn display_names_file_line_col() {
        let mut mark = Mark::new("foo.c".into());
        mark.line = 3;
        mark.col = 7;
        assert_eq!(mark.to_string(), "foo.c:3:7");
    }
}
