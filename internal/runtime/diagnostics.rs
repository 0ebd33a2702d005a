// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

use smol_str::SmolStr;

/// A position within a source document.
///
/// Line and column start at 1. A location of `(0, 0)` means "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_valid(&self) -> bool {
        self.line != 0
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// This enum describes the level or severity of a diagnostic message produced while
/// instantiating a document.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
#[non_exhaustive]
pub enum DiagnosticLevel {
    /// The diagnostic found is an error that prevents successful creation.
    #[default]
    Error,
    /// The diagnostic found is a warning.
    Warning,
}

/// This structure represent a diagnostic emitted while creating objects.
///
/// It is basically a message, a level (warning or error), attached to a
/// position in a document
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    url: SmolStr,
    location: SourceLocation,
    message: String,
    level: DiagnosticLevel,
}

impl Diagnostic {
    pub fn error(url: impl Into<SmolStr>, location: SourceLocation, message: String) -> Self {
        Self { url: url.into(), location, message, level: DiagnosticLevel::Error }
    }

    pub fn warning(url: impl Into<SmolStr>, location: SourceLocation, message: String) -> Self {
        Self { url: url.into(), location, message, level: DiagnosticLevel::Warning }
    }

    /// Return the level for this diagnostic
    pub fn level(&self) -> DiagnosticLevel {
        self.level
    }

    /// Return a message for this diagnostic
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The url of the document this diagnostic is attached to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns a tuple with the line (starting at 1) and column number (starting at 1)
    ///
    /// Can also return (0, 0) if the location is unknown
    pub fn line_column(&self) -> (u32, u32) {
        (self.location.line, self.location.column)
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.url.is_empty() {
            write!(f, "<unknown>:{}: {}", self.location, self.message)
        } else {
            write!(f, "{}:{}: {}", self.url, self.location, self.message)
        }
    }
}

/// An ordered list of diagnostics.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    inner: Vec<Diagnostic>,
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = <Vec<Diagnostic> as IntoIterator>::IntoIter;
    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;
    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl Diagnostics {
    pub fn push_error(&mut self, message: String, url: &str, location: SourceLocation) {
        debug_assert!(
            !message.as_str().ends_with('.'),
            "Error message should not end with a period: ({message:?})"
        );
        self.inner.push(Diagnostic::error(url, location, message));
    }

    pub fn push_warning(&mut self, message: String, url: &str, location: SourceLocation) {
        self.inner.push(Diagnostic::warning(url, location, message));
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.inner.push(diagnostic);
    }

    /// Append all diagnostics of `other`, preserving their order
    pub fn append(&mut self, other: &mut Diagnostics) {
        self.inner.append(&mut other.inner);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.inner.extend(other);
    }

    /// Return true if there is at least one error
    pub fn has_errors(&self) -> bool {
        self.inner.iter().any(|diag| diag.level == DiagnosticLevel::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.inner.iter()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn to_string_vec(&self) -> Vec<String> {
        self.inner.iter().map(|d| d.to_string()).collect()
    }
}

#[test]
fn diagnostic_display() {
    let mut diags = Diagnostics::default();
    diags.push_error(
        "Cannot assign to non-existent property \"foo\"".into(),
        "file:///a.qml",
        SourceLocation::new(3, 5),
    );
    assert!(diags.has_errors());
    assert_eq!(
        diags.to_string_vec(),
        vec!["file:///a.qml:3:5: Cannot assign to non-existent property \"foo\"".to_string()]
    );
}
