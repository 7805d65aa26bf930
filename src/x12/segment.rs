//! Segment and delimiter value types
//!
//! A [`Segment`] keeps its original wire string (without the terminator) so
//! that serialization can reproduce input byte-for-byte. Element access is
//! positional and 1-indexed; element 0 is the segment id. Composite
//! decomposition is computed on demand and never stored back.

use std::fmt;

/// The four single-byte separators discovered from an ISA header.
///
/// The repetition separator only exists in 5010 interchanges; in 4010 the
/// same ISA position carries the standards identifier (`U`) and the field
/// is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub element_separator: u8,
    pub component_separator: u8,
    pub repetition_separator: Option<u8>,
    pub segment_terminator: u8,
}

impl Delimiters {
    /// The canonical delimiters: `*` elements, `:` components, `^`
    /// repetition, `~` terminator.
    pub fn canonical() -> Self {
        Delimiters {
            element_separator: b'*',
            component_separator: b':',
            repetition_separator: Some(b'^'),
            segment_terminator: b'~',
        }
    }

    /// True when any separator is an ASCII control character (CR, LF, tab).
    /// The reader strips whitespace between segments in that case.
    pub fn has_control_separator(&self) -> bool {
        let mut bytes = vec![
            self.element_separator,
            self.component_separator,
            self.segment_terminator,
        ];
        if let Some(r) = self.repetition_separator {
            bytes.push(r);
        }
        bytes.iter().any(|b| b.is_ascii_control())
    }

    /// All separators must be pairwise distinct single bytes.
    pub fn are_distinct(&self) -> bool {
        let mut bytes = vec![
            self.element_separator,
            self.component_separator,
            self.segment_terminator,
        ];
        if let Some(r) = self.repetition_separator {
            bytes.push(r);
        }
        for i in 0..bytes.len() {
            for j in i + 1..bytes.len() {
                if bytes[i] == bytes[j] {
                    return false;
                }
            }
        }
        true
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters::canonical()
    }
}

impl fmt::Display for Delimiters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "element={:?} component={:?} repetition={:?} terminator={:?}",
            self.element_separator as char,
            self.component_separator as char,
            self.repetition_separator.map(|b| b as char),
            self.segment_terminator as char,
        )
    }
}

/// One framed segment, retained in its original wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    value: String,
    element_separator: u8,
    component_separator: u8,
}

impl Segment {
    /// Wrap a framed segment string (no terminator) with the delimiters it
    /// was read under.
    pub fn new(value: impl Into<String>, delimiters: &Delimiters) -> Self {
        Segment {
            value: value.into(),
            element_separator: delimiters.element_separator,
            component_separator: delimiters.component_separator,
        }
    }

    /// The original wire string, without the segment terminator.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The segment identifier: everything before the first element
    /// separator, or the whole string if there is none.
    pub fn id(&self) -> &str {
        let sep = self.element_separator as char;
        match self.value.find(sep) {
            Some(pos) => &self.value[..pos],
            None => &self.value,
        }
    }

    /// Positional element access. Element 0 is the segment id. Indices past
    /// the last element on the wire yield the empty string, since trailing
    /// empty elements are routinely elided.
    pub fn element(&self, index: usize) -> &str {
        let sep = self.element_separator as char;
        self.value.split(sep).nth(index).unwrap_or("")
    }

    /// Number of elements present on the wire, counting the id.
    pub fn element_count(&self) -> usize {
        let sep = self.element_separator as char;
        self.value.split(sep).count()
    }

    /// Split element `index` on the component separator. A simple element
    /// comes back as a single component.
    pub fn components(&self, index: usize) -> Vec<&str> {
        let sep = self.component_separator as char;
        self.element(index).split(sep).collect()
    }

    /// Rewrite element `index` in place, extending with empty elements if
    /// the wire form was shorter. Used when emitting surgically altered
    /// segments (unbundling clears HL parent references this way).
    pub fn set_element(&mut self, index: usize, new_value: &str) {
        let sep = self.element_separator as char;
        let mut elements: Vec<String> = self.value.split(sep).map(str::to_string).collect();
        while elements.len() <= index {
            elements.push(String::new());
        }
        elements[index] = new_value.to_string();
        self.value = elements.join(&sep.to_string());
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
