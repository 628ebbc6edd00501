use std::{fmt::Display, io::Write, rc::Rc};

use quick_xml::events::{BytesDecl, Event};

/// A wrapper for either an owned or mutable reference to a [`quick_xml::Writer`]
#[allow(missing_debug_implementations)]
pub enum XMLWriterWrapper<'a, W> {
    /// Owned [`quick_xml::Writer`]
    Owned(quick_xml::Writer<W>),
    /// Mutable Reference to [`quick_xml::Writer`]
    Ref(&'a mut quick_xml::Writer<W>),
}

impl<'a, W> XMLWriterWrapper<'a, W> {
    /// Return a mutable reference to a [`quick_xml::Writer`]
    pub fn to_xml_writer(&'a mut self) -> &'a mut quick_xml::Writer<W> {
        match self {
            XMLWriterWrapper::Owned(w) => w,
            XMLWriterWrapper::Ref(w) => w,
        }
    }
}

impl<W: Write> From<W> for XMLWriterWrapper<'_, W> {
    fn from(w: W) -> Self {
        Self::Owned(quick_xml::Writer::new_with_indent(w, b' ', 2))
    }
}

impl<'a, W> From<&'a mut quick_xml::Writer<W>> for XMLWriterWrapper<'a, W> {
    fn from(w: &'a mut quick_xml::Writer<W>) -> Self {
        Self::Ref(w)
    }
}

/// Write the `<?xml version="1.0" encoding="UTF-8"?>` declaration
pub fn write_xml_declaration<W: Write>(
    writer: &mut quick_xml::Writer<W>,
) -> Result<(), ExportError> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    Ok(())
}

///
/// Error encountered while exporting a model to XML
///
#[derive(Debug, Clone)]
pub enum ExportError {
    /// IO Error (e.g., creating the output file failed)
    IOError(Rc<std::io::Error>),
    /// XML Error
    XMLWritingError(quick_xml::Error),
    /// The model references an element that does not exist
    InvalidModel(String),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to export: {:?}", self)
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::IOError(e) => Some(e.as_ref()),
            ExportError::XMLWritingError(e) => Some(e),
            ExportError::InvalidModel(_) => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        Self::IOError(Rc::new(e))
    }
}

impl From<quick_xml::Error> for ExportError {
    fn from(e: quick_xml::Error) -> Self {
        Self::XMLWritingError(e)
    }
}
