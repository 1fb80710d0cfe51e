use crate::error::{MarkingError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Indenting XML writer over an in-memory buffer.
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    pub fn declaration(&mut self) -> Result<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    pub fn start<'a, I>(&mut self, name: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.write(Event::Start(start_tag(name, attributes)))
    }

    pub fn empty<'a, I>(&mut self, name: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.write(Event::Empty(start_tag(name, attributes)))
    }

    pub fn text(&mut self, text: &str) -> Result<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// `<name attrs>text</name>`, or an empty element when `text` is empty.
    pub fn text_element<'a, I>(&mut self, name: &str, attributes: I, text: &str) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if text.is_empty() {
            return self.empty(name, attributes);
        }
        self.start(name, attributes)?;
        self.text(text)?;
        self.end(name)
    }

    pub fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(|err| MarkingError::Xml(err.to_string()))
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|err| MarkingError::Xml(err.to_string()))
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn start_tag<'a, I>(name: &str, attributes: I) -> BytesStart<'static>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut start = BytesStart::new(name.to_string());
    for attribute in attributes {
        start.push_attribute(attribute);
    }
    start
}
