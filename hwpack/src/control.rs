// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Defines primitives in control files.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.

Control files show up in several places in a hardware pack: the `control`
member of every `.deb`, the `Packages` index under `pkgs/`, the dpkg `status`
file of an isolated APT root and the `Release` file of a local archive. All
of them are read and written through the types in this module.
*/

use {
    crate::error::{HwpackError, Result},
    std::io::{BufRead, Write},
};

/// A field in a control file.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField {
    name: String,
    value: String,
}

impl ControlField {
    /// Construct an instance from a field name and value.
    pub fn new(name: impl ToString, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtain the value as a [&str].
    ///
    /// Continuation lines retain their leading whitespace.
    pub fn value_str(&self) -> &str {
        &self.value
    }

    /// Obtain an iterator of words in the value.
    pub fn iter_words(&self) -> impl Iterator<Item = &str> {
        self.value.split_ascii_whitespace()
    }

    /// Obtain an iterator of lines in the value.
    ///
    /// Leading whitespace from each line is stripped.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value.lines().map(|x| x.trim_start())
    }

    /// Write the contents of this field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(self.value.as_bytes())?;
        writer.write_all(b"\n")
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields.
///
/// Field names are case insensitive on read and case preserving on set.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph {
    fields: Vec<ControlField>,
}

impl ControlParagraph {
    /// Whether the paragraph is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// If a field with the same name (case insensitive compare) already exists, it is
    /// replaced in place, retaining its position.
    pub fn set_field(&mut self, field: ControlField) {
        if let Some(existing) = self
            .fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(&field.name))
        {
            *existing = field;
        } else {
            self.fields.push(field);
        }
    }

    /// Set the value of a field defined via strings.
    pub fn set_field_from_string(&mut self, name: impl ToString, value: impl ToString) {
        self.set_field(ControlField::new(name, value));
    }

    /// Remove a field by name, returning whether it existed.
    pub fn remove_field(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
        self.fields.len() != before
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in this paragraph.
    ///
    /// Iteration order is insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField> {
        self.fields.iter()
    }

    /// Obtain the field with a given name in this paragraph.
    pub fn field(&self, name: &str) -> Option<&ControlField> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Obtain the raw string value of a field that must be present.
    pub fn required_field_str(&self, name: &str) -> Result<&str> {
        self.field_str(name)
            .ok_or_else(|| HwpackError::ControlRequiredFieldMissing(name.to_string()))
    }

    /// Obtain the value of a field parsed as a [u64].
    pub fn field_u64(&self, name: &str) -> Option<Result<u64>> {
        self.field_str(name).map(|v| Ok(v.trim().parse::<u64>()?))
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field. However, an
    /// extra newline is not present. So if serializing multiple paragraphs, an
    /// additional line break must be written to terminate this paragraph.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl std::fmt::Display for ControlParagraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            writeln!(f, "{}: {}", field.name, field.value)?;
        }

        Ok(())
    }
}

/// Holds parsing state for Debian control files.
///
/// Instances of this type are essentially fed lines of text and periodically emit
/// [ControlParagraph] instances as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph will be returned.
    /// Otherwise `Ok(None)` is returned.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph>> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let is_empty_line = line.trim().is_empty();
        let is_indented = line.starts_with(' ') || line.starts_with('\t');

        let current_field = self.field.take();

        // Empty lines end a paragraph.
        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        // Comment lines are permitted in some control files. Skip them.
        if line.starts_with('#') {
            self.field = current_field;
            return Ok(None);
        }

        match (current_field, is_indented) {
            (Some(v), true) => {
                self.field = Some(format!("{}\n{}", v, line));
            }
            (Some(v), false) => {
                self.flush_field(v)?;
                self.field = Some(line.to_string());
            }
            (None, true) => {
                return Err(HwpackError::ControlParse(format!(
                    "continuation line without a field: '{}'",
                    line
                )));
            }
            (None, false) => {
                self.field = Some(line.to_string());
            }
        }

        Ok(None)
    }

    /// Finish parsing, consuming self.
    ///
    /// If a non-empty paragraph is present in the instance, it will be returned.
    pub fn finish(mut self) -> Result<Option<ControlParagraph>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, v: String) -> Result<()> {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            HwpackError::ControlParse(format!("error parsing line '{}'; missing colon", v))
        })?;

        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(HwpackError::ControlParse(format!(
                "invalid field name in line '{}'",
                v
            )));
        }

        self.paragraph
            .set_field_from_string(name, value.trim_start_matches(&[' ', '\t'][..]).trim_end());

        Ok(())
    }
}

/// A reader for [ControlParagraph].
///
/// Instances can be consumed as an iterator. Each call into the iterator will attempt to
/// read a full paragraph from the underlying reader.
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph>> {
        let mut parser = match self.parser.take() {
            Some(parser) => parser,
            None => return Ok(None),
        };

        loop {
            let mut line = String::new();

            if self.reader.read_line(&mut line)? != 0 {
                if let Some(paragraph) = parser.write_line(&line)? {
                    self.parser.replace(parser);
                    return Ok(Some(paragraph));
                }
            } else {
                return parser.finish();
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph>;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next().transpose()
    }
}

/// A debian control file.
///
/// A control file is an ordered series of paragraphs.
#[derive(Clone, Debug, Default)]
pub struct ControlFile {
    paragraphs: Vec<ControlParagraph>,
}

impl ControlFile {
    /// Construct a new instance by parsing data from a reader.
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<Self> {
        let paragraphs = ControlParagraphReader::new(reader).collect::<Result<Vec<_>>>()?;

        Ok(Self { paragraphs })
    }

    /// Parse a control file from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        Self::parse_reader(s.as_bytes())
    }

    /// Add a paragraph to this control file.
    pub fn add_paragraph(&mut self, p: ControlParagraph) {
        self.paragraphs.push(p);
    }

    /// Obtain paragraphs in this control file.
    pub fn paragraphs(&self) -> impl Iterator<Item = &ControlParagraph> {
        self.paragraphs.iter()
    }

    /// Obtain paragraphs in this control file, consuming self.
    pub fn into_paragraphs(self) -> impl Iterator<Item = ControlParagraph> {
        self.paragraphs.into_iter()
    }

    /// Serialize the control file to a writer.
    ///
    /// Paragraphs are separated by a single blank line.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (i, p) in self.paragraphs.iter().enumerate() {
            if i > 0 {
                writer.write_all(b"\n")?;
            }
            p.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    #[test]
    fn control_paragraph_field_semantics() {
        let mut p = ControlParagraph::default();

        // Same cased field name results in overwrite.
        p.set_field_from_string("foo", "bar");
        p.set_field_from_string("foo", "baz");
        assert_eq!(p.field_str("foo"), Some("baz"));

        // Different case results in overwrite.
        p.set_field_from_string("FOO", "bar");
        assert_eq!(p.field_str("foo"), Some("bar"));
        assert_eq!(p.field_str("FOO"), Some("bar"));
        assert_eq!(p.iter_fields().count(), 1);
    }

    #[test]
    fn set_field_retains_position() {
        let mut p = ControlParagraph::default();
        p.set_field_from_string("Package", "foo");
        p.set_field_from_string("Version", "1.0");
        p.set_field_from_string("Package", "bar");

        assert_eq!(p.to_string(), "Package: bar\nVersion: 1.0\n");
    }

    #[test]
    fn parse_paragraph_release() -> Result<()> {
        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(indoc! {"
            Origin: Ubuntu
            Label: hwpack-local
            MD5Sum:
             d41d8cd98f00b204e9800998ecf8427e 0 Packages
        "}))
        .collect::<Result<Vec<_>>>()?;

        assert_eq!(paragraphs.len(), 1);
        let p = &paragraphs[0];
        assert_eq!(p.field_str("Label"), Some("hwpack-local"));
        assert_eq!(
            p.field("MD5Sum").unwrap().iter_lines().collect::<Vec<_>>(),
            vec!["", "d41d8cd98f00b204e9800998ecf8427e 0 Packages"]
        );

        Ok(())
    }

    #[test]
    fn parse_multiple_paragraphs() -> Result<()> {
        let cf = ControlFile::parse_str(indoc! {"
            Package: foo
            Version: 1.0

            Package: bar
            Description: a package
             with a long description
        "})?;

        let paragraphs = cf.paragraphs().collect::<Vec<_>>();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].field_str("package"), Some("foo"));
        assert_eq!(
            paragraphs[1].field_str("Description"),
            Some("a package\n with a long description")
        );

        let mut buffer = vec![];
        cf.write(&mut buffer)?;
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "Package: foo\nVersion: 1.0\n\n\
             Package: bar\nDescription: a package\n with a long description\n"
        );

        Ok(())
    }

    #[test]
    fn missing_colon_is_error() {
        assert!(ControlFile::parse_str("Package foo\n").is_err());
        assert!(ControlFile::parse_str(" leading\n").is_err());
    }

    #[test]
    fn empty_input() -> Result<()> {
        assert_eq!(ControlFile::parse_str("")?.paragraphs().count(), 0);
        assert_eq!(ControlFile::parse_str("\n\n")?.paragraphs().count(), 0);

        Ok(())
    }
}
