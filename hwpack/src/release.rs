// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository `Release` files.

Only the fields used for pinning and index integrity are modeled: `Label`,
`MD5Sum` and `SHA256`.
*/

use {
    crate::{
        control::{ControlField, ControlParagraph, ControlParagraphReader},
        error::{HwpackError, Result},
        io::digest_bytes,
    },
    std::{
        io::BufRead,
        ops::{Deref, DerefMut},
    },
};

/// A checksum flavor found in `Release` files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChecksumType {
    Md5,
    Sha256,
}

impl ChecksumType {
    /// Name of the field listing entries of this flavor.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha256 => "SHA256",
        }
    }
}

/// An entry in a checksum field of a `Release` file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseFileEntry {
    pub path: String,
    pub digest: String,
    pub size: u64,
}

/// A `Release` file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReleaseFile {
    paragraph: ControlParagraph,
}

impl Deref for ReleaseFile {
    type Target = ControlParagraph;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl DerefMut for ReleaseFile {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.paragraph
    }
}

impl From<ControlParagraph> for ReleaseFile {
    fn from(paragraph: ControlParagraph) -> Self {
        Self { paragraph }
    }
}

impl ReleaseFile {
    /// Construct an instance by reading data from a reader.
    ///
    /// The first paragraph is used.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let paragraph = ControlParagraphReader::new(reader)
            .next()
            .ok_or_else(|| HwpackError::ControlParse("empty Release file".to_string()))??;

        Ok(Self { paragraph })
    }

    /// Construct an instance describing the given index files.
    pub fn for_index_files<'a>(
        label: Option<&str>,
        files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
    ) -> Self {
        let mut paragraph = ControlParagraph::default();

        if let Some(label) = label {
            paragraph.set_field_from_string("Label", label);
        }

        let mut md5 = String::new();
        let mut sha256 = String::new();

        for (path, data) in files {
            let digest = digest_bytes(data);
            md5.push_str(&format!("\n {} {} {}", digest.md5, digest.size, path));
            sha256.push_str(&format!("\n {} {} {}", digest.sha256, digest.size, path));
        }

        paragraph.set_field(ControlField::new(ChecksumType::Md5.field_name(), md5));
        paragraph.set_field(ControlField::new(ChecksumType::Sha256.field_name(), sha256));

        Self { paragraph }
    }

    /// The `Label` field.
    pub fn label(&self) -> Option<&str> {
        self.field_str("Label")
    }

    /// Entries listed under a checksum field.
    pub fn entries(&self, checksum: ChecksumType) -> Result<Vec<ReleaseFileEntry>> {
        let field = match self.field(checksum.field_name()) {
            Some(field) => field,
            None => return Ok(vec![]),
        };

        field
            .iter_lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| -> Result<ReleaseFileEntry> {
                let parts = line.split_ascii_whitespace().collect::<Vec<_>>();

                match parts.as_slice() {
                    [digest, size, path] => Ok(ReleaseFileEntry {
                        path: path.to_string(),
                        digest: digest.to_string(),
                        size: size.parse()?,
                    }),
                    _ => Err(HwpackError::ControlParse(format!(
                        "malformed {} entry: {}",
                        checksum.field_name(),
                        line
                    ))),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read() -> Result<()> {
        let release = ReleaseFile::for_index_files(
            Some("hwpack-local"),
            vec![("Packages", &b"Package: foo\n"[..])],
        );

        let rendered = release.to_string();
        assert!(rendered.starts_with("Label: hwpack-local\nMD5Sum: \n "));

        let parsed = ReleaseFile::from_reader(std::io::Cursor::new(rendered.into_bytes()))?;
        assert_eq!(parsed.label(), Some("hwpack-local"));

        let entries = parsed.entries(ChecksumType::Sha256)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "Packages");
        assert_eq!(entries[0].size, 13);
        assert_eq!(entries[0].digest, digest_bytes(b"Package: foo\n").sha256);

        Ok(())
    }

    #[test]
    fn no_label() -> Result<()> {
        let release = ReleaseFile::for_index_files(None, vec![]);
        assert_eq!(release.label(), None);
        assert!(release.entries(ChecksumType::Md5)?.is_empty());

        Ok(())
    }
}
