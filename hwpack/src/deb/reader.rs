// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! .deb file reading functionality. */

use {
    crate::{
        binary_package_control::BinaryPackageControlFile,
        control::ControlParagraphReader,
        error::{HwpackError, Result},
        io::{read_decompressed, Compression},
    },
    std::{
        io::{Cursor, Read},
        ops::{Deref, DerefMut},
        path::Path,
    },
};

fn reader_from_filename(extension: &str, data: Cursor<Vec<u8>>) -> Result<Box<dyn Read>> {
    read_decompressed(Box::new(data), Compression::from_extension(extension)?)
}

/// A reader of .deb files.
///
/// A .deb binary package file is an ar archive with 3 entries:
///
/// 1. `debian-binary` holding the version of the binary package format.
/// 2. `control.tar` holding package metadata.
/// 3. `data.tar[.<ext>]` holding file content.
pub struct BinaryPackageReader<R: Read> {
    archive: ar::Archive<R>,
}

impl<R: Read> BinaryPackageReader<R> {
    /// Construct a new instance from a reader.
    pub fn new(reader: R) -> Self {
        Self {
            archive: ar::Archive::new(reader),
        }
    }

    /// Obtain the next entry from the underlying ar archive.
    pub fn next_entry(&mut self) -> Option<Result<BinaryPackageEntry>> {
        let mut entry = match self.archive.next_entry()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e.into())),
        };

        // Member names are ASCII in practice.
        let filename = String::from_utf8_lossy(entry.header().identifier()).to_string();

        let mut data = vec![];
        if let Err(e) = entry.read_to_end(&mut data) {
            return Some(Err(e.into()));
        }
        let data = Cursor::new(data);

        Some(if filename == "debian-binary" {
            Ok(BinaryPackageEntry::DebianBinary(data))
        } else if let Some(tail) = filename.strip_prefix("control.tar") {
            reader_from_filename(tail, data).map(|res| {
                BinaryPackageEntry::Control(TarReader {
                    archive: tar::Archive::new(res),
                })
            })
        } else if let Some(tail) = filename.strip_prefix("data.tar") {
            reader_from_filename(tail, data).map(|res| {
                BinaryPackageEntry::Data(TarReader {
                    archive: tar::Archive::new(res),
                })
            })
        } else {
            Err(HwpackError::DebUnknownBinaryPackageEntry(filename))
        })
    }
}

/// Represents an entry in a .deb archive.
pub enum BinaryPackageEntry {
    /// The `debian-binary` file.
    DebianBinary(Cursor<Vec<u8>>),
    /// The `control.tar` tar archive.
    Control(TarReader),
    /// The `data.tar[.<ext>]` tar archive.
    Data(TarReader),
}

/// A reader for the tar archives embedded in `.deb` files.
pub struct TarReader {
    archive: tar::Archive<Box<dyn Read>>,
}

impl Deref for TarReader {
    type Target = tar::Archive<Box<dyn Read>>;

    fn deref(&self) -> &Self::Target {
        &self.archive
    }
}

impl DerefMut for TarReader {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.archive
    }
}

impl TarReader {
    /// Find a member by path and return its content.
    ///
    /// Leading `./` in member names is ignored.
    pub fn find_file(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let wanted = path.trim_start_matches("./");

        for entry in self.archive.entries()? {
            let mut entry = entry?;
            let entry_path = String::from_utf8_lossy(&entry.path_bytes()).to_string();

            if entry_path.trim_start_matches("./") == wanted {
                let mut data = vec![];
                entry.read_to_end(&mut data)?;
                return Ok(Some(data));
            }
        }

        Ok(None)
    }
}

/// Resolve the `control` file from the `control.tar` file within a `.deb` archive.
///
/// Returns the parsed control paragraph along with the raw file text.
pub fn resolve_control_file(reader: impl Read) -> Result<(BinaryPackageControlFile, String)> {
    let mut reader = BinaryPackageReader::new(reader);

    while let Some(entry) = reader.next_entry() {
        if let BinaryPackageEntry::Control(mut control) = entry? {
            let data = control
                .find_file("control")?
                .ok_or(HwpackError::ControlFileNotFound)?;

            let mut paragraphs = ControlParagraphReader::new(Cursor::new(&data));
            let paragraph = paragraphs.next().ok_or(HwpackError::ControlFileNotFound)??;

            return Ok((
                BinaryPackageControlFile::from(paragraph),
                String::from_utf8_lossy(&data).to_string(),
            ));
        }
    }

    Err(HwpackError::ControlFileNotFound)
}

/// Resolve the `control` file of a `.deb` on the filesystem.
pub fn resolve_control_file_path(path: &Path) -> Result<BinaryPackageControlFile> {
    let fh = std::fs::File::open(path)?;

    Ok(resolve_control_file(std::io::BufReader::new(fh))?.0)
}

/// Read a file out of the `data.tar` of a `.deb` archive.
pub fn read_data_file(reader: impl Read, path: &str) -> Result<Option<Vec<u8>>> {
    let mut reader = BinaryPackageReader::new(reader);

    while let Some(entry) = reader.next_entry() {
        if let BinaryPackageEntry::Data(mut data) = entry? {
            return data.find_file(path);
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{control::ControlParagraph, deb::builder::DebBuilder},
    };

    fn sample_deb() -> Result<Vec<u8>> {
        let mut control = ControlParagraph::default();
        control.set_field_from_string("Package", "foo");
        control.set_field_from_string("Version", "1.0");
        control.set_field_from_string("Architecture", "all");

        let mut buffer = vec![];
        DebBuilder::new(control)
            .install_file("usr/share/foo/data", b"payload".to_vec(), false)
            .write(&mut buffer)?;

        Ok(buffer)
    }

    #[test]
    fn read_control() -> Result<()> {
        let (control, raw) = resolve_control_file(Cursor::new(sample_deb()?))?;

        assert_eq!(control.package()?, "foo");
        assert_eq!(control.version_str()?, "1.0");
        assert_eq!(raw, "Package: foo\nVersion: 1.0\nArchitecture: all\n");

        Ok(())
    }

    #[test]
    fn read_data() -> Result<()> {
        let data = read_data_file(Cursor::new(sample_deb()?), "usr/share/foo/data")?;
        assert_eq!(data, Some(b"payload".to_vec()));

        let missing = read_data_file(Cursor::new(sample_deb()?), "usr/share/foo/other")?;
        assert!(missing.is_none());

        Ok(())
    }

    #[test]
    fn unknown_member() {
        let mut buffer = vec![];
        {
            let mut builder = ar::Builder::new(&mut buffer);
            let header = ar::Header::new(b"bogus".to_vec(), 1);
            builder.append(&header, &b"x"[..]).unwrap();
        }

        let mut reader = BinaryPackageReader::new(Cursor::new(buffer));
        assert!(matches!(
            reader.next_entry(),
            Some(Err(HwpackError::DebUnknownBinaryPackageEntry(_)))
        ));
    }
}
