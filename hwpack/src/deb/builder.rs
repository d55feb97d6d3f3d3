// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create .deb package files and their components. */

use {
    crate::{
        control::ControlParagraph,
        error::Result,
        io::{compress, digest_bytes, Compression},
    },
    std::{
        collections::{BTreeMap, BTreeSet},
        io::{Read, Write},
        path::{Path, PathBuf},
    },
};

/// A file to install, keyed by its path relative to the filesystem root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DebFile {
    pub data: Vec<u8>,
    pub executable: bool,
}

/// A builder for a `.deb` package file.
///
/// Output is fully determined by the control paragraph, the installed files
/// and the modification time.
pub struct DebBuilder {
    control: ControlParagraph,
    compression: Compression,
    install_files: BTreeMap<PathBuf, DebFile>,
    mtime: u64,
}

impl DebBuilder {
    /// Construct a new instance using a control paragraph.
    pub fn new(control: ControlParagraph) -> Self {
        Self {
            control,
            compression: Compression::Gzip,
            install_files: BTreeMap::new(),
            mtime: 0,
        }
    }

    /// Set the compression format to use.
    pub fn set_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the modified time, in seconds since the UNIX epoch, of archive members.
    pub fn set_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Register a file as to be installed by this package.
    ///
    /// Filenames should be relative to the filesystem root. e.g. `usr/bin/myapp`.
    pub fn install_file(
        mut self,
        path: impl AsRef<Path>,
        data: impl Into<Vec<u8>>,
        executable: bool,
    ) -> Self {
        let path = path
            .as_ref()
            .strip_prefix("/")
            .unwrap_or_else(|_| path.as_ref())
            .to_path_buf();

        self.install_files.insert(
            path,
            DebFile {
                data: data.into(),
                executable,
            },
        );
        self
    }

    fn md5sums(&self) -> Vec<u8> {
        let mut entries = vec![];

        for (path, file) in &self.install_files {
            entries.extend_from_slice(
                format!("{}  {}\n", digest_bytes(&file.data).md5, path.display()).as_bytes(),
            );
        }

        entries
    }

    fn append_member<W: Write>(
        &self,
        builder: &mut ar::Builder<W>,
        name: &str,
        data: &[u8],
    ) -> Result<()> {
        let mut header = ar::Header::new(name.as_bytes().to_vec(), data.len() as _);
        header.set_mode(0o644);
        header.set_mtime(self.mtime);
        header.set_uid(0);
        header.set_gid(0);
        builder.append(&header, data)?;

        Ok(())
    }

    /// Write `.deb` file content to a writer.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut ar_builder = ar::Builder::new(writer);

        self.append_member(&mut ar_builder, "debian-binary", b"2.0\n")?;

        let mut control_data = vec![];
        self.control.write(&mut control_data)?;

        let mut control_files = BTreeMap::new();
        control_files.insert(
            PathBuf::from("control"),
            DebFile {
                data: control_data,
                executable: false,
            },
        );
        control_files.insert(
            PathBuf::from("md5sums"),
            DebFile {
                data: self.md5sums(),
                executable: false,
            },
        );

        let mut control_tar = vec![];
        write_deb_tar(&mut control_tar, &control_files, self.mtime)?;
        let control_tar = compress(&control_tar, self.compression, self.mtime)?;
        self.append_member(
            &mut ar_builder,
            &format!("control.tar{}", self.compression.extension()),
            &control_tar,
        )?;

        let mut data_tar = vec![];
        write_deb_tar(&mut data_tar, &self.install_files, self.mtime)?;
        let data_tar = compress(&data_tar, self.compression, self.mtime)?;
        self.append_member(
            &mut ar_builder,
            &format!("data.tar{}", self.compression.extension()),
            &data_tar,
        )?;

        Ok(())
    }
}

fn new_tar_header(mtime: u64) -> Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_mtime(mtime);

    Ok(header)
}

/// Write a member name directly into a GNU header.
///
/// `header.set_path()` normalizes away a leading `./`, which Debian archives
/// in the wild carry. Names that do not fit get a `././@LongLink` entry.
fn set_header_path(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    name: &str,
) -> Result<()> {
    let value_bytes = name.as_bytes();
    let name_buffer = &mut header.as_old_mut().name;

    if value_bytes.len() <= name_buffer.len() {
        name_buffer[0..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        let mut long_header = tar::Header::new_gnu();
        let long_name = b"././@LongLink";
        long_header.as_old_mut().name[..long_name.len()].clone_from_slice(&long_name[..]);
        long_header.set_mode(0o644);
        long_header.set_uid(0);
        long_header.set_gid(0);
        long_header.set_mtime(0);
        long_header.set_size(value_bytes.len() as u64 + 1);
        long_header.set_entry_type(tar::EntryType::new(b'L'));
        long_header.set_cksum();
        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&long_header, &mut data)?;

        let truncated_bytes = &value_bytes[0..name_buffer.len()];
        name_buffer[0..truncated_bytes.len()].copy_from_slice(truncated_bytes);
    }

    Ok(())
}

/// Write a tar archive suitable for inclusion in a `.deb` archive.
///
/// Paths are emitted with a `./` prefix and every parent directory gets its
/// own entry ahead of its contents.
pub fn write_deb_tar<W: Write>(
    writer: W,
    files: &BTreeMap<PathBuf, DebFile>,
    mtime: u64,
) -> Result<()> {
    let mut builder = tar::Builder::new(writer);

    let mut directories = BTreeSet::new();
    for path in files.keys() {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if p.as_os_str().is_empty() {
                break;
            }
            directories.insert(p.to_path_buf());
            parent = p.parent();
        }
    }

    let directory_names = std::iter::once("./".to_string())
        .chain(directories.iter().map(|d| format!("./{}/", d.display())));

    for name in directory_names {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, &name)?;
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_cksum();
        builder.append(&header, std::io::empty())?;
    }

    // BTreeMap iteration is deterministic.
    for (path, file) in files {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, &format!("./{}", path.display()))?;
        header.set_mode(if file.executable { 0o755 } else { 0o644 });
        header.set_size(file.data.len() as _);
        header.set_cksum();
        builder.append(&header, file.data.as_slice())?;
    }

    builder.finish()?;

    Ok(())
}

/// Read every regular file out of an uncompressed tar stream.
///
/// Used by tests to inspect generated archives.
#[cfg(test)]
pub(crate) fn tar_files(reader: impl Read) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = tar::Archive::new(reader);
    let mut files = vec![];

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = String::from_utf8_lossy(&entry.path_bytes()).to_string();
        let mut data = vec![];
        entry.read_to_end(&mut data)?;
        files.push((path, data));
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::io::read_decompressed};

    #[test]
    fn test_write_data_tar_one_file() -> Result<()> {
        let mut files = BTreeMap::new();
        files.insert(
            PathBuf::from("foo/bar.txt"),
            DebFile {
                data: vec![42],
                executable: true,
            },
        );

        let mut buffer = vec![];
        write_deb_tar(&mut buffer, &files, 2)?;

        let paths = tar_files(std::io::Cursor::new(buffer))?
            .into_iter()
            .map(|(path, _)| path)
            .collect::<Vec<_>>();

        assert_eq!(paths, vec!["./", "./foo/", "./foo/bar.txt"]);

        Ok(())
    }

    #[test]
    fn test_write_data_tar_long_path() -> Result<()> {
        let long_path = PathBuf::from(format!("f{}.txt", "u".repeat(200)));

        let mut files = BTreeMap::new();
        files.insert(
            long_path,
            DebFile {
                data: vec![42],
                executable: false,
            },
        );

        let mut buffer = vec![];
        write_deb_tar(&mut buffer, &files, 2)?;

        let entries = tar_files(std::io::Cursor::new(buffer))?;
        assert_eq!(entries[1].0, format!("./f{}.txt", "u".repeat(200)));

        Ok(())
    }

    #[test]
    fn test_write_deb() -> Result<()> {
        let mut control = ControlParagraph::default();
        control.set_field_from_string("Package", "mypackage");
        control.set_field_from_string("Architecture", "amd64");

        let builder = DebBuilder::new(control)
            .set_compression(Compression::Zstd)
            .install_file("usr/bin/myapp", vec![42], true);

        let mut buffer = vec![];
        builder.write(&mut buffer)?;

        let mut archive = ar::Archive::new(std::io::Cursor::new(buffer));
        {
            let entry = archive.next_entry().unwrap().unwrap();
            assert_eq!(entry.header().identifier(), b"debian-binary");
        }
        {
            let mut entry = archive.next_entry().unwrap().unwrap();
            assert_eq!(entry.header().identifier(), b"control.tar.zst");

            let mut data = vec![];
            entry.read_to_end(&mut data)?;
            let reader =
                read_decompressed(Box::new(std::io::Cursor::new(data)), Compression::Zstd)?;
            let files = tar_files(reader)?;
            let md5sums = files
                .iter()
                .find(|(path, _)| path == "./md5sums")
                .expect("md5sums should be present");
            assert_eq!(
                String::from_utf8_lossy(&md5sums.1),
                format!("{}  usr/bin/myapp\n", digest_bytes(&[42]).md5)
            );
        }
        {
            let entry = archive.next_entry().unwrap().unwrap();
            assert_eq!(entry.header().identifier(), b"data.tar.zst");
        }

        assert!(archive.next_entry().is_none());

        Ok(())
    }

    #[test]
    fn deterministic_output() -> Result<()> {
        let build = || -> Result<Vec<u8>> {
            let mut control = ControlParagraph::default();
            control.set_field_from_string("Package", "foo");

            let mut buffer = vec![];
            DebBuilder::new(control)
                .set_mtime(1234)
                .install_file("etc/foo", b"foo".to_vec(), false)
                .write(&mut buffer)?;

            Ok(buffer)
        };

        assert_eq!(build()?, build()?);

        Ok(())
    }
}
