// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Writing hardware pack tarballs.

A hardware pack is a gzip compressed tar archive with these members, in
this order:

```text
FORMAT
metadata
<extracted-dir>/<file>
pkgs/
pkgs/<pkgname>_<ver>_<arch>.deb
manifest
pkgs/Packages
sources.list.d/
sources.list.d/<id>.list
sources.list.d.gpg/
```

Every member is owned by uid and gid 1000 (`user` / `group`) and carries
the same modification time, which is also written to the gzip header. Given
the same inputs and time, output is byte identical.
*/

use {
    crate::{
        error::{HwpackError, Result},
        io::gzip_encoder,
        metadata::Metadata,
        packages::{packages_file_content, FetchedPackage},
    },
    log::warn,
    std::{
        collections::BTreeSet,
        io::{Read, Write},
        path::{Path, PathBuf},
    },
};

const OWNER_ID: u64 = 1000;
const OWNER_NAME: &str = "user";
const GROUP_NAME: &str = "group";

/// A file to place inside the hardware pack.
#[derive(Clone, Debug)]
struct ExtractedFile {
    /// Directory in the hardware pack.
    directory: String,
    /// Filesystem path of the content.
    source: PathBuf,
}

impl ExtractedFile {
    fn member_name(&self) -> Result<String> {
        let basename = self.source.file_name().ok_or_else(|| {
            HwpackError::Archive(format!("{} has no file name", self.source.display()))
        })?;

        Ok(format!("{}/{}", self.directory, basename.to_string_lossy()))
    }
}

/// A hardware pack under construction.
#[derive(Clone, Debug)]
pub struct Hwpack {
    metadata: Metadata,
    packages: Vec<FetchedPackage>,
    sources: Vec<(String, String)>,
    files: Vec<ExtractedFile>,
    mtime: u64,
}

impl Hwpack {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            packages: vec![],
            sources: vec![],
            files: vec![],
            mtime: 0,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Set the modification time of every member and of the gzip header.
    pub fn set_mtime(&mut self, mtime: u64) {
        self.mtime = mtime;
    }

    /// Name of the tarball: `hwpack_<name>_<version>_<arch>[_<support>].tar.gz`.
    pub fn filename(&self) -> String {
        let mut name = format!(
            "hwpack_{}_{}_{}",
            self.metadata.name(),
            self.metadata.version(),
            self.metadata.architecture()
        );

        if let Some(support) = self.metadata.support() {
            name.push('_');
            name.push_str(support);
        }

        name.push_str(".tar.gz");

        name
    }

    /// Register a source whose list file goes in `sources.list.d/<id>.list`.
    pub fn add_source(&mut self, id: impl ToString, entry: impl ToString) {
        self.sources.push((id.to_string(), entry.to_string()));
    }

    /// Record packages in the manifest and index.
    ///
    /// Packages with content are also stored under `pkgs/`.
    pub fn add_packages(&mut self, packages: impl IntoIterator<Item = FetchedPackage>) {
        self.packages.extend(packages);
    }

    pub fn packages(&self) -> &[FetchedPackage] {
        &self.packages
    }

    /// Add a file from the filesystem below `directory`.
    ///
    /// Returns the path of the member inside the hardware pack. A member
    /// name is only written once: later files with the same name are dropped.
    pub fn add_file(&mut self, directory: &str, source: impl AsRef<Path>) -> Result<String> {
        let file = ExtractedFile {
            directory: directory.trim_matches('/').to_string(),
            source: source.as_ref().to_path_buf(),
        };
        let name = file.member_name()?;

        for existing in &self.files {
            if existing.member_name()? == name {
                if existing.source != file.source {
                    warn!(
                        "{} already holds {}; ignoring {}",
                        name,
                        existing.source.display(),
                        file.source.display()
                    );
                }

                return Ok(name);
            }
        }

        self.files.push(file);

        Ok(name)
    }

    /// The `manifest` content: `<name>=<version>` per package.
    pub fn manifest(&self) -> String {
        self.packages
            .iter()
            .map(|p| format!("{}={}\n", p.name, p.version))
            .collect()
    }

    fn header(&self, entry_type: tar::EntryType, mode: u32, size: u64) -> Result<tar::Header> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_size(size);
        header.set_uid(OWNER_ID);
        header.set_gid(OWNER_ID);
        header.set_username(OWNER_NAME)?;
        header.set_groupname(GROUP_NAME)?;
        header.set_mtime(self.mtime);

        Ok(header)
    }

    fn append_directory<W: Write>(&self, builder: &mut tar::Builder<W>, name: &str) -> Result<()> {
        let mut header = self.header(tar::EntryType::Directory, 0o755, 0)?;
        builder.append_data(&mut header, name, std::io::empty())?;

        Ok(())
    }

    fn append_data<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        name: &str,
        size: u64,
        data: impl Read,
    ) -> Result<()> {
        let mut header = self.header(tar::EntryType::Regular, 0o644, size)?;
        builder.append_data(&mut header, name, data)?;

        Ok(())
    }

    /// Write the gzip compressed tarball.
    pub fn write<W: Write>(&self, writer: W) -> Result<W> {
        let mut builder = tar::Builder::new(gzip_encoder(writer, self.mtime)?);

        let format = format!("{}\n", self.metadata.format());
        self.append_data(&mut builder, "FORMAT", format.len() as _, format.as_bytes())?;

        let metadata = self.metadata.render()?;
        self.append_data(&mut builder, "metadata", metadata.len() as _, metadata.as_bytes())?;

        let mut seen_dirs = BTreeSet::new();
        for file in &self.files {
            let mut dir = String::new();
            for component in file.directory.split('/').filter(|s| !s.is_empty()) {
                if !dir.is_empty() {
                    dir.push('/');
                }
                dir.push_str(component);

                if seen_dirs.insert(dir.clone()) {
                    self.append_directory(&mut builder, &dir)?;
                }
            }

            let fh = std::fs::File::open(&file.source)?;
            let size = fh.metadata()?.len();
            self.append_data(&mut builder, &file.member_name()?, size, fh)?;
        }

        self.append_directory(&mut builder, "pkgs")?;
        for package in &self.packages {
            if let Some(path) = package.content_path() {
                let fh = std::fs::File::open(path)?;
                let size = fh.metadata()?.len();
                self.append_data(&mut builder, &format!("pkgs/{}", package.filename), size, fh)?;
            }
        }

        let manifest = self.manifest();
        self.append_data(&mut builder, "manifest", manifest.len() as _, manifest.as_bytes())?;

        let index = packages_file_content(self.packages.iter().filter(|p| p.has_content()));
        self.append_data(&mut builder, "pkgs/Packages", index.len() as _, index.as_bytes())?;

        self.append_directory(&mut builder, "sources.list.d")?;
        for (id, entry) in &self.sources {
            let line = format!("deb {}\n", entry);
            self.append_data(
                &mut builder,
                &format!("sources.list.d/{}.list", id),
                line.len() as _,
                line.as_bytes(),
            )?;
        }

        self.append_directory(&mut builder, "sources.list.d.gpg")?;

        let encoder = builder.into_inner()?;

        Ok(encoder.finish().into_result()?)
    }
}
