// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Resolved binary packages and `Packages` indices. */

use {
    crate::{
        binary_package_control::BinaryPackageControlFile,
        control::{ControlFile, ControlParagraph},
        deb::reader::resolve_control_file,
        error::{HwpackError, Result},
        io::digest_path,
    },
    std::{
        fs::File,
        hash::{Hash, Hasher},
        io::BufReader,
        path::{Path, PathBuf},
    },
};

/// Relationship fields carried by [FetchedPackage], in `Packages` order.
const RELATIONSHIP_FIELDS: &[&str] = &[
    "Depends",
    "Pre-Depends",
    "Multi-Arch",
    "Conflicts",
    "Recommends",
    "Provides",
    "Replaces",
    "Breaks",
];

/// A resolved binary package.
///
/// Equality and hashing cover metadata only. The content handle and
/// on-disk path are ignored, so a record read back from a `Packages` index
/// equals the one that was written.
#[derive(Clone, Debug, Default)]
pub struct FetchedPackage {
    pub name: String,
    pub version: String,
    /// Basename of the `.deb`.
    pub filename: String,
    pub size: u64,
    pub md5: String,
    pub architecture: String,
    pub depends: Option<String>,
    pub pre_depends: Option<String>,
    pub multi_arch: Option<String>,
    pub conflicts: Option<String>,
    pub recommends: Option<String>,
    pub provides: Option<String>,
    pub replaces: Option<String>,
    pub breaks: Option<String>,
    content: Option<PathBuf>,
    file_path: Option<PathBuf>,
}

impl PartialEq for FetchedPackage {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for FetchedPackage {}

impl Hash for FetchedPackage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state)
    }
}

impl FetchedPackage {
    #[allow(clippy::type_complexity)]
    fn identity(
        &self,
    ) -> (
        &str,
        &str,
        &str,
        u64,
        &str,
        &str,
        [&Option<String>; 8],
    ) {
        (
            &self.name,
            &self.version,
            &self.filename,
            self.size,
            &self.md5,
            &self.architecture,
            [
                &self.depends,
                &self.pre_depends,
                &self.multi_arch,
                &self.conflicts,
                &self.recommends,
                &self.provides,
                &self.replaces,
                &self.breaks,
            ],
        )
    }

    fn relationship_mut(&mut self, field: &str) -> Option<&mut Option<String>> {
        match field {
            "Depends" => Some(&mut self.depends),
            "Pre-Depends" => Some(&mut self.pre_depends),
            "Multi-Arch" => Some(&mut self.multi_arch),
            "Conflicts" => Some(&mut self.conflicts),
            "Recommends" => Some(&mut self.recommends),
            "Provides" => Some(&mut self.provides),
            "Replaces" => Some(&mut self.replaces),
            "Breaks" => Some(&mut self.breaks),
            _ => None,
        }
    }

    /// Obtain a relationship field by its control file name.
    pub fn relationship(&self, field: &str) -> Option<&str> {
        match field {
            "Depends" => self.depends.as_deref(),
            "Pre-Depends" => self.pre_depends.as_deref(),
            "Multi-Arch" => self.multi_arch.as_deref(),
            "Conflicts" => self.conflicts.as_deref(),
            "Recommends" => self.recommends.as_deref(),
            "Provides" => self.provides.as_deref(),
            "Replaces" => self.replaces.as_deref(),
            "Breaks" => self.breaks.as_deref(),
            _ => None,
        }
    }

    /// Construct an instance from a `Packages` index stanza.
    ///
    /// `Filename`, `Size` and `MD5sum` must be present.
    pub fn from_index_paragraph(control: &BinaryPackageControlFile) -> Result<Self> {
        let filename = control
            .filename()
            .ok_or_else(|| HwpackError::ControlRequiredFieldMissing("Filename".into()))?;
        let size = control
            .size()
            .ok_or_else(|| HwpackError::ControlRequiredFieldMissing("Size".into()))??;
        let md5 = control
            .md5sum()
            .ok_or_else(|| HwpackError::ControlRequiredFieldMissing("MD5sum".into()))?;

        let mut package = Self::from_control(control)?;
        package.filename = filename
            .rsplit('/')
            .next()
            .unwrap_or(filename)
            .to_string();
        package.size = size;
        package.md5 = md5.to_string();

        Ok(package)
    }

    /// Construct an instance from the identity and relationship fields of a control paragraph.
    fn from_control(control: &BinaryPackageControlFile) -> Result<Self> {
        let mut package = Self {
            name: control.package()?.to_string(),
            version: control.version_str()?.to_string(),
            architecture: control.architecture()?.to_string(),
            ..Default::default()
        };

        for field in RELATIONSHIP_FIELDS {
            if let Some(value) = control.field_str(field) {
                if let Some(slot) = package.relationship_mut(field) {
                    *slot = Some(value.to_string());
                }
            }
        }

        Ok(package)
    }

    /// Construct an instance from a `.deb` on disk.
    ///
    /// The control file is read from the archive and the size and MD5 are computed.
    pub fn from_deb_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let (control, _) = resolve_control_file(BufReader::new(File::open(path)?))?;
        let digest = digest_path(path)?;

        let mut package = Self::from_control(&control)?;
        package.filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        package.size = digest.size;
        package.md5 = digest.md5;
        package.content = Some(path.to_path_buf());
        package.file_path = Some(path.to_path_buf());

        Ok(package)
    }

    /// Attach content to this package.
    pub fn with_content(mut self, path: impl AsRef<Path>) -> Self {
        self.content = Some(path.as_ref().to_path_buf());
        self
    }

    /// Remove the content handle from this package.
    pub fn without_content(mut self) -> Self {
        self.content = None;
        self
    }

    /// Whether the `.deb` content is available.
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Path holding the `.deb` content, if any.
    pub fn content_path(&self) -> Option<&Path> {
        self.content.as_deref()
    }

    /// Open a reader over the `.deb` content.
    pub fn open_content(&self) -> Result<Option<BufReader<File>>> {
        self.content
            .as_ref()
            .map(|p| Ok(BufReader::new(File::open(p)?)))
            .transpose()
    }

    /// The path of the `.deb` this package was read from, if constructed from a file.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Render the stanza used in a hardware pack `Packages` index.
    pub fn to_control_paragraph(&self) -> ControlParagraph {
        let mut para = ControlParagraph::default();

        para.set_field_from_string("Package", &self.name);
        para.set_field_from_string("Version", &self.version);
        para.set_field_from_string("Filename", &self.filename);
        para.set_field_from_string("Size", self.size);
        para.set_field_from_string("Architecture", &self.architecture);

        for field in RELATIONSHIP_FIELDS {
            if let Some(value) = self.relationship(field) {
                para.set_field_from_string(field, value);
            }
        }

        para.set_field_from_string("MD5sum", &self.md5);

        para
    }
}

/// Render a `Packages` index over the given packages.
///
/// Stanzas are separated by a blank line.
pub fn packages_file_content<'a>(packages: impl IntoIterator<Item = &'a FetchedPackage>) -> String {
    packages
        .into_iter()
        .map(|p| p.to_control_paragraph().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a `Packages` index into package records.
///
/// Parse failures are reported as [HwpackError::Archive].
pub fn parse_packages_file_content(s: &str) -> Result<Vec<FetchedPackage>> {
    let control = ControlFile::parse_str(s)
        .map_err(|e| HwpackError::Archive(format!("error parsing Packages: {}", e)))?;

    control
        .into_paragraphs()
        .map(|p| {
            FetchedPackage::from_index_paragraph(&BinaryPackageControlFile::from(p))
                .map_err(|e| HwpackError::Archive(format!("error parsing Packages: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{deb::builder::DebBuilder, io::digest_bytes},
        indoc::indoc,
    };

    fn sample() -> FetchedPackage {
        FetchedPackage {
            name: "foo".into(),
            version: "1.1".into(),
            filename: "foo_1.1_all.deb".into(),
            size: 42,
            md5: "00112233445566778899aabbccddeeff".into(),
            architecture: "all".into(),
            depends: Some("bar (>= 1.0), baz | qux".into()),
            provides: Some("foo-virtual".into()),
            ..Default::default()
        }
    }

    #[test]
    fn render_stanza() {
        assert_eq!(
            sample().to_control_paragraph().to_string(),
            indoc! {"
                Package: foo
                Version: 1.1
                Filename: foo_1.1_all.deb
                Size: 42
                Architecture: all
                Depends: bar (>= 1.0), baz | qux
                Provides: foo-virtual
                MD5sum: 00112233445566778899aabbccddeeff
            "}
        );
    }

    #[test]
    fn packages_round_trip() -> Result<()> {
        let mut other = sample();
        other.name = "bar".into();
        other.filename = "bar_1.1_all.deb".into();
        other.depends = None;
        other.breaks = Some("foo (<< 1.0)".into());

        let packages = vec![sample().with_content("/nonexistent"), other];
        let content = packages_file_content(&packages);
        assert!(content.contains("\n\nPackage: bar\n"));

        let parsed = parse_packages_file_content(&content)?;
        assert_eq!(parsed, packages);
        assert!(!parsed[0].has_content());

        Ok(())
    }

    #[test]
    fn index_filename_is_basename() -> Result<()> {
        let parsed = parse_packages_file_content(indoc! {"
            Package: foo
            Version: 1.1
            Architecture: all
            Filename: pool/main/f/foo/foo_1.1_all.deb
            Size: 10
            MD5sum: abc
        "})?;

        assert_eq!(parsed[0].filename, "foo_1.1_all.deb");

        Ok(())
    }

    #[test]
    fn malformed_packages() {
        assert!(matches!(
            parse_packages_file_content("Package: foo\nVersion: 1.0\n"),
            Err(HwpackError::Archive(_))
        ));
        assert!(matches!(
            parse_packages_file_content(" continuation\n"),
            Err(HwpackError::Archive(_))
        ));
    }

    #[test]
    fn from_deb() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("foo_1.0_all.deb");

        let mut control = ControlParagraph::default();
        control.set_field_from_string("Package", "foo");
        control.set_field_from_string("Version", "1.0");
        control.set_field_from_string("Architecture", "all");
        control.set_field_from_string("Depends", "bar");

        let mut data = vec![];
        DebBuilder::new(control).write(&mut data)?;
        std::fs::write(&path, &data)?;

        let package = FetchedPackage::from_deb_path(&path)?;
        assert_eq!(package.name, "foo");
        assert_eq!(package.filename, "foo_1.0_all.deb");
        assert_eq!(package.size, data.len() as u64);
        assert_eq!(package.md5, digest_bytes(&data).md5);
        assert_eq!(package.depends.as_deref(), Some("bar"));
        assert_eq!(package.file_path(), Some(path.as_path()));
        assert!(package.open_content()?.is_some());

        Ok(())
    }
}
