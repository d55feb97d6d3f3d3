// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Synthesis of simple binary packages. */

use {
    crate::{
        control::{ControlField, ControlParagraph},
        deb::builder::DebBuilder,
        error::{HwpackError, Result},
        io::Compression,
        package_version::PackageVersion,
    },
    log::debug,
    std::path::PathBuf,
    tempfile::TempDir,
};

/// Relationship fields accepted by [PackageMaker::make_package], in control file order.
const RELATIONSHIP_ORDER: &[&str] = &[
    "Depends",
    "Pre-Depends",
    "Conflicts",
    "Recommends",
    "Provides",
    "Replaces",
    "Breaks",
];

const DESCRIPTION: &str =
    "Dummy package to install a hwpack\n This package was created automatically";

/// The version as it appears in a `.deb` filename.
///
/// Hardware pack versions only need to be free of whitespace, so strings that
/// are not Debian versions are used verbatim.
fn filename_version(version: &str) -> String {
    match PackageVersion::parse(version) {
        Ok(parsed) => parsed.without_epoch(),
        Err(_) => version.to_string(),
    }
}

/// Builds `.deb` files into a scratch directory owned by the maker.
pub struct PackageMaker {
    tempdir: TempDir,
    mtime: u64,
}

impl PackageMaker {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tempdir: tempfile::Builder::new()
                .prefix("hwpack-package-maker-")
                .tempdir()?,
            mtime: 0,
        })
    }

    /// Set the modification time recorded in generated packages.
    pub fn set_mtime(&mut self, mtime: u64) {
        self.mtime = mtime;
    }

    /// Build a binary package.
    ///
    /// `relationships` maps field names like `Depends` to values. Each entry of
    /// `files` is installed with content `<name> <path>`. Returns the path of
    /// the `.deb`.
    pub fn make_package(
        &self,
        name: &str,
        version: &str,
        relationships: &[(&str, &str)],
        architecture: &str,
        files: &[&str],
    ) -> Result<PathBuf> {
        for (field, _) in relationships {
            if !RELATIONSHIP_ORDER.contains(field) {
                return Err(HwpackError::UnknownRelationship(field.to_string()));
            }
        }

        let mut control = ControlParagraph::default();
        control.set_field_from_string("Package", name);
        control.set_field_from_string("Version", version);
        control.set_field_from_string("Architecture", architecture);
        control.set_field_from_string("Maintainer", "Nobody");

        for field in RELATIONSHIP_ORDER {
            if let Some((_, value)) = relationships.iter().find(|(f, _)| f == field) {
                control.set_field_from_string(field, value);
            }
        }

        control.set_field(ControlField::new("Description", DESCRIPTION));

        let mut builder = DebBuilder::new(control)
            .set_compression(Compression::Gzip)
            .set_mtime(self.mtime);

        for path in files {
            builder = builder.install_file(path, format!("{} {}", name, path), false);
        }

        let path = self.tempdir.path().join(format!(
            "{}_{}_{}.deb",
            name,
            filename_version(version),
            architecture
        ));

        let mut fh = std::io::BufWriter::new(std::fs::File::create(&path)?);
        builder.write(&mut fh)?;
        fh.into_inner()?;

        debug!("generated {}", path.display());

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::deb::reader::{read_data_file, resolve_control_file},
        std::{fs::File, io::BufReader},
    };

    #[test]
    fn control_file_layout() -> Result<()> {
        let maker = PackageMaker::new()?;
        let path = maker.make_package(
            "hwpack-ahwpack",
            "1:4",
            &[("Breaks", "old-hwpack"), ("Depends", "foo, bar")],
            "armel",
            &[],
        )?;

        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "hwpack-ahwpack_4_armel.deb"
        );

        let (control, raw) = resolve_control_file(BufReader::new(File::open(&path)?))?;
        assert_eq!(
            raw,
            "Package: hwpack-ahwpack\n\
             Version: 1:4\n\
             Architecture: armel\n\
             Maintainer: Nobody\n\
             Depends: foo, bar\n\
             Breaks: old-hwpack\n\
             Description: Dummy package to install a hwpack\n \
             This package was created automatically\n"
        );
        assert!(!raw.contains("\n\n"));
        assert_eq!(control.field_str("Depends"), Some("foo, bar"));

        Ok(())
    }

    #[test]
    fn relationships_round_trip() -> Result<()> {
        let maker = PackageMaker::new()?;
        let relationships = [
            ("Depends", "a (>= 1.0)"),
            ("Pre-Depends", "b"),
            ("Conflicts", "c"),
            ("Recommends", "d | e"),
            ("Provides", "f"),
            ("Replaces", "g"),
            ("Breaks", "h (<< 2)"),
        ];
        let path = maker.make_package("foo", "1.0", &relationships, "all", &[])?;

        let (control, _) = resolve_control_file(BufReader::new(File::open(&path)?))?;
        for (field, value) in relationships {
            assert_eq!(control.field_str(field), Some(value));
        }

        Ok(())
    }

    #[test]
    fn non_debian_version() -> Result<()> {
        let maker = PackageMaker::new()?;
        let path = maker.make_package("hwpack-foo", "beta1", &[], "armel", &[])?;

        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "hwpack-foo_beta1_armel.deb"
        );

        let (control, _) = resolve_control_file(BufReader::new(File::open(&path)?))?;
        assert_eq!(control.field_str("Version"), Some("beta1"));

        Ok(())
    }

    #[test]
    fn unknown_relationship() -> Result<()> {
        let maker = PackageMaker::new()?;
        assert!(matches!(
            maker.make_package("foo", "1.0", &[("Suggests", "bar")], "all", &[]),
            Err(HwpackError::UnknownRelationship(_))
        ));

        Ok(())
    }

    #[test]
    fn files_and_determinism() -> Result<()> {
        let maker = PackageMaker::new()?;
        let path = maker.make_package("foo", "1.0", &[], "all", &["usr/share/foo/bar"])?;
        let first = std::fs::read(&path)?;

        assert_eq!(
            read_data_file(BufReader::new(File::open(&path)?), "usr/share/foo/bar")?,
            Some(b"foo usr/share/foo/bar".to_vec())
        );

        let path = maker.make_package("foo", "1.0", &[], "all", &["usr/share/foo/bar"])?;
        assert_eq!(std::fs::read(&path)?, first);

        Ok(())
    }
}
