// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixtures shared by tests.

use {
    crate::{
        control::ControlParagraph, deb::builder::DebBuilder, error::Result,
        local_archive::write_flat_archive_indices, package_version::PackageVersion,
    },
    std::path::{Path, PathBuf},
};

/// Construct a binary package control paragraph.
pub fn control(
    name: &str,
    version: &str,
    architecture: &str,
    fields: &[(&str, &str)],
) -> ControlParagraph {
    let mut para = ControlParagraph::default();
    para.set_field_from_string("Package", name);
    para.set_field_from_string("Version", version);
    para.set_field_from_string("Architecture", architecture);

    for (key, value) in fields {
        para.set_field_from_string(key, value);
    }

    para
}

/// Write a `.deb` for a control paragraph holding the given files.
///
/// The file is named `<package>_<version>_<arch>.deb` in `dir`.
pub fn write_deb_with_files(
    dir: &Path,
    control: &ControlParagraph,
    files: &[(&str, &[u8])],
) -> Result<PathBuf> {
    let version = PackageVersion::parse(control.required_field_str("Version")?)?;
    let path = dir.join(format!(
        "{}_{}_{}.deb",
        control.required_field_str("Package")?,
        version.without_epoch(),
        control.required_field_str("Architecture")?
    ));

    let mut builder = DebBuilder::new(control.clone());
    for (file, data) in files {
        builder = builder.install_file(file, data.to_vec(), false);
    }

    let mut data = vec![];
    builder.write(&mut data)?;
    std::fs::write(&path, data)?;

    Ok(path)
}

/// Write a `.deb` holding a single documentation file.
pub fn write_deb(dir: &Path, control: &ControlParagraph) -> Result<PathBuf> {
    let doc = format!(
        "usr/share/doc/{}/README",
        control.required_field_str("Package")?
    );

    write_deb_with_files(dir, control, &[(doc.as_str(), &b"dummy package\n"[..])])
}

/// Write a flat repository with one `.deb` per control paragraph.
pub fn write_flat_archive(
    dir: &Path,
    controls: &[ControlParagraph],
    label: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let debs = controls
        .iter()
        .map(|c| write_deb(dir, c))
        .collect::<Result<Vec<_>>>()?;

    write_flat_archive_indices(dir, &debs, label)?;

    Ok(debs)
}
