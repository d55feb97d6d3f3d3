// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Flat APT repositories made from `.deb` files on disk. */

use {
    crate::{
        control::ControlFile,
        deb::reader::resolve_control_file,
        error::{HwpackError, Result},
        io::digest_path,
        release::ReleaseFile,
    },
    log::debug,
    std::{
        fs::File,
        io::BufReader,
        path::{Path, PathBuf},
    },
    tempfile::TempDir,
};

/// Write `Packages` (and `Release` when labelled) for `.deb` files inside `dir`.
///
/// `Filename` entries are relative to `dir`.
pub fn write_flat_archive_indices(dir: &Path, debs: &[PathBuf], label: Option<&str>) -> Result<()> {
    let mut packages = ControlFile::default();

    for deb in debs {
        let relative = deb.strip_prefix(dir).map_err(|_| {
            HwpackError::Archive(format!(
                "{} is not inside {}",
                deb.display(),
                dir.display()
            ))
        })?;

        let (mut control, _) = resolve_control_file(BufReader::new(File::open(deb)?))?;
        let digest = digest_path(deb)?;

        control.set_field_from_string("Filename", relative.display());
        control.set_field_from_string("Size", digest.size);
        control.set_field_from_string("MD5sum", &digest.md5);
        control.set_field_from_string("SHA256", &digest.sha256);

        packages.add_paragraph(control.into());
    }

    let mut packages_data = vec![];
    packages.write(&mut packages_data)?;
    std::fs::write(dir.join("Packages"), &packages_data)?;

    if let Some(label) = label {
        let release =
            ReleaseFile::for_index_files(Some(label), vec![("Packages", packages_data.as_slice())]);
        std::fs::write(dir.join("Release"), release.to_string())?;
    }

    Ok(())
}

/// Creates throwaway flat repositories for local `.deb` files.
///
/// Every repository lives in its own scratch directory, removed when the
/// maker is dropped.
#[derive(Default)]
pub struct LocalArchiveMaker {
    archives: Vec<TempDir>,
}

impl LocalArchiveMaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding copies of `debs`.
    ///
    /// Returns the sources entry to reach it: `file://<dir> ./`.
    pub fn sources_entry_for_debs(
        &mut self,
        debs: &[impl AsRef<Path>],
        label: Option<&str>,
    ) -> Result<String> {
        let tempdir = tempfile::Builder::new()
            .prefix("hwpack-localdebs-")
            .tempdir()?;
        let dir = tempdir.path().to_path_buf();

        let mut copies = vec![];
        for deb in debs {
            let deb = deb.as_ref();
            let basename = deb.file_name().ok_or_else(|| {
                HwpackError::Archive(format!("{} has no file name", deb.display()))
            })?;

            let dest = dir.join(basename);
            std::fs::copy(deb, &dest)?;
            copies.push(dest);
        }

        write_flat_archive_indices(&dir, &copies, label)?;
        debug!("created local archive in {} with {} packages", dir.display(), copies.len());

        self.archives.push(tempdir);

        Ok(format!("file://{} ./", dir.display()))
    }
}
