// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Extraction of files from `.deb` packages. */

use {
    crate::{
        error::{HwpackError, Result},
        subprocess::run_pipeline,
    },
    std::{
        collections::HashSet,
        path::{Component, Path, PathBuf},
    },
    tempfile::TempDir,
};

/// Unpacks `.deb` files into a scratch directory it owns.
///
/// Each package is extracted into `<scratch>/<deb basename>` with
/// `dpkg --fsys-tarfile <deb> | tar -C <dir> -xf -`.
pub struct PackageUnpacker {
    tempdir: TempDir,
    unpacked: HashSet<PathBuf>,
}

impl PackageUnpacker {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tempdir: tempfile::Builder::new()
                .prefix("hwpack-unpacker-")
                .tempdir()?,
            unpacked: HashSet::new(),
        })
    }

    fn target_dir(&self, deb: &Path) -> Result<PathBuf> {
        let basename = deb.file_name().ok_or_else(|| {
            HwpackError::Archive(format!("{} has no file name", deb.display()))
        })?;

        Ok(self.tempdir.path().join(basename))
    }

    /// Extract the filesystem tree of a package, returning the directory holding it.
    pub fn unpack_package(&mut self, deb: &Path) -> Result<PathBuf> {
        let target = self.target_dir(deb)?;
        std::fs::create_dir_all(&target)?;

        run_pipeline(
            &[
                "dpkg".to_string(),
                "--fsys-tarfile".to_string(),
                deb.display().to_string(),
            ],
            &[
                "tar".to_string(),
                "-C".to_string(),
                target.display().to_string(),
                "-xf".to_string(),
                "-".to_string(),
            ],
        )?;

        self.unpacked.insert(deb.to_path_buf());

        Ok(target)
    }

    /// Obtain the extracted location of a file inside a package.
    ///
    /// The package is unpacked on first use. `path` must be relative and must
    /// not contain `..` components.
    pub fn get_file(&mut self, deb: &Path, path: &str) -> Result<PathBuf> {
        if Path::new(path)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(HwpackError::Archive(format!(
                "path inside {} must be relative and stay within the package: {}",
                deb.display(),
                path
            )));
        }

        let target = if self.unpacked.contains(deb) {
            self.target_dir(deb)?
        } else {
            self.unpack_package(deb)?
        };

        let file = target.join(path);
        if file.exists() {
            Ok(file)
        } else {
            Err(HwpackError::Archive(format!(
                "{} not found in {}",
                path,
                deb.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testutil::{control, write_deb_with_files},
    };

    fn have_tools() -> bool {
        let available = which::which("dpkg").is_ok() && which::which("tar").is_ok();
        if !available {
            eprintln!("dpkg or tar not available; skipping test");
        }
        available
    }

    #[test]
    fn extract_file() -> Result<()> {
        if !have_tools() {
            return Ok(());
        }

        let td = tempfile::tempdir()?;
        let deb = write_deb_with_files(
            td.path(),
            &control("u-boot", "1.0", "armel", &[]),
            &[("usr/lib/u-boot/u-boot.img", &b"#1"[..])],
        )?;

        let mut unpacker = PackageUnpacker::new()?;
        let path = unpacker.get_file(&deb, "usr/lib/u-boot/u-boot.img")?;
        assert_eq!(std::fs::read(&path)?, b"#1");

        // Cached unpack.
        let again = unpacker.get_file(&deb, "usr/lib/u-boot/u-boot.img")?;
        assert_eq!(path, again);

        assert!(matches!(
            unpacker.get_file(&deb, "usr/lib/u-boot/missing"),
            Err(HwpackError::Archive(_))
        ));

        Ok(())
    }

    #[test]
    fn absolute_path_rejected() -> Result<()> {
        let mut unpacker = PackageUnpacker::new()?;
        assert!(matches!(
            unpacker.get_file(Path::new("/tmp/foo.deb"), "/etc/passwd"),
            Err(HwpackError::Archive(_))
        ));

        Ok(())
    }

    #[test]
    fn parent_components_rejected() -> Result<()> {
        let mut unpacker = PackageUnpacker::new()?;

        for path in ["../../etc/passwd", "usr/lib/../../../etc/passwd", ".."] {
            assert!(matches!(
                unpacker.get_file(Path::new("/tmp/foo.deb"), path),
                Err(HwpackError::Archive(_))
            ));
        }

        Ok(())
    }

    #[test]
    fn broken_deb() -> Result<()> {
        if !have_tools() {
            return Ok(());
        }

        let td = tempfile::tempdir()?;
        let deb = td.path().join("broken.deb");
        std::fs::write(&deb, b"not a deb")?;

        let mut unpacker = PackageUnpacker::new()?;
        assert!(matches!(
            unpacker.unpack_package(&deb),
            Err(HwpackError::SubcommandFailed { .. })
        ));

        Ok(())
    }
}
