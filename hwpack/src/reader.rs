// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading hardware packs.

[HwpackReader] opens one or more hardware pack tarballs, extracting each into
a scratch directory that lives as long as the reader. Fields are looked up in
the `metadata` of every hardware pack using the same precedence as recipes:
board and bootloader scope, then bootloader, then board, then the top level.
*/

use {
    crate::{
        error::{HwpackError, Result},
        metadata::parse_metadata,
        packages::{parse_packages_file_content, FetchedPackage},
        unpacker::PackageUnpacker,
    },
    log::debug,
    serde_yaml::{Mapping, Value},
    std::{
        collections::BTreeSet,
        path::{Path, PathBuf},
    },
    tempfile::TempDir,
};

/// Hardware pack formats understood by the reader.
pub const SUPPORTED_FORMATS: &[&str] = &["1.0", "2.0", "3.0"];

/// A field found in a hardware pack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldValue {
    pub value: String,
    /// The hardware pack holding the value.
    pub hwpack: PathBuf,
    /// Keys leading to the value in the metadata.
    pub keys: Vec<String>,
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Sequence(items) => items
            .iter()
            .map(value_string)
            .collect::<Vec<_>>()
            .join(" "),
        _ => serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn get_path<'a>(mapping: &'a Mapping, keys: &[String]) -> Option<&'a Value> {
    let (first, rest) = keys.split_first()?;
    let mut value = mapping.get(first.as_str())?;

    for key in rest {
        value = value.as_mapping()?.get(key.as_str())?;
    }

    Some(value)
}

/// An opened hardware pack.
pub struct HwpackTarball {
    path: PathBuf,
    format: String,
    metadata: Mapping,
    manifest: String,
    packages: Vec<FetchedPackage>,
    root: TempDir,
}

impl HwpackTarball {
    /// Extract a hardware pack and parse its `FORMAT`, `metadata`, `manifest` and `pkgs/Packages`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = tempfile::Builder::new().prefix("hwpack-reader-").tempdir()?;

        let fh = std::fs::File::open(path)?;
        let mut archive = tar::Archive::new(libflate::gzip::Decoder::new(fh)?);
        archive.unpack(root.path())?;

        let read_member = |name: &str| -> Result<String> {
            std::fs::read_to_string(root.path().join(name)).map_err(|e| {
                HwpackError::Archive(format!("{} in {}: {}", name, path.display(), e))
            })
        };

        let format = read_member("FORMAT")?.trim_end_matches('\n').to_string();
        if !SUPPORTED_FORMATS.contains(&format.as_str()) {
            return Err(HwpackError::UnsupportedFormat(format));
        }

        let metadata = parse_metadata(&read_member("metadata")?)?;
        let manifest = read_member("manifest")?;
        let packages = parse_packages_file_content(&read_member("pkgs/Packages")?)?;

        debug!(
            "opened {} (format {}, {} packages)",
            path.display(),
            format,
            packages.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            metadata,
            manifest,
            packages,
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The content of `FORMAT` without its trailing newline.
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn metadata(&self) -> &Mapping {
        &self.metadata
    }

    /// The raw `manifest` content.
    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    /// Packages listed in `pkgs/Packages`.
    pub fn packages(&self) -> &[FetchedPackage] {
        &self.packages
    }

    /// Filesystem path of an extracted member, if it exists.
    pub fn member_path(&self, name: &str) -> Option<PathBuf> {
        let name = name.trim_start_matches('/');
        if name.split('/').any(|c| c == "..") {
            return None;
        }

        let path = self.root.path().join(name);
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }

    /// Names of `.deb` files under `pkgs/`.
    fn package_files(&self) -> Result<Vec<String>> {
        let dir = self.root.path().join("pkgs");
        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let mut names = vec![];
        for entry in std::fs::read_dir(dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name.ends_with(".deb") {
                names.push(name);
            }
        }
        names.sort();

        Ok(names)
    }

    /// The bootloader used for lookups when none was requested.
    ///
    /// This is the only bootloader of the hardware pack, if there is exactly one.
    fn default_bootloader(&self) -> Option<String> {
        let bootloaders = self.metadata.get("bootloaders")?.as_mapping()?;

        if bootloaders.len() == 1 {
            bootloaders.keys().next()?.as_str().map(|s| s.to_string())
        } else {
            None
        }
    }

    /// Look up a field using scoped precedence.
    fn lookup(
        &self,
        field: &str,
        board: Option<&str>,
        bootloader: Option<&str>,
    ) -> Option<(String, Vec<String>)> {
        let default_bootloader = self.default_bootloader();
        let bootloader = bootloader.or(default_bootloader.as_deref());
        let key = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut candidates = vec![];
        if let (Some(board), Some(bootloader)) = (board, bootloader) {
            candidates.push(key(&["boards", board, "bootloaders", bootloader, field]));
        }
        if let Some(bootloader) = bootloader {
            candidates.push(key(&["bootloaders", bootloader, field]));
        }
        if let Some(board) = board {
            candidates.push(key(&["boards", board, field]));
        }
        candidates.push(key(&[field]));

        candidates.into_iter().find_map(|keys| {
            get_path(&self.metadata, &keys).map(|value| (value_string(value), keys))
        })
    }
}

/// Reads one or more hardware packs as a unit.
pub struct HwpackReader {
    hwpacks: Vec<HwpackTarball>,
    board: Option<String>,
    bootloader: Option<String>,
    unpacker: PackageUnpacker,
}

impl HwpackReader {
    /// Open hardware packs, scoping lookups to a board and bootloader.
    pub fn open(
        paths: &[impl AsRef<Path>],
        board: Option<&str>,
        bootloader: Option<&str>,
    ) -> Result<Self> {
        let hwpacks = paths
            .iter()
            .map(HwpackTarball::open)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            hwpacks,
            board: board.map(|s| s.to_string()),
            bootloader: bootloader.map(|s| s.to_string()),
            unpacker: PackageUnpacker::new()?,
        })
    }

    pub fn hwpacks(&self) -> &[HwpackTarball] {
        &self.hwpacks
    }

    /// The format of the hardware packs.
    ///
    /// Mixed formats are reported as the sorted distinct values joined by
    /// `and`, e.g. `1.0and2.0`.
    pub fn get_format(&self) -> String {
        let formats = self
            .hwpacks
            .iter()
            .map(|h| h.format.as_str())
            .collect::<BTreeSet<_>>();

        formats.into_iter().collect::<Vec<_>>().join("and")
    }

    /// Look up a field in every hardware pack.
    ///
    /// Hardware packs disagreeing on the value is an error.
    pub fn get_field(&self, field: &str) -> Result<Option<FieldValue>> {
        let mut found: Option<FieldValue> = None;

        for hwpack in &self.hwpacks {
            let (value, keys) =
                match hwpack.lookup(field, self.board.as_deref(), self.bootloader.as_deref()) {
                    Some(v) => v,
                    None => continue,
                };

            match &found {
                Some(first) if first.value != value => {
                    return Err(HwpackError::ConflictingField {
                        field: field.to_string(),
                        first: first.value.clone(),
                        first_source: first.hwpack.clone(),
                        second: value,
                        second_source: hwpack.path.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    found = Some(FieldValue {
                        value,
                        hwpack: hwpack.path.clone(),
                        keys,
                    });
                }
            }
        }

        Ok(found)
    }

    /// Obtain the file named by a field.
    ///
    /// The scoped directories `<board>/<bootloader>/` and `<bootloader>/`
    /// are searched for the file's basename before the value itself. The
    /// returned path is valid for the lifetime of the reader.
    pub fn get_file(&self, field: &str) -> Result<Option<PathBuf>> {
        let found = match self.get_field(field)? {
            Some(found) => found,
            None => return Ok(None),
        };

        let hwpack = self
            .hwpacks
            .iter()
            .find(|h| h.path == found.hwpack)
            .ok_or_else(|| HwpackError::Archive(format!("{} not open", found.hwpack.display())))?;

        let basename = found.value.rsplit('/').next().unwrap_or(&found.value);
        let bootloader = self
            .bootloader
            .clone()
            .or_else(|| hwpack.default_bootloader());

        let mut candidates = vec![];
        if let (Some(board), Some(bootloader)) = (&self.board, &bootloader) {
            candidates.push(format!("{}/{}/{}", board, bootloader, basename));
        }
        if let Some(bootloader) = &bootloader {
            candidates.push(format!("{}/{}", bootloader, basename));
        }
        candidates.push(found.value.clone());

        candidates
            .iter()
            .find_map(|name| hwpack.member_path(name))
            .map(Some)
            .ok_or_else(|| {
                HwpackError::Archive(format!(
                    "{} not found in {}",
                    found.value,
                    hwpack.path.display()
                ))
            })
    }

    /// Find a package stored in one of the hardware packs.
    ///
    /// Matches `pkgs/<name>_<version>[-<revision>]_<arch>.deb`. Unset
    /// criteria match anything. Returns the `pkgs/Packages` record and the
    /// hardware pack holding it.
    pub fn find_package_for(
        &self,
        name: &str,
        version: Option<&str>,
        revision: Option<&str>,
        architecture: Option<&str>,
    ) -> Result<Option<(&FetchedPackage, &HwpackTarball)>> {
        for hwpack in &self.hwpacks {
            for filename in hwpack.package_files()? {
                let stem = filename.trim_end_matches(".deb");
                let parts = stem.splitn(3, '_').collect::<Vec<_>>();
                let (pkg_name, pkg_version, pkg_arch) = match parts.as_slice() {
                    [n, v, a] => (*n, *v, *a),
                    _ => continue,
                };

                if pkg_name != name {
                    continue;
                }

                let version_matches = match (version, revision) {
                    (Some(v), Some(r)) => pkg_version == format!("{}-{}", v, r),
                    (Some(v), None) => {
                        pkg_version == v || pkg_version.starts_with(&format!("{}-", v))
                    }
                    (None, Some(r)) => pkg_version.ends_with(&format!("-{}", r)),
                    (None, None) => true,
                };
                if !version_matches {
                    continue;
                }

                if let Some(arch) = architecture {
                    if pkg_arch != arch {
                        continue;
                    }
                }

                if let Some(package) = hwpack.packages.iter().find(|p| p.filename == filename) {
                    return Ok(Some((package, hwpack)));
                }
            }
        }

        Ok(None)
    }

    /// Extract a file from a package stored in one of the hardware packs.
    pub fn get_file_from_package(
        &mut self,
        path: &str,
        name: &str,
        version: Option<&str>,
        revision: Option<&str>,
        architecture: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let deb = match self.find_package_for(name, version, revision, architecture)? {
            Some((package, hwpack)) => hwpack
                .member_path(&format!("pkgs/{}", package.filename))
                .ok_or_else(|| {
                    HwpackError::Archive(format!(
                        "pkgs/{} not found in {}",
                        package.filename,
                        hwpack.path.display()
                    ))
                })?,
            None => return Ok(None),
        };

        self.unpacker.get_file(&deb, path).map(Some)
    }

    /// `(name, version)` pairs of every manifest, in order.
    pub fn manifest(&self) -> Vec<(String, String)> {
        self.hwpacks
            .iter()
            .flat_map(|h| h.manifest.lines())
            .filter_map(|line| line.split_once('='))
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect()
    }

    /// Packages indexed by every hardware pack.
    pub fn packages(&self) -> impl Iterator<Item = &FetchedPackage> {
        self.hwpacks.iter().flat_map(|h| h.packages.iter())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            config::{Config, OptionValue},
            hwpack::Hwpack,
            metadata::Metadata,
            testutil::{control, write_deb_with_files},
        },
        indoc::indoc,
    };

    const V2_INI: &str = indoc! {"
        [hwpack]
        format = 2.0
        name = ahwpack
        architectures = armel
        packages = foo
        kernel_addr = 0x80000000
        initrd_addr = 0x81000000
        load_addr = 0x80008000
        serial_tty = ttyO2
        wired_interfaces = eth0
        partition_layout = bootfs_rootfs
        mmc_id = 0

        [ubuntu]
        sources-entry = file:///src ./
    "};

    const V3_YAML: &str = indoc! {"
        format: '3.0'
        name: ahwpack
        architectures: [armel]
        packages: [foo]
        sources:
          ubuntu: file:///src ./
        serial_tty: ttyO2
        bootloaders:
          u_boot:
            package: u-boot-global
            file: usr/lib/u-boot/u-boot.img
            extra_boot_options: console=global
        boards:
          panda:
            serial_tty: ttyO3
            bootloaders:
              u_boot:
                package: u-boot-panda
                file: usr/lib/u-boot/u-boot.img
                extra_boot_options: console=panda
    "};

    fn write_hwpack(
        dir: &Path,
        config: &str,
        name: &str,
        setup: impl FnOnce(&mut Hwpack) -> Result<()>,
    ) -> Result<PathBuf> {
        let hint = if config.starts_with('[') { "c.ini" } else { "c.yaml" };
        let config = Config::from_reader(config.as_bytes(), Some(Path::new(hint)))?;

        let mut hwpack = Hwpack::new(Metadata::from_config(&config, "4", "armel"));
        setup(&mut hwpack)?;

        let path = dir.join(name);
        std::fs::write(&path, hwpack.write(vec![])?)?;

        Ok(path)
    }

    #[test]
    fn formats() -> Result<()> {
        let td = tempfile::tempdir()?;
        // Hardware options are ignored in format 1.0 recipes.
        let v1 = write_hwpack(
            td.path(),
            &V2_INI.replace("format = 2.0\n", ""),
            "v1.tar.gz",
            |_| Ok(()),
        )?;
        let v2 = write_hwpack(td.path(), V2_INI, "v2.tar.gz", |_| Ok(()))?;

        assert_eq!(HwpackReader::open(&[&v1], None, None)?.get_format(), "1.0");
        assert_eq!(HwpackReader::open(&[&v2], None, None)?.get_format(), "2.0");
        assert_eq!(
            HwpackReader::open(&[&v2, &v1], None, None)?.get_format(),
            "1.0and2.0"
        );

        Ok(())
    }

    #[test]
    fn unsupported_format() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("bad.tar.gz");

        let mut builder = tar::Builder::new(crate::io::gzip_encoder(vec![], 0)?);
        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        builder.append_data(&mut header, "FORMAT", &b"4.0\n"[..])?;
        let data = builder.into_inner()?.finish().into_result()?;
        std::fs::write(&path, data)?;

        assert!(matches!(
            HwpackReader::open(&[&path], None, None),
            Err(HwpackError::UnsupportedFormat(f)) if f == "4.0"
        ));

        Ok(())
    }

    #[test]
    fn flat_fields() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = write_hwpack(td.path(), V2_INI, "v2.tar.gz", |_| Ok(()))?;

        let reader = HwpackReader::open(&[&path], None, None)?;
        let field = reader.get_field("kernel_addr")?.unwrap();
        assert_eq!(field.value, "0x80000000");
        assert_eq!(field.hwpack, path);
        assert_eq!(field.keys, vec!["kernel_addr".to_string()]);
        assert_eq!(reader.get_field("name")?.unwrap().value, "ahwpack");
        assert_eq!(reader.get_field("dtb_addr")?, None);

        Ok(())
    }

    #[test]
    fn conflicting_fields() -> Result<()> {
        let td = tempfile::tempdir()?;
        let first = write_hwpack(td.path(), V2_INI, "first.tar.gz", |_| Ok(()))?;
        let second = write_hwpack(
            td.path(),
            &V2_INI.replace("0x80000000", "0x90000000"),
            "second.tar.gz",
            |_| Ok(()),
        )?;

        let reader = HwpackReader::open(&[&first, &second], None, None)?;
        assert_eq!(reader.get_field("serial_tty")?.unwrap().value, "ttyO2");

        match reader.get_field("kernel_addr") {
            Err(HwpackError::ConflictingField {
                field,
                first: a,
                second: b,
                ..
            }) => {
                assert_eq!(field, "kernel_addr");
                assert_eq!(a, "0x80000000");
                assert_eq!(b, "0x90000000");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn scoped_fields() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = write_hwpack(td.path(), V3_YAML, "v3.tar.gz", |_| Ok(()))?;

        let reader = HwpackReader::open(&[&path], Some("panda"), Some("u_boot"))?;
        assert_eq!(reader.get_field("serial_tty")?.unwrap().value, "ttyO3");
        let field = reader.get_field("extra_boot_options")?.unwrap();
        assert_eq!(field.value, "console=panda");
        assert_eq!(
            field.keys,
            vec!["boards", "panda", "bootloaders", "u_boot", "extra_boot_options"]
        );

        // Without a board, the only bootloader is used.
        let reader = HwpackReader::open(&[&path], None, None)?;
        assert_eq!(reader.get_field("serial_tty")?.unwrap().value, "ttyO2");
        assert_eq!(
            reader.get_field("extra_boot_options")?.unwrap().value,
            "console=global"
        );
        assert_eq!(reader.get_format(), "3.0");

        Ok(())
    }

    #[test]
    fn files_and_packages() -> Result<()> {
        let td = tempfile::tempdir()?;
        let global = td.path().join("global");
        let board = td.path().join("board");
        std::fs::create_dir_all(&global)?;
        std::fs::create_dir_all(&board)?;
        std::fs::write(global.join("u-boot.img"), b"#1")?;
        std::fs::write(board.join("u-boot.img"), b"#2")?;

        let deb = write_deb_with_files(
            td.path(),
            &control("foo", "1.1-2", "armel", &[]),
            &[("usr/share/foo/data", &b"foo data"[..])],
        )?;

        let path = write_hwpack(td.path(), V3_YAML, "v3.tar.gz", |hwpack| {
            let global_path = hwpack.add_file("u_boot", global.join("u-boot.img"))?;
            hwpack.metadata_mut().set_option(
                &["bootloaders".to_string(), "u_boot".to_string(), "file".to_string()],
                OptionValue::Text(global_path),
            )?;
            hwpack.add_file("panda/u_boot", board.join("u-boot.img"))?;
            hwpack.add_packages([FetchedPackage::from_deb_path(&deb)?]);
            Ok(())
        })?;

        let reader = HwpackReader::open(&[&path], Some("panda"), Some("u_boot"))?;
        let file = reader.get_file("file")?.unwrap();
        assert_eq!(std::fs::read(file)?, b"#2");

        let reader = HwpackReader::open(&[&path], None, Some("u_boot"))?;
        let file = reader.get_file("file")?.unwrap();
        assert_eq!(std::fs::read(file)?, b"#1");
        assert_eq!(reader.get_file("kernel_file")?, None);

        let fetched = FetchedPackage::from_deb_path(&deb)?;
        let (package, hwpack) = reader
            .find_package_for("foo", Some("1.1"), Some("2"), Some("armel"))?
            .unwrap();
        assert_eq!(package.md5, fetched.md5);
        assert_eq!(hwpack.path(), path);
        assert!(reader.find_package_for("foo", Some("1.1"), None, None)?.is_some());
        assert!(reader.find_package_for("foo", Some("1.2"), None, None)?.is_none());
        assert!(reader.find_package_for("foo", None, None, Some("i386"))?.is_none());

        assert_eq!(
            reader.manifest(),
            vec![("foo".to_string(), "1.1-2".to_string())]
        );
        assert_eq!(reader.packages().collect::<Vec<_>>(), vec![&fetched]);

        Ok(())
    }

    #[test]
    fn file_from_package() -> Result<()> {
        if which::which("dpkg").is_err() || which::which("tar").is_err() {
            eprintln!("dpkg or tar not available; skipping test");
            return Ok(());
        }

        let td = tempfile::tempdir()?;
        let deb = write_deb_with_files(
            td.path(),
            &control("foo", "1.1", "all", &[]),
            &[("usr/share/foo/data", &b"foo data"[..])],
        )?;
        let path = write_hwpack(td.path(), V2_INI, "v2.tar.gz", |hwpack| {
            hwpack.add_packages([FetchedPackage::from_deb_path(&deb)?]);
            Ok(())
        })?;

        let mut reader = HwpackReader::open(&[&path], None, None)?;
        let file = reader
            .get_file_from_package("usr/share/foo/data", "foo", Some("1.1"), None, None)?
            .unwrap();
        assert_eq!(std::fs::read(file)?, b"foo data");
        assert_eq!(
            reader.get_file_from_package("usr/share/foo/data", "bar", None, None, None)?,
            None
        );

        Ok(())
    }
}
