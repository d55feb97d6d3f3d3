// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! A self-contained APT root directory.

[IsolatedAptCache] lays out the files an APT client reads (`sources.list`,
`auth.conf`, `apt.conf`, `preferences`, the dpkg `status` database and the
lists/archives directories) in a scratch directory, downloads the indices of
its sources into it and parses them into a [PackageCache]. Nothing on the host
is consulted or modified.
*/

use {
    crate::{
        binary_package_control::{BinaryPackageControlFile, RELATIONSHIP_FIELDS},
        control::{ControlFile, ControlParagraph},
        error::{HwpackError, Result},
        io::{digest_bytes, read_decompressed, Compression},
        package_version::PackageVersion,
        release::ReleaseFile,
        sources::{redact_credentials, SourceEntry, Transport},
    },
    log::{debug, info},
    std::{
        collections::BTreeMap,
        io::{Cursor, Read},
        path::{Path, PathBuf},
    },
    tempfile::TempDir,
    url::Url,
};

/// Pin priority of packages from a source carrying the preferred label.
pub const PREFERRED_PIN_PRIORITY: u32 = 1001;

/// Pin priority of every other package.
pub const DEFAULT_PIN_PRIORITY: u32 = 500;

/// A package available from one of the sources.
#[derive(Clone, Debug)]
pub struct AvailablePackage {
    pub control: BinaryPackageControlFile,
    pub version: PackageVersion,
    pub pin_priority: u32,
    /// Index of the source the package came from.
    pub source: usize,
}

impl AvailablePackage {
    /// The package name.
    pub fn name(&self) -> &str {
        self.control.field_str("Package").unwrap_or_default()
    }
}

/// Packages known to an [IsolatedAptCache].
#[derive(Clone, Debug, Default)]
pub struct PackageCache {
    /// Candidates per package name, most preferred first.
    available: BTreeMap<String, Vec<AvailablePackage>>,
    /// Virtual package name to names of packages providing it.
    provides: BTreeMap<String, Vec<String>>,
    installed: BTreeMap<String, BinaryPackageControlFile>,
}

impl PackageCache {
    fn add_available(&mut self, package: AvailablePackage) {
        if let Some(Ok(provides)) = package.control.provides() {
            for dep in provides.iter_all() {
                let providers = self.provides.entry(dep.package.clone()).or_default();
                if !providers.iter().any(|p| p == package.name()) {
                    providers.push(package.name().to_string());
                }
            }
        }

        self.available
            .entry(package.name().to_string())
            .or_default()
            .push(package);
    }

    /// Order candidates by pin priority, then version, then source order.
    fn sort_candidates(&mut self) {
        for candidates in self.available.values_mut() {
            candidates.sort_by(|a, b| {
                b.pin_priority
                    .cmp(&a.pin_priority)
                    .then_with(|| b.version.cmp(&a.version))
                    .then_with(|| a.source.cmp(&b.source))
            });
        }
    }

    /// Candidates for a package name, most preferred first.
    pub fn candidates(&self, name: &str) -> &[AvailablePackage] {
        self.available
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// The preferred candidate for a package name.
    pub fn candidate(&self, name: &str) -> Option<&AvailablePackage> {
        self.candidates(name).first()
    }

    /// Preferred candidates of packages providing a virtual package.
    pub fn providers(&self, name: &str) -> Vec<&AvailablePackage> {
        self.provides
            .get(name)
            .map(|names| names.iter().filter_map(|n| self.candidate(n)).collect())
            .unwrap_or_default()
    }

    /// The installed package with the given name.
    pub fn installed(&self, name: &str) -> Option<&BinaryPackageControlFile> {
        self.installed.get(name)
    }

    /// Every installed package.
    pub fn installed_packages(&self) -> impl Iterator<Item = &BinaryPackageControlFile> {
        self.installed.values()
    }
}

/// An index downloaded into the lists directory.
#[derive(Clone, Debug)]
struct ListFile {
    source: usize,
    path: PathBuf,
    label: Option<String>,
}

/// Name of a file in `var/lib/apt/lists/` holding the resource at a URL.
fn list_file_name(url: &Url) -> String {
    let s = url.as_str();
    let without_scheme = s.split_once("://").map(|(_, rest)| rest).unwrap_or(s);

    without_scheme.trim_matches('/').replace('/', "_")
}

/// An APT root directory isolated from the host.
pub struct IsolatedAptCache {
    sources: Vec<SourceEntry>,
    architecture: Option<String>,
    prefer_label: Option<String>,
    transport: Transport,
    tempdir: Option<TempDir>,
    lists: Vec<ListFile>,
    cache: Option<PackageCache>,
}

impl IsolatedAptCache {
    /// Construct an instance over source entries.
    ///
    /// Nothing is written until [Self::prepare] is called.
    pub fn new(
        sources: &[String],
        architecture: Option<&str>,
        prefer_label: Option<&str>,
    ) -> Result<Self> {
        let sources = sources
            .iter()
            .map(|s| SourceEntry::parse(s))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sources,
            architecture: architecture.map(|s| s.to_string()),
            prefer_label: prefer_label.map(|s| s.to_string()),
            transport: Transport::default(),
            tempdir: None,
            lists: vec![],
            cache: None,
        })
    }

    /// The root directory. Errors if not prepared.
    pub fn root(&self) -> Result<&Path> {
        self.tempdir
            .as_ref()
            .map(|td| td.path())
            .ok_or_else(|| HwpackError::Archive("APT cache is not prepared".to_string()))
    }

    /// The parsed package cache. Errors if not prepared.
    pub fn cache(&self) -> Result<&PackageCache> {
        self.cache
            .as_ref()
            .ok_or_else(|| HwpackError::Archive("APT cache is not prepared".to_string()))
    }

    pub fn sources(&self) -> &[SourceEntry] {
        &self.sources
    }

    pub fn architecture(&self) -> Option<&str> {
        self.architecture.as_deref()
    }

    /// Create the directory tree, download indices and open the cache.
    pub fn prepare(&mut self) -> Result<()> {
        let tempdir = tempfile::Builder::new().prefix("hwpack-apt-").tempdir()?;
        let root = tempdir.path();

        for dir in [
            "etc/apt/sources.list.d",
            "var/lib/dpkg",
            "var/lib/apt/lists/partial",
            "var/cache/apt/archives/partial",
        ] {
            std::fs::create_dir_all(root.join(dir))?;
        }

        let mut sources_list = String::new();
        let mut auth_conf = String::new();
        for source in &self.sources {
            sources_list.push_str(&source.sources_list_line());
            sources_list.push('\n');

            if let Some(line) = source.auth_conf_line() {
                auth_conf.push_str(&line);
                auth_conf.push('\n');
            }
        }
        std::fs::write(root.join("etc/apt/sources.list"), sources_list)?;
        std::fs::write(root.join("etc/apt/auth.conf"), auth_conf)?;

        if let Some(arch) = &self.architecture {
            std::fs::write(
                root.join("etc/apt/apt.conf"),
                format!(
                    "Apt {{\n  Architecture \"{}\";\n  Install-Recommends \"true\";\n}};\n",
                    arch
                ),
            )?;
        }

        if let Some(label) = &self.prefer_label {
            std::fs::write(
                root.join("etc/apt/preferences"),
                format!(
                    "Package: *\nPin: release l={}\nPin-Priority: {}\n",
                    label, PREFERRED_PIN_PRIORITY
                ),
            )?;
        }

        std::fs::write(root.join("var/lib/dpkg/status"), b"")?;

        self.tempdir = Some(tempdir);

        self.update()?;
        self.open()
    }

    /// Download the `Release` and `Packages` of every source into the lists directory.
    fn update(&mut self) -> Result<()> {
        let lists_dir = self.root()?.join("var/lib/apt/lists");
        let mut lists = vec![];

        for (index, source) in self.sources.iter().enumerate() {
            let release_url = source.release_url()?;
            let label = match self.transport.fetch(&release_url, source.credentials())? {
                Some(data) => {
                    std::fs::write(lists_dir.join(list_file_name(&release_url)), &data)?;
                    ReleaseFile::from_reader(Cursor::new(data))?
                        .label()
                        .map(|s| s.to_string())
                }
                None => None,
            };

            for directory in source.index_directories(self.architecture.as_deref()) {
                let (url, data) = self.fetch_packages_index(source, &directory)?;

                let path = lists_dir.join(list_file_name(&url));
                std::fs::write(&path, &data)?;
                info!(
                    "fetched index {} ({} bytes)",
                    redact_credentials(url.as_str()),
                    data.len()
                );

                lists.push(ListFile {
                    source: index,
                    path,
                    label: label.clone(),
                });
            }
        }

        self.lists = lists;

        Ok(())
    }

    /// Fetch the first available of `Packages.xz`, `Packages.gz` and `Packages`.
    ///
    /// Returns the URL of the uncompressed index and its content.
    fn fetch_packages_index(
        &self,
        source: &SourceEntry,
        directory: &str,
    ) -> Result<(Url, Vec<u8>)> {
        let plain_url = source.join(&format!("{}Packages", directory))?;

        for compression in Compression::default_preferred_order() {
            let url = source.join(&format!("{}Packages{}", directory, compression.extension()))?;

            if let Some(data) = self.transport.fetch(&url, source.credentials())? {
                let mut reader = read_decompressed(Box::new(Cursor::new(data)), compression)?;
                let mut decompressed = vec![];
                reader.read_to_end(&mut decompressed)?;

                return Ok((plain_url, decompressed));
            }
        }

        Err(HwpackError::Fetch {
            item: redact_credentials(plain_url.as_str()),
            message: "no Packages index found".to_string(),
        })
    }

    /// Parse the downloaded indices and the dpkg status database.
    fn open(&mut self) -> Result<()> {
        let mut cache = PackageCache::default();

        for list in &self.lists {
            let pin_priority = match (&self.prefer_label, &list.label) {
                (Some(wanted), Some(label)) if wanted == label => PREFERRED_PIN_PRIORITY,
                _ => DEFAULT_PIN_PRIORITY,
            };

            let data = std::fs::read(&list.path)?;
            for paragraph in ControlFile::parse_reader(Cursor::new(data))?.into_paragraphs() {
                let control = BinaryPackageControlFile::from(paragraph);

                let architecture = control.architecture()?;
                if let Some(wanted) = &self.architecture {
                    if architecture != wanted && architecture != "all" {
                        continue;
                    }
                }

                cache.add_available(AvailablePackage {
                    version: control.version()?,
                    control,
                    pin_priority,
                    source: list.source,
                });
            }
        }

        cache.sort_candidates();

        let status = std::fs::read(self.root()?.join("var/lib/dpkg/status"))?;
        for paragraph in ControlFile::parse_reader(Cursor::new(status))?.into_paragraphs() {
            let control = BinaryPackageControlFile::from(paragraph);
            if control.is_installed() {
                cache
                    .installed
                    .insert(control.package()?.to_string(), control);
            }
        }

        debug!(
            "opened APT cache with {} package names and {} installed packages",
            cache.available.len(),
            cache.installed.len()
        );

        self.cache = Some(cache);

        Ok(())
    }

    /// Rewrite the dpkg status database so the given packages appear installed.
    ///
    /// With `reopen`, the cache is re-read to reflect the new status.
    pub fn set_installed_packages(
        &mut self,
        packages: &[BinaryPackageControlFile],
        reopen: bool,
    ) -> Result<()> {
        let mut status = ControlFile::default();

        for package in packages {
            let mut para = ControlParagraph::default();
            para.set_field_from_string("Package", package.package()?);
            para.set_field_from_string("Status", "install ok installed");
            para.set_field_from_string("Version", package.version_str()?);
            para.set_field_from_string("Architecture", package.architecture()?);

            for field in RELATIONSHIP_FIELDS {
                if let Some(value) = package.field_str(field) {
                    para.set_field_from_string(field, value);
                }
            }

            status.add_paragraph(para);
        }

        let mut data = vec![];
        status.write(&mut data)?;
        std::fs::write(self.root()?.join("var/lib/dpkg/status"), data)?;

        if reopen {
            self.open()?;
        }

        Ok(())
    }

    /// Download a package into `var/cache/apt/archives/`, verifying size and MD5.
    pub fn download(&self, package: &AvailablePackage) -> Result<PathBuf> {
        let source = self.sources.get(package.source).ok_or_else(|| {
            HwpackError::Archive(format!("no source with index {}", package.source))
        })?;

        let filename = package
            .control
            .filename()
            .ok_or_else(|| HwpackError::ControlRequiredFieldMissing("Filename".into()))?;
        let basename = filename.rsplit('/').next().unwrap_or(filename);
        let dest = self.root()?.join("var/cache/apt/archives").join(basename);

        let fetch_error = |message: String| HwpackError::Fetch {
            item: dest.display().to_string(),
            message: redact_credentials(&message),
        };

        let url = source.join(filename)?;
        info!("fetching {}", redact_credentials(url.as_str()));

        let data = match self.transport.fetch(&url, source.credentials()) {
            Ok(Some(data)) => data,
            Ok(None) => return Err(fetch_error(format!("{} not found", url))),
            Err(e) => return Err(fetch_error(e.to_string())),
        };

        let digest = digest_bytes(&data);

        if let Some(size) = package.control.size() {
            let size = size?;
            if size != digest.size {
                return Err(fetch_error(format!(
                    "size mismatch: expected {}, got {}",
                    size, digest.size
                )));
            }
        }
        if let Some(md5) = package.control.md5sum() {
            if md5 != digest.md5 {
                return Err(fetch_error(format!(
                    "MD5 mismatch: expected {}, got {}",
                    md5, digest.md5
                )));
            }
        }

        std::fs::write(&dest, &data)?;

        Ok(dest)
    }

    /// Remove the directory tree.
    pub fn cleanup(&mut self) -> Result<()> {
        self.cache = None;
        self.lists.clear();

        if let Some(tempdir) = self.tempdir.take() {
            tempdir.close()?;
        }

        Ok(())
    }
}
