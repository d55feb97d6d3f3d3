// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Building hardware packs from recipes.

[HwpackBuilder] turns a [Config], a version and optional local `.deb` files
into one hardware pack per configured architecture.

For each architecture, the local debs are published in a scratch APT
repository labelled [LOCAL_ARCHIVE_LABEL], which the fetcher prefers over
every other source. The requested and bootloader packages are resolved and
downloaded, bootloader files are extracted into the hardware pack, a
`hwpack-<name>` meta-package depending on the requested packages is
synthesized, and the tarball and manifest are written to the output
directory.
*/

use {
    crate::{
        config::{Config, OptionValue},
        error::{HwpackError, Result},
        fetcher::PackageFetcher,
        hwpack::Hwpack,
        local_archive::LocalArchiveMaker,
        metadata::Metadata,
        package_maker::PackageMaker,
        packages::FetchedPackage,
        unpacker::PackageUnpacker,
    },
    log::{info, warn},
    std::{
        io::{BufWriter, Write},
        path::{Path, PathBuf},
    },
};

/// Release label of the repository holding local debs.
pub const LOCAL_ARCHIVE_LABEL: &str = "hwpack-local";

/// Files written for one architecture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildOutput {
    pub architecture: String,
    pub hwpack: PathBuf,
    pub manifest: PathBuf,
}

/// Builds hardware packs from a recipe.
pub struct HwpackBuilder {
    config: Config,
    version: String,
    local_debs: Vec<PathBuf>,
    output_dir: PathBuf,
    mtime: u64,
}

impl HwpackBuilder {
    /// Construct an instance for a recipe, version and local `.deb` files.
    ///
    /// Output defaults to the current directory with the current time as
    /// modification time.
    pub fn new(config: Config, version: &str, local_debs: Vec<PathBuf>) -> Result<Self> {
        Config::validate_version(version)?;

        let mtime = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Ok(Self {
            config,
            version: version.to_string(),
            local_debs,
            output_dir: PathBuf::from("."),
            mtime,
        })
    }

    /// Construct an instance from the path of a recipe.
    pub fn from_config_path(
        path: impl AsRef<Path>,
        version: &str,
        local_debs: Vec<PathBuf>,
    ) -> Result<Self> {
        Self::new(Config::from_path(path)?, version, local_debs)
    }

    pub fn set_output_dir(&mut self, path: impl AsRef<Path>) {
        self.output_dir = path.as_ref().to_path_buf();
    }

    /// Set the modification time of everything written into hardware packs.
    pub fn set_mtime(&mut self, mtime: u64) {
        self.mtime = mtime;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a hardware pack for every architecture of the recipe.
    pub fn build(&self) -> Result<Vec<BuildOutput>> {
        self.config
            .architectures()
            .iter()
            .map(|arch| self.build_architecture(arch))
            .collect()
    }

    /// Packages to resolve: the requested ones followed by bootloader packages.
    fn fetch_set(&self) -> Vec<String> {
        let mut names = self.config.packages().to_vec();

        for package in self.config.bootloader_packages() {
            if !names.contains(&package) {
                names.push(package);
            }
        }

        names
    }

    /// Build the hardware pack of a single architecture.
    pub fn build_architecture(&self, architecture: &str) -> Result<BuildOutput> {
        info!(
            "building hardware pack {} {} for {}",
            self.config.name(),
            self.version,
            architecture
        );

        let include_debs = self.config.include_debs();

        let mut hwpack = Hwpack::new(Metadata::from_config(
            &self.config,
            &self.version,
            architecture,
        ));
        hwpack.set_mtime(self.mtime);

        let mut sources = vec![];
        for (id, entry) in self.config.sources() {
            hwpack.add_source(id, entry);
            sources.push(entry.clone());
        }

        let mut local_archive = LocalArchiveMaker::new();
        if !self.local_debs.is_empty() {
            sources.push(
                local_archive.sources_entry_for_debs(&self.local_debs, Some(LOCAL_ARCHIVE_LABEL))?,
            );
        }

        let mut fetcher =
            PackageFetcher::new(&sources, Some(architecture), Some(LOCAL_ARCHIVE_LABEL))?;
        fetcher.prepare()?;
        fetcher.ignore_packages(self.config.assume_installed())?;

        let mut packages = fetcher.fetch_packages(&self.fetch_set(), include_debs)?;

        let mut unpacker = PackageUnpacker::new()?;
        let mut bootloader_debs: Vec<FetchedPackage> = vec![];

        for file in self.config.bootloader_files() {
            let existing = packages
                .iter()
                .chain(bootloader_debs.iter())
                .find(|p| p.name == file.package && p.has_content())
                .cloned();

            let deb = match existing {
                Some(package) => package,
                None => {
                    let fetched = fetcher.fetch_packages(&[file.package.clone()], true)?;
                    let package = fetched
                        .into_iter()
                        .find(|p| p.name == file.package)
                        .ok_or_else(|| {
                            HwpackError::DependencyNotSatisfied(vec![file.package.clone()])
                        })?;
                    bootloader_debs.push(package.clone());
                    package
                }
            };

            let content = deb.content_path().ok_or_else(|| {
                HwpackError::Archive(format!("no content for {}", deb.filename))
            })?;
            let extracted = unpacker.get_file(content, &file.file)?;
            let hwpack_path = hwpack.add_file(&file.target_dir, &extracted)?;
            info!("extracted {} from {} to {}", file.file, deb.name, hwpack_path);

            if let Some(option_path) = &file.option_path {
                hwpack
                    .metadata_mut()
                    .set_option(option_path, OptionValue::Text(hwpack_path))?;
            }
        }

        for package in self.config.bootloader_packages() {
            if !self.config.packages().contains(&package) {
                packages.retain(|p| p.name != package);
            }
        }

        for deb in &self.local_debs {
            let local = FetchedPackage::from_deb_path(deb)?;
            if !packages.contains(&local) {
                warn!(
                    "local package {} was not included in the hardware pack",
                    deb.display()
                );
            }
        }

        let mut maker = PackageMaker::new()?;
        maker.set_mtime(self.mtime);
        let depends = self.config.packages().join(", ");
        let meta_deb = maker.make_package(
            &format!("hwpack-{}", self.config.name()),
            &self.version,
            &[("Depends", depends.as_str())],
            architecture,
            &[],
        )?;
        let mut meta_package = FetchedPackage::from_deb_path(&meta_deb)?;
        if !include_debs {
            meta_package = meta_package.without_content();
        }
        packages.push(meta_package);

        hwpack.add_packages(packages);

        let output = self.write_output(&hwpack)?;

        fetcher.cleanup()?;

        Ok(output)
    }

    fn write_output(&self, hwpack: &Hwpack) -> Result<BuildOutput> {
        let filename = hwpack.filename();
        let hwpack_path = self.output_dir.join(&filename);
        let manifest_path = self.output_dir.join(format!(
            "{}.manifest.txt",
            filename.trim_end_matches(".tar.gz")
        ));

        let temp = tempfile::Builder::new()
            .prefix(".hwpack-")
            .suffix(".tar.gz.part")
            .tempfile_in(&self.output_dir)?;
        let mut writer = hwpack.write(BufWriter::new(temp))?;
        writer.flush()?;
        let temp = writer.into_inner()?;
        temp.persist(&hwpack_path).map_err(|e| e.error)?;
        info!("wrote {}", hwpack_path.display());

        std::fs::write(&manifest_path, hwpack.manifest())?;
        info!("wrote {}", manifest_path.display());

        Ok(BuildOutput {
            architecture: hwpack.metadata().architecture().to_string(),
            hwpack: hwpack_path,
            manifest: manifest_path,
        })
    }
}
