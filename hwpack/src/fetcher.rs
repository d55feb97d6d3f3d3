// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Resolving and downloading packages through an [IsolatedAptCache]. */

use {
    crate::{
        apt_cache::{AvailablePackage, IsolatedAptCache, PackageCache},
        binary_package_control::BinaryPackageControlFile,
        error::{HwpackError, Result},
        packages::FetchedPackage,
        resolver::Resolver,
    },
    log::{debug, info},
};

/// Find the package selected on behalf of a requested name.
///
/// This is the package of that name or, failing that, the first selected
/// package providing it.
fn selected_for<'a>(
    selected: &[&'a AvailablePackage],
    name: &str,
) -> Option<&'a AvailablePackage> {
    selected
        .iter()
        .find(|p| p.name() == name)
        .or_else(|| {
            selected.iter().find(|p| match p.control.provides() {
                Some(Ok(provides)) => provides.iter_all().any(|d| d.package == name),
                _ => false,
            })
        })
        .copied()
}

/// Preferred candidate for a name, looking through `Provides` if needed.
fn candidate_for<'a>(cache: &'a PackageCache, name: &str) -> Option<&'a AvailablePackage> {
    cache
        .candidate(name)
        .or_else(|| cache.providers(name).into_iter().next())
}

/// Fetches packages and their dependencies from a set of sources.
///
/// The fetcher owns exactly one [IsolatedAptCache]. Its directory tree is
/// removed by [Self::cleanup] or when the fetcher is dropped.
pub struct PackageFetcher {
    cache: IsolatedAptCache,
}

impl PackageFetcher {
    /// Construct an instance over `sources.list` style entries.
    ///
    /// Packages from sources whose `Release` carries `prefer_label` win over
    /// every other candidate, regardless of version.
    pub fn new(
        sources: &[String],
        architecture: Option<&str>,
        prefer_label: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            cache: IsolatedAptCache::new(sources, architecture, prefer_label)?,
        })
    }

    /// Create the APT tree and download the indices of all sources.
    pub fn prepare(&mut self) -> Result<()> {
        self.cache.prepare()
    }

    /// Remove the APT tree.
    pub fn cleanup(&mut self) -> Result<()> {
        self.cache.cleanup()
    }

    /// The underlying cache.
    pub fn apt_cache(&self) -> &IsolatedAptCache {
        &self.cache
    }

    fn resolver(&self) -> Result<Resolver<'_>> {
        Ok(Resolver::new(self.cache.cache()?, self.cache.architecture()))
    }

    /// Treat packages and their dependencies as already installed.
    ///
    /// The closure of `names` is resolved without trying alternatives and
    /// written to the dpkg status database together with the packages
    /// already marked installed. Later fetches will not return any of them.
    pub fn ignore_packages(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let installed = {
            let resolver = self.resolver()?;
            let selected = resolver.resolve(names, false)?;

            let cache = self.cache.cache()?;
            cache
                .installed_packages()
                .cloned()
                .chain(selected.iter().map(|p| p.control.clone()))
                .collect::<Vec<BinaryPackageControlFile>>()
        };

        debug!(
            "marking {} packages as installed: {}",
            installed.len(),
            installed
                .iter()
                .filter_map(|c| c.package().ok())
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.cache.set_installed_packages(&installed, true)
    }

    /// Resolve packages and optionally download them.
    ///
    /// Without `download_content`, one metadata-only record is returned per
    /// requested name, in the order given. With it, every package that needs
    /// installing is downloaded and verified; requested names come first in
    /// the order given, followed by dependencies in resolution order.
    pub fn fetch_packages(
        &self,
        names: &[String],
        download_content: bool,
    ) -> Result<Vec<FetchedPackage>> {
        let cache = self.cache.cache()?;
        let resolver = self.resolver()?;
        let selected = resolver.resolve(names, true)?;

        if !download_content {
            return names
                .iter()
                .map(|name| {
                    let package = selected_for(&selected, name)
                        .or_else(|| candidate_for(cache, name))
                        .ok_or_else(|| HwpackError::DependencyNotSatisfied(vec![name.clone()]))?;

                    FetchedPackage::from_index_paragraph(&package.control)
                })
                .collect();
        }

        let mut ordered: Vec<&AvailablePackage> = vec![];
        for name in names {
            if let Some(package) = selected_for(&selected, name) {
                if !ordered.iter().any(|p| p.name() == package.name()) {
                    ordered.push(package);
                }
            }
        }
        for &package in &selected {
            if !ordered.iter().any(|p| p.name() == package.name()) {
                ordered.push(package);
            }
        }

        let mut fetched = vec![];
        for package in ordered {
            let path = self.cache.download(package)?;
            info!("fetched {} {}", package.name(), package.version);

            fetched.push(
                FetchedPackage::from_index_paragraph(&package.control)?.with_content(path),
            );
        }

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            control::ControlParagraph,
            io::digest_path,
            local_archive::LocalArchiveMaker,
            testutil::{control, write_deb, write_flat_archive},
        },
        tempfile::TempDir,
    };

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn names_of(packages: &[FetchedPackage]) -> Vec<&str> {
        packages.iter().map(|p| p.name.as_str()).collect()
    }

    fn fetcher_for(controls: &[ControlParagraph]) -> Result<(TempDir, PackageFetcher)> {
        let archive = tempfile::tempdir()?;
        write_flat_archive(archive.path(), controls, None)?;

        let mut fetcher = PackageFetcher::new(
            &[format!("file://{} ./", archive.path().display())],
            Some("armel"),
            None,
        )?;
        fetcher.prepare()?;

        Ok((archive, fetcher))
    }

    #[test]
    fn metadata_only() -> Result<()> {
        let (_archive, fetcher) = fetcher_for(&[
            control("foo", "1.1", "all", &[("Depends", "bar")]),
            control("bar", "1.0", "armel", &[]),
            control("baz", "2.0", "all", &[]),
        ])?;

        let fetched = fetcher.fetch_packages(&names(&["baz", "foo"]), false)?;
        assert_eq!(names_of(&fetched), vec!["baz", "foo"]);
        assert!(fetched.iter().all(|p| !p.has_content()));
        assert_eq!(fetched[1].filename, "foo_1.1_all.deb");
        assert_eq!(fetched[1].depends.as_deref(), Some("bar"));

        Ok(())
    }

    #[test]
    fn download_order() -> Result<()> {
        let (archive, fetcher) = fetcher_for(&[
            control("foo", "1.1", "all", &[("Depends", "bar")]),
            control("bar", "1.0", "armel", &[]),
            control("baz", "2.0", "all", &[]),
        ])?;

        let fetched = fetcher.fetch_packages(&names(&["foo", "baz"]), true)?;
        assert_eq!(names_of(&fetched), vec!["foo", "baz", "bar"]);
        assert!(fetched.iter().all(|p| p.has_content()));

        let original = digest_path(&archive.path().join("foo_1.1_all.deb"))?;
        let downloaded = digest_path(fetched[0].content_path().unwrap())?;
        assert_eq!(original.md5, downloaded.md5);
        assert_eq!(fetched[0].md5, original.md5);

        Ok(())
    }

    #[test]
    fn missing_package() -> Result<()> {
        let (_archive, fetcher) = fetcher_for(&[control("foo", "1.1", "all", &[])])?;

        match fetcher.fetch_packages(&names(&["foo", "nosuch"]), true) {
            Err(HwpackError::DependencyNotSatisfied(broken)) => {
                assert_eq!(broken, vec!["nosuch".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other.map(|v| names_of(&v).join(","))),
        }

        Ok(())
    }

    #[test]
    fn ignored_packages_are_not_fetched() -> Result<()> {
        let (_archive, mut fetcher) = fetcher_for(&[
            control("foo", "1.1", "all", &[("Depends", "bar")]),
            control("bar", "1.1", "all", &[("Depends", "baz")]),
            control("baz", "1.0", "all", &[]),
        ])?;

        fetcher.ignore_packages(&names(&["bar"]))?;

        let status = std::fs::read_to_string(
            fetcher
                .apt_cache()
                .root()?
                .join("var/lib/dpkg/status"),
        )?;
        assert!(status.contains("Package: bar\nStatus: install ok installed\n"));
        assert!(status.contains("Package: baz\nStatus: install ok installed\n"));

        let fetched = fetcher.fetch_packages(&names(&["foo"]), true)?;
        assert_eq!(names_of(&fetched), vec!["foo"]);

        Ok(())
    }

    #[test]
    fn ignore_unsatisfiable() -> Result<()> {
        let (_archive, mut fetcher) =
            fetcher_for(&[control("foo", "1.1", "all", &[("Depends", "nosuch")])])?;

        assert!(matches!(
            fetcher.ignore_packages(&names(&["foo"])),
            Err(HwpackError::DependencyNotSatisfied(_))
        ));

        Ok(())
    }

    #[test]
    fn local_packages_preferred() -> Result<()> {
        let remote = tempfile::tempdir()?;
        write_flat_archive(remote.path(), &[control("foo", "1.1", "all", &[])], None)?;

        let local_debs = tempfile::tempdir()?;
        let local = write_deb(local_debs.path(), &control("foo", "1.0", "all", &[]))?;

        let mut maker = LocalArchiveMaker::new();
        let local_entry = maker.sources_entry_for_debs(&[&local], Some("hwpack-local"))?;

        let mut fetcher = PackageFetcher::new(
            &[format!("file://{} ./", remote.path().display()), local_entry],
            Some("armel"),
            Some("hwpack-local"),
        )?;
        fetcher.prepare()?;

        let fetched = fetcher.fetch_packages(&names(&["foo"]), true)?;
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0], FetchedPackage::from_deb_path(&local)?);

        Ok(())
    }

    #[test]
    fn cleanup_removes_tree() -> Result<()> {
        let (_archive, mut fetcher) = fetcher_for(&[control("foo", "1.1", "all", &[])])?;

        let root = fetcher.apt_cache().root()?.to_path_buf();
        assert!(root.exists());
        fetcher.cleanup()?;
        assert!(!root.exists());

        Ok(())
    }
}
