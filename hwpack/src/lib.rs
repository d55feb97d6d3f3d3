// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Linaro-style hardware packs.

A hardware pack (*hwpack*) is a gzip compressed tarball bundling the Debian
packages, bootloader images and metadata needed to turn a generic root
filesystem into an image for a specific board. This crate builds hardware
packs from recipes and reads them back.

The canonical home of this crate is <https://github.com/indygreg/PyOxidizer>. Please file issues
and pull requests there.

# A Tour of Functionality

Recipes are parsed by [config::Config], from format 1.0 and 2.0 INI files or
format 3.0 YAML documents. Validation happens entirely at load time.

[builder::HwpackBuilder] drives a build. For every architecture it:

* publishes local `.deb` files in a scratch repository with
  [local_archive::LocalArchiveMaker];
* resolves and downloads packages with [fetcher::PackageFetcher], which owns
  an [apt_cache::IsolatedAptCache] and resolves dependencies in process with
  [resolver::Resolver];
* extracts bootloader files with [unpacker::PackageUnpacker];
* synthesizes a meta-package with [package_maker::PackageMaker];
* writes the tarball with [hwpack::Hwpack].

[reader::HwpackReader] opens hardware packs and exposes their metadata,
files and packages.

Debian packaging primitives live in [control], [binary_package_control],
[dependency], [package_version], [release] and [deb].

# Determinism

Given the same inputs and modification time, a build produces byte identical
tarballs. Every member carries the same owner and modification time and
synthesized packages are built in process with fixed metadata.
*/

pub mod apt_cache;
pub mod binary_package_control;
pub mod builder;
pub mod config;
pub mod control;
pub mod deb;
pub mod dependency;
pub mod error;
pub mod fetcher;
pub mod hwpack;
pub mod ini;
pub mod io;
pub mod local_archive;
pub mod metadata;
pub mod package_maker;
pub mod package_version;
pub mod packages;
pub mod reader;
pub mod release;
pub mod resolver;
pub mod sources;
pub mod subprocess;
#[cfg(test)]
mod testutil;
pub mod unpacker;
