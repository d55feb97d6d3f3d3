// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian binary package control files. */

use {
    crate::{
        control::ControlParagraph, dependency::DependencyList, error::Result,
        package_version::PackageVersion,
    },
    std::ops::{Deref, DerefMut},
};

/// Relationship fields a binary package may declare, in the order they are
/// emitted by this crate.
pub const RELATIONSHIP_FIELDS: &[&str] = &[
    "Depends",
    "Pre-Depends",
    "Conflicts",
    "Recommends",
    "Provides",
    "Replaces",
    "Breaks",
];

/// A Debian binary package control file/paragraph.
///
/// See <https://www.debian.org/doc/debian-policy/ch-controlfields.html#binary-package-control-files-debian-control>.
///
/// Binary package control paragraphs are seen in `DEBIAN/control` files, in
/// `Packages` indices and in the dpkg `status` database. [Deref] and [DerefMut]
/// can be used to operate on the inner [ControlParagraph].
///
/// Mandatory fields have getters that return [Result]. Non-mandatory fields
/// return [Option].
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BinaryPackageControlFile {
    paragraph: ControlParagraph,
}

impl Deref for BinaryPackageControlFile {
    type Target = ControlParagraph;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl DerefMut for BinaryPackageControlFile {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.paragraph
    }
}

impl From<ControlParagraph> for BinaryPackageControlFile {
    fn from(paragraph: ControlParagraph) -> Self {
        Self { paragraph }
    }
}

impl From<BinaryPackageControlFile> for ControlParagraph {
    fn from(cf: BinaryPackageControlFile) -> Self {
        cf.paragraph
    }
}

impl BinaryPackageControlFile {
    /// The `Package` field value.
    pub fn package(&self) -> Result<&str> {
        self.required_field_str("Package")
    }

    /// The `Version` field as its original string.
    pub fn version_str(&self) -> Result<&str> {
        self.required_field_str("Version")
    }

    /// The `Version` field parsed into a [PackageVersion].
    pub fn version(&self) -> Result<PackageVersion> {
        PackageVersion::parse(self.version_str()?)
    }

    /// The `Architecture` field.
    pub fn architecture(&self) -> Result<&str> {
        self.required_field_str("Architecture")
    }

    /// The `Size` field, parsed to a [u64].
    pub fn size(&self) -> Option<Result<u64>> {
        self.field_u64("Size")
    }

    /// The `Filename` field.
    pub fn filename(&self) -> Option<&str> {
        self.field_str("Filename")
    }

    /// The `MD5sum` field.
    pub fn md5sum(&self) -> Option<&str> {
        self.field_str("MD5sum")
    }

    /// The `Multi-Arch` field.
    pub fn multi_arch(&self) -> Option<&str> {
        self.field_str("Multi-Arch")
    }

    /// Obtain a named relationship field parsed to a [DependencyList].
    pub fn relationship(&self, field: &str) -> Option<Result<DependencyList>> {
        self.field_str(field).map(DependencyList::parse)
    }

    /// The `Depends` field, parsed to a [DependencyList].
    pub fn depends(&self) -> Option<Result<DependencyList>> {
        self.relationship("Depends")
    }

    /// The `Pre-Depends` field, parsed to a [DependencyList].
    pub fn pre_depends(&self) -> Option<Result<DependencyList>> {
        self.relationship("Pre-Depends")
    }

    /// The `Recommends` field, parsed to a [DependencyList].
    pub fn recommends(&self) -> Option<Result<DependencyList>> {
        self.relationship("Recommends")
    }

    /// The `Provides` field, parsed to a [DependencyList].
    pub fn provides(&self) -> Option<Result<DependencyList>> {
        self.relationship("Provides")
    }

    /// The `Conflicts` field, parsed to a [DependencyList].
    pub fn conflicts(&self) -> Option<Result<DependencyList>> {
        self.relationship("Conflicts")
    }

    /// The `Breaks` field, parsed to a [DependencyList].
    pub fn breaks(&self) -> Option<Result<DependencyList>> {
        self.relationship("Breaks")
    }

    /// Whether the dpkg `Status` field marks this package as installed.
    pub fn is_installed(&self) -> bool {
        self.field_str("Status")
            .map(|s| s.split_ascii_whitespace().last() == Some("installed"))
            .unwrap_or(false)
    }
}
