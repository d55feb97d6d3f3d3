// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package dependency syntax handling.

See <https://www.debian.org/doc/debian-policy/ch-relationships.html> for the specification.
 */

use {
    crate::{
        error::{HwpackError, Result},
        package_version::PackageVersion,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        ops::Deref,
    },
};

/// Regular expression to parse dependency expressions.
pub static RE_DEPENDENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^
        # Package name terminates at whitespace, [, ( or an architecture qualifier.
        (?P<package>[^\s\[(:]+)
        # Multi-Arch qualifiers like :any are accepted and ignored.
        (?::(?P<qualifier>[a-z0-9-]+))?
        \s*
        # Relationships are within an optional parenthesis.
        (?:\(
            \s*
            (?P<relop>(<<|<=|=|>=|>>|<|>))
            \s*
            (?P<version>[^\s)]+)
            \s*
        \))?
        \s*
        # Architecture restrictions are within an optional [..] field.
        (?:\[
            \s*
            (?P<arch_negate>!)?
            (?P<arch>[^\]]+)
        \])?
        \s*
        $
        "#,
    )
    .unwrap()
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionRelationship {
    StrictlyEarlier,
    EarlierOrEqual,
    ExactlyEqual,
    LaterOrEqual,
    StrictlyLater,
}

impl Display for VersionRelationship {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::StrictlyEarlier => write!(f, "<<"),
            Self::EarlierOrEqual => write!(f, "<="),
            Self::ExactlyEqual => write!(f, "="),
            Self::LaterOrEqual => write!(f, ">="),
            Self::StrictlyLater => write!(f, ">>"),
        }
    }
}

impl VersionRelationship {
    /// Whether the result of comparing a candidate against the constraint version satisfies us.
    pub fn accepts(&self, ordering: Ordering) -> bool {
        matches!(
            (ordering, self),
            (
                Ordering::Equal,
                Self::ExactlyEqual | Self::LaterOrEqual | Self::EarlierOrEqual
            ) | (Ordering::Less, Self::StrictlyEarlier | Self::EarlierOrEqual)
                | (Ordering::Greater, Self::StrictlyLater | Self::LaterOrEqual)
        )
    }
}

/// Represents a version constraint on a given package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyVersionConstraint {
    pub relationship: VersionRelationship,
    pub version: PackageVersion,
}

/// A dependency of a package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleDependency {
    /// Package the dependency is on.
    pub package: String,
    pub version_constraint: Option<DependencyVersionConstraint>,
    /// Architecture restriction. First element is whether the list is negated.
    pub architecture: Option<(bool, Vec<String>)>,
}

impl Display for SingleDependency {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.package)?;
        if let Some(constraint) = &self.version_constraint {
            write!(f, " ({} {})", constraint.relationship, constraint.version)?;
        }
        if let Some((negate, arches)) = &self.architecture {
            let arches = arches
                .iter()
                .map(|a| format!("{}{}", if *negate { "!" } else { "" }, a))
                .collect::<Vec<_>>();
            write!(f, " [{}]", arches.join(" "))?;
        }

        Ok(())
    }
}

impl SingleDependency {
    /// Parse a single package dependency expression into a [SingleDependency].
    pub fn parse(s: &str) -> Result<Self> {
        let caps = RE_DEPENDENCY
            .captures(s)
            .ok_or_else(|| HwpackError::DependencyParse(s.to_string()))?;

        let package = caps["package"].to_string();

        let version_constraint = match (caps.name("relop"), caps.name("version")) {
            (Some(relop), Some(version)) => {
                let relationship = match relop.as_str() {
                    "<<" => VersionRelationship::StrictlyEarlier,
                    // `<` and `>` are deprecated aliases of `<=` and `>=`.
                    "<=" | "<" => VersionRelationship::EarlierOrEqual,
                    "=" => VersionRelationship::ExactlyEqual,
                    ">=" | ">" => VersionRelationship::LaterOrEqual,
                    ">>" => VersionRelationship::StrictlyLater,
                    v => return Err(HwpackError::DependencyParse(v.to_string())),
                };

                Some(DependencyVersionConstraint {
                    relationship,
                    version: PackageVersion::parse(version.as_str())?,
                })
            }
            _ => None,
        };

        let architecture = caps.name("arch").map(|arch| {
            let arches = arch
                .as_str()
                .split_ascii_whitespace()
                .map(|a| a.trim_start_matches('!').to_string())
                .collect::<Vec<_>>();

            (caps.name("arch_negate").is_some(), arches)
        });

        Ok(Self {
            package,
            version_constraint,
            architecture,
        })
    }

    /// Whether the architecture restriction admits the given architecture.
    pub fn architecture_matches(&self, architecture: &str) -> bool {
        match &self.architecture {
            Some((negate, arches)) => {
                let listed = arches.iter().any(|a| a == architecture);
                listed != *negate
            }
            None => true,
        }
    }

    /// Evaluate whether a real package satisfies the requirements of this expression.
    pub fn package_satisfies(&self, package: &str, version: &PackageVersion) -> bool {
        self.package == package
            && self
                .version_constraint
                .as_ref()
                .map(|c| c.relationship.accepts(version.cmp(&c.version)))
                .unwrap_or(true)
    }

    /// Whether a `Provides` entry satisfies this expression.
    ///
    /// Unversioned provides only satisfy unversioned dependencies. Versioned provides
    /// are evaluated like real packages.
    pub fn provides_satisfies(&self, provides: &SingleDependency) -> bool {
        if self.package != provides.package {
            return false;
        }

        match (&self.version_constraint, &provides.version_constraint) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(wanted), Some(provided)) => {
                provided.relationship == VersionRelationship::ExactlyEqual
                    && wanted
                        .relationship
                        .accepts(provided.version.cmp(&wanted.version))
            }
        }
    }
}

/// Alternatives separated by `|`. Any one of them satisfies the requirement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyVariants(Vec<SingleDependency>);

impl Display for DependencyVariants {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.0
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(" | ")
        )
    }
}

impl Deref for DependencyVariants {
    type Target = Vec<SingleDependency>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Represents an ordered list of dependencies, delimited by commas (`,`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyList {
    dependencies: Vec<DependencyVariants>,
}

impl Display for DependencyList {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.dependencies
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl DependencyList {
    /// Parse a dependency list from a string.
    ///
    /// A dependency list is a comma-delimited list of expressions. Each expression is a
    /// `|` delimited list of expressions of the form
    /// `package (version_relationship version) [arch]`. Empty elements are ignored.
    pub fn parse(s: &str) -> Result<Self> {
        let mut dependencies = vec![];

        for el in s.split(',') {
            let el = el.trim();
            if el.is_empty() {
                continue;
            }

            let variants = el
                .split('|')
                .map(|alt| SingleDependency::parse(alt.trim()))
                .collect::<Result<Vec<_>>>()?;

            dependencies.push(DependencyVariants(variants));
        }

        Ok(Self { dependencies })
    }

    /// Obtain the individual requirements constituting this list of dependencies.
    ///
    /// Each requirement is itself a set of alternatives. The length of this set
    /// is commonly 1.
    pub fn requirements(&self) -> impl Iterator<Item = &DependencyVariants> {
        self.dependencies.iter()
    }

    /// Obtain every expression in the list, flattening alternatives.
    pub fn iter_all(&self) -> impl Iterator<Item = &SingleDependency> {
        self.dependencies.iter().flat_map(|v| v.iter())
    }

    /// Whether the list has no requirements.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
