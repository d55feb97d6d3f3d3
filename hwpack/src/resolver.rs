// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Dependency resolution over a [PackageCache].

Given requested package names, the resolver selects a candidate per name and
follows `Pre-Depends`, `Depends` and `Recommends` transitively. Packages
already installed in the cache satisfy requirements without being selected.
`Recommends` are best effort. `Conflicts` and `Breaks` between selected and
installed packages make the resolution broken.
*/

use {
    crate::{
        apt_cache::{AvailablePackage, PackageCache},
        binary_package_control::BinaryPackageControlFile,
        dependency::{DependencyVariants, SingleDependency},
        error::{HwpackError, Result},
    },
    log::debug,
    std::collections::{BTreeSet, HashSet},
};

/// Dependency fields followed during resolution, with whether they are optional.
const FOLLOWED_FIELDS: &[(&str, bool)] = &[
    ("Pre-Depends", false),
    ("Depends", false),
    ("Recommends", true),
];

#[derive(Clone, Default)]
struct State<'a> {
    selected: Vec<&'a AvailablePackage>,
    names: HashSet<String>,
    broken: BTreeSet<String>,
}

impl<'a> State<'a> {
    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn add(&mut self, package: &'a AvailablePackage) {
        self.names.insert(package.name().to_string());
        self.selected.push(package);
    }
}

/// Whether a control paragraph satisfies a dependency directly or through `Provides`.
fn control_satisfies(control: &BinaryPackageControlFile, dep: &SingleDependency) -> bool {
    if let (Ok(name), Ok(version)) = (control.package(), control.version()) {
        if dep.package_satisfies(name, &version) {
            return true;
        }
    }

    match control.provides() {
        Some(Ok(provides)) => provides.iter_all().any(|p| dep.provides_satisfies(p)),
        _ => false,
    }
}

/// Resolves requested packages into a closed set of packages to install.
pub struct Resolver<'a> {
    cache: &'a PackageCache,
    architecture: Option<&'a str>,
}

impl<'a> Resolver<'a> {
    pub fn new(cache: &'a PackageCache, architecture: Option<&'a str>) -> Self {
        Self {
            cache,
            architecture,
        }
    }

    fn applies(&self, dep: &SingleDependency) -> bool {
        self.architecture
            .map(|arch| dep.architecture_matches(arch))
            .unwrap_or(true)
    }

    fn is_satisfied(&self, state: &State<'a>, dep: &SingleDependency) -> bool {
        self.cache
            .installed_packages()
            .any(|control| control_satisfies(control, dep))
            || state
                .selected
                .iter()
                .any(|p| control_satisfies(&p.control, dep))
    }

    /// Candidates able to satisfy a dependency, most preferred first.
    fn candidates_for(&self, dep: &SingleDependency) -> Vec<&'a AvailablePackage> {
        let mut candidates = vec![];

        if let Some(real) = self
            .cache
            .candidates(&dep.package)
            .iter()
            .find(|p| dep.package_satisfies(p.name(), &p.version))
        {
            candidates.push(real);
        }

        for provider in self.cache.providers(&dep.package) {
            let satisfies = match provider.control.provides() {
                Some(Ok(provides)) => provides.iter_all().any(|p| dep.provides_satisfies(p)),
                _ => false,
            };

            if satisfies && !candidates.iter().any(|c| c.name() == provider.name()) {
                candidates.push(provider);
            }
        }

        candidates
    }

    fn install(&self, state: &mut State<'a>, package: &'a AvailablePackage, auto_fix: bool) {
        if state.contains(package.name()) || self.cache.installed(package.name()).is_some() {
            return;
        }

        state.add(package);

        for (field, optional) in FOLLOWED_FIELDS {
            let list = match package.control.relationship(field) {
                Some(Ok(list)) => list,
                Some(Err(e)) => {
                    debug!("unable to parse {} of {}: {}", field, package.name(), e);
                    state.broken.insert(package.name().to_string());
                    continue;
                }
                None => continue,
            };

            for variants in list.requirements() {
                self.satisfy(state, variants, *optional, auto_fix, package.name());
            }
        }
    }

    fn satisfy(
        &self,
        state: &mut State<'a>,
        variants: &DependencyVariants,
        optional: bool,
        auto_fix: bool,
        parent: &str,
    ) {
        let applicable = variants
            .iter()
            .filter(|d| self.applies(d))
            .collect::<Vec<_>>();

        if applicable.is_empty() || applicable.iter().any(|d| self.is_satisfied(state, d)) {
            return;
        }

        let choices = applicable
            .iter()
            .flat_map(|d| self.candidates_for(d))
            .collect::<Vec<_>>();

        if choices.is_empty() {
            if optional {
                debug!("skipping unsatisfiable recommendation {} of {}", variants, parent);
            } else {
                debug!("{} of {} cannot be satisfied", variants, parent);
                state.broken.insert(parent.to_string());
            }
            return;
        }

        if auto_fix || optional {
            let baseline = self.conflicts(state).len();

            for &choice in &choices {
                let mut trial = state.clone();
                self.install(&mut trial, choice, auto_fix);

                if trial.broken.len() == state.broken.len()
                    && self.conflicts(&trial).len() <= baseline
                {
                    *state = trial;
                    return;
                }

                debug!("rejecting {} for {} of {}", choice.name(), variants, parent);
            }

            if optional {
                debug!("skipping unsatisfiable recommendation {} of {}", variants, parent);
                return;
            }
        }

        self.install(state, choices[0], auto_fix);
    }

    /// Names of selected packages conflicting with or breaking other packages.
    fn conflicts(&self, state: &State<'a>) -> BTreeSet<String> {
        let mut broken = BTreeSet::new();

        let others = state
            .selected
            .iter()
            .map(|p| &p.control)
            .chain(self.cache.installed_packages())
            .collect::<Vec<_>>();

        for package in &state.selected {
            for field in ["Conflicts", "Breaks"] {
                let list = match package.control.relationship(field) {
                    Some(Ok(list)) => list,
                    _ => continue,
                };

                for dep in list.iter_all().filter(|d| self.applies(d)) {
                    let hit = others.iter().any(|other| {
                        other.package().ok() != Some(package.name())
                            && control_satisfies(other, dep)
                    });

                    if hit {
                        debug!("{} {} {}", package.name(), field.to_lowercase(), dep);
                        broken.insert(package.name().to_string());
                    }
                }
            }
        }

        broken
    }

    /// Resolve requested package names.
    ///
    /// Returns selected packages in resolution order: each requested name
    /// followed by the dependencies it pulled in. Installed packages are not
    /// returned. With `auto_fix`, alternatives whose own dependencies cannot be
    /// satisfied are skipped in favor of later ones.
    pub fn resolve(&self, names: &[String], auto_fix: bool) -> Result<Vec<&'a AvailablePackage>> {
        let mut state = State::default();

        for name in names {
            if self.cache.installed(name).is_some() || state.contains(name) {
                continue;
            }

            let candidate = self
                .cache
                .candidate(name)
                .or_else(|| self.cache.providers(name).into_iter().next());

            match candidate {
                Some(package) => self.install(&mut state, package, auto_fix),
                None => {
                    debug!("no candidate for {}", name);
                    state.broken.insert(name.clone());
                }
            }
        }

        let mut broken = state.broken.clone();
        broken.extend(self.conflicts(&state));

        if broken.is_empty() {
            Ok(state.selected)
        } else {
            Err(HwpackError::DependencyNotSatisfied(broken.into_iter().collect()))
        }
    }
}
