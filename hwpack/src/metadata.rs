// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The `metadata` member of a hardware pack.

Format 1.0 and 2.0 hardware packs carry `KEY=value` lines. Format 3.0 packs
carry a YAML mapping mirroring the recipe, with `version` and `architecture`
added.
*/

use {
    crate::{
        config::{
            BoardConfig, Config, HwpackFormat, OptionScope, OptionValue, HARDWARE_KEYS,
            V2_BOOTLOADER_KEYS,
        },
        error::{HwpackError, Result},
    },
    serde_yaml::{Mapping, Value},
    std::collections::BTreeMap,
};

/// Describes a hardware pack built for one architecture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Metadata {
    format: HwpackFormat,
    name: String,
    version: String,
    architecture: String,
    origin: Option<String>,
    maintainer: Option<String>,
    support: Option<String>,
    options: OptionScope,
    bootloaders: BTreeMap<String, OptionScope>,
    boards: BTreeMap<String, BoardConfig>,
}

impl Metadata {
    /// Construct an instance from a recipe, a version and an architecture.
    pub fn from_config(config: &Config, version: &str, architecture: &str) -> Self {
        Self {
            format: config.format(),
            name: config.name().to_string(),
            version: version.to_string(),
            architecture: architecture.to_string(),
            origin: config.origin().map(|s| s.to_string()),
            maintainer: config.maintainer().map(|s| s.to_string()),
            support: config.support().map(|s| s.as_str().to_string()),
            options: if config.format() == HwpackFormat::V1 {
                OptionScope::new()
            } else {
                config.options().clone()
            },
            bootloaders: config.bootloaders().clone(),
            boards: config.boards().clone(),
        }
    }

    pub fn format(&self) -> HwpackFormat {
        self.format
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn support(&self) -> Option<&str> {
        self.support.as_deref()
    }

    /// Obtain an option by its lookup path.
    pub fn option(&self, path: &[String]) -> Option<&OptionValue> {
        self.scope(path).and_then(|(scope, key)| scope.get(key))
    }

    /// Replace the value of an option identified by its lookup path.
    ///
    /// Used to point bootloader `file` options at extracted files.
    pub fn set_option(&mut self, path: &[String], value: OptionValue) -> Result<()> {
        let (scope, key) = self
            .scope_mut(path)
            .ok_or_else(|| HwpackError::config(path.join("."), &value, "no such option scope"))?;

        scope.insert(key.to_string(), value);

        Ok(())
    }

    fn scope<'a, 'p>(&'a self, path: &'p [String]) -> Option<(&'a OptionScope, &'p str)> {
        let parts = path.iter().map(|s| s.as_str()).collect::<Vec<_>>();

        match parts.as_slice() {
            [key] => Some((&self.options, *key)),
            ["bootloaders", bootloader, key] => {
                self.bootloaders.get(*bootloader).map(|s| (s, *key))
            }
            ["boards", board, key] => self.boards.get(*board).map(|b| (&b.options, *key)),
            ["boards", board, "bootloaders", bootloader, key] => self
                .boards
                .get(*board)
                .and_then(|b| b.bootloaders.get(*bootloader))
                .map(|s| (s, *key)),
            _ => None,
        }
    }

    fn scope_mut<'a, 'p>(
        &'a mut self,
        path: &'p [String],
    ) -> Option<(&'a mut OptionScope, &'p str)> {
        match path {
            [key] => Some((&mut self.options, key.as_str())),
            [a, bootloader, key] if a == "bootloaders" => self
                .bootloaders
                .get_mut(bootloader)
                .map(|s| (s, key.as_str())),
            [a, board, key] if a == "boards" => self
                .boards
                .get_mut(board)
                .map(|b| (&mut b.options, key.as_str())),
            [a, board, b, bootloader, key] if a == "boards" && b == "bootloaders" => self
                .boards
                .get_mut(board)
                .and_then(|c| c.bootloaders.get_mut(bootloader))
                .map(|s| (s, key.as_str())),
            _ => None,
        }
    }

    fn render_flat(&self) -> String {
        let mut lines = vec![
            format!("NAME={}", self.name),
            format!("VERSION={}", self.version),
            format!("ARCHITECTURE={}", self.architecture),
        ];

        for (key, value) in [
            ("ORIGIN", &self.origin),
            ("MAINTAINER", &self.maintainer),
            ("SUPPORT", &self.support),
        ] {
            if let Some(value) = value {
                lines.push(format!("{}={}", key, value));
            }
        }

        if self.format == HwpackFormat::V2 {
            for key in HARDWARE_KEYS.iter().chain(V2_BOOTLOADER_KEYS.iter()) {
                if let Some(value) = self.options.get(*key) {
                    lines.push(format!(
                        "{}={}",
                        key.to_ascii_uppercase(),
                        value.to_flat_string()
                    ));
                }
            }
        }

        let mut s = lines.join("\n");
        s.push('\n');
        s
    }

    fn render_yaml(&self) -> Result<String> {
        let s = |v: &str| Value::String(v.to_string());
        let scope_yaml = |scope: &OptionScope| {
            Value::Mapping(
                scope
                    .iter()
                    .map(|(k, v)| (s(k), v.to_yaml()))
                    .collect::<Mapping>(),
            )
        };

        let mut root = Mapping::new();
        root.insert(s("format"), s(self.format.as_str()));
        root.insert(s("name"), s(&self.name));
        root.insert(s("version"), s(&self.version));
        root.insert(s("architecture"), s(&self.architecture));

        for (key, value) in [
            ("origin", &self.origin),
            ("maintainer", &self.maintainer),
            ("support", &self.support),
        ] {
            if let Some(value) = value {
                root.insert(s(key), s(value));
            }
        }

        for key in HARDWARE_KEYS {
            if let Some(value) = self.options.get(*key) {
                root.insert(s(key), value.to_yaml());
            }
        }

        if !self.bootloaders.is_empty() {
            let bootloaders = self
                .bootloaders
                .iter()
                .map(|(name, scope)| (s(name), scope_yaml(scope)))
                .collect::<Mapping>();
            root.insert(s("bootloaders"), Value::Mapping(bootloaders));
        }

        if !self.boards.is_empty() {
            let mut boards = Mapping::new();

            for (name, board) in &self.boards {
                let mut m = board
                    .options
                    .iter()
                    .map(|(k, v)| (s(k), v.to_yaml()))
                    .collect::<Mapping>();

                if !board.bootloaders.is_empty() {
                    m.insert(
                        s("bootloaders"),
                        Value::Mapping(
                            board
                                .bootloaders
                                .iter()
                                .map(|(bl, scope)| (s(bl), scope_yaml(scope)))
                                .collect(),
                        ),
                    );
                }

                boards.insert(s(name), Value::Mapping(m));
            }

            root.insert(s("boards"), Value::Mapping(boards));
        }

        Ok(serde_yaml::to_string(&Value::Mapping(root))?)
    }

    /// Render the content of the `metadata` member.
    pub fn render(&self) -> Result<String> {
        match self.format {
            HwpackFormat::V1 | HwpackFormat::V2 => Ok(self.render_flat()),
            HwpackFormat::V3 => self.render_yaml(),
        }
    }
}

/// Parse the content of a `metadata` member into a mapping.
///
/// `KEY=value` content is detected when the first line has `=` and no `:`.
/// Its keys are lower cased.
pub fn parse_metadata(s: &str) -> Result<Mapping> {
    let first_line = s.lines().next().unwrap_or_default();

    if first_line.contains('=') && !first_line.contains(':') {
        let mut mapping = Mapping::new();

        for line in s.lines().filter(|l| !l.trim().is_empty()) {
            let (key, value) = line.split_once('=').ok_or_else(|| {
                HwpackError::Archive(format!("malformed metadata line: {}", line))
            })?;

            mapping.insert(
                Value::String(key.trim().to_ascii_lowercase()),
                Value::String(value.trim().to_string()),
            );
        }

        Ok(mapping)
    } else {
        match serde_yaml::from_str::<Value>(s)? {
            Value::Mapping(m) => Ok(m),
            Value::Null => Ok(Mapping::new()),
            _ => Err(HwpackError::Archive(
                "metadata is not a mapping".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    #[test]
    fn render_v1() -> Result<()> {
        let config = Config::from_ini_str(indoc! {"
            [hwpack]
            name = ahwpack
            architectures = armel
            packages = foo
            support = supported
            origin = Linaro

            [ubuntu]
            sources-entry = file:///src ./
        "})?;

        let metadata = Metadata::from_config(&config, "4", "armel");
        assert_eq!(
            metadata.render()?,
            "NAME=ahwpack\nVERSION=4\nARCHITECTURE=armel\nORIGIN=Linaro\nSUPPORT=supported\n"
        );

        Ok(())
    }

    #[test]
    fn render_v2() -> Result<()> {
        let config = Config::from_ini_str(indoc! {"
            [hwpack]
            format = 2.0
            name = ahwpack
            architectures = armel
            packages = foo
            u_boot_package = u-boot
            u_boot_file = usr/lib/u-boot/u-boot.bin
            wired_interfaces = eth0 usb0
            kernel_addr = 0x80000000

            [ubuntu]
            sources-entry = file:///src ./
        "})?;

        let mut metadata = Metadata::from_config(&config, "4", "armel");
        metadata.set_option(
            &["u_boot_file".to_string()],
            OptionValue::Text("u-boot/u-boot.bin".into()),
        )?;

        assert_eq!(
            metadata.render()?,
            indoc! {"
                NAME=ahwpack
                VERSION=4
                ARCHITECTURE=armel
                KERNEL_ADDR=0x80000000
                WIRED_INTERFACES=eth0 usb0
                U_BOOT_PACKAGE=u-boot
                U_BOOT_FILE=u-boot/u-boot.bin
            "}
        );

        Ok(())
    }

    #[test]
    fn render_v3_and_parse() -> Result<()> {
        let config = Config::from_yaml_str(indoc! {"
            name: ahwpack
            architectures: [armhf]
            packages: [foo]
            sources:
              ubuntu: file:///src ./
            kernel_addr: 0x80008000
            bootloaders:
              u_boot:
                package: u-boot
                file: usr/lib/u-boot/u-boot.img
            boards:
              panda:
                bootloaders:
                  u_boot:
                    file: usr/lib/u-boot/panda/u-boot.img
        "})?;

        let mut metadata = Metadata::from_config(&config, "4", "armhf");
        let path = ["boards", "panda", "bootloaders", "u_boot", "file"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        metadata.set_option(&path, OptionValue::Text("panda/u_boot/u-boot.img".into()))?;

        let parsed = parse_metadata(&metadata.render()?)?;
        assert_eq!(parsed["format"], Value::String("3.0".into()));
        assert_eq!(parsed["version"], Value::String("4".into()));
        assert_eq!(parsed["kernel_addr"], Value::String("0x80008000".into()));
        assert_eq!(
            parsed["boards"]["panda"]["bootloaders"]["u_boot"]["file"],
            Value::String("panda/u_boot/u-boot.img".into())
        );
        assert_eq!(
            parsed["bootloaders"]["u_boot"]["file"],
            Value::String("usr/lib/u-boot/u-boot.img".into())
        );

        assert!(metadata
            .set_option(
                &["boards".to_string(), "beagle".to_string(), "x".to_string()],
                OptionValue::Text("x".into())
            )
            .is_err());

        Ok(())
    }

    #[test]
    fn parse_flat() -> Result<()> {
        let parsed = parse_metadata("NAME=ahwpack\nVERSION=4\nU_BOOT_FILE=u-boot/u-boot.bin\n")?;

        assert_eq!(parsed["name"], Value::String("ahwpack".into()));
        assert_eq!(parsed["u_boot_file"], Value::String("u-boot/u-boot.bin".into()));

        Ok(())
    }
}
