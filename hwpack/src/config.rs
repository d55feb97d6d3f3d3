// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Hardware pack build recipes.

A recipe names the hardware pack, the architectures to build it for, the
packages to bundle and the APT sources to fetch them from. Format 1.0 and 2.0
recipes are INI documents with a `[hwpack]` section plus one section per
source. Format 3.0 recipes are YAML documents that additionally support
per-bootloader and per-board scoping of hardware options.

Parsing is total: every value is validated when a [Config] is constructed and
any failure is reported as [HwpackError::Config] naming the key and value.
*/

use {
    crate::{
        error::{HwpackError, Result},
        ini::{normalize_key, IniDocument},
    },
    log::warn,
    once_cell::sync::Lazy,
    regex::Regex,
    serde_yaml::{Mapping, Value},
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
        io::Read,
        path::Path,
    },
};

/// Valid package and hardware pack names.
pub static RE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9+\-.]+$").unwrap());

/// Valid paths of files inside packages.
pub static RE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w[\w+\-./_]+$").unwrap());

/// Valid kernel, initrd and dtb paths, which may be glob patterns.
pub static RE_GLOB: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w[\w+\-./_*]+$").unwrap());

/// Load addresses accepted by format 2.0 recipes.
static RE_V2_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9A-Fa-f]{8}$").unwrap());

/// Hardware options available at the top level of format 2.0 and 3.0 recipes
/// and on boards in format 3.0 recipes.
///
/// The order is the order options are rendered in metadata.
pub const HARDWARE_KEYS: &[&str] = &[
    "serial_tty",
    "kernel_addr",
    "initrd_addr",
    "load_addr",
    "dtb_addr",
    "wired_interfaces",
    "wireless_interfaces",
    "partition_layout",
    "mmc_id",
    "boot_min_size",
    "root_min_size",
    "loader_min_size",
    "kernel_file",
    "initrd_file",
    "dtb_file",
    "boot_script",
    "extra_boot_options",
    "extra_serial_options",
];

/// Bootloader options only found at the top level of format 2.0 recipes.
pub const V2_BOOTLOADER_KEYS: &[&str] = &[
    "u_boot_package",
    "u_boot_file",
    "u_boot_in_boot_part",
    "x_loader_package",
    "x_loader_file",
];

/// Options of a bootloader in format 3.0 recipes.
pub const BOOTLOADER_KEYS: &[&str] = &[
    "package",
    "file",
    "in_boot_part",
    "copy_files",
    "extra_boot_options",
    "extra_serial_options",
    "spl_package",
    "spl_file",
    "spl_in_boot_part",
    "dd",
    "spl_dd",
    "env_dd",
];

const PARTITION_LAYOUTS: &[&str] = &["bootfs_rootfs", "bootfs16_rootfs"];

/// The hardware pack format a recipe targets.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HwpackFormat {
    V1,
    V2,
    V3,
}

impl HwpackFormat {
    /// The string written to the `FORMAT` member.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "1.0",
            Self::V2 => "2.0",
            Self::V3 => "3.0",
        }
    }

    /// Parse a format string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "1.0" => Ok(Self::V1),
            "2.0" => Ok(Self::V2),
            "3.0" => Ok(Self::V3),
            v => Err(HwpackError::config("format", v, "unsupported format")),
        }
    }
}

impl Display for HwpackFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Support status of a hardware pack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Support {
    Supported,
    Unsupported,
}

impl Support {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supported => "supported",
            Self::Unsupported => "unsupported",
        }
    }
}

/// A validated option value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OptionValue {
    Text(String),
    List(Vec<String>),
}

impl OptionValue {
    /// Render the value for `KEY=value` metadata. Lists are space separated.
    pub fn to_flat_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(l) => l.join(" "),
        }
    }

    /// Render the value as YAML.
    pub fn to_yaml(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::List(l) => Value::Sequence(l.iter().cloned().map(Value::String).collect()),
        }
    }

    /// Obtain the text of a scalar value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(_) => None,
        }
    }

    /// Obtain the items of a value; scalars yield themselves.
    pub fn items(&self) -> Vec<String> {
        match self {
            Self::Text(s) => vec![s.clone()],
            Self::List(l) => l.clone(),
        }
    }
}

impl Display for OptionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_flat_string())
    }
}

/// Options in one scope, keyed by option name.
pub type OptionScope = BTreeMap<String, OptionValue>;

/// Options for one board.
///
/// Board scoped options override top-level ones. Board scoped bootloaders
/// override the global bootloader of the same name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BoardConfig {
    pub options: OptionScope,
    pub bootloaders: BTreeMap<String, OptionScope>,
}

/// The result of a scoped option lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OptionLookup<'a> {
    pub value: &'a OptionValue,
    /// Keys leading to the value, e.g. `["boards", "panda", "bootloaders", "u_boot", "file"]`.
    pub path: Vec<String>,
}

/// A file to extract from a bootloader package into the hardware pack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootloaderFile {
    /// Package holding the file.
    pub package: String,
    /// Path of the file inside the package.
    pub file: String,
    /// Directory in the hardware pack receiving the file.
    pub target_dir: String,
    /// Option that names the file, rewritten in metadata to the extracted location.
    pub option_path: Option<Vec<String>>,
}

impl BootloaderFile {
    /// Path of the extracted file inside the hardware pack.
    pub fn hwpack_path(&self) -> String {
        let basename = self.file.rsplit('/').next().unwrap_or(&self.file);
        format!("{}/{}", self.target_dir, basename)
    }
}

/// A parsed and validated hardware pack recipe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    format: HwpackFormat,
    name: String,
    architectures: Vec<String>,
    origin: Option<String>,
    maintainer: Option<String>,
    support: Option<Support>,
    include_debs: bool,
    packages: Vec<String>,
    assume_installed: Vec<String>,
    sources: Vec<(String, String)>,
    options: OptionScope,
    bootloaders: BTreeMap<String, OptionScope>,
    boards: BTreeMap<String, BoardConfig>,
    board: Option<String>,
    bootloader: Option<String>,
}

fn yaml_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn scalar_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "yes" } else { "no" }.to_string()),
        _ => Err(HwpackError::config(
            key,
            yaml_repr(value),
            "expected a scalar value",
        )),
    }
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Sequence(items) => items.iter().map(|v| scalar_string(key, v)).collect(),
        Value::Null => Ok(vec![]),
        _ => Ok(scalar_string(key, value)?
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()),
    }
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn parse_bool(key: &str, value: &Value) -> Result<bool> {
    if let Value::Bool(b) = value {
        return Ok(*b);
    }

    let s = scalar_string(key, value)?;
    match s.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Ok(true),
        "no" | "false" | "off" | "0" => Ok(false),
        _ => Err(HwpackError::config(key, s, "not a boolean value")),
    }
}

fn parse_name(key: &str, value: &Value) -> Result<String> {
    let name = scalar_string(key, value)?;
    if !RE_NAME.is_match(&name) {
        return Err(HwpackError::config(key, name, "invalid name"));
    }

    Ok(name)
}

fn parse_name_list(key: &str, value: &Value) -> Result<Vec<String>> {
    let names = dedup_preserving_order(string_list(key, value)?);

    for name in &names {
        if !RE_NAME.is_match(name) {
            return Err(HwpackError::config(key, name, "invalid package name"));
        }
    }

    Ok(names)
}

fn parse_path(key: &str, value: &Value) -> Result<String> {
    let path = scalar_string(key, value)?;
    if !RE_PATH.is_match(&path) {
        return Err(HwpackError::config(key, path, "invalid path"));
    }

    Ok(path)
}

fn parse_address(format: HwpackFormat, key: &str, value: &Value) -> Result<String> {
    if format == HwpackFormat::V2 {
        let s = scalar_string(key, value)?;
        return if RE_V2_ADDRESS.is_match(&s) {
            Ok(s)
        } else {
            Err(HwpackError::config(
                key,
                s,
                "address must be 0x followed by 8 hex digits",
            ))
        };
    }

    let invalid = || HwpackError::config(key, yaml_repr(value), "not a valid address");

    let address = match value {
        Value::Number(n) => n.as_u64().ok_or_else(invalid)?,
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid())?,
                None => s.parse::<u64>().map_err(|_| invalid())?,
            }
        }
        _ => return Err(invalid()),
    };

    Ok(format!("0x{:08x}", address))
}

/// Validate an option value given its key.
///
/// `display_key` names the option in error messages.
fn validate_option(
    format: HwpackFormat,
    display_key: &str,
    key: &str,
    value: &Value,
) -> Result<OptionValue> {
    let text = |v: String| Ok(OptionValue::Text(v));

    match key {
        "serial_tty" => {
            let s = scalar_string(display_key, value)?;
            if !s.starts_with("tty") {
                return Err(HwpackError::config(
                    display_key,
                    s,
                    "serial tty must start with 'tty'",
                ));
            }
            text(s)
        }
        "kernel_addr" | "initrd_addr" | "load_addr" | "dtb_addr" => {
            text(parse_address(format, display_key, value)?)
        }
        "partition_layout" => {
            let s = scalar_string(display_key, value)?;
            if !PARTITION_LAYOUTS.contains(&s.as_str()) {
                return Err(HwpackError::config(
                    display_key,
                    s,
                    format!("partition layout must be one of {}", PARTITION_LAYOUTS.join(", ")),
                ));
            }
            text(s)
        }
        "mmc_id" => {
            let s = scalar_string(display_key, value)?;
            if s.parse::<i64>().is_err() {
                return Err(HwpackError::config(display_key, s, "mmc id must be an integer"));
            }
            text(s)
        }
        "boot_min_size" | "root_min_size" | "loader_min_size" => {
            let s = scalar_string(display_key, value)?;
            match s.parse::<u64>() {
                Ok(size) if size > 0 => text(s),
                _ => Err(HwpackError::config(
                    display_key,
                    s,
                    "size must be a positive integer",
                )),
            }
        }
        "wired_interfaces" | "wireless_interfaces" => {
            Ok(OptionValue::List(string_list(display_key, value)?))
        }
        "copy_files" => {
            let files = string_list(display_key, value)?;
            for file in &files {
                if !RE_PATH.is_match(file) {
                    return Err(HwpackError::config(display_key, file, "invalid path"));
                }
            }
            Ok(OptionValue::List(files))
        }
        "kernel_file" | "initrd_file" | "dtb_file" => {
            let s = scalar_string(display_key, value)?;
            if !RE_GLOB.is_match(&s) {
                return Err(HwpackError::config(display_key, s, "invalid path pattern"));
            }
            text(s)
        }
        "u_boot_file" | "x_loader_file" | "file" | "spl_file" => {
            text(parse_path(display_key, value)?)
        }
        "boot_script" => {
            let s = scalar_string(display_key, value)?;
            if s.is_empty() || s.starts_with('/') {
                return Err(HwpackError::config(
                    display_key,
                    s,
                    "boot script must be a relative path",
                ));
            }
            text(s)
        }
        "u_boot_package" | "x_loader_package" | "package" | "spl_package" => {
            text(parse_name(display_key, value)?)
        }
        "u_boot_in_boot_part" => {
            let s = scalar_string(display_key, value)?.to_ascii_lowercase();
            if s != "yes" && s != "no" {
                return Err(HwpackError::config(display_key, s, "must be yes or no"));
            }
            text(s)
        }
        "in_boot_part" | "spl_in_boot_part" => text(
            if parse_bool(display_key, value)? {
                "yes"
            } else {
                "no"
            }
            .to_string(),
        ),
        "dd" | "spl_dd" | "env_dd" => {
            let s = scalar_string(display_key, value)?;
            if s.parse::<u64>().is_ok() {
                text(s)
            } else {
                text(
                    if parse_bool(display_key, value)? {
                        "yes"
                    } else {
                        "no"
                    }
                    .to_string(),
                )
            }
        }
        _ => text(scalar_string(display_key, value)?),
    }
}

fn validate_source(id: &str, entry: &str) -> Result<String> {
    let key = format!("sources.{}", id);
    let entry = entry.trim();
    let tokens = entry.split_whitespace().collect::<Vec<_>>();

    if tokens.len() < 2 {
        return Err(HwpackError::config(
            key,
            entry,
            "sources entry must have at least a URI and a distribution",
        ));
    }

    if tokens[0] == "deb" || tokens[0] == "deb-src" {
        return Err(HwpackError::config(
            key,
            entry,
            "sources entry must not start with deb or deb-src",
        ));
    }

    if url::Url::parse(tokens[0]).is_err() {
        return Err(HwpackError::config(key, entry, "invalid URI"));
    }

    Ok(tokens.join(" "))
}

fn parse_bootloaders(
    format: HwpackFormat,
    prefix: &str,
    value: &Value,
) -> Result<BTreeMap<String, OptionScope>> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| HwpackError::config(prefix, yaml_repr(value), "expected a mapping"))?;

    let mut bootloaders = BTreeMap::new();

    for (name, options) in mapping {
        let name = scalar_string(prefix, name)?;
        let scope_key = format!("{}.{}", prefix, name);

        let options = match options {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m.clone(),
            v => {
                return Err(HwpackError::config(
                    scope_key,
                    yaml_repr(v),
                    "expected a mapping",
                ))
            }
        };

        let mut scope = OptionScope::new();
        for (key, value) in &options {
            let key = normalize_key(&scalar_string(&scope_key, key)?);
            let display_key = format!("{}.{}", scope_key, key);

            if !BOOTLOADER_KEYS.contains(&key.as_str()) {
                return Err(HwpackError::config(
                    display_key,
                    yaml_repr(value),
                    "unknown bootloader key",
                ));
            }

            scope.insert(key.clone(), validate_option(format, &display_key, &key, value)?);
        }

        bootloaders.insert(name, scope);
    }

    Ok(bootloaders)
}

impl Config {
    /// Parse a recipe from a reader.
    ///
    /// `filename_hint` selects the parser by suffix. Without a recognized suffix, the
    /// content is sniffed: a first significant line starting with `[` means INI.
    pub fn from_reader(mut reader: impl Read, filename_hint: Option<&Path>) -> Result<Self> {
        let mut data = String::new();
        reader.read_to_string(&mut data)?;

        let extension = filename_hint
            .and_then(|p| p.extension())
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        let is_ini = match extension.as_deref() {
            Some("yaml") | Some("yml") => false,
            Some("ini") | Some("cfg") | Some("conf") => true,
            _ => data
                .lines()
                .map(|l| l.trim())
                .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with(';'))
                .map(|l| l.starts_with('['))
                .unwrap_or(false),
        };

        if is_ini {
            Self::from_ini_str(&data)
        } else {
            Self::from_yaml_str(&data)
        }
    }

    /// Parse a recipe from a filesystem path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let fh = std::fs::File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HwpackError::ConfigFileMissing(path.to_path_buf())
            } else {
                HwpackError::Io(e)
            }
        })?;

        Self::from_reader(fh, Some(path))
    }

    /// Parse a format 1.0 or 2.0 INI recipe.
    pub fn from_ini_str(s: &str) -> Result<Self> {
        let doc = IniDocument::parse(s)?;

        let main = doc
            .section("hwpack")
            .ok_or_else(|| HwpackError::config("hwpack", "", "missing [hwpack] section"))?;

        let format = match main.get("format") {
            Some(v) => HwpackFormat::parse(v)?,
            None => HwpackFormat::V1,
        };
        if format == HwpackFormat::V3 {
            return Err(HwpackError::config(
                "format",
                format,
                "format 3.0 recipes must be written in YAML",
            ));
        }

        let mut mapping = Mapping::new();
        for (key, value) in main.iter() {
            if key == "format" {
                continue;
            }

            let is_hardware =
                HARDWARE_KEYS.contains(&key) || V2_BOOTLOADER_KEYS.contains(&key);

            if is_hardware && format == HwpackFormat::V1 {
                warn!("ignoring {} in format 1.0 hardware pack recipe", key);
                continue;
            }

            if !is_hardware && !is_main_key(key) {
                return Err(HwpackError::config(key, value, "unknown key"));
            }

            mapping.insert(Value::String(key.to_string()), Value::String(value.to_string()));
        }

        let mut sources = Mapping::new();
        for section in doc.sections().filter(|s| s.name() != "hwpack") {
            let entry = section.get("sources-entry").ok_or_else(|| {
                HwpackError::config(
                    format!("{}.sources-entry", section.name()),
                    "",
                    "section is missing sources-entry",
                )
            })?;

            sources.insert(
                Value::String(section.name().to_string()),
                Value::String(entry.to_string()),
            );
        }

        if sources.is_empty() {
            return Err(HwpackError::config(
                "sources",
                "",
                "at least one source section is required",
            ));
        }
        mapping.insert(Value::String("sources".into()), Value::Mapping(sources));

        Self::from_mapping(format, &mapping)
    }

    /// Parse a format 3.0 YAML recipe.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(s)?;

        let mapping = document.as_mapping().ok_or_else(|| {
            HwpackError::config("", yaml_repr(&document), "recipe must be a mapping")
        })?;

        let mut normalized = Mapping::new();
        let mut format = HwpackFormat::V3;

        for (key, value) in mapping {
            let key = normalize_key(&scalar_string("", key)?);

            if key == "format" {
                format = HwpackFormat::parse(&scalar_string("format", value)?)?;
                continue;
            }

            let known = is_main_key(&key)
                || HARDWARE_KEYS.contains(&key.as_str())
                || key == "sources"
                || key == "bootloaders"
                || key == "boards";

            if !known {
                return Err(HwpackError::config(key, yaml_repr(value), "unknown key"));
            }

            normalized.insert(Value::String(key), value.clone());
        }

        if format != HwpackFormat::V3 {
            return Err(HwpackError::config(
                "format",
                format,
                "YAML recipes must be format 3.0",
            ));
        }

        Self::from_mapping(format, &normalized)
    }

    /// Construct from a mapping with normalized keys, validating every value.
    fn from_mapping(format: HwpackFormat, mapping: &Mapping) -> Result<Self> {
        let get = |key: &str| mapping.get(&Value::String(key.to_string()));

        let name = parse_name(
            "name",
            get("name").ok_or_else(|| HwpackError::config("name", "", "missing required key"))?,
        )?;

        let architectures = dedup_preserving_order(string_list(
            "architectures",
            get("architectures").unwrap_or(&Value::Null),
        )?);
        if architectures.is_empty() {
            return Err(HwpackError::config(
                "architectures",
                "",
                "at least one architecture is required",
            ));
        }

        let packages = parse_name_list("packages", get("packages").unwrap_or(&Value::Null))?;
        if packages.is_empty() {
            return Err(HwpackError::config(
                "packages",
                "",
                "at least one package is required",
            ));
        }

        let assume_installed = parse_name_list(
            "assume_installed",
            get("assume_installed").unwrap_or(&Value::Null),
        )?;

        let include_debs = match get("include_debs") {
            Some(v) => parse_bool("include_debs", v)?,
            None => true,
        };

        let support = match get("support") {
            Some(v) => match scalar_string("support", v)?.as_str() {
                "supported" => Some(Support::Supported),
                "unsupported" => Some(Support::Unsupported),
                s => {
                    return Err(HwpackError::config(
                        "support",
                        s,
                        "support must be supported or unsupported",
                    ))
                }
            },
            None => None,
        };

        let origin = get("origin").map(|v| scalar_string("origin", v)).transpose()?;
        let maintainer = get("maintainer")
            .map(|v| scalar_string("maintainer", v))
            .transpose()?;

        let mut sources = vec![];
        if let Some(value) = get("sources") {
            let entries = value.as_mapping().ok_or_else(|| {
                HwpackError::config("sources", yaml_repr(value), "expected a mapping")
            })?;

            for (id, entry) in entries {
                let id = scalar_string("sources", id)?;
                let entry = scalar_string(&format!("sources.{}", id), entry)?;
                sources.push((id.clone(), validate_source(&id, &entry)?));
            }
        }
        if sources.is_empty() {
            return Err(HwpackError::config("sources", "", "at least one source is required"));
        }

        let mut options = OptionScope::new();
        for key in HARDWARE_KEYS.iter().chain(V2_BOOTLOADER_KEYS.iter()) {
            if let Some(value) = get(key) {
                options.insert(key.to_string(), validate_option(format, key, key, value)?);
            }
        }

        for (package_key, file_key) in [
            ("u_boot_package", "u_boot_file"),
            ("x_loader_package", "x_loader_file"),
        ] {
            if options.contains_key(package_key) && !options.contains_key(file_key) {
                return Err(HwpackError::config(
                    file_key,
                    "",
                    format!("required when {} is set", package_key),
                ));
            }
        }

        let bootloaders = match get("bootloaders") {
            Some(v) => parse_bootloaders(format, "bootloaders", v)?,
            None => BTreeMap::new(),
        };

        let mut boards = BTreeMap::new();
        if let Some(value) = get("boards") {
            let entries = value.as_mapping().ok_or_else(|| {
                HwpackError::config("boards", yaml_repr(value), "expected a mapping")
            })?;

            for (board, board_value) in entries {
                let board = scalar_string("boards", board)?;
                let prefix = format!("boards.{}", board);

                let board_mapping = match board_value {
                    Value::Null => Mapping::new(),
                    Value::Mapping(m) => m.clone(),
                    v => {
                        return Err(HwpackError::config(
                            prefix,
                            yaml_repr(v),
                            "expected a mapping",
                        ))
                    }
                };

                let mut board_config = BoardConfig::default();

                for (key, value) in &board_mapping {
                    let key = normalize_key(&scalar_string(&prefix, key)?);
                    let display_key = format!("{}.{}", prefix, key);

                    if key == "bootloaders" {
                        board_config.bootloaders =
                            parse_bootloaders(format, &display_key, value)?;
                    } else if HARDWARE_KEYS.contains(&key.as_str()) {
                        board_config.options.insert(
                            key.clone(),
                            validate_option(format, &display_key, &key, value)?,
                        );
                    } else {
                        return Err(HwpackError::config(
                            display_key,
                            yaml_repr(value),
                            "unknown board key",
                        ));
                    }
                }

                boards.insert(board, board_config);
            }
        }

        if format == HwpackFormat::V1 {
            warn!("hardware pack format 1.0 is deprecated; consider format 2.0 or 3.0");
        }

        Ok(Self {
            format,
            name,
            architectures,
            origin,
            maintainer,
            support,
            include_debs,
            packages,
            assume_installed,
            sources,
            options,
            bootloaders,
            boards,
            board: None,
            bootloader: None,
        })
    }

    /// Validate a hardware pack version string.
    pub fn validate_version(version: &str) -> Result<()> {
        if version.is_empty() || version.contains(char::is_whitespace) {
            Err(HwpackError::config(
                "version",
                version,
                "version must be non-empty and contain no whitespace",
            ))
        } else {
            Ok(())
        }
    }

    /// Derive a configuration scoped to a board and/or bootloader.
    ///
    /// Scoped lookups via [Self::get_option] prefer values from the selected scopes.
    pub fn for_board(&self, board: Option<&str>, bootloader: Option<&str>) -> Result<Self> {
        if let Some(board) = board {
            if !self.boards.contains_key(board) {
                return Err(HwpackError::config("board", board, "no such board"));
            }
        }

        if let Some(bootloader) = bootloader {
            let known = self.bootloaders.contains_key(bootloader)
                || board
                    .and_then(|b| self.boards.get(b))
                    .map(|b| b.bootloaders.contains_key(bootloader))
                    .unwrap_or(false);

            if !known {
                return Err(HwpackError::config(
                    "bootloader",
                    bootloader,
                    "no such bootloader",
                ));
            }
        }

        let mut config = self.clone();
        config.board = board.map(|s| s.to_string());
        config.bootloader = bootloader.map(|s| s.to_string());

        Ok(config)
    }

    /// Look up an option, returning the most specific value.
    ///
    /// Precedence is board+bootloader, then bootloader, then board, then top level.
    pub fn get_option(&self, key: &str) -> Option<OptionLookup<'_>> {
        let path = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let board = self
            .board
            .as_deref()
            .and_then(|b| self.boards.get(b).map(|c| (b, c)));

        if let (Some((board_name, board)), Some(bootloader)) = (board, self.bootloader.as_deref())
        {
            if let Some(value) = board.bootloaders.get(bootloader).and_then(|s| s.get(key)) {
                return Some(OptionLookup {
                    value,
                    path: path(&["boards", board_name, "bootloaders", bootloader, key]),
                });
            }
        }

        if let Some(bootloader) = self.bootloader.as_deref() {
            if let Some(value) = self.bootloaders.get(bootloader).and_then(|s| s.get(key)) {
                return Some(OptionLookup {
                    value,
                    path: path(&["bootloaders", bootloader, key]),
                });
            }
        }

        if let Some((board_name, board)) = board {
            if let Some(value) = board.options.get(key) {
                return Some(OptionLookup {
                    value,
                    path: path(&["boards", board_name, key]),
                });
            }
        }

        self.options.get(key).map(|value| OptionLookup {
            value,
            path: path(&[key]),
        })
    }

    pub fn format(&self) -> HwpackFormat {
        self.format
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn architectures(&self) -> &[String] {
        &self.architectures
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn maintainer(&self) -> Option<&str> {
        self.maintainer.as_deref()
    }

    pub fn support(&self) -> Option<Support> {
        self.support
    }

    pub fn include_debs(&self) -> bool {
        self.include_debs
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn assume_installed(&self) -> &[String] {
        &self.assume_installed
    }

    /// Sources as `(identifier, entry)` pairs in recipe order.
    pub fn sources(&self) -> &[(String, String)] {
        &self.sources
    }

    /// Top-level hardware options.
    pub fn options(&self) -> &OptionScope {
        &self.options
    }

    pub fn bootloaders(&self) -> &BTreeMap<String, OptionScope> {
        &self.bootloaders
    }

    pub fn boards(&self) -> &BTreeMap<String, BoardConfig> {
        &self.boards
    }

    pub fn board(&self) -> Option<&str> {
        self.board.as_deref()
    }

    pub fn bootloader(&self) -> Option<&str> {
        self.bootloader.as_deref()
    }

    /// Names of globally defined bootloaders.
    pub fn bootloader_names(&self) -> impl Iterator<Item = &str> {
        self.bootloaders.keys().map(|s| s.as_str())
    }

    /// Names of boards.
    pub fn board_names(&self) -> impl Iterator<Item = &str> {
        self.boards.keys().map(|s| s.as_str())
    }

    /// Every file to extract from bootloader packages, in a stable order.
    pub fn bootloader_files(&self) -> Vec<BootloaderFile> {
        let mut files = vec![];

        let text = |scope: &OptionScope, key: &str| {
            scope
                .get(key)
                .and_then(|v| v.as_text())
                .map(|s| s.to_string())
        };

        if self.format == HwpackFormat::V2 {
            for (prefix, target_dir) in [("u_boot", "u-boot"), ("x_loader", "x-loader")] {
                let file_key = format!("{}_file", prefix);
                if let (Some(package), Some(file)) = (
                    text(&self.options, &format!("{}_package", prefix)),
                    text(&self.options, &file_key),
                ) {
                    files.push(BootloaderFile {
                        package,
                        file,
                        target_dir: target_dir.to_string(),
                        option_path: Some(vec![file_key]),
                    });
                }
            }

            return files;
        }

        let mut scope_files = |scope: &OptionScope,
                               fallback: Option<&OptionScope>,
                               target_dir: String,
                               prefix: Vec<String>| {
            let lookup = |key: &str| {
                text(scope, key).or_else(|| fallback.and_then(|f| text(f, key)))
            };
            let with_key = |key: &str| {
                let mut path = prefix.clone();
                path.push(key.to_string());
                Some(path)
            };

            let package = lookup("package");

            if let (Some(package), Some(file)) = (package.clone(), text(scope, "file")) {
                files.push(BootloaderFile {
                    package,
                    file,
                    target_dir: target_dir.clone(),
                    option_path: with_key("file"),
                });
            }

            if let (Some(package), Some(file)) =
                (lookup("spl_package").or_else(|| package.clone()), text(scope, "spl_file"))
            {
                files.push(BootloaderFile {
                    package,
                    file,
                    target_dir: target_dir.clone(),
                    option_path: with_key("spl_file"),
                });
            }

            if let (Some(package), Some(copy_files)) = (package, scope.get("copy_files")) {
                for file in copy_files.items() {
                    files.push(BootloaderFile {
                        package: package.clone(),
                        file,
                        target_dir: target_dir.clone(),
                        option_path: None,
                    });
                }
            }
        };

        for (name, scope) in &self.bootloaders {
            scope_files(
                scope,
                None,
                name.clone(),
                vec!["bootloaders".to_string(), name.clone()],
            );
        }

        for (board, board_config) in &self.boards {
            for (name, scope) in &board_config.bootloaders {
                scope_files(
                    scope,
                    self.bootloaders.get(name),
                    format!("{}/{}", board, name),
                    vec![
                        "boards".to_string(),
                        board.clone(),
                        "bootloaders".to_string(),
                        name.clone(),
                    ],
                );
            }
        }

        files
    }

    /// Every package a bootloader option refers to, in a stable order.
    pub fn bootloader_packages(&self) -> Vec<String> {
        let mut packages = vec![];

        let mut collect = |scope: &OptionScope, keys: &[&str]| {
            for key in keys {
                if let Some(package) = scope.get(*key).and_then(|v| v.as_text()) {
                    packages.push(package.to_string());
                }
            }
        };

        collect(&self.options, &["u_boot_package", "x_loader_package"]);
        for scope in self.bootloaders.values() {
            collect(scope, &["package", "spl_package"]);
        }
        for board in self.boards.values() {
            for scope in board.bootloaders.values() {
                collect(scope, &["package", "spl_package"]);
            }
        }

        dedup_preserving_order(packages)
    }

    /// Render this recipe as a format 3.0 YAML document.
    ///
    /// Format 2.0 `u_boot_*` and `x_loader_*` options become the `u_boot` and
    /// `x_loader` bootloaders.
    pub fn to_yaml(&self) -> Result<String> {
        let mut root = Mapping::new();
        let s = |v: &str| Value::String(v.to_string());
        let list =
            |l: &[String]| Value::Sequence(l.iter().map(|v| Value::String(v.clone())).collect());

        root.insert(s("format"), s("3.0"));
        root.insert(s("name"), s(&self.name));
        root.insert(s("architectures"), list(&self.architectures));
        if let Some(origin) = &self.origin {
            root.insert(s("origin"), s(origin));
        }
        if let Some(maintainer) = &self.maintainer {
            root.insert(s("maintainer"), s(maintainer));
        }
        if let Some(support) = self.support {
            root.insert(s("support"), s(support.as_str()));
        }
        root.insert(s("include_debs"), Value::Bool(self.include_debs));
        root.insert(s("packages"), list(&self.packages));
        if !self.assume_installed.is_empty() {
            root.insert(s("assume_installed"), list(&self.assume_installed));
        }

        let mut sources = Mapping::new();
        for (id, entry) in &self.sources {
            sources.insert(s(id), s(entry));
        }
        root.insert(s("sources"), Value::Mapping(sources));

        for key in HARDWARE_KEYS {
            if let Some(value) = self.options.get(*key) {
                root.insert(s(key), value.to_yaml());
            }
        }

        let scope_yaml = |scope: &OptionScope| {
            let mut m = Mapping::new();
            for (k, v) in scope {
                m.insert(s(k), v.to_yaml());
            }
            Value::Mapping(m)
        };

        let mut bootloaders = Mapping::new();
        for (prefix, name) in [("u_boot", "u_boot"), ("x_loader", "x_loader")] {
            let mut scope = OptionScope::new();
            for (from, to) in [
                ("package", "package"),
                ("file", "file"),
                ("in_boot_part", "in_boot_part"),
            ] {
                if let Some(value) = self.options.get(&format!("{}_{}", prefix, from)) {
                    scope.insert(to.to_string(), value.clone());
                }
            }
            if !scope.is_empty() {
                bootloaders.insert(s(name), scope_yaml(&scope));
            }
        }
        for (name, scope) in &self.bootloaders {
            bootloaders.insert(s(name), scope_yaml(scope));
        }
        if !bootloaders.is_empty() {
            root.insert(s("bootloaders"), Value::Mapping(bootloaders));
        }

        if !self.boards.is_empty() {
            let mut boards = Mapping::new();
            for (name, board) in &self.boards {
                let mut m = Mapping::new();
                for (k, v) in &board.options {
                    m.insert(s(k), v.to_yaml());
                }
                if !board.bootloaders.is_empty() {
                    let mut bls = Mapping::new();
                    for (bl, scope) in &board.bootloaders {
                        bls.insert(s(bl), scope_yaml(scope));
                    }
                    m.insert(s("bootloaders"), Value::Mapping(bls));
                }
                boards.insert(s(name), Value::Mapping(m));
            }
            root.insert(s("boards"), Value::Mapping(boards));
        }

        Ok(serde_yaml::to_string(&Value::Mapping(root))?)
    }
}

fn is_main_key(key: &str) -> bool {
    matches!(
        key,
        "name"
            | "architectures"
            | "origin"
            | "maintainer"
            | "support"
            | "include_debs"
            | "packages"
            | "assume_installed"
    )
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    const MINIMAL_INI: &str = indoc! {"
        [hwpack]
        name = ahwpack
        architectures = armel
        packages = foo

        [ubuntu]
        sources-entry = file:///src ./
    "};

    fn config_error_key(res: Result<Config>) -> String {
        match res {
            Err(HwpackError::Config { key, .. }) => key,
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected a ConfigError"),
        }
    }

    #[test]
    fn minimal_v1() -> Result<()> {
        let config = Config::from_reader(MINIMAL_INI.as_bytes(), None)?;

        assert_eq!(config.format(), HwpackFormat::V1);
        assert_eq!(config.name(), "ahwpack");
        assert_eq!(config.architectures(), &["armel".to_string()]);
        assert_eq!(config.packages(), &["foo".to_string()]);
        assert!(config.include_debs());
        assert_eq!(config.support(), None);
        assert_eq!(
            config.sources(),
            &[("ubuntu".to_string(), "file:///src ./".to_string())]
        );

        Ok(())
    }

    #[test]
    fn lists_are_deduplicated() -> Result<()> {
        let config = Config::from_ini_str(indoc! {"
            [hwpack]
            name = ahwpack
            architectures = armel armel i386
            packages = foo bar foo
            assume-installed = baz baz

            [ubuntu]
            sources-entry = http://ports.ubuntu.com/ lucid main
        "})?;

        assert_eq!(config.architectures(), &["armel", "i386"]);
        assert_eq!(config.packages(), &["foo", "bar"]);
        assert_eq!(config.assume_installed(), &["baz"]);

        Ok(())
    }

    #[test]
    fn boundary_errors() {
        let replace = |from: &str, to: &str| MINIMAL_INI.replace(from, to);

        assert_eq!(
            config_error_key(Config::from_ini_str(&replace("packages = foo", "packages ="))),
            "packages"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(&replace(
                "sources-entry = file:///src ./",
                "sources-entry = deb file:///src ./"
            ))),
            "sources.ubuntu"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(&replace(
                "sources-entry = file:///src ./",
                "sources-entry = deb-src file:///src ./"
            ))),
            "sources.ubuntu"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(&replace(
                "sources-entry = file:///src ./",
                "sources-entry = file:///src"
            ))),
            "sources.ubuntu"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(&replace("name = ahwpack", "name = "))),
            "name"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(&replace("name = ahwpack", "name = A_hwpack"))),
            "name"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(&replace(
                "packages = foo",
                "packages = foo\nsupport = maybe"
            ))),
            "support"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(
                "[hwpack]\nname = ahwpack\n[s]\nsources-entry = file:///a ./\n"
            )),
            "architectures"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(
                "[hwpack]\nname = ahwpack\narchitectures = armel\npackages = foo\n"
            )),
            "sources"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str("[other]\nsources-entry = file:///a ./\n")),
            "hwpack"
        );
        assert_eq!(
            config_error_key(Config::from_ini_str(&replace(
                "[ubuntu]",
                "[ubuntu]\nother = value\n[broken]"
            ))),
            "ubuntu.sources-entry"
        );
    }

    #[test]
    fn v2_options() -> Result<()> {
        let config = Config::from_ini_str(indoc! {"
            [hwpack]
            format = 2.0
            name = ahwpack
            architectures = armel
            packages = foo
            support = supported
            include-debs = no
            serial_tty = ttyO2
            kernel_addr = 0x80000000
            initrd_addr = 0x81600000
            load_addr = 0x80008000
            partition_layout = bootfs_rootfs
            mmc_id = 0
            wired_interfaces = eth0 usb0
            kernel_file = boot/vmlinuz-*-linaro-omap
            u_boot_package = u-boot-linaro-omap4-panda
            u_boot_file = usr/lib/u-boot/omap4_panda/u-boot.bin
            u_boot_in_boot_part = Yes

            [ubuntu]
            sources-entry = http://ports.ubuntu.com/ lucid main
        "})?;

        assert_eq!(config.format(), HwpackFormat::V2);
        assert_eq!(config.support(), Some(Support::Supported));
        assert!(!config.include_debs());
        assert_eq!(
            config.get_option("kernel_addr").unwrap().value,
            &OptionValue::Text("0x80000000".into())
        );
        assert_eq!(
            config.get_option("wired_interfaces").unwrap().value,
            &OptionValue::List(vec!["eth0".into(), "usb0".into()])
        );
        assert_eq!(
            config.get_option("u_boot_in_boot_part").unwrap().value,
            &OptionValue::Text("yes".into())
        );
        assert_eq!(
            config.bootloader_packages(),
            vec!["u-boot-linaro-omap4-panda".to_string()]
        );
        assert_eq!(
            config.bootloader_files(),
            vec![BootloaderFile {
                package: "u-boot-linaro-omap4-panda".into(),
                file: "usr/lib/u-boot/omap4_panda/u-boot.bin".into(),
                target_dir: "u-boot".into(),
                option_path: Some(vec!["u_boot_file".into()]),
            }]
        );

        Ok(())
    }

    #[test]
    fn v2_validation_errors() {
        let base = indoc! {"
            [hwpack]
            format = 2.0
            name = ahwpack
            architectures = armel
            packages = foo
            OPTION

            [ubuntu]
            sources-entry = http://ports.ubuntu.com/ lucid main
        "};
        let with = |option: &str| Config::from_ini_str(&base.replace("OPTION", option));

        for (option, key) in [
            ("kernel_addr = 0x8000", "kernel_addr"),
            ("kernel_addr = 0x800000000", "kernel_addr"),
            ("kernel_addr = 80000000", "kernel_addr"),
            ("serial_tty = serial0", "serial_tty"),
            ("partition_layout = reallyfancy", "partition_layout"),
            ("mmc_id = x", "mmc_id"),
            ("boot_min_size = 0", "boot_min_size"),
            ("root_min_size = big", "root_min_size"),
            ("kernel_file = /boot/vmlinuz", "kernel_file"),
            ("u_boot_in_boot_part = maybe", "u_boot_in_boot_part"),
            ("u_boot_package = u-boot", "u_boot_file"),
            ("u_boot_package = U_BOOT\nu_boot_file = u-boot.bin", "u_boot_package"),
            ("boot_script = /boot.scr", "boot_script"),
        ] {
            assert_eq!(config_error_key(with(option)), key, "{}", option);
        }

        assert!(with("kernel_addr = 0x8000ABCD").is_ok());
    }

    #[test]
    fn v1_ignores_v2_options() -> Result<()> {
        let config = Config::from_ini_str(&MINIMAL_INI.replace(
            "packages = foo",
            "packages = foo\nkernel_addr = bogus",
        ))?;

        assert!(config.get_option("kernel_addr").is_none());

        Ok(())
    }

    #[test]
    fn format_3_in_ini_rejected() {
        let res = Config::from_ini_str(&MINIMAL_INI.replace("[hwpack]", "[hwpack]\nformat = 3.0"));
        assert_eq!(config_error_key(res), "format");
    }

    const V3_YAML: &str = indoc! {"
        format: '3.0'
        name: ahwpack
        architectures: [armhf]
        packages: [foo]
        sources:
          ubuntu: http://ports.ubuntu.com/ precise main
        kernel_addr: 0x80008000
        load_addr: 32768
        dtb_addr: '0x815f'
        wired_interfaces: [eth0]
        bootloaders:
          u_boot:
            package: u-boot-panda
            file: usr/lib/u-boot/omap4_panda/u-boot.img
            in_boot_part: true
            copy_files: [usr/lib/u-boot/omap4_panda/MLO]
        boards:
          panda:
            mmc_id: 1
            bootloaders:
              u_boot:
                package: u-boot-panda-es
                file: usr/lib/u-boot/omap4_panda/u-boot.img
                extra_boot_options: console=ttyO2
          beagle:
            partition_layout: bootfs16_rootfs
    "};

    #[test]
    fn v3_parsing() -> Result<()> {
        let config = Config::from_reader(V3_YAML.as_bytes(), Some(Path::new("panda.yaml")))?;

        assert_eq!(config.format(), HwpackFormat::V3);
        assert_eq!(
            config.get_option("kernel_addr").unwrap().value,
            &OptionValue::Text("0x80008000".into())
        );
        assert_eq!(
            config.get_option("load_addr").unwrap().value,
            &OptionValue::Text("0x00008000".into())
        );
        assert_eq!(
            config.get_option("dtb_addr").unwrap().value,
            &OptionValue::Text("0x0000815f".into())
        );
        assert_eq!(
            config.bootloaders()["u_boot"]["in_boot_part"],
            OptionValue::Text("yes".into())
        );
        assert_eq!(config.board_names().collect::<Vec<_>>(), vec!["beagle", "panda"]);
        assert_eq!(
            config.bootloader_packages(),
            vec!["u-boot-panda".to_string(), "u-boot-panda-es".to_string()]
        );

        let files = config.bootloader_files();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].hwpack_path(), "u_boot/u-boot.img");
        assert_eq!(files[1].hwpack_path(), "u_boot/MLO");
        assert_eq!(files[1].option_path, None);
        assert_eq!(files[2].hwpack_path(), "panda/u_boot/u-boot.img");
        assert_eq!(files[2].package, "u-boot-panda-es");

        Ok(())
    }

    #[test]
    fn v3_scoped_lookup() -> Result<()> {
        let config = Config::from_yaml_str(V3_YAML)?;

        let scoped = config.for_board(Some("panda"), Some("u_boot"))?;
        let lookup = scoped.get_option("file").unwrap();
        assert_eq!(
            lookup.path,
            vec!["boards", "panda", "bootloaders", "u_boot", "file"]
        );
        let lookup = scoped.get_option("in_boot_part").unwrap();
        assert_eq!(lookup.path, vec!["bootloaders", "u_boot", "in_boot_part"]);
        let lookup = scoped.get_option("mmc_id").unwrap();
        assert_eq!(lookup.path, vec!["boards", "panda", "mmc_id"]);
        let lookup = scoped.get_option("kernel_addr").unwrap();
        assert_eq!(lookup.path, vec!["kernel_addr"]);

        let beagle = config.for_board(Some("beagle"), Some("u_boot"))?;
        assert_eq!(
            beagle.get_option("file").unwrap().path,
            vec!["bootloaders", "u_boot", "file"]
        );

        assert!(config.for_board(Some("nosuch"), None).is_err());
        assert!(config.for_board(None, Some("grub")).is_err());

        Ok(())
    }

    #[test]
    fn v3_rejects_unknown_keys() {
        let res = Config::from_yaml_str(&format!("{}bogus: 1\n", V3_YAML));
        assert_eq!(config_error_key(res), "bogus");

        let res = Config::from_yaml_str(&V3_YAML.replace("in_boot_part: true", "in_boot: true"));
        assert_eq!(config_error_key(res), "bootloaders.u_boot.in_boot");

        let res = Config::from_yaml_str(&V3_YAML.replace(
            "partition_layout: bootfs16_rootfs",
            "u_boot_package: foo",
        ));
        assert_eq!(config_error_key(res), "boards.beagle.u_boot_package");

        let res =
            Config::from_yaml_str(&V3_YAML.replace("kernel_addr: 0x80008000", "kernel_addr: zzz"));
        assert_eq!(config_error_key(res), "kernel_addr");
    }

    #[test]
    fn parser_selection() -> Result<()> {
        // INI content sniffed without a suffix.
        let config = Config::from_reader(MINIMAL_INI.as_bytes(), Some(Path::new("recipe")))?;
        assert_eq!(config.format(), HwpackFormat::V1);

        // YAML content sniffed without a suffix.
        let config = Config::from_reader(V3_YAML.as_bytes(), None)?;
        assert_eq!(config.format(), HwpackFormat::V3);

        Ok(())
    }

    #[test]
    fn missing_config_file() {
        let res = Config::from_path("/nonexistent/hwpack.yaml");
        assert!(matches!(res, Err(HwpackError::ConfigFileMissing(_))));
    }

    #[test]
    fn version_validation() {
        assert!(Config::validate_version("4").is_ok());
        assert!(Config::validate_version("20120101.1~beta").is_ok());
        assert!(Config::validate_version("").is_err());
        assert!(Config::validate_version("1 2").is_err());
    }

    #[test]
    fn convert_to_yaml() -> Result<()> {
        let config = Config::from_ini_str(indoc! {"
            [hwpack]
            format = 2.0
            name = ahwpack
            architectures = armel
            packages = foo
            kernel_addr = 0x80000000
            u_boot_package = u-boot
            u_boot_file = usr/lib/u-boot/u-boot.bin

            [ubuntu]
            sources-entry = http://ports.ubuntu.com/ lucid main
        "})?;

        let converted = Config::from_yaml_str(&config.to_yaml()?)?;

        assert_eq!(converted.format(), HwpackFormat::V3);
        assert_eq!(converted.name(), "ahwpack");
        assert_eq!(converted.sources(), config.sources());
        assert_eq!(
            converted.bootloaders()["u_boot"]["file"],
            OptionValue::Text("usr/lib/u-boot/u-boot.bin".into())
        );
        assert_eq!(
            converted.get_option("kernel_addr").unwrap().value,
            &OptionValue::Text("0x80000000".into())
        );

        Ok(())
    }
}
