//! Validates a resolved program description and emits the binary
//! configuration record.
//!
//! [`ProgramConfig::from_tree`] walks a [`Value`] tree, applies the semantic
//! rules of the configuration schema, and normalizes everything into typed
//! fields; [`ProgramConfig::to_bytes`] then writes the fixed-layout record.
//! A parameter is in *label mode* when it carries `value_labels` and in
//! *numeric mode* otherwise; the two modes allow disjoint field sets.

use std::collections::BTreeMap;

use flagset::FlagSet;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::consts::*;
use crate::error::Error;
use crate::pack::{put_i16, put_str, put_u16, put_u32, put_u8};
use crate::value::{AbiRange, Diagnostics, SemVer, Value};

/// Numeric-mode keys that a labeled parameter must not carry.
const NUMERIC_ONLY_KEYS: [&str; 8] = [
    "min_value",
    "max_value",
    "initial_value",
    "display_min_value",
    "display_max_value",
    "display_float_digits",
    "suffix_label",
    "control_mode",
];

/// A validated program configuration.
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    /// Unique program identifier
    pub program_id: String,
    /// Program version
    pub version: SemVer,
    /// Firmware ABI compatibility range
    pub abi: AbiRange,
    /// Hardware platforms the program runs on
    pub hardware: FlagSet<HardwareFlag>,
    /// Pixel pipeline the program targets
    pub core: CoreKind,
    /// Display name
    pub program_name: String,
    /// Program author
    pub author: String,
    /// License identifier
    pub license: String,
    /// Browsing category
    pub category: String,
    /// One-line description
    pub description: String,
    /// Project URL
    pub url: String,
    /// User-facing controls, at most twelve
    pub parameters: Vec<ParameterConfig>,
}

impl ProgramConfig {
    /// Validates a resolved program description.
    ///
    /// Fatal violations return an error naming the offending field; unknown
    /// hardware flags and core names fall back to defaults with a warning in
    /// `diag`.
    pub fn from_tree(root: &Value, diag: &mut Diagnostics) -> Result<Self, Error> {
        let table = root
            .as_table()
            .ok_or_else(|| validation("program", "expected a table"))?;

        let program_id = required_str(table, "program_id")?;
        let program_name = required_str(table, "program_name")?;
        let version = resolve_version(table)?;
        let abi = resolve_abi(table)?;
        let hardware = resolve_hardware(table, diag)?;
        let core = resolve_core(table, diag)?;

        let parameters = match table.get("parameters") {
            None => Vec::new(),
            Some(value) => {
                let list = value
                    .as_list()
                    .ok_or_else(|| validation("parameters", "expected a list of tables"))?;
                if list.len() > MAX_PARAMETERS {
                    return Err(validation(
                        "parameters",
                        format!("{} parameters exceed the limit of {MAX_PARAMETERS}", list.len()),
                    ));
                }

                list.iter()
                    .enumerate()
                    .map(|(index, value)| ParameterConfig::from_tree(index, value, diag))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let mut seen = Vec::new();
        for parameter in &parameters {
            if parameter.id == ParameterId::None {
                continue;
            }
            if seen.contains(&parameter.id) {
                return Err(validation(
                    "parameters",
                    format!("parameter_id {:?} is used more than once", parameter.id),
                ));
            }
            seen.push(parameter.id);
        }

        Ok(ProgramConfig {
            program_id,
            version,
            abi,
            hardware,
            core,
            program_name,
            author: optional_str(table, "author")?.unwrap_or_default(),
            license: optional_str(table, "license")?.unwrap_or_default(),
            category: optional_str(table, "category")?.unwrap_or_default(),
            description: optional_str(table, "description")?.unwrap_or_default(),
            url: optional_str(table, "url")?.unwrap_or_default(),
            parameters,
        })
    }

    /// Emits the 7,372-byte configuration record. Unused parameter slots are
    /// zero-filled.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        if self.parameters.len() > MAX_PARAMETERS {
            return Err(validation(
                "parameters",
                format!(
                    "{} parameters exceed the limit of {MAX_PARAMETERS}",
                    self.parameters.len()
                ),
            ));
        }

        let mut buf = vec![0u8; CONFIG_SIZE];

        put_str(
            &mut buf,
            CFG_PROGRAM_ID,
            CFG_PROGRAM_ID_LEN,
            "program_id",
            &self.program_id,
        )?;
        put_u16(&mut buf, CFG_VERSION_MAJOR, self.version.major);
        put_u16(&mut buf, CFG_VERSION_MINOR, self.version.minor);
        put_u16(&mut buf, CFG_VERSION_PATCH, self.version.patch);
        put_u16(&mut buf, CFG_ABI_MIN_MAJOR, self.abi.min.0);
        put_u16(&mut buf, CFG_ABI_MIN_MINOR, self.abi.min.1);
        put_u16(&mut buf, CFG_ABI_MAX_MAJOR, self.abi.max.0);
        put_u16(&mut buf, CFG_ABI_MAX_MINOR, self.abi.max.1);
        put_u32(&mut buf, CFG_HW_MASK, self.hardware.bits());
        put_u32(&mut buf, CFG_CORE_ID, self.core.to_u32().unwrap());
        put_str(
            &mut buf,
            CFG_PROGRAM_NAME,
            CFG_PROGRAM_NAME_LEN,
            "program_name",
            &self.program_name,
        )?;
        put_str(&mut buf, CFG_AUTHOR, CFG_AUTHOR_LEN, "author", &self.author)?;
        put_str(&mut buf, CFG_LICENSE, CFG_LICENSE_LEN, "license", &self.license)?;
        put_str(
            &mut buf,
            CFG_CATEGORY,
            CFG_CATEGORY_LEN,
            "category",
            &self.category,
        )?;
        put_str(
            &mut buf,
            CFG_DESCRIPTION,
            CFG_DESCRIPTION_LEN,
            "description",
            &self.description,
        )?;
        put_str(&mut buf, CFG_URL, CFG_URL_LEN, "url", &self.url)?;
        put_u16(&mut buf, CFG_PARAMETER_COUNT, self.parameters.len() as u16);

        for (index, parameter) in self.parameters.iter().enumerate() {
            let start = CFG_PARAMETERS + index * PARAMETER_SIZE;
            parameter.write(&mut buf[start..start + PARAMETER_SIZE], index)?;
        }

        // The layout constants guarantee this; a mismatch is a bug, not input.
        assert_eq!(buf.len(), CONFIG_SIZE);

        Ok(buf)
    }
}

/// A validated parameter configuration with its emission values resolved.
#[derive(Debug, Clone)]
pub struct ParameterConfig {
    /// Control slot the parameter is bound to
    pub id: ParameterId,
    /// Response behavior of the control
    pub control_mode: u32,
    /// Lowest raw value
    pub min_value: u16,
    /// Highest raw value
    pub max_value: u16,
    /// Raw value selected at program load
    pub initial_value: u16,
    /// Display value mapped to `min_value`
    pub display_min_value: i16,
    /// Display value mapped to `max_value`
    pub display_max_value: i16,
    /// Fractional digits shown for display values
    pub display_float_digits: u8,
    /// Display name of the control
    pub name_label: String,
    /// Discrete value labels; non-empty selects label mode
    pub value_labels: Vec<String>,
    /// Unit suffix shown after display values
    pub suffix_label: String,
}

impl ParameterConfig {
    fn from_tree(index: usize, value: &Value, diag: &mut Diagnostics) -> Result<Self, Error> {
        let context = format!("parameters[{index}]");
        let table = value
            .as_table()
            .ok_or_else(|| validation(context.clone(), "expected a table"))?;
        let field = |name: &str| format!("{context}.{name}");

        let name_label = optional_str_at(table, &field("name_label"), "name_label")?
            .ok_or_else(|| validation(field("name_label"), "missing"))?;
        if name_label.is_empty() {
            return Err(validation(field("name_label"), "must not be empty"));
        }

        let id = resolve_parameter_id(table, &field("parameter_id"))?;

        let value_labels = match table.get("value_labels") {
            None => Vec::new(),
            Some(value) => value
                .as_list()
                .ok_or_else(|| validation(field("value_labels"), "expected a list of strings"))?
                .iter()
                .map(|label| {
                    label
                        .as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| validation(field("value_labels"), "expected a list of strings"))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        // Derive the label count before looking at the deprecated field so
        // the mismatch warning compares against the real count.
        let auto_count = value_labels.len();
        if let Some(value) = table.get("value_label_count") {
            diag.warn(format!(
                "{}: value_label_count is deprecated; the count is derived from value_labels",
                field("value_label_count")
            ));
            if value.as_int() != Some(auto_count as i64) {
                diag.warn(format!(
                    "{}: stated count does not match the {auto_count} labels given",
                    field("value_label_count")
                ));
            }
        }

        if auto_count > 0 {
            Self::labeled_from_tree(table, id, name_label, value_labels, &field)
        } else {
            Self::numeric_from_tree(table, id, name_label, &field)
        }
    }

    fn labeled_from_tree(
        table: &BTreeMap<String, Value>,
        id: ParameterId,
        name_label: String,
        value_labels: Vec<String>,
        field: &dyn Fn(&str) -> String,
    ) -> Result<Self, Error> {
        if value_labels.len() < 2 || value_labels.len() > MAX_VALUE_LABELS {
            return Err(validation(
                field("value_labels"),
                format!(
                    "{} labels given, a labeled parameter takes 2 to {MAX_VALUE_LABELS}",
                    value_labels.len()
                ),
            ));
        }

        for key in NUMERIC_ONLY_KEYS {
            if table.contains_key(key) {
                return Err(validation(
                    field(key),
                    "not allowed for a labeled parameter",
                ));
            }
        }

        let initial_value = match optional_str_at(table, &field("initial_value_label"), "initial_value_label")? {
            None => 0,
            Some(label) => value_labels
                .iter()
                .position(|candidate| *candidate == label)
                .ok_or_else(|| {
                    validation(
                        field("initial_value_label"),
                        format!("'{label}' is not one of the value labels"),
                    )
                })? as u16,
        };

        let max_value = (value_labels.len() - 1) as u16;

        Ok(ParameterConfig {
            id,
            control_mode: CONTROL_MODE_LINEAR,
            min_value: 0,
            max_value,
            initial_value,
            display_min_value: 0,
            display_max_value: max_value as i16,
            display_float_digits: 0,
            name_label,
            value_labels,
            suffix_label: String::new(),
        })
    }

    fn numeric_from_tree(
        table: &BTreeMap<String, Value>,
        id: ParameterId,
        name_label: String,
        field: &dyn Fn(&str) -> String,
    ) -> Result<Self, Error> {
        if table.contains_key("initial_value_label") {
            return Err(validation(
                field("initial_value_label"),
                "only allowed for a labeled parameter",
            ));
        }

        let max_value =
            optional_u16(table, &field("max_value"), "max_value")?.unwrap_or(MAX_PARAMETER_VALUE);
        if max_value > MAX_PARAMETER_VALUE {
            return Err(validation(
                field("max_value"),
                format!("{max_value} exceeds the limit of {MAX_PARAMETER_VALUE}"),
            ));
        }

        let min_value = optional_u16(table, &field("min_value"), "min_value")?.unwrap_or(0);
        if min_value >= max_value {
            return Err(validation(
                field("min_value"),
                format!("{min_value} is not below max_value {max_value}"),
            ));
        }

        let initial_value =
            optional_u16(table, &field("initial_value"), "initial_value")?.unwrap_or(512);
        if initial_value < min_value || initial_value > max_value {
            return Err(validation(
                field("initial_value"),
                format!("{initial_value} is outside [{min_value}, {max_value}]"),
            ));
        }

        let display_min_value = optional_i16(table, &field("display_min_value"), "display_min_value")?
            .unwrap_or(min_value as i16);
        let display_max_value = optional_i16(table, &field("display_max_value"), "display_max_value")?
            .unwrap_or(max_value as i16);

        let display_float_digits = match optional_int(table, &field("display_float_digits"), "display_float_digits")? {
            None => 0,
            Some(digits) => u8::try_from(digits).map_err(|_| {
                validation(field("display_float_digits"), format!("{digits} does not fit in a byte"))
            })?,
        };

        let control_mode = resolve_control_mode(table, &field("control_mode"))?;
        let suffix_label =
            optional_str_at(table, &field("suffix_label"), "suffix_label")?.unwrap_or_default();

        Ok(ParameterConfig {
            id,
            control_mode,
            min_value,
            max_value,
            initial_value,
            display_min_value,
            display_max_value,
            display_float_digits,
            name_label,
            value_labels: Vec::new(),
            suffix_label,
        })
    }

    fn write(&self, record: &mut [u8], index: usize) -> Result<(), Error> {
        if self.value_labels.len() > MAX_VALUE_LABELS {
            return Err(validation(
                format!("parameters[{index}].value_labels"),
                format!(
                    "{} labels exceed the limit of {MAX_VALUE_LABELS}",
                    self.value_labels.len()
                ),
            ));
        }

        put_u32(record, PAR_ID, self.id.to_u32().unwrap());
        put_u32(record, PAR_CONTROL_MODE, self.control_mode);
        put_u16(record, PAR_MIN, self.min_value);
        put_u16(record, PAR_MAX, self.max_value);
        put_u16(record, PAR_INITIAL, self.initial_value);
        put_i16(record, PAR_DISPLAY_MIN, self.display_min_value);
        put_i16(record, PAR_DISPLAY_MAX, self.display_max_value);
        put_u8(record, PAR_FLOAT_DIGITS, self.display_float_digits);
        put_u8(record, PAR_LABEL_COUNT, self.value_labels.len() as u8);
        put_str(
            record,
            PAR_NAME,
            PAR_LABEL_LEN,
            &format!("parameters[{index}].name_label"),
            &self.name_label,
        )?;
        for (label_index, label) in self.value_labels.iter().enumerate() {
            put_str(
                record,
                PAR_VALUE_LABELS + label_index * PAR_LABEL_LEN,
                PAR_LABEL_LEN,
                &format!("parameters[{index}].value_labels[{label_index}]"),
                label,
            )?;
        }
        put_str(
            record,
            PAR_SUFFIX,
            PAR_SUFFIX_LEN,
            &format!("parameters[{index}].suffix_label"),
            &self.suffix_label,
        )?;

        Ok(())
    }
}

fn validation(field: impl Into<String>, reason: impl Into<String>) -> Error {
    Error::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

fn required_str(table: &BTreeMap<String, Value>, key: &str) -> Result<String, Error> {
    let value = optional_str(table, key)?.ok_or_else(|| validation(key, "missing"))?;
    if value.is_empty() {
        return Err(validation(key, "must not be empty"));
    }

    Ok(value)
}

fn optional_str(table: &BTreeMap<String, Value>, key: &str) -> Result<Option<String>, Error> {
    optional_str_at(table, key, key)
}

fn optional_str_at(
    table: &BTreeMap<String, Value>,
    field: &str,
    key: &str,
) -> Result<Option<String>, Error> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_owned()))
            .ok_or_else(|| validation(field, "expected a string")),
    }
}

fn optional_int(
    table: &BTreeMap<String, Value>,
    field: &str,
    key: &str,
) -> Result<Option<i64>, Error> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_int()
            .map(Some)
            .ok_or_else(|| validation(field, "expected an integer")),
    }
}

fn optional_u16(
    table: &BTreeMap<String, Value>,
    field: &str,
    key: &str,
) -> Result<Option<u16>, Error> {
    match optional_int(table, field, key)? {
        None => Ok(None),
        Some(raw) => u16::try_from(raw)
            .map(Some)
            .map_err(|_| validation(field, format!("{raw} does not fit in a u16"))),
    }
}

fn optional_i16(
    table: &BTreeMap<String, Value>,
    field: &str,
    key: &str,
) -> Result<Option<i16>, Error> {
    match optional_int(table, field, key)? {
        None => Ok(None),
        Some(raw) => i16::try_from(raw)
            .map(Some)
            .map_err(|_| validation(field, format!("{raw} does not fit in an i16"))),
    }
}

fn resolve_version(table: &BTreeMap<String, Value>) -> Result<SemVer, Error> {
    let as_string = optional_str(table, "version")?;
    let major = optional_int(table, "version_major", "version_major")?;
    let minor = optional_int(table, "version_minor", "version_minor")?;
    let patch = optional_int(table, "version_patch", "version_patch")?;

    match (as_string, major, minor, patch) {
        (Some(s), None, None, None) => s.parse(),
        (None, Some(major), Some(minor), Some(patch)) => Ok(SemVer {
            major: int_to_u16("version_major", major)?,
            minor: int_to_u16("version_minor", minor)?,
            patch: int_to_u16("version_patch", patch)?,
        }),
        (None, None, None, None) => Err(validation("version", "missing")),
        _ => Err(validation(
            "version",
            "must be given either as a string or as the three integer fields",
        )),
    }
}

fn resolve_abi(table: &BTreeMap<String, Value>) -> Result<AbiRange, Error> {
    let as_string = optional_str(table, "abi")?;
    let endpoints = [
        optional_int(table, "abi_min_major", "abi_min_major")?,
        optional_int(table, "abi_min_minor", "abi_min_minor")?,
        optional_int(table, "abi_max_major", "abi_max_major")?,
        optional_int(table, "abi_max_minor", "abi_max_minor")?,
    ];

    match (as_string, endpoints) {
        (Some(s), [None, None, None, None]) => s.parse(),
        (None, [Some(min_major), Some(min_minor), Some(max_major), Some(max_minor)]) => {
            AbiRange::new(
                (
                    int_to_u16("abi_min_major", min_major)?,
                    int_to_u16("abi_min_minor", min_minor)?,
                ),
                (
                    int_to_u16("abi_max_major", max_major)?,
                    int_to_u16("abi_max_minor", max_minor)?,
                ),
            )
        }
        (None, [None, None, None, None]) => Err(validation("abi", "missing")),
        _ => Err(validation(
            "abi",
            "must be given either as a range string or as the four integer fields",
        )),
    }
}

fn int_to_u16(field: &str, raw: i64) -> Result<u16, Error> {
    u16::try_from(raw).map_err(|_| validation(field, format!("{raw} does not fit in a u16")))
}

fn resolve_hardware(
    table: &BTreeMap<String, Value>,
    diag: &mut Diagnostics,
) -> Result<FlagSet<HardwareFlag>, Error> {
    let list = match table.get("hardware_compatibility") {
        None => return Ok(FlagSet::full()),
        Some(value) => value.as_list().ok_or_else(|| {
            validation("hardware_compatibility", "expected a list of flag names")
        })?,
    };

    let mut mask = FlagSet::default();
    for item in list {
        let name = item.as_str().ok_or_else(|| {
            validation("hardware_compatibility", "expected a list of flag names")
        })?;
        match HARDWARE_FLAG_NAMES.get(name) {
            Some(flag) => mask |= *flag,
            None => diag.warn(format!(
                "hardware_compatibility: unknown flag '{name}' ignored"
            )),
        }
    }

    // An empty list means "compatible with everything".
    if mask.is_empty() {
        return Ok(FlagSet::full());
    }

    Ok(mask)
}

fn resolve_core(table: &BTreeMap<String, Value>, diag: &mut Diagnostics) -> Result<CoreKind, Error> {
    let value = match table.get("core_id") {
        None => return Ok(CoreKind::Yuv444_30b),
        Some(value) => value,
    };

    if let Some(name) = value.as_str() {
        return Ok(match CORE_NAMES.get(name) {
            Some(kind) => *kind,
            None => {
                diag.warn(format!(
                    "core_id: unknown core '{name}', using yuv444_30b"
                ));
                CoreKind::Yuv444_30b
            }
        });
    }

    if let Some(raw) = value.as_int() {
        return Ok(match CoreKind::from_i64(raw) {
            Some(kind) => kind,
            None => {
                diag.warn(format!("core_id: unknown core {raw}, using yuv444_30b"));
                CoreKind::Yuv444_30b
            }
        });
    }

    Err(validation("core_id", "expected a name or an integer"))
}

fn resolve_parameter_id(
    table: &BTreeMap<String, Value>,
    field: &str,
) -> Result<ParameterId, Error> {
    let value = table
        .get("parameter_id")
        .ok_or_else(|| validation(field, "missing"))?;

    if let Some(name) = value.as_str() {
        return PARAMETER_ID_NAMES
            .get(name)
            .copied()
            .ok_or_else(|| validation(field, format!("unknown parameter id '{name}'")));
    }

    if let Some(raw) = value.as_int() {
        return ParameterId::from_i64(raw)
            .ok_or_else(|| validation(field, format!("unknown parameter id {raw}")));
    }

    Err(validation(field, "expected a name or an integer"))
}

fn resolve_control_mode(table: &BTreeMap<String, Value>, field: &str) -> Result<u32, Error> {
    let value = match table.get("control_mode") {
        None => return Ok(CONTROL_MODE_LINEAR),
        Some(value) => value,
    };

    if let Some(name) = value.as_str() {
        return CONTROL_MODE_NAMES
            .get(name)
            .copied()
            .ok_or_else(|| validation(field, format!("unknown control mode '{name}'")));
    }

    if let Some(raw) = value.as_int() {
        if raw < 0 || raw > i64::from(MAX_CONTROL_MODE) {
            return Err(validation(
                field,
                format!("{raw} is outside [0, {MAX_CONTROL_MODE}]"),
            ));
        }
        return Ok(raw as u32);
    }

    Err(validation(field, "expected a name or an integer"))
}
