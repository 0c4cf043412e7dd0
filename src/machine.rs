use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Formatter;
use std::path::Path;

use crate::ctype::IntKind;
use crate::primitive::PrimitiveTypes;
use crate::utils;

/**
 * Sizes (in bytes) and properties of the target's fundamental types.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataModel {
    pub char_signed: bool,
    pub short_size: u8,
    pub int_size: u8,
    pub long_size: u8,
    pub llong_size: u8,
    pub ptr_size: u8,
    pub register_size: u8,
    #[serde(default = "default_bool_size")]
    pub bool_size: u8,
    pub max_align: u8,
    #[serde(default)]
    pub big_endian: bool,
    #[serde(default = "default_wchar_type")]
    pub wchar_type: IntKind,
    /// Pins the type behind `size_t` instead of picking it by pointer width.
    #[serde(default)]
    pub size_type: Option<IntKind>,
}

fn default_bool_size() -> u8 {
    1
}

fn default_wchar_type() -> IntKind {
    IntKind::Int
}

/// 16-bit CCPU: unsigned char, 2-byte int and pointers.
pub const CCPU: DataModel = DataModel {
    char_signed: false,
    short_size: 2,
    int_size: 2,
    long_size: 4,
    llong_size: 8,
    ptr_size: 2,
    register_size: 1,
    bool_size: 1,
    max_align: 8,
    big_endian: false,
    wchar_type: IntKind::Int,
    size_type: None,
};

/// i386 System V.
pub const ILP32: DataModel = DataModel {
    char_signed: true,
    short_size: 2,
    int_size: 4,
    long_size: 4,
    llong_size: 8,
    ptr_size: 4,
    register_size: 4,
    bool_size: 1,
    max_align: 4,
    big_endian: false,
    wchar_type: IntKind::Long,
    size_type: None,
};

/// x86-64 System V.
pub const LP64: DataModel = DataModel {
    char_signed: true,
    short_size: 2,
    int_size: 4,
    long_size: 8,
    llong_size: 8,
    ptr_size: 8,
    register_size: 8,
    bool_size: 1,
    max_align: 16,
    big_endian: false,
    wchar_type: IntKind::Int,
    size_type: None,
};

/// 64-bit Windows: `long` stays 32-bit, so `size_t` is `unsigned long long`.
pub const LLP64: DataModel = DataModel {
    char_signed: true,
    short_size: 2,
    int_size: 4,
    long_size: 4,
    llong_size: 8,
    ptr_size: 8,
    register_size: 8,
    bool_size: 1,
    max_align: 16,
    big_endian: false,
    wchar_type: IntKind::UShort,
    size_type: None,
};

/// x32 ABI: 64-bit registers, 32-bit pointers.
pub const X32: DataModel = DataModel {
    char_signed: true,
    short_size: 2,
    int_size: 4,
    long_size: 4,
    llong_size: 8,
    ptr_size: 4,
    register_size: 8,
    bool_size: 1,
    max_align: 16,
    big_endian: false,
    wchar_type: IntKind::Int,
    size_type: None,
};

/// Widest integer type a data model may declare, in bytes.
pub const MAX_INT_SIZE: u8 = 8;

const fn sizes_are_valid(m: &DataModel) -> bool {
    m.short_size >= 2
        && m.int_size >= 2
        && m.long_size >= 4
        && m.llong_size >= 8
        && m.short_size <= m.int_size
        && m.int_size <= m.long_size
        && m.long_size <= m.llong_size
        && m.llong_size <= MAX_INT_SIZE
}

const fn has_pointer_sized_unsigned(m: &DataModel) -> bool {
    IntKind::UInt.size(m) == m.ptr_size
        || IntKind::ULong.size(m) == m.ptr_size
        || IntKind::ULLong.size(m) == m.ptr_size
        || IntKind::UShort.size(m) == m.ptr_size
}

const_assert!(sizes_are_valid(&CCPU));
const_assert!(sizes_are_valid(&ILP32));
const_assert!(sizes_are_valid(&LP64));
const_assert!(sizes_are_valid(&LLP64));
const_assert!(sizes_are_valid(&X32));

const_assert!(has_pointer_sized_unsigned(&CCPU));
const_assert!(has_pointer_sized_unsigned(&ILP32));
const_assert!(has_pointer_sized_unsigned(&LP64));
const_assert!(has_pointer_sized_unsigned(&LLP64));
const_assert!(has_pointer_sized_unsigned(&X32));

const_assert!(CCPU.max_align.is_power_of_two());
const_assert!(ILP32.max_align.is_power_of_two());
const_assert!(LP64.max_align.is_power_of_two());
const_assert!(LLP64.max_align.is_power_of_two());
const_assert!(X32.max_align.is_power_of_two());

/// Preset names in the order they are listed to the user.
pub const PRESET_NAMES: [&str; 5] = ["ccpu", "i386", "x86_64", "win64", "x32"];

pub const DEFAULT_PRESET: &str = "x86_64";

lazy_static! {
    static ref PRESETS: HashMap<&'static str, DataModel> = {
        let mut m = HashMap::new();
        m.insert("ccpu", CCPU);
        m.insert("i386", ILP32);
        m.insert("x86_64", LP64);
        m.insert("win64", LLP64);
        m.insert("x32", X32);
        m
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    TooSmall(&'static str, u8),
    TooLarge(&'static str, u8),
    BadOrder(&'static str, &'static str),
    BadPointerSize(u8),
    BadRegisterSize(u8),
    BadBoolSize(u8),
    BadAlignment(u8),
    SizeTypeWidth(IntKind, u8),
    SizeTypeSigned(IntKind),
    NoPointerSizedInteger(u8),
    UnknownPreset(String),
    Io(String),
    Json(String),
    NotAnObject,
    MissingName,
    BadBase,
}

/**
 * A named, validated target.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    name: String,
    model: DataModel,
    primitives: PrimitiveTypes,
}

impl DataModel {
    /**
     * Check the model against the minimum requirements of C and of this toolchain.
     */
    pub fn validate(&self) -> Result<(), ConfigError> {
        let minimums = [
            ("short", self.short_size, 2),
            ("int", self.int_size, 2),
            ("long", self.long_size, 4),
            ("long long", self.llong_size, 8),
        ];
        for (name, size, min) in minimums {
            if size < min {
                return Err(ConfigError::TooSmall(name, size));
            }
            // integer limits are computed in i128
            if size > MAX_INT_SIZE {
                return Err(ConfigError::TooLarge(name, size));
            }
        }
        if self.short_size > self.int_size {
            return Err(ConfigError::BadOrder("short", "int"));
        }
        if self.int_size > self.long_size {
            return Err(ConfigError::BadOrder("int", "long"));
        }
        if self.long_size > self.llong_size {
            return Err(ConfigError::BadOrder("long", "long long"));
        }
        if !matches!(self.ptr_size, 2 | 4 | 8) {
            return Err(ConfigError::BadPointerSize(self.ptr_size));
        }
        if !utils::is_power_of_two(self.register_size) {
            return Err(ConfigError::BadRegisterSize(self.register_size));
        }
        if self.bool_size == 0 || self.bool_size > self.llong_size {
            return Err(ConfigError::BadBoolSize(self.bool_size));
        }
        if !utils::is_power_of_two(self.max_align) {
            return Err(ConfigError::BadAlignment(self.max_align));
        }
        PrimitiveTypes::resolve(self).map(|_| ())
    }
}

impl Machine {
    pub fn new(name: &str, model: DataModel) -> Result<Self, ConfigError> {
        model.validate()?;
        let primitives = PrimitiveTypes::resolve(&model)?;
        Ok(Self {
            name: name.to_string(),
            model,
            primitives,
        })
    }

    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match PRESETS.get(name) {
            Some(model) => Self::new(name, *model),
            None => Err(ConfigError::UnknownPreset(name.to_string())),
        }
    }

    /**
     * Load a target description from JSON.
     *
     * The object holds `DataModel` fields plus an optional `name`. If `base`
     * names a preset, the fields given override the preset's ones and the
     * name defaults to the preset name.
     */
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ConfigError::Json(e.to_string()))?;
        let mut fields = match value {
            serde_json::Value::Object(fields) => fields,
            _ => return Err(ConfigError::NotAnObject),
        };
        let name = match fields.remove("name") {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(_) => return Err(ConfigError::MissingName),
            None => None,
        };
        let (name, merged) = match fields.remove("base") {
            Some(serde_json::Value::String(base)) => {
                let preset = PRESETS
                    .get(base.as_str())
                    .ok_or_else(|| ConfigError::UnknownPreset(base.clone()))?;
                let mut merged = match serde_json::to_value(preset) {
                    Ok(serde_json::Value::Object(m)) => m,
                    Ok(_) => return Err(ConfigError::NotAnObject),
                    Err(e) => return Err(ConfigError::Json(e.to_string())),
                };
                for (k, v) in fields {
                    merged.insert(k, v);
                }
                (name.unwrap_or(base), merged)
            }
            Some(_) => return Err(ConfigError::BadBase),
            None => (name.ok_or(ConfigError::MissingName)?, fields),
        };
        let model: DataModel = serde_json::from_value(serde_json::Value::Object(merged))
            .map_err(|e| ConfigError::Json(e.to_string()))?;
        Self::new(&name, model)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn primitives(&self) -> &PrimitiveTypes {
        &self.primitives
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(&self.model).map_err(|e| ConfigError::Json(e.to_string()))
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            name: DEFAULT_PRESET.to_string(),
            model: LP64,
            primitives: PrimitiveTypes {
                size: IntKind::ULong,
                ptrdiff: IntKind::Long,
                wchar: IntKind::Int,
            },
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            ConfigError::TooSmall(t, size) => {
                write!(f, "`{}' cannot be {} bytes wide, it is too small", t, size)
            }
            ConfigError::TooLarge(t, size) => write!(
                f,
                "`{}' cannot be {} bytes wide, at most {} bytes are supported",
                t, size, MAX_INT_SIZE
            ),
            ConfigError::BadOrder(t1, t2) => write!(f, "`{}' is wider than `{}'", t1, t2),
            ConfigError::BadPointerSize(s) => {
                write!(f, "pointer size must be 2, 4 or 8 bytes, not {}", s)
            }
            ConfigError::BadRegisterSize(s) => {
                write!(f, "register size must be a power of two, not {}", s)
            }
            ConfigError::BadBoolSize(s) => write!(f, "bad _Bool size {}", s),
            ConfigError::BadAlignment(a) => {
                write!(f, "maximum alignment must be a power of two, not {}", a)
            }
            ConfigError::SizeTypeWidth(t, ptr) => write!(
                f,
                "size type `{}' does not match the pointer width of {} bytes",
                t, ptr
            ),
            ConfigError::SizeTypeSigned(t) => write!(f, "size type `{}' is signed", t),
            ConfigError::NoPointerSizedInteger(ptr) => write!(
                f,
                "no unsigned integer type is {} bytes wide to serve as size_t",
                ptr
            ),
            ConfigError::UnknownPreset(s) => write!(f, "unknown target `{}'", s),
            ConfigError::Io(s) => write!(f, "cannot read target description: {}", s),
            ConfigError::Json(s) => write!(f, "bad target description: {}", s),
            ConfigError::NotAnObject => f.write_str("target description must be a JSON object"),
            ConfigError::MissingName => {
                f.write_str("target description needs a string `name' or a `base'")
            }
            ConfigError::BadBase => f.write_str("`base' must be a preset name"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        for name in PRESET_NAMES {
            let m = Machine::preset(name).unwrap();
            assert_eq!(m.name(), name);
        }
        assert_eq!(Machine::preset("x86_64").unwrap(), Machine::default());
    }

    #[test]
    fn test_unknown_preset() {
        assert_eq!(
            Machine::preset("pdp11"),
            Err(ConfigError::UnknownPreset("pdp11".to_string()))
        );
    }

    #[test]
    fn test_validate() {
        let mut m = LP64;
        m.int_size = 1;
        assert_eq!(m.validate(), Err(ConfigError::TooSmall("int", 1)));
        let mut m = LP64;
        m.llong_size = 16;
        assert_eq!(m.validate(), Err(ConfigError::TooLarge("long long", 16)));
        let mut m = LP64;
        m.long_size = 16;
        m.llong_size = 16;
        assert_eq!(m.validate(), Err(ConfigError::TooLarge("long", 16)));
        let mut m = LP64;
        m.llong_size = MAX_INT_SIZE;
        assert_eq!(m.validate(), Ok(()));
        let mut m = LP64;
        m.short_size = 8;
        assert_eq!(m.validate(), Err(ConfigError::BadOrder("short", "int")));
        let mut m = LP64;
        m.ptr_size = 3;
        assert_eq!(m.validate(), Err(ConfigError::BadPointerSize(3)));
        let mut m = LP64;
        m.max_align = 12;
        assert_eq!(m.validate(), Err(ConfigError::BadAlignment(12)));
    }

    #[test]
    fn test_json_base() {
        let m = Machine::from_json(r#"{ "base": "x86_64", "wchar_type": "unsigned int" }"#)
            .unwrap();
        assert_eq!(m.name(), "x86_64");
        assert_eq!(m.model().wchar_type, IntKind::UInt);
        assert_eq!(m.model().ptr_size, 8);
    }

    #[test]
    fn test_json_full() {
        let text = r#"{
            "name": "m68k",
            "char_signed": true,
            "short_size": 2,
            "int_size": 4,
            "long_size": 4,
            "llong_size": 8,
            "ptr_size": 4,
            "register_size": 4,
            "max_align": 2,
            "big_endian": true
        }"#;
        let m = Machine::from_json(text).unwrap();
        assert_eq!(m.name(), "m68k");
        assert_eq!(m.model().bool_size, 1);
        assert_eq!(m.primitives().size, IntKind::UInt);
    }

    #[test]
    fn test_json_errors() {
        assert_eq!(Machine::from_json("[]"), Err(ConfigError::NotAnObject));
        assert_eq!(
            Machine::from_json(r#"{ "ptr_size": 8 }"#),
            Err(ConfigError::MissingName)
        );
        assert!(matches!(
            Machine::from_json(r#"{ "base": "x86_64", "pointer_size": 4 }"#),
            Err(ConfigError::Json(_))
        ));
        assert_eq!(
            Machine::from_json(r#"{ "base": "x86_64", "size_type": "unsigned int" }"#),
            Err(ConfigError::SizeTypeWidth(IntKind::UInt, 8))
        );
        assert_eq!(
            Machine::from_json(r#"{ "base": "x86_64", "name": "wide", "llong_size": 16 }"#),
            Err(ConfigError::TooLarge("long long", 16))
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let m = Machine::preset("win64").unwrap();
        let text = m.to_json().unwrap();
        let model: DataModel = serde_json::from_str(&text).unwrap();
        assert_eq!(&model, m.model());
    }
}
