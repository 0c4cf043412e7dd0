use crate::ctype::IntKind;
use crate::machine::{ConfigError, DataModel};

/**
 * The integer types behind `size_t`, `ptrdiff_t` and `wchar_t` on a target.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveTypes {
    pub size: IntKind,
    pub ptrdiff: IntKind,
    pub wchar: IntKind,
}

/// Tried in this order, the first one as wide as a pointer becomes `size_t`.
const SIZE_TYPE_CANDIDATES: [IntKind; 4] = [
    IntKind::UInt,
    IntKind::ULong,
    IntKind::ULLong,
    IntKind::UShort,
];

pub const SIZE_T: &str = "size_t";
pub const PTRDIFF_T: &str = "ptrdiff_t";
pub const WCHAR_T: &str = "wchar_t";

impl PrimitiveTypes {
    /**
     * Pick the primitive types from the pointer width of the model.
     *
     * Register width plays no role: x32 has 8-byte registers and a 4-byte `size_t`.
     */
    pub fn resolve(model: &DataModel) -> Result<Self, ConfigError> {
        let size = match model.size_type {
            Some(kind) => {
                if kind.is_signed(model) {
                    return Err(ConfigError::SizeTypeSigned(kind));
                }
                if kind.size(model) != model.ptr_size {
                    return Err(ConfigError::SizeTypeWidth(kind, model.ptr_size));
                }
                kind
            }
            None => SIZE_TYPE_CANDIDATES
                .iter()
                .copied()
                .find(|kind| kind.size(model) == model.ptr_size)
                .ok_or(ConfigError::NoPointerSizedInteger(model.ptr_size))?,
        };
        Ok(Self {
            size,
            ptrdiff: size.to_signed(),
            wchar: model.wchar_type,
        })
    }

    /**
     * Typedef names and their types, in the order the header declares them.
     */
    pub fn typedefs(&self) -> [(&'static str, IntKind); 3] {
        [
            (PTRDIFF_T, self.ptrdiff),
            (SIZE_T, self.size),
            (WCHAR_T, self.wchar),
        ]
    }

    pub fn size_max(&self, model: &DataModel) -> i128 {
        self.size.max_value(model)
    }

    pub fn ptrdiff_min(&self, model: &DataModel) -> i128 {
        self.ptrdiff.min_value(model)
    }

    pub fn ptrdiff_max(&self, model: &DataModel) -> i128 {
        self.ptrdiff.max_value(model)
    }

    pub fn wchar_min(&self, model: &DataModel) -> i128 {
        self.wchar.min_value(model)
    }

    pub fn wchar_max(&self, model: &DataModel) -> i128 {
        self.wchar.max_value(model)
    }
}
