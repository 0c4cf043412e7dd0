use num_traits::int::PrimInt;

pub fn align<T: PrimInt>(addr: T, alignment: T) -> T {
    let rem = addr % alignment;
    if !rem.is_zero() {
        addr + alignment - rem
    } else {
        addr
    }
}

pub fn is_power_of_two<T: PrimInt>(x: T) -> bool {
    !x.is_zero() && x.count_ones() == 1
}

/**
 * Reduce a value modulo 2^(8 * size) and reinterpret it as signed or unsigned.
 */
pub fn wrap_to_width(value: i128, size: u8, signed: bool) -> i128 {
    let bits = size as u32 * 8;
    if bits >= 128 {
        return value;
    }
    let mask = (1i128 << bits) - 1;
    let v = value & mask;
    if signed && (v >> (bits - 1)) & 1 == 1 {
        v - (1i128 << bits)
    } else {
        v
    }
}

/**
 * Turn an arbitrary string into a preprocessor identifier fragment.
 */
pub fn to_identifier(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        assert_eq!(align(4, 4), 4);
        assert_eq!(align(5, 4), 8);
        assert_eq!(align(0u32, 8), 0);
    }

    #[test]
    fn test_power_of_two() {
        assert!(is_power_of_two(1u8));
        assert!(is_power_of_two(16u8));
        assert!(!is_power_of_two(0u8));
        assert!(!is_power_of_two(12u8));
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap_to_width(0x1ff, 1, false), 0xff);
        assert_eq!(wrap_to_width(0xff, 1, true), -1);
        assert_eq!(wrap_to_width(-1, 2, false), 0xffff);
        assert_eq!(wrap_to_width(-1, 8, false), u64::MAX as i128);
        assert_eq!(wrap_to_width(1 << 63, 8, true), i64::MIN as i128);
    }

    #[test]
    fn test_identifier() {
        assert_eq!(to_identifier("stddef.h"), "STDDEF_H");
        assert_eq!(to_identifier("stddef-cc"), "STDDEF_CC");
    }
}
