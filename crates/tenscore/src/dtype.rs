//! Element data types.

use bytemuck::Pod;
use std::fmt;
use tenscore_sys as sys;

/// Scalar element kinds known to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum DType {
    #[default]
    Invalid = sys::TC_DATA_INVALID,
    Boolean = sys::TC_DATA_BOOLEAN,
    Int8 = sys::TC_DATA_INT8,
    UInt8 = sys::TC_DATA_UINT8,
    Int16 = sys::TC_DATA_INT16,
    UInt16 = sys::TC_DATA_UINT16,
    Int32 = sys::TC_DATA_INT32,
    UInt32 = sys::TC_DATA_UINT32,
    Int64 = sys::TC_DATA_INT64,
    UInt64 = sys::TC_DATA_UINT64,
    BFloat16 = sys::TC_DATA_BFLOAT16,
    Float16 = sys::TC_DATA_FLOAT16,
    Float32 = sys::TC_DATA_FLOAT32,
    Float64 = sys::TC_DATA_FLOAT64,
}

impl DType {
    /// All valid data types, in code order.
    pub const ALL: [DType; 13] = [
        DType::Boolean,
        DType::Int8,
        DType::UInt8,
        DType::Int16,
        DType::UInt16,
        DType::Int32,
        DType::UInt32,
        DType::Int64,
        DType::UInt64,
        DType::BFloat16,
        DType::Float16,
        DType::Float32,
        DType::Float64,
    ];

    /// Convert a runtime data type code.
    pub fn from_code(code: sys::tc_datatype) -> Option<Self> {
        if code == sys::TC_DATA_INVALID {
            return Some(DType::Invalid);
        }
        Self::ALL.into_iter().find(|dtype| dtype.code() == code)
    }

    /// The runtime data type code.
    #[inline]
    pub fn code(self) -> sys::tc_datatype {
        self as sys::tc_datatype
    }

    /// Width of one element in bytes. Zero for `Invalid`.
    pub fn byte_size(self) -> u64 {
        match self {
            DType::Invalid => 0,
            DType::Boolean | DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 | DType::BFloat16 | DType::Float16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 => 8,
        }
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            DType::Invalid => "<invalid>",
            DType::Boolean => "bool",
            DType::Int8 => "int8",
            DType::UInt8 => "uint8",
            DType::Int16 => "int16",
            DType::UInt16 => "uint16",
            DType::Int32 => "int32",
            DType::UInt32 => "uint32",
            DType::Int64 => "int64",
            DType::UInt64 => "uint64",
            DType::BFloat16 => "bfloat16",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust element types with a matching [`DType`].
///
/// Used by the typed buffer accessors to check that a host slice agrees with
/// the element type of the buffer's shape.
pub trait Element: Pod {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: DType = DType::$dtype;
        })*
    };
}

impl_element!(
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for dtype in DType::ALL {
            assert_eq!(DType::from_code(dtype.code()), Some(dtype));
        }
        assert_eq!(DType::from_code(0), Some(DType::Invalid));
        assert_eq!(DType::from_code(1000), None);
    }

    #[test]
    fn test_byte_sizes() {
        assert_eq!(DType::Invalid.byte_size(), 0);
        assert_eq!(DType::Boolean.byte_size(), 1);
        assert_eq!(DType::BFloat16.byte_size(), 2);
        assert_eq!(DType::Float32.byte_size(), 4);
        assert_eq!(DType::Int64.byte_size(), 8);
    }

    #[test]
    fn test_element_widths_match() {
        fn width<T: Element>() -> u64 {
            std::mem::size_of::<T>() as u64
        }
        assert_eq!(width::<i8>(), i8::DTYPE.byte_size());
        assert_eq!(width::<u16>(), u16::DTYPE.byte_size());
        assert_eq!(width::<f32>(), f32::DTYPE.byte_size());
        assert_eq!(width::<i64>(), i64::DTYPE.byte_size());
        assert_eq!(width::<f64>(), f64::DTYPE.byte_size());
    }

    #[test]
    fn test_display() {
        assert_eq!(DType::Int64.to_string(), "int64");
        assert_eq!(DType::Float32.to_string(), "float32");
        assert_eq!(DType::Invalid.to_string(), "<invalid>");
    }
}
