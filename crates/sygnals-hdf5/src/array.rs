//! In-memory arrays exchanged with the host.

use crate::error::{Error, Result};
use crate::types::HostElementType;

/// Typed element storage in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Text values stored in fields of `width` bytes.
    FixedText { width: usize, values: Vec<String> },
    Text(Vec<String>),
}

macro_rules! dispatch_len {
    ($data:expr, $($var:ident),*) => {
        match $data {
            $(ArrayData::$var(v) => v.len(),)*
            ArrayData::FixedText { values, .. } => values.len(),
            ArrayData::Text(v) => v.len(),
        }
    };
}

impl ArrayData {
    pub fn len(&self) -> usize {
        dispatch_len!(self, I8, I16, I32, I64, U8, U16, U32, U64, F32, F64)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> HostElementType {
        match self {
            ArrayData::I8(_) => HostElementType::I8,
            ArrayData::I16(_) => HostElementType::I16,
            ArrayData::I32(_) => HostElementType::I32,
            ArrayData::I64(_) => HostElementType::I64,
            ArrayData::U8(_) => HostElementType::U8,
            ArrayData::U16(_) => HostElementType::U16,
            ArrayData::U32(_) => HostElementType::U32,
            ArrayData::U64(_) => HostElementType::U64,
            ArrayData::F32(_) => HostElementType::F32,
            ArrayData::F64(_) => HostElementType::F64,
            ArrayData::FixedText { width, .. } => HostElementType::FixedText { width: *width },
            ArrayData::Text(_) => HostElementType::Text,
        }
    }
}

/// A shaped, typed array. A shape of `[]` is a scalar holding one element.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    shape: Vec<u64>,
    data: ArrayData,
}

impl HostArray {
    /// Fails with `InvalidInput` when the element count does not match `shape`.
    pub fn new(shape: Vec<u64>, data: ArrayData) -> Result<HostArray> {
        let expected = shape
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| Error::invalid(format!("shape {shape:?} overflows")))?;
        if expected != data.len() as u64 {
            return Err(Error::invalid(format!(
                "shape {shape:?} holds {expected} elements, data has {}",
                data.len()
            )));
        }
        if let ArrayData::FixedText { width: 0, .. } = data {
            return Err(Error::invalid("fixed text width must be at least 1"));
        }
        Ok(HostArray { shape, data })
    }

    /// A one-dimensional array over `data`. Checked like [`HostArray::new`].
    pub fn from_data(data: ArrayData) -> Result<HostArray> {
        HostArray::new(vec![data.len() as u64], data)
    }

    /// A rank-0 array. Fails unless `data` holds exactly one element.
    pub fn scalar(data: ArrayData) -> Result<HostArray> {
        HostArray::new(Vec::new(), data)
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn element_type(&self) -> HostElementType {
        self.data.element_type()
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            ArrayData::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match &self.data {
            ArrayData::Text(v) | ArrayData::FixedText { values: v, .. } => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_vec {
    ($($ty:ty => $var:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for HostArray {
                fn from(v: Vec<$ty>) -> Self {
                    HostArray {
                        shape: vec![v.len() as u64],
                        data: ArrayData::$var(v),
                    }
                }
            }
        )*
    };
}

impl_from_vec!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64, String => Text,
);

impl From<&str> for HostArray {
    fn from(s: &str) -> Self {
        HostArray {
            shape: Vec::new(),
            data: ArrayData::Text(vec![s.to_string()]),
        }
    }
}
