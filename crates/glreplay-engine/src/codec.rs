//! Typed views over untyped payload bytes.
//!
//! Payloads arrive as raw bytes in the host's native byte order together with
//! an element-type tag. Decoding borrows the bytes when they are aligned for
//! the element type and copies them otherwise.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytemuck::Pod;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown element type '{0}'")]
    UnknownElementType(String),

    #[error("payload of {len} bytes is not a multiple of the {element_size}-byte element")]
    PayloadLength { len: usize, element_size: usize },

    #[error("element range {offset}..{end} outside a payload of {len} elements")]
    OutOfRange { offset: usize, end: usize, len: usize },
}

/// Element type of a payload, named as the host names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl ElementType {
    pub const ALL: [ElementType; 8] = [
        ElementType::Int8,
        ElementType::Uint8,
        ElementType::Int16,
        ElementType::Uint16,
        ElementType::Int32,
        ElementType::Uint32,
        ElementType::Float32,
        ElementType::Float64,
    ];

    pub fn parse(tag: &str) -> Result<Self, CodecError> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == tag)
            .ok_or_else(|| CodecError::UnknownElementType(tag.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Int8 => "int8",
            ElementType::Uint8 => "uint8",
            ElementType::Int16 => "int16",
            ElementType::Uint16 => "uint16",
            ElementType::Int32 => "int32",
            ElementType::Uint32 => "uint32",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
        }
    }

    /// Width of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }
}

impl FromStr for ElementType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A payload reinterpreted as a slice of its element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedView<'a> {
    Int8(Cow<'a, [i8]>),
    Uint8(Cow<'a, [u8]>),
    Int16(Cow<'a, [i16]>),
    Uint16(Cow<'a, [u16]>),
    Int32(Cow<'a, [i32]>),
    Uint32(Cow<'a, [u32]>),
    Float32(Cow<'a, [f32]>),
    Float64(Cow<'a, [f64]>),
}

fn view<T: Pod>(bytes: &[u8]) -> Cow<'_, [T]> {
    match bytemuck::try_cast_slice(bytes) {
        Ok(slice) => Cow::Borrowed(slice),
        Err(_) => Cow::Owned(
            bytes
                .chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        ),
    }
}

/// Reinterpret `bytes` as elements of `element_type`.
pub fn decode(element_type: ElementType, bytes: &[u8]) -> Result<TypedView<'_>, CodecError> {
    let element_size = element_type.size();
    if bytes.len() % element_size != 0 {
        return Err(CodecError::PayloadLength {
            len: bytes.len(),
            element_size,
        });
    }

    Ok(match element_type {
        ElementType::Int8 => TypedView::Int8(view(bytes)),
        ElementType::Uint8 => TypedView::Uint8(Cow::Borrowed(bytes)),
        ElementType::Int16 => TypedView::Int16(view(bytes)),
        ElementType::Uint16 => TypedView::Uint16(view(bytes)),
        ElementType::Int32 => TypedView::Int32(view(bytes)),
        ElementType::Uint32 => TypedView::Uint32(view(bytes)),
        ElementType::Float32 => TypedView::Float32(view(bytes)),
        ElementType::Float64 => TypedView::Float64(view(bytes)),
    })
}

macro_rules! each_view {
    ($view:expr, $slice:ident => $body:expr) => {
        match $view {
            TypedView::Int8($slice) => $body,
            TypedView::Uint8($slice) => $body,
            TypedView::Int16($slice) => $body,
            TypedView::Uint16($slice) => $body,
            TypedView::Int32($slice) => $body,
            TypedView::Uint32($slice) => $body,
            TypedView::Float32($slice) => $body,
            TypedView::Float64($slice) => $body,
        }
    };
}

impl TypedView<'_> {
    pub fn element_type(&self) -> ElementType {
        match self {
            TypedView::Int8(_) => ElementType::Int8,
            TypedView::Uint8(_) => ElementType::Uint8,
            TypedView::Int16(_) => ElementType::Int16,
            TypedView::Uint16(_) => ElementType::Uint16,
            TypedView::Int32(_) => ElementType::Int32,
            TypedView::Uint32(_) => ElementType::Uint32,
            TypedView::Float32(_) => ElementType::Float32,
            TypedView::Float64(_) => ElementType::Float64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        each_view!(self, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The elements as native-order bytes.
    pub fn as_bytes(&self) -> &[u8] {
        each_view!(self, s => bytemuck::cast_slice::<_, u8>(&**s))
    }

    /// Bytes of the elements from `offset` on, limited to `count` elements.
    pub fn element_bytes(&self, offset: usize, count: Option<usize>) -> Result<&[u8], CodecError> {
        let len = self.len();
        let end = count.map_or(len, |c| offset.saturating_add(c));
        if offset > len || end > len {
            return Err(CodecError::OutOfRange { offset, end, len });
        }
        let size = self.element_type().size();
        Ok(&self.as_bytes()[offset * size..end * size])
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            TypedView::Float32(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            TypedView::Int32(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<&[u32]> {
        match self {
            TypedView::Uint32(s) => Some(&**s),
            _ => None,
        }
    }
}
