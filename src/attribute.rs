//! Typed attribute values shared by properties and components.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// Two integers.
pub type Int2 = [i32; 2];
/// Three integers.
pub type Int3 = [i32; 3];
/// Four integers.
pub type Int4 = [i32; 4];
/// Two floats.
pub type Float2 = [f32; 2];
/// Three floats.
pub type Float3 = [f32; 3];
/// Four floats.
pub type Float4 = [f32; 4];

/// The closed set of attribute kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// UTF-8 text.
    String,
    /// A 32-bit signed integer.
    Int,
    /// See [`Int2`].
    Int2,
    /// See [`Int3`].
    Int3,
    /// See [`Int4`].
    Int4,
    /// A 32-bit float.
    Float,
    /// See [`Float2`].
    Float2,
    /// See [`Float3`].
    Float3,
    /// See [`Float4`].
    Float4,
    /// A boolean.
    Bool,
    /// See [`Color`].
    Color,
    /// A file path.
    Path,
    /// See [`ObjectRef`].
    Object,
}

impl AttributeType {
    /// Every type, in declaration order.
    pub const ALL: [AttributeType; 13] = [
        AttributeType::String,
        AttributeType::Int,
        AttributeType::Int2,
        AttributeType::Int3,
        AttributeType::Int4,
        AttributeType::Float,
        AttributeType::Float2,
        AttributeType::Float3,
        AttributeType::Float4,
        AttributeType::Bool,
        AttributeType::Color,
        AttributeType::Path,
        AttributeType::Object,
    ];

    /// The lowercase name used in files.
    pub fn name(self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::Int2 => "int2",
            AttributeType::Int3 => "int3",
            AttributeType::Int4 => "int4",
            AttributeType::Float => "float",
            AttributeType::Float2 => "float2",
            AttributeType::Float3 => "float3",
            AttributeType::Float4 => "float4",
            AttributeType::Bool => "bool",
            AttributeType::Color => "color",
            AttributeType::Path => "path",
            AttributeType::Object => "object",
        }
    }

    /// Int and float tuples of two to four components.
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            AttributeType::Int2
                | AttributeType::Int3
                | AttributeType::Int4
                | AttributeType::Float2
                | AttributeType::Float3
                | AttributeType::Float4
        )
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttributeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttributeType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .or(match s {
                "file" => Some(AttributeType::Path),
                _ => None,
            })
            .ok_or_else(|| s.to_owned())
    }
}

/// An 8-bit RGBA color. The all-zero value (transparent black) is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Color {
    /// Color from its four channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }

    /// Opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 0xFF }
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_rgba_hex(s: &str) -> Option<Self> {
        let bytes = hex_bytes(s)?;
        match bytes.as_slice() {
            [r, g, b] => Some(Color::rgb(*r, *g, *b)),
            [r, g, b, a] => Some(Color::rgba(*r, *g, *b, *a)),
            _ => None,
        }
    }

    /// Parses `#RRGGBB` or `#AARRGGBB`, the layout Tiled uses.
    pub fn from_argb_hex(s: &str) -> Option<Self> {
        let bytes = hex_bytes(s)?;
        match bytes.as_slice() {
            [r, g, b] => Some(Color::rgb(*r, *g, *b)),
            [a, r, g, b] => Some(Color::rgba(*r, *g, *b, *a)),
            _ => None,
        }
    }

    /// `#RRGGBBAA`, upper case.
    pub fn to_rgba_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    /// `#AARRGGBB`, upper case.
    pub fn to_argb_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.a, self.r, self.g, self.b)
    }

    /// Channels scaled to `[0, 1]`.
    pub fn to_normalized(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a].map(|c| f32::from(c) / 255.0)
    }
}

fn hex_bytes(s: &str) -> Option<Vec<u8>> {
    let digits = s.strip_prefix('#')?;
    if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

/// Reference to an object by its persistent id, `0` meaning "no object".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub i32);

impl ObjectRef {
    /// No object.
    pub const NULL: ObjectRef = ObjectRef(0);

    /// Refers to no object.
    pub fn is_null(self) -> bool {
        self == ObjectRef::NULL
    }
}

/// A single typed value.
///
/// Equality compares the kind and the value, so `Int(0)` and `Float(0.0)` differ.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// Text.
    String(String),
    /// Integer.
    Int(i32),
    /// Integer pair.
    Int2(Int2),
    /// Integer triple.
    Int3(Int3),
    /// Integer quadruple.
    Int4(Int4),
    /// Float.
    Float(f32),
    /// Float pair.
    Float2(Float2),
    /// Float triple.
    Float3(Float3),
    /// Float quadruple.
    Float4(Float4),
    /// Boolean.
    Bool(bool),
    /// Color.
    Color(Color),
    /// File path.
    Path(PathBuf),
    /// Object reference.
    Object(ObjectRef),
}

impl Default for Attribute {
    fn default() -> Self {
        Attribute::String(String::new())
    }
}

macro_rules! typed_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("The value of an `", stringify!($variant), "` attribute.")]
        pub fn $name(&self) -> Result<$ty, MapError> {
            match self {
                Attribute::$variant(v) => Ok(*v),
                other => Err(MapError::TypeMismatch {
                    expected: AttributeType::$variant,
                    actual: other.attr_type(),
                }),
            }
        }
    };
}

impl Attribute {
    /// The zero value of `ty`.
    pub fn with_type(ty: AttributeType) -> Self {
        match ty {
            AttributeType::String => Attribute::String(String::new()),
            AttributeType::Int => Attribute::Int(0),
            AttributeType::Int2 => Attribute::Int2([0; 2]),
            AttributeType::Int3 => Attribute::Int3([0; 3]),
            AttributeType::Int4 => Attribute::Int4([0; 4]),
            AttributeType::Float => Attribute::Float(0.0),
            AttributeType::Float2 => Attribute::Float2([0.0; 2]),
            AttributeType::Float3 => Attribute::Float3([0.0; 3]),
            AttributeType::Float4 => Attribute::Float4([0.0; 4]),
            AttributeType::Bool => Attribute::Bool(false),
            AttributeType::Color => Attribute::Color(Color::default()),
            AttributeType::Path => Attribute::Path(PathBuf::new()),
            AttributeType::Object => Attribute::Object(ObjectRef::NULL),
        }
    }

    /// The kind of the stored value.
    pub fn attr_type(&self) -> AttributeType {
        match self {
            Attribute::String(_) => AttributeType::String,
            Attribute::Int(_) => AttributeType::Int,
            Attribute::Int2(_) => AttributeType::Int2,
            Attribute::Int3(_) => AttributeType::Int3,
            Attribute::Int4(_) => AttributeType::Int4,
            Attribute::Float(_) => AttributeType::Float,
            Attribute::Float2(_) => AttributeType::Float2,
            Attribute::Float3(_) => AttributeType::Float3,
            Attribute::Float4(_) => AttributeType::Float4,
            Attribute::Bool(_) => AttributeType::Bool,
            Attribute::Color(_) => AttributeType::Color,
            Attribute::Path(_) => AttributeType::Path,
            Attribute::Object(_) => AttributeType::Object,
        }
    }

    /// Replaces both the value and, implicitly, the kind.
    pub fn set(&mut self, value: impl Into<Attribute>) {
        *self = value.into();
    }

    /// Switches to `ty`, discarding the current value.
    pub fn reset(&mut self, ty: AttributeType) {
        *self = Attribute::with_type(ty);
    }

    /// Holds a tuple type.
    pub fn is_vector(&self) -> bool {
        self.attr_type().is_vector()
    }

    /// Equal to the zero value of its own type.
    pub fn has_default_value(&self) -> bool {
        *self == Attribute::with_type(self.attr_type())
    }

    /// The text of a `String` attribute.
    pub fn as_string(&self) -> Result<&str, MapError> {
        match self {
            Attribute::String(s) => Ok(s),
            other => Err(MapError::TypeMismatch {
                expected: AttributeType::String,
                actual: other.attr_type(),
            }),
        }
    }

    /// The path of a `Path` attribute.
    pub fn as_path(&self) -> Result<&Path, MapError> {
        match self {
            Attribute::Path(p) => Ok(p),
            other => Err(MapError::TypeMismatch {
                expected: AttributeType::Path,
                actual: other.attr_type(),
            }),
        }
    }

    typed_accessor!(as_int, Int, i32);
    typed_accessor!(as_int2, Int2, Int2);
    typed_accessor!(as_int3, Int3, Int3);
    typed_accessor!(as_int4, Int4, Int4);
    typed_accessor!(as_float, Float, f32);
    typed_accessor!(as_float2, Float2, Float2);
    typed_accessor!(as_float3, Float3, Float3);
    typed_accessor!(as_float4, Float4, Float4);
    typed_accessor!(as_bool, Bool, bool);
    typed_accessor!(as_color, Color, Color);
    typed_accessor!(as_object, Object, ObjectRef);
}

macro_rules! impl_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Attribute {
            fn from(value: $ty) -> Self {
                Attribute::$variant(value)
            }
        }
    };
}

impl_from!(String, String);
impl_from!(i32, Int);
impl_from!(Int2, Int2);
impl_from!(Int3, Int3);
impl_from!(Int4, Int4);
impl_from!(f32, Float);
impl_from!(Float2, Float2);
impl_from!(Float3, Float3);
impl_from!(Float4, Float4);
impl_from!(bool, Bool);
impl_from!(Color, Color);
impl_from!(PathBuf, Path);
impl_from!(ObjectRef, Object);

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::String(value.to_owned())
    }
}

impl From<&Path> for Attribute {
    fn from(value: &Path) -> Self {
        Attribute::Path(value.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty_string() {
        let a = Attribute::default();
        assert_eq!(a.attr_type(), AttributeType::String);
        assert!(a.has_default_value());
    }

    #[test]
    fn with_type_reports_that_type_and_default() {
        for ty in AttributeType::ALL {
            let a = Attribute::with_type(ty);
            assert_eq!(a.attr_type(), ty);
            assert!(a.has_default_value(), "{ty}");
        }
    }

    #[test]
    fn native_values_infer_their_type() {
        assert_eq!(Attribute::from(42).attr_type(), AttributeType::Int);
        assert_eq!(Attribute::from(1.5f32).attr_type(), AttributeType::Float);
        assert_eq!(Attribute::from([1.0f32, 2.0, 3.0]).attr_type(), AttributeType::Float3);
        assert_eq!(Attribute::from("hi").attr_type(), AttributeType::String);
        assert_eq!(Attribute::from(true).attr_type(), AttributeType::Bool);
        assert_eq!(Attribute::from(ObjectRef(3)).attr_type(), AttributeType::Object);
        assert_eq!(
            Attribute::from(PathBuf::from("a.png")).attr_type(),
            AttributeType::Path
        );
    }

    #[test]
    fn reset_discards_previous_value() {
        let mut a = Attribute::from(42);
        assert!(!a.has_default_value());
        a.reset(AttributeType::Float);
        assert_eq!(a, Attribute::Float(0.0));
        assert!(a.has_default_value());
    }

    #[test]
    fn set_changes_type() {
        let mut a = Attribute::from(1);
        a.set("text");
        assert_eq!(a.as_string(), Ok("text"));
        assert!(a.as_int().is_err());
    }

    #[test]
    fn accessors_report_type_mismatch() {
        let a = Attribute::from(true);
        assert_eq!(
            a.as_int(),
            Err(MapError::TypeMismatch {
                expected: AttributeType::Int,
                actual: AttributeType::Bool
            })
        );
        assert_eq!(a.as_bool(), Ok(true));
    }

    #[test]
    fn only_vector_tags_are_vectors() {
        let vectors: Vec<_> = AttributeType::ALL.into_iter().filter(|t| t.is_vector()).collect();
        assert_eq!(vectors.len(), 6);
        assert!(!Attribute::Int(1).is_vector());
        assert!(Attribute::Int4([1, 2, 3, 4]).is_vector());
    }

    #[test]
    fn opaque_black_is_not_default() {
        assert!(!Attribute::Color(Color::rgb(0, 0, 0)).has_default_value());
        assert!(Attribute::Color(Color::rgba(0, 0, 0, 0)).has_default_value());
    }

    #[test]
    fn equality_includes_type() {
        assert_ne!(Attribute::Int(0), Attribute::Float(0.0));
        assert_eq!(Attribute::Int(3), Attribute::from(3));
    }

    #[test]
    fn color_hex_layouts() {
        let c = Color::rgba(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.to_rgba_hex(), "#11223344");
        assert_eq!(c.to_argb_hex(), "#44112233");
        assert_eq!(Color::from_rgba_hex("#11223344"), Some(c));
        assert_eq!(Color::from_argb_hex("#44112233"), Some(c));
        assert_eq!(Color::from_rgba_hex("#112233"), Some(Color::rgb(0x11, 0x22, 0x33)));
        assert_eq!(Color::from_rgba_hex("112233"), None);
        assert_eq!(Color::from_rgba_hex("#12345"), None);
    }

    #[test]
    fn type_names_parse_back() {
        for ty in AttributeType::ALL {
            assert_eq!(ty.name().parse::<AttributeType>(), Ok(ty));
        }
        assert_eq!("file".parse::<AttributeType>(), Ok(AttributeType::Path));
        assert!("class".parse::<AttributeType>().is_err());
    }
}
