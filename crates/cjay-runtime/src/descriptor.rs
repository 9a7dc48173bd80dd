//! Method descriptor parsing
//!
//! A descriptor spells a method's parameter and return types with the
//! runtime's single-character type codes:
//!
//! - `Z` boolean, `B` byte, `C` char, `S` short, `I` int, `J` long,
//!   `F` float, `D` double
//! - `L<internal/name>;` object, `[<type>` array
//! - `V` void (return position only)
//!
//! Only the return code is interpreted by the dispatch path. Parameter
//! types are parsed so argument lists can be checked before a call.

use crate::error::{BridgeError, BridgeResult};
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

/// Return kind of a method, selected by the code after `)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object,
    Void,
}

impl ReturnKind {
    /// All ten return kinds, in type-code order
    pub const ALL: [ReturnKind; 10] = [
        ReturnKind::Boolean,
        ReturnKind::Byte,
        ReturnKind::Char,
        ReturnKind::Short,
        ReturnKind::Int,
        ReturnKind::Long,
        ReturnKind::Float,
        ReturnKind::Double,
        ReturnKind::Object,
        ReturnKind::Void,
    ];

    /// Classify a return type code
    ///
    /// # Examples
    ///
    /// ```
    /// # use cjay_runtime::ReturnKind;
    /// assert_eq!(ReturnKind::from_code('J'), Some(ReturnKind::Long));
    /// assert_eq!(ReturnKind::from_code('['), None);
    /// ```
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'Z' => Some(ReturnKind::Boolean),
            'B' => Some(ReturnKind::Byte),
            'C' => Some(ReturnKind::Char),
            'S' => Some(ReturnKind::Short),
            'I' => Some(ReturnKind::Int),
            'J' => Some(ReturnKind::Long),
            'F' => Some(ReturnKind::Float),
            'D' => Some(ReturnKind::Double),
            'L' => Some(ReturnKind::Object),
            'V' => Some(ReturnKind::Void),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            ReturnKind::Boolean => 'Z',
            ReturnKind::Byte => 'B',
            ReturnKind::Char => 'C',
            ReturnKind::Short => 'S',
            ReturnKind::Int => 'I',
            ReturnKind::Long => 'J',
            ReturnKind::Float => 'F',
            ReturnKind::Double => 'D',
            ReturnKind::Object => 'L',
            ReturnKind::Void => 'V',
        }
    }

    /// Get a display name for this kind
    pub fn display_name(self) -> &'static str {
        match self {
            ReturnKind::Boolean => "boolean",
            ReturnKind::Byte => "byte",
            ReturnKind::Char => "char",
            ReturnKind::Short => "short",
            ReturnKind::Int => "int",
            ReturnKind::Long => "long",
            ReturnKind::Float => "float",
            ReturnKind::Double => "double",
            ReturnKind::Object => "object",
            ReturnKind::Void => "void",
        }
    }
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Parameter type from a descriptor's parameter list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Class in internal-name form, e.g. `java/lang/String`
    Object(String),
    Array(Box<ParamType>),
}

impl ParamType {
    /// Kind of value a caller must pass for this parameter
    pub fn kind(&self) -> ReturnKind {
        match self {
            ParamType::Boolean => ReturnKind::Boolean,
            ParamType::Byte => ReturnKind::Byte,
            ParamType::Char => ReturnKind::Char,
            ParamType::Short => ReturnKind::Short,
            ParamType::Int => ReturnKind::Int,
            ParamType::Long => ReturnKind::Long,
            ParamType::Float => ReturnKind::Float,
            ParamType::Double => ReturnKind::Double,
            ParamType::Object(_) | ParamType::Array(_) => ReturnKind::Object,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Object(name) => write!(f, "L{};", name),
            ParamType::Array(inner) => write!(f, "[{}", inner),
            other => write!(f, "{}", other.kind().code()),
        }
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    text: String,
    params: Vec<ParamType>,
    return_kind: ReturnKind,
}

impl MethodDescriptor {
    /// Parse and validate a full descriptor
    ///
    /// # Examples
    ///
    /// ```
    /// # use cjay_runtime::{MethodDescriptor, ParamType, ReturnKind};
    /// let desc = MethodDescriptor::parse("(ILjava/lang/String;)Z").unwrap();
    /// assert_eq!(desc.return_kind(), ReturnKind::Boolean);
    /// assert_eq!(desc.params()[0], ParamType::Int);
    /// ```
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let malformed = |reason: String| BridgeError::MalformedDescriptor {
            descriptor: text.to_string(),
            reason,
        };

        let mut chars = text.chars().peekable();
        if chars.next() != Some('(') {
            return Err(malformed("must start with '('".to_string()));
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(parse_field(&mut chars).map_err(malformed)?),
                None => {
                    return Err(malformed(
                        "missing ')' terminating the parameter list".to_string(),
                    ))
                }
            }
        }

        let code = chars
            .next()
            .ok_or_else(|| malformed("missing return type".to_string()))?;
        let return_kind = ReturnKind::from_code(code)
            .ok_or_else(|| malformed(format!("unknown return type code '{}'", code)))?;

        if return_kind == ReturnKind::Object {
            read_class_name(&mut chars).map_err(malformed)?;
        }

        if chars.next().is_some() {
            return Err(malformed("trailing characters after return type".to_string()));
        }

        Ok(Self {
            text: text.to_string(),
            params,
            return_kind,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn return_kind(&self) -> ReturnKind {
        self.return_kind
    }
}

impl FromStr for MethodDescriptor {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Classify a descriptor's return kind
///
/// Locates the parameter-list terminator and classifies the character that
/// follows it. Parameter types are not inspected.
pub fn parse_descriptor(descriptor: &str) -> BridgeResult<ReturnKind> {
    let malformed = |reason: &str| BridgeError::MalformedDescriptor {
        descriptor: descriptor.to_string(),
        reason: reason.to_string(),
    };

    let pos = descriptor
        .find(')')
        .ok_or_else(|| malformed("missing ')' terminating the parameter list"))?;

    let code = descriptor[pos + 1..]
        .chars()
        .next()
        .ok_or_else(|| malformed("missing return type"))?;

    ReturnKind::from_code(code)
        .ok_or_else(|| malformed(&format!("unknown return type code '{}'", code)))
}

fn parse_field(chars: &mut Peekable<Chars<'_>>) -> Result<ParamType, String> {
    match chars.next() {
        Some('Z') => Ok(ParamType::Boolean),
        Some('B') => Ok(ParamType::Byte),
        Some('C') => Ok(ParamType::Char),
        Some('S') => Ok(ParamType::Short),
        Some('I') => Ok(ParamType::Int),
        Some('J') => Ok(ParamType::Long),
        Some('F') => Ok(ParamType::Float),
        Some('D') => Ok(ParamType::Double),
        Some('L') => Ok(ParamType::Object(read_class_name(chars)?)),
        Some('[') => Ok(ParamType::Array(Box::new(parse_field(chars)?))),
        Some('V') => Err("'V' is only valid as a return type".to_string()),
        Some(c) => Err(format!("unknown type code '{}'", c)),
        None => Err("unexpected end of descriptor".to_string()),
    }
}

fn read_class_name(chars: &mut Peekable<Chars<'_>>) -> Result<String, String> {
    let mut name = String::new();
    loop {
        match chars.next() {
            Some(';') => break,
            Some(c) => name.push(c),
            None => return Err("unterminated class name".to_string()),
        }
    }
    if name.is_empty() {
        return Err("empty class name".to_string());
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for kind in ReturnKind::ALL {
            assert_eq!(ReturnKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn test_parse_descriptor_ignores_params() {
        // parameter list is passed through untouched
        assert_eq!(parse_descriptor("(Q)I"), Ok(ReturnKind::Int));
    }

    #[test]
    fn test_parse_descriptor_missing_terminator() {
        assert!(matches!(
            parse_descriptor("(I"),
            Err(BridgeError::MalformedDescriptor { .. })
        ));
        assert!(matches!(
            parse_descriptor("()"),
            Err(BridgeError::MalformedDescriptor { .. })
        ));
    }

    #[test]
    fn test_parse_nested_array_param() {
        let desc = MethodDescriptor::parse("([[ILjava/util/List;)V").unwrap();
        assert_eq!(
            desc.params(),
            &[
                ParamType::Array(Box::new(ParamType::Array(Box::new(ParamType::Int)))),
                ParamType::Object("java/util/List".to_string()),
            ]
        );
        assert_eq!(desc.params()[0].to_string(), "[[I");
        assert_eq!(desc.params()[1].kind(), ReturnKind::Object);
    }

    #[test]
    fn test_parse_rejects_void_param() {
        assert!(MethodDescriptor::parse("(V)V").is_err());
    }

    #[test]
    fn test_parse_rejects_trailing_text() {
        assert!(MethodDescriptor::parse("()IZ").is_err());
        assert!(MethodDescriptor::parse("()Ljava/lang/String;X").is_err());
    }

    #[test]
    fn test_parse_rejects_unterminated_object() {
        assert!(MethodDescriptor::parse("(Ljava/lang/String)V").is_err());
        assert!(MethodDescriptor::parse("()Ljava/lang/String").is_err());
        assert!(MethodDescriptor::parse("(L;)V").is_err());
    }
}
