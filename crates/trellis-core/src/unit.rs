//! The compiled-unit contract between the code generator and the runtime.
//!
//! A unit is a constant pool, a linear stack-machine instruction sequence and
//! an entry descriptor. Units are immutable: a newer compilation of the same
//! template produces a new unit that supersedes the old one.

use std::collections::BTreeSet;
use std::fmt;

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::signature::Signature;
use crate::types::{Primitive, TypeRef};

/// Literal or symbolic entry of the constant pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    Int(i32),
    Long(i64),
    /// IEEE-754 bits, so the pool stays `Eq` and hashes deterministically.
    Double(u64),
    Str(String),
    Type(TypeRef),
    Member(MemberRef),
    Method(MethodRef),
    Template(String),
}

impl Constant {
    pub fn double(value: f64) -> Self {
        Constant::Double(value.to_bits())
    }

    /// The zero value a short-circuited null-safe chain of primitive type
    /// yields.
    pub fn zero(primitive: Primitive) -> Option<Self> {
        Some(match primitive {
            Primitive::Boolean => Constant::Bool(false),
            Primitive::Int => Constant::Int(0),
            Primitive::Long => Constant::Long(0),
            Primitive::Double => Constant::double(0.0),
            Primitive::Void => return None,
        })
    }
}

/// Reference to a context member, resolved symbolically at invocation time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    /// Set for qualified calls (`contributor.member(...)`).
    pub contributor: Option<String>,
    pub signature: Signature,
}

/// Reference to a class method; `owner` is the declaring class that won
/// lookup (the most-derived declaration).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: String,
    pub signature: Signature,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conversion {
    Widen(Primitive, Primitive),
    Narrow(Primitive, Primitive),
    Box(Primitive),
    /// Fails on `null`.
    Unbox(Primitive),
}

/// One stack-machine instruction. Jump targets are absolute instruction
/// indexes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instr {
    Const(u32),
    Null,
    Load(u16),
    Store(u16),
    Pop,
    Dup,
    /// Pop and append to the output buffer.
    Emit,
    Jump(u32),
    /// Pop; jump when the value is falsy.
    JumpIfFalse(u32),
    /// Pop; jump when the value is truthy.
    JumpIfTrue(u32),
    /// Peek; jump when the value is null, leaving it on the stack.
    JumpIfNull(u32),
    /// Peek; jump when the value is not null, leaving it on the stack.
    JumpIfNotNull(u32),
    Convert(Conversion),
    Arith(ArithOp, Primitive),
    Negate(Primitive),
    Not,
    Concat,
    Compare(CompareOp),
    Compare3,
    NewList(u16),
    NewSet(u16),
    NewArray { elem: u32, len: u16 },
    Range,
    Index,
    ArrayLength,
    InstanceOf(u32),
    CheckCast(u32),
    InvokeContext { member: u32, argc: u16 },
    InvokeMethod { method: u32, argc: u16 },
    CallTemplate { template: u32, argc: u16 },
    /// Pop a collection and start iterating it in iterator slot `slot`.
    IterInit { slot: u16, reverse: bool },
    /// Pop `hi` then `lo` and iterate `lo..hi` in slot `slot` without
    /// materializing the list.
    IterRange { slot: u16, reverse: bool },
    /// Push the next element, or jump to `exit` when exhausted.
    IterNext { slot: u16, exit: u32 },
    Return,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryDescriptor {
    pub params: Vec<Param>,
    pub returns: TypeRef,
    pub entry: u32,
    pub locals: u16,
    pub iterators: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload {
    pub constants: Vec<Constant>,
    pub code: Vec<Instr>,
    pub entry: EntryDescriptor,
}

/// Something a unit statically calls.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dependency {
    Template(String),
    Member {
        contributor: Option<String>,
        name: String,
    },
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Template(name) => write!(f, "template:{name}"),
            Dependency::Member {
                contributor: Some(contributor),
                name,
            } => write!(f, "member:{contributor}.{name}"),
            Dependency::Member {
                contributor: None,
                name,
            } => write!(f, "member:{name}"),
        }
    }
}

/// Output of the code generator for one template, before the driver stamps
/// it with a namespace and fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompiledTemplate {
    pub name: String,
    pub payload: Payload,
    pub dependencies: BTreeSet<Dependency>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub namespace: String,
    pub name: String,
    pub payload: Payload,
    /// Hash of the source text alone.
    pub source_hash: Fingerprint,
    /// Hash of the source text plus every dependency's state at compile
    /// time; recompilation is skipped while this is unchanged.
    pub fingerprint: Fingerprint,
    pub dependencies: BTreeSet<Dependency>,
}

const MAGIC: &[u8; 4] = b"TRLU";
const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Display, Error)]
pub enum UnitCodecError {
    #[display("not a compiled unit (bad magic)")]
    BadMagic,
    #[display("unsupported unit format version {_0}")]
    UnsupportedVersion(#[error(not(source))] u8),
    #[display("malformed unit: {_0}")]
    Malformed(serde_json::Error),
}

impl From<serde_json::Error> for UnitCodecError {
    fn from(error: serde_json::Error) -> Self {
        UnitCodecError::Malformed(error)
    }
}

impl CompiledUnit {
    pub fn new(
        namespace: impl Into<String>,
        template: CompiledTemplate,
        source_hash: Fingerprint,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: template.name,
            payload: template.payload,
            source_hash,
            fingerprint,
            dependencies: template.dependencies,
        }
    }

    pub fn params(&self) -> impl Iterator<Item = &TypeRef> {
        self.payload.entry.params.iter().map(|param| &param.ty)
    }

    pub fn returns(&self) -> &TypeRef {
        &self.payload.entry.returns
    }

    /// Encoded payload alone; identical sources compile to identical bytes.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, UnitCodecError> {
        Ok(serde_json::to_vec(&self.payload)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, UnitCodecError> {
        let mut bytes = Vec::with_capacity(256);
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        serde_json::to_writer(&mut bytes, self)?;
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, UnitCodecError> {
        if bytes.len() < MAGIC.len() + 1 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(UnitCodecError::BadMagic);
        }
        let version = bytes[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(UnitCodecError::UnsupportedVersion(version));
        }
        Ok(serde_json::from_slice(&bytes[MAGIC.len() + 1..])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_unit() -> CompiledUnit {
        let payload = Payload {
            constants: vec![Constant::Str("hi".into()), Constant::double(1.5)],
            code: vec![Instr::Const(0), Instr::Emit, Instr::Null, Instr::Return],
            entry: EntryDescriptor {
                params: vec![Param {
                    name: "who".into(),
                    ty: TypeRef::string(),
                }],
                returns: TypeRef::void(),
                entry: 0,
                locals: 1,
                iterators: 0,
            },
        };
        let template = CompiledTemplate {
            name: "greet".into(),
            payload,
            dependencies: BTreeSet::from([Dependency::Template("footer".into())]),
        };
        CompiledUnit::new("site", template, Fingerprint::of("src"), Fingerprint::of("src+deps"))
    }

    #[test]
    fn test_encoding_round_trips() {
        let unit = sample_unit();
        let bytes = unit.encode().unwrap();
        assert_eq!(&bytes[..4], b"TRLU");
        let decoded = CompiledUnit::decode(&bytes).unwrap();
        assert_eq!(decoded, unit);
        assert_eq!(decoded.source_hash, Fingerprint::of("src"));
        assert_eq!(decoded.fingerprint, Fingerprint::of("src+deps"));
    }

    #[test]
    fn test_decode_rejects_foreign_bytes() {
        assert!(matches!(
            CompiledUnit::decode(b"nope"),
            Err(UnitCodecError::BadMagic)
        ));
        let mut bytes = sample_unit().encode().unwrap();
        bytes[4] = 9;
        assert!(matches!(
            CompiledUnit::decode(&bytes),
            Err(UnitCodecError::UnsupportedVersion(9))
        ));
    }
}
