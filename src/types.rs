/// Scalar/vector element kind. Widening between kinds is never implicit;
/// every arithmetic node in `expr` requires its operands to already agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Int,
    UInt,
    Float,
}

/// A `Type` is a (kind, bit width, lane count) triple. `lanes == 1` means
/// scalar; anything greater describes a vector produced by `Ramp` or
/// `Broadcast`. Bit width is restricted to the widths the target back end
/// actually supports (1, 8, 16, 32, 64); `bits == 1` is only legal for
/// `UInt`, and is how boolean-valued expressions (comparisons, `And`/`Or`)
/// are represented.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    pub kind: TypeKind,
    pub bits: u8,
    pub lanes: u16,
}

impl Type {
    pub const fn new(kind: TypeKind, bits: u8, lanes: u16) -> Self {
        Type { kind, bits, lanes }
    }

    pub const fn int(bits: u8) -> Self {
        Type::new(TypeKind::Int, bits, 1)
    }

    pub const fn uint(bits: u8) -> Self {
        Type::new(TypeKind::UInt, bits, 1)
    }

    pub const fn float(bits: u8) -> Self {
        Type::new(TypeKind::Float, bits, 1)
    }

    pub const fn bool_() -> Self {
        Type::new(TypeKind::UInt, 1, 1)
    }

    pub fn is_scalar(&self) -> bool {
        self.lanes == 1
    }

    pub fn is_vector(&self) -> bool {
        self.lanes > 1
    }

    pub fn is_bool(&self) -> bool {
        self.kind == TypeKind::UInt && self.bits == 1
    }

    pub fn is_int(&self) -> bool {
        self.kind == TypeKind::Int
    }

    pub fn is_uint(&self) -> bool {
        self.kind == TypeKind::UInt
    }

    pub fn is_float(&self) -> bool {
        self.kind == TypeKind::Float
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.kind, TypeKind::Int | TypeKind::Float)
    }

    /// Returns the scalar flavor of this type, ignoring lanes.
    pub fn element_of(&self) -> Type {
        Type::new(self.kind, self.bits, 1)
    }

    pub fn with_lanes(&self, lanes: u16) -> Type {
        Type::new(self.kind, self.bits, lanes)
    }

    /// Two types are "equivalent enough" for elementwise arithmetic if kind
    /// and bits match; lanes are reconciled separately by broadcasting
    /// scalars up to the widest vector, per invariant 2 in the spec.
    pub fn matches_scalar(&self, other: &Type) -> bool {
        self.kind == other.kind && self.bits == other.bits
    }

    /// Minimum representable value, for types with a finite range. `None`
    /// for `Float`, whose range the bounds lattice instead represents with
    /// symbolic infinities.
    pub fn min_value(&self) -> Option<i128> {
        match self.kind {
            TypeKind::Int => Some(-(1i128 << (self.bits as u32 - 1))),
            TypeKind::UInt => Some(0),
            TypeKind::Float => None,
        }
    }

    pub fn max_value(&self) -> Option<i128> {
        match self.kind {
            TypeKind::Int => Some((1i128 << (self.bits as u32 - 1)) - 1),
            TypeKind::UInt => Some((1i128 << self.bits as u32) - 1),
            TypeKind::Float => None,
        }
    }
}

impl std::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let prefix = match self.kind {
            TypeKind::Int => "int",
            TypeKind::UInt => "uint",
            TypeKind::Float => "float",
        };
        if self.lanes == 1 {
            write!(f, "{}{}", prefix, self.bits)
        } else {
            write!(f, "{}{}x{}", prefix, self.bits, self.lanes)
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_bounds() {
        let t = Type::int(8);
        assert_eq!(t.min_value(), Some(-128));
        assert_eq!(t.max_value(), Some(127));
    }

    #[test]
    fn uint_bounds() {
        let t = Type::uint(8);
        assert_eq!(t.min_value(), Some(0));
        assert_eq!(t.max_value(), Some(255));
    }

    #[test]
    fn float_has_no_finite_bounds() {
        let t = Type::float(32);
        assert_eq!(t.min_value(), None);
        assert_eq!(t.max_value(), None);
    }

    #[test]
    fn vector_widening() {
        let t = Type::int(32).with_lanes(4);
        assert!(t.is_vector());
        assert_eq!(t.element_of(), Type::int(32));
    }
}
