use std::fmt;

use super::Lattice;

/// Value type, ordered `Bottom < {Int, Double} < Any`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Type {
    Bottom,
    Int,
    Double,
    Any,
}

impl Type {
    fn le(self, other: Type) -> bool {
        self == other || self == Type::Bottom || other == Type::Any
    }

    fn join(self, other: Type) -> Type {
        match (self, other) {
            (a, b) if a == b => a,
            (Type::Bottom, b) => b,
            (a, Type::Bottom) => a,
            _ => Type::Any,
        }
    }
}

/// Value representation, ordered `Naked < Any`.
///
/// A naked value is stored unboxed, without a header or attributes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Shape {
    Naked,
    Any,
}

impl Shape {
    fn le(self, other: Shape) -> bool {
        self == other || other == Shape::Any
    }

    fn join(self, other: Shape) -> Shape {
        if self == other {
            self
        } else {
            Shape::Any
        }
    }
}

/// Type crossed with shape.
///
/// The order is componentwise, except that every value of type
/// [`Type::Bottom`] is the single bottom element (stored with shape `Any`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TypeShapeValue {
    ty: Type,
    shape: Shape,
}

impl TypeShapeValue {
    pub fn new(ty: Type, shape: Shape) -> Self {
        match ty {
            Type::Bottom => Self::bottom(),
            _ => Self { ty, shape },
        }
    }

    /// Any shape of the given type.
    pub fn of(ty: Type) -> Self {
        Self::new(ty, Shape::Any)
    }

    pub fn naked(ty: Type) -> Self {
        Self::new(ty, Shape::Naked)
    }

    pub fn naked_int() -> Self {
        Self::naked(Type::Int)
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }
}

impl Lattice for TypeShapeValue {
    const NAME: &'static str = "type-shape";

    fn top() -> Self {
        Self {
            ty: Type::Any,
            shape: Shape::Any,
        }
    }

    fn bottom() -> Self {
        Self {
            ty: Type::Bottom,
            shape: Shape::Any,
        }
    }

    fn is_top(&self) -> bool {
        self.ty == Type::Any && self.shape == Shape::Any
    }

    fn is_bottom(&self) -> bool {
        self.ty == Type::Bottom
    }

    fn le(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.ty.le(other.ty) && self.shape.le(other.shape)
    }

    fn merge_with(&mut self, other: &Self) -> bool {
        if other.is_bottom() {
            return false;
        }
        let joined = if self.is_bottom() {
            *other
        } else {
            Self {
                ty: self.ty.join(other.ty),
                shape: self.shape.join(other.shape),
            }
        };
        let changed = joined != *self;
        *self = joined;
        changed
    }

    fn specificity(&self) -> u64 {
        if self.is_bottom() {
            return 3;
        }
        let ty = match self.ty {
            Type::Any => 0,
            _ => 1,
        };
        let shape = match self.shape {
            Shape::Any => 0,
            Shape::Naked => 1,
        };
        ty + shape
    }
}

impl fmt::Display for TypeShapeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape == Shape::Naked {
            write!(f, "naked ")?;
        }
        match self.ty {
            Type::Bottom => write!(f, "⊥"),
            Type::Int => write!(f, "Int"),
            Type::Double => write!(f, "Double"),
            Type::Any => write!(f, "any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::lattice::tests::check_lattice_laws;

    fn samples() -> Vec<TypeShapeValue> {
        let mut samples = Vec::new();
        for ty in [Type::Bottom, Type::Int, Type::Double, Type::Any] {
            for shape in [Shape::Naked, Shape::Any] {
                samples.push(TypeShapeValue::new(ty, shape));
            }
        }
        samples
    }

    #[test]
    fn test_laws() {
        check_lattice_laws(&samples());
    }

    #[test]
    fn test_bottom_ignores_shape() {
        assert_eq!(
            TypeShapeValue::new(Type::Bottom, Shape::Naked),
            TypeShapeValue::bottom()
        );
        assert!(TypeShapeValue::naked(Type::Bottom).is_bottom());
    }

    #[test]
    fn test_order() {
        let naked_int = TypeShapeValue::naked_int();
        assert!(naked_int.le(&TypeShapeValue::of(Type::Int)));
        assert!(naked_int.le(&TypeShapeValue::naked(Type::Any)));
        assert!(!naked_int.le(&TypeShapeValue::naked(Type::Double)));
        assert!(!TypeShapeValue::of(Type::Int).le(&naked_int));
    }

    #[test]
    fn test_merge() {
        let mut v = TypeShapeValue::naked_int();
        assert!(v.merge_with(&TypeShapeValue::naked(Type::Double)));
        assert_eq!(v, TypeShapeValue::naked(Type::Any));
        assert!(v.merge_with(&TypeShapeValue::of(Type::Int)));
        assert!(v.is_top());
        assert!(!v.merge_with(&TypeShapeValue::naked_int()));
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeShapeValue::naked_int().to_string(), "naked Int");
        assert_eq!(TypeShapeValue::top().to_string(), "any");
    }
}
