/// Implements the std::ops operator traits for single-field tuple newtypes by delegating to the
/// inner type.
///
/// Usage:
/// * `op!(binary Cents, Add, add)` — `Cents + Cents`
/// * `op!(inplace Cents, AddAssign, add_assign)` — `cents += other`
/// * `op!(unary Cents, Neg, neg)` — `-cents`
#[macro_export]
macro_rules! op {
    (binary $outer:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $outer {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $outer:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $outer {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0)
            }
        }
    };
    (unary $outer:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $outer {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0))
            }
        }
    };
}
