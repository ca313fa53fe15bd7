//! Static assertion of a pipeline's value type.

use eventide_core::Eventual;

/// Asserts at compile time that `e` produces values of type `T`.
///
/// Purely a readability and refactoring aid: the assertion is the function
/// signature itself, and the composable passes through untouched.
pub fn type_check<T, In>(e: Eventual<In, T>) -> Eventual<In, T>
where
    T: Send + 'static,
    In: Send + 'static,
{
    e
}
