pub mod config;
pub mod constants;
pub mod error;

/// Returns true when the value equals its type's default. Used by serde to
/// skip serializing default fields.
pub(crate) fn is_default<T: Default + PartialEq>(t: &T) -> bool {
    t == &T::default()
}
