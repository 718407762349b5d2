//! Serde helpers shared by the model types.

use serde::{Deserialize, Deserializer};

/// Deserialize an explicit `null` as the type's default (an empty collection).
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
