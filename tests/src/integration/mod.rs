//! Cross-node scenarios. Each file holds its tests in a `tests` module.

mod failures;
mod mediation;
mod properties;
