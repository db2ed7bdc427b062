//! End-to-end tests driving a full generation run from YAML fixtures.

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod generation;
