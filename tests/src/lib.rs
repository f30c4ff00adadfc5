//! End-to-end sweeps against stub probers and on-disk state.

#[cfg(test)]
mod macros;
#[cfg(test)]
mod resume;
