//! Engine modules - the "brain" that turns a desired selection into work.
//!
//! The engine layer sits between selection (what the user wants) and the
//! orchestrators (which move bytes). It generates ordered, pure work plans.

pub mod plan;
