//! Format Rules Module
//!
//! Everything about the format rule itself, independent of replication: the
//! template engine that renders a value through a rule, the recommender that
//! suggests a template from sample data, and the dialect converter that
//! rewrites templates between placeholder conventions.
//!
//! ## Submodules
//! - **`template`**: Placeholder template rendering (`apply_template`).
//! - **`recommend`**: Sample profiling and the recommendation decision table.
//! - **`convert`**: Braced / indexed / printf dialect conversion.

pub mod convert;
pub mod recommend;
pub mod template;
