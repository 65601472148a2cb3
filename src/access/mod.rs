//! Access control for Agora.
//!
//! All checks are pure functions of an explicit identity and the checked
//! forum, thread or post; nothing here touches the database or a session.
//! Services load the scopes and turn a `false` into a permission error (for
//! writes) or a not-found error (for reads).

mod evaluator;

pub use evaluator::{AccessEvaluator, ForumScope, PostScope, ThreadScope};
