use kernel::id::{Id, markers};

/// Store-assigned user key; also the `sub` claim of issued tokens.
pub type UserId = Id<markers::User>;
