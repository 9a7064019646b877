//! Built-in function purity classification (spec §4.E), reusing the
//! same table the interpreter consults when calling built-ins
//! ([`crate::builtins::purity`]).

use crate::builtins::Purity;

pub fn classify(name: &str) -> Purity {
    crate::builtins::purity(name)
}
