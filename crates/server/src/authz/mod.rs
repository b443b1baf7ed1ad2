pub mod identity;
pub mod membership;
pub mod policy;
pub mod target;

pub use identity::{Identity, Permission};
pub use membership::ProjectAccess;
pub use policy::{authorize, evaluate, Action, Decision};
pub use target::{Polymorphic, Resolved, Target, TargetEntity};
